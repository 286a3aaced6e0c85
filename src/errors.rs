//! Custom error types.

use common_failures::prelude::*;
use nom::{IResult, Needed};
use std::default::Default;
use std::fmt;

/// A type representing errors that are specific to `subdvd`. Note that we may
/// normally return `Error`, not `SubDvdError`, which allows to return other
/// kinds of errors from third-party libraries.
#[derive(Debug, Fail, PartialEq)]
pub enum SubDvdError {
    /// A read fell outside the underlying `*.sub` file.
    #[fail(display = "Read of {} bytes at offset 0x{:x} is outside the file (size 0x{:x})",
           len, offset, size)]
    Buffer {
        /// Offset of the attempted read.
        offset: u64,
        /// Number of bytes the caller asked for.
        len: usize,
        /// Total size of the underlying file.
        size: u64,
    },

    /// The textual `*.idx` sidecar is malformed.
    #[fail(display = "Invalid idx file: {}", message)]
    Idx {
        /// Details about what we could not parse.
        message: String,
    },

    /// The binary `*.sub` stream did not match the expected structure.
    #[fail(display = "Invalid sub stream: {}", message)]
    Format {
        /// Details about the structural mismatch.
        message: String,
    },

    /// Our input data ended sooner than we expected.
    #[fail(display = "Input ended unexpectedly. {:?} bytes needed", needed)]
    IncompleteInput {
        /// How many more bytes the parser wanted, if known.
        needed: Option<usize>,
    },

    /// We could not parse a value.
    #[fail(display = "Could not parse: {}", message)]
    Parse {
        /// Details from the underlying parser.
        message: String,
    },

    /// We have leftover input that we didn't expect.
    #[fail(display = "Unexpected extra input")]
    UnexpectedInput,
}

impl SubDvdError {
    /// Build an `Idx` error from anything printable.
    pub fn idx<S: Into<String>>(message: S) -> SubDvdError {
        SubDvdError::Idx { message: message.into() }
    }

    /// Build a `Format` error from anything printable.
    pub fn format<S: Into<String>>(message: S) -> SubDvdError {
        SubDvdError::Format { message: message.into() }
    }
}

pub trait IResultExt<I, O, E> {
    fn to_subdvd_result(self) -> Result<O>;
}

impl<I: Default + Eq, O, E: fmt::Debug> IResultExt<I, O, E> for IResult<I, O, E> {
    fn to_subdvd_result(self) -> Result<O> {
        match self {
            IResult::Done(rest, val) => {
                if rest == I::default() {
                    Ok(val)
                } else {
                    Err(SubDvdError::UnexpectedInput.into())
                }
            }
            IResult::Incomplete(needed) => {
                let needed = match needed {
                    Needed::Unknown => None,
                    Needed::Size(size) => Some(size),
                };
                Err(SubDvdError::IncompleteInput { needed: needed }.into())
            }
            IResult::Error(err) => {
                Err(SubDvdError::Parse {
                    message: format!("{:?}", err),
                }.into())
            }
        }
    }
}
