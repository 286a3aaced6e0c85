//! This crate reads and writes DVD subtitles in VobSub format.  These are
//! typically stored as two files: an `*.idx` file summarizing the
//! subtitles, and an MPEG-2 Program Stream containing the actual subtitle
//! packets.
//!
//! ## Example code
//!
//! ```no_run
//! extern crate subdvd;
//!
//! use subdvd::SubtitleStream;
//!
//! let config = subdvd::Config::default();
//! let mut stream =
//!     subdvd::SubDvd::open("movie.sub", "movie.idx", &config).unwrap();
//! for i in 0..stream.frame_count() {
//!     stream.decode(i).unwrap();
//!     let pic = stream.sub_picture(i);
//!     println!("Time: {}-{}", pic.start_pts, pic.end_pts);
//!     println!("Always show: {:?}", pic.forced);
//!     println!("At: {}, {}", pic.image_x, pic.image_y);
//!     println!("Size: {}x{}", pic.image_width, pic.image_height);
//!
//!     // `stream.rle_data()` now holds the caption's raw RLE buffer,
//!     // ready for an RLE image decoder.
//! }
//! ```
//!
//! ## Limitations
//!
//! Only the language selected by the `langidx:` line of the `*.idx` file
//! is read; rendering the run-length-encoded image data into pixels is
//! left to an external decoder.
//!
//! ## Background & References
//!
//! VobSub subtitles consist of a simple textual `*.idx` file, and a binary
//! `*.sub` file.  The binary `*.sub` file is essentially an MPEG-2 Program
//! Stream containing Packetized Elementary Stream data, but only for a
//! single subtitle track.
//!
//! Useful references include:
//!
//! - [Program Stream](https://en.wikipedia.org/wiki/MPEG_program_stream) (PS)
//! - [Packetized Elementary Stream][PES] (PES)
//! - [DVD subtitles](http://sam.zoy.org/writings/dvd/subtitles/)
//! - [System Time Clock](http://www.bretl.com/mpeghtml/STC.HTM)
//!
//! [PES]: http://dvd.sourceforge.net/dvdinfo/pes-hdr.html

#![warn(missing_docs)]

extern crate cast;
extern crate common_failures;
#[macro_use]
extern crate failure;
#[cfg(test)]
extern crate env_logger;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate nom;
extern crate regex;

mod buffer;
mod errors;
mod idx;
pub mod lang;
mod mpeg2;
mod probe;
mod spu;
mod stream;
mod sub;
mod util;

pub use common_failures::{Error, Result};
pub use self::buffer::ByteBuffer;
pub use self::errors::SubDvdError;
pub use self::idx::{Index, IdxHeader, Palette, DEFAULT_PALETTE};
pub use self::mpeg2::pes::{decode_pts, encode_pts, MAX_PTS, PACK_SIZE};
pub use self::probe::{is_idx_file, is_sub_file};
pub use self::spu::{RleFragment, SubPicture};
pub use self::stream::SubtitleStream;
pub use self::sub::{create_sub_frame, Config, SubDvd, SubDvdWriter};
pub use self::util::{parse_int, pts_to_time_str, time_str_to_pts};
