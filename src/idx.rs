//! Parse and emit files in `*.idx` format.
//!
//! The textual sidecar carries the global palette, screen geometry, timing
//! offsets, and one `timestamp: ..., filepos: ...` line per caption.  Only
//! the stream whose `index:` matches the most recent `langidx:` line is
//! read; captions of other languages are skipped.

use cast;
use common_failures::prelude::*;
use regex::Regex;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;

use errors::{IResultExt, SubDvdError};
use lang;
use spu::SubPicture;
use sub::Config;
use util;

/// Parse a single hexadecimal digit.
named!(hex_digit<u8>,
    map!(one_of!(&b"0123456789abcdefABCDEF"[..]), |c: char| -> u8 {
        cast::u8(c.to_digit(16).unwrap()).unwrap()
    })
);

/// Parse a single byte hexadecimal byte.
named!(hex_u8<u8>,
    do_parse!(
        h1: call!(hex_digit) >>
        h2: call!(hex_digit) >>
        (h1 << 4 | h2)
    )
);

/// Parse a 3-byte hexadecimal RGB color.
named!(rgb<[u8; 3]>,
    count_fixed!(u8, call!(hex_u8), 3)
);

#[test]
fn parse_rgb() {
    use nom::IResult;
    assert_eq!(rgb(&b"1234ab"[..]),
               IResult::Done(&b""[..], [0x12, 0x34, 0xab]));
}

/// The 16-color palette used by the subtitles.
pub type Palette = [[u8; 3]; 16];

/// The default DVD palette, used for entries the `*.idx` file leaves out.
pub const DEFAULT_PALETTE: Palette = [
    [0x00, 0x00, 0x00], [0xf0, 0xf0, 0xf0], [0xcc, 0xcc, 0xcc], [0x99, 0x99, 0x99],
    [0x33, 0x33, 0xfa], [0x11, 0x11, 0xbb], [0xfa, 0x33, 0x33], [0xbb, 0x11, 0x11],
    [0x33, 0xfa, 0x33], [0x11, 0xbb, 0x11], [0xfa, 0xfa, 0x33], [0xbb, 0xbb, 0x11],
    [0xfa, 0x33, 0xfa], [0xbb, 0x11, 0xbb], [0x33, 0xfa, 0xfa], [0x11, 0xbb, 0xbb],
];

/// The global header state parsed from an `*.idx` file.
#[derive(Debug, Clone, PartialEq)]
pub struct IdxHeader {
    /// Screen width in pixels.
    pub screen_width: u16,
    /// Screen height in pixels.
    pub screen_height: u16,
    /// Global x offset added to every caption position.
    pub global_x_ofs: u16,
    /// Global y offset added to every caption position.
    pub global_y_ofs: u16,
    /// Global delay added to every caption start time, in 90 kHz ticks.
    pub global_delay: i64,
    /// The colors used for the subtitles.
    pub palette: Palette,
    /// Row of the selected language in [`LANGUAGES`](::lang::LANGUAGES).
    pub language_idx: usize,
    /// Stream ID of the selected language (its `index:` value).
    pub stream_id: i32,
}

impl Default for IdxHeader {
    fn default() -> IdxHeader {
        IdxHeader {
            screen_width: 720,
            screen_height: 576,
            global_x_ofs: 0,
            global_y_ofs: 0,
            global_delay: 0,
            palette: DEFAULT_PALETTE,
            language_idx: 0,
            stream_id: 0,
        }
    }
}

/// A parsed `*.idx` file: the global header plus one seed `SubPicture` per
/// caption of the selected language.
#[derive(Debug)]
pub struct Index {
    /// Global header state.
    pub header: IdxHeader,
    /// Caption seeds, in file order.  Only the file offset, start time and
    /// screen size are filled in; the rest comes from the `*.sub` stream.
    pub sub_pictures: Vec<SubPicture>,
}

impl Index {
    /// Open and parse an `*.idx` file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Index> {
        let path = path.as_ref();
        let f = fs::File::open(path)
            .with_context(|_| format!("could not open {}", path.display()))?;
        Index::read_from(io::BufReader::new(f))
            .with_context(|_| format!("could not parse {}", path.display()))
            .map_err(|e| e.into())
    }

    /// Parse `*.idx` data from a stream.
    pub fn read_from<R: BufRead>(input: R) -> Result<Index> {
        lazy_static! {
            static ref KEY_VALUE: Regex =
                Regex::new("^([A-Za-z/ ]+):\\s*(.*)$").unwrap();
        }

        let mut header = IdxHeader::default();
        let mut sub_pictures = vec![];
        // The most recent `langidx:` value; an `id:` line whose own index
        // matches it selects the stream we read.
        let mut lang_stream_idx = 0;
        let mut ignore_timestamps = false;

        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cap = match KEY_VALUE.captures(line) {
                Some(cap) => cap,
                None => {
                    warn!("illegal idx line skipped: {}", line);
                    continue;
                }
            };
            let key = cap.get(1).unwrap().as_str().trim().to_lowercase();
            let val = cap.get(2).unwrap().as_str().trim();

            match key.as_str() {
                "size" => {
                    let mut dims = val.splitn(2, 'x');
                    let w = util::parse_int(dims.next().unwrap_or(""));
                    let h = util::parse_int(dims.next().unwrap_or(""));
                    if w < 2 {
                        return Err(SubDvdError::idx(
                            format!("illegal screen width: {}", w)).into());
                    }
                    if h < 2 {
                        return Err(SubDvdError::idx(
                            format!("illegal screen height: {}", h)).into());
                    }
                    header.screen_width = cast::u16(w)
                        .map_err(|_| SubDvdError::idx(format!("illegal screen width: {}", w)))?;
                    header.screen_height = cast::u16(h)
                        .map_err(|_| SubDvdError::idx(format!("illegal screen height: {}", h)))?;
                }
                "org" => {
                    let mut dims = val.splitn(2, ',');
                    let x = util::parse_int(dims.next().unwrap_or(""));
                    let y = util::parse_int(dims.next().unwrap_or(""));
                    if x < 0 || y < 0 {
                        return Err(SubDvdError::idx(
                            format!("illegal origin: {}", val)).into());
                    }
                    header.global_x_ofs = cast::u16(x)
                        .map_err(|_| SubDvdError::idx(format!("illegal x origin: {}", x)))?;
                    header.global_y_ofs = cast::u16(y)
                        .map_err(|_| SubDvdError::idx(format!("illegal y origin: {}", y)))?;
                }
                "time offset" => {
                    let mut v = util::parse_int(val);
                    if v < 0 {
                        v = util::time_str_to_pts(val).ok_or_else(|| {
                            SubDvdError::idx(format!("illegal time offset: {}", val))
                        })?;
                    }
                    header.global_delay = v * 90;
                }
                "palette" => {
                    let entries: Vec<&str> = val.split(',').collect();
                    if entries.len() > 16 {
                        return Err(SubDvdError::idx(
                            format!("illegal palette definition: {}", val)).into());
                    }
                    for (i, entry) in entries.iter().enumerate() {
                        header.palette[i] = rgb(entry.trim().as_bytes())
                            .to_subdvd_result()
                            .with_context(|_| {
                                SubDvdError::idx(format!("illegal palette entry: {}", entry))
                            })?;
                    }
                }
                "langidx" => {
                    let v = util::parse_int(val);
                    if v < 0 {
                        return Err(SubDvdError::idx(
                            format!("illegal language idx: {}", v)).into());
                    }
                    lang_stream_idx = v;
                }
                "id" => {
                    let code = val.splitn(2, ',').next().unwrap_or("").trim();
                    if code.len() != 2 {
                        warn!("illegal language id: {}", code);
                        continue;
                    }
                    match lang::find_by_code(code) {
                        Some(row) => header.language_idx = row,
                        None => warn!("unknown language id: {}", code),
                    }
                    let index_val = match val.find(':') {
                        Some(pos) => val[pos + 1..].trim(),
                        None => {
                            warn!("missing index key: {}", val);
                            continue;
                        }
                    };
                    let v = util::parse_int(index_val);
                    if v < 0 {
                        return Err(SubDvdError::idx(
                            format!("illegal language index: {}", v)).into());
                    }
                    if v != lang_stream_idx {
                        ignore_timestamps = true;
                        warn!("language id {} (index: {}) inactive -> ignored", code, v);
                    } else {
                        header.stream_id = v as i32;
                        ignore_timestamps = false;
                    }
                }
                "timestamp" => {
                    if ignore_timestamps {
                        continue;
                    }
                    let comma = val.find(',').ok_or_else(|| {
                        SubDvdError::idx(format!("illegal timestamp entry: {}", val))
                    })?;
                    let t = util::time_str_to_pts(&val[..comma]).ok_or_else(|| {
                        SubDvdError::idx(format!("illegal timestamp: {}", &val[..comma]))
                    })?;
                    let rest = val[comma + 1..].to_lowercase();
                    let filepos = rest.find("filepos:").ok_or_else(|| {
                        SubDvdError::idx(format!("missing filepos: {}", val))
                    })?;
                    let offset = u64::from_str_radix(rest[filepos + 8..].trim(), 16)
                        .map_err(|_| {
                            SubDvdError::idx(format!("illegal filepos: {}",
                                                     &rest[filepos + 8..]))
                        })?;
                    sub_pictures.push(SubPicture::seed(offset,
                                                       t + header.global_delay,
                                                       header.screen_width,
                                                       header.screen_height));
                }
                // Recognized but unused display hints.
                "scale" | "alpha" | "smooth" | "fadein/out" | "align"
                | "forced subs" | "custom colors" | "alt" => {
                    trace!("ignored idx key: {}", key);
                }
                _ => trace!("unimplemented idx key: {}", key),
            }
        }

        Ok(Index {
            header: header,
            sub_pictures: sub_pictures,
        })
    }
}

/// Write an `*.idx` sidecar describing the captions in `entries`, a
/// `(start_pts, file_offset)` pair per caption in stream order.  `pic`
/// supplies the screen geometry; the palette and the language row come
/// from the caller.
///
/// The emitted block order, comments and spacing follow the format players
/// expect, byte for byte.
pub fn write_idx<W: Write>(out: &mut W,
                           pic: &SubPicture,
                           entries: &[(i64, u64)],
                           palette: &Palette,
                           config: &Config)
                           -> Result<()> {
    let (lang_name, lang_code) = lang::LANGUAGES[config.language_idx];
    writeln!(out, "# VobSub index file, v7 (do not modify this line!)")?;
    writeln!(out, "# Created by {} {}",
             env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "")?;
    writeln!(out, "# Frame size")?;
    writeln!(out, "size: {}x{}", pic.width,
             i64::from(pic.height) - 2 * i64::from(config.crop_offset_y))?;
    writeln!(out, "")?;
    writeln!(out, "# Origin - upper-left corner")?;
    writeln!(out, "org: 0, 0")?;
    writeln!(out, "")?;
    writeln!(out, "# Scaling")?;
    writeln!(out, "scale: 100%, 100%")?;
    writeln!(out, "")?;
    writeln!(out, "# Alpha blending")?;
    writeln!(out, "alpha: 100%")?;
    writeln!(out, "")?;
    writeln!(out, "# Smoothing")?;
    writeln!(out, "smooth: OFF")?;
    writeln!(out, "")?;
    writeln!(out, "# Fade in/out in milliseconds")?;
    writeln!(out, "fadein/out: 0, 0")?;
    writeln!(out, "")?;
    writeln!(out, "# Force subtitle placement relative to (org.x, org.y)")?;
    writeln!(out, "align: OFF at LEFT TOP")?;
    writeln!(out, "")?;
    writeln!(out, "# For correcting non-progressive desync. (in millisecs or hh:mm:ss:ms)")?;
    writeln!(out, "time offset: 0")?;
    writeln!(out, "")?;
    writeln!(out, "# ON: displays only forced subtitles, OFF: shows everything")?;
    writeln!(out, "forced subs: OFF")?;
    writeln!(out, "")?;
    writeln!(out, "# The palette of the generated file")?;
    write!(out, "palette: ")?;
    for (i, color) in palette.iter().enumerate() {
        write!(out, "{:02x}{:02x}{:02x}", color[0], color[1], color[2])?;
        if i != palette.len() - 1 {
            write!(out, ", ")?;
        }
    }
    writeln!(out, "")?;
    writeln!(out, "")?;
    writeln!(out, "# Custom colors (transp idxs and the four colors)")?;
    writeln!(out, "custom colors: OFF, tridx: 1000, colors: 000000, 444444, 888888, cccccc")?;
    writeln!(out, "")?;
    writeln!(out, "# Language index in use")?;
    // Always stream 0: we only ever emit a single language.
    writeln!(out, "langidx: 0")?;
    writeln!(out, "")?;
    writeln!(out, "# {}", lang_name)?;
    writeln!(out, "id: {}, index: 0", lang_code)?;
    writeln!(out, "# Decomment next line to activate alternative name in DirectVobSub / Windows Media Player 6.x")?;
    writeln!(out, "# alt: {}", lang_name)?;
    writeln!(out, "# Vob/Cell ID: 1, 1 (PTS: 0)")?;
    for &(pts, offset) in entries {
        writeln!(out, "timestamp: {}, filepos: {:09x}",
                 util::pts_to_time_str(pts), offset)?;
    }
    Ok(())
}
