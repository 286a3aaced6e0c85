//! Subpicture data and the SP_DCSQ control sequence.
//!
//! Every caption carries a control header: a chain of `(delay, next)`
//! records whose command bytes select the palette, alpha, display area and
//! RLE layout of the caption.  For background, see [this documentation on
//! the DVD subtitle format][subs].
//!
//! [subs]: http://sam.zoy.org/writings/dvd/subtitles/

use cast;
use common_failures::prelude::*;

use errors::{IResultExt, SubDvdError};

/// Parse four 4-bit palette entries.
named!(palette_entries<[u8; 4]>, bits!(count_fixed!(u8, take_bits!(u8, 4), 4)));

#[test]
fn parse_palette_entries() {
    use nom::IResult;
    assert_eq!(palette_entries(&[0x03, 0x10][..]),
               IResult::Done(&[][..], [0x00, 0x03, 0x01, 0x00]));
}

/// Parse a 12-bit coordinate value.
named!(coordinate<(&[u8], usize), u16>, take_bits!(u16, 12));

/// Display area of a caption, with inclusive right and bottom edges.
#[derive(Debug, PartialEq, Eq)]
struct DisplayArea {
    x1: u16,
    x2: u16,
    y1: u16,
    y2: u16,
}

/// Parse four 12-bit coordinate values as a display area.
named!(display_area<DisplayArea>,
    bits!(
        do_parse!(
            x1: call!(coordinate) >>
            x2: call!(coordinate) >>
            y1: call!(coordinate) >>
            y2: call!(coordinate) >>
            (DisplayArea {
                x1: x1,
                x2: x2,
                y1: y1,
                y2: y2,
            })
        )
    )
);

#[test]
fn parse_display_area() {
    use nom::IResult;
    assert_eq!(display_area(&[0x29, 0xb4, 0xe6, 0x3c, 0x54, 0x00][..]),
               IResult::Done(&[][..], DisplayArea {
                   x1: 0x29b,
                   x2: 0x4e6,
                   y1: 0x3c5,
                   y2: 0x400,
               }));
}

/// Parse a pair of 16-bit RLE offsets.
named!(rle_offsets<[u16; 2]>, bits!(count_fixed!(u16, take_bits!(u16, 16), 2)));

/// One RLE byte range in the source `*.sub` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RleFragment {
    /// Absolute file offset of the fragment.
    pub offset: u64,
    /// Length of the fragment in bytes.
    pub length: usize,
}

/// A single DVD caption: where it lives in the `*.sub` file, when and
/// where it is displayed, and how its RLE image data is laid out.
#[derive(Debug, Clone, PartialEq)]
pub struct SubPicture {
    /// Byte position of the caption's first pack header in the `*.sub`
    /// file.
    pub file_offset: u64,
    /// Start of display, in 90 kHz ticks.
    pub start_pts: i64,
    /// End of display, in 90 kHz ticks.  Equal to `start_pts` when the
    /// control header carries no end sequence.
    pub end_pts: i64,
    /// Screen width, copied from the `*.idx` file.
    pub width: u16,
    /// Screen height, copied from the `*.idx` file.
    pub height: u16,
    /// Leftmost edge of the caption, already offset by the global origin.
    pub image_x: u16,
    /// Topmost edge of the caption, already offset by the global origin.
    pub image_y: u16,
    /// Width of the caption bitmap.
    pub image_width: u16,
    /// Height of the caption bitmap.
    pub image_height: u16,
    /// Map each of the 4 colors in this caption to the 16-entry palette.
    pub palette_indices: [u8; 4],
    /// Map each of the 4 colors in this caption to 4 bits of alpha
    /// channel data (0 = transparent, 15 = opaque).
    pub alpha_indices: [u8; 4],
    /// Should this caption be shown even when subtitles are off?
    pub forced: bool,
    /// Byte offset of the even-field RLE stream within the RLE buffer.
    pub even_offset: u16,
    /// Byte offset of the odd-field RLE stream within the RLE buffer.
    pub odd_offset: u16,
    /// Where to find the RLE bytes in the source file.  Filled in during
    /// read only.
    pub rle_fragments: Vec<RleFragment>,
    /// Total RLE byte count found while reassembling the caption.
    pub rle_size: usize,
    original_palette: [u8; 4],
    original_alpha: [u8; 4],
    original_x: u16,
    original_y: u16,
}

impl SubPicture {
    /// Create a caption seed from an `*.idx` timestamp line.  Everything
    /// beyond position, time and screen size is filled in later from the
    /// `*.sub` stream.
    pub fn seed(file_offset: u64, start_pts: i64, width: u16, height: u16)
                -> SubPicture {
        SubPicture {
            file_offset: file_offset,
            start_pts: start_pts,
            end_pts: start_pts,
            width: width,
            height: height,
            image_x: 0,
            image_y: 0,
            image_width: 0,
            image_height: 0,
            palette_indices: [0; 4],
            alpha_indices: [0; 4],
            forced: false,
            even_offset: 0,
            odd_offset: 0,
            rle_fragments: vec![],
            rle_size: 0,
            original_palette: [0; 4],
            original_alpha: [0; 4],
            original_x: 0,
            original_y: 0,
        }
    }

    /// Snapshot palette, alpha and position so the caption can be
    /// re-encoded after user edits.
    pub fn store_original(&mut self) {
        self.original_palette = self.palette_indices;
        self.original_alpha = self.alpha_indices;
        self.original_x = self.image_x;
        self.original_y = self.image_y;
    }

    /// Palette indices as parsed from the stream, before any edits.
    pub fn original_palette(&self) -> &[u8; 4] {
        &self.original_palette
    }

    /// Alpha indices as parsed from the stream, before any edits.
    pub fn original_alpha(&self) -> &[u8; 4] {
        &self.original_alpha
    }

    /// Caption position as parsed from the stream, before any edits.
    pub fn original_position(&self) -> (u16, u16) {
        (self.original_x, self.original_y)
    }
}

fn byte_at(ctrl: &[u8], index: i64) -> Result<u8> {
    if index < 0 || index as usize >= ctrl.len() {
        return Err(SubDvdError::format(
            format!("index {} out of bounds in control header", index)).into());
    }
    Ok(ctrl[index as usize])
}

fn word_at(ctrl: &[u8], index: i64) -> Result<i64> {
    Ok(i64::from(byte_at(ctrl, index)?) << 8 | i64::from(byte_at(ctrl, index + 1)?))
}

fn slice_at(ctrl: &[u8], index: i64, len: usize) -> Result<&[u8]> {
    if index < 0 || index as usize + len > ctrl.len() {
        return Err(SubDvdError::format(
            format!("index {} out of bounds in control header", index)).into());
    }
    Ok(&ctrl[index as usize..index as usize + len])
}

/// Execute the control header of a caption, filling in palette, alpha,
/// position, size, RLE offsets, the forced flag and the display times of
/// `pic`.
///
/// `ctrl` is the reassembled control buffer (starting at the first
/// record's next-offset word), `ctrl_ofs_rel` the control-header offset
/// relative to the subpicture start, and `origin` the global origin from
/// the `*.idx` file.  `last_alpha` carries the alpha values of the
/// previously parsed caption and is updated on return; it backs the
/// invisible-caption workaround enabled by `fix_zero_alpha`.
pub fn parse_control_header(pic: &mut SubPicture,
                            ctrl: &[u8],
                            ctrl_ofs_rel: usize,
                            origin: (u16, u16),
                            fix_zero_alpha: bool,
                            last_alpha: &mut [u8; 4])
                            -> Result<()> {
    let ctrl_size = ctrl.len() as i64;
    let rel = ctrl_ofs_rel as i64;

    let mut alpha_sum: u32 = 0;
    let mut delay: i64 = -1;
    let mut col_alpha_update = false;

    let mut end_seq_ofs = word_at(ctrl, 0)? - rel - 2;
    if end_seq_ofs < 0 || end_seq_ofs > ctrl_size {
        warn!("invalid end sequence offset -> no end time");
        end_seq_ofs = ctrl_size;
    }
    let mut index: i64 = 2;
    while index < end_seq_ofs {
        let cmd = byte_at(ctrl, index)?;
        index += 1;
        match cmd {
            0x00 => {
                pic.forced = true;
            }
            0x01 => {} // start display
            0x02 => {} // stop display
            0x03 => {
                let entries = palette_entries(slice_at(ctrl, index, 2)?)
                    .to_subdvd_result()?;
                pic.palette_indices =
                    [entries[3], entries[2], entries[1], entries[0]];
                index += 2;
                trace!("palette: {:?}", pic.palette_indices);
            }
            0x04 => {
                let entries = palette_entries(slice_at(ctrl, index, 2)?)
                    .to_subdvd_result()?;
                pic.alpha_indices =
                    [entries[3], entries[2], entries[1], entries[0]];
                for &a in &pic.alpha_indices {
                    alpha_sum += u32::from(a);
                }
                index += 2;
                trace!("alpha: {:?}", pic.alpha_indices);
            }
            0x05 => {
                let area = display_area(slice_at(ctrl, index, 6)?)
                    .to_subdvd_result()?;
                pic.image_x = cast::u16(u32::from(origin.0) + u32::from(area.x1))
                    .map_err(|_| SubDvdError::format("display area x overflow"))?;
                pic.image_y = cast::u16(u32::from(origin.1) + u32::from(area.y1))
                    .map_err(|_| SubDvdError::format("display area y overflow"))?;
                pic.image_width = area.x2.wrapping_sub(area.x1).wrapping_add(1);
                pic.image_height = area.y2.wrapping_sub(area.y1).wrapping_add(1);
                index += 6;
                trace!("area: ({}, {}) {}x{}",
                       pic.image_x, pic.image_y,
                       pic.image_width, pic.image_height);
            }
            0x06 => {
                let offsets = rle_offsets(slice_at(ctrl, index, 4)?)
                    .to_subdvd_result()?;
                pic.even_offset = offsets[0].saturating_sub(4);
                pic.odd_offset = offsets[1].saturating_sub(4);
                index += 4;
                trace!("RLE offsets: 0x{:04x}, 0x{:04x}",
                       pic.even_offset, pic.odd_offset);
            }
            0x07 => {
                // Palette/alpha update.  We only pick out the new palette
                // and alpha nibbles, and only when the update is more
                // opaque than what we have.
                col_alpha_update = true;
                let update = palette_entries(slice_at(ctrl, index + 10, 2)?)
                    .to_subdvd_result()?;
                let update: [u8; 4] = [update[3], update[2], update[1], update[0]];
                let update_sum: u32 = update.iter().map(|&a| u32::from(a)).sum();
                if update_sum > alpha_sum {
                    alpha_sum = update_sum;
                    pic.alpha_indices = update;
                    let entries = palette_entries(slice_at(ctrl, index + 8, 2)?)
                        .to_subdvd_result()?;
                    pic.palette_indices =
                        [entries[3], entries[2], entries[1], entries[0]];
                }
                // Skip ahead to the end sequence.
                index = end_seq_ofs;
                delay = word_at(ctrl, index)? * 1024;
                end_seq_ofs = word_at(ctrl, index + 2)? - rel - 2;
                if end_seq_ofs < 0 || end_seq_ofs > ctrl_size {
                    warn!("invalid end sequence offset -> no end time");
                    end_seq_ofs = ctrl_size;
                }
                index += 4;
            }
            0xff => break,
            _ => {
                warn!("unknown control sequence 0x{:02x}, stopping", cmd);
                break;
            }
        }
    }

    if end_seq_ofs != ctrl_size {
        let mut seq_count = 1;
        let mut idx: i64 = -1;
        let mut next_idx = end_seq_ofs;
        while next_idx != idx {
            if next_idx < idx {
                warn!("control sequence offset went backwards, stopping");
                break;
            }
            idx = next_idx;
            delay = word_at(ctrl, idx)? * 1024;
            next_idx = word_at(ctrl, idx + 2)? - rel - 2;
            seq_count += 1;
        }
        if seq_count > 2 {
            warn!("more than two control sequences - result may be erratic");
        }
        pic.end_pts = pic.start_pts + delay;
    } else {
        pic.end_pts = pic.start_pts;
    }

    if col_alpha_update {
        warn!("palette update/alpha fading detected - result may be erratic");
    }

    if alpha_sum == 0 {
        if fix_zero_alpha {
            pic.alpha_indices = *last_alpha;
            warn!("invisible caption due to zero alpha - used alpha info of last caption");
        } else {
            warn!("invisible caption due to zero alpha (not fixed due to user setting)");
        }
    }

    *last_alpha = pic.alpha_indices;
    pic.store_original();
    Ok(())
}

/// Build the serialized control header of a caption: the leading
/// end-sequence offset, the display commands, and the chained end
/// sequence.  When `pic.forced` is set, a `0x00` command is inserted ahead
/// of the start-display command and both end-sequence offset copies shift
/// by one byte.
pub fn build_control_header(pic: &SubPicture,
                            even_len: usize,
                            odd_len: usize,
                            crop_ofs_y: u16)
                            -> Vec<u8> {
    let rle_size = even_len + odd_len;
    let forced_byte = if pic.forced { 1 } else { 0 };
    let end_seq_ofs = rle_size + 22 + forced_byte + 4;

    let mut y_ofs = i64::from(pic.image_y) - i64::from(crop_ofs_y);
    if y_ofs < 0 {
        y_ofs = 0;
    } else {
        let y_max = i64::from(pic.height) - i64::from(pic.image_height)
            - 2 * i64::from(crop_ofs_y);
        if y_ofs > y_max {
            y_ofs = y_max;
        }
    }

    let x = i64::from(pic.image_x);
    let x_end = x + i64::from(pic.image_width) - 1;
    let y_end = y_ofs + i64::from(pic.image_height) - 1;

    let pal = &pic.palette_indices;
    let alpha = &pic.alpha_indices;
    let odd_ofs = 4 + even_len;
    let duration = (pic.end_pts - pic.start_pts) / 1024;

    let mut ctrl = Vec::with_capacity(28);
    ctrl.push((end_seq_ofs >> 8) as u8);
    ctrl.push(end_seq_ofs as u8);
    if pic.forced {
        ctrl.push(0x00);
    }
    ctrl.push(0x01);
    ctrl.push(0x03);
    ctrl.push((pal[3] & 0x0f) << 4 | (pal[2] & 0x0f));
    ctrl.push((pal[1] & 0x0f) << 4 | (pal[0] & 0x0f));
    ctrl.push(0x04);
    ctrl.push((alpha[3] & 0x0f) << 4 | (alpha[2] & 0x0f));
    ctrl.push((alpha[1] & 0x0f) << 4 | (alpha[0] & 0x0f));
    ctrl.push(0x05);
    ctrl.push((x >> 4) as u8);
    ctrl.push(((x & 0x0f) << 4) as u8 | ((x_end >> 8) & 0x0f) as u8);
    ctrl.push(x_end as u8);
    ctrl.push((y_ofs >> 4) as u8);
    ctrl.push(((y_ofs & 0x0f) << 4) as u8 | ((y_end >> 8) & 0x0f) as u8);
    ctrl.push(y_end as u8);
    ctrl.push(0x06);
    ctrl.push(0x00);
    ctrl.push(0x04);
    ctrl.push((odd_ofs >> 8) as u8);
    ctrl.push(odd_ofs as u8);
    ctrl.push(0xff);
    ctrl.push((duration >> 8) as u8);
    ctrl.push(duration as u8);
    ctrl.push((end_seq_ofs >> 8) as u8);
    ctrl.push(end_seq_ofs as u8);
    ctrl.push(0x02);
    ctrl.push(0xff);
    ctrl
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pic() -> SubPicture {
        let mut pic = SubPicture::seed(0, 90000, 720, 576);
        pic.end_pts = 90000 + 25 * 1024;
        pic.image_x = 120;
        pic.image_y = 400;
        pic.image_width = 16;
        pic.image_height = 32;
        pic.palette_indices = [0, 1, 2, 3];
        pic.alpha_indices = [0, 15, 15, 15];
        pic
    }

    #[test]
    fn control_header_round_trips() {
        let _ = ::env_logger::try_init();
        for &forced in &[false, true] {
            let mut pic = test_pic();
            pic.forced = forced;
            let even_len = 7;
            let odd_len = 5;
            let ctrl = build_control_header(&pic, even_len, odd_len, 0);
            assert_eq!(ctrl.len(), if forced { 29 } else { 28 });

            let mut parsed = SubPicture::seed(0, 90000, 720, 576);
            let mut last_alpha = [0, 15, 15, 15];
            parse_control_header(&mut parsed, &ctrl, even_len + odd_len + 2,
                                 (0, 0), false, &mut last_alpha).unwrap();
            assert_eq!(parsed.forced, forced);
            assert_eq!(parsed.palette_indices, pic.palette_indices);
            assert_eq!(parsed.alpha_indices, pic.alpha_indices);
            assert_eq!(parsed.image_x, pic.image_x);
            assert_eq!(parsed.image_y, pic.image_y);
            assert_eq!(parsed.image_width, pic.image_width);
            assert_eq!(parsed.image_height, pic.image_height);
            assert_eq!(parsed.even_offset, 0);
            assert_eq!(parsed.odd_offset, even_len as u16);
            assert_eq!(parsed.end_pts, pic.end_pts);
            assert_eq!(last_alpha, pic.alpha_indices);

            // Serializing the parsed caption again must reproduce the
            // exact bytes.
            assert_eq!(build_control_header(&parsed, even_len, odd_len, 0),
                       ctrl);
        }
    }

    #[test]
    fn command_stream_is_parsed() {
        let _ = ::env_logger::try_init();
        // rel = 14, so in-buffer offset 22 maps to the word value 38.
        let ctrl = [
            0x00, 0x26, // first record: next offset -> end sequence at 22
            0x01,
            0x03, 0x32, 0x10,
            0x04, 0xff, 0xf0,
            0x05, 0x00, 0x00, 0x0f, 0x00, 0x00, 0x1f,
            0x06, 0x00, 0x04, 0x00, 0x10,
            0xff,
            0x00, 0x19, // end sequence: delay 25
            0x00, 0x26, // points at itself -> chain ends
            0x02, 0xff,
        ];
        let mut pic = SubPicture::seed(0, 90000, 720, 576);
        let mut last_alpha = [0, 15, 15, 15];
        parse_control_header(&mut pic, &ctrl, 14, (0, 0), false,
                             &mut last_alpha).unwrap();
        assert_eq!(pic.palette_indices, [0, 1, 2, 3]);
        assert_eq!(pic.alpha_indices, [0, 15, 15, 15]);
        assert_eq!(pic.image_x, 0);
        assert_eq!(pic.image_y, 0);
        assert_eq!(pic.image_width, 16);
        assert_eq!(pic.image_height, 32);
        assert_eq!(pic.even_offset, 0);
        assert_eq!(pic.odd_offset, 12);
        assert!(!pic.forced);
        assert_eq!(pic.end_pts, 90000 + 25 * 1024);
    }

    #[test]
    fn three_chained_sequences_use_last_delay() {
        let _ = ::env_logger::try_init();
        // rel = 14.  First record chains to offset 8, which chains to
        // offset 12, which points at itself.
        let ctrl = [
            0x00, 0x18, // -> 8
            0x01,
            0x04, 0xff, 0xf0,
            0xff,
            0x00, // filler
            0x00, 0x05, // delay 5
            0x00, 0x1c, // -> 12
            0x00, 0x19, // delay 25
            0x00, 0x1c, // -> 12 (itself)
        ];
        let mut pic = SubPicture::seed(0, 90000, 720, 576);
        let mut last_alpha = [0, 15, 15, 15];
        parse_control_header(&mut pic, &ctrl, 14, (0, 0), false,
                             &mut last_alpha).unwrap();
        assert_eq!(pic.end_pts, 90000 + 25 * 1024);
    }

    #[test]
    fn zero_alpha_reuses_last_caption() {
        let _ = ::env_logger::try_init();
        let mut last_alpha = [0, 15, 15, 15];

        // First caption carries alpha [0, 8, 15, 15].
        let first = [
            0x00, 0x10, // invalid chain target -> clamped, no end time
            0x01,
            0x04, 0xff, 0x80,
            0xff,
        ];
        let mut pic = SubPicture::seed(0, 90000, 720, 576);
        parse_control_header(&mut pic, &first, 0x800, (0, 0), true,
                             &mut last_alpha).unwrap();
        assert_eq!(pic.alpha_indices, [0, 8, 15, 15]);
        assert_eq!(pic.end_pts, pic.start_pts);
        assert_eq!(last_alpha, [0, 8, 15, 15]);

        // Second caption is fully transparent; with the workaround on it
        // inherits the previous alpha.
        let second = [
            0x00, 0x10,
            0x01,
            0x04, 0x00, 0x00,
            0xff,
        ];
        let mut pic2 = SubPicture::seed(0, 180000, 720, 576);
        parse_control_header(&mut pic2, &second, 0x800, (0, 0), true,
                             &mut last_alpha).unwrap();
        assert_eq!(pic2.alpha_indices, [0, 8, 15, 15]);

        // With the workaround off the zero alpha is kept.
        let mut pic3 = SubPicture::seed(0, 270000, 720, 576);
        parse_control_header(&mut pic3, &second, 0x800, (0, 0), false,
                             &mut last_alpha).unwrap();
        assert_eq!(pic3.alpha_indices, [0, 0, 0, 0]);
        assert_eq!(last_alpha, [0, 0, 0, 0]);
    }

    #[test]
    fn unknown_command_stops_parsing() {
        let _ = ::env_logger::try_init();
        let ctrl = [
            0x00, 0x10, // invalid chain target -> clamped
            0x01,
            0x42, // unknown command
            0x04, 0xff, 0xff,
            0xff,
        ];
        let mut pic = SubPicture::seed(0, 90000, 720, 576);
        let mut last_alpha = [0, 15, 15, 15];
        parse_control_header(&mut pic, &ctrl, 0x800, (0, 0), false,
                             &mut last_alpha).unwrap();
        // The alpha command after the unknown byte was never executed.
        assert_eq!(pic.alpha_indices, [0, 0, 0, 0]);
    }

    #[test]
    fn origin_offsets_caption_position() {
        let _ = ::env_logger::try_init();
        let ctrl = [
            0x00, 0x10,
            0x01,
            0x05, 0x00, 0x80, 0x0f, 0x01, 0x01, 0x1f,
            0xff,
        ];
        let mut pic = SubPicture::seed(0, 90000, 720, 576);
        let mut last_alpha = [0, 15, 15, 15];
        parse_control_header(&mut pic, &ctrl, 0x800, (100, 50), false,
                             &mut last_alpha).unwrap();
        assert_eq!(pic.image_x, 100 + 8);
        assert_eq!(pic.image_y, 50 + 16);
    }
}
