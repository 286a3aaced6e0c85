//! # MPEG-2 Program Streams (PS)
//!
//! This is the container format used at the top-level of a `*.sub` file.
//! A subpicture is spread over one or more 2048-byte packs: the first pack
//! announces the total subpicture size and the offset of the control
//! header, and the following packs carry the rest of the RLE data and
//! whatever tail of the control header did not fit.  Reading walks the
//! packs at explicit file offsets; writing splits an already-assembled
//! subpicture into byte-exact packs, with PTS-field stuffing and a
//! trailing padding packet where the geometry calls for them.
//!
//! [MPEG-PS]: https://en.wikipedia.org/wiki/MPEG_program_stream

use common_failures::prelude::*;

use buffer::ByteBuffer;
use errors::SubDvdError;
use mpeg2::pes;
use spu::{RleFragment, SubPicture};

/// The control header of a subpicture, reassembled across packs.
#[derive(Debug)]
pub struct SpuData {
    /// The control buffer, starting at the first record's next-offset
    /// word.
    pub control: Vec<u8>,
    /// Control-header offset relative to the subpicture start, as
    /// announced by the first pack.
    pub ctrl_ofs_rel: usize,
}

fn round_up_to_pack(ofs: u64) -> u64 {
    (ofs / pes::PACK_SIZE as u64 + 1) * pes::PACK_SIZE as u64
}

/// Walk the packs of one subpicture, starting at `pic.file_offset` and
/// bounded by `end_ofs`.  Fills in the RLE fragment list and RLE size of
/// `pic` and returns the reassembled control header.
///
/// Packs of other streams are skipped; a misaligned next-pack offset is
/// fixed up to the following 2048-byte boundary, once, with a warning.
pub fn read_spu(buffer: &mut ByteBuffer,
                pic: &mut SubPicture,
                end_ofs: u64,
                stream_id: i32)
                -> Result<SpuData> {
    let mut ofs = pic.file_offset;
    let mut control: Vec<u8> = vec![];
    let mut ctrl_size: Option<usize> = None;
    let mut ctrl_ofs_rel: usize = 0;
    let mut declared_rle: i64 = 0;
    // Absolute offset of the control header; adjusted as header bytes and
    // skipped packs shift it.
    let mut ctrl_ofs: i64 = -1;
    let mut copied: usize = 0;
    let mut rle_found: usize = 0;
    let mut first_pack_found = false;

    loop {
        let start_ofs = ofs;
        if buffer.read_u32_be(ofs)? != pes::PACK_START_CODE {
            return Err(SubDvdError::format(
                format!("missing pack identifier at ofs 0x{:08x}", ofs)).into());
        }
        let stuffing = u64::from(buffer.read_u8(ofs + 13)? & 0x07);
        let pes_ofs = ofs + 14 + stuffing;
        if buffer.read_u32_be(pes_ofs)? != pes::PRIVATE_STREAM_1 {
            return Err(SubDvdError::format(
                format!("missing packet identifier at ofs 0x{:08x}", pes_ofs)).into());
        }
        let packet_length = u64::from(buffer.read_u16_be(pes_ofs + 4)?);
        let next_ofs = pes_ofs + 6 + packet_length;
        let pack_header_size = (pes_ofs + 6 - start_ofs) as i64;
        let first_pack = buffer.read_u8(pes_ofs + 7)? & 0x80 == 0x80;
        let pts_length = u64::from(buffer.read_u8(pes_ofs + 8)?);
        let packet_stream_id = i32::from(buffer.read_u8(pes_ofs + 9 + pts_length)?) - 0x20;

        if packet_stream_id != stream_id {
            warn!("skipping packet of stream {} at ofs 0x{:08x}",
                  packet_stream_id, start_ofs);
            if next_ofs % pes::PACK_SIZE as u64 != 0 {
                ofs = round_up_to_pack(next_ofs);
                warn!("offset to next fragment is invalid, fixed to 0x{:08x}", ofs);
            } else {
                ofs = next_ofs;
            }
            ctrl_ofs += pes::PACK_SIZE as i64;
            let needs_more = ctrl_size.map(|size| copied < size).unwrap_or(true);
            if ofs < end_ofs && needs_more {
                continue;
            }
            break;
        }

        let mut cursor = pes_ofs + 10 + pts_length;
        let mut header_size = (cursor - start_ofs) as i64;
        if first_pack && pts_length >= 5 {
            let mut pts_bytes = [0; 5];
            buffer.read_bytes(pes_ofs + 9, &mut pts_bytes)?;
            trace!("first pack at 0x{:08x}, PTS {}",
                   start_ofs, pes::decode_pts(&pts_bytes));
            let total_size = i64::from(buffer.read_u16_be(cursor)?);
            cursor += 2;
            let rel = i64::from(buffer.read_u16_be(cursor)?);
            declared_rle = rel - 2;
            let size = total_size - rel - 2;
            if size < 0 {
                return Err(SubDvdError::format("invalid control buffer size").into());
            }
            // The announced offset skips the first record's delay word.
            ctrl_ofs = cursor as i64 + rel;
            cursor += 2;
            header_size = (cursor - start_ofs) as i64;
            ctrl_size = Some(size as usize);
            ctrl_ofs_rel = rel as usize;
            control = vec![0; size as usize];
            pic.rle_fragments.clear();
            first_pack_found = true;
            debug!("SPU size 0x{:04x}, ctrl offset 0x{:04x}", total_size, rel);
        } else if first_pack_found {
            // Headers of this pack shift the control area.
            ctrl_ofs += header_size;
        } else {
            warn!("invalid fragment skipped at ofs 0x{:08x}", start_ofs);
            if next_ofs % pes::PACK_SIZE as u64 != 0 {
                ofs = round_up_to_pack(next_ofs);
                warn!("offset to next fragment is invalid, fixed to 0x{:08x}", ofs);
            } else {
                ofs = next_ofs;
            }
            if ofs < end_ofs {
                continue;
            }
            break;
        }

        // Copy whatever part of the control header falls into this pack.
        let mut diff = next_ofs as i64 - ctrl_ofs - copied as i64;
        if diff < 0 {
            diff = 0;
        }
        if let Some(size) = ctrl_size {
            let base = ctrl_ofs + copied as i64;
            let mut i: i64 = 0;
            while i < diff && copied < size {
                control[copied] = buffer.read_u8((base + i) as u64)
                    .map_err(|_| {
                        SubDvdError::format("inconsistent control buffer access")
                    })?;
                copied += 1;
                i += 1;
            }
        }

        let fragment_length = (packet_length as i64
            - (header_size - pack_header_size)
            - diff).max(0) as usize;
        pic.rle_fragments.push(RleFragment {
            offset: cursor,
            length: fragment_length,
        });
        rle_found += fragment_length;

        let ctrl_done = ctrl_size.map(|size| copied == size).unwrap_or(false);
        if !ctrl_done && next_ofs % pes::PACK_SIZE as u64 != 0 {
            ofs = round_up_to_pack(next_ofs);
            warn!("offset to next fragment is invalid, fixed to 0x{:08x}", ofs);
            rle_found += (ofs - next_ofs) as usize;
        } else {
            ofs = next_ofs;
        }
        let needs_more = ctrl_size.map(|size| copied < size).unwrap_or(true);
        if !(ofs < end_ofs && needs_more) {
            break;
        }
    }

    let ctrl_size = match ctrl_size {
        Some(size) => size,
        None => {
            return Err(SubDvdError::format(
                format!("no first packet found for subpicture at ofs 0x{:08x}",
                        pic.file_offset)).into());
        }
    };
    if copied != ctrl_size {
        warn!("control buffer size inconsistent");
        // Pad with end-sequence bytes so the remainder can't be mistaken
        // for forced-display commands.
        for byte in control[copied..].iter_mut() {
            *byte = 0xff;
        }
    }
    if rle_found as i64 != declared_rle {
        warn!("RLE buffer size inconsistent: found 0x{:x}, announced 0x{:x}",
              rle_found, declared_rle);
    }
    pic.rle_size = rle_found;
    debug!("SP_DCSQT at ofs 0x{:08x}", ctrl_ofs);

    Ok(SpuData {
        control: control,
        ctrl_ofs_rel: ctrl_ofs_rel,
    })
}

/// Split a subpicture into 2048-byte packs: `rle` is the interleaved
/// even/odd RLE buffer and `ctrl` the serialized control header.  The
/// first pack carries the PTS and the subpicture size; the control header
/// goes at the very end, split over at most two packs.  Small tail gaps
/// are absorbed as PTS-field stuffing, larger ones as a padding packet.
pub fn packetize_spu(start_pts: i64, rle: &[u8], ctrl: &[u8]) -> Vec<u8> {
    let pack = pes::PACK_SIZE;
    let size_rle = rle.len();
    let ctrl_len = ctrl.len();

    let mut buf_size = pes::PACK_HEADER.len() + pes::HEADER_FIRST.len()
        + ctrl_len + size_rle;
    let mut num_additional = 0;
    let first_length;
    if buf_size > pack {
        num_additional = 1;
        let mut remaining = size_rle as i64
            - (pack - pes::PACK_HEADER.len() - pes::HEADER_FIRST.len()) as i64;
        while remaining > (pack - pes::PACK_HEADER.len() - pes::HEADER_NEXT.len()
                           - ctrl_len) as i64 {
            remaining -= (pack - pes::PACK_HEADER.len() - pes::HEADER_NEXT.len()) as i64;
            buf_size += pes::PACK_HEADER.len() + pes::HEADER_NEXT.len();
            num_additional += 1;
        }
        first_length = pack - pes::PACK_HEADER.len() - 6;
    } else {
        first_length = buf_size - pes::PACK_HEADER.len() - 6;
    }

    let total = (1 + num_additional) * pack;
    let gap = total - buf_size;
    let stuffing = if gap > 0 && gap < 6 { gap } else { 0 };

    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&pes::PACK_HEADER);

    let mut first = pes::HEADER_FIRST;
    let length = first_length + stuffing;
    first[4] = (length >> 8) as u8;
    first[5] = length as u8;
    first[8] = (5 + stuffing) as u8;
    pes::encode_pts(&mut first[9..14], start_pts as u64);
    let spu_size = size_rle + 4 + ctrl_len;
    first[15] = (spu_size >> 8) as u8;
    first[16] = spu_size as u8;
    let ctrl_rel = size_rle + 2;
    first[17] = (ctrl_rel >> 8) as u8;
    first[18] = ctrl_rel as u8;

    // Stuffing bytes live between the PTS and the stream ID.
    buf.extend_from_slice(&first[..14]);
    for _ in 0..stuffing {
        buf.push(0xff);
    }
    buf.extend_from_slice(&first[14..]);

    // First chunk of RLE data.
    let mut chunk = size_rle;
    if num_additional > 0 {
        chunk = pack - pes::PACK_HEADER.len() - stuffing - pes::HEADER_FIRST.len();
        if chunk > size_rle {
            chunk = size_rle;
        }
    }
    buf.extend_from_slice(&rle[..chunk]);
    let mut rle_written = chunk;

    // If the RLE data ran out inside the first pack, the control header
    // starts here and continues in the next pack.
    let mut ctrl_written = 0;
    if num_additional == 1 && buf.len() < pack {
        let n = (pack - buf.len()).min(ctrl_len);
        buf.extend_from_slice(&ctrl[..n]);
        ctrl_written = n;
    }

    for p in 0..num_additional {
        let last = p == num_additional - 1;
        let (rle_chunk, length) = if last {
            let rest = size_rle - rle_written;
            (rest, pes::HEADER_NEXT.len() + (ctrl_len - ctrl_written) + rest - 6)
        } else {
            let rest = (pack - pes::PACK_HEADER.len() - pes::HEADER_NEXT.len())
                .min(size_rle - rle_written);
            (rest, pack - pes::PACK_HEADER.len() - 6)
        };
        buf.extend_from_slice(&pes::PACK_HEADER);
        let mut next = pes::HEADER_NEXT;
        next[4] = (length >> 8) as u8;
        next[5] = length as u8;
        buf.extend_from_slice(&next);
        buf.extend_from_slice(&rle[rle_written..rle_written + rle_chunk]);
        rle_written += rle_chunk;
        if !last {
            // Fill the rest of the pack with the head of the control
            // header; the tail lands in the last pack.
            let target = (p + 2) * pack;
            let n = (target - buf.len()).min(ctrl_len - ctrl_written);
            buf.extend_from_slice(&ctrl[ctrl_written..ctrl_written + n]);
            ctrl_written += n;
        }
    }

    buf.extend_from_slice(&ctrl[ctrl_written..]);

    // Pad the remainder of the last pack.
    let gap = total - buf.len();
    if gap >= 6 {
        let payload = gap - 6;
        buf.extend_from_slice(&[0x00, 0x00, 0x01, 0xbe]);
        buf.push((payload >> 8) as u8);
        buf.push(payload as u8);
        for _ in 0..payload {
            buf.push(0xff);
        }
    }
    buf.resize(total, 0x00);
    buf
}

#[cfg(test)]
mod tests {
    use mpeg2::pes;
    use super::packetize_spu;

    #[test]
    fn small_caption_fits_one_pack() {
        let rle = [0xaa; 12];
        let ctrl = [0x01; 28];
        let buf = packetize_spu(90000, &rle, &ctrl);
        assert_eq!(buf.len(), pes::PACK_SIZE);
        assert_eq!(&buf[..4], &[0x00, 0x00, 0x01, 0xba]);
        assert_eq!(&buf[14..18], &[0x00, 0x00, 0x01, 0xbd]);
        // Subpicture size and control offset.
        assert_eq!(u16::from(buf[29]) << 8 | u16::from(buf[30]), 12 + 4 + 28);
        assert_eq!(u16::from(buf[31]) << 8 | u16::from(buf[32]), 12 + 2);
        // RLE data, then control header, then a padding packet.
        assert_eq!(&buf[33..45], &rle[..]);
        assert_eq!(&buf[45..73], &ctrl[..]);
        assert_eq!(&buf[73..77], &[0x00, 0x00, 0x01, 0xbe]);
        let payload = pes::PACK_SIZE - 73 - 6;
        assert_eq!(u16::from(buf[77]) << 8 | u16::from(buf[78]), payload as u16);
        assert!(buf[79..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn large_caption_splits_into_three_packs() {
        let rle: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
        let ctrl = [0x02; 28];
        let buf = packetize_spu(90000, &rle, &ctrl);
        assert_eq!(buf.len(), 3 * pes::PACK_SIZE);
        assert_eq!(buf.len() % pes::PACK_SIZE, 0);
        // Every pack leads with a pack header.
        for p in 0..3 {
            assert_eq!(&buf[p * pes::PACK_SIZE..p * pes::PACK_SIZE + 4],
                       &[0x00, 0x00, 0x01, 0xba]);
        }
        // First pack: headers plus as much RLE data as fits.
        assert_eq!(&buf[33..pes::PACK_SIZE], &rle[..2015]);
        // Second pack: a continuation header and more RLE data.
        assert_eq!(&buf[pes::PACK_SIZE + 14..pes::PACK_SIZE + 24],
                   &[0x00, 0x00, 0x01, 0xbd, 0x07, 0xec, 0x81, 0x00, 0x00, 0x20]);
        assert_eq!(&buf[pes::PACK_SIZE + 24..2 * pes::PACK_SIZE],
                   &rle[2015..2015 + 2024]);
        // Third pack: the RLE tail, the control header, then padding.
        let third = 2 * pes::PACK_SIZE;
        assert_eq!(&buf[third + 24..third + 24 + 961], &rle[4039..]);
        assert_eq!(&buf[third + 985..third + 1013], &ctrl[..]);
        assert_eq!(&buf[third + 1013..third + 1017], &[0x00, 0x00, 0x01, 0xbe]);
        let payload = pes::PACK_SIZE - 1013 - 6;
        assert_eq!(u16::from(buf[third + 1017]) << 8 | u16::from(buf[third + 1018]),
                   payload as u16);
    }

    #[test]
    fn small_tail_gap_becomes_pts_stuffing() {
        // 33 header bytes + 28 control bytes + 1984 RLE bytes leave a
        // 3-byte gap, too small for a padding packet.
        let rle = [0x55; 1984];
        let ctrl = [0x03; 28];
        let buf = packetize_spu(90000, &rle, &ctrl);
        assert_eq!(buf.len(), pes::PACK_SIZE);
        // The gap went into the PTS field length...
        assert_eq!(buf[22], 5 + 3);
        assert_eq!(&buf[28..31], &[0xff, 0xff, 0xff]);
        // ...so the pack is exactly full: stream ID right after the
        // stuffing, control header flush against the end.
        assert_eq!(buf[31], 0x20);
        assert_eq!(&buf[pes::PACK_SIZE - 28..], &ctrl[..]);
    }

    #[test]
    fn exact_fit_needs_no_padding() {
        // 33 + 28 + 1987 == 2048.
        let rle = [0x66; 1987];
        let ctrl = [0x04; 28];
        let buf = packetize_spu(90000, &rle, &ctrl);
        assert_eq!(buf.len(), pes::PACK_SIZE);
        assert_eq!(&buf[pes::PACK_SIZE - 28..], &ctrl[..]);
    }
}
