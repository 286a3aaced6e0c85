//! # MPEG-2 Packetized Elementary Streams (PES)
//!
//! These packets are nested inside the MPEG-2 Program Stream packs found
//! in a `*.sub` file.  Subpictures ride in private stream 1, and only the
//! first pack of a subpicture carries a Presentation Time Stamp.
//!
//! See the [PES header documentation][PES] for details.
//!
//! [PES]: http://dvd.sourceforge.net/dvdinfo/pes-hdr.html

/// Start code of an MPEG-2 Program Stream pack header.
pub const PACK_START_CODE: u32 = 0x0000_01ba;

/// Start code of a private-stream-1 PES packet.
pub const PRIVATE_STREAM_1: u32 = 0x0000_01bd;

/// Start code of a padding PES packet.
pub const PADDING_STREAM: u32 = 0x0000_01be;

/// Size of one Program Stream pack.
pub const PACK_SIZE: usize = 0x800;

/// Largest encodable Presentation Time Stamp (33 bits).
pub const MAX_PTS: u64 = (1 << 33) - 1;

/// Pack header template: start code, a fixed System Clock Reference,
/// multiplexer rate, and a stuffing info byte announcing no stuffing.
pub const PACK_HEADER: [u8; 14] = [
    0x00, 0x00, 0x01, 0xba, // pack start code
    0x44, 0x02, 0xc4, 0x82, 0x04, 0xa9, // system clock reference
    0x01, 0x89, 0xc3, // multiplexer rate
    0xf8, // stuffing info
];

/// PES header template for the first pack of a subpicture.  Bytes 4-5
/// (packet length), 8 (PTS field length), 9-13 (PTS) and 15-18
/// (subpicture size and control-header offset) are filled in per caption.
pub const HEADER_FIRST: [u8; 19] = [
    0x00, 0x00, 0x01, 0xbd, // private stream 1
    0x00, 0x00, // packet length
    0x81, 0x80, // flags: original, PTS present, first pack
    0x05, // PTS field length
    0x00, 0x00, 0x00, 0x00, 0x00, // PTS
    0x20, // stream ID
    0x00, 0x00, // subpicture size in bytes
    0x00, 0x00, // offset to control header
];

/// PES header template for the remaining packs of a subpicture, which
/// carry neither a PTS nor the subpicture size.
pub const HEADER_NEXT: [u8; 10] = [
    0x00, 0x00, 0x01, 0xbd, // private stream 1
    0x00, 0x00, // packet length
    0x81, 0x00, // flags: original, continuation
    0x00, // PTS field length
    0x20, // stream ID
];

/// Encode a 33-bit Presentation Time Stamp into the 5-byte marker-bit
/// layout used by PES headers.
pub fn encode_pts(out: &mut [u8], pts: u64) {
    let pts = pts & MAX_PTS;
    out[0] = ((pts >> 29) & 0x0e) as u8 | 0x21;
    out[1] = (pts >> 22) as u8;
    out[2] = (pts >> 14) as u8 | 1;
    out[3] = (pts >> 7) as u8;
    out[4] = (pts << 1) as u8 | 1;
}

/// Recover a Presentation Time Stamp from its 5-byte PES encoding.
pub fn decode_pts(bytes: &[u8]) -> u64 {
    (u64::from(bytes[0] & 0x0e) << 29)
        | (u64::from(bytes[1]) << 22)
        | (u64::from(bytes[2] & 0xfe) << 14)
        | (u64::from(bytes[3]) << 7)
        | (u64::from(bytes[4]) >> 1)
}

#[test]
fn pts_byte_layout() {
    let mut out = [0; 5];
    encode_pts(&mut out, 2815200);
    assert_eq!(out, [0x21, 0x00, 0xab, 0xe9, 0xc1]);
    assert_eq!(decode_pts(&out), 2815200);
}

#[test]
fn pts_round_trips() {
    for &pts in &[0, 1, 90000, 0x7fff, 2815200, 0xffff_ffff, MAX_PTS] {
        let mut out = [0; 5];
        encode_pts(&mut out, pts);
        assert_eq!(decode_pts(&out), pts, "pts 0x{:x}", pts);
        // Marker bits are always present.
        assert_eq!(out[0] & 0x21, 0x21);
        assert_eq!(out[2] & 1, 1);
        assert_eq!(out[4] & 1, 1);
    }
    // Values beyond 33 bits wrap.
    let mut out = [0; 5];
    encode_pts(&mut out, MAX_PTS + 1);
    assert_eq!(decode_pts(&out), 0);
}
