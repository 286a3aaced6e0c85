//! The `*.sub` portion of VobSub subtitles is packaged in MPEG-2 Program
//! Stream packs, each holding a Packetized Elementary Stream fragment of a
//! subpicture.  We support both directions: reassembling a subpicture from
//! its packs, and splitting one into byte-exact 2048-byte packs.

pub mod pes;
pub mod ps;
