//! The capability set shared by subtitle stream implementations.

use common_failures::prelude::*;

use spu::SubPicture;

/// What every subtitle stream can do once its captions are parsed:
/// decode individual captions and report their timing, position and
/// forced status.  [`SubDvd`](::SubDvd) is the VobSub implementation;
/// rendering the decoded RLE data into pixels is the business of an
/// external image decoder.
///
/// The accessors taking an index panic when it is out of bounds, mirroring
/// slice indexing; `decode` reports the error instead.
pub trait SubtitleStream {
    /// Decode the caption at `index`, making its RLE data current.
    fn decode(&mut self, index: usize) -> Result<()>;

    /// Number of captions in the stream.
    fn frame_count(&self) -> usize;

    /// Number of forced captions found in the stream.
    fn forced_frame_count(&self) -> usize;

    /// Is the caption at `index` forced?
    fn is_forced(&self, index: usize) -> bool;

    /// Start of display in 90 kHz ticks.
    fn start_time(&self, index: usize) -> i64;

    /// End of display in 90 kHz ticks.
    fn end_time(&self, index: usize) -> i64;

    /// Byte offset of the caption in the source file.
    fn start_offset(&self, index: usize) -> u64;

    /// Full metadata of the caption at `index`.
    fn sub_picture(&self, index: usize) -> &SubPicture;

    /// Release the underlying file handle.
    fn close(self) where Self: Sized;
}
