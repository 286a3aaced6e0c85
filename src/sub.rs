//! # SUB/IDX (VobSub) stream handling.
//!
//! `SubDvd` reads a `.sub`/`.idx` pair: the textual index seeds one
//! `SubPicture` per caption, and the binary stream is then walked once,
//! front to back, reassembling every caption's RLE layout and executing
//! its control header.  `SubDvdWriter` is the inverse: it takes captions
//! with already-encoded RLE data, emits the byte-exact pack stream, and
//! remembers where each caption landed so it can write the index sidecar.

use common_failures::prelude::*;
use std::io::prelude::*;
use std::path::Path;

use buffer::ByteBuffer;
use errors::SubDvdError;
use idx::{self, IdxHeader, Index, Palette};
use mpeg2::ps;
use spu::{self, SubPicture};
use stream::SubtitleStream;

/// The knobs the codec actually consumes.  Loading them from a settings
/// file is the caller's business.
#[derive(Debug, Clone)]
pub struct Config {
    /// Reuse the previous caption's alpha values when a caption is fully
    /// transparent.
    pub fix_zero_alpha: bool,
    /// Rows cropped from the top and bottom of the screen on write.
    pub crop_offset_y: u16,
    /// Row of [`LANGUAGES`](::lang::LANGUAGES) to name in the emitted
    /// index file.
    pub language_idx: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            fix_zero_alpha: false,
            crop_offset_y: 0,
            language_idx: 0,
        }
    }
}

/// Read one caption from the `*.sub` stream: reassemble its fragments up
/// to `end_ofs`, then execute the control header.
fn read_sub_frame(pic: &mut SubPicture,
                  end_ofs: u64,
                  buffer: &mut ByteBuffer,
                  header: &IdxHeader,
                  config: &Config,
                  last_alpha: &mut [u8; 4])
                  -> Result<()> {
    let spu = ps::read_spu(buffer, pic, end_ofs, header.stream_id)?;
    spu::parse_control_header(pic,
                              &spu.control,
                              spu.ctrl_ofs_rel,
                              (header.global_x_ofs, header.global_y_ofs),
                              config.fix_zero_alpha,
                              last_alpha)
}

/// A parsed VobSub subtitle stream.
#[derive(Debug)]
pub struct SubDvd {
    header: IdxHeader,
    sub_pictures: Vec<SubPicture>,
    buffer: ByteBuffer,
    num_forced: usize,
    last_rle: Option<Vec<u8>>,
}

impl SubDvd {
    /// Open a `.sub`/`.idx` pair and parse every caption of the active
    /// language.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(sub: P, idx: Q, config: &Config)
                                                -> Result<SubDvd> {
        SubDvd::open_with_progress(sub, idx, config, |_, _| {})
    }

    /// Like [`open`](#method.open), reporting `(done, total)` before each
    /// caption so a caller can drive a progress bar.
    pub fn open_with_progress<P, Q, F>(sub: P,
                                       idx: Q,
                                       config: &Config,
                                       mut progress: F)
                                       -> Result<SubDvd>
        where P: AsRef<Path>,
              Q: AsRef<Path>,
              F: FnMut(usize, usize)
    {
        let index = Index::open(idx)?;
        let Index { header, mut sub_pictures } = index;
        let mut buffer = ByteBuffer::open(sub)?;
        let mut num_forced = 0;
        let mut last_alpha = [0, 15, 15, 15];
        let count = sub_pictures.len();
        for i in 0..count {
            progress(i, count);
            debug!("caption #{} at ofs 0x{:08x}",
                   i + 1, sub_pictures[i].file_offset);
            let end_ofs = if i + 1 < count {
                sub_pictures[i + 1].file_offset
            } else {
                buffer.size()
            };
            read_sub_frame(&mut sub_pictures[i], end_ofs, &mut buffer,
                           &header, config, &mut last_alpha)?;
            if sub_pictures[i].forced {
                num_forced += 1;
            }
        }
        debug!("detected {} forced captions", num_forced);
        Ok(SubDvd {
            header: header,
            sub_pictures: sub_pictures,
            buffer: buffer,
            num_forced: num_forced,
            last_rle: None,
        })
    }

    /// The 16-color palette from the `*.idx` file.
    pub fn palette(&self) -> &Palette {
        &self.header.palette
    }

    /// Row of the stream's language in [`LANGUAGES`](::lang::LANGUAGES).
    pub fn language_idx(&self) -> usize {
        self.header.language_idx
    }

    /// All captions, in stream order.
    pub fn sub_pictures(&self) -> &[SubPicture] {
        &self.sub_pictures
    }

    /// The raw RLE buffer of the most recently decoded caption, ready to
    /// hand to an RLE image decoder.
    pub fn rle_data(&self) -> Option<&[u8]> {
        self.last_rle.as_ref().map(|data| &data[..])
    }
}

impl SubtitleStream for SubDvd {
    fn decode(&mut self, index: usize) -> Result<()> {
        if index >= self.sub_pictures.len() {
            return Err(format_err!("caption index {} out of bounds", index));
        }
        let pic = &self.sub_pictures[index];
        let mut data = Vec::with_capacity(pic.rle_size);
        for fragment in &pic.rle_fragments {
            let start = data.len();
            data.resize(start + fragment.length, 0);
            self.buffer.read_bytes(fragment.offset, &mut data[start..])?;
        }
        self.last_rle = Some(data);
        Ok(())
    }

    fn frame_count(&self) -> usize {
        self.sub_pictures.len()
    }

    fn forced_frame_count(&self) -> usize {
        self.num_forced
    }

    fn is_forced(&self, index: usize) -> bool {
        self.sub_pictures[index].forced
    }

    fn start_time(&self, index: usize) -> i64 {
        self.sub_pictures[index].start_pts
    }

    fn end_time(&self, index: usize) -> i64 {
        self.sub_pictures[index].end_pts
    }

    fn start_offset(&self, index: usize) -> u64 {
        self.sub_pictures[index].file_offset
    }

    fn sub_picture(&self, index: usize) -> &SubPicture {
        &self.sub_pictures[index]
    }

    fn close(self) {
        self.buffer.close()
    }
}

/// Serialize one caption into its Program Stream representation.  `even`
/// and `odd` are the pre-encoded RLE field buffers; the result is a
/// multiple of 2048 bytes, ready to append to a `.sub` file.
pub fn create_sub_frame(pic: &SubPicture,
                        even: &[u8],
                        odd: &[u8],
                        config: &Config)
                        -> Result<Vec<u8>> {
    let ctrl = spu::build_control_header(pic, even.len(), odd.len(),
                                         config.crop_offset_y);
    if even.len() + odd.len() + 4 + ctrl.len() > 0xffff {
        return Err(SubDvdError::format(
            format!("caption RLE data too large: {} bytes",
                    even.len() + odd.len())).into());
    }
    let mut rle = Vec::with_capacity(even.len() + odd.len());
    rle.extend_from_slice(even);
    rle.extend_from_slice(odd);
    Ok(ps::packetize_spu(pic.start_pts, &rle, &ctrl))
}

/// Writes a VobSub stream caption by caption and keeps the
/// `(start_pts, file_offset)` ledger the index sidecar is built from.
#[derive(Debug)]
pub struct SubDvdWriter<W: Write> {
    out: W,
    config: Config,
    palette: Palette,
    entries: Vec<(i64, u64)>,
    offset: u64,
    last_pic: Option<SubPicture>,
}

impl<W: Write> SubDvdWriter<W> {
    /// Create a writer emitting the `.sub` byte stream into `out`.
    pub fn new(out: W, palette: Palette, config: Config) -> SubDvdWriter<W> {
        SubDvdWriter {
            out: out,
            config: config,
            palette: palette,
            entries: vec![],
            offset: 0,
            last_pic: None,
        }
    }

    /// Append one caption with its pre-encoded even/odd RLE buffers.
    pub fn append(&mut self, pic: &SubPicture, even: &[u8], odd: &[u8])
                  -> Result<()> {
        let frame = create_sub_frame(pic, even, odd, &self.config)?;
        self.out.write_all(&frame)?;
        self.entries.push((pic.start_pts, self.offset));
        self.offset += frame.len() as u64;
        self.last_pic = Some(pic.clone());
        Ok(())
    }

    /// The `(start_pts, file_offset)` ledger of everything appended so
    /// far.
    pub fn entries(&self) -> &[(i64, u64)] {
        &self.entries
    }

    /// Emit the `*.idx` sidecar for the captions written so far.
    pub fn write_idx<S: Write>(&self, out: &mut S) -> Result<()> {
        let pic = self.last_pic.as_ref()
            .ok_or_else(|| format_err!("no captions written yet"))?;
        idx::write_idx(out, pic, &self.entries, &self.palette, &self.config)
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}
