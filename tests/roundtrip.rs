//! # Integration tests.
//!
//! These tests drive the full write path and then read everything back:
//! captions are packetized into a scratch `.sub`/`.idx` pair, reopened,
//! and compared field by field and byte by byte.

extern crate env_logger;
extern crate subdvd;

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use subdvd::{Config, SubDvd, SubDvdWriter, SubPicture, SubtitleStream,
             DEFAULT_PALETTE, PACK_SIZE};

static TEST_ID: AtomicUsize = AtomicUsize::new(0);

fn scratch_dir() -> PathBuf {
    let mut dir = env::current_exe().unwrap().parent().unwrap().to_path_buf();
    if dir.ends_with("deps") {
        dir.pop();
    }
    let id = TEST_ID.fetch_add(1, Ordering::SeqCst);
    let dir = dir.join("subdvd-tests").join(format!("{}", id));
    if dir.exists() {
        fs::remove_dir_all(&dir).unwrap();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn caption(start_pts: i64, duration: i64) -> SubPicture {
    let mut pic = SubPicture::seed(0, start_pts, 720, 576);
    pic.end_pts = start_pts + duration;
    pic.image_x = 100;
    pic.image_y = 400;
    pic.image_width = 16;
    pic.image_height = 32;
    pic.palette_indices = [0, 1, 2, 3];
    pic.alpha_indices = [0, 15, 15, 15];
    pic
}

#[test]
fn write_then_read_round_trips() {
    let _ = env_logger::try_init();
    let dir = scratch_dir();
    let sub_path = dir.join("movie.sub");
    let idx_path = dir.join("movie.idx");

    let mut config = Config::default();
    config.fix_zero_alpha = true;
    config.language_idx = subdvd::lang::find_by_code("en").unwrap();

    // A small caption that fits one pack.
    let even1: Vec<u8> = (0..12).collect();
    let odd1: Vec<u8> = (12..24).collect();
    let pic1 = caption(90000, 25 * 1024);

    // A forced caption large enough to need three packs.
    let even2: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
    let odd2: Vec<u8> = (0..2500u32).map(|i| (i % 239) as u8).collect();
    let mut pic2 = caption(450000, 100 * 1024);
    pic2.forced = true;
    pic2.alpha_indices = [0, 8, 15, 15];

    // A fully transparent caption; on read it should pick up the alpha of
    // the caption before it.
    let even3: Vec<u8> = vec![0xaa; 30];
    let odd3: Vec<u8> = vec![0x55; 30];
    let mut pic3 = caption(900000, 50 * 1024);
    pic3.alpha_indices = [0, 0, 0, 0];

    let file = fs::File::create(&sub_path).unwrap();
    let mut writer = SubDvdWriter::new(file, DEFAULT_PALETTE, config.clone());
    writer.append(&pic1, &even1, &odd1).unwrap();
    writer.append(&pic2, &even2, &odd2).unwrap();
    writer.append(&pic3, &even3, &odd3).unwrap();
    let entries = writer.entries().to_vec();
    let mut idx_file = fs::File::create(&idx_path).unwrap();
    writer.write_idx(&mut idx_file).unwrap();
    writer.finish().unwrap();

    assert_eq!(entries,
               [(90000, 0), (450000, 2048), (900000, 8192)]);
    let file_bytes = fs::read(&sub_path).unwrap();
    assert_eq!(file_bytes.len(), 10240);
    assert_eq!(file_bytes.len() % PACK_SIZE, 0);

    assert!(subdvd::is_sub_file(&sub_path).unwrap());
    assert!(subdvd::is_idx_file(&idx_path).unwrap());

    let mut stream = SubDvd::open(&sub_path, &idx_path, &config).unwrap();
    assert_eq!(stream.frame_count(), 3);
    assert_eq!(stream.forced_frame_count(), 1);
    assert_eq!(stream.language_idx(), config.language_idx);
    assert_eq!(stream.palette(), &DEFAULT_PALETTE);

    {
        let p1 = stream.sub_picture(0);
        assert_eq!(p1.file_offset, 0);
        assert_eq!(p1.start_pts, 90000);
        assert_eq!(p1.end_pts, 90000 + 25 * 1024);
        assert!(!p1.forced);
        assert_eq!(p1.palette_indices, [0, 1, 2, 3]);
        assert_eq!(p1.alpha_indices, [0, 15, 15, 15]);
        assert_eq!((p1.image_x, p1.image_y), (100, 400));
        assert_eq!((p1.image_width, p1.image_height), (16, 32));
        assert_eq!(p1.rle_size, 24);
        assert_eq!(p1.even_offset, 0);
        assert_eq!(p1.odd_offset, 12);
        assert_eq!(p1.original_alpha(), &[0, 15, 15, 15]);
    }
    {
        let p2 = stream.sub_picture(1);
        assert_eq!(p2.file_offset, 2048);
        assert!(p2.forced);
        assert_eq!(p2.end_pts, 450000 + 100 * 1024);
        assert_eq!(p2.alpha_indices, [0, 8, 15, 15]);
        assert_eq!(p2.rle_size, 5000);
        assert_eq!(p2.even_offset, 0);
        assert_eq!(p2.odd_offset, 2500);
        assert_eq!(p2.rle_fragments.len(), 3);
    }
    {
        // The transparent caption inherited the previous caption's alpha.
        let p3 = stream.sub_picture(2);
        assert_eq!(p3.file_offset, 8192);
        assert_eq!(p3.alpha_indices, [0, 8, 15, 15]);
        assert_eq!(p3.rle_size, 60);
    }

    // Reassembled RLE data matches what the encoder handed the writer.
    stream.decode(0).unwrap();
    let mut expected = even1.clone();
    expected.extend_from_slice(&odd1);
    assert_eq!(stream.rle_data().unwrap(), &expected[..]);

    stream.decode(1).unwrap();
    let mut expected = even2.clone();
    expected.extend_from_slice(&odd2);
    assert_eq!(stream.rle_data().unwrap(), &expected[..]);

    assert!(stream.decode(3).is_err());

    // Re-encoding a parsed caption with the same RLE data reproduces the
    // original bytes.
    let rle_pairs = [(&even1, &odd1), (&even2, &odd2)];
    for (i, pair) in rle_pairs.iter().enumerate() {
        let frame = subdvd::create_sub_frame(stream.sub_picture(i), pair.0,
                                             pair.1, &config).unwrap();
        let start = entries[i].1 as usize;
        assert_eq!(&file_bytes[start..start + frame.len()], &frame[..],
                   "re-encoded caption {} differs", i);
    }

    stream.close();

    // The progress callback sees every caption.
    let mut seen = vec![];
    let stream = SubDvd::open_with_progress(&sub_path, &idx_path, &config,
                                            |done, total| {
                                                seen.push((done, total));
                                            }).unwrap();
    assert_eq!(seen, [(0, 3), (1, 3), (2, 3)]);
    stream.close();
}

#[test]
fn transparent_captions_stay_transparent_without_fixup() {
    let _ = env_logger::try_init();
    let dir = scratch_dir();
    let sub_path = dir.join("movie.sub");
    let idx_path = dir.join("movie.idx");

    let config = Config::default();
    let even: Vec<u8> = vec![0x11; 8];
    let odd: Vec<u8> = vec![0x22; 8];
    let mut pic = caption(90000, 25 * 1024);
    pic.alpha_indices = [0, 0, 0, 0];

    let file = fs::File::create(&sub_path).unwrap();
    let mut writer = SubDvdWriter::new(file, DEFAULT_PALETTE, config.clone());
    writer.append(&pic, &even, &odd).unwrap();
    let mut idx_file = fs::File::create(&idx_path).unwrap();
    writer.write_idx(&mut idx_file).unwrap();
    writer.finish().unwrap();

    let stream = SubDvd::open(&sub_path, &idx_path, &config).unwrap();
    assert_eq!(stream.sub_picture(0).alpha_indices, [0, 0, 0, 0]);
    stream.close();
}
