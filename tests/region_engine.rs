//! Full brick round-trips through the real HEVC codec. Needs a working
//! FFmpeg install at test time, unlike codec::tests::pixel_format_mapping.

use volumetric::codec::HevcBrickCodec;
use volumetric::container::{EncodedBlockedReader, EncodedBlockedWriter};
use volumetric::region::{RegionReader, RegionWriter, VoxelWindow};
use volumetric::voxel::{BlockIndex, EncodedBlockedDesc, Extent, Spacing, VoxelFormat, VoxelInfo, VoxelType};
use tempfile::NamedTempFile;

fn desc(path: &str, extent: Extent, block_length: u32, padding: u32) -> EncodedBlockedDesc {
    EncodedBlockedDesc {
        voxel_info: VoxelInfo::new(VoxelType::U8, VoxelFormat::R),
        extent,
        spacing: Spacing::default(),
        block_length,
        padding,
        data_path: path.into(),
    }
}

#[test]
fn flat_brick_window_round_trips_exactly_through_hevc() {
    // Invariant 1 only promises exactness for flat regions with default
    // settings — the encoded-blocked format is lossy by construction, so
    // this is the one shape of input where assert_eq! against the codec's
    // output is a claim the format actually makes.
    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap();
    let d = desc(path, Extent::new(8, 8, 8), 8, 2);

    let mut writer = EncodedBlockedWriter::create(path, d.block_length, d.padding).unwrap();
    let mut codec = HevcBrickCodec::default();
    let window = VoxelWindow::new(0, 0, 0, 8, 8, 8).unwrap();
    RegionWriter::new(&mut writer, &d).write_window(&window, &mut codec, |_, _, _| vec![200u8]).unwrap();
    writer.close().unwrap();

    let mut reader = EncodedBlockedReader::open(path).unwrap();
    assert_eq!(reader.directory_count(), 1);
    assert!(reader.contains(BlockIndex::new(0, 0, 0)));

    let mut codec = HevcBrickCodec::default();
    let mut seen = vec![0u8; 8 * 8 * 8];
    RegionReader::new(&mut reader, &d)
        .read_window_into(&window, &mut codec, &mut seen)
        .unwrap();

    for (idx, &v) in seen.iter().enumerate() {
        assert_eq!(v, 200u8, "mismatch at flattened index {idx}");
    }
}

#[test]
fn varying_brick_window_round_trips_through_hevc_within_tolerance() {
    // A ramp isn't flat, so the format makes no exactness promise here; this
    // only checks that the lossy round-trip stays within a generous error
    // bound rather than producing garbage.
    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap();
    let d = desc(path, Extent::new(8, 8, 8), 8, 2);

    let mut writer = EncodedBlockedWriter::create(path, d.block_length, d.padding).unwrap();
    let mut codec = HevcBrickCodec::default();
    let window = VoxelWindow::new(0, 0, 0, 8, 8, 8).unwrap();
    RegionWriter::new(&mut writer, &d).write_window(&window, &mut codec, |x, y, z| vec![((x + y + z) % 251) as u8]).unwrap();
    writer.close().unwrap();

    let mut reader = EncodedBlockedReader::open(path).unwrap();
    let mut codec = HevcBrickCodec::default();
    let mut seen = vec![0u8; 8 * 8 * 8];
    RegionReader::new(&mut reader, &d)
        .read_window_into(&window, &mut codec, &mut seen)
        .unwrap();

    const MAX_ABS_ERROR: i32 = 40;
    for z in 0..8i64 {
        for y in 0..8i64 {
            for x in 0..8i64 {
                let idx = ((z * 8 + y) * 8 + x) as usize;
                let expected = ((x + y + z) % 251) as i32;
                let actual = seen[idx] as i32;
                assert!(
                    (actual - expected).abs() <= MAX_ABS_ERROR,
                    "voxel ({x},{y},{z}) drifted too far: expected {expected}, got {actual}"
                );
            }
        }
    }
}

#[test]
fn partial_window_only_touches_overlapping_bricks() {
    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap();
    let d = desc(path, Extent::new(16, 16, 16), 8, 1);

    let mut writer = EncodedBlockedWriter::create(path, d.block_length, d.padding).unwrap();
    let mut codec = HevcBrickCodec::default();
    let window = VoxelWindow::new(0, 0, 0, 9, 9, 9).unwrap();
    RegionWriter::new(&mut writer, &d).write_window(&window, &mut codec, |_, _, _| vec![42u8]).unwrap();
    writer.close().unwrap();

    let mut reader = EncodedBlockedReader::open(path).unwrap();
    // A 9-voxel window with an 8-long block and a 1-voxel pad touches bricks
    // (0,0,0) and (1,0,0)/(0,1,0)/(0,0,1) etc, not the full 2x2x2 grid.
    assert!(reader.directory_count() >= 1);
    assert!(reader.directory_count() < 8);
}
