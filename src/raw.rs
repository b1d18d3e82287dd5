//! Raw volume I/O adapter (C5) — a monolithic voxel dump addressed by plain
//! `seek`/`read_exact`/`write_all` against a heap-backed `File` handle.
//!
//! The source this crate is modelled after backs this representation with a
//! platform memory-map; that is an optimisation, not a semantic requirement,
//! and is not reproduced here — a portable implementation only needs
//! positioned reads and writes.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::VolumeError;
use crate::region::VoxelWindow;
use crate::voxel::{voxel_size, Extent, VoxelInfo};

fn voxel_offset(extent: Extent, x: i64, y: i64, z: i64, voxel_bytes: u64) -> u64 {
    let w = extent.width as i64;
    let h = extent.height as i64;
    ((z * h + y) * w + x) as u64 * voxel_bytes
}

/// Sequential-access reader over a monolithic raw voxel dump.
pub struct RawReader {
    file: File,
    extent: Extent,
    voxel_bytes: u64,
}

impl RawReader {
    pub fn open(path: impl AsRef<Path>, extent: Extent, voxel_info: VoxelInfo) -> Result<Self, VolumeError> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref).map_err(|e| VolumeError::FileOpen {
            path: path_ref.display().to_string(),
            mode: "read",
            source: e,
        })?;
        Ok(Self { file, extent, voxel_bytes: voxel_size(voxel_info) })
    }

    /// For every `(z, y)` line in `window ∩ [0, extent)`, seek once and read
    /// the whole `[begX, endX)` run, then hand each voxel to `sink` with
    /// window-relative coordinates.
    pub fn read_window(&mut self, window: &VoxelWindow, mut sink: impl FnMut(u64, u64, u64, &[u8])) -> Result<(), VolumeError> {
        let clamped = window.clamped((self.extent.width, self.extent.height, self.extent.depth));
        let voxel_bytes = self.voxel_bytes as usize;
        let run_voxels = (clamped.x1 - clamped.x0) as usize;
        if run_voxels == 0 {
            return Ok(());
        }
        let mut line = vec![0u8; run_voxels * voxel_bytes];

        for z in clamped.z0..clamped.z1 {
            for y in clamped.y0..clamped.y1 {
                let offset = voxel_offset(self.extent, clamped.x0, y, z, self.voxel_bytes);
                self.file.seek(SeekFrom::Start(offset)).map_err(VolumeError::Io)?;
                self.file.read_exact(&mut line).map_err(VolumeError::Io)?;
                for (i, chunk) in line.chunks_exact(voxel_bytes).enumerate() {
                    let x = clamped.x0 + i as i64;
                    sink((x - window.x0) as u64, (y - window.y0) as u64, (z - window.z0) as u64, chunk);
                }
            }
        }
        Ok(())
    }

    /// Convenience overload: copy `window ∩ [0, extent)` into `dst`, a dense
    /// buffer laid out row-major over the unclamped window.
    pub fn read_window_into(&mut self, window: &VoxelWindow, dst: &mut [u8]) -> Result<(), VolumeError> {
        let voxel_bytes = self.voxel_bytes as usize;
        let dst_w = (window.x1 - window.x0) as u64;
        let dst_h = (window.y1 - window.y0) as u64;
        self.read_window(window, |x, y, z, voxel| {
            let off = (((z * dst_h + y) * dst_w + x) as usize) * voxel_bytes;
            dst[off..off + voxel_bytes].copy_from_slice(voxel);
        })
    }
}

/// Sequential-access writer over a monolithic raw voxel dump. Preallocates
/// the full file to `extent.voxel_count() * voxel_size` bytes on creation.
pub struct RawWriter {
    file: File,
    extent: Extent,
    voxel_bytes: u64,
}

impl RawWriter {
    pub fn create(path: impl AsRef<Path>, extent: Extent, voxel_info: VoxelInfo) -> Result<Self, VolumeError> {
        let path_ref = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path_ref)
            .map_err(|e| VolumeError::FileOpen {
                path: path_ref.display().to_string(),
                mode: "write",
                source: e,
            })?;
        let voxel_bytes = voxel_size(voxel_info);
        file.set_len(extent.voxel_count() * voxel_bytes).map_err(VolumeError::Io)?;
        Ok(Self { file, extent, voxel_bytes })
    }

    /// For every `(z, y)` line in `window ∩ [0, extent)`, build the line from
    /// `source(x, y, z)` (absolute volume coordinates) and write it with a
    /// single seek-then-write.
    pub fn write_window(&mut self, window: &VoxelWindow, mut source: impl FnMut(i64, i64, i64) -> Vec<u8>) -> Result<(), VolumeError> {
        let clamped = window.clamped((self.extent.width, self.extent.height, self.extent.depth));
        let voxel_bytes = self.voxel_bytes as usize;
        let run_voxels = (clamped.x1 - clamped.x0) as usize;
        if run_voxels == 0 {
            return Ok(());
        }
        let mut line = vec![0u8; run_voxels * voxel_bytes];

        for z in clamped.z0..clamped.z1 {
            for y in clamped.y0..clamped.y1 {
                for (i, chunk) in line.chunks_exact_mut(voxel_bytes).enumerate() {
                    let x = clamped.x0 + i as i64;
                    let voxel = source(x, y, z);
                    chunk.copy_from_slice(&voxel[..voxel_bytes]);
                }
                let offset = voxel_offset(self.extent, clamped.x0, y, z, self.voxel_bytes);
                self.file.seek(SeekFrom::Start(offset)).map_err(VolumeError::Io)?;
                self.file.write_all(&line).map_err(VolumeError::Io)?;
            }
        }
        Ok(())
    }

    /// Convenience overload: write `window ∩ [0, extent)` from `src`, a dense
    /// buffer laid out row-major over the unclamped window.
    pub fn write_window_from(&mut self, window: &VoxelWindow, src: &[u8]) -> Result<(), VolumeError> {
        let voxel_bytes = self.voxel_bytes as usize;
        let src_w = (window.x1 - window.x0) as i64;
        let src_h = (window.y1 - window.y0) as i64;
        self.write_window(window, |x, y, z| {
            let lx = x - window.x0;
            let ly = y - window.y0;
            let lz = z - window.z0;
            let off = (((lz * src_h + ly) * src_w + lx) as usize) * voxel_bytes;
            src[off..off + voxel_bytes].to_vec()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::{VoxelFormat, VoxelType};
    use tempfile::NamedTempFile;

    fn info() -> VoxelInfo {
        VoxelInfo::new(VoxelType::U8, VoxelFormat::R)
    }

    #[test]
    fn write_then_read_constant_volume() {
        // S1: extent {4,4,2}, all voxels 0x42, a 4x4x2 window fills 32 bytes.
        let tmp = NamedTempFile::new().unwrap();
        let extent = Extent::new(4, 4, 2);
        let mut w = RawWriter::create(tmp.path(), extent, info()).unwrap();
        let window = VoxelWindow::new(0, 0, 0, 4, 4, 2).unwrap();
        w.write_window(&window, |_, _, _| vec![0x42u8]).unwrap();
        drop(w);

        let file_size = std::fs::metadata(tmp.path()).unwrap().len();
        assert_eq!(file_size, 32);

        let mut r = RawReader::open(tmp.path(), extent, info()).unwrap();
        let mut buf = vec![0u8; 32];
        r.read_window_into(&window, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0x42));
    }

    #[test]
    fn out_of_window_voxels_are_clamped_silently() {
        let tmp = NamedTempFile::new().unwrap();
        let extent = Extent::new(4, 4, 2);
        let mut w = RawWriter::create(tmp.path(), extent, info()).unwrap();
        let window = VoxelWindow::new(0, 0, 0, 4, 4, 2).unwrap();
        w.write_window(&window, |x, _, _| vec![x as u8]).unwrap();
        drop(w);

        let mut r = RawReader::open(tmp.path(), extent, info()).unwrap();
        let oversized = VoxelWindow::new(-2, -2, 0, 6, 6, 2).unwrap();
        let mut seen = Vec::new();
        r.read_window(&oversized, |_, _, _, v| seen.push(v[0])).unwrap();
        assert_eq!(seen.len(), 4 * 4 * 2);
    }
}
