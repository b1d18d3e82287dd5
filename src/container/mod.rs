//! Encoded-blocked container (C3) — the on-disk binary format: fixed tail
//! header, packet-framed brick payloads, and a block directory.
//!
//! # On-disk layout (little-endian throughout)
//!
//! ```text
//! [payload packets ...............................]
//! [BlockInfo × directory_count]   ← at directory_offset
//! [Header (128 B)]                ← file tail, fixed size
//! ```
//!
//! A brick's payload is a sequence of framed packets: repeated
//! `len:u64 · bytes[len]`. The writer appends bricks strictly sequentially —
//! there is no in-place update, and rewriting an index is a fatal error
//! ([`VolumeError::DuplicateWrite`]). The reader loads the tail header and
//! the directory once on open and serves `read_block` calls from the
//! resulting in-memory map.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::VolumeError;
use crate::voxel::BlockIndex;

pub const MAGIC: u64 = 0x7fff_febf;
pub const HEADER_SIZE: usize = 128;
pub const BLOCK_INFO_SIZE: usize = 64;

/// Pack `(major, minor, patch)` into the single `u64` the header stores.
pub fn pack_version(major: u32, minor: u16, patch: u16) -> u64 {
    ((major as u64) << 32) | ((minor as u64) << 16) | (patch as u64)
}

pub const CURRENT_VERSION: u64 = 0x0001_0000_0000; // pack_version(1, 0, 0)

/// Fixed 128-byte tail header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub magic: u64,
    pub version: u64,
    pub block_length: u32,
    pub padding: u32,
    pub directory_offset: u64,
    pub directory_count: u32,
    pub directory_bytes: u32,
}

impl Header {
    pub fn write<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        let mut buf = [0u8; HEADER_SIZE];
        let mut pos = 0;

        macro_rules! put_u64 {
            ($v:expr) => {{
                buf[pos..pos + 8].copy_from_slice(&($v as u64).to_le_bytes());
                pos += 8;
            }};
        }
        macro_rules! put_u32 {
            ($v:expr) => {{
                buf[pos..pos + 4].copy_from_slice(&($v as u32).to_le_bytes());
                pos += 4;
            }};
        }

        put_u64!(self.magic);
        put_u64!(self.version);
        put_u32!(self.block_length);
        put_u32!(self.padding);
        put_u64!(self.directory_offset);
        put_u32!(self.directory_count);
        put_u32!(self.directory_bytes);
        // remaining 88 bytes stay zeroed (reserved).
        debug_assert_eq!(pos, 40);

        w.write_all(&buf)
    }

    pub fn read<R: Read>(mut r: R) -> Result<Self, VolumeError> {
        let mut buf = [0u8; HEADER_SIZE];
        r.read_exact(&mut buf).map_err(VolumeError::Io)?;

        let magic = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        if magic != MAGIC {
            return Err(VolumeError::FileFormat(format!(
                "bad container magic: expected {MAGIC:#x}, got {magic:#x}"
            )));
        }
        let version = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        if version != CURRENT_VERSION {
            return Err(VolumeError::FileFormat(format!(
                "unsupported container version {version:#x}"
            )));
        }
        let block_length = u32::from_le_bytes(buf[16..20].try_into().unwrap());
        let padding = u32::from_le_bytes(buf[20..24].try_into().unwrap());
        let directory_offset = u64::from_le_bytes(buf[24..32].try_into().unwrap());
        let directory_count = u32::from_le_bytes(buf[32..36].try_into().unwrap());
        let directory_bytes = u32::from_le_bytes(buf[36..40].try_into().unwrap());

        Ok(Self {
            magic,
            version,
            block_length,
            padding,
            directory_offset,
            directory_count,
            directory_bytes,
        })
    }
}

/// One 64-byte directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub index: BlockIndex,
    pub offset: u64,
    pub size: u64,
    pub packet_count: u64,
}

impl BlockInfo {
    pub fn write<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        let mut buf = [0u8; BLOCK_INFO_SIZE];
        buf[0..4].copy_from_slice(&self.index.bx.to_le_bytes());
        buf[4..8].copy_from_slice(&self.index.by.to_le_bytes());
        buf[8..12].copy_from_slice(&self.index.bz.to_le_bytes());
        buf[12..20].copy_from_slice(&self.offset.to_le_bytes());
        buf[20..28].copy_from_slice(&self.size.to_le_bytes());
        buf[28..36].copy_from_slice(&self.packet_count.to_le_bytes());
        // remaining 28 bytes stay zeroed (reserved).
        w.write_all(&buf)
    }

    pub fn read<R: Read>(mut r: R) -> std::io::Result<Self> {
        let mut buf = [0u8; BLOCK_INFO_SIZE];
        r.read_exact(&mut buf)?;
        let bx = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let by = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let bz = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let offset = u64::from_le_bytes(buf[12..20].try_into().unwrap());
        let size = u64::from_le_bytes(buf[20..28].try_into().unwrap());
        let packet_count = u64::from_le_bytes(buf[28..36].try_into().unwrap());
        Ok(Self { index: BlockIndex::new(bx, by, bz), offset, size, packet_count })
    }
}

/// Writer lifecycle: `Open → AppendingBricks → Closing → Closed`.
/// `write_block` is only legal in `AppendingBricks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    AppendingBricks,
    Closed,
}

/// Sequential-append writer for the encoded-blocked container.
///
/// Bricks may be written in any order, but the underlying file handle uses a
/// single monotonically advancing `tellp`-style cursor: no seeks into the
/// body region happen during `AppendingBricks`.
pub struct EncodedBlockedWriter {
    file: File,
    block_length: u32,
    padding: u32,
    cursor: u64,
    directory: Vec<BlockInfo>,
    seen: HashMap<BlockIndex, ()>,
    state: WriterState,
}

impl EncodedBlockedWriter {
    pub fn create(path: impl AsRef<Path>, block_length: u32, padding: u32) -> Result<Self, VolumeError> {
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
        tracing::info!(path = %path_ref.display(), block_length, padding, "opened encoded-blocked container for writing");
        Ok(Self {
            file,
            block_length,
            padding,
            cursor: 0,
            directory: Vec::new(),
            seen: HashMap::new(),
            state: WriterState::AppendingBricks,
        })
    }

    /// Write framed packets for `index`. Rejects a duplicate index without
    /// touching the file.
    pub fn write_block(&mut self, index: BlockIndex, packets: &[Vec<u8>]) -> Result<(), VolumeError> {
        if self.state != WriterState::AppendingBricks {
            return Err(VolumeError::Precondition(
                "write_block called outside the AppendingBricks state".into(),
            ));
        }
        if self.seen.contains_key(&index) {
            return Err(VolumeError::DuplicateWrite(index));
        }

        let offset = self.cursor;
        let mut size = 0u64;
        for p in packets {
            let len = p.len() as u64;
            self.file.write_all(&len.to_le_bytes()).map_err(VolumeError::Io)?;
            self.file.write_all(p).map_err(VolumeError::Io)?;
            size += 8 + len;
        }
        self.cursor += size;

        self.directory.push(BlockInfo {
            index,
            offset,
            size,
            packet_count: packets.len() as u64,
        });
        self.seen.insert(index, ());
        Ok(())
    }

    /// Write the directory then the header, and stop accepting writes.
    pub fn close(mut self) -> Result<(), VolumeError> {
        let directory_offset = self.cursor;
        for info in &self.directory {
            info.write(&mut self.file).map_err(VolumeError::Io)?;
        }
        let directory_bytes = (self.directory.len() * BLOCK_INFO_SIZE) as u32;

        let header = Header {
            magic: MAGIC,
            version: CURRENT_VERSION,
            block_length: self.block_length,
            padding: self.padding,
            directory_offset,
            directory_count: self.directory.len() as u32,
            directory_bytes,
        };
        header.write(&mut self.file).map_err(VolumeError::Io)?;
        self.state = WriterState::Closed;
        tracing::info!(blocks = self.directory.len(), directory_offset, "closed encoded-blocked container");
        Ok(())
    }
}

/// Random-access reader for the encoded-blocked container.
///
/// Loads the tail header and the full directory on open; every subsequent
/// `read_block` is a single seek-and-read against the payload region.
pub struct EncodedBlockedReader {
    file: File,
    header: Header,
    directory: HashMap<BlockIndex, BlockInfo>,
}

impl EncodedBlockedReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VolumeError> {
        let path_ref = path.as_ref();
        let mut file = File::open(path_ref).map_err(|e| VolumeError::FileOpen {
            path: path_ref.display().to_string(),
            mode: "read",
            source: e,
        })?;

        let file_len = file.metadata().map_err(VolumeError::Io)?.len();
        if file_len < HEADER_SIZE as u64 {
            return Err(VolumeError::FileFormat("file is shorter than the container header".into()));
        }

        file.seek(SeekFrom::Start(file_len - HEADER_SIZE as u64)).map_err(VolumeError::Io)?;
        let header = Header::read(&mut file)?;

        // Open question #3 (see DESIGN.md): size the directory vector by
        // directory_count records, not by a byte count, and read exactly
        // directory_count * BLOCK_INFO_SIZE bytes.
        file.seek(SeekFrom::Start(header.directory_offset)).map_err(VolumeError::Io)?;
        let mut directory = HashMap::with_capacity(header.directory_count as usize);
        for _ in 0..header.directory_count {
            let info = BlockInfo::read(&mut file).map_err(VolumeError::Io)?;
            directory.insert(info.index, info);
        }

        tracing::info!(blocks = directory.len(), path = %path_ref.display(), "opened encoded-blocked container");
        Ok(Self { file, header, directory })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn directory_count(&self) -> usize {
        self.directory.len()
    }

    pub fn contains(&self, index: BlockIndex) -> bool {
        self.directory.contains_key(&index)
    }

    /// Read the raw framed-packet byte run for `index`. Missing indices
    /// return an empty vector rather than an error (callers must treat
    /// absent bricks as all-zero voxels).
    pub fn read_block_raw(&mut self, index: BlockIndex) -> Result<Vec<u8>, VolumeError> {
        let Some(info) = self.directory.get(&index).copied() else {
            return Ok(Vec::new());
        };
        self.file.seek(SeekFrom::Start(info.offset)).map_err(VolumeError::Io)?;
        let mut buf = vec![0u8; info.size as usize];
        self.file.read_exact(&mut buf).map_err(VolumeError::Io)?;
        Ok(buf)
    }

    /// Read `index` and split the byte run back into its framed packets.
    /// The total consumed bytes must equal `info.size` exactly.
    pub fn read_block_packets(&mut self, index: BlockIndex) -> Result<Vec<Vec<u8>>, VolumeError> {
        let raw = self.read_block_raw(index)?;
        if raw.is_empty() && !self.directory.contains_key(&index) {
            return Ok(Vec::new());
        }

        let mut packets = Vec::new();
        let mut pos = 0usize;
        while pos < raw.len() {
            if pos + 8 > raw.len() {
                return Err(VolumeError::FileFormat(format!(
                    "truncated packet length word for block {index} at offset {pos}"
                )));
            }
            let len = u64::from_le_bytes(raw[pos..pos + 8].try_into().unwrap()) as usize;
            pos += 8;
            if pos + len > raw.len() {
                return Err(VolumeError::FileFormat(format!(
                    "packet for block {index} claims {len} bytes but only {} remain",
                    raw.len() - pos
                )));
            }
            packets.push(raw[pos..pos + len].to_vec());
            pos += len;
        }
        debug_assert_eq!(pos, raw.len(), "packet framing must consume exactly info.size bytes");
        Ok(packets)
    }
}
