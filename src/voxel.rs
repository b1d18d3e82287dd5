//! Voxel & descriptor model — type/format identity, extent, spacing, and the
//! validation predicates every other component calls before touching a file.
//!
//! # Supported voxel kinds
//! The core pipeline only ever materialises `{u8, R}` and `{u16, R}` voxels.
//! `VoxelType::Float32` and every format other than `R` are representable in
//! the enums (sidecars from other tools may name them) but `check_valid`
//! rejects them for any descriptor this crate is asked to open or create.

use std::fmt;
use thiserror::Error;

/// Sample type of a single voxel channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum VoxelType {
    Unknown,
    U8,
    U16,
    F32,
}

impl VoxelType {
    /// Bits per sample, or 0 for `Unknown`.
    pub fn bits_per_sample(self) -> u32 {
        match self {
            VoxelType::Unknown => 0,
            VoxelType::U8 => 8,
            VoxelType::U16 => 16,
            VoxelType::F32 => 32,
        }
    }

    pub fn bytes_per_sample(self) -> u32 {
        self.bits_per_sample() / 8
    }
}

impl fmt::Display for VoxelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VoxelType::Unknown => "unknown",
            VoxelType::U8 => "uint8",
            VoxelType::U16 => "uint16",
            VoxelType::F32 => "float32",
        };
        f.write_str(s)
    }
}

/// Channel layout of a voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum VoxelFormat {
    None,
    R,
    Rg,
    Rgb,
    Rgba,
}

impl VoxelFormat {
    pub fn samples_per_pixel(self) -> u32 {
        match self {
            VoxelFormat::None => 0,
            VoxelFormat::R => 1,
            VoxelFormat::Rg => 2,
            VoxelFormat::Rgb => 3,
            VoxelFormat::Rgba => 4,
        }
    }
}

/// `{type, format}` pair identifying the byte layout of one voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct VoxelInfo {
    pub voxel_type: VoxelType,
    pub voxel_format: VoxelFormat,
}

impl VoxelInfo {
    pub fn new(voxel_type: VoxelType, voxel_format: VoxelFormat) -> Self {
        Self { voxel_type, voxel_format }
    }

    /// `true` for the two voxel kinds the core pipeline actually processes.
    pub fn is_core_supported(self) -> bool {
        matches!(
            (self.voxel_type, self.voxel_format),
            (VoxelType::U8, VoxelFormat::R) | (VoxelType::U16, VoxelFormat::R)
        )
    }
}

/// Bytes occupied by one voxel of `info`.
pub fn voxel_size(info: VoxelInfo) -> u64 {
    (info.voxel_type.bytes_per_sample() * info.voxel_format.samples_per_pixel()) as u64
}

pub fn samples_per_pixel(format: VoxelFormat) -> u32 {
    format.samples_per_pixel()
}

pub fn bits_per_sample(ty: VoxelType) -> u32 {
    ty.bits_per_sample()
}

/// Voxel-grid extent in voxels. All three dimensions are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        Self { width, height, depth }
    }

    /// Total voxel count. Checked against overflow of 64 bits by construction
    /// (three u32 factors can never overflow u64).
    pub fn voxel_count(self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }

    pub fn is_valid(self) -> bool {
        self.width > 0 && self.height > 0 && self.depth > 0
    }
}

/// Physical spacing between voxel centers along each axis. Units are opaque
/// to the engine (millimetres, microns, whatever the source instrument used).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Spacing {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Spacing {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_valid(self) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.z >= 0.0
    }
}

impl Default for Spacing {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0, z: 1.0 }
    }
}

/// Unsigned `(bx, by, bz)` triple identifying one brick in the blocked grid.
/// Hashable and totally ordered so it can key a directory map or a `BTreeMap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct BlockIndex {
    pub bx: u32,
    pub by: u32,
    pub bz: u32,
}

impl BlockIndex {
    pub fn new(bx: u32, by: u32, bz: u32) -> Self {
        Self { bx, by, bz }
    }
}

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.bx, self.by, self.bz)
    }
}

/// Sentinel `BlockIndex` marking an unused directory slot on disk.
pub const INVALID_BLOCK_INDEX: u32 = 0x7f7f_7f7f;

/// Descriptor for the encoded-blocked representation (C3/C4).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EncodedBlockedDesc {
    pub voxel_info: VoxelInfo,
    pub extent: Extent,
    pub spacing: Spacing,
    pub block_length: u32,
    pub padding: u32,
    pub data_path: String,
}

impl EncodedBlockedDesc {
    /// Padded brick side `B = L + 2P`.
    pub fn brick_size(&self) -> u32 {
        self.block_length + 2 * self.padding
    }

    /// Blocked grid dimensions, each computed via ceiling division so a
    /// partial brick at the volume edge still gets a slot.
    pub fn grid_size(&self) -> (u32, u32, u32) {
        let l = self.block_length;
        (
            ceil_div(self.extent.width, l),
            ceil_div(self.extent.height, l),
            ceil_div(self.extent.depth, l),
        )
    }
}

/// Descriptor for the raw representation (C5).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawDesc {
    pub voxel_info: VoxelInfo,
    pub extent: Extent,
    pub spacing: Spacing,
    pub data_path: String,
}

/// Which axis a sliced volume is indexed along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SliceAxis {
    X,
    Y,
    Z,
}

/// Descriptor for the sliced representation (C5).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SlicedDesc {
    pub voxel_info: VoxelInfo,
    pub extent: Extent,
    pub spacing: Spacing,
    pub data_path: String,
    pub axis: SliceAxis,
    pub prefix: String,
    pub postfix: String,
    pub setw: u32,
}

impl SlicedDesc {
    /// Derive the on-disk filename for slice `i`: `prefix + pad(i, setw) + postfix + ".tif"`.
    pub fn slice_name(&self, i: u32) -> String {
        format!(
            "{}{:0width$}{}.tif",
            self.prefix,
            i,
            self.postfix,
            width = self.setw as usize,
        )
    }

    /// Number of slices along the indexed axis.
    pub fn slice_count(&self) -> u32 {
        match self.axis {
            SliceAxis::X => self.extent.width,
            SliceAxis::Y => self.extent.height,
            SliceAxis::Z => self.extent.depth,
        }
    }
}

fn ceil_div(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("extent {0:?} has a non-positive dimension")]
    InvalidExtent(Extent),
    #[error("spacing {0:?} has a negative component")]
    InvalidSpacing(Spacing),
    #[error("block_length {0} must be even and non-zero")]
    InvalidBlockLength(u32),
    #[error("data_path is empty")]
    EmptyDataPath,
    #[error("voxel kind {0:?} is not supported by the core pipeline")]
    UnsupportedVoxelInfo(VoxelInfo),
}

pub fn check_valid_extent(extent: Extent) -> Result<(), DescriptorError> {
    if !extent.is_valid() {
        return Err(DescriptorError::InvalidExtent(extent));
    }
    Ok(())
}

pub fn check_valid_spacing(spacing: Spacing) -> Result<(), DescriptorError> {
    if !spacing.is_valid() {
        return Err(DescriptorError::InvalidSpacing(spacing));
    }
    Ok(())
}

pub fn check_valid_encoded_blocked(desc: &EncodedBlockedDesc) -> Result<(), DescriptorError> {
    check_valid_extent(desc.extent)?;
    check_valid_spacing(desc.spacing)?;
    if desc.block_length == 0 || desc.block_length % 2 != 0 {
        return Err(DescriptorError::InvalidBlockLength(desc.block_length));
    }
    if desc.data_path.is_empty() {
        return Err(DescriptorError::EmptyDataPath);
    }
    if !desc.voxel_info.is_core_supported() {
        return Err(DescriptorError::UnsupportedVoxelInfo(desc.voxel_info));
    }
    Ok(())
}

pub fn check_valid_raw(desc: &RawDesc) -> Result<(), DescriptorError> {
    check_valid_extent(desc.extent)?;
    check_valid_spacing(desc.spacing)?;
    if desc.data_path.is_empty() {
        return Err(DescriptorError::EmptyDataPath);
    }
    if !desc.voxel_info.is_core_supported() {
        return Err(DescriptorError::UnsupportedVoxelInfo(desc.voxel_info));
    }
    Ok(())
}

pub fn check_valid_sliced(desc: &SlicedDesc) -> Result<(), DescriptorError> {
    check_valid_extent(desc.extent)?;
    check_valid_spacing(desc.spacing)?;
    if desc.data_path.is_empty() {
        return Err(DescriptorError::EmptyDataPath);
    }
    if !desc.voxel_info.is_core_supported() {
        return Err(DescriptorError::UnsupportedVoxelInfo(desc.voxel_info));
    }
    Ok(())
}
