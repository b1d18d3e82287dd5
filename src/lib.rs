//! # voxelcy — encoded-blocked volume container and conversion pipeline
//!
//! Three interchangeable volume representations share one descriptor model:
//! - **Raw**: a monolithic voxel dump plus a JSON sidecar
//! - **Sliced**: a directory of single-channel TIFF slices plus a sidecar
//! - **Encoded-blocked**: cubic bricks, HEVC-encoded, in a custom container
//!   with a fixed-size tail header and a flat block directory
//!
//! Guarantees:
//! - All three representations expose the same windowed read/write contract
//!   (`VoxelWindow`-addressed, half-open, clamped to `[0, extent)`)
//! - The encoded-blocked container's header is read from the tail, never the
//!   head, so a writer can append blocks without knowing the final directory
//!   size up front
//! - A brick's padded range always decodes/encodes in full; out-of-volume
//!   padding voxels are defined to be zero, so a never-written brick can
//!   stand in for an all-zero scratch buffer
//! - `Processor` performs one streaming pass per `convert()` call, one
//!   source plane (two, for a down-sampling target) resident at a time

pub mod codec;
pub mod container;
pub mod descriptor;
pub mod error;
pub mod perf;
pub mod processor;
pub mod raw;
pub mod region;
pub mod sliced;
pub mod voxel;

pub use codec::{BrickCodec, CodecError, HevcBrickCodec};
pub use container::{BlockInfo, EncodedBlockedReader, EncodedBlockedWriter, Header};
pub use descriptor::{ConversionJob, Op, SourceUnit, TargetUnit, UnitKind};
pub use error::VolumeError;
pub use processor::{DownSampling, Mapping, OpStack, Processor, Unit, VolumeRange};
pub use region::{BrickGeometry, RegionError, RegionReader, RegionWriter, VoxelWindow};
pub use voxel::{
    BlockIndex, EncodedBlockedDesc, Extent, RawDesc, SliceAxis, SlicedDesc, Spacing, VoxelFormat, VoxelInfo, VoxelType, INVALID_BLOCK_INDEX,
};
