//! Shared error taxonomy for the container, region engine, I/O adapters, and
//! the processor pipeline.
//!
//! [`crate::voxel::DescriptorError`] and [`crate::codec::CodecError`] stay in
//! their own modules since each wraps a distinct, self-contained fault
//! domain; [`VolumeError`] covers every component downstream of the
//! descriptor and wraps both of those as variants so callers only ever
//! need to match on one error type at the CLI boundary.

use std::io;
use thiserror::Error;

use crate::codec::CodecError;
use crate::voxel::{BlockIndex, DescriptorError};

#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("failed to open {path} in {mode} mode: {source}")]
    FileOpen {
        path: String,
        mode: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("bad file format: {0}")]
    FileFormat(String),

    #[error("I/O error: expected {expected} bytes, got {actual}")]
    FileIo { expected: u64, actual: u64 },

    #[error("index {0} is out of range for this volume")]
    OutOfRange(BlockIndex),

    #[error("voxel coordinate out of range: {0}")]
    VoxelOutOfRange(String),

    #[error("block {0} was already written — no in-place update is permitted")]
    DuplicateWrite(BlockIndex),

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
