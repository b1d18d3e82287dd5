//! Sidecar (de)serialization and the ambient `ConversionJob` CLI
//! configuration document (A3).
//!
//! Two distinct JSON shapes live here: the **sidecar**, one per persisted
//! volume, naming *what that volume is* (`desc`: voxel kind, extent,
//! spacing, representation-specific fields); and the **conversion job**, the
//! CLI's `--config` input, naming *what conversion to run* (one source unit,
//! N target units, each with an optional op stack).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VolumeError;
use crate::voxel::{EncodedBlockedDesc, Extent, RawDesc, SliceAxis, SlicedDesc, Spacing, VoxelFormat, VoxelInfo, VoxelType};

/// Fields shared by every sidecar representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarCommon {
    pub volume_name: String,
    pub voxel_type: VoxelType,
    pub voxel_format: VoxelFormat,
    pub extend: [u32; 3],
    pub space: [f32; 3],
}

impl SidecarCommon {
    fn voxel_info(&self) -> VoxelInfo {
        VoxelInfo::new(self.voxel_type, self.voxel_format)
    }

    fn extent(&self) -> Extent {
        Extent::new(self.extend[0], self.extend[1], self.extend[2])
    }

    fn spacing(&self) -> Spacing {
        Spacing::new(self.space[0], self.space[1], self.space[2])
    }

    fn from_parts(volume_name: impl Into<String>, voxel_info: VoxelInfo, extent: Extent, spacing: Spacing) -> Self {
        Self {
            volume_name: volume_name.into(),
            voxel_type: voxel_info.voxel_type,
            voxel_format: voxel_info.voxel_format,
            extend: [extent.width, extent.height, extent.depth],
            space: [spacing.x, spacing.y, spacing.z],
        }
    }
}

/// On-disk shape of an encoded-blocked sidecar: `{"desc": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedBlockedSidecar {
    pub desc: EncodedBlockedSidecarDesc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedBlockedSidecarDesc {
    #[serde(flatten)]
    pub common: SidecarCommon,
    pub block_length: u32,
    pub padding: u32,
    pub volume_codec: String,
    pub data_path: String,
}

impl From<&EncodedBlockedSidecarDesc> for EncodedBlockedDesc {
    fn from(s: &EncodedBlockedSidecarDesc) -> Self {
        Self {
            voxel_info: s.common.voxel_info(),
            extent: s.common.extent(),
            spacing: s.common.spacing(),
            block_length: s.block_length,
            padding: s.padding,
            data_path: s.data_path.clone(),
        }
    }
}

impl EncodedBlockedSidecarDesc {
    pub fn from_desc(desc: &EncodedBlockedDesc, volume_name: impl Into<String>) -> Self {
        Self {
            common: SidecarCommon::from_parts(volume_name, desc.voxel_info, desc.extent, desc.spacing),
            block_length: desc.block_length,
            padding: desc.padding,
            volume_codec: "hevc".into(),
            data_path: desc.data_path.clone(),
        }
    }
}

/// On-disk shape of a raw sidecar: `{"desc": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSidecar {
    pub desc: RawSidecarDesc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSidecarDesc {
    #[serde(flatten)]
    pub common: SidecarCommon,
    pub data_path: String,
}

impl From<&RawSidecarDesc> for RawDesc {
    fn from(s: &RawSidecarDesc) -> Self {
        Self {
            voxel_info: s.common.voxel_info(),
            extent: s.common.extent(),
            spacing: s.common.spacing(),
            data_path: s.data_path.clone(),
        }
    }
}

impl RawSidecarDesc {
    pub fn from_desc(desc: &RawDesc, volume_name: impl Into<String>) -> Self {
        Self {
            common: SidecarCommon::from_parts(volume_name, desc.voxel_info, desc.extent, desc.spacing),
            data_path: desc.data_path.clone(),
        }
    }
}

/// On-disk shape of a sliced sidecar: `{"desc": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicedSidecar {
    pub desc: SlicedSidecarDesc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicedSidecarDesc {
    #[serde(flatten)]
    pub common: SidecarCommon,
    pub slice_format: String,
    pub axis: SliceAxis,
    pub prefix: String,
    pub postfix: String,
    pub setw: u32,
    pub data_path: String,
}

impl From<&SlicedSidecarDesc> for SlicedDesc {
    fn from(s: &SlicedSidecarDesc) -> Self {
        Self {
            voxel_info: s.common.voxel_info(),
            extent: s.common.extent(),
            spacing: s.common.spacing(),
            data_path: s.data_path.clone(),
            axis: s.axis,
            prefix: s.prefix.clone(),
            postfix: s.postfix.clone(),
            setw: s.setw,
        }
    }
}

impl SlicedSidecarDesc {
    pub fn from_desc(desc: &SlicedDesc, volume_name: impl Into<String>) -> Self {
        Self {
            common: SidecarCommon::from_parts(volume_name, desc.voxel_info, desc.extent, desc.spacing),
            slice_format: "tiff".into(),
            axis: desc.axis,
            prefix: desc.prefix.clone(),
            postfix: desc.postfix.clone(),
            setw: desc.setw,
            data_path: desc.data_path.clone(),
        }
    }
}

/// Read and parse a sidecar JSON file of shape `T`.
pub fn read_sidecar<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T, VolumeError> {
    let path_ref = path.as_ref();
    let text = fs::read_to_string(path_ref).map_err(|e| VolumeError::FileOpen {
        path: path_ref.display().to_string(),
        mode: "read",
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| VolumeError::FileFormat(format!("malformed sidecar {}: {e}", path_ref.display())))
}

/// Serialize and write a sidecar JSON file.
pub fn write_sidecar<T: Serialize>(path: impl AsRef<Path>, sidecar: &T) -> Result<(), VolumeError> {
    let path_ref = path.as_ref();
    let text = serde_json::to_string_pretty(sidecar)
        .map_err(|e| VolumeError::FileFormat(format!("failed to serialize sidecar: {e}")))?;
    fs::write(path_ref, text).map_err(|e| VolumeError::FileOpen {
        path: path_ref.display().to_string(),
        mode: "write",
        source: e,
    })
}

/// Which on-disk representation a `ConversionJob` unit names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Raw,
    Sliced,
    BlockedEncoded,
}

/// `ConversionJob`'s source entry: a unit plus an optional voxel-range
/// restriction `[x0,y0,z0,x1,y1,z1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUnit {
    pub kind: UnitKind,
    pub desc_path: String,
    #[serde(default)]
    pub range: Option<[i64; 6]>,
}

/// Fixed 2x isotropic down-sampling reducer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownSamplingKind {
    Avg,
    Max,
}

/// Per-voxel value-mapping operator, parameterised by an `f64` operand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    Add(f64),
    Mul(f64),
    Min(f64),
    Max(f64),
}

/// One entry in a target's op stack, as it appears in `ConversionJob` JSON.
/// `user_fn` operator variants exist only in the in-process `Processor` API
/// (closures aren't JSON-representable) and have no counterpart here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    DownSampling(DownSamplingKind),
    Mapping(MappingKind),
    Statistics(bool),
}

/// `ConversionJob`'s target entry: a unit plus its op stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetUnit {
    pub kind: UnitKind,
    pub desc_path: String,
    #[serde(default)]
    pub ops: Vec<Op>,
}

/// The CLI's `--config` document: one source, N targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub source: SourceUnit,
    pub targets: Vec<TargetUnit>,
}

impl Default for ConversionJob {
    /// A representative job, serialized back out by `--print` so a user can
    /// see the expected shape without reading source.
    fn default() -> Self {
        Self {
            source: SourceUnit {
                kind: UnitKind::Raw,
                desc_path: "source.sidecar.json".into(),
                range: None,
            },
            targets: vec![TargetUnit {
                kind: UnitKind::BlockedEncoded,
                desc_path: "target.sidecar.json".into(),
                ops: vec![Op::Mapping(MappingKind::Mul(1.0))],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::VoxelInfo;

    #[test]
    fn encoded_blocked_sidecar_roundtrip() {
        let desc = EncodedBlockedDesc {
            voxel_info: VoxelInfo::new(VoxelType::U8, VoxelFormat::R),
            extent: Extent::new(8, 8, 4),
            spacing: Spacing::default(),
            block_length: 4,
            padding: 1,
            data_path: "vol.eb".into(),
        };
        let sidecar = EncodedBlockedSidecar {
            desc: EncodedBlockedSidecarDesc::from_desc(&desc, "test-volume"),
        };
        let json = serde_json::to_string(&sidecar).unwrap();
        assert!(json.contains("\"extend\":[8,8,4]"));
        let parsed: EncodedBlockedSidecar = serde_json::from_str(&json).unwrap();
        let back: EncodedBlockedDesc = (&parsed.desc).into();
        assert_eq!(back, desc);
    }

    #[test]
    fn conversion_job_default_prints_expected_shape() {
        let job = ConversionJob::default();
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"kind\":\"raw\""));
        assert!(json.contains("\"mapping\""));
    }

    #[test]
    fn op_json_shape_matches_spec() {
        let ops = vec![Op::DownSampling(DownSamplingKind::Avg), Op::Mapping(MappingKind::Mul(2.0)), Op::Statistics(true)];
        let json = serde_json::to_string(&ops).unwrap();
        assert_eq!(json, r#"[{"down_sampling":"avg"},{"mapping":{"mul":2.0}},{"statistics":true}]"#);
    }
}
