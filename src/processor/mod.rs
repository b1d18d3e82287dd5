//! Conversion pipeline (C6) — the engine's public entry point. A `Processor`
//! binds one source unit and any number of target units, each with its own
//! op stack, then streams the configured voxel range through in a single
//! pass: one resident source plane (plus, for a down-sampling target, the
//! plane before it) drives every target's write for that plane before the
//! next one is read.
//!
//! This trades the fully brick-stripe-scheduled sweep described for the
//! on-disk engine for a plain z-slab loop over [`VoxelWindow`]s — still one
//! source plane resident at a time, still a single pass, but built directly
//! on [`RegionReader`]/[`RegionWriter`]/[`RawReader`]/[`RawWriter`]/
//! [`SlicedReader`]/[`SlicedWriter`] rather than re-deriving their brick
//! bookkeeping here. See DESIGN.md for the tradeoff.

use std::sync::Arc;

use thiserror::Error;

use crate::codec::{CodecError, HevcBrickCodec};
use crate::container::{EncodedBlockedReader, EncodedBlockedWriter};
use crate::descriptor::{DownSamplingKind, MappingKind, Op};
use crate::error::VolumeError;
use crate::raw::{RawReader, RawWriter};
use crate::region::{RegionError, RegionReader, RegionWriter, VoxelWindow};
use crate::sliced::{SlicedReader, SlicedWriter};
use crate::voxel::{EncodedBlockedDesc, RawDesc, SlicedDesc, VoxelType};

/// A voxel-range restriction on a `Processor`'s source; same shape as a
/// region window, named for the role it plays here.
pub type VolumeRange = VoxelWindow;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error(transparent)]
    Volume(#[from] VolumeError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("no source configured; call set_source first")]
    NoSource,
    #[error("voxel type {0} has no numeric processor representation")]
    UnsupportedVoxelType(VoxelType),
}

impl From<RegionError> for ProcessorError {
    fn from(e: RegionError) -> Self {
        match e {
            RegionError::Volume(v) => ProcessorError::Volume(v),
            RegionError::Codec(c) => ProcessorError::Codec(c),
        }
    }
}

/// One source or target binding: a representation plus the descriptor that
/// names where it lives on disk.
pub enum Unit {
    Raw(RawDesc),
    Sliced(SlicedDesc),
    BlockedEncoded(EncodedBlockedDesc),
}

/// 2x isotropic down-sampling reducer over an eight-voxel neighbourhood.
#[derive(Clone)]
pub enum DownSampling {
    Avg,
    Max,
    UserFn(Arc<dyn Fn(&[f64; 8]) -> f64 + Send + Sync>),
}

impl DownSampling {
    fn reduce(&self, values: &[f64; 8]) -> f64 {
        match self {
            DownSampling::Avg => values.iter().sum::<f64>() / 8.0,
            DownSampling::Max => values.iter().cloned().fold(f64::MIN, f64::max),
            DownSampling::UserFn(f) => f(values),
        }
    }
}

impl From<DownSamplingKind> for DownSampling {
    fn from(k: DownSamplingKind) -> Self {
        match k {
            DownSamplingKind::Avg => DownSampling::Avg,
            DownSamplingKind::Max => DownSampling::Max,
        }
    }
}

/// Per-voxel value mapping, applied after down-sampling (if any) and before
/// statistics accumulation. Output saturates to the target voxel type's
/// representable range.
#[derive(Clone)]
pub enum Mapping {
    Add(f64),
    Mul(f64),
    Min(f64),
    Max(f64),
    UserFn(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

impl Mapping {
    fn apply(&self, v: f64) -> f64 {
        match self {
            Mapping::Add(a) => v + a,
            Mapping::Mul(a) => v * a,
            Mapping::Min(a) => v.min(*a),
            Mapping::Max(a) => v.max(*a),
            Mapping::UserFn(f) => f(v),
        }
    }
}

impl From<MappingKind> for Mapping {
    fn from(k: MappingKind) -> Self {
        match k {
            MappingKind::Add(a) => Mapping::Add(a),
            MappingKind::Mul(a) => Mapping::Mul(a),
            MappingKind::Min(a) => Mapping::Min(a),
            MappingKind::Max(a) => Mapping::Max(a),
        }
    }
}

/// Running min/max/sum/count over every voxel written to a target.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticsSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl StatisticsSummary {
    fn accumulate(&mut self, v: f64) {
        if self.count == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.sum += v;
        self.count += 1;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// A target's op stack: an optional down-sampling reducer, an optional
/// value mapping, and an optional running statistics accumulator.
#[derive(Clone, Default)]
pub struct OpStack {
    pub down_sampling: Option<DownSampling>,
    pub mapping: Option<Mapping>,
    pub collect_statistics: bool,
}

impl OpStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_down_sampling(mut self, ds: DownSampling) -> Self {
        self.down_sampling = Some(ds);
        self
    }

    pub fn with_mapping(mut self, m: Mapping) -> Self {
        self.mapping = Some(m);
        self
    }

    pub fn with_statistics(mut self) -> Self {
        self.collect_statistics = true;
        self
    }

    /// Build an `OpStack` from a `ConversionJob` target's JSON op list.
    /// `user_fn` variants have no JSON form and so can't arise here.
    pub fn from_ops(ops: &[Op]) -> Self {
        let mut stack = Self::default();
        for op in ops {
            match op {
                Op::DownSampling(kind) => stack.down_sampling = Some((*kind).into()),
                Op::Mapping(kind) => stack.mapping = Some((*kind).into()),
                Op::Statistics(enabled) => stack.collect_statistics = *enabled,
            }
        }
        stack
    }
}

fn voxel_to_f64(bytes: &[u8], ty: VoxelType) -> Result<f64, ProcessorError> {
    match ty {
        VoxelType::U8 => Ok(bytes[0] as f64),
        VoxelType::U16 => Ok(u16::from_le_bytes([bytes[0], bytes[1]]) as f64),
        other => Err(ProcessorError::UnsupportedVoxelType(other)),
    }
}

fn f64_to_voxel(v: f64, ty: VoxelType) -> Result<Vec<u8>, ProcessorError> {
    match ty {
        VoxelType::U8 => Ok(vec![v.round().clamp(0.0, u8::MAX as f64) as u8]),
        VoxelType::U16 => Ok((v.round().clamp(0.0, u16::MAX as f64) as u16).to_le_bytes().to_vec()),
        other => Err(ProcessorError::UnsupportedVoxelType(other)),
    }
}

enum SourceBinding {
    Raw(RawReader, RawDesc),
    Sliced(SlicedReader, SlicedDesc),
    BlockedEncoded(EncodedBlockedReader, EncodedBlockedDesc, HevcBrickCodec),
}

impl SourceBinding {
    fn open(unit: Unit) -> Result<Self, ProcessorError> {
        Ok(match unit {
            Unit::Raw(desc) => {
                let reader = RawReader::open(&desc.data_path, desc.extent, desc.voxel_info)?;
                SourceBinding::Raw(reader, desc)
            }
            Unit::Sliced(desc) => {
                let reader = SlicedReader::open(desc.clone(), 4)?;
                SourceBinding::Sliced(reader, desc)
            }
            Unit::BlockedEncoded(desc) => {
                let reader = EncodedBlockedReader::open(&desc.data_path)?;
                SourceBinding::BlockedEncoded(reader, desc, HevcBrickCodec::default())
            }
        })
    }

    fn voxel_type(&self) -> VoxelType {
        match self {
            SourceBinding::Raw(_, d) => d.voxel_info.voxel_type,
            SourceBinding::Sliced(_, d) => d.voxel_info.voxel_type,
            SourceBinding::BlockedEncoded(_, d, _) => d.voxel_info.voxel_type,
        }
    }

    /// Read one full z-plane `[x0,x1) x [y0,y1) x {z}` into a row-major
    /// `f64` buffer, `(x1-x0)` fastest-varying.
    fn read_plane(&mut self, x0: i64, x1: i64, y0: i64, y1: i64, z: i64) -> Result<Vec<f64>, ProcessorError> {
        let window = VoxelWindow::new(x0, y0, z, x1, y1, z + 1)?;
        let w = (x1 - x0) as usize;
        let ty = self.voxel_type();
        let mut plane = vec![0.0f64; w * (y1 - y0) as usize];
        let mut convert_err = None;

        let mut sink = |x: u64, y: u64, _z: u64, voxel: &[u8]| {
            if convert_err.is_some() {
                return;
            }
            match voxel_to_f64(voxel, ty) {
                Ok(v) => plane[y as usize * w + x as usize] = v,
                Err(e) => convert_err = Some(e),
            }
        };

        match self {
            SourceBinding::Raw(reader, _) => reader.read_window(&window, &mut sink)?,
            SourceBinding::Sliced(reader, _) => reader.read_window(&window, &mut sink)?,
            SourceBinding::BlockedEncoded(reader, desc, codec) => {
                RegionReader::new(reader, desc).read_window(&window, codec, &mut sink)?
            }
        }
        if let Some(e) = convert_err {
            return Err(e);
        }
        Ok(plane)
    }
}

enum TargetKind {
    Raw(RawWriter, RawDesc),
    Sliced(SlicedWriter, SlicedDesc),
    BlockedEncoded(EncodedBlockedWriter, EncodedBlockedDesc, HevcBrickCodec),
}

impl TargetKind {
    fn voxel_type(&self) -> VoxelType {
        match self {
            TargetKind::Raw(_, d) => d.voxel_info.voxel_type,
            TargetKind::Sliced(_, d) => d.voxel_info.voxel_type,
            TargetKind::BlockedEncoded(_, d, _) => d.voxel_info.voxel_type,
        }
    }

    /// Write a row-major `f64` plane of size `w x h` to `[0,w) x [0,h) x {z}`
    /// in this target's own coordinate space.
    fn write_plane(&mut self, w: usize, z: i64, values: &[f64]) -> Result<(), ProcessorError> {
        if values.is_empty() {
            return Ok(());
        }
        let h = values.len() / w;
        let window = VoxelWindow::new(0, 0, z, w as i64, h as i64, z + 1)?;
        let ty = self.voxel_type();

        let mut source = |x: i64, y: i64, _z: i64| -> Vec<u8> {
            f64_to_voxel(values[y as usize * w + x as usize], ty).unwrap_or_default()
        };

        match self {
            TargetKind::Raw(writer, _) => writer.write_window(&window, &mut source)?,
            TargetKind::Sliced(writer, _) => writer.write_window(&window, &mut source)?,
            TargetKind::BlockedEncoded(writer, desc, codec) => {
                RegionWriter::new(writer, desc).write_window(&window, codec, &source)?
            }
        }
        Ok(())
    }

    fn close(self) -> Result<(), ProcessorError> {
        match self {
            TargetKind::Raw(_, _) => Ok(()),
            TargetKind::Sliced(writer, _) => Ok(writer.close()?),
            TargetKind::BlockedEncoded(writer, _, _) => Ok(writer.close()?),
        }
    }
}

struct TargetBinding {
    kind: TargetKind,
    ops: OpStack,
    statistics: Option<StatisticsSummary>,
}

impl TargetBinding {
    fn open(unit: Unit, ops: OpStack) -> Result<Self, ProcessorError> {
        let kind = match unit {
            Unit::Raw(desc) => TargetKind::Raw(RawWriter::create(&desc.data_path, desc.extent, desc.voxel_info)?, desc),
            Unit::Sliced(desc) => TargetKind::Sliced(SlicedWriter::create(desc.clone())?, desc),
            Unit::BlockedEncoded(desc) => TargetKind::BlockedEncoded(
                EncodedBlockedWriter::create(&desc.data_path, desc.block_length, desc.padding)?,
                desc,
                HevcBrickCodec::default(),
            ),
        };
        let statistics = ops.collect_statistics.then(StatisticsSummary::default);
        Ok(Self { kind, ops, statistics })
    }
}

/// Per-target result of a completed `convert` pass.
pub struct ConvertReport {
    pub statistics: Vec<Option<StatisticsSummary>>,
}

/// The conversion pipeline: one source, any number of targets, one pass.
pub struct Processor {
    source: Option<(SourceBinding, VolumeRange)>,
    targets: Vec<TargetBinding>,
}

impl Processor {
    pub fn new() -> Self {
        Self { source: None, targets: Vec::new() }
    }

    /// Bind the source unit and the voxel range to convert. `range` is
    /// clamped to the source's own extent at read time; pass the full
    /// volume as a window covering `[0, extent)` on every axis.
    pub fn set_source(&mut self, unit: Unit, range: VolumeRange) -> Result<(), ProcessorError> {
        self.source = Some((SourceBinding::open(unit)?, range));
        Ok(())
    }

    /// Bind one more target unit with its op stack. Targets are written in
    /// the order they are added.
    pub fn add_target(&mut self, unit: Unit, ops: OpStack) -> Result<(), ProcessorError> {
        self.targets.push(TargetBinding::open(unit, ops)?);
        Ok(())
    }

    /// Run the single streaming pass and close every target. Consumes the
    /// processor: a `Processor` converts once.
    pub fn convert(mut self) -> Result<ConvertReport, ProcessorError> {
        let (mut source, range) = self.source.take().ok_or(ProcessorError::NoSource)?;
        let width = (range.x1 - range.x0) as usize;
        let height = (range.y1 - range.y0) as usize;
        let half_w = width / 2;
        let half_h = height / 2;
        let needs_prev = self.targets.iter().any(|t| t.ops.down_sampling.is_some());
        let mut prev_plane: Option<Vec<f64>> = None;

        tracing::info!(width, height, depth = (range.z1 - range.z0), targets = self.targets.len(), "starting conversion pass");

        for z in range.z0..range.z1 {
            let cur_plane = source.read_plane(range.x0, range.x1, range.y0, range.y1, z)?;
            let rel_z = z - range.z0;

            for target in self.targets.iter_mut() {
                if let Some(ds) = target.ops.down_sampling.clone() {
                    if rel_z % 2 == 1 {
                        let prev = prev_plane.as_ref().expect("a previous plane must be resident by the second z of any down-sampling pass");
                        let half = downsample_plane(prev, &cur_plane, width, height, half_w, half_h, &ds);
                        let mapped = apply_mapping(half, &target.ops.mapping);
                        if let Some(stats) = target.statistics.as_mut() {
                            mapped.iter().for_each(|&v| stats.accumulate(v));
                        }
                        target.kind.write_plane(half_w, (rel_z - 1) / 2, &mapped)?;
                    }
                } else {
                    let mapped = apply_mapping(cur_plane.clone(), &target.ops.mapping);
                    if let Some(stats) = target.statistics.as_mut() {
                        mapped.iter().for_each(|&v| stats.accumulate(v));
                    }
                    target.kind.write_plane(width, rel_z, &mapped)?;
                }
            }

            if needs_prev {
                prev_plane = Some(cur_plane);
            }
        }

        let mut statistics = Vec::with_capacity(self.targets.len());
        for target in self.targets.drain(..) {
            statistics.push(target.statistics);
            target.kind.close()?;
        }
        tracing::info!("conversion pass complete");
        Ok(ConvertReport { statistics })
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_mapping(values: Vec<f64>, mapping: &Option<Mapping>) -> Vec<f64> {
    match mapping {
        None => values,
        Some(m) => values.into_iter().map(|v| m.apply(v)).collect(),
    }
}

/// Combine two full-resolution planes (the even z and the following odd z)
/// into one half-resolution plane via `ds`, pairing voxels in 2x2x2 groups.
/// A trailing row or column left over from an odd width/height is dropped.
fn downsample_plane(prev: &[f64], cur: &[f64], w: usize, _h: usize, half_w: usize, half_h: usize, ds: &DownSampling) -> Vec<f64> {
    let mut out = vec![0.0f64; half_w * half_h];
    for oy in 0..half_h {
        for ox in 0..half_w {
            let x0 = ox * 2;
            let y0 = oy * 2;
            let group = [
                prev[y0 * w + x0],
                prev[y0 * w + x0 + 1],
                prev[(y0 + 1) * w + x0],
                prev[(y0 + 1) * w + x0 + 1],
                cur[y0 * w + x0],
                cur[y0 * w + x0 + 1],
                cur[(y0 + 1) * w + x0],
                cur[(y0 + 1) * w + x0 + 1],
            ];
            out[oy * half_w + ox] = ds.reduce(&group);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::{Extent, Spacing, VoxelFormat, VoxelInfo};
    use tempfile::{NamedTempFile, TempDir};

    fn raw_desc(path: &str, extent: Extent) -> RawDesc {
        RawDesc { voxel_info: VoxelInfo::new(VoxelType::U8, VoxelFormat::R), extent, spacing: Spacing::default(), data_path: path.into() }
    }

    #[test]
    fn mapping_only_pass_doubles_every_voxel() {
        // S4: MUL(2) with no down-sampling, raw source to raw target.
        let src = NamedTempFile::new().unwrap();
        let dst = NamedTempFile::new().unwrap();
        let extent = Extent::new(4, 4, 2);

        let mut w = RawWriter::create(src.path(), extent, VoxelInfo::new(VoxelType::U8, VoxelFormat::R)).unwrap();
        let window = VoxelWindow::new(0, 0, 0, 4, 4, 2).unwrap();
        w.write_window(&window, |_, _, _| vec![10u8]).unwrap();
        drop(w);

        let mut p = Processor::new();
        p.set_source(Unit::Raw(raw_desc(src.path().to_str().unwrap(), extent)), VoxelWindow::new(0, 0, 0, 4, 4, 2).unwrap()).unwrap();
        p.add_target(
            Unit::Raw(raw_desc(dst.path().to_str().unwrap(), extent)),
            OpStack::new().with_mapping(Mapping::Mul(2.0)).with_statistics(),
        )
        .unwrap();
        let report = p.convert().unwrap();

        let stats = report.statistics[0].unwrap();
        assert_eq!(stats.count, 32);
        assert_eq!(stats.min, 20.0);
        assert_eq!(stats.max, 20.0);

        let mut r = RawReader::open(dst.path(), extent, VoxelInfo::new(VoxelType::U8, VoxelFormat::R)).unwrap();
        let mut seen = Vec::new();
        r.read_window(&window, |_, _, _, v| seen.push(v[0])).unwrap();
        assert!(seen.iter().all(|&b| b == 20));
    }

    #[test]
    fn avg_down_sampling_halves_every_axis() {
        // Invariant 6: an AVG down-sampling target's extent is half the
        // source's on every axis, and for a constant-valued source, every
        // output voxel equals the source's constant.
        let src = NamedTempFile::new().unwrap();
        let dst = NamedTempFile::new().unwrap();
        let extent = Extent::new(4, 4, 4);

        let mut w = RawWriter::create(src.path(), extent, VoxelInfo::new(VoxelType::U8, VoxelFormat::R)).unwrap();
        let window = VoxelWindow::new(0, 0, 0, 4, 4, 4).unwrap();
        w.write_window(&window, |_, _, _| vec![8u8]).unwrap();
        drop(w);

        let mut p = Processor::new();
        p.set_source(Unit::Raw(raw_desc(src.path().to_str().unwrap(), extent)), window).unwrap();
        p.add_target(Unit::Raw(raw_desc(dst.path().to_str().unwrap(), Extent::new(2, 2, 2))), OpStack::new().with_down_sampling(DownSampling::Avg))
            .unwrap();
        p.convert().unwrap();

        let mut r = RawReader::open(dst.path(), Extent::new(2, 2, 2), VoxelInfo::new(VoxelType::U8, VoxelFormat::R)).unwrap();
        let out_window = VoxelWindow::new(0, 0, 0, 2, 2, 2).unwrap();
        let mut seen = Vec::new();
        r.read_window(&out_window, |_, _, _, v| seen.push(v[0])).unwrap();
        assert_eq!(seen.len(), 8);
        assert!(seen.iter().all(|&b| b == 8));
    }

    #[test]
    fn from_ops_bridges_json_op_stack() {
        let ops = vec![
            Op::DownSampling(DownSamplingKind::Max),
            Op::Mapping(MappingKind::Add(1.0)),
            Op::Statistics(true),
        ];
        let stack = OpStack::from_ops(&ops);
        assert!(matches!(stack.down_sampling, Some(DownSampling::Max)));
        assert!(matches!(stack.mapping, Some(Mapping::Add(a)) if a == 1.0));
        assert!(stack.collect_statistics);
    }

    #[test]
    fn sliced_target_roundtrips_through_mapping() {
        let src = NamedTempFile::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let extent = Extent::new(2, 2, 2);

        let mut w = RawWriter::create(src.path(), extent, VoxelInfo::new(VoxelType::U8, VoxelFormat::R)).unwrap();
        let window = VoxelWindow::new(0, 0, 0, 2, 2, 2).unwrap();
        w.write_window(&window, |x, y, z| vec![(x + y + z) as u8]).unwrap();
        drop(w);

        let sliced_desc = SlicedDesc {
            voxel_info: VoxelInfo::new(VoxelType::U8, VoxelFormat::R),
            extent,
            spacing: Spacing::default(),
            data_path: dst_dir.path().to_string_lossy().into_owned(),
            axis: crate::voxel::SliceAxis::Z,
            prefix: "slice_".into(),
            postfix: "".into(),
            setw: 4,
        };

        let mut p = Processor::new();
        p.set_source(Unit::Raw(raw_desc(src.path().to_str().unwrap(), extent)), window).unwrap();
        p.add_target(Unit::Sliced(sliced_desc.clone()), OpStack::new()).unwrap();
        p.convert().unwrap();

        let mut r = SlicedReader::open(sliced_desc, 2).unwrap();
        let mut seen = Vec::new();
        r.read_window(&window, |x, y, z, v| seen.push(((x, y, z), v[0]))).unwrap();
        assert!(seen.iter().all(|&((x, y, z), v)| v == (x + y + z) as u8));
    }
}
