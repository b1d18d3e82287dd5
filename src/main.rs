use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use volumetric::descriptor::{
    read_sidecar, ConversionJob, EncodedBlockedSidecar, RawSidecar, SlicedSidecar, SourceUnit, TargetUnit, UnitKind,
};
use volumetric::processor::{OpStack, Processor, Unit, VolumeRange};
use volumetric::voxel::{EncodedBlockedDesc, Extent, RawDesc, SlicedDesc};

/// Voxel-volume conversion CLI: reads one source representation, writes any
/// number of target representations, each through its own op stack.
#[derive(Parser)]
#[command(name = "voltool", version, about = "Convert between raw, sliced, and encoded-blocked voxel volumes")]
struct Cli {
    /// Path to a ConversionJob JSON document describing the conversion to run.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print a representative ConversionJob document and exit, without converting.
    #[arg(short, long)]
    print: bool,
}

fn load_unit(kind: UnitKind, desc_path: &str) -> Result<(Unit, Extent), Box<dyn Error>> {
    Ok(match kind {
        UnitKind::Raw => {
            let sidecar: RawSidecar = read_sidecar(desc_path)?;
            let desc: RawDesc = (&sidecar.desc).into();
            let extent = desc.extent;
            (Unit::Raw(desc), extent)
        }
        UnitKind::Sliced => {
            let sidecar: SlicedSidecar = read_sidecar(desc_path)?;
            let desc: SlicedDesc = (&sidecar.desc).into();
            let extent = desc.extent;
            (Unit::Sliced(desc), extent)
        }
        UnitKind::BlockedEncoded => {
            let sidecar: EncodedBlockedSidecar = read_sidecar(desc_path)?;
            let desc: EncodedBlockedDesc = (&sidecar.desc).into();
            let extent = desc.extent;
            (Unit::BlockedEncoded(desc), extent)
        }
    })
}

fn source_range(unit: &SourceUnit, extent: Extent) -> Result<VolumeRange, Box<dyn Error>> {
    match unit.range {
        Some([x0, y0, z0, x1, y1, z1]) => Ok(VolumeRange::new(x0, y0, z0, x1, y1, z1)?),
        None => Ok(VolumeRange::new(0, 0, 0, extent.width as i64, extent.height as i64, extent.depth as i64)?),
    }
}

fn run(job: ConversionJob) -> Result<(), Box<dyn Error>> {
    let mut processor = Processor::new();

    let (source_unit, source_extent) = load_unit(job.source.kind, &job.source.desc_path)?;
    let range = source_range(&job.source, source_extent)?;
    processor.set_source(source_unit, range)?;

    for target in &job.targets {
        let TargetUnit { kind, desc_path, ops } = target;
        let (target_unit, _) = load_unit(*kind, desc_path)?;
        processor.add_target(target_unit, OpStack::from_ops(ops))?;
    }

    let report = processor.convert()?;
    for (i, stats) in report.statistics.into_iter().enumerate() {
        if let Some(stats) = stats {
            tracing::info!(target = i, count = stats.count, min = stats.min, max = stats.max, mean = stats.mean(), "target statistics");
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    if cli.print {
        let job = ConversionJob::default();
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(());
    }

    let Some(config) = cli.config else {
        eprintln!("voltool: either --config <path> or --print is required");
        std::process::exit(2);
    };

    let text = std::fs::read_to_string(&config)?;
    let job: ConversionJob = serde_json::from_str(&text)?;

    if let Err(e) = run(job) {
        tracing::error!(error = %e, "conversion failed");
        eprintln!("voltool: {e}");
        std::process::exit(1);
    }
    Ok(())
}
