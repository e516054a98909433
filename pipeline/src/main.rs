use anyhow::Context;
use clap::{Parser, Subcommand};
use generator::survey::{build_survey, SurveyConfig};
use log::info;
use rsrcore::aggregate::Aggregator;
use rsrcore::prelude::{ProcessingStage, StageOutcome};
use rsrcore::processing::{StageContext, StageKind};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use workflow::config::WorkflowConfig;
use workflow::driver::{Driver, PickSource, ReportEntry, UnitRun, UnitSelector};
use workflow::resample::ResampleStage;

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Derived-product pipeline for radar statistical reconstruction")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Units processed concurrently
    #[arg(long, global = true)]
    workers: Option<usize>,
    /// Per-unit time limit in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
    /// Write a JSON run report to this file
    #[arg(long, global = true)]
    report: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Clone)]
struct Selection {
    /// Track pattern, e.g. 'MIS/JKB2e/*'
    tracks: String,
    /// Pick pattern, e.g. 'srf*'
    picks: String,
}

impl Selection {
    fn selector(&self) -> UnitSelector {
        UnitSelector::new(self.tracks.clone(), self.picks.clone())
    }
}

#[derive(Subcommand)]
enum Command {
    /// Window statistics along each pick
    Statistics(Selection),
    /// Surface reflectance and scattering coefficients
    SurfaceCoefficients(Selection),
    /// Surface permittivity and roughness
    SurfaceProperties(Selection),
    /// Bed reflectance and scattering coefficients
    BedCoefficients {
        #[command(flatten)]
        selection: Selection,
        /// Surface pick to pair with; the first surface pick otherwise
        #[arg(long)]
        surface_pick: Option<String>,
    },
    /// Subsurface depth from the delay below the surface pick
    Bathymetry {
        #[command(flatten)]
        selection: Selection,
        #[arg(long)]
        surface_pick: Option<String>,
    },
    /// Resample picks of the source processing directory
    Resample(Selection),
    /// Gather records and products into one CSV table
    Gather {
        #[command(flatten)]
        selection: Selection,
        /// Output table; `<season>_gather.csv` by default
        #[arg(long)]
        output: Option<PathBuf>,
        /// Drop rows with invalid values, strong roll or a failed fit
        #[arg(long, default_value_t = false)]
        remove_bad: bool,
    },
    /// Write a synthetic survey and its workflow config
    Synthesize {
        #[arg(long, default_value = "synthetic")]
        root: PathBuf,
        /// Survey settings in YAML
        #[arg(long)]
        survey: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Serialize)]
struct RunReport<'a> {
    command: &'a str,
    metrics: rsrcore::telemetry::MetricsSnapshot,
    units: Vec<ReportEntry>,
}

fn synthesize(root: &Path, survey: Option<&Path>, seed: Option<u64>) -> anyhow::Result<()> {
    let mut survey_config = match survey {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading survey config {}", path.display()))?;
            serde_yaml::from_str(&text)
                .with_context(|| format!("parsing survey config {}", path.display()))?
        }
        None => SurveyConfig::default(),
    };
    if let Some(seed) = seed {
        survey_config.seed = seed;
    }
    let summary = build_survey(root, &survey_config)?;
    println!(
        "Synthetic survey -> {} units, config {}",
        summary.units.len(),
        summary.config_path.display()
    );
    Ok(())
}

fn write_report(path: &Path, report: &RunReport<'_>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("serializing run report")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json).with_context(|| format!("writing run report {}", path.display()))?;
    Ok(())
}

fn run_stage_command(
    driver: &Driver,
    stage: Arc<dyn ProcessingStage>,
    selector: UnitSelector,
) -> anyhow::Result<Vec<UnitRun<StageOutcome>>> {
    let units = driver.units(&selector)?;
    info!("{}: {} units", stage.name(), units.len());
    driver.run_stage(stage, units)
}

fn build_stage(
    kind: StageKind,
    context: Arc<StageContext>,
    surface_pick: Option<String>,
) -> anyhow::Result<Arc<dyn ProcessingStage>> {
    let stage = kind
        .build(context, surface_pick)
        .with_context(|| format!("configuring {:?} stage", kind))?;
    Ok(Arc::from(stage))
}

fn run_workflow(args: &Args) -> anyhow::Result<()> {
    let workflow_config = match &args.config {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::default(),
    }
    .with_overrides(args.workers, args.timeout);

    let driver = Driver::new(&workflow_config)?;
    let context = Arc::new(StageContext::new(
        workflow_config.to_stage_config(),
        workflow_config.locator(),
    ));

    let (name, runs) = match &args.command {
        Command::Statistics(selection) => (
            "statistics",
            run_stage_command(
                &driver,
                build_stage(StageKind::Statistics, context, None)?,
                selection.selector(),
            )?,
        ),
        Command::SurfaceCoefficients(selection) => (
            "surface-coefficients",
            run_stage_command(
                &driver,
                build_stage(StageKind::SurfaceCoefficients, context, None)?,
                selection.selector(),
            )?,
        ),
        Command::SurfaceProperties(selection) => (
            "surface-properties",
            run_stage_command(
                &driver,
                build_stage(StageKind::SurfaceProperties, context, None)?,
                selection.selector(),
            )?,
        ),
        Command::BedCoefficients {
            selection,
            surface_pick,
        } => (
            "bed-coefficients",
            run_stage_command(
                &driver,
                build_stage(StageKind::BedCoefficients, context, surface_pick.clone())?,
                selection.selector(),
            )?,
        ),
        Command::Bathymetry {
            selection,
            surface_pick,
        } => (
            "bathymetry",
            run_stage_command(
                &driver,
                build_stage(StageKind::Bathymetry, context, surface_pick.clone())?,
                selection.selector(),
            )?,
        ),
        Command::Resample(selection) => {
            let settings = workflow_config.resample.clone();
            let selector = selection.selector().from_source(PickSource {
                process: settings.source_process.clone(),
                product: settings.source_product.clone(),
            });
            let stage = ResampleStage::new(workflow_config.locator(), settings);
            ("resample", run_stage_command(&driver, Arc::new(stage), selector)?)
        }
        Command::Gather {
            selection,
            output,
            remove_bad,
        } => {
            let output = output
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("{}_gather.csv", workflow_config.season)));
            let aggregator = Arc::new(
                Aggregator::new(workflow_config.locator(), output).with_remove_bad(*remove_bad),
            );
            let units = driver.units(&selection.selector())?;
            info!("gather: {} units into {}", units.len(), aggregator.output().display());
            ("gather", driver.gather(aggregator, units)?)
        }
        Command::Synthesize { .. } => anyhow::bail!("synthesize does not run a workflow"),
    };

    let metrics = driver.metrics();
    println!(
        "{} -> completed {}, skipped {}, failed {}, timed out {}",
        name, metrics.completed, metrics.skipped, metrics.failed, metrics.timed_out
    );
    if let Some(path) = &args.report {
        let report = RunReport {
            command: name,
            metrics,
            units: runs.iter().map(ReportEntry::from).collect(),
        };
        write_report(path, &report)?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match &args.command {
        Command::Synthesize { root, survey, seed } => synthesize(root, survey.as_deref(), *seed),
        _ => run_workflow(&args),
    }
}
