//! Synthetic survey: a small product tree that the whole pipeline can run on.

use crate::workflow::config::{ToolCommand, WorkflowConfig};
use anyhow::Context;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rsrcore::physics::spreading::geometric_loss_db;
use rsrcore::prelude::Unit;
use rsrcore::products::{Geometry, GeometrySample, Product};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for generating a synthetic survey.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    pub season: String,
    pub tracks: usize,
    /// Along-track samples per track.
    pub samples: usize,
    pub seed: u64,
    /// Aircraft height above the surface, m.
    pub surface_range: f64,
    pub surface_permittivity: f64,
    /// Surface diffuse over coherent power.
    pub surface_diffuse_ratio: f64,
    /// Bed echo below the surface pick, fast-time samples.
    pub bed_offset: f64,
    /// Bed power relative to the surface, dB.
    pub bed_contrast_db: f64,
    /// Subsurface echo below the surface pick, fast-time samples.
    pub subsurface_offset: f64,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            season: "SYN1".to_string(),
            tracks: 2,
            samples: 4000,
            seed: 0,
            surface_range: 800.0,
            surface_permittivity: 3.0,
            surface_diffuse_ratio: 0.05,
            bed_offset: 1200.0,
            bed_contrast_db: -40.0,
            subsurface_offset: 50.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SurveySummary {
    pub config_path: PathBuf,
    pub units: Vec<Unit>,
}

const SURFACE_PICK: &str = "srf_syn";
const BED_PICK: &str = "bed_syn";
const SUBSURFACE_PICK: &str = "sub_syn";

/// Standard normal deviate by Box-Muller.
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Rice amplitude with coherent power `coherent` and diffuse power `diffuse`.
fn rice_amplitude(rng: &mut StdRng, coherent: f64, diffuse: f64) -> f64 {
    let spread = (diffuse / 2.0).sqrt();
    let i = coherent.sqrt() + spread * gaussian(rng);
    let q = spread * gaussian(rng);
    (i * i + q * q).sqrt()
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

/// Pick file whose calibrated amplitudes follow a Rice law.
fn pick_text(
    workflow: &WorkflowConfig,
    rng: &mut StdRng,
    delays: &[f64],
    ranges: &[f64],
    coherent: f64,
    diffuse: f64,
) -> String {
    let calibration = &workflow.stage.calibration;
    let offset = calibration.offset_db();
    let mut text = String::from("Plot synthetic\n");
    for (idx, (&delay, &range)) in delays.iter().zip(ranges).enumerate() {
        let amplitude = rice_amplitude(rng, coherent, diffuse);
        let received = 20.0 * amplitude.log10() + geometric_loss_db(range);
        let raw = (received - offset) / calibration.scale;
        text.push_str(&format!("P\t{}\t{:.3}\t{:.1}\n", idx, delay, raw));
    }
    text
}

/// Writes the catalog, geometry, picks and the workflow config below `root`.
pub fn build_survey(root: &Path, survey: &SurveyConfig) -> anyhow::Result<SurveySummary> {
    let mut workflow = WorkflowConfig::under(root);
    workflow.season = survey.season.clone();
    workflow.resample.interpolate = ToolCommand::new("sh", &["-c", "cat", "--"]);
    workflow.resample.project = ToolCommand::new("sh", &["-c", "cat", "--"]);
    let locator = workflow.locator();
    let mut rng = StdRng::seed_from_u64(survey.seed);

    let r = (survey.surface_permittivity.sqrt() - 1.0) / (survey.surface_permittivity.sqrt() + 1.0);
    let surface_power = r * r;
    let bed_power = surface_power * 10f64.powf(survey.bed_contrast_db / 10.0);

    let mut catalog = String::new();
    let mut units = Vec::new();
    for track_idx in 0..survey.tracks {
        let track = format!("SYN/F{:02}/X{:02}a", track_idx + 1, track_idx + 1);
        catalog.push_str(&format!("{} F{:02} {}\n", track, track_idx + 1, survey.season));
        let any = Unit::new(track.as_str(), SURFACE_PICK);

        let samples: Vec<GeometrySample> = (0..survey.samples)
            .map(|idx| GeometrySample {
                longitude: 160.0 + 0.001 * idx as f64,
                latitude: -78.0 + 0.0005 * track_idx as f64,
                heading: 90.0,
                roll: 0.5 * gaussian(&mut rng),
                surface_range: survey.surface_range + 5.0 * gaussian(&mut rng),
            })
            .collect();
        let geometry = Geometry::from_samples(samples);
        geometry
            .write(&locator.path(&Product::Geometry, &any))
            .with_context(|| format!("writing geometry of {}", track))?;
        let ranges = geometry.surface_range();

        let surface_delays: Vec<f64> = (0..survey.samples)
            .map(|idx| 400.0 + 20.0 * (idx as f64 / 500.0).sin())
            .collect();
        let picks = [
            (SURFACE_PICK, 0.0, surface_power, surface_power * survey.surface_diffuse_ratio),
            (BED_PICK, survey.bed_offset, bed_power, bed_power * 0.2),
            (SUBSURFACE_PICK, survey.subsurface_offset, bed_power, bed_power * 0.5),
        ];
        for (pick, offset, coherent, diffuse) in picks {
            let delays: Vec<f64> = surface_delays.iter().map(|d| d + offset).collect();
            let unit = Unit::new(track.as_str(), pick);
            let text = pick_text(&workflow, &mut rng, &delays, &ranges, coherent, diffuse);
            write_file(&locator.path(&Product::Pick, &unit), &text)?;
            units.push(unit);
        }

        // inputs of the resampling stage
        let source = Product::SourcePick {
            process: workflow.resample.source_process.clone(),
            product: workflow.resample.source_product.clone(),
        };
        let source_text = pick_text(&workflow, &mut rng, &surface_delays, &ranges, surface_power, 0.0);
        write_file(&locator.path(&source, &any), &source_text)?;
        write_file(&locator.path(&Product::Compressed, &any), "synthetic compressed data\n")?;
        write_file(&locator.path(&Product::Sweeps, &any), "synthetic sweeps\n")?;
    }
    write_file(&workflow.paths.catalog, &catalog)?;

    let config_path = root.join("rsr.yaml");
    let yaml = serde_yaml::to_string(&workflow).context("serializing workflow config")?;
    write_file(&config_path, &yaml)?;

    Ok(SurveySummary { config_path, units })
}
