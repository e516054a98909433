use crate::physics::calibration::Calibration;
use crate::products::{Product, Track};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Shared configuration for each processing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Radar product the picks were made on (e.g. `MagHiResInco1`).
    pub product: String,
    pub frequency_hz: f64,
    pub bandwidth_hz: f64,
    pub calibration: Calibration,
    /// Samples per statistics window.
    pub window_size: usize,
    /// Samples between consecutive window centers.
    pub window_step: usize,
    /// Substring that marks a pick as a surface pick.
    pub surface_marker: String,
    /// Fast-time sampling interval of the pick delays, in seconds.
    pub sample_interval_s: f64,
    pub ice_permittivity: f64,
    /// One-way attenuation rate in dB/km.
    pub attenuation_db_per_km: f64,
    pub depth_grid_max_m: f64,
    pub depth_grid_step_m: f64,
    /// Firn/ice transition depths bracketing the density profile.
    pub transition_depths_m: (f64, f64),
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            product: "MagHiResInco1".to_string(),
            frequency_hz: 60e6,
            bandwidth_hz: 15e6,
            calibration: Calibration::default(),
            window_size: 1000,
            window_step: 250,
            surface_marker: "srf".to_string(),
            sample_interval_s: 20e-9,
            ice_permittivity: 3.15,
            attenuation_db_per_km: 10.0,
            depth_grid_max_m: 5000.0,
            depth_grid_step_m: 1.0,
            transition_depths_m: (19.0, 129.0),
        }
    }
}

impl StageConfig {
    pub fn wavelength_m(&self) -> f64 {
        crate::physics::SPEED_OF_LIGHT / self.frequency_hz
    }

    /// Rejects settings no stage can run with.
    pub fn validate(&self) -> StageResult<()> {
        if self.window_size == 0 || self.window_step == 0 {
            return Err(StageError::InvalidInput(format!(
                "window size and step must be positive, got {} and {}",
                self.window_size, self.window_step
            )));
        }
        crate::physics::depth::depth_grid(self.depth_grid_max_m, self.depth_grid_step_m)?;
        Ok(())
    }
}

/// One (track, pick) pair, the isolation unit of every stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Unit {
    pub track: Track,
    pub pick: String,
}

impl Unit {
    pub fn new(track: impl Into<Track>, pick: impl Into<String>) -> Self {
        Self {
            track: track.into(),
            pick: pick.into(),
        }
    }

    /// Same track, another pick.
    pub fn with_pick(&self, pick: impl Into<String>) -> Self {
        Self {
            track: self.track.clone(),
            pick: pick.into(),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.track, self.pick)
    }
}

/// An upstream product that must exist before a unit is computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub product: Product,
    pub unit: Unit,
}

impl Requirement {
    pub fn new(product: Product, unit: &Unit) -> Self {
        Self {
            product,
            unit: unit.clone(),
        }
    }
}

/// Why a unit was not computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingInput(PathBuf),
    NoSurfacePick,
    ToolFailure(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingInput(path) => write!(f, "{} does not exist", path.display()),
            SkipReason::NoSurfacePick => write!(f, "no surface pick"),
            SkipReason::ToolFailure(tool) => write!(f, "{} left no output", tool),
        }
    }
}

/// Result of running one stage over one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Completed { product: PathBuf, rows: usize },
    Skipped(SkipReason),
}

impl StageOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed { .. })
    }
}

/// Common error type for stage execution.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("io failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed table {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("cannot parse {path} line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl StageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        StageError::Csv {
            path: path.into(),
            source,
        }
    }
}

pub type StageResult<T> = Result<T, StageError>;

/// A named per-unit computation gated on upstream products.
///
/// `requirements` lists inputs without computing anything; `execute` runs
/// only once every one of them exists.
pub trait ProcessingStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Upstream products the unit needs. `Err` skips the unit outright.
    fn requirements(&self, unit: &Unit) -> Result<Vec<Requirement>, SkipReason>;

    /// Computes and persists the product; only called once every requirement exists.
    fn execute(&self, unit: &Unit) -> StageResult<StageOutcome>;

    /// Missing inputs are logged at debug level instead of as notices.
    fn quiet_skips(&self) -> bool {
        false
    }
}
