use anyhow::Context;
use rsrcore::prelude::StageConfig;
use rsrcore::products::{Catalog, ProductLocator, ProductPaths};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Worker pool settings of a run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Units processed at once; defaults to the available parallelism.
    pub workers: Option<usize>,
    /// Wall-time limit per unit.
    pub unit_timeout_secs: Option<u64>,
}

impl ExecutionConfig {
    pub fn worker_count(&self) -> usize {
        self.workers
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
            .max(1)
    }

    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout_secs.map(Duration::from_secs)
    }
}

/// An external program; stage-specific arguments are appended after `args`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

/// Where resampled picks come from and the tools that produce them.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    pub source_process: String,
    pub source_product: String,
    /// Called with the track; reads the source pick on stdin.
    pub interpolate: ToolCommand,
    /// Called with the compressed product; reads the interpolated pick on stdin.
    pub project: ToolCommand,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            source_process: "pik1".to_string(),
            source_product: "MagLoResInco1".to_string(),
            interpolate: ToolCommand::new("pik4Hzto1m", &[]),
            project: ToolCommand::new("pk3", &["3200", "0", "3200"]),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub season: String,
    /// Processing directory the picks are read from and written to.
    pub process: String,
    pub paths: ProductPaths,
    pub stage: StageConfig,
    pub execution: ExecutionConfig,
    pub resample: ResampleConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            season: "ICP5".to_string(),
            process: "pik1.1m".to_string(),
            paths: ProductPaths::under("."),
            stage: StageConfig::default(),
            execution: ExecutionConfig::default(),
            resample: ResampleConfig::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .stage
            .validate()
            .with_context(|| format!("invalid stage settings in {}", path_ref.display()))?;
        Ok(config)
    }

    /// Default settings with the conventional product tree below `root`.
    pub fn under<P: AsRef<Path>>(root: P) -> Self {
        Self {
            paths: ProductPaths::under(root),
            ..Self::default()
        }
    }

    pub fn with_overrides(mut self, workers: Option<usize>, timeout_secs: Option<u64>) -> Self {
        if workers.is_some() {
            self.execution.workers = workers;
        }
        if timeout_secs.is_some() {
            self.execution.unit_timeout_secs = timeout_secs;
        }
        self
    }

    pub fn to_stage_config(&self) -> StageConfig {
        self.stage.clone()
    }

    pub fn locator(&self) -> ProductLocator {
        ProductLocator::new(self.paths.clone(), self.process.clone(), self.stage.product.clone())
    }

    pub fn catalog(&self) -> anyhow::Result<Catalog> {
        Catalog::load(&self.paths.catalog)
            .with_context(|| format!("loading flight catalog {}", self.paths.catalog.display()))
    }
}
