use crate::prelude::{Requirement, StageError, StageResult, Unit};
use crate::products::catalog::Track;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root directories of the product tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPaths {
    /// Season flight catalog file.
    pub catalog: PathBuf,
    /// Parent of the per-process pick directories.
    pub picks: PathBuf,
    /// Window statistics and derived products.
    pub statistics: PathBuf,
    /// Compressed radar data products.
    pub compressed: PathBuf,
    /// Per-track geometry and sweeps files.
    pub geometry: PathBuf,
}

impl ProductPaths {
    /// Conventional layout below a single data root.
    pub fn under<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            catalog: root.join("season_flight_pst"),
            picks: root.join("PIK"),
            statistics: root.join("RSR"),
            compressed: root.join("CMP"),
            geometry: root.join("GEO"),
        }
    }
}

/// Products computed from window statistics, named by their file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedStage {
    SurfaceCoefficients,
    SurfaceProperties,
    BedCoefficients,
    Bathymetry,
}

impl DerivedStage {
    pub const ALL: [DerivedStage; 4] = [
        DerivedStage::SurfaceCoefficients,
        DerivedStage::SurfaceProperties,
        DerivedStage::BedCoefficients,
        DerivedStage::Bathymetry,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            DerivedStage::SurfaceCoefficients => "surface_coefficients",
            DerivedStage::SurfaceProperties => "surface_properties",
            DerivedStage::BedCoefficients => "bed_coefficients",
            DerivedStage::Bathymetry => "bathymetry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Product {
    /// Pick file in the configured processing directory.
    Pick,
    /// Pick file of another processing directory and radar product.
    SourcePick { process: String, product: String },
    /// Window statistics record.
    Statistics,
    Derived(DerivedStage),
    Geometry,
    Sweeps,
    Compressed,
}

/// Resolves product paths and their existence; performs no computation.
#[derive(Debug, Clone)]
pub struct ProductLocator {
    paths: ProductPaths,
    process: String,
    product: String,
}

impl ProductLocator {
    pub fn new(paths: ProductPaths, process: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            paths,
            process: process.into(),
            product: product.into(),
        }
    }

    pub fn pick_dir(&self, process: &str, track: &Track) -> PathBuf {
        self.paths.picks.join(process).join(track.as_str())
    }

    pub fn statistics_dir(&self, track: &Track) -> PathBuf {
        self.paths.statistics.join(track.as_str())
    }

    pub fn path(&self, product: &Product, unit: &Unit) -> PathBuf {
        let pick_name = format!("{}.{}", self.product, unit.pick);
        match product {
            Product::Pick => self.pick_dir(&self.process, &unit.track).join(pick_name),
            Product::SourcePick { process, product } => self
                .pick_dir(process, &unit.track)
                .join(format!("{}.{}", product, unit.pick)),
            Product::Statistics => self.statistics_dir(&unit.track).join(pick_name),
            Product::Derived(stage) => self
                .statistics_dir(&unit.track)
                .join(format!("{}.{}", pick_name, stage.suffix())),
            Product::Geometry => self.paths.geometry.join(unit.track.as_str()).join("geometry"),
            Product::Sweeps => self.paths.geometry.join(unit.track.as_str()).join("sweeps"),
            Product::Compressed => self
                .paths
                .compressed
                .join(unit.track.as_str())
                .join(&self.product),
        }
    }

    pub fn exists(&self, product: &Product, unit: &Unit) -> bool {
        self.path(product, unit).is_file()
    }

    /// Path of the first requirement that does not exist.
    pub fn first_missing<'a, I>(&self, requirements: I) -> Option<PathBuf>
    where
        I: IntoIterator<Item = &'a Requirement>,
    {
        requirements
            .into_iter()
            .map(|req| self.path(&req.product, &req.unit))
            .find(|path| !path.is_file())
    }

    /// Picks available for `track` in the configured processing directory.
    pub fn picks(&self, track: &Track) -> StageResult<Vec<String>> {
        self.picks_in(&self.process, &self.product, track)
    }

    /// Picks named `<product>.<pick>` below `process`, in sorted file order.
    pub fn picks_in(&self, process: &str, product: &str, track: &Track) -> StageResult<Vec<String>> {
        let dir = self.pick_dir(process, track);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = format!(
            "{}/{}.*",
            Pattern::escape(&dir.to_string_lossy()),
            Pattern::escape(product)
        );
        let entries = glob::glob(&pattern)
            .map_err(|err| StageError::Internal(format!("pick listing {pattern}: {err}")))?;

        let prefix = format!("{product}.");
        let mut picks = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| StageError::io(err.path().to_path_buf(), err.into_error()))?;
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            match name.strip_prefix(&prefix) {
                // derived and intermediate files carry a further suffix
                Some(pick) if !pick.is_empty() && !pick.contains('.') => picks.push(pick.to_string()),
                _ => {}
            }
        }
        Ok(picks)
    }
}
