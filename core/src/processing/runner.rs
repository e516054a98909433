//! Gating and dispatch of one stage over one unit.

use crate::inversion::InversionModels;
use crate::prelude::{ProcessingStage, SkipReason, StageConfig, StageOutcome, StageResult, Unit};
use crate::processing::{
    BathymetryStage, BedCoefficientsStage, StatisticsStage, SurfaceCoefficientsStage,
    SurfacePropertiesStage,
};
use crate::products::{ProductLocator, Track};
use crate::telemetry::log::LogManager;
use log::warn;
use std::sync::Arc;

/// What every stage of a run shares.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub config: StageConfig,
    pub locator: ProductLocator,
    pub models: InversionModels,
    pub logger: LogManager,
}

impl StageContext {
    /// Context with the reference inversion models.
    pub fn new(config: StageConfig, locator: ProductLocator) -> Self {
        let models = InversionModels::reference(&config);
        Self {
            config,
            locator,
            models,
            logger: LogManager::new(),
        }
    }

    pub fn with_models(mut self, models: InversionModels) -> Self {
        self.models = models;
        self
    }

    /// Surface pick of `track`: `explicit` when given, otherwise the first
    /// discovered pick whose name carries the surface marker.
    pub fn surface_pick(&self, track: &Track, explicit: Option<&str>) -> Option<String> {
        if let Some(pick) = explicit {
            return Some(pick.to_string());
        }
        let picks = match self.locator.picks(track) {
            Ok(picks) => picks,
            Err(err) => {
                warn!("cannot list picks of {}: {}", track, err);
                return None;
            }
        };
        picks
            .into_iter()
            .find(|pick| pick.contains(&self.config.surface_marker))
    }
}

/// Checks the stage's requirements and executes it when all exist.
///
/// A missing requirement skips the unit without touching the filesystem.
pub fn run_stage(stage: &dyn ProcessingStage, locator: &ProductLocator, unit: &Unit) -> StageResult<StageOutcome> {
    let logger = LogManager::new();
    let requirements = match stage.requirements(unit) {
        Ok(requirements) => requirements,
        Err(reason) => {
            logger.ignored(&reason);
            return Ok(StageOutcome::Skipped(reason));
        }
    };
    if let Some(path) = locator.first_missing(&requirements) {
        let reason = SkipReason::MissingInput(path);
        if stage.quiet_skips() {
            logger.ignored_quietly(&reason);
        } else {
            logger.ignored(&reason);
        }
        return Ok(StageOutcome::Skipped(reason));
    }

    let outcome = stage.execute(unit)?;
    match &outcome {
        StageOutcome::Completed { product, .. } => logger.created(product),
        StageOutcome::Skipped(reason) => logger.ignored(reason),
    }
    Ok(outcome)
}

/// The in-process stages, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Statistics,
    SurfaceCoefficients,
    SurfaceProperties,
    BedCoefficients,
    Bathymetry,
}

impl StageKind {
    /// `surface_pick` only matters to the stages that pair a pick with a surface.
    pub fn build(
        self,
        context: Arc<StageContext>,
        surface_pick: Option<String>,
    ) -> StageResult<Box<dyn ProcessingStage>> {
        Ok(match self {
            StageKind::Statistics => Box::new(StatisticsStage::new(context)),
            StageKind::SurfaceCoefficients => Box::new(SurfaceCoefficientsStage::new(context)),
            StageKind::SurfaceProperties => Box::new(SurfacePropertiesStage::new(context)),
            StageKind::BedCoefficients => Box::new(BedCoefficientsStage::new(context, surface_pick)),
            StageKind::Bathymetry => Box::new(BathymetryStage::new(context, surface_pick)?),
        })
    }
}
