pub mod bathymetry;
pub mod bed;
pub mod runner;
pub mod statistics;
pub mod surface;

pub use bathymetry::BathymetryStage;
pub use bed::BedCoefficientsStage;
pub use runner::{run_stage, StageContext, StageKind};
pub use statistics::StatisticsStage;
pub use surface::{SurfaceCoefficientsStage, SurfacePropertiesStage};
