//! Derived-product core for radar statistical reconstruction.
//!
//! Picked echoes along a flight line are calibrated, fitted window by window,
//! and inverted into surface and bed coefficients, surface properties and
//! subsurface depth. Every product is a flat file located through
//! [`products::ProductLocator`]; stages only run once their inputs exist.

pub mod aggregate;
pub mod inversion;
pub mod math;
pub mod physics;
pub mod prelude;
pub mod processing;
pub mod products;
pub mod telemetry;

pub use aggregate::{AggregateRow, Aggregator};
pub use prelude::{ProcessingStage, StageConfig, StageError, StageOutcome, StageResult, Unit};
pub use processing::{run_stage, StageContext, StageKind};
