//! Physical transforms shared by the stages.

pub mod calibration;
pub mod depth;
pub mod firn;
pub mod spreading;

pub use calibration::{calibrate, Calibration};
pub use depth::{DepthEstimate, DepthInversion};
pub use spreading::{geometric_loss, geometric_loss_db};

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
