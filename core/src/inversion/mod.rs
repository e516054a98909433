//! Seams for the echo fit and the backscatter inversions.
//!
//! The stages only see these traits; `InversionModels::reference` wires the
//! moment-based implementations shipped with the crate.

pub mod bed;
pub mod fit;
pub mod surface;

pub use bed::TransmissionBed;
pub use fit::MomentFit;
pub use surface::{PulseLimitedSurface, RoughnessPartition};

use crate::prelude::StageConfig;
use crate::products::{BedCoefficients, SurfaceCoefficients};
use std::sync::Arc;

/// Amplitude-distribution parameters of one window. Powers in dB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoStatistics {
    pub total_power: f64,
    pub coherent_power: f64,
    pub diffuse_power: f64,
    pub mixture: f64,
    pub coherence: f64,
    pub goodness: f64,
    pub valid: bool,
}

impl EchoStatistics {
    pub const EMPTY: EchoStatistics = EchoStatistics {
        total_power: f64::NAN,
        coherent_power: f64::NAN,
        diffuse_power: f64::NAN,
        mixture: f64::NAN,
        coherence: f64::NAN,
        goodness: f64::NAN,
        valid: false,
    };
}

/// Fits the amplitude distribution of one window of linear amplitudes.
pub trait EchoFit: Send + Sync {
    fn fit(&self, amplitudes: &[f64]) -> EchoStatistics;
}

/// Received coherent/diffuse surface powers (dB) at range `h0` to coefficients.
pub trait SurfaceInversion: Send + Sync {
    fn coefficients(&self, coherent_power: f64, diffuse_power: f64, h0: f64) -> SurfaceCoefficients;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PermittivityRoughness {
    pub eps: f64,
    /// RMS height, m.
    pub sh: f64,
}

/// Loss-corrected coherent/diffuse powers (dB) to permittivity and roughness.
pub trait PropertyInversion: Send + Sync {
    fn invert(&self, coherent_power: f64, diffuse_power: f64) -> PermittivityRoughness;
}

/// Everything the bed inversion consumes for one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BedObservation {
    /// Received surface powers, dB.
    pub surface_coherent: f64,
    pub surface_diffuse: f64,
    /// Received bed powers, dB.
    pub bed_coherent: f64,
    pub bed_diffuse: f64,
    /// Refractive index of the layer above the bed.
    pub n1: f64,
    /// Surface RMS height, m.
    pub sh: f64,
    /// Surface permittivity from the surface properties; NaN when unknown.
    pub surface_eps: f64,
    /// Range to the surface, m.
    pub h0: f64,
    /// Layer thickness, m.
    pub h1: f64,
    /// Two-way attenuation through the layer, dB.
    pub attenuation_db: f64,
}

pub trait BedInversion: Send + Sync {
    fn coefficients(&self, observation: &BedObservation) -> BedCoefficients;
}

/// The set of models a stage context carries.
#[derive(Clone)]
pub struct InversionModels {
    pub fit: Arc<dyn EchoFit>,
    pub surface: Arc<dyn SurfaceInversion>,
    pub properties: Arc<dyn PropertyInversion>,
    pub bed: Arc<dyn BedInversion>,
}

impl InversionModels {
    pub fn reference(config: &StageConfig) -> Self {
        let wavelength = config.wavelength_m();
        Self {
            fit: Arc::new(MomentFit::default()),
            surface: Arc::new(PulseLimitedSurface::new(config.bandwidth_hz)),
            properties: Arc::new(RoughnessPartition::new(wavelength)),
            bed: Arc::new(TransmissionBed::new(config.bandwidth_hz, wavelength)),
        }
    }
}

impl std::fmt::Debug for InversionModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InversionModels").finish_non_exhaustive()
    }
}

/// dB to linear power.
pub(crate) fn from_db(value: f64) -> f64 {
    10f64.powf(value / 10.0)
}

/// Linear power to dB.
pub(crate) fn to_db(value: f64) -> f64 {
    10.0 * value.log10()
}
