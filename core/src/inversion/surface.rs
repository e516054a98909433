use crate::inversion::{from_db, to_db, PermittivityRoughness, PropertyInversion, SurfaceInversion};
use crate::physics::spreading::{footprint_ratio, geometric_loss_db};
use crate::products::SurfaceCoefficients;
use std::f64::consts::PI;

/// Coefficients of a flat specular surface seen by a pulse-limited radar.
///
/// The coherent part is corrected for spreading of the image source; the
/// diffuse part is additionally normalized by the pulse-limited footprint.
#[derive(Debug, Clone)]
pub struct PulseLimitedSurface {
    pub bandwidth_hz: f64,
}

impl PulseLimitedSurface {
    pub fn new(bandwidth_hz: f64) -> Self {
        Self { bandwidth_hz }
    }
}

impl SurfaceInversion for PulseLimitedSurface {
    fn coefficients(&self, coherent_power: f64, diffuse_power: f64, h0: f64) -> SurfaceCoefficients {
        let loss = geometric_loss_db(h0);
        SurfaceCoefficients {
            rsc: coherent_power - loss,
            rsn: diffuse_power - loss - to_db(footprint_ratio(h0, self.bandwidth_hz)),
        }
    }
}

/// Small-perturbation split of reflectance into permittivity and roughness.
///
/// With `Pc = R² exp(-g)` and `Pc + Pn = R²`, `g = (2 k sh)²`. The Fresnel
/// coefficient at nadir gives `√eps = (1 + |R|) / (1 − |R|)`.
#[derive(Debug, Clone)]
pub struct RoughnessPartition {
    pub wavelength_m: f64,
}

impl RoughnessPartition {
    pub fn new(wavelength_m: f64) -> Self {
        Self { wavelength_m }
    }
}

impl PropertyInversion for RoughnessPartition {
    fn invert(&self, coherent_power: f64, diffuse_power: f64) -> PermittivityRoughness {
        let pc = from_db(coherent_power);
        let pn = from_db(diffuse_power);
        let k = 2.0 * PI / self.wavelength_m;

        let g = (1.0 + pn / pc).ln();
        let sh = g.sqrt() / (2.0 * k);

        let reflectance = (pc + pn).sqrt();
        let eps = if reflectance < 1.0 {
            ((1.0 + reflectance) / (1.0 - reflectance)).powi(2)
        } else {
            f64::NAN
        };
        PermittivityRoughness { eps, sh }
    }
}
