use crate::inversion::{from_db, to_db, BedInversion, BedObservation};
use crate::physics::spreading::{footprint_ratio, geometric_loss_db};
use crate::products::BedCoefficients;
use std::f64::consts::PI;

/// Bed coefficients behind a transmitting, rough surface.
///
/// The bed image source sits at `h0 + h1 / n1`. Received bed powers are
/// corrected for spreading to that range, two-way transmission through the
/// surface, the coherent loss due to surface roughness and the attenuation
/// through the layer. The diffuse part is normalized by the footprint.
///
/// A known surface permittivity sets the Fresnel transmission and the index
/// step across the rough interface. Without it the transmission falls back to
/// one minus the reflected surface power and the step to `n1`.
#[derive(Debug, Clone)]
pub struct TransmissionBed {
    pub bandwidth_hz: f64,
    pub wavelength_m: f64,
}

impl TransmissionBed {
    pub fn new(bandwidth_hz: f64, wavelength_m: f64) -> Self {
        Self {
            bandwidth_hz,
            wavelength_m,
        }
    }

    /// Refractive index just below the surface.
    fn surface_index(obs: &BedObservation) -> Option<f64> {
        (obs.surface_eps.is_finite() && obs.surface_eps >= 1.0).then(|| obs.surface_eps.sqrt())
    }

    /// Two-way power transmission through the surface, dB.
    fn transmission_db(&self, obs: &BedObservation) -> f64 {
        if let Some(n0) = Self::surface_index(obs) {
            let reflection = (n0 - 1.0) / (n0 + 1.0);
            return 2.0 * to_db(1.0 - reflection * reflection);
        }
        let surface_loss = geometric_loss_db(obs.h0);
        let reflected =
            from_db(obs.surface_coherent - surface_loss) + from_db(obs.surface_diffuse - surface_loss);
        let transmitted = 1.0 - reflected;
        if transmitted > 0.0 {
            2.0 * to_db(transmitted)
        } else {
            f64::NAN
        }
    }

    /// Two-way coherent loss from phase noise across the rough interface, dB.
    fn roughness_loss_db(&self, obs: &BedObservation) -> f64 {
        let k = 2.0 * PI / self.wavelength_m;
        let index = Self::surface_index(obs).unwrap_or(obs.n1);
        let phase = k * obs.sh * (index - 1.0);
        to_db((-2.0 * phase * phase).exp())
    }
}

impl BedInversion for TransmissionBed {
    fn coefficients(&self, obs: &BedObservation) -> BedCoefficients {
        let range = obs.h0 + obs.h1 / obs.n1;
        let correction =
            geometric_loss_db(range) + self.transmission_db(obs) - obs.attenuation_db;
        BedCoefficients {
            rbc: obs.bed_coherent - correction - self.roughness_loss_db(obs),
            rbn: obs.bed_diffuse - correction - to_db(footprint_ratio(range, self.bandwidth_hz)),
        }
    }
}
