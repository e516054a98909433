use crate::math::align::pad_to_common_length;
use crate::physics::spreading::geometric_loss_db;
use crate::physics::SPEED_OF_LIGHT;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Instrument calibration turning raw counts into power in dB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Counts to dB.
    pub scale: f64,
    pub wavelength_m: f64,
    pub transmit_power_db: f64,
    /// Two-way antenna gain.
    pub antenna_gain_db: f64,
    /// Offset fitted over a reference area of known permittivity.
    pub absolute_db: f64,
    /// Receiver channel gain.
    pub channel_gain_db: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            scale: 1.0 / 1000.0,
            wavelength_m: SPEED_OF_LIGHT / 60e6,
            transmit_power_db: 67.0,
            antenna_gain_db: 2.0 * 9.2,
            absolute_db: 6.03,
            channel_gain_db: -191.9,
        }
    }
}

impl Calibration {
    /// Scale only, no instrument gains.
    pub fn unity(scale: f64) -> Self {
        Self {
            scale,
            wavelength_m: 1.0,
            transmit_power_db: 0.0,
            antenna_gain_db: 0.0,
            absolute_db: 0.0,
            channel_gain_db: 0.0,
        }
    }

    pub fn offset_db(&self) -> f64 {
        -20.0 * self.wavelength_m.log10() - self.transmit_power_db - self.antenna_gain_db
            + self.absolute_db
            + self.channel_gain_db
    }

    /// Calibrated power per sample.
    ///
    /// With `geometric_correction` and a range, the spreading loss at each
    /// sample is added back as gain. The shorter of `raw`/`range` is padded
    /// with NaN, so the output has the longer length.
    pub fn apply(&self, raw: &[f64], range: Option<&[f64]>, geometric_correction: bool) -> Vec<f64> {
        let offset = self.offset_db();
        match range.filter(|_| geometric_correction) {
            Some(range) => {
                let (raw, range) = pad_to_common_length(raw, range);
                let loss = Array1::from(range).mapv(geometric_loss_db);
                let power = Array1::from(raw) * self.scale + offset - loss;
                power.to_vec()
            }
            None => (Array1::from(raw.to_vec()) * self.scale + offset).to_vec(),
        }
    }
}

/// Scale-only calibration, optionally corrected for spreading loss.
pub fn calibrate(
    raw: &[f64],
    scale: f64,
    reference_range: Option<&[f64]>,
    geometric_correction: bool,
) -> Vec<f64> {
    Calibration::unity(scale).apply(raw, reference_range, geometric_correction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn scale_only_is_linear_in_scale() {
        let raw = [1200.0, -40.0, 0.0, 98_765.4];
        let base = calibrate(&raw, 0.001, None, false);
        let tripled = calibrate(&raw, 0.003, None, false);
        for (b, t) in base.iter().zip(&tripled) {
            assert_relative_eq!(*t, 3.0 * b, max_relative = 1e-12);
        }
    }

    #[test]
    fn correction_adds_spreading_loss_back() {
        let out = calibrate(&[10_000.0], 0.001, Some(&[1000.0]), true);
        assert_relative_eq!(out[0], 10.0 + 20.0 * 2000f64.log10(), epsilon = 1e-9);
    }

    #[test]
    fn correction_flag_off_ignores_range() {
        let out = calibrate(&[1000.0, 2000.0], 0.01, Some(&[500.0]), false);
        assert_eq!(out.len(), 2);
        assert_relative_eq!(out[1], 20.0, epsilon = 1e-12);
    }

    #[test]
    fn length_mismatch_pads_with_nan() {
        let out = calibrate(&[1000.0, 2000.0], 0.01, Some(&[500.0, 500.0, 500.0]), true);
        assert_eq!(out.len(), 3);
        assert!(out[0].is_finite());
        assert!(out[2].is_nan());

        let out = calibrate(&[1000.0, 2000.0, 3000.0], 0.01, Some(&[500.0]), true);
        assert_eq!(out.len(), 3);
        assert!(out[1].is_nan());
    }

    #[test]
    fn all_nan_input_propagates() {
        let out = calibrate(&[f64::NAN; 4], 0.001, Some(&[100.0; 4]), true);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn instrument_offset_matches_gain_budget() {
        let cal = Calibration::default();
        let expected = -20.0 * (SPEED_OF_LIGHT / 60e6).log10() - 67.0 - 18.4 + 6.03 - 191.9;
        assert_relative_eq!(cal.offset_db(), expected, epsilon = 1e-9);
        let out = cal.apply(&[0.0], None, false);
        assert_relative_eq!(out[0], expected, epsilon = 1e-9);
    }
}
