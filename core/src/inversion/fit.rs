use crate::inversion::{to_db, EchoFit, EchoStatistics};
use crate::math::stats::StatsHelper;

/// Rice fit by the method of moments.
///
/// For a Rice amplitude with coherent power `a²` and diffuse power `s`,
/// `<A²> = a² + s` and `<A⁴> = a⁴ + 4a²s + 2s²`, so `a⁴ = 2<A²>² − <A⁴>`.
/// Goodness is the relative misfit of the predicted sixth moment.
#[derive(Debug, Clone)]
pub struct MomentFit {
    /// Fewest finite samples a window needs to be fitted.
    pub min_samples: usize,
}

impl Default for MomentFit {
    fn default() -> Self {
        Self { min_samples: 4 }
    }
}

impl EchoFit for MomentFit {
    fn fit(&self, amplitudes: &[f64]) -> EchoStatistics {
        let moments = StatsHelper::moments(amplitudes);
        if moments.count < self.min_samples.max(1) || !(moments.second > 0.0) {
            return EchoStatistics::EMPTY;
        }

        let m2 = moments.second;
        let m4 = moments.fourth;
        let a4 = (2.0 * m2 * m2 - m4).max(0.0);
        let coherent = a4.sqrt();
        let diffuse = (m2 - coherent).max(0.0);

        let m6 = amplitudes
            .iter()
            .filter(|v| v.is_finite())
            .map(|v| v.powi(6))
            .sum::<f64>()
            / moments.count as f64;
        let predicted_m6 = a4 * coherent + 9.0 * a4 * diffuse + 18.0 * coherent * diffuse.powi(2)
            + 6.0 * diffuse.powi(3);

        EchoStatistics {
            total_power: to_db(m2),
            coherent_power: to_db(coherent),
            diffuse_power: to_db(diffuse),
            mixture: m2 * m2 / (m4 - m2 * m2),
            coherence: coherent / m2,
            goodness: (m6 - predicted_m6).abs() / m6,
            valid: a4 > 0.0,
        }
    }
}
