pub struct StatsHelper;

/// Raw moments of the finite samples of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub count: usize,
    pub mean: f64,
    pub second: f64,
    pub fourth: f64,
}

impl StatsHelper {
    /// First, second and fourth raw moments; NaN samples are ignored.
    pub fn moments(samples: &[f64]) -> Moments {
        let mut count = 0usize;
        let (mut sum, mut sum2, mut sum4) = (0.0, 0.0, 0.0);
        for &value in samples.iter().filter(|v| v.is_finite()) {
            let sq = value * value;
            count += 1;
            sum += value;
            sum2 += sq;
            sum4 += sq * sq;
        }
        if count == 0 {
            return Moments {
                count,
                mean: f64::NAN,
                second: f64::NAN,
                fourth: f64::NAN,
            };
        }
        let n = count as f64;
        Moments {
            count,
            mean: sum / n,
            second: sum2 / n,
            fourth: sum4 / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moments_skip_non_finite_samples() {
        let moments = StatsHelper::moments(&[1.0, f64::NAN, 3.0]);
        assert_eq!(moments.count, 2);
        assert_eq!(moments.mean, 2.0);
        assert_eq!(moments.second, 5.0);
        assert_eq!(moments.fourth, 41.0);
        let empty = StatsHelper::moments(&[f64::NAN]);
        assert_eq!(empty.count, 0);
        assert!(empty.mean.is_nan());
    }
}
