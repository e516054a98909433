/// Right-pads `values` with NaN up to `len`; never truncates.
pub fn pad_to(values: &[f64], len: usize) -> Vec<f64> {
    let mut padded = values.to_vec();
    if padded.len() < len {
        padded.resize(len, f64::NAN);
    }
    padded
}

/// Pads the shorter of two sequences with NaN so both share the longer length.
pub fn pad_to_common_length(a: &[f64], b: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let len = a.len().max(b.len());
    (pad_to(a, len), pad_to(b, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorter_side_is_padded_prefix_untouched() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [9.0, 8.0];
        let (pa, pb) = pad_to_common_length(&a, &b);
        assert_eq!(pa.len(), 5);
        assert_eq!(pb.len(), 5);
        assert_eq!(pa, a.to_vec());
        assert_eq!(&pb[..2], &b);
        assert!(pb[2..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn padding_is_symmetric_in_argument_order() {
        for (m, n) in [(0, 3), (3, 0), (4, 4), (1, 7)] {
            let a: Vec<f64> = (0..m).map(|i| i as f64).collect();
            let b: Vec<f64> = (0..n).map(|i| -(i as f64)).collect();
            let (pa, pb) = pad_to_common_length(&a, &b);
            assert_eq!(pa.len(), m.max(n));
            assert_eq!(pb.len(), m.max(n));
            assert_eq!(&pa[..m.min(n)], &a[..m.min(n)]);
            assert_eq!(&pb[..m.min(n)], &b[..m.min(n)]);
        }
    }

    #[test]
    fn pad_to_never_truncates() {
        assert_eq!(pad_to(&[1.0, 2.0], 1), vec![1.0, 2.0]);
    }
}
