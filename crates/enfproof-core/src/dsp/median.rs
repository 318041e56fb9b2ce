//! Time-domain median filtering
//!
//! Mains-tracking jitter is impulsive, so the smoother has to be a median,
//! not a mean. Edges are zero-padded; the outlier mask downstream discards
//! the resulting edge artifacts.

/// Apply a sliding median with an odd `kernel_len`.
pub fn median_filter(x: &[f64], kernel_len: usize) -> Vec<f64> {
    assert!(kernel_len % 2 == 1, "median kernel length must be odd");

    if x.is_empty() || kernel_len == 1 {
        return x.to_vec();
    }

    let half = kernel_len / 2;
    let mut out = Vec::with_capacity(x.len());
    let mut window = Vec::with_capacity(kernel_len);

    for center in 0..x.len() {
        window.clear();
        for offset in 0..kernel_len {
            let idx = center as isize + offset as isize - half as isize;
            if idx < 0 || idx >= x.len() as isize {
                window.push(0.0);
            } else {
                window.push(x[idx as usize]);
            }
        }
        let (_, median, _) =
            window.select_nth_unstable_by(half, |a, b| a.partial_cmp(b).unwrap());
        out.push(*median);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suppresses_impulse() {
        let mut x = vec![50.0; 101];
        x[50] = 500.0;
        let y = median_filter(&x, 5);
        assert_eq!(y[50], 50.0);
    }

    #[test]
    fn test_preserves_slow_ramp() {
        let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let y = median_filter(&x, 5);
        // Interior of a monotone ramp is a fixed point of the median.
        assert_eq!(&y[10..90], &x[10..90]);
    }

    #[test]
    fn test_zero_padded_edges() {
        let x = vec![10.0; 20];
        let y = median_filter(&x, 5);
        // With two zeros padded in, the first sample's window is
        // [0, 0, 10, 10, 10] -> median 10; index 0 of a kernel-3 filter
        // over [0, 10, 10] is 10 as well.
        assert_eq!(y[0], 10.0);
        assert_eq!(y[19], 10.0);
    }

    #[test]
    fn test_kernel_one_is_identity() {
        let x = vec![3.0, 1.0, 2.0];
        assert_eq!(median_filter(&x, 1), x);
    }
}
