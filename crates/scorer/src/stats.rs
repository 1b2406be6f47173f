/// Linear-interpolated percentile, `p` in percent. 0 for an empty sample.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    let k = (v.len() as f64 - 1.0) * (p.clamp(0.0, 100.0) / 100.0);
    let lo = k.floor() as usize;
    let hi = k.ceil() as usize;
    if lo == hi {
        return v[lo];
    }
    let w = k - lo as f64;
    v[lo] * (1.0 - w) + v[hi] * w
}

/// Weighted mean with negative weights treated as 0; 0 if no weight remains.
pub fn normalized_weighted_sum(values: &[f64], weights: &[f64]) -> f64 {
    let (sum, sum_w) = values
        .iter()
        .zip(weights)
        .fold((0.0, 0.0), |(sum, sum_w), (v, w)| {
            let w = w.max(0.0);
            (sum + w * v, sum_w + w)
        });
    if sum_w > 0.0 {
        sum / sum_w
    } else {
        0.0
    }
}
