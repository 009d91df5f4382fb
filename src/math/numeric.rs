//! Scalar helpers shared by the schedule and ECL code.

/// Round half away from zero to `dp` decimal places.
pub fn round_to(x: f64, dp: i32) -> f64 {
    let scale = 10f64.powi(dp);
    let r = (x * scale).round() / scale;
    if r == 0.0 { 0.0 } else { r }
}

/// Round to cents.
pub fn round2(x: f64) -> f64 {
    round_to(x, 2)
}

/// Clip to `[0, 1]`; NaN maps to 0.
pub fn clip01(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}
