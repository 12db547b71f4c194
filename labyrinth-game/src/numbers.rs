//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Round a f64 and clamp it to the i32 range, returning 0 for NaN values.
///
/// Halves round away from zero, so the magnitude of a scaled delta rounds half-up.
#[must_use]
pub fn round_f64_to_i32(value: f64) -> i32 {
    if value.is_nan() {
        return 0;
    }
    let min = cast::<i32, f64>(i32::MIN).unwrap_or(f64::MIN);
    let max = cast::<i32, f64>(i32::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(min, max).round();
    cast::<f64, i32>(clamped).unwrap_or(0)
}

/// Scale an integer delta by `factor` and round the result.
#[must_use]
pub fn scale_round(value: i32, factor: f64) -> i32 {
    round_f64_to_i32(f64::from(value) * factor)
}

/// Half of `value`, rounded up.
#[must_use]
pub const fn ceil_half(value: i32) -> i32 {
    value / 2 + value % 2
}
