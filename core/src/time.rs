//! Time display helpers shared by every backend.

/// Shown whenever a time value is not known yet.
pub const TIME_PLACEHOLDER: &str = "--:--";

/// Format seconds as `m:ss`.
///
/// Values are truncated, never rounded, and there is no hour component:
/// an hour and a half renders as `90:00`. NaN, infinite and negative inputs
/// render as [`TIME_PLACEHOLDER`].
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return TIME_PLACEHOLDER.to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Format the `position / duration` label of the time display.
pub fn format_progress(position: f64, duration: f64) -> String {
    let duration = if duration > 0.0 { duration } else { f64::NAN };
    let position = if duration.is_nan() { f64::NAN } else { position };
    format!("{} / {}", format_time(position), format_time(duration))
}

/// Fraction of `duration` covered by `position`, always within `[0, 1]`.
///
/// Unknown or zero durations yield `0.0` rather than NaN or infinity.
pub fn progress_fraction(position: f64, duration: f64) -> f64 {
    if !duration.is_finite() || duration <= 0.0 || !position.is_finite() {
        return 0.0;
    }
    (position / duration).clamp(0.0, 1.0)
}

/// Returns `Some(duration)` only when the backend actually knows it.
pub(crate) fn known_duration(duration: f64) -> Option<f64> {
    (duration.is_finite() && duration > 0.0).then_some(duration)
}
