//! Calendar time aliases and span arithmetic helpers.
//!
//! Coupled environmental models step through simulated calendar time, so
//! instants are `chrono::NaiveDateTime` and spans are `chrono::TimeDelta`.
//! Nothing in the framework reads the wall clock; every timestamp enters
//! through component configuration or pushed data.

/// A simulated calendar instant.
///
/// Total ordering and instant/span arithmetic come from chrono. Timezone
/// handling is deliberately absent: compositions run in an abstract
/// calendar, and reprojection between calendars is a component concern.
pub type Time = chrono::NaiveDateTime;

/// A span between two simulated instants.
pub type TimeSpan = chrono::TimeDelta;

/// The length of a span in seconds, as a float.
///
/// Used for interpolation fractions and time-weighted integration.
/// Microsecond precision where representable; falls back to millisecond
/// precision for spans that overflow the microsecond count.
pub fn span_seconds(span: TimeSpan) -> f64 {
    match span.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => span.num_milliseconds() as f64 / 1e3,
    }
}

/// The fraction `(t - t0) / (t1 - t0)`, for interpolating between two
/// bracketing samples.
///
/// Returns `None` when `t0 == t1` (degenerate bracket).
pub fn span_fraction(t: Time, t0: Time, t1: Time) -> Option<f64> {
    let whole = span_seconds(t1 - t0);
    if whole == 0.0 {
        return None;
    }
    Some(span_seconds(t - t0) / whole)
}
