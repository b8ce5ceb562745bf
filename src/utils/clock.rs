use std::time::Duration;

/// MPEG system clock rate for PTS values.
pub const PTS_HZ: i64 = 90_000;

/// Converts seconds to clock ticks.
pub fn secs_to_ticks(secs: f64) -> f64 {
    secs * PTS_HZ as f64
}

/// Converts a tick count to a `Duration`, clamping negative values to zero.
pub fn ticks_to_time(ticks: f64) -> Duration {
    if ticks <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(ticks / PTS_HZ as f64)
}

/// Converts a tick count to milliseconds.
pub fn ticks_to_millis(ticks: f64) -> f64 {
    ticks * 1000.0 / PTS_HZ as f64
}

/// Signed difference `cur - prev` of two raw PTS values, taken modulo 2^32.
///
/// Raw PTS is 33 bits wide and wraps; truncating the difference to 32 bits
/// folds the wrap away while keeping small backward steps negative.
pub fn wrapped_delta(cur: i64, prev: i64) -> i64 {
    cur.wrapping_sub(prev) as i32 as i64
}

/// Renders ticks as `HH:MM:SS.mmm` for log lines.
pub fn format_ticks(ticks: f64) -> String {
    let sign = if ticks < 0.0 { "-" } else { "" };
    let total_ms = ticks_to_millis(ticks.abs()).round() as u64;
    let ms = total_ms % 1000;
    let secs = total_ms / 1000;
    format!(
        "{}{:02}:{:02}:{:02}.{:03}",
        sign,
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        ms
    )
}
