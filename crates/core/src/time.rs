use chrono::Utc;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Nanosecond timestamp to epoch milliseconds, truncating toward zero.
pub fn nanos_to_millis(nanos: u64) -> i64 {
    (nanos / 1_000_000) as i64
}

/// Span duration in fractional milliseconds from nanosecond bounds.
pub fn nanos_span_millis(start_nanos: u64, end_nanos: u64) -> f64 {
    (end_nanos.saturating_sub(start_nanos)) as f64 / 1e6
}
