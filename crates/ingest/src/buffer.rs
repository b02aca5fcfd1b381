use std::mem;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use otelbase_core::model::log::LogItem;
use otelbase_core::model::trace::TraceItem;

/// The shared pending buffer between the bus reader and the flusher.
///
/// The mutex guards only appends, length reads, and the swap; callers do
/// all persistence I/O outside the lock.
pub struct TelemetryBuffer {
    inner: Mutex<Inner>,
}

struct Inner {
    traces: Vec<TraceItem>,
    logs: Vec<LogItem>,
    last_flush: Instant,
}

impl TelemetryBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                traces: Vec::new(),
                logs: Vec::new(),
                last_flush: Instant::now(),
            }),
        }
    }

    pub fn push_traces(&self, items: Vec<TraceItem>) {
        if items.is_empty() {
            return;
        }
        self.lock().traces.extend(items);
    }

    pub fn push_logs(&self, items: Vec<LogItem>) {
        if items.is_empty() {
            return;
        }
        self.lock().logs.extend(items);
    }

    pub fn lengths(&self) -> (usize, usize) {
        let inner = self.lock();
        (inner.traces.len(), inner.logs.len())
    }

    pub fn elapsed_since_flush(&self) -> Duration {
        self.lock().last_flush.elapsed()
    }

    /// Takes the pending lists and stamps the flush time, even when both
    /// lists are empty.
    pub fn swap(&self) -> (Vec<TraceItem>, Vec<LogItem>) {
        let mut inner = self.lock();
        inner.last_flush = Instant::now();
        (mem::take(&mut inner.traces), mem::take(&mut inner.logs))
    }

    /// Puts a failed batch back at the head of the queue so the next
    /// flush retries it before newer records.
    pub fn requeue_traces(&self, mut items: Vec<TraceItem>) {
        let mut inner = self.lock();
        items.extend(mem::take(&mut inner.traces));
        inner.traces = items;
    }

    pub fn requeue_logs(&self, mut items: Vec<LogItem>) {
        let mut inner = self.lock();
        items.extend(mem::take(&mut inner.logs));
        inner.logs = items;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("telemetry buffer mutex poisoned")
    }
}

impl Default for TelemetryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use otelbase_core::model::attr::AttrMap;
    use otelbase_core::model::log::Severity;
    use otelbase_core::model::trace::SpanStatus;

    use super::*;

    fn trace(name: &str) -> TraceItem {
        TraceItem {
            id: format!("t-{name}"),
            trace_id: "t".into(),
            span_id: name.into(),
            parent_span_id: None,
            name: name.into(),
            service_name: "svc".into(),
            start_time: 1,
            end_time: 2,
            duration: 1.0,
            status: SpanStatus::Unset,
            attributes: AttrMap::new(),
        }
    }

    fn log(msg: &str) -> LogItem {
        LogItem {
            id: format!("l-{msg}"),
            timestamp: 1,
            service_name: "svc".into(),
            message: msg.into(),
            severity: Severity::Info,
            trace_id: None,
            span_id: None,
            attributes: AttrMap::new(),
        }
    }

    #[test]
    fn swap_empties_both_lists() {
        let buffer = TelemetryBuffer::new();
        buffer.push_traces(vec![trace("a")]);
        buffer.push_logs(vec![log("x"), log("y")]);

        let (traces, logs) = buffer.swap();
        assert_eq!(traces.len(), 1);
        assert_eq!(logs.len(), 2);
        assert_eq!(buffer.lengths(), (0, 0));
    }

    #[test]
    fn empty_swap_still_stamps_flush_time() {
        let buffer = TelemetryBuffer::new();
        std::thread::sleep(Duration::from_millis(15));
        assert!(buffer.elapsed_since_flush() >= Duration::from_millis(10));

        let (traces, logs) = buffer.swap();
        assert!(traces.is_empty() && logs.is_empty());
        assert!(buffer.elapsed_since_flush() < Duration::from_millis(10));
    }

    #[test]
    fn requeue_prepends_failed_batch() {
        let buffer = TelemetryBuffer::new();
        buffer.push_logs(vec![log("old")]);
        let (_, failed) = buffer.swap();

        buffer.push_logs(vec![log("new")]);
        buffer.requeue_logs(failed);

        let (_, logs) = buffer.swap();
        assert_eq!(logs[0].message, "old");
        assert_eq!(logs[1].message, "new");
    }
}
