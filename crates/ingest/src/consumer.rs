use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use otelbase_core::config::KafkaConfig;
use otelbase_core::error::{OtelbaseError, Result};
use otelbase_core::model::log::LogItem;
use otelbase_core::model::trace::TraceItem;
use otelbase_store::service::{LogService, TraceService};

use crate::buffer::TelemetryBuffer;
use crate::otlp::OtlpDecoder;

const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const RECONNECT_PAUSE: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Where flushed batches land. The production sink is the service layer;
/// tests substitute their own.
pub trait TelemetrySink: Send + Sync + 'static {
    fn save_traces<'a>(
        &'a self,
        batch: &'a [TraceItem],
    ) -> impl Future<Output = Result<()>> + Send + 'a;

    fn save_logs<'a>(
        &'a self,
        batch: &'a [LogItem],
    ) -> impl Future<Output = Result<()>> + Send + 'a;
}

/// The service-layer sink used by the composition root.
pub struct ServiceSink {
    pub traces: TraceService,
    pub logs: LogService,
}

impl TelemetrySink for ServiceSink {
    fn save_traces<'a>(
        &'a self,
        batch: &'a [TraceItem],
    ) -> impl Future<Output = Result<()>> + Send + 'a {
        self.traces.save_traces(batch)
    }

    fn save_logs<'a>(
        &'a self,
        batch: &'a [LogItem],
    ) -> impl Future<Output = Result<()>> + Send + 'a {
        self.logs.save_logs(batch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Stopped,
    Starting,
    Running,
    Reconnecting,
}

/// Kafka ingestion pipeline: one reader task polling the bus, one flusher
/// task on the configured interval, both sharing the pending buffer.
///
/// Delivery is at-least-once; the store's upsert keys make replays
/// idempotent.
pub struct IngestPipeline<S: TelemetrySink> {
    core: Arc<PipelineCore<S>>,
    reader: Option<JoinHandle<()>>,
    flusher: Option<JoinHandle<()>>,
}

struct PipelineCore<S: TelemetrySink> {
    cfg: KafkaConfig,
    sink: S,
    decoder: OtlpDecoder,
    buffer: TelemetryBuffer,
    state: Mutex<ConsumerState>,
    decode_failures: AtomicU64,
    shutdown: CancellationToken,
}

impl<S: TelemetrySink> IngestPipeline<S> {
    pub fn new(cfg: KafkaConfig, sink: S, shutdown: CancellationToken) -> Self {
        Self {
            core: Arc::new(PipelineCore {
                cfg,
                sink,
                decoder: OtlpDecoder::new(),
                buffer: TelemetryBuffer::new(),
                state: Mutex::new(ConsumerState::Stopped),
                decode_failures: AtomicU64::new(0),
                shutdown,
            }),
            reader: None,
            flusher: None,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.core.state()
    }

    /// Pending buffer depth, for operators watching backpressure.
    pub fn buffer_depth(&self) -> (usize, usize) {
        self.core.buffer.lengths()
    }

    pub fn decode_failures(&self) -> u64 {
        self.core.decode_failures.load(Ordering::Relaxed)
    }

    pub async fn start(&mut self) -> Result<()> {
        if matches!(
            self.state(),
            ConsumerState::Starting | ConsumerState::Running
        ) {
            info!("bus consumer is already running");
            return Ok(());
        }
        self.core.set_state(ConsumerState::Starting);

        let consumer = match connect(&self.core.cfg) {
            Ok(c) => c,
            Err(e) => {
                self.core.set_state(ConsumerState::Stopped);
                return Err(e);
            }
        };
        self.core.set_state(ConsumerState::Running);

        self.reader = Some(tokio::spawn(run_reader(self.core.clone(), consumer)));
        self.flusher = Some(tokio::spawn(run_flusher(self.core.clone())));
        info!("bus consumer started");
        Ok(())
    }

    /// Cancels both tasks, waits for them, runs one final flush, and
    /// leaves the pipeline in the terminal `Stopped` state. The client is
    /// closed when the reader drops it.
    pub async fn stop(&mut self) {
        self.core.shutdown.cancel();
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
        if let Some(flusher) = self.flusher.take() {
            let _ = flusher.await;
        }
        if let Err(e) = self.core.flush().await {
            warn!(error = %e, "final flush during shutdown failed");
        }
        self.core.set_state(ConsumerState::Stopped);
        info!("bus consumer stopped");
    }

    pub async fn flush(&self) -> Result<()> {
        self.core.flush().await
    }

    #[cfg(test)]
    fn buffer(&self) -> &TelemetryBuffer {
        &self.core.buffer
    }
}

impl<S: TelemetrySink> PipelineCore<S> {
    fn state(&self) -> ConsumerState {
        *self.state.lock().expect("consumer state mutex poisoned")
    }

    fn set_state(&self, next: ConsumerState) {
        *self.state.lock().expect("consumer state mutex poisoned") = next;
    }

    /// Swaps the pending lists out and persists them. A failed batch goes
    /// back to the head of the buffer and the error surfaces to the
    /// caller.
    async fn flush(&self) -> Result<()> {
        let (traces, logs) = self.buffer.swap();
        let mut failed = None;

        if !traces.is_empty() {
            info!(count = traces.len(), "flushing trace batch");
            if let Err(e) = self.sink.save_traces(&traces).await {
                error!(error = %e, count = traces.len(), "trace batch persist failed, re-buffering");
                self.buffer.requeue_traces(traces);
                failed = Some(e);
            }
        }

        if !logs.is_empty() {
            info!(count = logs.len(), "flushing log batch");
            if let Err(e) = self.sink.save_logs(&logs).await {
                error!(error = %e, count = logs.len(), "log batch persist failed, re-buffering");
                self.buffer.requeue_logs(logs);
                failed = Some(e);
            }
        }

        match failed {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn handle_payload(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let data = self.decoder.decompress(payload)?;
        if topic == self.cfg.traces_topic {
            let traces = self.decoder.decode_traces(&data)?;
            debug!(count = traces.len(), "decoded trace payload");
            self.buffer.push_traces(traces);
        } else if topic == self.cfg.logs_topic {
            let logs = self.decoder.decode_logs(&data)?;
            debug!(count = logs.len(), "decoded log payload");
            self.buffer.push_logs(logs);
        } else {
            warn!(topic, "message from unexpected topic");
        }
        Ok(())
    }

    fn should_flush(&self) -> bool {
        let (traces, logs) = self.buffer.lengths();
        traces >= self.cfg.batch_size
            || logs >= self.cfg.batch_size
            || self.buffer.elapsed_since_flush() >= self.cfg.flush_interval
    }
}

async fn run_reader<S: TelemetrySink>(core: Arc<PipelineCore<S>>, mut consumer: StreamConsumer) {
    loop {
        tokio::select! {
            _ = core.shutdown.cancelled() => {
                info!("bus reader stopping");
                break;
            }
            polled = tokio::time::timeout(POLL_TIMEOUT, consumer.recv()) => {
                match polled {
                    // Poll window elapsed without a message.
                    Err(_) => {}
                    Ok(Ok(message)) => {
                        if let Some(payload) = message.payload() {
                            if let Err(e) = core.handle_payload(message.topic(), payload) {
                                core.decode_failures.fetch_add(1, Ordering::Relaxed);
                                warn!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "dropping undecodable payload"
                                );
                            }
                        }
                        if core.should_flush() {
                            if let Err(e) = core.flush().await {
                                warn!(error = %e, "flush after append failed");
                            }
                        }
                    }
                    Ok(Err(err)) if is_fatal(&err) => {
                        error!(error = %err, "fatal bus error, closing client");
                        core.set_state(ConsumerState::Reconnecting);
                        drop(consumer);
                        if let Err(e) = core.flush().await {
                            warn!(error = %e, "flush before reconnect failed");
                        }
                        tokio::time::sleep(RECONNECT_PAUSE).await;
                        match reconnect(&core).await {
                            Some(next) => {
                                core.set_state(ConsumerState::Running);
                                consumer = next;
                            }
                            None => {
                                core.set_state(ConsumerState::Stopped);
                                error!("bus reconnect attempts exhausted, reader terminating");
                                break;
                            }
                        }
                    }
                    Ok(Err(err)) => {
                        warn!(error = %err, "bus receive error");
                    }
                }
            }
        }
    }
}

async fn run_flusher<S: TelemetrySink>(core: Arc<PipelineCore<S>>) {
    let mut ticker = tokio::time::interval(core.cfg.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = core.shutdown.cancelled() => {
                info!("flush ticker stopping");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = core.flush().await {
                    warn!(error = %e, "interval flush failed");
                }
            }
        }
    }
}

async fn reconnect<S: TelemetrySink>(core: &PipelineCore<S>) -> Option<StreamConsumer> {
    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        match connect(&core.cfg) {
            Ok(consumer) => {
                info!(attempt, "bus reconnected");
                return Some(consumer);
            }
            Err(e) => {
                let delay = backoff_delay(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "reconnect attempt failed");
                tokio::time::sleep(delay).await;
            }
        }
    }
    None
}

fn connect(cfg: &KafkaConfig) -> Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", cfg.brokers.join(","))
        .set("group.id", &cfg.group_id)
        .set("client.id", &cfg.client_id)
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "true")
        .set("auto.commit.interval.ms", "5000")
        .set("session.timeout.ms", "30000")
        .set("heartbeat.interval.ms", "5000")
        .set("partition.assignment.strategy", "roundrobin")
        .set("reconnect.backoff.ms", "1000")
        .set("reconnect.backoff.max.ms", "10000")
        .set("socket.keepalive.enable", "true")
        .create()
        .map_err(|e| OtelbaseError::Ingest(format!("failed to create bus consumer: {e}")))?;

    let topics = [cfg.traces_topic.as_str(), cfg.logs_topic.as_str()];
    consumer
        .subscribe(&topics)
        .map_err(|e| OtelbaseError::Ingest(format!("failed to subscribe to topics: {e}")))?;
    info!(topics = ?topics, "subscribed to bus topics");

    Ok(consumer)
}

fn is_fatal(err: &KafkaError) -> bool {
    matches!(
        err.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::AllBrokersDown
                | RDKafkaErrorCode::BrokerTransportFailure
                | RDKafkaErrorCode::NetworkException
        )
    )
}

/// 1s, 2s, 4s, 8s, then capped at 10s.
fn backoff_delay(attempt: u32) -> Duration {
    let secs = 1u64 << attempt.saturating_sub(1).min(4);
    Duration::from_secs(secs.min(10))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use otelbase_core::model::attr::AttrMap;
    use otelbase_core::model::log::Severity;

    use super::*;

    struct FlakySink {
        fail: AtomicBool,
        saved_logs: AtomicU64,
        saved_traces: AtomicU64,
    }

    impl FlakySink {
        fn new(fail: bool) -> Self {
            Self {
                fail: AtomicBool::new(fail),
                saved_logs: AtomicU64::new(0),
                saved_traces: AtomicU64::new(0),
            }
        }
    }

    impl TelemetrySink for FlakySink {
        fn save_traces<'a>(
            &'a self,
            batch: &'a [TraceItem],
        ) -> impl Future<Output = Result<()>> + Send + 'a {
            async move {
                if self.fail.load(Ordering::SeqCst) {
                    return Err(OtelbaseError::Store("down".into()));
                }
                self.saved_traces.fetch_add(batch.len() as u64, Ordering::SeqCst);
                Ok(())
            }
        }

        fn save_logs<'a>(
            &'a self,
            batch: &'a [LogItem],
        ) -> impl Future<Output = Result<()>> + Send + 'a {
            async move {
                if self.fail.load(Ordering::SeqCst) {
                    return Err(OtelbaseError::Store("down".into()));
                }
                self.saved_logs.fetch_add(batch.len() as u64, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn log_item(msg: &str) -> LogItem {
        LogItem {
            id: msg.into(),
            timestamp: 1,
            service_name: "svc".into(),
            message: msg.into(),
            severity: Severity::Info,
            trace_id: None,
            span_id: None,
            attributes: AttrMap::new(),
        }
    }

    fn pipeline(fail: bool) -> IngestPipeline<FlakySink> {
        IngestPipeline::new(
            KafkaConfig {
                brokers: vec!["localhost:9092".into()],
                group_id: "g".into(),
                client_id: "c".into(),
                traces_topic: "t".into(),
                logs_topic: "l".into(),
                batch_size: 100,
                flush_interval: Duration::from_secs(5),
            },
            FlakySink::new(fail),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn failed_flush_rebuffers_the_batch() {
        let pipeline = pipeline(true);
        pipeline.buffer().push_logs(vec![log_item("a"), log_item("b")]);

        assert!(pipeline.flush().await.is_err());
        assert_eq!(pipeline.buffer_depth(), (0, 2));

        // Recovery: the same records persist on the next cycle.
        pipeline.core.sink.fail.store(false, Ordering::SeqCst);
        pipeline.flush().await.unwrap();
        assert_eq!(pipeline.buffer_depth(), (0, 0));
        assert_eq!(pipeline.core.sink.saved_logs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn successful_flush_drains_both_lists() {
        let pipeline = pipeline(false);
        pipeline.buffer().push_logs(vec![log_item("a")]);
        pipeline.flush().await.unwrap();
        assert_eq!(pipeline.buffer_depth(), (0, 0));
        assert_eq!(pipeline.core.sink.saved_logs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_flush_is_a_no_op() {
        let pipeline = pipeline(false);
        pipeline.flush().await.unwrap();
        assert_eq!(pipeline.core.sink.saved_logs.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.core.sink.saved_traces.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn payloads_flow_from_decode_to_sink() {
        use otelbase_testkit as testkit;

        let pipeline = pipeline(false);

        let trace_payload = testkit::encode(&testkit::trace_request(
            "svc-a",
            vec![testkit::span(vec![1; 16], vec![2; 8], "op", 1_000_000, 2_000_000, 1)],
        ));
        let log_payload = testkit::snappy_frame(&testkit::encode_logs(&testkit::log_request(
            "svc-a",
            vec![testkit::log_record(1_700_000_000_000_000_000, "", 17, "boom")],
        )));

        pipeline.core.handle_payload("t", &trace_payload).unwrap();
        pipeline.core.handle_payload("l", &log_payload).unwrap();
        assert_eq!(pipeline.buffer_depth(), (1, 1));

        pipeline.flush().await.unwrap();
        assert_eq!(pipeline.buffer_depth(), (0, 0));
        assert_eq!(pipeline.core.sink.saved_traces.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.core.sink.saved_logs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn undecodable_payload_is_an_error() {
        let pipeline = pipeline(false);
        assert!(pipeline.core.handle_payload("t", &[0x08, 0x96, 0x01]).is_err());
        assert_eq!(pipeline.buffer_depth(), (0, 0));
    }

    #[test]
    fn pipeline_starts_stopped() {
        let pipeline = pipeline(false);
        assert_eq!(pipeline.state(), ConsumerState::Stopped);
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(4), Duration::from_secs(8));
        assert_eq!(backoff_delay(5), Duration::from_secs(10));
    }
}
