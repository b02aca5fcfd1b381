use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Read;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
use opentelemetry_proto::tonic::logs::v1::{LogsData, ResourceLogs};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, TracesData};
use prost::Message;
use sha2::{Digest, Sha256};

use otelbase_core::error::{OtelbaseError, Result};
use otelbase_core::model::attr::{AttrMap, AttrValue};
use otelbase_core::model::log::{LogItem, Severity};
use otelbase_core::model::trace::{SpanStatus, TraceItem};
use otelbase_core::time::{nanos_span_millis, nanos_to_millis};

/// Snappy stream-identifier chunk.
const SNAPPY_MAGIC: [u8; 4] = [0xFF, 0x06, 0x00, 0x00];

const STATUS_CODE_OK: i32 = 1;
const STATUS_CODE_ERROR: i32 = 2;

/// Decodes OTLP payloads (binary protobuf or JSON, optionally
/// Snappy-framed) into flat domain records.
///
/// A payload fails only when it matches neither encoding; individual
/// malformed records inside a parsed payload are skipped and counted.
#[derive(Debug, Default)]
pub struct OtlpDecoder {
    skipped_spans: AtomicU64,
    skipped_logs: AtomicU64,
}

impl OtlpDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skipped_spans(&self) -> u64 {
        self.skipped_spans.load(Ordering::Relaxed)
    }

    pub fn skipped_logs(&self) -> u64 {
        self.skipped_logs.load(Ordering::Relaxed)
    }

    /// Transparently unwraps Snappy framing; anything without the stream
    /// magic passes through untouched.
    pub fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        if data.len() > 4 && data[..4] == SNAPPY_MAGIC {
            let mut out = Vec::new();
            snap::read::FrameDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| OtelbaseError::Decode(format!("snappy decompress failed: {e}")))?;
            return Ok(Cow::Owned(out));
        }
        Ok(Cow::Borrowed(data))
    }

    pub fn decode_traces(&self, data: &[u8]) -> Result<Vec<TraceItem>> {
        let resource_spans = if looks_like_json(data) {
            self.parse_json_traces(data)?
        } else {
            self.parse_proto_traces(data)?
        };

        let mut traces = Vec::new();
        for rs in &resource_spans {
            self.walk_resource_spans(rs, &mut traces);
        }
        Ok(traces)
    }

    pub fn decode_logs(&self, data: &[u8]) -> Result<Vec<LogItem>> {
        let resource_logs = if looks_like_json(data) {
            self.parse_json_logs(data)?
        } else {
            self.parse_proto_logs(data)?
        };

        let mut logs = Vec::new();
        for rl in &resource_logs {
            self.walk_resource_logs(rl, &mut logs);
        }
        Ok(logs)
    }

    fn parse_proto_traces(&self, data: &[u8]) -> Result<Vec<ResourceSpans>> {
        if let Ok(req) = ExportTraceServiceRequest::decode(data) {
            return Ok(req.resource_spans);
        }
        TracesData::decode(data)
            .map(|d| d.resource_spans)
            .map_err(|e| OtelbaseError::Decode(format!("unsupported trace payload: {e}")))
    }

    fn parse_proto_logs(&self, data: &[u8]) -> Result<Vec<ResourceLogs>> {
        if let Ok(req) = ExportLogsServiceRequest::decode(data) {
            return Ok(req.resource_logs);
        }
        LogsData::decode(data)
            .map(|d| d.resource_logs)
            .map_err(|e| OtelbaseError::Decode(format!("unsupported log payload: {e}")))
    }

    fn parse_json_traces(&self, data: &[u8]) -> Result<Vec<ResourceSpans>> {
        if let Ok(req) = serde_json::from_slice::<ExportTraceServiceRequest>(data) {
            return Ok(req.resource_spans);
        }
        serde_json::from_slice::<TracesData>(data)
            .map(|d| d.resource_spans)
            .map_err(|e| OtelbaseError::Decode(format!("unsupported JSON trace payload: {e}")))
    }

    fn parse_json_logs(&self, data: &[u8]) -> Result<Vec<ResourceLogs>> {
        if let Ok(req) = serde_json::from_slice::<ExportLogsServiceRequest>(data) {
            return Ok(req.resource_logs);
        }
        serde_json::from_slice::<LogsData>(data)
            .map(|d| d.resource_logs)
            .map_err(|e| OtelbaseError::Decode(format!("unsupported JSON log payload: {e}")))
    }

    fn walk_resource_spans(&self, rs: &ResourceSpans, out: &mut Vec<TraceItem>) {
        let resource_attrs = resource_attr_map(rs.resource.as_ref());
        let service_name = service_name(rs.resource.as_ref());

        for ss in &rs.scope_spans {
            for span in &ss.spans {
                let Some(trace_id) = bytes_to_hex(&span.trace_id) else {
                    self.skipped_spans.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("skipping span without trace id");
                    continue;
                };
                let Some(span_id) = bytes_to_hex(&span.span_id) else {
                    self.skipped_spans.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(trace_id = %trace_id, "skipping span without span id");
                    continue;
                };

                // Span attributes win over resource attributes on collision.
                let mut attributes = kv_to_map(&span.attributes);
                for (k, v) in &resource_attrs {
                    attributes.entry(k.clone()).or_insert_with(|| v.clone());
                }

                let status = span
                    .status
                    .as_ref()
                    .map(|s| match s.code {
                        STATUS_CODE_OK => SpanStatus::Ok,
                        STATUS_CODE_ERROR => SpanStatus::Error,
                        _ => SpanStatus::Unset,
                    })
                    .unwrap_or(SpanStatus::Unset);

                out.push(TraceItem {
                    id: TraceItem::make_id(&trace_id, &span_id),
                    trace_id,
                    span_id,
                    parent_span_id: bytes_to_hex(&span.parent_span_id),
                    name: span.name.clone(),
                    service_name: service_name.clone(),
                    start_time: nanos_to_millis(span.start_time_unix_nano),
                    end_time: nanos_to_millis(span.end_time_unix_nano),
                    duration: nanos_span_millis(
                        span.start_time_unix_nano,
                        span.end_time_unix_nano,
                    ),
                    status,
                    attributes,
                });
            }
        }
    }

    fn walk_resource_logs(&self, rl: &ResourceLogs, out: &mut Vec<LogItem>) {
        let resource_attrs = resource_attr_map(rl.resource.as_ref());
        let service_name = service_name(rl.resource.as_ref());

        for sl in &rl.scope_logs {
            for record in &sl.log_records {
                let mut attributes = kv_to_map(&record.attributes);

                // Resource attributes only fill keys the record did not set.
                for (k, v) in &resource_attrs {
                    attributes.entry(k.clone()).or_insert_with(|| v.clone());
                }

                if let Some(scope) = &sl.scope {
                    attributes.insert("scope.name".into(), AttrValue::from(scope.name.as_str()));
                    attributes.insert(
                        "scope.version".into(),
                        AttrValue::from(scope.version.as_str()),
                    );
                    for kv in &scope.attributes {
                        if let Some(v) = kv.value.as_ref().and_then(attr_value) {
                            attributes.insert(format!("scope.attr.{}", kv.key), v);
                        }
                    }
                }

                let message = extract_message(record.body.as_ref(), &attributes);

                let severity = if record.severity_text.is_empty() {
                    Severity::from_number(record.severity_number)
                } else {
                    Severity::from_str(&record.severity_text)
                        .unwrap_or_else(|_| Severity::from_number(record.severity_number))
                };

                let ts_nanos = if record.time_unix_nano == 0 {
                    record.observed_time_unix_nano
                } else {
                    record.time_unix_nano
                };
                if ts_nanos == 0 {
                    self.skipped_logs.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("skipping log record without timestamp");
                    continue;
                }
                let timestamp = nanos_to_millis(ts_nanos);

                out.push(LogItem {
                    id: generate_log_id(timestamp, &record.trace_id, &record.span_id, &message),
                    timestamp,
                    service_name: service_name.clone(),
                    message,
                    severity,
                    trace_id: bytes_to_hex(&record.trace_id),
                    span_id: bytes_to_hex(&record.span_id),
                    attributes,
                });
            }
        }
    }
}

fn looks_like_json(data: &[u8]) -> bool {
    data.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{')
}

fn service_name(resource: Option<&Resource>) -> String {
    if let Some(resource) = resource {
        for kv in &resource.attributes {
            if kv.key == "service.name" {
                if let Some(any_value::Value::StringValue(s)) =
                    kv.value.as_ref().and_then(|v| v.value.as_ref())
                {
                    if !s.is_empty() {
                        return s.clone();
                    }
                }
            }
        }
    }
    "unknown".to_string()
}

fn resource_attr_map(resource: Option<&Resource>) -> AttrMap {
    resource.map(|r| kv_to_map(&r.attributes)).unwrap_or_default()
}

fn kv_to_map(attrs: &[KeyValue]) -> AttrMap {
    let mut map = AttrMap::new();
    for kv in attrs {
        if let Some(v) = kv.value.as_ref().and_then(attr_value) {
            map.insert(kv.key.clone(), v);
        }
    }
    map
}

fn attr_value(value: &AnyValue) -> Option<AttrValue> {
    match value.value.as_ref()? {
        any_value::Value::StringValue(s) => Some(AttrValue::String(s.clone())),
        any_value::Value::BoolValue(b) => Some(AttrValue::Bool(*b)),
        any_value::Value::IntValue(i) => Some(AttrValue::Int(*i)),
        any_value::Value::DoubleValue(d) => Some(AttrValue::Double(*d)),
        any_value::Value::BytesValue(b) => Some(AttrValue::Bytes(hex_string(b))),
        any_value::Value::ArrayValue(arr) => Some(AttrValue::Array(
            arr.values.iter().filter_map(attr_value).collect(),
        )),
        any_value::Value::KvlistValue(kvs) => {
            let mut map = BTreeMap::new();
            for kv in &kvs.values {
                if let Some(v) = kv.value.as_ref().and_then(attr_value) {
                    map.insert(kv.key.clone(), v);
                }
            }
            Some(AttrValue::KvList(map))
        }
    }
}

/// The log message: a string body verbatim, a kv-list body reduced to its
/// first message-like field, anything else falling back to a `message`
/// attribute.
fn extract_message(body: Option<&AnyValue>, attributes: &AttrMap) -> String {
    match body.and_then(|b| b.value.as_ref()) {
        Some(any_value::Value::StringValue(s)) => s.clone(),
        Some(any_value::Value::KvlistValue(kvs)) => format_kvlist_message(kvs),
        _ => attributes
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
    }
}

fn format_kvlist_message(kvs: &opentelemetry_proto::tonic::common::v1::KeyValueList) -> String {
    // Message-like keys win in this priority order.
    for wanted in ["message", "msg", "event", "log"] {
        for kv in &kvs.values {
            if kv.key == wanted {
                if let Some(any_value::Value::StringValue(s)) =
                    kv.value.as_ref().and_then(|v| v.value.as_ref())
                {
                    if !s.is_empty() {
                        return s.clone();
                    }
                }
            }
        }
    }

    if let Some(kv) = kvs.values.first() {
        if let Some(v) = kv.value.as_ref().and_then(attr_value) {
            return format!("{}: {}", kv.key, render_attr(&v));
        }
    }

    String::new()
}

fn render_attr(value: &AttrValue) -> String {
    match value {
        AttrValue::String(s) | AttrValue::Bytes(s) => s.clone(),
        AttrValue::Bool(b) => b.to_string(),
        AttrValue::Int(i) => i.to_string(),
        AttrValue::Double(d) => d.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Deterministic log id: `{timestampMs}-{16 hex chars}` where the hash
/// covers the timestamp, trace id, span id, and message content. Replays
/// of the same record land on the same primary key.
fn generate_log_id(timestamp_ms: i64, trace_id: &[u8], span_id: &[u8], message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timestamp_ms.to_string().as_bytes());
    hasher.update(trace_id);
    hasher.update(span_id);
    hasher.update(message.as_bytes());
    let digest = hasher.finalize();
    format!("{timestamp_ms}-{}", hex_string(&digest[..8]))
}

fn bytes_to_hex(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    Some(hex_string(bytes))
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use otelbase_testkit as testkit;

    use super::*;

    #[test]
    fn trace_round_trip_matches_wire_values() {
        let req = testkit::trace_request(
            "svc-a",
            vec![testkit::span(
                vec![0xAA; 15].into_iter().chain([0x01]).collect(),
                vec![0xBB; 7].into_iter().chain([0x01]).collect(),
                "GET /orders",
                1_700_000_000_000_000_000,
                1_700_000_000_150_000_000,
                STATUS_CODE_OK,
            )],
        );

        let decoder = OtlpDecoder::new();
        let traces = decoder.decode_traces(&testkit::encode(&req)).unwrap();
        assert_eq!(traces.len(), 1);

        let item = &traces[0];
        assert_eq!(item.trace_id, "aa".repeat(15) + "01");
        assert_eq!(item.span_id, "bb".repeat(7) + "01");
        assert_eq!(item.id, format!("{}-{}", item.trace_id, item.span_id));
        assert_eq!(item.service_name, "svc-a");
        assert_eq!(item.start_time, 1_700_000_000_000);
        assert_eq!(item.end_time, 1_700_000_000_150);
        assert_eq!(item.duration, 150.0);
        assert_eq!(item.status, SpanStatus::Ok);
        assert!(item.parent_span_id.is_none());
    }

    #[test]
    fn status_codes_collapse_to_three_labels() {
        for (code, expected) in [
            (0, SpanStatus::Unset),
            (STATUS_CODE_OK, SpanStatus::Ok),
            (STATUS_CODE_ERROR, SpanStatus::Error),
            (7, SpanStatus::Unset),
        ] {
            let req = testkit::trace_request(
                "svc-a",
                vec![testkit::span(vec![1; 16], vec![2; 8], "op", 1, 2, code)],
            );
            let decoder = OtlpDecoder::new();
            let traces = decoder.decode_traces(&testkit::encode(&req)).unwrap();
            assert_eq!(traces[0].status, expected);
        }
    }

    #[test]
    fn span_attributes_win_over_resource() {
        let mut req = testkit::trace_request(
            "svc-a",
            vec![testkit::span(vec![1; 16], vec![2; 8], "op", 1, 2, 0)],
        );
        let rs = &mut req.resource_spans[0];
        rs.resource
            .as_mut()
            .unwrap()
            .attributes
            .push(testkit::string_attr("env", "prod"));
        rs.resource
            .as_mut()
            .unwrap()
            .attributes
            .push(testkit::string_attr("region", "us-east"));
        rs.scope_spans[0].spans[0]
            .attributes
            .push(testkit::string_attr("env", "canary"));

        let decoder = OtlpDecoder::new();
        let traces = decoder.decode_traces(&testkit::encode(&req)).unwrap();
        let attrs = &traces[0].attributes;
        assert_eq!(attrs.get("env"), Some(&AttrValue::from("canary")));
        assert_eq!(attrs.get("region"), Some(&AttrValue::from("us-east")));
        assert_eq!(attrs.get("service.name"), Some(&AttrValue::from("svc-a")));
    }

    #[test]
    fn spans_without_ids_are_skipped_and_counted() {
        let req = testkit::trace_request(
            "svc-a",
            vec![
                testkit::span(vec![], vec![2; 8], "broken", 1, 2, 0),
                testkit::span(vec![1; 16], vec![2; 8], "fine", 1, 2, 0),
            ],
        );
        let decoder = OtlpDecoder::new();
        let traces = decoder.decode_traces(&testkit::encode(&req)).unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].name, "fine");
        assert_eq!(decoder.skipped_spans(), 1);
    }

    #[test]
    fn severity_number_fallback() {
        let req = testkit::log_request(
            "svc-a",
            vec![testkit::log_record(1_700_000_000_000_000_000, "", 17, "boom")],
        );
        let decoder = OtlpDecoder::new();
        let logs = decoder.decode_logs(&testkit::encode_logs(&req)).unwrap();
        assert_eq!(logs[0].severity, Severity::Error);
    }

    #[test]
    fn severity_text_wins_and_is_normalized() {
        let req = testkit::log_request(
            "svc-a",
            vec![testkit::log_record(1_700_000_000_000_000_000, "warning", 9, "careful")],
        );
        let decoder = OtlpDecoder::new();
        let logs = decoder.decode_logs(&testkit::encode_logs(&req)).unwrap();
        assert_eq!(logs[0].severity, Severity::Warn);
    }

    #[test]
    fn unknown_severity_number_yields_info() {
        for n in [0, 2, 12, 40] {
            let req = testkit::log_request(
                "svc-a",
                vec![testkit::log_record(1_000_000, "", n, "m")],
            );
            let decoder = OtlpDecoder::new();
            let logs = decoder.decode_logs(&testkit::encode_logs(&req)).unwrap();
            assert_eq!(logs[0].severity, Severity::Info);
        }
    }

    #[test]
    fn resource_attributes_fill_only_missing_log_keys() {
        let mut req = testkit::log_request(
            "svc-a",
            vec![testkit::log_record(1_000_000, "", 9, "hello")],
        );
        let rl = &mut req.resource_logs[0];
        rl.resource
            .as_mut()
            .unwrap()
            .attributes
            .push(testkit::string_attr("env", "prod"));
        rl.scope_logs[0].log_records[0]
            .attributes
            .push(testkit::string_attr("env", "canary"));

        let decoder = OtlpDecoder::new();
        let logs = decoder.decode_logs(&testkit::encode_logs(&req)).unwrap();
        assert_eq!(
            logs[0].attributes.get("env"),
            Some(&AttrValue::from("canary"))
        );
    }

    #[test]
    fn scope_metadata_is_injected() {
        let mut req = testkit::log_request(
            "svc-a",
            vec![testkit::log_record(1_000_000, "", 9, "hello")],
        );
        req.resource_logs[0].scope_logs[0].scope = Some(testkit::scope("my-lib", "1.2.3"));

        let decoder = OtlpDecoder::new();
        let logs = decoder.decode_logs(&testkit::encode_logs(&req)).unwrap();
        let attrs = &logs[0].attributes;
        assert_eq!(attrs.get("scope.name"), Some(&AttrValue::from("my-lib")));
        assert_eq!(attrs.get("scope.version"), Some(&AttrValue::from("1.2.3")));
    }

    #[test]
    fn kvlist_body_prefers_message_like_keys() {
        let body = testkit::kvlist_body(vec![
            ("level", "info"),
            ("msg", "from msg"),
            ("message", "from message"),
        ]);
        let req = testkit::log_request(
            "svc-a",
            vec![testkit::log_record_with_body(1_000_000, 9, body)],
        );
        let decoder = OtlpDecoder::new();
        let logs = decoder.decode_logs(&testkit::encode_logs(&req)).unwrap();
        assert_eq!(logs[0].message, "from message");
    }

    #[test]
    fn kvlist_body_falls_back_to_first_entry() {
        let body = testkit::kvlist_body(vec![("status", "degraded")]);
        let req = testkit::log_request(
            "svc-a",
            vec![testkit::log_record_with_body(1_000_000, 9, body)],
        );
        let decoder = OtlpDecoder::new();
        let logs = decoder.decode_logs(&testkit::encode_logs(&req)).unwrap();
        assert_eq!(logs[0].message, "status: degraded");
    }

    #[test]
    fn log_id_is_deterministic_across_replays() {
        let make = || {
            let req = testkit::log_request(
                "svc-a",
                vec![testkit::log_record(1_700_000_000_000_000_000, "", 9, "same")],
            );
            let decoder = OtlpDecoder::new();
            decoder.decode_logs(&testkit::encode_logs(&req)).unwrap()
        };
        let a = make();
        let b = make();
        assert_eq!(a[0].id, b[0].id);
        assert!(a[0].id.starts_with("1700000000000-"));
        assert_eq!(a[0].id.len(), "1700000000000-".len() + 16);
    }

    #[test]
    fn snappy_framed_payloads_are_unwrapped() {
        let req = testkit::trace_request(
            "svc-a",
            vec![testkit::span(vec![1; 16], vec![2; 8], "op", 1, 2, 0)],
        );
        let framed = testkit::snappy_frame(&testkit::encode(&req));
        assert_eq!(framed[..4], SNAPPY_MAGIC);

        let decoder = OtlpDecoder::new();
        let plain = decoder.decompress(&framed).unwrap();
        let traces = decoder.decode_traces(&plain).unwrap();
        assert_eq!(traces.len(), 1);
    }

    #[test]
    fn truncated_snappy_body_surfaces_an_error() {
        let req = testkit::trace_request(
            "svc-a",
            vec![testkit::span(vec![1; 16], vec![2; 8], "op", 1, 2, 0)],
        );
        let mut framed = testkit::snappy_frame(&testkit::encode(&req));
        framed.truncate(framed.len() - 3);

        let decoder = OtlpDecoder::new();
        assert!(decoder.decompress(&framed).is_err());
    }

    #[test]
    fn json_payloads_are_dispatched_by_first_byte() {
        let req = testkit::trace_request(
            "svc-a",
            vec![testkit::span(vec![1; 16], vec![2; 8], "op", 1, 2, STATUS_CODE_OK)],
        );
        let json = serde_json::to_vec(&req).unwrap();

        let decoder = OtlpDecoder::new();
        let traces = decoder.decode_traces(&json).unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].status, SpanStatus::Ok);
    }

    #[test]
    fn garbage_payload_is_rejected() {
        let decoder = OtlpDecoder::new();
        // Valid protobuf wire data for neither request nor raw envelope
        // shapes: field 1 as a varint, where both expect a message.
        let bogus = [0x08, 0x96, 0x01];
        assert!(decoder.decode_traces(&bogus).is_err());
        assert!(decoder.decode_logs(&bogus).is_err());
    }

    #[test]
    fn missing_service_name_defaults_to_unknown() {
        let mut req = testkit::trace_request(
            "svc-a",
            vec![testkit::span(vec![1; 16], vec![2; 8], "op", 1, 2, 0)],
        );
        req.resource_spans[0].resource = None;

        let decoder = OtlpDecoder::new();
        let traces = decoder.decode_traces(&testkit::encode(&req)).unwrap();
        assert_eq!(traces[0].service_name, "unknown");
    }

    #[test]
    fn bytes_attributes_become_hex_strings() {
        let mut req = testkit::log_request(
            "svc-a",
            vec![testkit::log_record(1_000_000, "", 9, "m")],
        );
        req.resource_logs[0].scope_logs[0].log_records[0]
            .attributes
            .push(testkit::bytes_attr("payload", vec![0xDE, 0xAD]));

        let decoder = OtlpDecoder::new();
        let logs = decoder.decode_logs(&testkit::encode_logs(&req)).unwrap();
        assert_eq!(
            logs[0].attributes.get("payload"),
            Some(&AttrValue::Bytes("dead".into()))
        );
    }

    #[test]
    fn observed_time_backfills_missing_timestamp() {
        let mut req = testkit::log_request(
            "svc-a",
            vec![testkit::log_record(0, "", 9, "late")],
        );
        req.resource_logs[0].scope_logs[0].log_records[0].observed_time_unix_nano =
            1_700_000_000_000_000_000;

        let decoder = OtlpDecoder::new();
        let logs = decoder.decode_logs(&testkit::encode_logs(&req)).unwrap();
        assert_eq!(logs[0].timestamp, 1_700_000_000_000);
    }
}
