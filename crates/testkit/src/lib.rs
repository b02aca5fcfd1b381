//! OTLP payload builders shared by the ingest and pipeline tests.

use std::io::Write;

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{
    any_value, AnyValue, InstrumentationScope, KeyValue, KeyValueList,
};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span, Status};
use prost::Message;

pub fn trace_request(service: &str, spans: Vec<Span>) -> ExportTraceServiceRequest {
    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(resource(service)),
            scope_spans: vec![ScopeSpans {
                spans,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

pub fn log_request(service: &str, log_records: Vec<LogRecord>) -> ExportLogsServiceRequest {
    ExportLogsServiceRequest {
        resource_logs: vec![ResourceLogs {
            resource: Some(resource(service)),
            scope_logs: vec![ScopeLogs {
                log_records,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

pub fn resource(service: &str) -> Resource {
    Resource {
        attributes: vec![string_attr("service.name", service)],
        ..Default::default()
    }
}

pub fn scope(name: &str, version: &str) -> InstrumentationScope {
    InstrumentationScope {
        name: name.to_string(),
        version: version.to_string(),
        ..Default::default()
    }
}

pub fn span(
    trace_id: Vec<u8>,
    span_id: Vec<u8>,
    name: &str,
    start_time_unix_nano: u64,
    end_time_unix_nano: u64,
    status_code: i32,
) -> Span {
    Span {
        trace_id,
        span_id,
        name: name.to_string(),
        start_time_unix_nano,
        end_time_unix_nano,
        status: Some(Status {
            code: status_code,
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn log_record(
    time_unix_nano: u64,
    severity_text: &str,
    severity_number: i32,
    body: &str,
) -> LogRecord {
    LogRecord {
        time_unix_nano,
        severity_text: severity_text.to_string(),
        severity_number,
        body: Some(AnyValue {
            value: Some(any_value::Value::StringValue(body.to_string())),
        }),
        ..Default::default()
    }
}

pub fn log_record_with_body(time_unix_nano: u64, severity_number: i32, body: AnyValue) -> LogRecord {
    LogRecord {
        time_unix_nano,
        severity_number,
        body: Some(body),
        ..Default::default()
    }
}

pub fn kvlist_body(pairs: Vec<(&str, &str)>) -> AnyValue {
    AnyValue {
        value: Some(any_value::Value::KvlistValue(KeyValueList {
            values: pairs
                .into_iter()
                .map(|(k, v)| string_attr(k, v))
                .collect(),
        })),
    }
}

pub fn string_attr(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}

pub fn bytes_attr(key: &str, value: Vec<u8>) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::BytesValue(value)),
        }),
    }
}

pub fn encode(req: &ExportTraceServiceRequest) -> Vec<u8> {
    req.encode_to_vec()
}

pub fn encode_logs(req: &ExportLogsServiceRequest) -> Vec<u8> {
    req.encode_to_vec()
}

/// Wraps a payload in Snappy stream framing (magic `FF 06 00 00`).
pub fn snappy_frame(data: &[u8]) -> Vec<u8> {
    let mut encoder = snap::write::FrameEncoder::new(Vec::new());
    encoder.write_all(data).expect("snappy encode");
    encoder.into_inner().expect("snappy finish")
}
