/// Bootstrap DDL, applied in one transaction when the sentinel `traces`
/// table is missing from the public schema.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE traces (
  id VARCHAR(255) PRIMARY KEY,
  trace_id VARCHAR(64) NOT NULL,
  span_id VARCHAR(64) NOT NULL,
  parent_span_id VARCHAR(64),
  name VARCHAR(255) NOT NULL,
  service_name VARCHAR(128) NOT NULL,
  start_time BIGINT NOT NULL,
  end_time BIGINT NOT NULL,
  duration DOUBLE PRECISION NOT NULL,
  status VARCHAR(32),
  attributes JSONB,
  created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP,

  CONSTRAINT traces_trace_id_span_id_unique UNIQUE (trace_id, span_id)
);

CREATE INDEX idx_traces_trace_id ON traces(trace_id);
CREATE INDEX idx_traces_service_name ON traces(service_name);
CREATE INDEX idx_traces_start_time ON traces(start_time);
CREATE INDEX idx_traces_status ON traces(status);

CREATE TABLE logs (
  id VARCHAR(255) PRIMARY KEY,
  timestamp BIGINT NOT NULL,
  service_name VARCHAR(128) NOT NULL,
  message TEXT NOT NULL,
  severity VARCHAR(32) NOT NULL,
  trace_id VARCHAR(64),
  span_id VARCHAR(64),
  attributes JSONB,
  created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX idx_logs_timestamp ON logs(timestamp);
CREATE INDEX idx_logs_service_name ON logs(service_name);
CREATE INDEX idx_logs_severity ON logs(severity);
CREATE INDEX idx_logs_trace_id ON logs(trace_id);

CREATE TABLE service_metrics (
  id SERIAL PRIMARY KEY,
  service_name VARCHAR(128) NOT NULL,
  time_bucket BIGINT NOT NULL,
  request_count INTEGER NOT NULL DEFAULT 0,
  error_count INTEGER NOT NULL DEFAULT 0,
  total_duration DOUBLE PRECISION NOT NULL DEFAULT 0,
  min_duration DOUBLE PRECISION,
  max_duration DOUBLE PRECISION,
  p95_duration DOUBLE PRECISION,
  p99_duration DOUBLE PRECISION,
  created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP,

  CONSTRAINT service_metrics_service_time_unique UNIQUE (service_name, time_bucket)
);

CREATE INDEX idx_service_metrics_time_bucket ON service_metrics(time_bucket);
CREATE INDEX idx_service_metrics_service_name ON service_metrics(service_name);

CREATE OR REPLACE VIEW traces_with_logs AS
SELECT
  t.id as trace_id,
  t.name as trace_name,
  t.service_name,
  t.start_time,
  t.end_time,
  t.duration,
  t.status,
  COUNT(l.id) as log_count
FROM
  traces t
LEFT JOIN
  logs l ON t.trace_id = l.trace_id
GROUP BY
  t.id, t.name, t.service_name, t.start_time, t.end_time, t.duration, t.status;
"#;
