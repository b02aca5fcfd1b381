use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OtelbaseError;
use crate::model::attr::AttrMap;

/// The six canonical severity labels. Every stored log carries exactly
/// one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "TRACE")]
    Trace,
    #[serde(rename = "DEBUG")]
    Debug,
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "FATAL")]
    Fatal,
}

impl Severity {
    /// OTLP severity-number mapping: the six anchor numbers map to their
    /// label, everything else is INFO.
    pub fn from_number(n: i32) -> Self {
        match n {
            1 => Self::Trace,
            5 => Self::Debug,
            9 => Self::Info,
            13 => Self::Warn,
            17 => Self::Error,
            21 => Self::Fatal,
            _ => Self::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// Display rank used by severity aggregations, FATAL first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Fatal => 1,
            Self::Error => 2,
            Self::Warn => 3,
            Self::Info => 4,
            Self::Debug => 5,
            Self::Trace => 6,
        }
    }
}

impl FromStr for Severity {
    type Err = OtelbaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Self::Trace),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            "FATAL" => Ok(Self::Fatal),
            _ => Err(OtelbaseError::InvalidArgument(format!(
                "unknown severity: {s}"
            ))),
        }
    }
}

/// One stored log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogItem {
    pub id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub service_name: String,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    pub attributes: AttrMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAggregation {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityAggregation {
    pub name: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_numbers_map_to_labels() {
        assert_eq!(Severity::from_number(1), Severity::Trace);
        assert_eq!(Severity::from_number(5), Severity::Debug);
        assert_eq!(Severity::from_number(9), Severity::Info);
        assert_eq!(Severity::from_number(13), Severity::Warn);
        assert_eq!(Severity::from_number(17), Severity::Error);
        assert_eq!(Severity::from_number(21), Severity::Fatal);
    }

    #[test]
    fn other_numbers_fall_back_to_info() {
        for n in [-1, 0, 2, 8, 14, 24, 100] {
            assert_eq!(Severity::from_number(n), Severity::Info);
        }
    }

    #[test]
    fn parses_text_with_warning_alias() {
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!("WARNING".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!("fatal".parse::<Severity>().unwrap(), Severity::Fatal);
        assert!("verbose".parse::<Severity>().is_err());
    }

    #[test]
    fn rank_orders_fatal_first() {
        assert!(Severity::Fatal.rank() < Severity::Error.rank());
        assert!(Severity::Error.rank() < Severity::Trace.rank());
    }
}
