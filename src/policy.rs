//! Exception Policy - Failure Reporting
//!
//! The policy decides whether a generator failure propagates or is logged
//! and recovered. Security failures bypass it: they always go to the
//! security channel and never propagate.

use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::generator::GeneratorError;

/// Channel used by [`ExceptionPolicy::LogVerbose`].
pub const FACADE_CHANNEL: &str = "image_facade";

/// Channel every security failure is recorded under.
pub const SECURITY_CHANNEL: &str = "security";

/// How the serving entry point surfaces generator failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "channel", rename_all = "snake_case")]
pub enum ExceptionPolicy {
    /// Propagate unmodified
    Throw,
    /// Full diagnostic record under [`FACADE_CHANNEL`], then recover
    #[default]
    LogVerbose,
    /// Message-only record under the named channel, then recover
    LogToChannel(String),
}

impl ExceptionPolicy {
    pub fn propagates(&self) -> bool {
        matches!(self, Self::Throw)
    }

    /// Build the log record for a recoverable failure. `None` under `Throw`.
    pub fn record_for(&self, err: &GeneratorError) -> Option<FailureRecord> {
        match self {
            Self::Throw => None,
            Self::LogVerbose => Some(
                FailureRecord::new(FACADE_CHANNEL, err.to_string()).with_detail(diagnostic(err)),
            ),
            Self::LogToChannel(channel) => Some(FailureRecord::new(channel.clone(), err.to_string())),
        }
    }
}

impl fmt::Display for ExceptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Throw => f.write_str("throw"),
            Self::LogVerbose => f.write_str("verbose"),
            Self::LogToChannel(channel) => write!(f, "channel:{channel}"),
        }
    }
}

impl FromStr for ExceptionPolicy {
    type Err = String;

    /// `throw`, `verbose`, or `channel:<name>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "throw" => Ok(Self::Throw),
            "verbose" => Ok(Self::LogVerbose),
            _ => match s.strip_prefix("channel:") {
                Some(channel) if !channel.is_empty() => Ok(Self::LogToChannel(channel.to_string())),
                _ => Err(format!(
                    "unknown exception policy '{s}' (expected throw, verbose or channel:<name>)"
                )),
            },
        }
    }
}

/// Message plus the full source chain and debug form.
fn diagnostic(err: &GeneratorError) -> String {
    let mut detail = format!("{err:?}");
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str("\ncaused by: ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

/// One logged failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub incident: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub channel: String,
    pub message: String,
    pub detail: Option<String>,
}

impl FailureRecord {
    pub fn new(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            incident: Uuid::new_v4(),
            recorded_at: Utc::now(),
            channel: channel.into(),
            message: message.into(),
            detail: None,
        }
    }

    /// Security record. Keeps the generator's message for the log only.
    pub fn security(err: &GeneratorError) -> Self {
        Self::new(SECURITY_CHANNEL, err.to_string())
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Log sink for failure records.
pub trait FailureLogger: Send + Sync {
    fn record(&self, record: &FailureRecord);
}

impl<L: FailureLogger + ?Sized> FailureLogger for Arc<L> {
    fn record(&self, record: &FailureRecord) {
        (**self).record(record)
    }
}

/// Emits every record as a `tracing` event with the channel as a field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFailureLogger;

impl FailureLogger for TracingFailureLogger {
    fn record(&self, record: &FailureRecord) {
        if record.channel == SECURITY_CHANNEL {
            tracing::warn!(
                channel = %record.channel,
                incident = %record.incident,
                "{}",
                record.message
            );
        } else {
            tracing::error!(
                channel = %record.channel,
                incident = %record.incident,
                detail = record.detail.as_deref().unwrap_or_default(),
                "{}",
                record.message
            );
        }
    }
}

/// Keeps records in memory; for embedding hosts that ship logs themselves.
#[derive(Debug, Default)]
pub struct MemoryFailureLogger {
    records: Mutex<Vec<FailureRecord>>,
}

impl MemoryFailureLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FailureRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl FailureLogger for MemoryFailureLogger {
    fn record(&self, record: &FailureRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}
