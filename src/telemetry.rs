//! Structured telemetry for request attempts.
//!
//! A [`Telemetry`] handle filters records by a minimum [`Severity`], masks
//! credential fields, and hands each record to a [`RecordWriter`]. Clones
//! share the same writer and level, so one handle can be configured at
//! startup and injected into every client.

use std::{
    fmt,
    io::{self, Write},
    str::FromStr,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Mutex,
    },
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// Placeholder written in place of credential values.
pub const REDACTED: &str = "<redacted>";

const CREDENTIAL_KEYS: [&str; 5] = [
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Severity {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Debug,
            1 => Self::Info,
            2 => Self::Warn,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.write_str(label)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// One emitted telemetry entry, already redacted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    pub context: Map<String, JsonValue>,
}

/// Destination for telemetry records.
///
/// Implementations must write each record as a unit so concurrent callers
/// never interleave partial records.
pub trait RecordWriter: Send + Sync {
    fn write(&self, record: &TelemetryRecord) -> io::Result<()>;
}

/// Forwards records to `tracing` at the matching level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingWriter;

impl RecordWriter for TracingWriter {
    fn write(&self, record: &TelemetryRecord) -> io::Result<()> {
        let context = JsonValue::Object(record.context.clone());
        let timestamp = record.timestamp.to_rfc3339();
        match record.severity {
            Severity::Debug => {
                tracing::debug!(%timestamp, %context, "{}", record.message)
            }
            Severity::Info => tracing::info!(%timestamp, %context, "{}", record.message),
            Severity::Warn => tracing::warn!(%timestamp, %context, "{}", record.message),
            Severity::Error => {
                tracing::error!(%timestamp, %context, "{}", record.message)
            }
        }
        Ok(())
    }
}

/// Writes one JSON object per line to any `Write` target.
pub struct JsonLinesWriter<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> RecordWriter for JsonLinesWriter<W> {
    fn write(&self, record: &TelemetryRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::other("telemetry writer poisoned"))?;
        out.write_all(&line)?;
        out.flush()
    }
}

/// Keeps records in memory. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct MemoryWriter {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Records at exactly `severity`.
    pub fn at(&self, severity: Severity) -> Vec<TelemetryRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.severity == severity)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl RecordWriter for MemoryWriter {
    fn write(&self, record: &TelemetryRecord) -> io::Result<()> {
        self.records
            .lock()
            .map_err(|_| io::Error::other("memory writer poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

/// Shared telemetry handle.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<Inner>,
}

struct Inner {
    min_severity: AtomicU8,
    writer: Box<dyn RecordWriter>,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("min_severity", &self.min_severity())
            .finish_non_exhaustive()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(TracingWriter)
    }
}

impl Telemetry {
    /// Creates a handle that emits every severity to `writer`.
    pub fn new(writer: impl RecordWriter + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                min_severity: AtomicU8::new(Severity::Debug as u8),
                writer: Box::new(writer),
            }),
        }
    }

    pub fn with_min_severity(self, min: Severity) -> Self {
        self.configure_level(min);
        self
    }

    /// Sets the minimum severity for this handle and all its clones.
    pub fn configure_level(&self, min: Severity) {
        self.inner.min_severity.store(min as u8, Ordering::Relaxed);
    }

    pub fn min_severity(&self) -> Severity {
        Severity::from_u8(self.inner.min_severity.load(Ordering::Relaxed))
    }

    pub fn enabled(&self, severity: Severity) -> bool {
        severity >= self.min_severity()
    }

    /// Emits a record. Never fails; writer errors are dropped.
    ///
    /// `context` is expected to be a JSON object; any other value is stored
    /// under a `value` key.
    pub fn emit(&self, severity: Severity, message: impl Into<String>, context: JsonValue) {
        if !self.enabled(severity) {
            return;
        }

        let mut context = match context {
            JsonValue::Object(map) => map,
            JsonValue::Null => Map::new(),
            other => Map::from_iter([("value".to_owned(), other)]),
        };
        redact_map(&mut context);

        let record = TelemetryRecord {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            context,
        };
        let _ = self.inner.writer.write(&record);
    }
}

fn is_credential_key(key: &str) -> bool {
    CREDENTIAL_KEYS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(key))
}

fn redact_map(map: &mut Map<String, JsonValue>) {
    for (key, value) in map.iter_mut() {
        if is_credential_key(key) {
            *value = JsonValue::String(REDACTED.to_owned());
        } else {
            redact_value(value);
        }
    }
}

fn redact_value(value: &mut JsonValue) {
    match value {
        JsonValue::Object(map) => redact_map(map),
        JsonValue::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {}
    }
}
