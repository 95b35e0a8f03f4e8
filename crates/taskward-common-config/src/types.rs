//! Configuration types.

use serde::{Deserialize, Deserializer, Serialize};

/// Queue capacity used when none, or a non-positive one, is configured.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerSettings,
    pub audit: AuditSettings,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to listen on.
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Where audit events are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// One object per event in an S3 bucket.
    S3,
    /// Structured log lines.
    #[default]
    Log,
}

impl SinkKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "s3" => Some(Self::S3),
            "log" => Some(Self::Log),
            _ => None,
        }
    }
}

/// Audit pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub sink: SinkKind,
    /// Queue capacity. Values of zero or below mean the default.
    #[serde(deserialize_with = "deserialize_buffer_size")]
    pub buffer_size: usize,
    /// Worker count. Zero means the default.
    pub workers: usize,
    /// Seconds `close` waits for the queue to drain.
    pub close_timeout_secs: u64,
    pub disable_request_audit_logs: bool,
    pub disable_response_audit_logs: bool,
    /// Header names to redact.
    pub redact_headers: Vec<String>,
    /// Body keys or dotted paths to redact.
    pub redact_body_keys: Vec<String>,
    /// Path templates, e.g. `/users/{id}`.
    pub audit_path_params: Vec<String>,
    pub s3: S3Settings,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            workers: 4,
            close_timeout_secs: 10,
            disable_request_audit_logs: false,
            disable_response_audit_logs: false,
            redact_headers: Vec::new(),
            redact_body_keys: Vec::new(),
            audit_path_params: Vec::new(),
            s3: S3Settings::default(),
        }
    }
}

/// Map a signed buffer size onto a queue capacity; `<= 0` is the default.
pub fn buffer_size_or_default(size: i64) -> usize {
    match usize::try_from(size) {
        Ok(0) | Err(_) => DEFAULT_BUFFER_SIZE,
        Ok(size) => size,
    }
}

fn deserialize_buffer_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    i64::deserialize(deserializer).map(buffer_size_or_default)
}

/// S3 sink settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    pub bucket: String,
    /// Key prefix inside the bucket.
    pub directory: String,
    /// Endpoint override, e.g. localstack.
    pub endpoint: Option<String>,
    pub region: String,
}
