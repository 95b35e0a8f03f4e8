//! Environment variable handling.

use crate::{buffer_size_or_default, AuditSettings, SinkKind};
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Environment variable errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("failed to load .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),
}

/// Environment variable names.
pub mod vars {
    // Server
    pub const TASKWARD_BIND: &str = "TASKWARD_BIND";
    pub const TASKWARD_ENV: &str = "TASKWARD_ENV";

    // Audit sink
    pub const AUDITLOG_SINK: &str = "AUDITLOG_SINK";
    pub const AUDITLOG_S3_BUCKET: &str = "AUDITLOG_S3_BUCKET";
    pub const AUDITLOG_S3_DIRECTORY: &str = "AUDITLOG_S3_DIRECTORY";
    pub const AUDITLOG_S3_ENDPOINT: &str = "AUDITLOG_S3_ENDPOINT";
    pub const AUDITLOG_S3_REGION: &str = "AUDITLOG_S3_REGION";

    // Audit pipeline
    pub const AUDITLOG_BUFFER_SIZE: &str = "AUDITLOG_BUFFER_SIZE";
    pub const AUDITLOG_DISABLE_REQUEST: &str = "AUDITLOG_DISABLE_REQUEST";
    pub const AUDITLOG_DISABLE_RESPONSE: &str = "AUDITLOG_DISABLE_RESPONSE";
    pub const AUDITLOG_REDACT_HEADERS: &str = "AUDITLOG_REDACT_HEADERS";
    pub const AUDITLOG_REDACT_BODY_KEYS: &str = "AUDITLOG_REDACT_BODY_KEYS";
    pub const AUDITLOG_PATH_PARAMS: &str = "AUDITLOG_PATH_PARAMS";
}

/// Load `.env` files from the working directory.
///
/// `.env`, then `.env.local`, then `.env.$TASKWARD_ENV`. Files that do not
/// exist are skipped; variables already set are never overwritten.
pub fn load_dotenv() -> Result<(), EnvError> {
    let mut files = vec![".env".to_string(), ".env.local".to_string()];
    if let Ok(name) = env::var(vars::TASKWARD_ENV) {
        files.push(format!(".env.{name}"));
    }
    for file in files {
        match dotenvy::from_filename(&file) {
            Ok(_) => {}
            Err(err) if err.not_found() => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Typed access to a variable source.
pub struct EnvSource<F> {
    lookup: F,
}

impl EnvSource<fn(&str) -> Option<String>> {
    /// The process environment.
    pub fn process() -> Self {
        fn lookup(var: &str) -> Option<String> {
            env::var(var).ok()
        }
        Self { lookup }
    }
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Any variable source, e.g. a map in tests.
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    /// Get a variable; empty values count as unset.
    pub fn get(&self, var: &str) -> Option<String> {
        (self.lookup)(var).filter(|v| !v.trim().is_empty())
    }

    /// Get a boolean variable.
    pub fn get_bool(&self, var: &str) -> Result<Option<bool>, EnvError> {
        match self.get(var) {
            None => Ok(None),
            Some(v) => match v.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Some(true)),
                "false" | "0" | "no" => Ok(Some(false)),
                _ => Err(EnvError::InvalidValue {
                    var: var.to_string(),
                    message: format!("expected boolean, got {v:?}"),
                }),
            },
        }
    }

    /// Get a numeric variable.
    pub fn get_parsed<T: FromStr>(&self, var: &str) -> Result<Option<T>, EnvError> {
        match self.get(var) {
            None => Ok(None),
            Some(v) => v.trim().parse().map(Some).map_err(|_| EnvError::InvalidValue {
                var: var.to_string(),
                message: format!("expected number, got {v:?}"),
            }),
        }
    }

    /// Get a comma-separated list.
    pub fn get_list(&self, var: &str) -> Option<Vec<String>> {
        self.get(var).map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
    }

    /// Apply `AUDITLOG_*` overrides to `settings`.
    pub fn apply_audit_overrides(&self, settings: &mut AuditSettings) -> Result<(), EnvError> {
        if let Some(sink) = self.get(vars::AUDITLOG_SINK) {
            settings.sink = SinkKind::parse(&sink).ok_or_else(|| EnvError::InvalidValue {
                var: vars::AUDITLOG_SINK.to_string(),
                message: format!("expected \"s3\" or \"log\", got {sink:?}"),
            })?;
        }
        if let Some(bucket) = self.get(vars::AUDITLOG_S3_BUCKET) {
            settings.s3.bucket = bucket;
        }
        if let Some(directory) = self.get(vars::AUDITLOG_S3_DIRECTORY) {
            settings.s3.directory = directory;
        }
        if let Some(endpoint) = self.get(vars::AUDITLOG_S3_ENDPOINT) {
            settings.s3.endpoint = Some(endpoint);
        }
        if let Some(region) = self.get(vars::AUDITLOG_S3_REGION) {
            settings.s3.region = region;
        }
        if let Some(size) = self.get_parsed::<i64>(vars::AUDITLOG_BUFFER_SIZE)? {
            settings.buffer_size = buffer_size_or_default(size);
        }
        if let Some(disable) = self.get_bool(vars::AUDITLOG_DISABLE_REQUEST)? {
            settings.disable_request_audit_logs = disable;
        }
        if let Some(disable) = self.get_bool(vars::AUDITLOG_DISABLE_RESPONSE)? {
            settings.disable_response_audit_logs = disable;
        }
        if let Some(headers) = self.get_list(vars::AUDITLOG_REDACT_HEADERS) {
            settings.redact_headers = headers;
        }
        if let Some(keys) = self.get_list(vars::AUDITLOG_REDACT_BODY_KEYS) {
            settings.redact_body_keys = keys;
        }
        if let Some(params) = self.get_list(vars::AUDITLOG_PATH_PARAMS) {
            settings.audit_path_params = params;
        }
        Ok(())
    }
}
