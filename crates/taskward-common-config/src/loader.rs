//! Configuration file loading.

use crate::env::{EnvError, EnvSource};
use crate::types::{ServiceConfig, SinkKind};
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file location relative to the project directory.
pub const CONFIG_FILE: &str = ".taskward/audit.yaml";

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("invalid expansion pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Configuration loader.
pub struct ConfigLoader {
    base_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for the given project directory.
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            base_path: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the config file this loader reads.
    pub fn config_path(&self) -> PathBuf {
        self.base_path.join(CONFIG_FILE)
    }

    /// Load from `.taskward/audit.yaml` and the process environment.
    pub fn load(&self) -> Result<ServiceConfig, ConfigError> {
        self.load_with(&EnvSource::process())
    }

    /// Load using `env` for expansion and overrides.
    ///
    /// A missing file means defaults. Validation runs after overrides.
    pub fn load_with<F>(&self, env: &EnvSource<F>) -> Result<ServiceConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = self.config_path();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let expanded = expand_env_vars(&contents, env)?;
            serde_yaml::from_str::<ServiceConfig>(&expanded).map_err(|e| ConfigError::ParseError {
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?
        } else {
            ServiceConfig::default()
        };

        if let Some(bind) = env.get(crate::vars::TASKWARD_BIND) {
            config.server.bind = bind;
        }
        env.apply_audit_overrides(&mut config.audit)?;

        validate(&config)?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}

/// Expand `${VAR}` and `${VAR:-default}`.
fn expand_env_vars<F>(content: &str, env: &EnvSource<F>) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")?;
    let mut out = String::with_capacity(content.len());
    let mut last = 0;

    for cap in re.captures_iter(content) {
        let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let value = match (env.get(name.as_str()), cap.get(2)) {
            (Some(value), _) => value,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => {
                return Err(ConfigError::EnvVarNotFound {
                    var: name.as_str().to_string(),
                })
            }
        };
        out.push_str(&content[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&content[last..]);
    Ok(out)
}

fn validate(config: &ServiceConfig) -> Result<(), ConfigError> {
    let audit = &config.audit;
    if audit.sink == SinkKind::S3 {
        if audit.s3.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "audit.s3.bucket is required for the s3 sink".to_string(),
            });
        }
        if audit.s3.region.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "audit.s3.region is required for the s3 sink".to_string(),
            });
        }
    }
    if config.server.bind.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            message: "server.bind must not be empty".to_string(),
        });
    }
    Ok(())
}
