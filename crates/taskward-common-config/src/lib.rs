//! Configuration for Taskward services.
//!
//! Settings come from `.taskward/audit.yaml` (with `${VAR}` and
//! `${VAR:-default}` expansion), then `AUDITLOG_*` environment overrides.

pub mod env;
pub mod loader;
pub mod types;

pub use env::*;
pub use loader::*;
pub use types::*;
