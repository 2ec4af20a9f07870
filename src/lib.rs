//! Worker Health
//!
//! Health checks and self-healing for task-processing workers behind an
//! HTTP API, restarted through docker-compose.

/// Build-time information (timestamp, target, compiler)
pub mod build_info;

/// docker-compose adapter for queue inspection and restarts
pub mod compose;

/// Layered configuration and the worker registry
pub mod config;

pub mod error;

/// Probing, aggregation, queue triage and remediation
pub mod health;

/// Operator confirmation policies
pub mod prompt;
