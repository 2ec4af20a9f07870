//! Error types for probing, triage and remediation

use std::io;

use thiserror::Error;

/// A probe could not produce a verdict
///
/// These describe problems with the API or the monitor's configuration,
/// not with the worker under test, and are reported separately from
/// `Verdict::Failed`.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The API rejected the submission or answered with an unexpected body
    #[error("task submission to {endpoint} failed: {reason}")]
    Setup { endpoint: String, reason: String },

    /// Network-level failure while talking to the API
    #[error("transport error on {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The host or endpoint could not be turned into a URL
    #[error("invalid API url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ProbeError {
    pub fn setup(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Setup {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Short label used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Setup { .. } | ProbeError::InvalidUrl(_) => "setup",
            ProbeError::Transport { .. } => "transport",
        }
    }
}

/// Queue triage could not inspect or purge the queue
#[derive(Debug, Error)]
pub enum TriageError {
    #[error("failed to run queue tool `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("queue tool `{command}` exited with {status}")]
    Status { command: String, status: String },

    #[error("queue listing has no pending count for '{queue}'")]
    Parse { queue: String },

    #[error("operator prompt failed: {0}")]
    Prompt(String),
}

/// The restart command could not be run or reported failure
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("failed to run restart command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("restart command `{command}` exited with {status}")]
    Status { command: String, status: String },
}
