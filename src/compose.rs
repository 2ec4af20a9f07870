//! docker-compose adapter for queue inspection and service restarts

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::config::ComposeConfig;
use crate::error::{RemediationError, TriageError};
use crate::health::remediation::{RestartPlan, ServiceRestarter};
use crate::health::triage::{QueueInspector, QueueRow, parse_queue_listing};

/// Runs compose commands in the project directory
///
/// Every command inherits the current environment; when a version is set it
/// is additionally exported under `version_env`.
#[derive(Debug, Clone)]
pub struct ComposeCli {
    config: ComposeConfig,
    project_dir: Option<PathBuf>,
    version: Option<String>,
}

impl ComposeCli {
    pub fn new(
        config: ComposeConfig,
        project_dir: Option<PathBuf>,
        version: Option<String>,
    ) -> Self {
        Self {
            config,
            project_dir,
            version,
        }
    }

    /// Arguments listing queues with their ready-message counts
    pub fn list_queues_args(&self) -> Vec<String> {
        [
            "exec",
            &self.config.broker_service,
            "rabbitmqctl",
            "list_queues",
            "--online",
            "name",
            "messages_ready",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Arguments purging a celery queue
    pub fn purge_args(&self, queue: &str) -> Vec<String> {
        [
            "exec",
            &self.config.app_service,
            "celery",
            "-A",
            &self.config.celery_app,
            "-Q",
            queue,
            "purge",
            "-f",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Extra environment passed to every command
    pub fn env_overrides(&self) -> Vec<(String, String)> {
        self.version
            .iter()
            .map(|v| (self.config.version_env.clone(), v.clone()))
            .collect()
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.config.program);
        command.args(args).envs(self.env_overrides());
        if let Some(dir) = &self.project_dir {
            command.current_dir(dir);
        }
        debug!(program = %self.config.program, ?args, dir = ?self.project_dir, "running compose");
        command
    }

    fn display(&self, args: &[String]) -> String {
        format!("{} {}", self.config.program, args.join(" "))
    }
}

impl QueueInspector for ComposeCli {
    fn list_queues(&self) -> Result<Vec<QueueRow>, TriageError> {
        let args = self.list_queues_args();
        let output = self
            .command(&args)
            .output()
            .map_err(|source| TriageError::Spawn {
                command: self.display(&args),
                source,
            })?;

        if !output.status.success() {
            return Err(TriageError::Status {
                command: self.display(&args),
                status: output.status.to_string(),
            });
        }

        Ok(parse_queue_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    fn purge(&self, queue: &str) -> Result<(), TriageError> {
        let args = self.purge_args(queue);
        let status = self
            .command(&args)
            .status()
            .map_err(|source| TriageError::Spawn {
                command: self.display(&args),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(TriageError::Status {
                command: self.display(&args),
                status: status.to_string(),
            })
        }
    }
}

impl ServiceRestarter for ComposeCli {
    fn restart(&self, plan: &RestartPlan) -> Result<(), RemediationError> {
        let args = plan.args();
        let mut command = self.command(&args);
        // The plan's version wins over the one given at construction.
        if let Some(version) = &plan.version {
            command.env(&self.config.version_env, version);
        }

        let status = command.status().map_err(|source| RemediationError::Spawn {
            command: self.display(&args),
            source,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(RemediationError::Status {
                command: self.display(&args),
                status: status.to_string(),
            })
        }
    }
}
