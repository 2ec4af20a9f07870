//! Worker health checks and self-healing
//!
//! A run moves through fixed stages:
//!
//! ```text
//! Probing -> Aggregating -> [TriageCheck] -> Remediating -> Done
//! ```
//!
//! Triage only runs when the critical worker timed out, and remediation only
//! issues a command when at least one worker ended up `Failed`.
//!
//! # Example
//!
//! ```no_run
//! use worker_health::compose::ComposeCli;
//! use worker_health::config::MonitorConfig;
//! use worker_health::health::{ApiClient, Collaborators, Pipeline, RunOptions};
//! use worker_health::prompt::ConfirmPolicy;
//!
//! let config = MonitorConfig::load(None).unwrap();
//! let client = ApiClient::new("localhost", &config.api).unwrap();
//! let compose = ComposeCli::new(config.compose.clone(), None, None);
//!
//! let summary = Pipeline::new(
//!     &config,
//!     Collaborators {
//!         client: &client,
//!         inspector: &compose,
//!         confirm: &ConfirmPolicy::AlwaysDeny,
//!         restarter: &compose,
//!     },
//! )
//! .run(&RunOptions::default(), |_| {});
//!
//! std::process::exit(summary.exit_code());
//! ```

pub mod evaluator;
pub mod probe;
pub mod remediation;
pub mod reporter;
pub mod runner;
pub mod triage;
pub mod verdict;

use std::collections::HashSet;

use tracing::info;

pub use evaluator::HealthEvaluator;
pub use probe::{ApiClient, ProbeClient, TaskHandle, TaskStatus};
pub use remediation::{RemediationOutcome, Remediator, RestartPlan, ServiceRestarter};
pub use reporter::{format_report, print_event};
pub use runner::{HealthCheckReport, HealthCheckRunner};
pub use triage::{Confirm, QueueInspector, QueueTriage, TriageOutcome};
pub use verdict::{TestOutcome, Verdict, VerdictMap};

use crate::config::MonitorConfig;

/// Per-invocation choices
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Workers to check; empty means all
    pub workers: HashSet<String>,
    /// Whether failed workers are restarted
    pub restart: bool,
    /// Replica counts applied on restart
    pub scales: Vec<(String, u32)>,
    /// Image tag for recreated services
    pub version: Option<String>,
    /// Number of tests probed concurrently
    pub parallelism: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: HashSet::new(),
            restart: true,
            scales: Vec::new(),
            version: None,
            parallelism: 1,
        }
    }
}

/// External capabilities a run depends on
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub client: &'a dyn ProbeClient,
    pub inspector: &'a dyn QueueInspector,
    pub confirm: &'a dyn Confirm,
    pub restarter: &'a dyn ServiceRestarter,
}

/// Stage transitions reported while a run progresses
#[derive(Debug)]
pub enum PipelineEvent<'e> {
    /// All selected tests have been probed and merged
    Probed(&'e HealthCheckReport),
    /// The critical worker timed out and its queue is about to be checked
    TriageStarting(&'e str),
    /// Triage finished
    Triaged(&'e TriageOutcome),
    /// Remediation finished or was skipped
    Remediated(&'e RemediationOutcome),
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunSummary {
    /// Probe results and verdicts before triage
    pub report: HealthCheckReport,
    pub triage: TriageOutcome,
    /// Verdicts after triage, as used for remediation
    pub verdicts: VerdictMap,
    pub remediation: RemediationOutcome,
}

impl RunSummary {
    /// Process exit code for this run
    ///
    /// 0 = all healthy, 1 = any failure, probe error or failed restart,
    /// 2 = only timeouts
    pub fn exit_code(&self) -> i32 {
        let any_failed = self.verdicts.iter().any(|(_, v)| v == Verdict::Failed);
        let any_timeout = self.verdicts.iter().any(|(_, v)| v == Verdict::TimedOut);
        if any_failed || self.report.has_errors() || self.remediation.is_failure() {
            1
        } else if any_timeout {
            2
        } else {
            0
        }
    }
}

/// One health-check run over the configured registry
pub struct Pipeline<'a> {
    config: &'a MonitorConfig,
    deps: Collaborators<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a MonitorConfig, deps: Collaborators<'a>) -> Self {
        Self { config, deps }
    }

    /// Runs every stage to completion
    ///
    /// `on_event` is called after each stage, before the next one starts, so
    /// status output appears ahead of any operator prompt.
    pub fn run(
        &self,
        options: &RunOptions,
        mut on_event: impl FnMut(PipelineEvent<'_>),
    ) -> RunSummary {
        let report = HealthCheckRunner::new(self.deps.client, self.config.poll)
            .with_parallelism(options.parallelism)
            .run(&self.config.workers, &options.workers);
        on_event(PipelineEvent::Probed(&report));

        let critical = self.config.triage.critical_worker.as_str();
        if report.verdicts.get(critical) == Some(Verdict::TimedOut) {
            on_event(PipelineEvent::TriageStarting(critical));
        }
        let triaged = QueueTriage::new(self.deps.inspector, self.deps.confirm)
            .run(report.verdicts.clone(), critical);
        if !matches!(triaged.outcome, TriageOutcome::NotNeeded) {
            on_event(PipelineEvent::Triaged(&triaged.outcome));
        }

        let remediation = if options.restart {
            Remediator::new(self.deps.restarter)
                .with_scales(options.scales.iter().cloned())
                .with_version(options.version.clone())
                .remediate(&triaged.verdicts)
        } else {
            RemediationOutcome::Disabled
        };
        on_event(PipelineEvent::Remediated(&remediation));

        info!(workers = triaged.verdicts.len(), "health check finished");

        RunSummary {
            report,
            triage: triaged.outcome,
            verdicts: triaged.verdicts,
            remediation,
        }
    }
}
