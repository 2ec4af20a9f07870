//! Restart of failed workers through the orchestrator

use std::collections::HashMap;

use tracing::{info, warn};

use super::verdict::{Verdict, VerdictMap};
use crate::error::RemediationError;

/// Which services to recreate and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPlan {
    /// Services to recreate, in verdict order
    pub targets: Vec<String>,
    /// Replica counts for targets that have an override
    pub scales: Vec<(String, u32)>,
    /// Image tag exported to the orchestrator
    pub version: Option<String>,
}

impl RestartPlan {
    /// Builds a plan covering every worker whose verdict is exactly `Failed`
    ///
    /// Timed-out workers are not restarted. Scale overrides for workers
    /// outside the plan are ignored.
    pub fn from_verdicts(
        verdicts: &VerdictMap,
        scale_overrides: &HashMap<String, u32>,
        version: Option<&str>,
    ) -> Self {
        let targets = verdicts.names_with(Verdict::Failed);
        let scales = targets
            .iter()
            .filter_map(|name| scale_overrides.get(name).map(|scale| (name.clone(), *scale)))
            .collect();
        Self {
            targets,
            scales,
            version: version.map(str::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Arguments for the orchestrator's recreate operation
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "up".to_string(),
            "--detach".to_string(),
            "--force-recreate".to_string(),
        ];
        for (name, scale) in &self.scales {
            args.push("--scale".to_string());
            args.push(format!("{name}={scale}"));
        }
        args.extend(self.targets.iter().cloned());
        args
    }
}

/// Parses a `NAME=SCALE` pair, splitting on the first `=`
pub fn parse_scale(pair: &str) -> Result<(String, u32), String> {
    let (name, scale) = pair
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=SCALE, got '{pair}'"))?;
    if name.is_empty() {
        return Err(format!("missing service name in '{pair}'"));
    }
    let scale = scale
        .parse()
        .map_err(|_| format!("invalid scale '{scale}' for '{name}'"))?;
    Ok((name.to_string(), scale))
}

/// Recreates services
pub trait ServiceRestarter {
    fn restart(&self, plan: &RestartPlan) -> Result<(), RemediationError>;
}

/// What the remediation stage did
#[derive(Debug)]
pub enum RemediationOutcome {
    /// Restarts were turned off
    Disabled,
    /// No worker needed a restart
    NothingToRestart,
    /// The restart command succeeded
    Restarted(RestartPlan),
    /// The restart command failed; not retried
    Failed {
        plan: RestartPlan,
        error: RemediationError,
    },
}

impl RemediationOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RemediationOutcome::Failed { .. })
    }
}

/// Final pipeline stage
pub struct Remediator<'a> {
    restarter: &'a dyn ServiceRestarter,
    scale_overrides: HashMap<String, u32>,
    version: Option<String>,
}

impl<'a> Remediator<'a> {
    pub fn new(restarter: &'a dyn ServiceRestarter) -> Self {
        Self {
            restarter,
            scale_overrides: HashMap::new(),
            version: None,
        }
    }

    /// Adds replica counts applied when a worker is restarted
    pub fn with_scales(mut self, scales: impl IntoIterator<Item = (String, u32)>) -> Self {
        self.scale_overrides.extend(scales);
        self
    }

    /// Pins the image tag used for recreated services
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    /// Restarts every failed worker with a single command
    pub fn remediate(&self, verdicts: &VerdictMap) -> RemediationOutcome {
        let plan =
            RestartPlan::from_verdicts(verdicts, &self.scale_overrides, self.version.as_deref());
        if plan.is_empty() {
            return RemediationOutcome::NothingToRestart;
        }

        info!(
            targets = ?plan.targets,
            scales = ?plan.scales,
            version = ?plan.version,
            "restarting workers"
        );
        match self.restarter.restart(&plan) {
            Ok(()) => RemediationOutcome::Restarted(plan),
            Err(error) => {
                warn!(error = %error, "unable to restart workers");
                RemediationOutcome::Failed { plan, error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct RecordingRestarter {
        fail: bool,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl ServiceRestarter for RecordingRestarter {
        fn restart(&self, plan: &RestartPlan) -> Result<(), RemediationError> {
            self.calls.borrow_mut().push(plan.args());
            if self.fail {
                Err(RemediationError::Status {
                    command: "docker-compose up".to_string(),
                    status: "exit status: 1".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn verdicts() -> VerdictMap {
        [
            ("A", Verdict::Failed),
            ("B", Verdict::TimedOut),
            ("C", Verdict::Healthy),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_only_failed_workers_are_targets() {
        let plan = RestartPlan::from_verdicts(&verdicts(), &HashMap::new(), None);
        assert_eq!(plan.targets, ["A"]);
    }

    #[test]
    fn test_args_include_scales_for_targets_only() {
        let mut verdicts = verdicts();
        verdicts.record("D", Verdict::Failed);
        let scales: HashMap<String, u32> = [
            ("D".to_string(), 3),
            ("B".to_string(), 2),
        ]
        .into();

        let plan = RestartPlan::from_verdicts(&verdicts, &scales, Some("2024.01"));

        assert_eq!(
            plan.args(),
            ["up", "--detach", "--force-recreate", "--scale", "D=3", "A", "D"]
        );
        assert_eq!(plan.version.as_deref(), Some("2024.01"));
    }

    #[test]
    fn test_nothing_failed_issues_no_command() {
        let restarter = RecordingRestarter::default();
        let verdicts: VerdictMap = [("B", Verdict::TimedOut)].into_iter().collect();

        let outcome = Remediator::new(&restarter).remediate(&verdicts);

        assert!(matches!(outcome, RemediationOutcome::NothingToRestart));
        assert!(restarter.calls.borrow().is_empty());
    }

    #[test]
    fn test_single_invocation_for_all_targets() {
        let restarter = RecordingRestarter::default();
        let mut verdicts = verdicts();
        verdicts.record("E", Verdict::Failed);

        let outcome = Remediator::new(&restarter)
            .with_scales([("A".to_string(), 2)])
            .remediate(&verdicts);

        assert!(matches!(outcome, RemediationOutcome::Restarted(_)));
        assert_eq!(
            *restarter.calls.borrow(),
            [vec!["up", "--detach", "--force-recreate", "--scale", "A=2", "A", "E"]]
        );
    }

    #[test]
    fn test_failed_restart_is_reported() {
        let restarter = RecordingRestarter {
            fail: true,
            ..Default::default()
        };

        let outcome = Remediator::new(&restarter).remediate(&verdicts());

        assert!(outcome.is_failure());
        assert_eq!(restarter.calls.borrow().len(), 1);
    }

    #[test]
    fn test_parse_scale() {
        assert_eq!(parse_scale("tb_c_worker=2"), Ok(("tb_c_worker".to_string(), 2)));
        assert!(parse_scale("tb_c_worker").is_err());
        assert!(parse_scale("=2").is_err());
        assert!(parse_scale("a=b=2").is_err());
        assert!(parse_scale("a=-1").is_err());
    }
}
