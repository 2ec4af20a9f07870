//! Runs the evaluator over the worker registry and merges the verdicts

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{info, warn};

use super::evaluator::HealthEvaluator;
use super::probe::ProbeClient;
use super::verdict::{TestOutcome, VerdictMap};
use crate::config::{PollConfig, WorkerTest};
use crate::error::ProbeError;

/// Results from probing the registry
#[derive(Debug, Default)]
pub struct HealthCheckReport {
    /// Merged verdict per worker name
    pub verdicts: VerdictMap,
    /// Individual test outcomes, in registry order
    pub outcomes: Vec<TestOutcome>,
}

impl HealthCheckReport {
    /// Tests that could not produce a verdict
    pub fn errors(&self) -> impl Iterator<Item = (&str, &ProbeError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.worker.as_str(), e)))
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }
}

/// Orchestrates probing of the worker registry
pub struct HealthCheckRunner<'a, C: ProbeClient + ?Sized> {
    client: &'a C,
    poll: PollConfig,
    parallelism: usize,
}

impl<'a, C: ProbeClient + ?Sized> HealthCheckRunner<'a, C> {
    /// Creates a sequential runner
    pub fn new(client: &'a C, poll: PollConfig) -> Self {
        Self {
            client,
            poll,
            parallelism: 1,
        }
    }

    /// Evaluates up to `n` tests at once
    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.parallelism = n.max(1);
        self
    }

    /// Probes every test whose worker passes the filter
    ///
    /// An empty filter selects all workers. Tests outside the filter are not
    /// submitted. Verdicts are merged in registry order regardless of
    /// parallelism, so the report is the same as a sequential run.
    pub fn run(&self, registry: &[WorkerTest], filter: &HashSet<String>) -> HealthCheckReport {
        let selected: Vec<&WorkerTest> = registry
            .iter()
            .filter(|test| filter.is_empty() || filter.contains(&test.name))
            .collect();

        for name in filter {
            if !registry.iter().any(|test| &test.name == name) {
                warn!(worker = %name, "requested worker is not in the registry");
            }
        }

        info!(
            tests = selected.len(),
            parallelism = self.parallelism,
            "probing workers"
        );

        let outcomes = if self.parallelism > 1 && selected.len() > 1 {
            self.run_parallel(&selected)
        } else {
            let evaluator = HealthEvaluator::new(self.client, self.poll);
            selected.iter().map(|test| evaluator.run(test)).collect()
        };

        let mut verdicts = VerdictMap::new();
        for outcome in &outcomes {
            match &outcome.result {
                Ok(verdict) => {
                    verdicts.record(&outcome.worker, *verdict);
                }
                Err(e) => {
                    warn!(
                        worker = %outcome.worker,
                        endpoint = %outcome.endpoint,
                        kind = e.kind(),
                        error = %e,
                        "probe could not produce a verdict"
                    );
                }
            }
        }

        HealthCheckReport { verdicts, outcomes }
    }

    fn run_parallel(&self, selected: &[&WorkerTest]) -> Vec<TestOutcome> {
        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<TestOutcome>>> =
            Mutex::new((0..selected.len()).map(|_| None).collect());
        let workers = self.parallelism.min(selected.len());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    let evaluator = HealthEvaluator::new(self.client, self.poll);
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(test) = selected.get(index) else {
                            break;
                        };
                        let outcome = evaluator.run(test);
                        slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(outcome);
                    }
                });
            }
        });

        slots
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Verdict;
    use crate::health::evaluator::tests::{ScriptedClient, instant_poll};
    use crate::health::probe::TaskStatus;

    fn registry() -> Vec<WorkerTest> {
        vec![
            WorkerTest::new("A", "/x"),
            WorkerTest::new("A", "/y"),
            WorkerTest::new("B", "/z"),
        ]
    }

    fn client() -> ScriptedClient {
        ScriptedClient::new()
            .script("/x", vec![TaskStatus::complete()])
            .script("/y", vec![TaskStatus::failed()])
            .script("/z", vec![TaskStatus::complete()])
    }

    #[test]
    fn test_tests_sharing_a_name_merge_to_worst() {
        let client = client();
        let report = HealthCheckRunner::new(&client, instant_poll())
            .run(&registry(), &HashSet::new());

        assert_eq!(report.verdicts.get("A"), Some(Verdict::Failed));
        assert_eq!(report.verdicts.get("B"), Some(Verdict::Healthy));
        assert_eq!(report.outcomes.len(), 3);
    }

    #[test]
    fn test_filter_skips_other_workers_entirely() {
        let client = client();
        let filter: HashSet<String> = ["B".to_string()].into();

        let report = HealthCheckRunner::new(&client, instant_poll()).run(&registry(), &filter);

        assert_eq!(client.submitted(), ["/z"]);
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.verdicts.get("A"), None);
    }

    #[test]
    fn test_failed_then_timed_out_records_timed_out() {
        let client = ScriptedClient::new().script("/x", vec![TaskStatus::failed()]);
        let registry = vec![WorkerTest::new("A", "/x"), WorkerTest::new("A", "/y")];

        let report = HealthCheckRunner::new(&client, instant_poll())
            .run(&registry, &HashSet::new());

        assert_eq!(report.verdicts.get("A"), Some(Verdict::TimedOut));
        assert!(matches!(report.outcomes[0].result, Ok(Verdict::Failed)));
    }

    #[test]
    fn test_probe_error_does_not_abort_run() {
        let client = client().reject("/x");

        let report = HealthCheckRunner::new(&client, instant_poll())
            .run(&registry(), &HashSet::new());

        assert_eq!(client.submitted(), ["/x", "/y", "/z"]);
        assert_eq!(report.errors().count(), 1);
        assert_eq!(report.verdicts.get("A"), Some(Verdict::Failed));
        assert_eq!(report.verdicts.get("B"), Some(Verdict::Healthy));
    }

    #[test]
    fn test_worker_with_only_errors_has_no_verdict() {
        let client = client().reject("/z");

        let report = HealthCheckRunner::new(&client, instant_poll())
            .run(&registry(), &HashSet::new());

        assert_eq!(report.verdicts.get("B"), None);
        assert!(report.has_errors());
    }

    #[test]
    fn test_parallel_run_matches_sequential() {
        let sequential = HealthCheckRunner::new(&client(), instant_poll())
            .run(&registry(), &HashSet::new());
        let parallel = HealthCheckRunner::new(&client(), instant_poll())
            .with_parallelism(3)
            .run(&registry(), &HashSet::new());

        assert_eq!(sequential.verdicts, parallel.verdicts);
        let endpoints: Vec<&str> = parallel.outcomes.iter().map(|o| o.endpoint.as_str()).collect();
        assert_eq!(endpoints, ["/x", "/y", "/z"]);
    }
}
