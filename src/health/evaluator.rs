//! Turns one worker test into a verdict

use std::time::Instant;

use tracing::{debug, warn};

use super::probe::{ProbeClient, TaskStatus};
use super::verdict::{TestOutcome, Verdict};
use crate::config::{PollConfig, WorkerTest};
use crate::error::ProbeError;

/// Submits a worker test and polls it within a fixed budget
pub struct HealthEvaluator<'a, C: ProbeClient + ?Sized> {
    client: &'a C,
    poll: PollConfig,
}

impl<'a, C: ProbeClient + ?Sized> HealthEvaluator<'a, C> {
    pub fn new(client: &'a C, poll: PollConfig) -> Self {
        Self { client, poll }
    }

    /// Evaluates a single test
    ///
    /// A rejected submission is returned as an error, never as
    /// `Verdict::Failed`. Each unresolved poll is followed by a blocking pause,
    /// so the worst case is `attempts * interval`. A transport error while
    /// polling uses up an attempt; it is only returned if the final attempt
    /// also ends in one.
    pub fn evaluate(&self, test: &WorkerTest) -> Result<Verdict, ProbeError> {
        let handle = self.client.submit(&test.endpoint, &test.payload)?;

        for attempt in 1..=self.poll.attempts {
            match self.client.poll_status(&handle) {
                Ok(status) => {
                    if let Some(verdict) = classify(status) {
                        debug!(worker = %test.name, attempt, %verdict, "task resolved");
                        return Ok(verdict);
                    }
                }
                Err(e) if attempt == self.poll.attempts => return Err(e),
                Err(e) => {
                    warn!(worker = %test.name, attempt, error = %e, "status poll failed");
                }
            }
            std::thread::sleep(self.poll.interval());
        }

        debug!(worker = %test.name, attempts = self.poll.attempts, "task timed out");
        Ok(Verdict::TimedOut)
    }

    /// Evaluates a test and records how long it took
    pub fn run(&self, test: &WorkerTest) -> TestOutcome {
        let start = Instant::now();
        let result = self.evaluate(test);
        TestOutcome {
            worker: test.name.clone(),
            endpoint: test.endpoint.clone(),
            result,
            duration: start.elapsed(),
        }
    }
}

/// Completion is checked before failure
fn classify(status: TaskStatus) -> Option<Verdict> {
    if status.complete {
        Some(Verdict::Healthy)
    } else if status.failed {
        Some(Verdict::Failed)
    } else {
        None
    }
}
