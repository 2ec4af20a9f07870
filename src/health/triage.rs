//! Queue triage for a timed-out critical worker
//!
//! A timeout on the critical worker usually means its queue is backed up
//! rather than the worker being broken. Triage looks at the queue, and if the
//! operator agrees, purges it and marks the worker failed so the restart
//! stage picks it up.

use tracing::{info, warn};

use super::verdict::{Verdict, VerdictMap};
use crate::error::TriageError;

/// One row of the broker's queue listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRow {
    pub name: String,
    /// Messages ready for delivery, if the column parsed as a number
    pub messages_ready: Option<u64>,
}

/// Parses whitespace-separated `name count` rows
///
/// Blank lines are skipped. Header and banner lines are kept as rows; they
/// never match a queue name in practice.
pub fn parse_queue_listing(output: &str) -> Vec<QueueRow> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            Some(QueueRow {
                name: name.to_string(),
                messages_ready: parts.next().and_then(|count| count.parse().ok()),
            })
        })
        .collect()
}

/// Lists and purges broker queues
pub trait QueueInspector {
    fn list_queues(&self) -> Result<Vec<QueueRow>, TriageError>;

    /// Drops all pending messages from `queue`
    fn purge(&self, queue: &str) -> Result<(), TriageError>;
}

/// Asks whether a destructive action may proceed
pub trait Confirm {
    fn confirm(&self, question: &str) -> Result<bool, TriageError>;
}

/// What triage did with the critical worker
#[derive(Debug)]
pub enum TriageOutcome {
    /// The critical worker did not time out
    NotNeeded,
    /// The listing had no row for the worker's queue
    QueueNotFound,
    /// The operator declined the purge
    Declined { pending: u64 },
    /// The queue was purged and the worker escalated to failed
    Purged { pending: u64 },
    /// The purge failed; the worker stays timed out
    PurgeFailed { pending: u64, error: TriageError },
    /// The queue could not be inspected
    Skipped(TriageError),
}

impl TriageOutcome {
    pub fn escalated(&self) -> bool {
        matches!(self, TriageOutcome::Purged { .. })
    }
}

/// Verdicts after triage, plus what happened
#[derive(Debug)]
pub struct TriageResult {
    pub verdicts: VerdictMap,
    pub outcome: TriageOutcome,
}

/// Pipeline stage between aggregation and remediation
pub struct QueueTriage<'a> {
    inspector: &'a dyn QueueInspector,
    confirm: &'a dyn Confirm,
}

impl<'a> QueueTriage<'a> {
    pub fn new(inspector: &'a dyn QueueInspector, confirm: &'a dyn Confirm) -> Self {
        Self { inspector, confirm }
    }

    /// Runs triage for `critical_worker`
    ///
    /// Only the entry for `critical_worker` can change, and only from
    /// `TimedOut` to `Failed`.
    pub fn run(&self, verdicts: VerdictMap, critical_worker: &str) -> TriageResult {
        let outcome = if verdicts.get(critical_worker) == Some(Verdict::TimedOut) {
            self.inspect(critical_worker)
        } else {
            TriageOutcome::NotNeeded
        };

        let mut verdicts = verdicts;
        if outcome.escalated() {
            verdicts.escalate(critical_worker);
        }

        TriageResult { verdicts, outcome }
    }

    fn inspect(&self, queue: &str) -> TriageOutcome {
        info!(queue, "critical worker timed out, checking queue");

        let rows = match self.inspector.list_queues() {
            Ok(rows) => rows,
            Err(e) => {
                warn!(queue, error = %e, "unable to list queues");
                return TriageOutcome::Skipped(e);
            }
        };

        let Some(row) = rows.iter().find(|row| row.name == queue) else {
            info!(queue, "queue not present in listing");
            return TriageOutcome::QueueNotFound;
        };

        let Some(pending) = row.messages_ready else {
            return TriageOutcome::Skipped(TriageError::Parse {
                queue: queue.to_string(),
            });
        };

        let question = format!(
            "There are {pending} tasks waiting in the {queue} queue. \
             Do you want to clear the queue and restart the worker?"
        );
        match self.confirm.confirm(&question) {
            Ok(true) => {}
            Ok(false) => return TriageOutcome::Declined { pending },
            Err(e) => return TriageOutcome::Skipped(e),
        }

        match self.inspector.purge(queue) {
            Ok(()) => {
                info!(queue, pending, "queue purged");
                TriageOutcome::Purged { pending }
            }
            Err(error) => {
                warn!(queue, error = %error, "unable to clear queue, not restarting worker");
                TriageOutcome::PurgeFailed { pending, error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    const LISTING: &str = "\
Timeout: 60.0 seconds ...
Listing queues for vhost / ...
name\tmessages_ready
celery\t0
X\t12
tb_c_worker\t3
";

    struct FakeBroker {
        listing: Result<&'static str, ()>,
        purge_ok: bool,
        purged: RefCell<Vec<String>>,
    }

    impl FakeBroker {
        fn new(listing: &'static str, purge_ok: bool) -> Self {
            Self {
                listing: Ok(listing),
                purge_ok,
                purged: RefCell::new(Vec::new()),
            }
        }
    }

    impl QueueInspector for FakeBroker {
        fn list_queues(&self) -> Result<Vec<QueueRow>, TriageError> {
            match self.listing {
                Ok(text) => Ok(parse_queue_listing(text)),
                Err(()) => Err(TriageError::Status {
                    command: "list_queues".to_string(),
                    status: "exit status: 1".to_string(),
                }),
            }
        }

        fn purge(&self, queue: &str) -> Result<(), TriageError> {
            self.purged.borrow_mut().push(queue.to_string());
            if self.purge_ok {
                Ok(())
            } else {
                Err(TriageError::Status {
                    command: "purge".to_string(),
                    status: "exit status: 1".to_string(),
                })
            }
        }
    }

    struct Answer(bool, RefCell<Vec<String>>);

    impl Answer {
        fn yes() -> Self {
            Self(true, RefCell::new(Vec::new()))
        }

        fn no() -> Self {
            Self(false, RefCell::new(Vec::new()))
        }
    }

    impl Confirm for Answer {
        fn confirm(&self, question: &str) -> Result<bool, TriageError> {
            self.1.borrow_mut().push(question.to_string());
            Ok(self.0)
        }
    }

    fn timed_out() -> VerdictMap {
        [("X", Verdict::TimedOut), ("Y", Verdict::Healthy)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_parse_queue_listing() {
        let rows = parse_queue_listing(LISTING);

        let x = rows.iter().find(|r| r.name == "X").unwrap();
        assert_eq!(x.messages_ready, Some(12));
        let header = rows.iter().find(|r| r.name == "name").unwrap();
        assert_eq!(header.messages_ready, None);
        assert!(parse_queue_listing("\n\n").is_empty());
    }

    #[test]
    fn test_declined_leaves_verdict_and_skips_purge() {
        let broker = FakeBroker::new(LISTING, true);
        let answer = Answer::no();

        let result = QueueTriage::new(&broker, &answer).run(timed_out(), "X");

        assert_eq!(result.verdicts.get("X"), Some(Verdict::TimedOut));
        assert!(matches!(result.outcome, TriageOutcome::Declined { pending: 12 }));
        assert!(broker.purged.borrow().is_empty());
        assert!(answer.1.borrow()[0].contains("12 tasks"));
    }

    #[test]
    fn test_confirmed_purge_escalates_to_failed() {
        let broker = FakeBroker::new(LISTING, true);

        let result = QueueTriage::new(&broker, &Answer::yes()).run(timed_out(), "X");

        assert_eq!(result.verdicts.get("X"), Some(Verdict::Failed));
        assert_eq!(result.verdicts.get("Y"), Some(Verdict::Healthy));
        assert_eq!(*broker.purged.borrow(), ["X"]);
        assert!(result.outcome.escalated());
    }

    #[test]
    fn test_failed_purge_keeps_timed_out() {
        let broker = FakeBroker::new(LISTING, false);

        let result = QueueTriage::new(&broker, &Answer::yes()).run(timed_out(), "X");

        assert_eq!(result.verdicts.get("X"), Some(Verdict::TimedOut));
        assert!(matches!(result.outcome, TriageOutcome::PurgeFailed { pending: 12, .. }));
    }

    #[test]
    fn test_missing_row_skips_silently() {
        let broker = FakeBroker::new("celery\t4\n", true);
        let answer = Answer::yes();

        let result = QueueTriage::new(&broker, &answer).run(timed_out(), "X");

        assert!(matches!(result.outcome, TriageOutcome::QueueNotFound));
        assert!(answer.1.borrow().is_empty());
        assert_eq!(result.verdicts.get("X"), Some(Verdict::TimedOut));
    }

    #[test]
    fn test_empty_queue_still_prompts() {
        let broker = FakeBroker::new("X 0\n", true);
        let answer = Answer::no();

        let result = QueueTriage::new(&broker, &answer).run(timed_out(), "X");

        assert!(matches!(result.outcome, TriageOutcome::Declined { pending: 0 }));
        assert_eq!(answer.1.borrow().len(), 1);
    }

    #[test]
    fn test_not_timed_out_is_left_alone() {
        let broker = FakeBroker::new(LISTING, true);
        let verdicts: VerdictMap = [("X", Verdict::Failed)].into_iter().collect();

        let result = QueueTriage::new(&broker, &Answer::yes()).run(verdicts, "X");

        assert!(matches!(result.outcome, TriageOutcome::NotNeeded));
        assert_eq!(result.verdicts.get("X"), Some(Verdict::Failed));
        assert!(broker.purged.borrow().is_empty());
    }

    #[test]
    fn test_listing_failure_skips_escalation() {
        let broker = FakeBroker {
            listing: Err(()),
            purge_ok: true,
            purged: RefCell::new(Vec::new()),
        };

        let result = QueueTriage::new(&broker, &Answer::yes()).run(timed_out(), "X");

        assert!(matches!(result.outcome, TriageOutcome::Skipped(_)));
        assert_eq!(result.verdicts.get("X"), Some(Verdict::TimedOut));
    }

    #[test]
    fn test_unparseable_count_skips_escalation() {
        let broker = FakeBroker::new("X many\n", true);

        let result = QueueTriage::new(&broker, &Answer::yes()).run(timed_out(), "X");

        assert!(matches!(
            result.outcome,
            TriageOutcome::Skipped(TriageError::Parse { .. })
        ));
        assert!(broker.purged.borrow().is_empty());
    }
}
