//! Verdicts and the per-worker verdict map

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;

use crate::error::ProbeError;

/// Outcome of exercising a worker
///
/// Merging takes the larger ordinal code, so `TimedOut` wins over `Failed`
/// even though a timeout is not a worse condition; restart decisions rely on
/// the two staying distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The synthetic task completed
    Healthy,
    /// The synthetic task reported failure
    Failed,
    /// The task neither completed nor failed within the poll budget
    TimedOut,
}

impl Verdict {
    /// Ordinal severity code used for merging
    pub fn code(&self) -> u8 {
        match self {
            Verdict::Healthy => 0,
            Verdict::Failed => 1,
            Verdict::TimedOut => 2,
        }
    }

    /// Combines two verdicts for the same worker
    pub fn merge(self, other: Verdict) -> Verdict {
        if other.code() > self.code() { other } else { self }
    }

    /// Status phrase used in per-worker lines
    pub fn describe(&self) -> &'static str {
        match self {
            Verdict::Healthy => "is ok",
            Verdict::Failed => "is not ok",
            Verdict::TimedOut => "timed out",
        }
    }

    /// Returns the status phrase as a colored string
    pub fn as_colored_str(&self) -> String {
        use colored::Colorize;
        match self {
            Verdict::Healthy => self.describe().bright_green().to_string(),
            Verdict::Failed => self.describe().bright_red().to_string(),
            Verdict::TimedOut => self.describe().bright_yellow().to_string(),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::Healthy => "healthy",
            Verdict::Failed => "failed",
            Verdict::TimedOut => "timed out",
        };
        f.write_str(label)
    }
}

/// Final verdict per worker name, in first-seen registry order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerdictMap {
    entries: IndexMap<String, Verdict>,
}

impl VerdictMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a verdict into the entry for `name`
    pub fn record(&mut self, name: &str, verdict: Verdict) -> Verdict {
        let merged = match self.entries.get(name) {
            Some(existing) => existing.merge(verdict),
            None => verdict,
        };
        self.entries.insert(name.to_string(), merged);
        merged
    }

    /// Marks a timed-out worker as failed so it gets restarted
    ///
    /// Returns false if the worker is not currently `TimedOut`.
    pub fn escalate(&mut self, name: &str) -> bool {
        match self.entries.get_mut(name) {
            Some(verdict) if *verdict == Verdict::TimedOut => {
                *verdict = Verdict::Failed;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<Verdict> {
        self.entries.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Verdict)> {
        self.entries.iter().map(|(name, verdict)| (name.as_str(), *verdict))
    }

    /// Names whose verdict is exactly `verdict`
    pub fn names_with(&self, verdict: Verdict) -> Vec<String> {
        self.iter()
            .filter(|(_, v)| *v == verdict)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Verdict)> for VerdictMap {
    fn from_iter<I: IntoIterator<Item = (S, Verdict)>>(iter: I) -> Self {
        let mut map = VerdictMap::new();
        for (name, verdict) in iter {
            map.record(&name.into(), verdict);
        }
        map
    }
}

/// Result of evaluating a single worker test
#[derive(Debug)]
pub struct TestOutcome {
    /// Worker the test belongs to
    pub worker: String,
    /// Endpoint that was exercised
    pub endpoint: String,
    /// Verdict, or the reason none could be produced
    pub result: Result<Verdict, ProbeError>,
    /// How long submission and polling took
    pub duration: Duration,
}
