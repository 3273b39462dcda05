use crate::ledger::Endpoint;
use itertools::Itertools;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Success,
    Failed(String),
    Cancelled,
}

impl SessionOutcome {
    fn label(&self) -> &'static str {
        match self {
            SessionOutcome::Success => "success",
            SessionOutcome::Failed(_) => "failed",
            SessionOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionReport {
    pub endpoint: Endpoint,
    pub outcome: SessionOutcome,
    pub rounds_completed: u64,
    pub transactions_posted: usize,
    pub transactions_failed: usize,
    pub elapsed: Duration,
}

impl SessionReport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            outcome: SessionOutcome::Cancelled,
            rounds_completed: 0,
            transactions_posted: 0,
            transactions_failed: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == SessionOutcome::Success
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match &self.outcome {
            SessionOutcome::Failed(reason) => reason.replace(',', ";"),
            _ => String::new(),
        };
        write!(
            f,
            "{},{},{},{},{},{:.1},{}",
            self.endpoint,
            self.outcome.label(),
            self.rounds_completed,
            self.transactions_posted,
            self.transactions_failed,
            self.elapsed.as_secs_f64(),
            reason
        )
    }
}

#[derive(Default)]
pub struct StatsAccumulator {
    reports: Vec<SessionReport>,
}

impl StatsAccumulator {
    pub fn add_report(&mut self, report: SessionReport) {
        self.reports.push(report);
    }

    pub fn reports(&self) -> &[SessionReport] {
        &self.reports
    }

    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|report| report.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }

    pub fn log_summary(&self) {
        for report in self.reports.iter() {
            match &report.outcome {
                SessionOutcome::Success => tracing::info!(
                    endpoint = %report.endpoint,
                    rounds = report.rounds_completed,
                    posted = report.transactions_posted,
                    failed = report.transactions_failed,
                    "session finished"
                ),
                SessionOutcome::Failed(reason) => tracing::warn!(
                    endpoint = %report.endpoint,
                    rounds = report.rounds_completed,
                    "session failed: {}",
                    reason
                ),
                SessionOutcome::Cancelled => tracing::warn!(
                    endpoint = %report.endpoint,
                    rounds = report.rounds_completed,
                    "session cancelled"
                ),
            }
        }
        tracing::info!(
            "{} sessions succeeded, {} did not",
            self.succeeded(),
            self.failed()
        );
    }

    pub fn dump_stats(&self, path: &Path) -> anyhow::Result<()> {
        let mut stats = File::create(path)?;
        stats.write_all(
            b"endpoint,outcome,rounds_completed,transactions_posted,transactions_failed,elapsed_secs,reason\n",
        )?;
        for report in self
            .reports
            .iter()
            .sorted_by(|a, b| a.endpoint.cmp(&b.endpoint))
        {
            stats.write_all(format!("{}\n", report).as_bytes())?;
        }
        Ok(())
    }
}
