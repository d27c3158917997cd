//! ---
//! fdh_section: "11-test-harness"
//! fdh_subsection: "04-reporting"
//! fdh_type: "source"
//! fdh_scope: "code"
//! fdh_description: "Run reports produced by the lifecycle runner."
//! fdh_version: "v0.1.0"
//! fdh_owner: "tbd"
//! ---
use serde::Serialize;

use crate::terminator::TerminationOutcome;

/// Result of a single case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Passed,
    /// The case returned an error.
    Failed { message: String },
    /// The case panicked; the payload is kept as the message.
    Panicked { message: String },
}

impl CaseOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, CaseOutcome::Passed)
    }
}

/// Outcome and timing of one executed case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    /// Slash-joined path of the declaring group.
    pub group: String,
    pub name: String,
    pub outcome: CaseOutcome,
    pub duration_ms: u128,
}

/// What teardown did. Never affects [`SuiteReport::is_success`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    pub port: u16,
    /// Present when the terminator completed.
    pub outcome: Option<TerminationOutcome>,
    /// Present when the terminator failed or panicked.
    pub error: Option<String>,
}

/// Summary of one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub suite: String,
    pub run_id: u64,
    /// Cases in execution order.
    pub cases: Vec<CaseReport>,
    pub teardown: TeardownReport,
    pub duration_ms: u128,
}

impl SuiteReport {
    /// Number of passing cases.
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|c| c.outcome.is_pass()).count()
    }

    /// Number of failed or panicked cases.
    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed()
    }

    /// A run with zero cases is successful.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// One-line human summary, e.g. `Flow Dapp Tests: 0 passing, 0 failing (3 ms)`.
    pub fn summary_line(&self) -> String {
        format!(
            "{}: {} passing, {} failing ({} ms)",
            self.suite,
            self.passed(),
            self.failed(),
            self.duration_ms
        )
    }

    /// Pretty-printed JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
