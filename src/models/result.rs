use std::fmt;

use serde::Serialize;

use super::status::TestStatus;

/// Why a single test case failed. Never fatal to the suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ExecutionTimeout,
    MissingOutput,
    MissingExpected,
    SimulatorRuntimeError,
    SimulatorTimeout,
    ContentMismatch,
}

impl FailureReason {
    /// Short form shown next to FAILED in the progress line.
    pub fn short(&self) -> &'static str {
        match self {
            FailureReason::ExecutionTimeout => "Timeout",
            FailureReason::MissingOutput => "Output file missing",
            FailureReason::MissingExpected => "Expected output file missing",
            FailureReason::SimulatorRuntimeError => "simulator runtime error",
            FailureReason::SimulatorTimeout => "simulator timeout",
            FailureReason::ContentMismatch => "output mismatch",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureReason::ExecutionTimeout => "Timed out.",
            FailureReason::MissingOutput => "Output file was not created.",
            FailureReason::MissingExpected => "Expected output file not found",
            FailureReason::SimulatorRuntimeError => "Simulator runtime error.",
            FailureReason::SimulatorTimeout => "Simulator timed out.",
            FailureReason::ContentMismatch => "Test failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub reason: FailureReason,
    /// 1-based line where actual and expected first differ (mismatches only).
    pub first_diff_line: Option<usize>,
    /// Extra context such as the simulator's stderr.
    pub note: Option<String>,
}

impl FailureDetail {
    pub fn new(reason: FailureReason) -> Self {
        Self {
            reason,
            first_diff_line: None,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        if !note.trim().is_empty() {
            self.note = Some(note.trim().to_string());
        }
        self
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if let Some(line) = self.first_diff_line {
            write!(f, " (first difference at line {})", line)?;
        }
        Ok(())
    }
}

/// Outcome of one test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseResult {
    pub status: TestStatus,
    pub failure: Option<FailureDetail>,
}

impl CaseResult {
    pub fn passed() -> Self {
        Self {
            status: TestStatus::Passed,
            failure: None,
        }
    }

    pub fn failed(detail: FailureDetail) -> Self {
        Self {
            status: TestStatus::Failed,
            failure: Some(detail),
        }
    }

    pub fn reason(&self) -> Option<FailureReason> {
        self.failure.as_ref().map(|f| f.reason)
    }
}

impl From<FailureReason> for CaseResult {
    fn from(reason: FailureReason) -> Self {
        Self::failed(FailureDetail::new(reason))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedCase {
    pub id: String,
    pub reason: FailureReason,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub failures: Vec<FailedCase>,
}

impl SuiteSummary {
    pub fn record(&mut self, id: &str, result: &CaseResult) {
        self.total += 1;
        match &result.failure {
            None => self.passed += 1,
            Some(detail) => {
                self.failed += 1;
                self.failures.push(FailedCase {
                    id: id.to_string(),
                    reason: detail.reason,
                    message: detail.to_string(),
                });
            }
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// (identifier, reason) pairs in the order the failures happened.
    pub fn details(&self) -> Vec<(String, String)> {
        self.failures
            .iter()
            .map(|f| (f.id.clone(), f.message.clone()))
            .collect()
    }
}
