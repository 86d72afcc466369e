use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
}

impl TestStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            TestStatus::Passed => "✔",
            TestStatus::Failed => "✘",
        }
    }

    /// Word printed after "Running <id> ... ".
    pub fn label(&self) -> &'static str {
        match self {
            TestStatus::Passed => "OK",
            TestStatus::Failed => "FAILED",
        }
    }
}
