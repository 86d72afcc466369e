use std::path::PathBuf;

use crate::build::Built;
use crate::compare::{CaseRunner, stem_of};
use crate::config::{Config, Layout};
use crate::error::{Result, SelfCheckError};
use crate::events::{Reporter, RunEvent};
use crate::models::SuiteSummary;
use crate::runner::ProcessRunner;

/// Test-input files, in lexicographic order.
pub fn discover(config: &Config, layout: &Layout) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&layout.tests_dir.to_string_lossy()),
        config.test_extension
    );
    let entries = glob::glob(&pattern)
        .map_err(|e| SelfCheckError::Config(format!("bad test pattern '{}': {}", pattern, e)))?;
    let mut inputs: Vec<PathBuf> = entries.flatten().filter(|p| p.is_file()).collect();
    inputs.sort();
    Ok(inputs)
}

/// Run every test case. A failing case is recorded and iteration moves on.
pub async fn run_cases(
    runner: &dyn ProcessRunner,
    config: &Config,
    layout: &Layout,
    built: &Built,
    reporter: &Reporter,
) -> Result<SuiteSummary> {
    let inputs = discover(config, layout)?;
    let _ = reporter.send(RunEvent::SuiteStarted {
        total: inputs.len(),
    });

    let cases = CaseRunner {
        runner,
        config,
        layout,
        built,
    };
    let mut summary = SuiteSummary::default();
    for input in &inputs {
        let id = stem_of(input);
        let _ = reporter.send(RunEvent::CaseStarted { id: id.clone() });
        let result = cases.run(input).await;
        tracing::debug!(
            case = %id,
            status = ?result.status,
            reason = ?result.reason(),
            "case finished"
        );
        summary.record(&id, &result);
        let _ = reporter.send(RunEvent::CaseFinished { result });
    }

    let _ = reporter.send(RunEvent::SuiteFinished {
        summary: summary.clone(),
    });
    Ok(summary)
}

/// Turn a finished suite into the run's pass/fail result.
pub fn verdict(summary: &SuiteSummary) -> Result<()> {
    if summary.all_passed() {
        Ok(())
    } else {
        Err(SelfCheckError::SuiteFailed {
            count: summary.failed,
            details: summary.details(),
        })
    }
}
