use std::path::{Path, PathBuf};

use crate::build::Built;
use crate::config::{Config, Layout, split_command};
use crate::models::{CaseResult, FailureDetail, FailureReason};
use crate::runner::{CommandSpec, ProcessRunner};

/// How the actual output of a case is turned into the text compared against
/// the expected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// The output is the sentinel diagnostic; compare it as-is.
    Direct,
    /// The output is a generated program; run it and compare its stdout.
    Simulate,
}

impl Comparison {
    pub fn for_output(actual: &[u8], sentinel: &str) -> Self {
        if actual == sentinel.as_bytes() {
            Comparison::Direct
        } else {
            Comparison::Simulate
        }
    }
}

/// Everything a single case needs, borrowed from the run.
pub struct CaseRunner<'a> {
    pub runner: &'a dyn ProcessRunner,
    pub config: &'a Config,
    pub layout: &'a Layout,
    pub built: &'a Built,
}

impl CaseRunner<'_> {
    /// Run the compiler on `input` and judge its output.
    pub async fn run(&self, input: &Path) -> CaseResult {
        match self.evaluate(input).await {
            Ok(()) => CaseResult::passed(),
            Err(detail) => CaseResult::failed(detail),
        }
    }

    async fn evaluate(&self, input: &Path) -> Result<(), FailureDetail> {
        let stem = stem_of(input);
        let actual_path = self.built.actual_output(&stem);
        let expected_path = self.layout.expected_output(&stem, self.config);

        self.compile(input, &actual_path).await?;

        if !actual_path.is_file() {
            return Err(FailureDetail::new(FailureReason::MissingOutput));
        }
        if !expected_path.is_file() {
            return Err(FailureDetail::new(FailureReason::MissingExpected));
        }

        let actual = std::fs::read(&actual_path).map_err(|e| {
            FailureDetail::new(FailureReason::MissingOutput).with_note(e.to_string())
        })?;

        let subject = match Comparison::for_output(&actual, &self.config.sentinel) {
            Comparison::Direct => actual,
            Comparison::Simulate => self.simulate(&actual_path).await?,
        };

        let expected = std::fs::read(&expected_path).map_err(|e| {
            FailureDetail::new(FailureReason::MissingExpected).with_note(e.to_string())
        })?;

        if subject == expected {
            Ok(())
        } else {
            let mut detail = FailureDetail::new(FailureReason::ContentMismatch);
            detail.first_diff_line = first_diff_line(&subject, &expected);
            Err(detail)
        }
    }

    /// `<launcher...> <artifact> <input> <output>`, bounded by the case timeout.
    async fn compile(&self, input: &Path, output: &Path) -> Result<(), FailureDetail> {
        let input = absolute(input);
        let mut words = split_command(&self.config.launcher).map_err(|e| {
            FailureDetail::new(FailureReason::MissingOutput).with_note(e.to_string())
        })?;
        words.push(self.built.artifact.to_string_lossy().into_owned());
        let Some(spec) = CommandSpec::from_words(&words) else {
            return Err(FailureDetail::new(FailureReason::MissingOutput));
        };
        let spec = spec
            .arg(&input)
            .arg(output)
            .timeout(Some(self.config.case_timeout()));

        let out = self.runner.run(&spec).await.map_err(|e| {
            FailureDetail::new(FailureReason::MissingOutput).with_note(e.to_string())
        })?;
        if out.timed_out {
            return Err(FailureDetail::new(FailureReason::ExecutionTimeout));
        }
        // The exit code is not part of the contract; only the output file is.
        tracing::debug!(
            input = %input.display(),
            code = ?out.exit_code,
            stderr = %out.stderr_lossy().trim(),
            "compiler finished"
        );
        Ok(())
    }

    async fn simulate(&self, program: &Path) -> Result<Vec<u8>, FailureDetail> {
        let mut words = split_command(&self.config.simulator).map_err(|e| {
            FailureDetail::new(FailureReason::SimulatorRuntimeError).with_note(e.to_string())
        })?;
        words.push(self.config.simulator_file_flag.clone());
        let Some(spec) = CommandSpec::from_words(&words) else {
            return Err(FailureDetail::new(FailureReason::SimulatorRuntimeError));
        };
        let spec = spec
            .arg(program)
            .timeout(Some(self.config.case_timeout()));

        let out = self.runner.run(&spec).await.map_err(|e| {
            FailureDetail::new(FailureReason::SimulatorRuntimeError).with_note(e.to_string())
        })?;
        if out.timed_out {
            return Err(FailureDetail::new(FailureReason::SimulatorTimeout));
        }
        if !out.success() {
            let detail = FailureDetail::new(FailureReason::SimulatorRuntimeError);
            return Err(detail.with_note(out.stderr_lossy()));
        }
        Ok(out.stdout)
    }
}

/// Test identifier: the input file name without its extension.
pub fn stem_of(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// 1-based number of the first line that differs, or None when equal.
pub fn first_diff_line(actual: &[u8], expected: &[u8]) -> Option<usize> {
    if actual == expected {
        return None;
    }
    let mut a = actual.split(|&b| b == b'\n');
    let mut e = expected.split(|&b| b == b'\n');
    let mut line = 1;
    loop {
        match (a.next(), e.next()) {
            (Some(x), Some(y)) if x == y => line += 1,
            _ => return Some(line),
        }
    }
}
