use std::fmt;

use serde::Serialize;

use crate::build::{self, Built};
use crate::config::{Config, Layout};
use crate::error::{Result, SelfCheckError};
use crate::events::{Reporter, RunEvent, Verdict};
use crate::models::SuiteSummary;
use crate::runner::ProcessRunner;
use crate::{host, intake, structure, suite};

/// Stages of a run, in the only order they can happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    HostCheck,
    ArchiveIntake,
    StructureValidator,
    BuildRunner,
    TestSuiteRunner,
    Verdict,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::HostCheck => Some(Stage::ArchiveIntake),
            Stage::ArchiveIntake => Some(Stage::StructureValidator),
            Stage::StructureValidator => Some(Stage::BuildRunner),
            Stage::BuildRunner => Some(Stage::TestSuiteRunner),
            Stage::TestSuiteRunner => Some(Stage::Verdict),
            Stage::Verdict => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::HostCheck => "host check",
            Stage::ArchiveIntake => "archive",
            Stage::StructureValidator => "structure",
            Stage::BuildRunner => "build",
            Stage::TestSuiteRunner => "tests",
            Stage::Verdict => "verdict",
        })
    }
}

/// The stage a run stopped at and why.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: SelfCheckError,
}

/// Result of a full run.
#[derive(Debug)]
pub struct Outcome {
    /// Present once the test suite has run, pass or fail.
    pub summary: Option<SuiteSummary>,
    pub result: std::result::Result<(), StageFailure>,
}

impl Outcome {
    pub fn ok_to_submit(&self) -> bool {
        self.result.is_ok()
    }
}

/// Drives the stages one after another and stops at the first failure.
pub struct Orchestrator<'a> {
    runner: &'a dyn ProcessRunner,
    config: &'a Config,
    layout: &'a Layout,
    /// Identity of the machine we are on, `None` if it could not be read.
    host: Option<String>,
    reporter: Reporter,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        config: &'a Config,
        layout: &'a Layout,
        host: Option<String>,
        reporter: Reporter,
    ) -> Self {
        Self {
            runner,
            config,
            layout,
            host,
            reporter,
        }
    }

    /// Run every stage. Consumes the orchestrator so the reporter closes when it returns.
    pub async fn run(self) -> Outcome {
        let _ = self.reporter.send(RunEvent::RunStarted);

        let mut stage = Stage::HostCheck;
        let mut built: Option<Built> = None;
        let mut summary: Option<SuiteSummary> = None;

        loop {
            tracing::debug!(%stage, "entering stage");
            let step = match stage {
                Stage::HostCheck => host::check(&self.config.host_name, self.host.as_deref()),
                Stage::ArchiveIntake => intake::intake(&self.layout.root, &self.reporter),
                Stage::StructureValidator => self.validate_structure(),
                Stage::BuildRunner => {
                    build::build(self.runner, self.config, self.layout, &self.reporter)
                        .await
                        .map(|b| built = Some(b))
                }
                Stage::TestSuiteRunner => match built.as_ref() {
                    Some(b) => {
                        let ran = suite::run_cases(
                            self.runner,
                            self.config,
                            self.layout,
                            b,
                            &self.reporter,
                        )
                        .await;
                        ran.and_then(|s| {
                            let verdict = suite::verdict(&s);
                            summary = Some(s);
                            verdict
                        })
                    }
                    None => Err(SelfCheckError::missing_file(
                        self.config.artifact_name.clone(),
                    )),
                },
                Stage::Verdict => break,
            };

            if let Err(error) = step {
                tracing::debug!(%stage, %error, "stage failed");
                let _ = self.reporter.send(RunEvent::Finished {
                    verdict: failed_verdict(stage, &error),
                });
                return Outcome {
                    summary,
                    result: Err(StageFailure { stage, error }),
                };
            }

            match stage.next() {
                Some(next) => stage = next,
                None => break,
            }
        }

        let _ = self.reporter.send(RunEvent::Finished {
            verdict: Verdict::OkToSubmit,
        });
        Outcome {
            summary,
            result: Ok(()),
        }
    }

    fn validate_structure(&self) -> Result<()> {
        let _ = self.reporter.send(RunEvent::StructureCheckStarted);
        structure::validate(self.layout)?;
        let _ = self.reporter.send(RunEvent::StructureOk);
        Ok(())
    }
}

fn failed_verdict(stage: Stage, error: &SelfCheckError) -> Verdict {
    let build_output = match error {
        SelfCheckError::BuildFailed { stdout, stderr, .. } => {
            Some((stdout.clone(), stderr.clone()))
        }
        _ => None,
    };
    Verdict::Failed {
        stage,
        message: error.to_string(),
        build_output,
    }
}
