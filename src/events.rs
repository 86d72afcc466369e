use std::fmt;
use std::io::{self, Write};

use tokio::sync::mpsc;

use crate::models::{CaseResult, SuiteSummary, TestStatus};
use crate::orchestrator::Stage;

/// Sending half handed to every stage.
pub type Reporter = mpsc::UnboundedSender<RunEvent>;

/// Progress streamed from the stages to the operator.
#[derive(Debug)]
pub enum RunEvent {
    RunStarted,
    ArchiveExtracting {
        name: String,
    },
    ArchiveExtracted {
        files: usize,
    },
    StructureCheckStarted,
    StructureOk,
    BuildStarted {
        command: String,
    },
    BuildSucceeded {
        command: String,
    },
    SuiteStarted {
        total: usize,
    },
    CaseStarted {
        id: String,
    },
    CaseFinished {
        result: CaseResult,
    },
    SuiteFinished {
        summary: SuiteSummary,
    },
    Finished {
        verdict: Verdict,
    },
}

/// Final word on the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    OkToSubmit,
    Failed {
        stage: Stage,
        message: String,
        /// (stdout, stderr) of a failed build, printed verbatim.
        build_output: Option<(String, String)>,
    },
}

/// Print events to stdout until every sender is gone.
pub async fn print_events(mut rx: mpsc::UnboundedReceiver<RunEvent>) {
    while let Some(event) = rx.recv().await {
        print_one(&event);
    }
}

fn print_one(event: &RunEvent) {
    let mut out = io::stdout().lock();
    if let Err(e) = render(event, &mut out).and_then(|_| out.flush()) {
        tracing::warn!(error = %e, "failed to write progress");
    }
}

/// Format one event as operator-facing text.
pub fn render(event: &RunEvent, out: &mut impl Write) -> io::Result<()> {
    match event {
        RunEvent::RunStarted => writeln!(out, "--- Starting Student Self-Check ---"),

        RunEvent::ArchiveExtracting { name } => writeln!(out, "Unzipping archive: {}", name),

        RunEvent::ArchiveExtracted { files } => {
            writeln!(out, "Unzip complete ({} files).", files)
        }

        RunEvent::StructureCheckStarted => {
            writeln!(out, "--- 1. Validating project structure ---")
        }

        RunEvent::StructureOk => writeln!(out, "Project structure OK."),

        RunEvent::BuildStarted { command } => writeln!(out, "--- 2. Running '{}' ---", command),

        RunEvent::BuildSucceeded { command } => writeln!(out, "--- '{}' successful ---", command),

        RunEvent::SuiteStarted { total } => {
            writeln!(out, "--- 3. Running all tests ({}) ---", total)
        }

        // No newline: the result is appended once the case finishes.
        RunEvent::CaseStarted { id } => write!(out, "Running {} ... ", id),

        RunEvent::CaseFinished { result } => {
            match (&result.status, &result.failure) {
                (TestStatus::Passed, _) | (_, None) => writeln!(out, "{}", result.status.label())?,
                (TestStatus::Failed, Some(detail)) => {
                    writeln!(out, "{} ({})", result.status.label(), detail.reason.short())?;
                    if let Some(note) = detail.note.as_deref().and_then(|n| n.lines().next()) {
                        writeln!(out, "    {}", note)?;
                    }
                }
            }
            Ok(())
        }

        RunEvent::SuiteFinished { summary } => {
            writeln!(out, "--- 4. Test summary ---")?;
            writeln!(out, "Total tests: {}", summary.total)?;
            writeln!(out, "Passed: {}", summary.passed)?;
            writeln!(out, "Failed: {}", summary.failed)?;
            if summary.all_passed() {
                writeln!(out, "All tests passed")
            } else {
                writeln!(out, "Failed test details:")?;
                for failed in &summary.failures {
                    let icon = TestStatus::Failed.icon();
                    writeln!(out, "  {} {}: {}", icon, failed.id, failed.message)?;
                }
                Ok(())
            }
        }

        RunEvent::Finished { verdict } => match verdict {
            Verdict::OkToSubmit => {
                writeln!(out, "--- Self-Check Finished ---")?;
                writeln!(out, "OK to submit :)")
            }
            Verdict::Failed {
                stage,
                message,
                build_output,
            } => {
                if let Some((stdout, stderr)) = build_output {
                    writeln!(out, "--- BUILD FAILED! ---")?;
                    writeln!(out, "--- STDOUT: ---")?;
                    writeln!(out, "{}", stdout)?;
                    writeln!(out, "--- STDERR: ---")?;
                    writeln!(out, "{}", stderr)?;
                    writeln!(out, "--------------------")?;
                }
                write_failed(out, stage, message)
            }
        },
    }
}

/// Report an error raised before the first stage, such as an unreadable config.
pub fn render_setup_failure(message: &str, out: &mut impl Write) -> io::Result<()> {
    write_failed(out, "setup", message)
}

fn write_failed(out: &mut impl Write, stage: impl fmt::Display, message: &str) -> io::Result<()> {
    writeln!(out, "--- SELF-CHECK FAILED ---")?;
    writeln!(out, "ERROR ({}): {}", stage, message)
}
