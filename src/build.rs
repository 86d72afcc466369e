use std::path::{Path, PathBuf};

use crate::config::{Config, Layout, split_command};
use crate::error::{PathKind, Result, SelfCheckError};
use crate::events::{Reporter, RunEvent};
use crate::runner::{CommandSpec, ProcessRunner};
use crate::structure::require;

/// What the test suite needs from a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Built {
    pub scratch_dir: PathBuf,
    pub artifact: PathBuf,
}

impl Built {
    /// Path the compiler-under-test writes for the test with this stem.
    pub fn actual_output(&self, stem: &str) -> PathBuf {
        self.scratch_dir.join(stem)
    }
}

/// Run the build in the project directory, check the artifact exists and
/// hand back a freshly emptied scratch directory.
pub async fn build(
    runner: &dyn ProcessRunner,
    config: &Config,
    layout: &Layout,
    reporter: &Reporter,
) -> Result<Built> {
    let words = split_command(&config.build_command)?;
    let spec = CommandSpec::from_words(&words)
        .ok_or_else(|| SelfCheckError::Config("build_command is empty".into()))?
        .cwd(&layout.project_dir)
        .timeout(config.build_timeout());

    let _ = reporter.send(RunEvent::BuildStarted {
        command: config.build_command.clone(),
    });

    let output = runner.run(&spec).await?;
    if output.timed_out {
        return Err(SelfCheckError::BuildTimeout {
            secs: config.build_timeout_secs.unwrap_or_default(),
        });
    }
    if !output.success() {
        return Err(SelfCheckError::BuildFailed {
            code: output.exit_code,
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy(),
        });
    }

    let _ = reporter.send(RunEvent::BuildSucceeded {
        command: config.build_command.clone(),
    });

    require(&layout.artifact, PathKind::File)?;
    reset_dir(&layout.scratch_dir)?;

    Ok(Built {
        scratch_dir: layout.scratch_dir.clone(),
        artifact: layout.artifact.clone(),
    })
}

/// Delete `dir` with everything in it and recreate it empty.
pub fn reset_dir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        // A plain file in the way.
        Err(_) if dir.is_file() => std::fs::remove_file(dir)
            .map_err(|e| SelfCheckError::io(format!("remove {}", dir.display()), e))?,
        Err(e) => return Err(SelfCheckError::io(format!("remove {}", dir.display()), e)),
    }
    std::fs::create_dir_all(dir)
        .map_err(|e| SelfCheckError::io(format!("create {}", dir.display()), e))
}
