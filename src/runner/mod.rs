pub mod system;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use system::SystemRunner;

/// One external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Wall-clock bound. `None` waits for the child indefinitely.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// Build from pre-split words (`program arg...`). Returns None for an empty list.
    pub fn from_words(words: &[String]) -> Option<Self> {
        let (program, args) = words.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            cwd: None,
            timeout: None,
        })
    }

    pub fn arg(mut self, arg: impl AsRef<Path>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        f.write_str(&shell_words::join(words))
    }
}

/// Captured result of a finished (or killed) child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the child was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs external commands with a bounded wait.
///
/// The build, the compiler-under-test and the simulator all go through this
/// one seam, so tests can substitute a scripted runner.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `spec` to completion or until its timeout fires.
    ///
    /// A timeout is reported through `ProcessOutput::timed_out`, not as an
    /// error. Errors mean the process could not be started at all.
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput>;
}

#[cfg(test)]
pub mod fake {
    use std::sync::Mutex;

    use super::*;

    type Script = Box<dyn Fn(&CommandSpec) -> ProcessOutput + Send + Sync>;

    /// Scripted runner: each call is answered by the first handler registered
    /// for its program, or exits with no status when none matches.
    /// Every invocation is recorded for later assertions.
    #[derive(Default)]
    pub struct FakeRunner {
        handlers: Vec<(String, Script)>,
        pub calls: Mutex<Vec<CommandSpec>>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer every command whose program is `program` with `f`.
        pub fn on(
            mut self,
            program: &str,
            f: impl Fn(&CommandSpec) -> ProcessOutput + Send + Sync + 'static,
        ) -> Self {
            self.handlers.push((program.to_string(), Box::new(f)));
            self
        }

        pub fn programs(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|c| c.program.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ProcessRunner for FakeRunner {
        async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            if let Some((_, f)) = self.handlers.iter().find(|(p, _)| *p == spec.program) {
                return Ok(f(spec));
            }
            Ok(ProcessOutput::default())
        }
    }

    pub fn exited(code: i32) -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(code),
            ..Default::default()
        }
    }

    pub fn printed(stdout: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(0),
            stdout: stdout.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    pub fn timed_out() -> ProcessOutput {
        ProcessOutput {
            timed_out: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_from_words_splits_program() {
        let words = vec!["java".to_string(), "-jar".to_string()];
        let spec = CommandSpec::from_words(&words)
            .unwrap()
            .arg("/tmp/COMPILER")
            .arg("in file.txt");
        assert_eq!(spec.program, "java");
        assert_eq!(spec.args, ["-jar", "/tmp/COMPILER", "in file.txt"]);
        assert_eq!(spec.to_string(), "java -jar /tmp/COMPILER 'in file.txt'");
        assert!(CommandSpec::from_words(&[]).is_none());
    }

    #[test]
    fn timed_out_output_is_not_success() {
        let out = ProcessOutput {
            exit_code: Some(0),
            timed_out: true,
            ..Default::default()
        };
        assert!(!out.success());
        assert!(fake::exited(0).success());
        assert!(!fake::exited(2).success());
    }
}
