use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use crate::error::{Result, SelfCheckError};

use super::{CommandSpec, ProcessOutput, ProcessRunner};

/// Guard that kills the child process (and its entire process group) on drop.
struct ChildGuard {
    child: Child,
    /// Process group ID saved at spawn time so we can kill the whole group.
    #[cfg(unix)]
    pgid: Option<u32>,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        #[cfg(unix)]
        let pgid = child.id();
        Self {
            child,
            #[cfg(unix)]
            pgid,
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        // A timed-out compiler may have forked helpers (e.g. a JVM); take them all out.
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
        }
        let _ = self.child.start_kill();
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(ref cwd) = spec.cwd {
            cmd.current_dir(cwd);
        }

        // Own process group so the guard can kill grandchildren as well.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.as_std_mut().process_group(0);
        }

        tracing::debug!(cmd = %spec, cwd = ?spec.cwd, timeout = ?spec.timeout, "spawning");

        let mut child = cmd
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SelfCheckError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut guard = ChildGuard::new(child);

        let collect = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let read_out = async {
                match stdout.as_mut() {
                    Some(s) => s.read_to_end(&mut out).await.map(|_| ()),
                    None => Ok(()),
                }
            };
            let read_err = async {
                match stderr.as_mut() {
                    Some(s) => s.read_to_end(&mut err).await.map(|_| ()),
                    None => Ok(()),
                }
            };
            let (r_out, r_err, status) = tokio::join!(read_out, read_err, guard.child.wait());
            let status = status?;
            r_out?;
            r_err?;
            Ok::<_, std::io::Error>((status, out, err))
        };

        let finished = match spec.timeout {
            Some(limit) => tokio::time::timeout(limit, collect).await.ok(),
            None => Some(collect.await),
        };

        match finished {
            None => {
                tracing::debug!(cmd = %spec, "timed out; killing process group");
                Ok(ProcessOutput {
                    timed_out: true,
                    ..Default::default()
                })
            }
            Some(Err(e)) => Err(SelfCheckError::io(format!("wait for '{}'", spec.program), e)),
            Some(Ok((status, stdout, stderr))) => {
                tracing::debug!(cmd = %spec, code = ?status.code(), "exited");
                Ok(ProcessOutput {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                    timed_out: false,
                })
            }
        }
    }
}
