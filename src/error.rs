use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors that abort a self-check run before (or instead of) a verdict.
#[derive(Debug, Error)]
pub enum SelfCheckError {
    #[error("invalid host machine: running on '{actual}', required '{required}'")]
    WrongHost { required: String, actual: String },

    #[error("no numeric archive found in {}", .dir.display())]
    MissingArchive { dir: PathBuf },

    #[error("more than one archive found ({}); ensure only one archive is present", .found.join(", "))]
    AmbiguousArchive { found: Vec<String> },

    #[error("required {kind} not found: {name}")]
    MissingRequiredPath { name: String, kind: PathKind },

    #[error("build command failed (exit code {})", exit_code_text(.code))]
    BuildFailed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("build command timed out after {secs}s")]
    BuildTimeout { secs: u64 },

    #[error("{count} test(s) failed")]
    SuiteFailed {
        count: usize,
        details: Vec<(String, String)>,
    },

    #[error("archive {name}: {message}")]
    Archive { name: String, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl SelfCheckError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn missing_file(name: impl Into<String>) -> Self {
        Self::MissingRequiredPath {
            name: name.into(),
            kind: PathKind::File,
        }
    }
}

fn exit_code_text(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

impl std::fmt::Display for PathKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathKind::File => f.write_str("file"),
            PathKind::Directory => f.write_str("directory"),
        }
    }
}

pub type Result<T> = std::result::Result<T, SelfCheckError>;
