use std::path::Path;

use crate::config::Layout;
use crate::error::{PathKind, Result, SelfCheckError};

/// Check that every input the run needs is present, before anything is built.
/// Stops at the first missing item.
pub fn validate(layout: &Layout) -> Result<()> {
    let required = [
        (&layout.build_descriptor, PathKind::File),
        (&layout.ids_file, PathKind::File),
        (&layout.tests_dir, PathKind::Directory),
        (&layout.expected_dir, PathKind::Directory),
    ];
    for (path, kind) in required {
        require(path, kind)?;
    }
    Ok(())
}

/// Fail with `MissingRequiredPath` unless `path` exists as `kind`.
pub fn require(path: &Path, kind: PathKind) -> Result<()> {
    let ok = match kind {
        PathKind::File => path.is_file(),
        PathKind::Directory => path.is_dir(),
    };
    if ok {
        return Ok(());
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Err(SelfCheckError::MissingRequiredPath { name, kind })
}
