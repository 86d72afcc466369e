use std::fs::File;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SelfCheckError};
use crate::events::{Reporter, RunEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    const SUFFIXES: [(&'static str, ArchiveKind); 3] = [
        (".zip", ArchiveKind::Zip),
        (".tar.gz", ArchiveKind::TarGz),
        (".tgz", ArchiveKind::TarGz),
    ];

    /// Split a file name into its kind and base name (`123.tar.gz` -> `123`).
    fn split(file_name: &str) -> Option<(ArchiveKind, &str)> {
        Self::SUFFIXES.iter().find_map(|(suffix, kind)| {
            file_name.strip_suffix(suffix).map(|base| (*kind, base))
        })
    }
}

/// The submission bundle found in the root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub path: PathBuf,
    pub kind: ArchiveKind,
}

impl Archive {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Locate the single archive with a purely numeric base name directly inside `dir`.
pub fn find_archive(dir: &Path) -> Result<Archive> {
    let pattern = format!("{}/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let entries = glob::glob(&pattern)
        .map_err(|e| SelfCheckError::Config(format!("bad archive pattern: {}", e)))?;

    let mut found: Vec<Archive> = entries
        .flatten()
        .filter(|p| p.is_file())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let (kind, base) = ArchiveKind::split(name)?;
            let numeric = !base.is_empty() && base.bytes().all(|b| b.is_ascii_digit());
            numeric.then(|| Archive {
                path: path.clone(),
                kind,
            })
        })
        .collect();

    match found.len() {
        0 => Err(SelfCheckError::MissingArchive {
            dir: dir.to_path_buf(),
        }),
        1 => Ok(found.remove(0)),
        _ => Err(SelfCheckError::AmbiguousArchive {
            found: found.iter().map(Archive::name).collect(),
        }),
    }
}

/// Extract every entry of `archive` into `dest`, overwriting existing files.
/// Returns the number of files written.
pub fn extract(archive: &Archive, dest: &Path) -> Result<usize> {
    let name = archive.name();
    let fail = |message: String| SelfCheckError::Archive {
        name: name.clone(),
        message,
    };
    let file = File::open(&archive.path)
        .map_err(|e| SelfCheckError::io(format!("open {}", archive.path.display()), e))?;

    match archive.kind {
        ArchiveKind::Zip => {
            let mut z = zip::ZipArchive::new(file).map_err(|e| fail(e.to_string()))?;
            let mut written = 0;
            for i in 0..z.len() {
                let mut entry = z.by_index(i).map_err(|e| fail(e.to_string()))?;
                let rel = sanitize_rel_path(Path::new(entry.name())).map_err(fail)?;
                let out_path = dest.join(rel);
                if entry.is_dir() {
                    create_dir_all(&out_path)?;
                    continue;
                }
                if let Some(parent) = out_path.parent() {
                    create_dir_all(parent)?;
                }
                let mut out = File::create(&out_path)
                    .map_err(|e| SelfCheckError::io(format!("create {}", out_path.display()), e))?;
                std::io::copy(&mut entry, &mut out)
                    .map_err(|e| SelfCheckError::io(format!("write {}", out_path.display()), e))?;
                restore_mode(&out_path, entry.unix_mode());
                written += 1;
            }
            Ok(written)
        }
        ArchiveKind::TarGz => {
            let gz = flate2::read::GzDecoder::new(file);
            let mut ar = tar::Archive::new(gz);
            let mut written = 0;
            for entry in ar.entries().map_err(|e| fail(e.to_string()))? {
                let mut entry = entry.map_err(|e| fail(e.to_string()))?;
                let entry_path = entry.path().map_err(|e| fail(e.to_string()))?.into_owned();
                sanitize_rel_path(&entry_path).map_err(fail)?;
                let kind = entry.header().entry_type();
                if kind.is_symlink() || kind.is_hard_link() {
                    let message = format!("link entries are not allowed: {}", entry_path.display());
                    return Err(fail(message));
                }
                // `unpack_in` refuses to write through anything that resolves outside `dest`.
                let unpacked = entry.unpack_in(dest).map_err(|e| fail(e.to_string()))?;
                if !unpacked {
                    return Err(fail(format!("entry skipped: {}", entry_path.display())));
                }
                if kind.is_file() {
                    written += 1;
                }
            }
            Ok(written)
        }
    }
}

/// Find the submission archive in `dir` and unpack it in place.
pub fn intake(dir: &Path, reporter: &Reporter) -> Result<()> {
    let archive = find_archive(dir)?;
    let _ = reporter.send(RunEvent::ArchiveExtracting {
        name: archive.name(),
    });
    let files = extract(&archive, dir)?;
    tracing::debug!(archive = %archive.path.display(), files, "extracted");
    let _ = reporter.send(RunEvent::ArchiveExtracted { files });
    Ok(())
}

fn create_dir_all(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| SelfCheckError::io(format!("create {}", path.display()), e))
}

fn sanitize_rel_path(path: &Path) -> std::result::Result<PathBuf, String> {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::Prefix(_) | Component::RootDir => {
                return Err(format!("invalid entry path (absolute): {}", path.display()));
            }
            Component::ParentDir => {
                return Err(format!("invalid entry path (..): {}", path.display()));
            }
            Component::CurDir => {}
            Component::Normal(p) => out.push(p),
        }
    }
    Ok(out)
}

#[cfg(unix)]
fn restore_mode(path: &Path, mode: Option<u32>) {
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode
        && let Err(e) = std::fs::set_permissions(path, Permissions::from_mode(mode & 0o777))
    {
        tracing::warn!(path = %path.display(), error = %e, "could not restore file mode");
    }
}

#[cfg(not(unix))]
fn restore_mode(_path: &Path, _mode: Option<u32>) {}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tokio::sync::mpsc;

    use super::*;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zw = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, body) in files {
            zw.start_file(*name, options).unwrap();
            zw.write_all(body.as_bytes()).unwrap();
        }
        zw.finish().unwrap();
    }

    #[test]
    fn no_numeric_archive_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_zip(&dir.path().join("submission.zip"), &[("a", "b")]);
        std::fs::write(dir.path().join("123.txt"), "not an archive").unwrap();
        assert!(matches!(
            find_archive(dir.path()),
            Err(SelfCheckError::MissingArchive { .. })
        ));
    }

    #[test]
    fn two_numeric_archives_are_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        write_zip(&dir.path().join("111.zip"), &[("a", "b")]);
        write_zip(&dir.path().join("222.zip"), &[("a", "b")]);
        match find_archive(dir.path()) {
            Err(SelfCheckError::AmbiguousArchive { found }) => assert_eq!(found.len(), 2),
            other => panic!("expected AmbiguousArchive, got {:?}", other),
        }
    }

    #[test]
    fn recognises_tarballs_by_full_suffix() {
        assert_eq!(
            ArchiveKind::split("123.tar.gz"),
            Some((ArchiveKind::TarGz, "123"))
        );
        assert_eq!(ArchiveKind::split("123.tgz"), Some((ArchiveKind::TarGz, "123")));
        assert_eq!(ArchiveKind::split("123.gz"), None);
    }

    #[test]
    fn extracts_single_archive_in_place() {
        let dir = tempfile::tempdir().unwrap();
        write_zip(
            &dir.path().join("123456789.zip"),
            &[("ex5/Makefile", "all:\n"), ("ids.txt", "123456789\n")],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        intake(dir.path(), &tx).unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("ex5/Makefile")).unwrap(),
            "all:\n"
        );
        assert!(dir.path().join("ids.txt").is_file());
        // The archive itself is left on disk.
        assert!(dir.path().join("123456789.zip").is_file());
        assert!(matches!(
            rx.try_recv(),
            Ok(RunEvent::ArchiveExtracting { name }) if name == "123456789.zip"
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(RunEvent::ArchiveExtracted { files: 2 })
        ));
    }

    #[test]
    fn extraction_overwrites_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ids.txt"), "stale").unwrap();
        write_zip(&dir.path().join("42.zip"), &[("ids.txt", "fresh")]);
        let archive = find_archive(dir.path()).unwrap();
        extract(&archive, dir.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("ids.txt")).unwrap(),
            "fresh"
        );
    }

    fn write_tar_gz(path: &Path, files: &[(&str, &str)]) {
        let gz = flate2::write::GzEncoder::new(
            File::create(path).unwrap(),
            flate2::Compression::default(),
        );
        let mut tb = tar::Builder::new(gz);
        for (name, body) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            tb.append_data(&mut header, name, body.as_bytes()).unwrap();
        }
        tb.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn extracts_tarball_in_place() {
        let dir = tempfile::tempdir().unwrap();
        write_tar_gz(
            &dir.path().join("987654321.tgz"),
            &[
                ("ex5/Makefile", "all:\n"),
                ("ex5/src/Main.java", "class Main {}\n"),
                ("ids.txt", "987654321\n"),
            ],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        intake(dir.path(), &tx).unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("ex5/src/Main.java")).unwrap(),
            "class Main {}\n"
        );
        assert!(dir.path().join("ex5/Makefile").is_file());
        assert!(dir.path().join("ids.txt").is_file());
        assert!(matches!(
            rx.try_recv(),
            Ok(RunEvent::ArchiveExtracting { name }) if name == "987654321.tgz"
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(RunEvent::ArchiveExtracted { files: 3 })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn tarball_symlink_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("5.tar.gz");
        let gz = flate2::write::GzEncoder::new(
            File::create(&archive_path).unwrap(),
            flate2::Compression::default(),
        );
        let mut tb = tar::Builder::new(gz);
        let mut link = tar::Header::new_gnu();
        link.set_entry_type(tar::EntryType::Symlink);
        link.set_size(0);
        tb.append_link(&mut link, "link", outside.path()).unwrap();
        let body = b"escaped";
        let mut file = tar::Header::new_gnu();
        file.set_size(body.len() as u64);
        file.set_mode(0o644);
        tb.append_data(&mut file, "link/escaped.txt", &body[..]).unwrap();
        tb.into_inner().unwrap().finish().unwrap();

        let archive = find_archive(dir.path()).unwrap();
        assert!(matches!(
            extract(&archive, dir.path()),
            Err(SelfCheckError::Archive { .. })
        ));
        assert!(!outside.path().join("escaped.txt").exists());
    }

    #[test]
    fn zip_entry_leaving_root_fails_extraction() {
        let dir = tempfile::tempdir().unwrap();
        write_zip(&dir.path().join("7.zip"), &[("../evil.txt", "x")]);
        let archive = find_archive(dir.path()).unwrap();
        match extract(&archive, dir.path()) {
            Err(SelfCheckError::Archive { name, message }) => {
                assert_eq!(name, "7.zip");
                assert!(message.contains(".."), "{}", message);
            }
            other => panic!("expected Archive error, got {:?}", other),
        }
        assert!(!dir.path().parent().unwrap().join("evil.txt").exists());
    }

    #[test]
    fn parent_dir_entries_are_rejected() {
        assert!(sanitize_rel_path(Path::new("../evil")).is_err());
        assert!(sanitize_rel_path(Path::new("/etc/passwd")).is_err());
        assert_eq!(
            sanitize_rel_path(Path::new("./ex5/Makefile")).unwrap(),
            PathBuf::from("ex5/Makefile")
        );
    }
}
