//! Archive extraction and entry lookup for uploaded batches.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::ArchiveError;

/// Unpacks `archive_path` into `dest`, preserving relative paths.
///
/// Entries whose names escape the destination (absolute paths or `..`
/// traversal) are skipped with a warning rather than written.
pub fn extract(archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive_path).map_err(|e| ArchiveError::Open {
        path: archive_path.to_path_buf(),
        source: e,
    })?;

    let mut archive = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Corrupt {
        path: archive_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| ArchiveError::Corrupt {
            path: archive_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "Skipping archive entry with unsafe path");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| ArchiveError::WriteEntry {
                path: out_path.clone(),
                source: e,
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::WriteEntry {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut out = File::create(&out_path).map_err(|e| ArchiveError::WriteEntry {
            path: out_path.clone(),
            source: e,
        })?;
        std::io::copy(&mut entry, &mut out).map_err(|e| ArchiveError::WriteEntry {
            path: out_path.clone(),
            source: e,
        })?;
    }

    Ok(())
}

/// Finds the file named by a manifest row under an extraction root.
///
/// Tries the exact path join first; on miss, walks subdirectories
/// depth-first comparing both the full given name and its base name.
/// When duplicate basenames exist across subdirectories, which match is
/// returned first is unspecified — callers must not rely on the order.
pub fn locate(root: &Path, name: &str) -> Option<PathBuf> {
    let direct = root.join(name);
    if direct.is_file() {
        return Some(direct);
    }

    let base = Path::new(name).file_name()?;
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name() == base || entry.path().ends_with(name) {
            return Some(entry.into_path());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_extract_flat_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("in.zip");
        build_zip(&archive, &[("a.pdf", b"%PDF-a"), ("b.pdf", b"%PDF-b")]);

        let dest = dir.path().join("out");
        extract(&archive, &dest).unwrap();

        assert_eq!(std::fs::read(dest.join("a.pdf")).unwrap(), b"%PDF-a");
        assert_eq!(std::fs::read(dest.join("b.pdf")).unwrap(), b"%PDF-b");
    }

    #[test]
    fn test_extract_preserves_subdirectories() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("in.zip");
        build_zip(&archive, &[("sub/dir/c.pdf", b"%PDF-c")]);

        let dest = dir.path().join("out");
        extract(&archive, &dest).unwrap();

        assert!(dest.join("sub/dir/c.pdf").is_file());
    }

    #[test]
    fn test_extract_skips_traversal_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        build_zip(&archive, &[("../escape.txt", b"evil"), ("ok.pdf", b"%PDF-")]);

        let dest = dir.path().join("out");
        extract(&archive, &dest).unwrap();

        assert!(dest.join("ok.pdf").is_file());
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_extract_corrupt_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bad.zip");
        std::fs::write(&archive, b"this is not a zip file").unwrap();

        let err = extract(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt { .. }));
    }

    #[test]
    fn test_extract_missing_archive() {
        let dir = TempDir::new().unwrap();
        let err = extract(Path::new("/nonexistent.zip"), dir.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::Open { .. }));
    }

    #[test]
    fn test_locate_exact_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("invoice.pdf"), b"x").unwrap();

        let found = locate(dir.path(), "invoice.pdf").unwrap();
        assert_eq!(found, dir.path().join("invoice.pdf"));
    }

    #[test]
    fn test_locate_in_subdirectory_by_basename() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("batch/april")).unwrap();
        std::fs::write(dir.path().join("batch/april/invoice.pdf"), b"x").unwrap();

        let found = locate(dir.path(), "invoice.pdf").unwrap();
        assert!(found.ends_with("batch/april/invoice.pdf"));
    }

    #[test]
    fn test_locate_with_relative_name() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nested/april")).unwrap();
        std::fs::write(dir.path().join("nested/april/invoice.pdf"), b"x").unwrap();

        let found = locate(dir.path(), "april/invoice.pdf").unwrap();
        assert!(found.ends_with("april/invoice.pdf"));
    }

    #[test]
    fn test_locate_not_found() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("other.pdf"), b"x").unwrap();

        assert!(locate(dir.path(), "missing.pdf").is_none());
    }
}
