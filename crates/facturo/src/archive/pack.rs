//! Output packaging — streams a directory of composed documents into a
//! single compressed archive.

use std::fs::File;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::error::ArchiveError;

/// Packs every file directly under `source_dir` into a fresh zip archive
/// at `dest`, flattened to the archive root, at maximum compression.
/// Returns the byte length of the finished archive.
pub fn pack(source_dir: &Path, dest: &Path) -> Result<u64, ArchiveError> {
    let file = File::create(dest).map_err(|e| ArchiveError::Pack {
        path: dest.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    let entries = std::fs::read_dir(source_dir).map_err(|e| ArchiveError::ReadDirectory {
        path: source_dir.to_path_buf(),
        source: e,
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.is_empty() {
            continue;
        }

        writer.start_file(name.as_str(), options).map_err(|e| ArchiveError::Pack {
            path: dest.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut input = File::open(&path).map_err(|e| ArchiveError::Pack {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        std::io::copy(&mut input, &mut writer).map_err(|e| ArchiveError::Pack {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    }

    let file = writer.finish().map_err(|e| ArchiveError::Pack {
        path: dest.to_path_buf(),
        reason: e.to_string(),
    })?;
    let size = file
        .metadata()
        .map(|m| m.len())
        .map_err(|e| ArchiveError::Pack {
            path: dest.to_path_buf(),
            reason: e.to_string(),
        })?;

    Ok(size)
}
