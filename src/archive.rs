//! Packaging of per-run result directories into zip artifacts.
//!
//! The archiver never inspects what the scanner produced; it packages
//! whatever is present, including nothing at all. A run that timed out or
//! crashed still yields a valid (possibly empty) archive.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::CompressionMethod;

use crate::error::ArchiveError;

/// Compresses the contents of `source_dir` into a deflate zip at
/// `dest_path`. Directory entries are written too, so empty subdirectories
/// survive the round trip.
pub fn archive_dir(source_dir: &Path, dest_path: &Path) -> Result<(), ArchiveError> {
    let file = File::create(dest_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = 0usize;
    for entry in WalkDir::new(source_dir).min_depth(1) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|_| ArchiveError::EntryOutsideSource(entry.path().to_path_buf()))?;
        let name = relative.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            writer.add_directory(name, options)?;
        } else {
            writer.start_file(name, options)?;
            let mut source = File::open(entry.path())?;
            io::copy(&mut source, &mut writer)?;
        }
        entries += 1;
    }

    let mut file = writer.finish()?;
    file.flush()?;

    debug!(
        source = %source_dir.display(),
        dest = %dest_path.display(),
        entries,
        "Result directory archived"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_empty_dir_yields_valid_empty_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("results");
        std::fs::create_dir_all(&source).unwrap();
        let dest = tmp.path().join("out.zip");

        archive_dir(&source, &dest).unwrap();

        let archive = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn test_nested_contents_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("results");
        std::fs::create_dir_all(source.join("report/details")).unwrap();
        std::fs::write(source.join("report/summary.json"), br#"{"issues": 3}"#).unwrap();
        std::fs::write(source.join("log.txt"), b"scanner finished").unwrap();
        std::fs::create_dir_all(source.join("empty-subdir")).unwrap();

        let dest = tmp.path().join("out.zip");
        archive_dir(&source, &dest).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let mut contents = String::new();
        archive
            .by_name("report/summary.json")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, r#"{"issues": 3}"#);

        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "log.txt"));
        assert!(names.iter().any(|n| n.trim_end_matches('/') == "empty-subdir"));
        assert!(names.iter().any(|n| n.trim_end_matches('/') == "report/details"));
    }
}
