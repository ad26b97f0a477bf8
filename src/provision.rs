//! Repository snapshot provisioning and cleanup.
//!
//! One provisioning call owns two filesystem entities under the repo-data
//! directory: the downloaded snapshot archive (`<dir_name>.zip`) and the
//! extracted working tree (`<dir_name>/`). [`cleanup`] removes both and is
//! safe to call any number of times, including for pairs that were never
//! provisioned.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::error::ProvisionError;
use crate::paths::{repo_archive_name, repo_dir_name};

impl SourceConfig {
    /// Remote URL of the snapshot archive for a (repository, revision) pair.
    pub fn archive_url(&self, repo_name: &str, revision: &str) -> String {
        match self {
            SourceConfig::GithubArchive { base_url } => format!(
                "{}/{}/archive/{}.zip",
                base_url.trim_end_matches('/'),
                repo_name,
                revision
            ),
            SourceConfig::ObjectStore { base_url } => format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                repo_archive_name(repo_name, revision)
            ),
        }
    }
}

/// Result of a provisioning attempt.
///
/// `FetchFailed` is an ordinary, recorded outcome — the snapshot simply could
/// not be downloaded. Everything else that can go wrong is a
/// [`ProvisionError`].
#[derive(Debug)]
pub enum Provisioned {
    /// Snapshot extracted; `project_dir` is the single top-level entry of
    /// the working tree.
    Ready { project_dir: PathBuf },
    /// The remote returned a non-success status or was unreachable.
    FetchFailed,
}

/// Downloads and extracts a repository snapshot at a pinned revision.
///
/// On success the working tree lives at `<repo_data_dir>/<dir_name>/` and
/// the returned `project_dir` points at its single top-level entry (the
/// repository root as packaged by the archive convention). A violation of
/// that single-entry convention is a contract error, not a fetch failure.
pub async fn provision(
    client: &reqwest::Client,
    source: &SourceConfig,
    repo_name: &str,
    revision: &str,
    repo_data_dir: &Path,
) -> Result<Provisioned, ProvisionError> {
    let url = source.archive_url(repo_name, revision);
    let archive_path = repo_data_dir.join(repo_archive_name(repo_name, revision));

    let request = client.get(&url).header("User-Agent", "scan-forge/0.1");
    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(repo = %repo_name, revision = %revision, error = %err, "Snapshot fetch failed");
            return Ok(Provisioned::FetchFailed);
        }
    };

    if !response.status().is_success() {
        warn!(
            repo = %repo_name,
            revision = %revision,
            status = %response.status(),
            "Snapshot fetch returned non-success status"
        );
        return Ok(Provisioned::FetchFailed);
    }

    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(repo = %repo_name, revision = %revision, error = %err, "Snapshot body read failed");
            return Ok(Provisioned::FetchFailed);
        }
    };

    std::fs::write(&archive_path, &bytes)?;
    debug!(
        repo = %repo_name,
        revision = %revision,
        bytes = bytes.len(),
        path = %archive_path.display(),
        "Snapshot downloaded"
    );

    let extract_dir = repo_data_dir.join(repo_dir_name(repo_name, revision));
    extract_snapshot(&archive_path, &extract_dir)?;

    let project_name = single_root_entry(&extract_dir)?;
    info!(
        repo = %repo_name,
        revision = %revision,
        project = %project_name,
        "Working tree ready"
    );

    Ok(Provisioned::Ready {
        project_dir: extract_dir.join(project_name),
    })
}

/// Extracts a zip snapshot into `extract_dir`, replacing any leftover tree
/// from an earlier interrupted run.
fn extract_snapshot(archive_path: &Path, extract_dir: &Path) -> Result<(), ProvisionError> {
    if extract_dir.exists() {
        std::fs::remove_dir_all(extract_dir)?;
    }
    std::fs::create_dir_all(extract_dir)?;

    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| ProvisionError::BadArchive {
        path: archive_path.to_path_buf(),
        source,
    })?;

    archive
        .extract(extract_dir)
        .map_err(|source| ProvisionError::BadArchive {
            path: archive_path.to_path_buf(),
            source,
        })
}

/// Returns the name of the extracted tree's single top-level entry.
///
/// The archive convention wraps repository contents in one root folder;
/// anything else means the packaging assumption is broken and the run must
/// stop with a diagnostic rather than scan the wrong tree.
fn single_root_entry(extract_dir: &Path) -> Result<String, ProvisionError> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(extract_dir)? {
        entries.push(entry?.file_name());
    }

    if entries.len() != 1 {
        return Err(ProvisionError::AmbiguousArchiveRoot {
            path: extract_dir.to_path_buf(),
            entries: entries.len(),
        });
    }

    Ok(entries.remove(0).to_string_lossy().into_owned())
}

/// Removes the snapshot archive and working tree for a (repository,
/// revision) pair. Best-effort and idempotent: absent files are not an
/// error, and removal failures are swallowed after a debug log.
pub fn cleanup(repo_name: &str, revision: &str, repo_data_dir: &Path) {
    let archive_path = repo_data_dir.join(repo_archive_name(repo_name, revision));
    if let Err(err) = std::fs::remove_file(&archive_path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %archive_path.display(), error = %err, "Failed to remove snapshot archive");
        }
    }

    let tree_path = repo_data_dir.join(repo_dir_name(repo_name, revision));
    if let Err(err) = std::fs::remove_dir_all(&tree_path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %tree_path.display(), error = %err, "Failed to remove working tree");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, contents) in entries {
            if name.ends_with('/') {
                writer.add_directory(name.trim_end_matches('/'), options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(contents.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_archive_url_github() {
        let source = SourceConfig::GithubArchive {
            base_url: "https://github.com".to_string(),
        };
        assert_eq!(
            source.archive_url("octocat/Hello-World", "abc123"),
            "https://github.com/octocat/Hello-World/archive/abc123.zip"
        );
    }

    #[test]
    fn test_archive_url_object_store_trims_slash() {
        let source = SourceConfig::ObjectStore {
            base_url: "https://mirror.internal/snapshots/".to_string(),
        };
        assert_eq!(
            source.archive_url("octocat/Hello-World", "abc123"),
            "https://mirror.internal/snapshots/octocat_Hello-World_abc123.zip"
        );
    }

    #[test]
    fn test_extract_and_single_root() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("snap.zip");
        write_fixture_zip(
            &archive,
            &[
                ("Hello-World-abc123/", ""),
                ("Hello-World-abc123/README.md", "# hello"),
                ("Hello-World-abc123/src/main.py", "print(1)"),
            ],
        );

        let extract_dir = tmp.path().join("tree");
        extract_snapshot(&archive, &extract_dir).unwrap();

        let root = single_root_entry(&extract_dir).unwrap();
        assert_eq!(root, "Hello-World-abc123");
        assert!(extract_dir.join(&root).join("README.md").is_file());
        assert!(extract_dir.join(&root).join("src/main.py").is_file());
    }

    #[test]
    fn test_multiple_roots_violate_contract() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("snap.zip");
        write_fixture_zip(&archive, &[("a.txt", "a"), ("b.txt", "b")]);

        let extract_dir = tmp.path().join("tree");
        let err = extract_snapshot(&archive, &extract_dir)
            .and_then(|()| single_root_entry(&extract_dir))
            .unwrap_err();

        match err {
            ProvisionError::AmbiguousArchiveRoot { entries, .. } => assert_eq!(entries, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extract_replaces_stale_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("snap.zip");
        write_fixture_zip(&archive, &[("root/", ""), ("root/file.txt", "x")]);

        let extract_dir = tmp.path().join("tree");
        std::fs::create_dir_all(extract_dir.join("stale-leftover")).unwrap();

        extract_snapshot(&archive, &extract_dir).unwrap();
        assert_eq!(single_root_entry(&extract_dir).unwrap(), "root");
    }

    #[test]
    fn test_corrupt_archive_is_bad_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("snap.zip");
        std::fs::write(&archive, b"definitely not a zip").unwrap();

        let err = extract_snapshot(&archive, &tmp.path().join("tree")).unwrap_err();
        assert!(matches!(err, ProvisionError::BadArchive { .. }));
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();

        // Never provisioned: must not fail, must leave no trace.
        cleanup("octocat/Hello-World", "abc123", tmp.path());

        // Provisioned state present: removed.
        let archive = tmp.path().join(repo_archive_name("octocat/Hello-World", "abc123"));
        std::fs::write(&archive, b"zipbytes").unwrap();
        let tree = tmp.path().join(repo_dir_name("octocat/Hello-World", "abc123"));
        std::fs::create_dir_all(tree.join("nested")).unwrap();

        cleanup("octocat/Hello-World", "abc123", tmp.path());
        assert!(!archive.exists());
        assert!(!tree.exists());

        // Second call after removal: still fine.
        cleanup("octocat/Hello-World", "abc123", tmp.path());
        assert!(!archive.exists());
        assert!(!tree.exists());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_fetch_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let client = reqwest::Client::new();
        let source = SourceConfig::ObjectStore {
            // Port 1 is never listening; connect fails immediately.
            base_url: "http://127.0.0.1:1".to_string(),
        };

        let result = provision(&client, &source, "octocat/Hello-World", "abc123", tmp.path())
            .await
            .unwrap();

        assert!(matches!(result, Provisioned::FetchFailed));
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }
}
