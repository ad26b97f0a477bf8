//! Canonical filesystem names for per-repository scratch state.
//!
//! Every piece of on-disk state a run owns (snapshot archive, extracted
//! working tree, result archive, outcome record) is keyed by the same
//! canonical name, so concurrent workers never touch each other's paths.

/// Canonical directory name for a repository pinned at a revision.
///
/// Slashes in the `owner/name` identifier are flattened to underscores and
/// the revision is appended, e.g. `octocat/Hello-World` at `abc123` becomes
/// `octocat_Hello-World_abc123`.
pub fn repo_dir_name(repo_name: &str, revision: &str) -> String {
    format!("{}_{}", repo_name.replace('/', "_"), revision)
}

/// Canonical archive file name for a repository snapshot or result archive.
pub fn repo_archive_name(repo_name: &str, revision: &str) -> String {
    format!("{}.zip", repo_dir_name(repo_name, revision))
}

/// Canonical per-run outcome record file name.
pub fn outcome_record_name(repo_name: &str, revision: &str) -> String {
    format!("{}.json", repo_dir_name(repo_name, revision))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_dir_name_flattens_slashes() {
        assert_eq!(
            repo_dir_name("octocat/Hello-World", "abc123"),
            "octocat_Hello-World_abc123"
        );
    }

    #[test]
    fn test_repo_archive_name_appends_extension() {
        assert_eq!(
            repo_archive_name("octocat/Hello-World", "abc123"),
            "octocat_Hello-World_abc123.zip"
        );
        assert_eq!(
            outcome_record_name("octocat/Hello-World", "abc123"),
            "octocat_Hello-World_abc123.json"
        );
    }

    #[test]
    fn test_distinct_pairs_produce_distinct_names() {
        let pairs = [
            ("octocat/Hello-World", "abc123"),
            ("octocat/Hello-World", "def456"),
            ("octocat/hello-world", "abc123"),
            ("torvalds/linux", "abc123"),
            ("a/b-c", "1"),
            ("a/b", "c_1"),
        ];

        let names: std::collections::HashSet<String> = pairs
            .iter()
            .map(|(repo, rev)| repo_dir_name(repo, rev))
            .collect();

        assert_eq!(names.len(), pairs.len());
    }
}
