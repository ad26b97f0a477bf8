//! Batch configuration loaded once at startup.
//!
//! The whole pipeline reads from a single immutable [`Config`] constructed
//! from a YAML file plus CLI overrides; no component reads ambient global
//! state. Secrets (scanner token, HF token) are never part of the config
//! file — they are read from the process environment by the components that
//! need them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default environment variable holding the scanner access token.
pub const DEFAULT_TOKEN_ENV: &str = "SCANNER_TOKEN";

/// Scratch and output directories used by the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dirs {
    /// Downloaded snapshot archives and extracted working trees.
    #[serde(default = "default_repo_data_dir")]
    pub repo_data: PathBuf,
    /// Per-run results directories the container writes into.
    #[serde(default = "default_results_dir")]
    pub results: PathBuf,
    /// Compressed per-run result archives.
    #[serde(default = "default_archives_dir")]
    pub archives: PathBuf,
    /// Durable per-run outcome records.
    #[serde(default = "default_json_results_dir")]
    pub json_results: PathBuf,
}

fn default_repo_data_dir() -> PathBuf {
    PathBuf::from("./data/repos")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("./data/results")
}

fn default_archives_dir() -> PathBuf {
    PathBuf::from("./data/archives")
}

fn default_json_results_dir() -> PathBuf {
    PathBuf::from("./data/json")
}

impl Default for Dirs {
    fn default() -> Self {
        Self {
            repo_data: default_repo_data_dir(),
            results: default_results_dir(),
            archives: default_archives_dir(),
            json_results: default_json_results_dir(),
        }
    }
}

/// Where repository snapshots are fetched from.
///
/// The source kind is selected once at batch start; every worker uses the
/// same variant for the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceConfig {
    /// Forge-style codeload archives: `<base>/<owner>/<name>/archive/<rev>.zip`.
    GithubArchive {
        #[serde(default = "default_github_base")]
        base_url: String,
    },
    /// Pre-mirrored snapshots in an object store: `<base>/<dir_name>.zip`.
    ObjectStore { base_url: String },
}

fn default_github_base() -> String {
    "https://github.com".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::GithubArchive {
            base_url: default_github_base(),
        }
    }
}

/// Container execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Scanner image reference, e.g. "example/scanner:2024.1".
    pub image: String,
    /// Wall-clock bound on one container run, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable (host and container side) carrying the scanner
    /// access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_timeout_secs() -> u64 {
    1800
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

/// Sentinel exit codes for the non-exit outcome kinds.
///
/// Real container exit statuses are non-negative, so the defaults stay out
/// of their range. All five outcome kinds of a run serialize through these
/// plus the raw exit status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitCodes {
    #[serde(default = "default_download_failure")]
    pub download_failure: i64,
    #[serde(default = "default_timeout")]
    pub timeout: i64,
    #[serde(default = "default_create_container_failure")]
    pub create_container_failure: i64,
    #[serde(default = "default_unknown_failure")]
    pub unknown_failure: i64,
}

fn default_download_failure() -> i64 {
    -1
}

fn default_timeout() -> i64 {
    -2
}

fn default_create_container_failure() -> i64 {
    -3
}

fn default_unknown_failure() -> i64 {
    -4
}

impl Default for ExitCodes {
    fn default() -> Self {
        Self {
            download_failure: default_download_failure(),
            timeout: default_timeout(),
            create_container_failure: default_create_container_failure(),
            unknown_failure: default_unknown_failure(),
        }
    }
}

/// Remote dataset publishing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Enable uploading to a HuggingFace dataset repo.
    #[serde(default)]
    pub enabled: bool,
    /// Dataset repo id, e.g. "myorg/scan-results".
    #[serde(default)]
    pub repo_id: String,
    /// Create the dataset repo as private.
    #[serde(default)]
    pub private: bool,
    /// Upload each result archive right after its run finishes instead of
    /// one bulk commit at batch end.
    #[serde(default)]
    pub push_dynamically: bool,
    /// Keep local archive files after a successful upload.
    #[serde(default = "default_keep_local")]
    pub keep_local: bool,
}

fn default_keep_local() -> bool {
    true
}

/// Top-level batch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// JSONL input: one `{"repo_name": ..., "revision": ...}` per line.
    pub input_file: PathBuf,
    /// Aggregate JSONL output of all outcome records.
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
    #[serde(default)]
    pub dirs: Dirs,
    #[serde(default)]
    pub source: SourceConfig,
    pub docker: DockerConfig,
    /// Worker pool size: how many repository pipelines run concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub exit_codes: ExitCodes,
    #[serde(default)]
    pub publish: PublishConfig,
    /// Skip inputs that already have a per-run outcome record and fold the
    /// existing records into the aggregate.
    #[serde(default)]
    pub resume: bool,
}

fn default_output_file() -> PathBuf {
    PathBuf::from("./data/results.jsonl")
}

fn default_workers() -> usize {
    4
}

impl Config {
    /// Loads and validates a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.docker.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "docker.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.docker.image.is_empty() {
            return Err(ConfigError::Invalid(
                "docker.image must not be empty".to_string(),
            ));
        }
        if self.publish.enabled && self.publish.repo_id.is_empty() {
            return Err(ConfigError::Invalid(
                "publish.repo_id is required when publishing is enabled".to_string(),
            ));
        }
        if let SourceConfig::ObjectStore { base_url } = &self.source {
            if base_url.is_empty() {
                return Err(ConfigError::Invalid(
                    "source.base_url is required for the object-store source".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Creates every directory the batch writes into.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.dirs.repo_data)?;
        std::fs::create_dir_all(&self.dirs.results)?;
        std::fs::create_dir_all(&self.dirs.archives)?;
        std::fs::create_dir_all(&self.dirs.json_results)?;
        if let Some(parent) = self.output_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
