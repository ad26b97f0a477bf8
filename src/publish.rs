//! HuggingFace Hub REST client for publishing batch artifacts.
//!
//! Uses the Hub commit API to create the dataset repo and push result
//! archives plus the aggregate outcome file. Publishing is strictly
//! optional and best-effort from the batch's point of view: upload faults
//! are logged by the orchestrator, never allowed to fail the batch.

use std::path::Path;

use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::error::PublishError;

const HF_API_BASE: &str = "https://huggingface.co/api";

/// Where and how to publish.
#[derive(Debug, Clone)]
pub struct HfPublishConfig {
    /// Dataset repo id, e.g. "myorg/scan-results".
    pub repo_id: String,
    /// API token, read from the environment by the caller.
    pub token: String,
    /// Create the repo as private.
    pub private: bool,
}

#[derive(Debug, Serialize)]
struct CommitAction {
    action: String,
    path: String,
    content: String,
    encoding: String,
}

#[derive(Debug, Serialize)]
struct CommitRequest {
    summary: String,
    actions: Vec<CommitAction>,
}

fn file_action(path_in_repo: &str, content: &[u8]) -> CommitAction {
    let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, content);
    CommitAction {
        action: "file".to_string(),
        path: path_in_repo.to_string(),
        content: encoded,
        encoding: "base64".to_string(),
    }
}

/// Client for one dataset repository.
#[derive(Debug)]
pub struct HfPublisher {
    client: Client,
    config: HfPublishConfig,
}

impl HfPublisher {
    pub fn new(config: HfPublishConfig) -> Result<Self, PublishError> {
        if config.token.is_empty() {
            return Err(PublishError::MissingToken);
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()?;
        Ok(Self { client, config })
    }

    /// Creates the dataset repo if it does not exist yet.
    pub async fn ensure_repo_exists(&self) -> Result<(), PublishError> {
        let url = format!("{HF_API_BASE}/repos/create");

        let (organization, name) = if let Some((org, n)) = self.config.repo_id.split_once('/') {
            (Some(org.to_string()), n.to_string())
        } else {
            (None, self.config.repo_id.clone())
        };

        let mut body = serde_json::json!({
            "type": "dataset",
            "name": name,
            "private": self.config.private,
        });
        if let Some(org) = organization {
            body["organization"] = serde_json::Value::String(org);
        }

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() || status.as_u16() == 409 {
            info!(repo = %self.config.repo_id, "Dataset repo ready");
            return Ok(());
        }

        let text = resp.text().await.unwrap_or_default();
        if text.contains("already created") || text.contains("already exist") {
            info!(repo = %self.config.repo_id, "Dataset repo already exists");
            Ok(())
        } else {
            Err(PublishError::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }

    /// Uploads one file via the commit API.
    pub async fn upload_file(
        &self,
        path_in_repo: &str,
        content: &[u8],
        commit_message: &str,
    ) -> Result<(), PublishError> {
        self.commit(CommitRequest {
            summary: commit_message.to_string(),
            actions: vec![file_action(path_in_repo, content)],
        })
        .await?;

        info!(path = path_in_repo, repo = %self.config.repo_id, "Uploaded file");
        Ok(())
    }

    /// Uploads a local file from disk.
    pub async fn upload_local_file(
        &self,
        local_path: &Path,
        path_in_repo: &str,
        commit_message: &str,
    ) -> Result<(), PublishError> {
        let content = std::fs::read(local_path)?;
        self.upload_file(path_in_repo, &content, commit_message).await
    }

    /// Uploads multiple files in a single commit.
    pub async fn upload_files(
        &self,
        files: &[(String, Vec<u8>)],
        commit_message: &str,
    ) -> Result<(), PublishError> {
        if files.is_empty() {
            return Ok(());
        }

        let actions = files
            .iter()
            .map(|(path, content)| file_action(path, content))
            .collect();

        self.commit(CommitRequest {
            summary: commit_message.to_string(),
            actions,
        })
        .await?;

        info!(
            files = files.len(),
            repo = %self.config.repo_id,
            "Bulk commit uploaded"
        );
        Ok(())
    }

    async fn commit(&self, body: CommitRequest) -> Result<(), PublishError> {
        let url = format!(
            "{HF_API_BASE}/datasets/{}/commit/main",
            self.config.repo_id
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.token)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PublishError::Api {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_rejected() {
        let err = HfPublisher::new(HfPublishConfig {
            repo_id: "org/data".to_string(),
            token: String::new(),
            private: false,
        })
        .unwrap_err();
        assert!(matches!(err, PublishError::MissingToken));
    }

    #[test]
    fn test_commit_action_shape() {
        let action = file_action("archives/a.zip", b"PK");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "file");
        assert_eq!(json["path"], "archives/a.zip");
        assert_eq!(json["encoding"], "base64");
        assert_eq!(json["content"], "UEs=");
    }
}
