//! YouTube publish client.
//!
//! Upload-centric flow: one resumable upload call with embedded metadata.
//! The result is immediately terminal: no container, no status polling.

use super::{response_error, transport_error};
use crate::publisher::PlatformPublisher;
use crate::types::{Privacy, PublishError, PublishOutcome, PublishRequest, PublishStatus};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const BASE_URL: &str = "https://www.googleapis.com/upload/youtube/v3";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
    #[serde(default)]
    status: Option<UploadStatus>,
}

#[derive(Debug, Deserialize)]
struct UploadStatus {
    #[serde(rename = "uploadStatus")]
    upload_status: Option<String>,
}

/// HTTP client for the YouTube upload API.
pub struct YouTubePublisher {
    http_client: Client,
    base_url: String,
}

impl YouTubePublisher {
    /// Create a client using the default YouTube API base URL.
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(base_url: String) -> Self {
        let http_client = Client::builder()
            .user_agent("crosspost-publisher/1.0")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http_client,
            base_url,
        }
    }

    fn privacy_status(privacy: Privacy) -> &'static str {
        match privacy {
            Privacy::Public => "public",
            Privacy::Unlisted => "unlisted",
            Privacy::Private => "private",
        }
    }
}

impl Default for YouTubePublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformPublisher for YouTubePublisher {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn publish(
        &self,
        access_token: &str,
        request: &PublishRequest,
    ) -> Result<PublishOutcome, PublishError> {
        let url = format!(
            "{}/videos?uploadType=resumable&part=snippet,status",
            self.base_url
        );

        let body = json!({
            "snippet": {
                "title": request.title.as_deref().unwrap_or("Untitled"),
                "description": request.caption.as_deref().unwrap_or(""),
            },
            "status": {
                "privacyStatus": Self::privacy_status(request.options.privacy),
            },
            "mediaUrl": request.media_url,
        });

        debug!(media_url = %request.media_url, "Starting YouTube upload");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Failed to send upload request", e))?;

        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| transport_error("Failed to parse upload response", e))?;

        let status = match upload
            .status
            .and_then(|s| s.upload_status)
            .as_deref()
        {
            Some("processed") | Some("uploaded") | None => PublishStatus::Published,
            Some(_) => PublishStatus::Processing,
        };

        Ok(PublishOutcome {
            permalink: Some(format!("https://youtu.be/{}", upload.id)),
            platform_post_id: upload.id,
            status,
        })
    }
}
