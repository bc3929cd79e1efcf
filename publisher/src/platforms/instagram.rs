//! Instagram publish client.
//!
//! Graph-style container flow: create a media container from the media
//! reference, promote it to a live post, then fetch the permalink.
//! States: ContainerCreated → Published. A failure after the container
//! exists is reported as a partial failure carrying the container id, so
//! the caller can retry publish-only instead of re-uploading media.

use super::{response_error, transport_error};
use crate::publisher::PlatformPublisher;
use crate::types::{PublishError, PublishOutcome, PublishRequest, PublishStatus};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const BASE_URL: &str = "https://graph.instagram.com/v21.0";

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PermalinkResponse {
    #[serde(default)]
    permalink: Option<String>,
}

/// HTTP client for the Instagram Graph publishing API.
pub struct InstagramPublisher {
    http_client: Client,
    base_url: String,
}

impl InstagramPublisher {
    /// Create a client using the default Graph API base URL.
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

    /// Stage a media container for the post.
    async fn create_container(
        &self,
        access_token: &str,
        request: &PublishRequest,
    ) -> Result<String, PublishError> {
        let url = format!("{}/me/media", self.base_url);
        let body = json!({
            "media_type": "REELS",
            "video_url": request.media_url,
            "caption": request.display_text(),
            "access_token": access_token,
        });

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Failed to send container request", e))?;

        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        let container: IdResponse = response
            .json()
            .await
            .map_err(|e| transport_error("Failed to parse container response", e))?;

        Ok(container.id)
    }

    /// Promote a staged container to a live post.
    async fn publish_container(
        &self,
        access_token: &str,
        container_id: &str,
    ) -> Result<String, PublishError> {
        let url = format!("{}/me/media_publish", self.base_url);
        let body = json!({
            "creation_id": container_id,
            "access_token": access_token,
        });

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::PartialFailure {
                container_id: container_id.to_string(),
                message: format!("Failed to send publish request: {}", e),
            })?;

        if !response.status().is_success() {
            let error = response_error(response).await;
            return Err(PublishError::PartialFailure {
                container_id: container_id.to_string(),
                message: error.to_string(),
            });
        }

        let post: IdResponse =
            response
                .json()
                .await
                .map_err(|e| PublishError::PartialFailure {
                    container_id: container_id.to_string(),
                    message: format!("Failed to parse publish response: {}", e),
                })?;

        Ok(post.id)
    }

    /// Fetch the public URL of a published post. Best-effort; the post is
    /// already live when this runs.
    async fn fetch_permalink(&self, access_token: &str, post_id: &str) -> Option<String> {
        let url = format!("{}/{}", self.base_url, post_id);
        let query = [("fields", "permalink"), ("access_token", access_token)];

        let response = match self.http_client.get(&url).query(&query).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(post_id = %post_id, status = %response.status(), "Permalink fetch failed");
                return None;
            }
            Err(e) => {
                warn!(post_id = %post_id, error = %e, "Permalink fetch failed");
                return None;
            }
        };

        response
            .json::<PermalinkResponse>()
            .await
            .ok()
            .and_then(|p| p.permalink)
    }
}

impl Default for InstagramPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformPublisher for InstagramPublisher {
    fn name(&self) -> &str {
        "instagram"
    }

    async fn publish(
        &self,
        access_token: &str,
        request: &PublishRequest,
    ) -> Result<PublishOutcome, PublishError> {
        debug!(media_url = %request.media_url, "Creating media container");
        let container_id = self.create_container(access_token, request).await?;

        debug!(container = %container_id, "Publishing container");
        let post_id = self.publish_container(access_token, &container_id).await?;

        let permalink = self.fetch_permalink(access_token, &post_id).await;

        Ok(PublishOutcome {
            platform_post_id: post_id,
            permalink,
            status: PublishStatus::Published,
        })
    }
}
