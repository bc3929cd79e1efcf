//! TikTok publish client.
//!
//! Short-form video flow: register the upload intent (`init`), transfer
//! the media bytes to the upload target, then poll the publish status
//! until a terminal state or the poll budget runs out. States:
//! Initiated → Uploading → Processing → Published | Failed.
//!
//! Dropping the publish future between polls stops local waiting only —
//! the remote job keeps processing and is never cancelled from here.

use super::{response_error, transport_error};
use crate::publisher::PlatformPublisher;
use crate::types::{
    PollSettings, Privacy, PublishError, PublishOutcome, PublishRequest, PublishStatus,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const BASE_URL: &str = "https://open.tiktokapis.com/v2/post/publish";

/// Upload job states reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ShortVideoState {
    Processing,
    Published,
    Failed,
}

impl ShortVideoState {
    fn parse(raw: &str) -> Option<ShortVideoState> {
        match raw {
            "PROCESSING_UPLOAD" | "PROCESSING_DOWNLOAD" | "SEND_TO_USER_INBOX" => {
                Some(ShortVideoState::Processing)
            }
            "PUBLISH_COMPLETE" => Some(ShortVideoState::Published),
            "FAILED" => Some(ShortVideoState::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    data: InitData,
}

#[derive(Debug, Deserialize)]
struct InitData {
    publish_id: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    data: StatusData,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    status: String,
    #[serde(default)]
    post_id: Option<String>,
    #[serde(default)]
    share_url: Option<String>,
    #[serde(default)]
    fail_reason: Option<String>,
}

/// HTTP client for the TikTok content-posting API.
pub struct TikTokPublisher {
    http_client: Client,
    base_url: String,
    poll: PollSettings,
}

impl TikTokPublisher {
    /// Create a client using the default TikTok API base URL.
    pub fn new(poll: PollSettings) -> Self {
        Self::with_base_url(BASE_URL.to_string(), poll)
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(base_url: String, poll: PollSettings) -> Self {
        let http_client = Client::builder()
            .user_agent("crosspost-publisher/1.0")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http_client,
            base_url,
            poll,
        }
    }

    fn privacy_level(privacy: Privacy) -> &'static str {
        match privacy {
            Privacy::Public => "PUBLIC_TO_EVERYONE",
            Privacy::Unlisted => "MUTUAL_FOLLOW_FRIENDS",
            Privacy::Private => "SELF_ONLY",
        }
    }

    /// Register the upload intent; returns the publish job id and upload target.
    async fn init(
        &self,
        access_token: &str,
        request: &PublishRequest,
    ) -> Result<InitData, PublishError> {
        let url = format!("{}/video/init/", self.base_url);
        let body = json!({
            "post_info": {
                "title": request.display_text(),
                "privacy_level": Self::privacy_level(request.options.privacy),
                "disable_comment": !request.options.allow_comments,
                "disable_duet": !request.options.allow_duet,
                "disable_stitch": !request.options.allow_stitch,
            },
            "source_info": {
                "source": "FILE_UPLOAD",
            },
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Failed to send init request", e))?;

        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        let init: InitResponse = response
            .json()
            .await
            .map_err(|e| transport_error("Failed to parse init response", e))?;

        Ok(init.data)
    }

    /// Transfer the media bytes to the platform's upload target.
    async fn upload(&self, upload_url: &str, media_url: &str) -> Result<(), PublishError> {
        let media = self
            .http_client
            .get(media_url)
            .send()
            .await
            .map_err(|e| transport_error("Failed to fetch media", e))?;

        if !media.status().is_success() {
            return Err(PublishError::Upstream(format!(
                "Media fetch failed with status {}",
                media.status()
            )));
        }

        let bytes = media
            .bytes()
            .await
            .map_err(|e| transport_error("Failed to read media bytes", e))?;

        debug!(bytes = bytes.len(), "Uploading media");

        let response = self
            .http_client
            .put(upload_url)
            .header("Content-Type", "video/mp4")
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport_error("Failed to upload media", e))?;

        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        Ok(())
    }

    /// Fetch the current state of a publish job.
    async fn fetch_status(
        &self,
        access_token: &str,
        publish_id: &str,
    ) -> Result<StatusData, PublishError> {
        let url = format!("{}/status/fetch/", self.base_url);
        let body = json!({ "publish_id": publish_id });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Failed to send status request", e))?;

        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        let status: StatusResponse = response
            .json()
            .await
            .map_err(|e| transport_error("Failed to parse status response", e))?;

        Ok(status.data)
    }
}

#[async_trait]
impl PlatformPublisher for TikTokPublisher {
    fn name(&self) -> &str {
        "tiktok"
    }

    async fn publish(
        &self,
        access_token: &str,
        request: &PublishRequest,
    ) -> Result<PublishOutcome, PublishError> {
        let init = self.init(access_token, request).await?;
        debug!(publish_id = %init.publish_id, "Upload intent registered");

        self.upload(&init.upload_url, &request.media_url).await?;
        debug!(publish_id = %init.publish_id, "Media uploaded, polling status");

        // Bounded poll: between attempts there are no locks and no writes,
        // so cancelling the caller's future stops waiting cleanly.
        for attempt in 1..=self.poll.attempts {
            let status = self.fetch_status(access_token, &init.publish_id).await?;

            match ShortVideoState::parse(&status.status) {
                Some(ShortVideoState::Published) => {
                    let post_id = status
                        .post_id
                        .unwrap_or_else(|| init.publish_id.clone());
                    return Ok(PublishOutcome {
                        platform_post_id: post_id,
                        permalink: status.share_url,
                        status: PublishStatus::Published,
                    });
                }
                Some(ShortVideoState::Failed) => {
                    let reason = status
                        .fail_reason
                        .unwrap_or_else(|| "unspecified failure".to_string());
                    return Err(PublishError::ProviderRejected(format!(
                        "Publish job failed: {}",
                        reason
                    )));
                }
                Some(ShortVideoState::Processing) => {
                    debug!(
                        publish_id = %init.publish_id,
                        attempt,
                        status = %status.status,
                        "Still processing"
                    );
                }
                None => {
                    warn!(
                        publish_id = %init.publish_id,
                        status = %status.status,
                        "Unknown publish status, treating as processing"
                    );
                }
            }

            if attempt < self.poll.attempts {
                tokio::time::sleep(self.poll.interval).await;
            }
        }

        Err(PublishError::Timeout {
            attempts: self.poll.attempts,
        })
    }
}
