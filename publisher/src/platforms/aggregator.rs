//! Aggregator publish client.
//!
//! Aggregator-mediated connections publish through one call: the
//! aggregator holds the real platform credentials behind the creator's
//! profile key and runs the platform-specific flow itself.

use super::{response_error, transport_error};
use crate::publisher::PlatformPublisher;
use crate::types::{PublishError, PublishOutcome, PublishRequest, PublishStatus};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct AggregatorPublishResponse {
    id: String,
    #[serde(default)]
    post_url: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// HTTP client for the aggregator publish endpoint.
pub struct AggregatorPublisher {
    http_client: Client,
    publish_url: String,
    api_key: String,
}

impl AggregatorPublisher {
    pub fn new(publish_url: String, api_key: String) -> Self {
        let http_client = Client::builder()
            .user_agent("crosspost-publisher/1.0")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http_client,
            publish_url,
            api_key,
        }
    }

    /// Build from environment, `None` when the aggregator is not configured.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("CROSSPOST_AGGREGATOR_API_KEY").ok()?;
        let publish_url = std::env::var("CROSSPOST_AGGREGATOR_PUBLISH_URL").ok()?;
        Some(Self::new(publish_url, api_key))
    }
}

#[async_trait]
impl PlatformPublisher for AggregatorPublisher {
    fn name(&self) -> &str {
        "aggregator"
    }

    /// `access_token` is the creator's aggregator profile key here; that
    /// is what aggregator-mediated connection rows store.
    async fn publish(
        &self,
        access_token: &str,
        request: &PublishRequest,
    ) -> Result<PublishOutcome, PublishError> {
        let body = json!({
            "profile_key": access_token,
            "platform": request.platform,
            "media_url": request.media_url,
            "caption": request.display_text(),
            "options": request.options,
        });

        debug!(platform = %request.platform, "Publishing via aggregator");

        let response = self
            .http_client
            .post(&self.publish_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Failed to send aggregator publish request", e))?;

        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        let published: AggregatorPublishResponse = response
            .json()
            .await
            .map_err(|e| transport_error("Failed to parse aggregator response", e))?;

        let status = match published.status.as_deref() {
            Some("pending") | Some("processing") => PublishStatus::Processing,
            _ => PublishStatus::Published,
        };

        Ok(PublishOutcome {
            platform_post_id: published.id,
            permalink: published.post_url,
            status,
        })
    }
}
