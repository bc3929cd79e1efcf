//! Platform publish clients.
//!
//! One module per flow shape: a single resumable upload (YouTube), a
//! container create/publish pair (Instagram), a short-form upload with
//! status polling (TikTok), and the single-call aggregator path.

mod aggregator;
mod instagram;
mod tiktok;
mod youtube;

pub use aggregator::AggregatorPublisher;
pub use instagram::InstagramPublisher;
pub use tiktok::TikTokPublisher;
pub use youtube::YouTubePublisher;

use crate::types::PublishError;

/// Map a non-success platform response to a publish error.
///
/// 4xx is a rejection the caller must see verbatim; anything else is an
/// upstream failure.
pub(crate) async fn response_error(response: reqwest::Response) -> PublishError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    if status.is_client_error() {
        PublishError::ProviderRejected(format!("{}: {}", status, body))
    } else {
        PublishError::Upstream(format!("{}: {}", status, body))
    }
}

pub(crate) fn transport_error(context: &str, error: reqwest::Error) -> PublishError {
    PublishError::Upstream(format!("{}: {}", context, error))
}
