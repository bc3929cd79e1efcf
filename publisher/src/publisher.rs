use crate::types::{PublishError, PublishOutcome, PublishRequest};
use async_trait::async_trait;

/// Publish flow interface for one platform.
///
/// Implementations run however many dependent provider calls the platform
/// requires (container create → publish, init → upload → poll, a single
/// resumable upload) and collapse the result into one normalized
/// [`PublishOutcome`]. Publishers are stateless; credentials come from
/// the connection store per call.
///
/// # Error Handling
/// - 4xx from the platform → [`PublishError::ProviderRejected`], never
///   retried here
/// - Poll budget exhausted → [`PublishError::Timeout`]
/// - Multi-step flows that fail after creating server-side state report
///   what was created ([`PublishError::PartialFailure`])
///
/// Dropping the returned future cancels local waiting only; a job already
/// started on the platform keeps running remotely.
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    /// Unique identifier for this publisher.
    ///
    /// Must be lowercase alphanumeric (e.g., "youtube", "aggregator").
    /// Used for logging and registry diagnostics.
    fn name(&self) -> &str;

    /// Run the publish flow to a terminal state.
    ///
    /// # Arguments
    /// * `access_token` - Decrypted platform access token (the aggregator
    ///   profile key for aggregator-mediated connections)
    /// * `request` - What to publish
    async fn publish(
        &self,
        access_token: &str,
        request: &PublishRequest,
    ) -> Result<PublishOutcome, PublishError>;
}
