use crosspost::connection::Platform;
use serde::{Deserialize, Serialize};

/// What to publish, and where.
///
/// Ephemeral value object, never persisted here; the video catalog owns
/// long-term storage of content metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Target platform.
    pub platform: Platform,

    /// Where the media bytes live (the platform pulls them, or the
    /// dispatcher fetches and re-uploads, depending on the flow).
    pub media_url: String,

    /// Title, where the platform has one.
    #[serde(default)]
    pub title: Option<String>,

    /// Caption or description.
    #[serde(default)]
    pub caption: Option<String>,

    /// Platform-specific options.
    #[serde(default)]
    pub options: PublishOptions,
}

impl PublishRequest {
    /// Best available text for platforms with a single text field.
    pub fn display_text(&self) -> &str {
        self.caption
            .as_deref()
            .or(self.title.as_deref())
            .unwrap_or("")
    }
}

/// Platform-specific publish options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishOptions {
    #[serde(default)]
    pub privacy: Privacy,
    /// Short-form video platforms only.
    #[serde(default = "default_true")]
    pub allow_comments: bool,
    #[serde(default)]
    pub allow_duet: bool,
    #[serde(default)]
    pub allow_stitch: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            privacy: Privacy::default(),
            allow_comments: true,
            allow_duet: false,
            allow_stitch: false,
        }
    }
}

/// Post visibility.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    #[default]
    Public,
    Unlisted,
    Private,
}

/// Normalized result of a publish flow, regardless of how many provider
/// calls it took.
#[derive(Clone, Debug, Serialize)]
pub struct PublishOutcome {
    /// Post identifier assigned by the platform.
    pub platform_post_id: String,

    /// Public URL of the post, when the platform reports one.
    pub permalink: Option<String>,

    pub status: PublishStatus,
}

/// Terminal status of a publish flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    /// Live on the platform.
    Published,
    /// Accepted by the platform, finalizing asynchronously.
    Processing,
}

/// Publish flow failures.
#[derive(Debug)]
pub enum PublishError {
    /// The platform rejected the request (4xx). Message passed through,
    /// never retried here.
    ProviderRejected(String),
    /// The poll budget ran out before the platform reached a terminal
    /// state. The caller must retry the whole publish.
    Timeout { attempts: u32 },
    /// Container created but the publish step failed. Carries the
    /// container id so the caller can retry publish-only instead of
    /// re-uploading media.
    PartialFailure {
        container_id: String,
        message: String,
    },
    /// Network failure or unexpected platform response.
    Upstream(String),
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::ProviderRejected(msg) => write!(f, "Platform rejected publish: {}", msg),
            PublishError::Timeout { attempts } => {
                write!(f, "Publish not terminal after {} status polls", attempts)
            }
            PublishError::PartialFailure {
                container_id,
                message,
            } => write!(
                f,
                "Publish step failed after container {} was created: {}",
                container_id, message
            ),
            PublishError::Upstream(msg) => write!(f, "Platform call failed: {}", msg),
        }
    }
}

impl std::error::Error for PublishError {}

/// Poll budget for platforms with asynchronous processing.
#[derive(Clone, Copy, Debug)]
pub struct PollSettings {
    /// Maximum status polls before giving up with `Timeout`.
    pub attempts: u32,
    /// Delay between polls.
    pub interval: std::time::Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: std::time::Duration::from_secs(3),
        }
    }
}
