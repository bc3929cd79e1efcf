//! Crosspost Publisher - platform publish flows behind one dispatch point.
//!
//! Each platform needs a different number of dependent calls to get a
//! post live; this crate runs those flows and collapses them into one
//! request/result pair.
//!
//! # Architecture
//!
//! ```text
//!       POST /publish (service secret)
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       Publish API                        │
//! │  - load connection, reject unusable      │
//! │  - dispatch by platform + origin         │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       PlatformPublisher (per flow)       │
//! │  - youtube: one resumable upload         │
//! │  - instagram: container → publish        │
//! │  - tiktok: init → upload → poll          │
//! │  - aggregator: single mediated call      │
//! └─────────────────────────────────────────┘
//!          ↓
//!       PublishOutcome {post id, permalink, status}
//! ```
//!
//! # Core Types
//!
//! - [`PlatformPublisher`] - Trait every publish flow implements
//! - [`PublishRequest`] / [`PublishOutcome`] - Normalized input/result
//! - [`PublishError`] - Flow failures, including partial ones
//! - [`PublisherRegistry`] - Dispatch table by platform and origin
//!
//! Connections come from the shared `crosspost` store; this crate never
//! refreshes tokens itself; an expired token is the caller's signal to
//! hit the refresh endpoint first.

mod publisher;
mod types;
pub mod api;
pub mod platforms;
pub mod registry;

// Re-export public types
pub use publisher::PlatformPublisher;
pub use registry::PublisherRegistry;
pub use types::{
    PollSettings, Privacy, PublishError, PublishOptions, PublishOutcome, PublishRequest,
    PublishStatus,
};

// Re-export store types from the crosspost crate for convenience
pub use crosspost::connection::{Connection, ConnectionStore, Platform};
