//! Publisher registry - dispatch table for publish flows.
//!
//! Direct connections dispatch by platform; aggregator-mediated ones all
//! route through the aggregator client, whatever their platform.

use crate::platforms::{
    AggregatorPublisher, InstagramPublisher, TikTokPublisher, YouTubePublisher,
};
use crate::publisher::PlatformPublisher;
use crate::types::PollSettings;
use crosspost::connection::{ConnectionOrigin, Platform};
use std::collections::HashMap;
use std::sync::Arc;

pub struct PublisherRegistry {
    publishers: HashMap<Platform, Arc<dyn PlatformPublisher>>,
    aggregator: Option<Arc<AggregatorPublisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self {
            publishers: HashMap::new(),
            aggregator: None,
        }
    }

    /// All direct platform publishers, plus the aggregator when its
    /// environment credentials are present.
    pub fn with_defaults(poll: PollSettings) -> Self {
        let mut registry = Self::new();
        registry.register(Platform::Youtube, Arc::new(YouTubePublisher::new()));
        registry.register(Platform::Instagram, Arc::new(InstagramPublisher::new()));
        registry.register(Platform::Tiktok, Arc::new(TikTokPublisher::new(poll)));

        if let Some(aggregator) = AggregatorPublisher::from_env() {
            registry.set_aggregator(Arc::new(aggregator));
        }

        registry
    }

    pub fn register(&mut self, platform: Platform, publisher: Arc<dyn PlatformPublisher>) {
        self.publishers.insert(platform, publisher);
    }

    pub fn set_aggregator(&mut self, aggregator: Arc<AggregatorPublisher>) {
        self.aggregator = Some(aggregator);
    }

    /// Select the publish flow for a stored connection.
    pub fn select(
        &self,
        platform: Platform,
        origin: ConnectionOrigin,
    ) -> Option<Arc<dyn PlatformPublisher>> {
        match origin {
            ConnectionOrigin::Aggregator => self
                .aggregator
                .clone()
                .map(|a| a as Arc<dyn PlatformPublisher>),
            ConnectionOrigin::Direct => self.publishers.get(&platform).cloned(),
        }
    }
}

impl Default for PublisherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_platforms() {
        let registry = PublisherRegistry::with_defaults(PollSettings::default());

        for platform in Platform::ALL {
            let publisher = registry
                .select(platform, ConnectionOrigin::Direct)
                .expect("missing publisher");
            assert_eq!(publisher.name(), platform.as_str());
        }
    }

    #[test]
    fn test_aggregator_origin_routes_to_aggregator() {
        let mut registry = PublisherRegistry::new();
        registry.set_aggregator(Arc::new(AggregatorPublisher::new(
            "https://api.example.com/publish".to_string(),
            "key".to_string(),
        )));

        let publisher = registry
            .select(Platform::Youtube, ConnectionOrigin::Aggregator)
            .expect("missing aggregator");
        assert_eq!(publisher.name(), "aggregator");

        // Direct publishes are unaffected by aggregator registration
        assert!(registry
            .select(Platform::Youtube, ConnectionOrigin::Direct)
            .is_none());
    }
}
