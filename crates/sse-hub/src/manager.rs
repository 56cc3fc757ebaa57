use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::channel::{ChannelFactory, TopicChannel};
use crate::session::Session;
use crate::traits::TopicRegistry;

/// Owns the registry of topic id to channel. Channels are created lazily
/// on first access and removed either by the session tracker (last
/// subscriber left on cancel/error) or at shutdown. Per-topic state keeps
/// its own synchronization, so operations on different topics never
/// contend on a shared lock.
pub struct TopicManager {
    topics: DashMap<String, Arc<TopicChannel>>,
    factory: ChannelFactory,
}

impl TopicManager {
    pub fn new(factory: ChannelFactory) -> Self {
        Self {
            topics: DashMap::new(),
            factory,
        }
    }

    /// Get the channel for a topic, creating it atomically if absent.
    /// Concurrent calls for the same unseen id produce exactly one channel.
    pub fn get_or_create(&self, topic: &str) -> Arc<TopicChannel> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| {
                info!("Creating topic: {}", topic);
                Arc::new(self.factory.create(topic))
            })
            .value()
            .clone()
    }

    /// Non-creating lookup
    pub fn get(&self, topic: &str) -> Option<Arc<TopicChannel>> {
        self.topics.get(topic).map(|entry| entry.value().clone())
    }

    /// Remove a topic from the registry without completing its channel.
    /// Completion is the caller's responsibility, avoiding double-completion
    /// races.
    pub fn remove(&self, topic: &str) {
        self.topics.remove(topic);
    }

    /// Number of registered topics
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Complete every channel best-effort and clear the registry. Idempotent.
    pub fn shutdown_all(&self) {
        let count = self.topics.len();
        if count > 0 {
            info!("Shutting down topics: completing {} channel(s)", count);
        } else {
            info!("Shutting down topics: no active channels");
        }
        for entry in self.topics.iter() {
            entry.value().complete();
        }
        self.topics.clear();
    }
}

impl TopicRegistry for TopicManager {
    fn topics(&self) -> Vec<String> {
        self.topics.iter().map(|entry| entry.key().clone()).collect()
    }

    fn sessions(&self, topic: &str) -> HashMap<String, Session> {
        self.get(topic)
            .map(|channel| channel.sessions())
            .unwrap_or_default()
    }

    fn subscriber_count(&self, topic: &str) -> usize {
        self.get(topic)
            .map(|channel| channel.subscriber_count())
            .unwrap_or(0)
    }

    fn topic_subscriber_counts(&self) -> HashMap<String, usize> {
        self.topics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().subscriber_count()))
            .collect()
    }
}
