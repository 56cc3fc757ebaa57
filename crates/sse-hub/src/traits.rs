//! Pluggable strategy contracts
//!
//! Each strategy is a narrow trait injected at hub construction; the hub
//! calls through the trait object without knowing concrete variants.

use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::channel::TopicChannel;
use crate::config::EmitterConfig;
use crate::session::{Session, TerminalSignal};

/// Produces session ids for connections that did not supply one
pub trait SessionIdGenerator: Send + Sync {
    /// Generate an id for a subscriber of the given topic
    fn generate(&self, topic: &str) -> String;
}

/// Fallback generator producing random unique ids
#[derive(Debug, Default)]
pub struct UuidSessionIdGenerator;

impl SessionIdGenerator for UuidSessionIdGenerator {
    fn generate(&self, _topic: &str) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Overrides per-topic channel creation. A `Some` return is used verbatim;
/// `None` falls back to the configured sink type.
pub trait ChannelCustomizer: Send + Sync {
    fn create_channel(&self, topic: &str, config: &EmitterConfig) -> Option<TopicChannel>;
}

/// Observes subscriber join/leave. Failures are logged by the hub and never
/// propagated, so one misbehaving hook cannot break the hub.
pub trait SessionHook: Send + Sync {
    fn on_join(&self, _session: &Session) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_leave(&self, _session: &Session, _signal: TerminalSignal) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Admission decision for new connections
pub trait ClientFilter: Send + Sync {
    fn allow(&self, topic: &str, session: &Session) -> bool;
}

/// Reconnect-delay advertisement consulted by the endpoint layer when
/// writing the leading `retry:` control line
pub trait ReconnectPolicy: Send + Sync {
    fn retry_delay(&self, topic: &str) -> Option<Duration>;
}

/// Read-only projections of the topic registry for monitoring.
/// All returns are point-in-time copies; staleness after return is expected.
pub trait TopicRegistry: Send + Sync {
    /// Snapshot of currently active topic ids
    fn topics(&self) -> Vec<String>;

    /// Snapshot of a topic's session map; empty if the topic is absent
    fn sessions(&self, topic: &str) -> HashMap<String, Session>;

    /// Current subscriber count for a topic (0 if absent)
    fn subscriber_count(&self, topic: &str) -> usize;

    /// Snapshot mapping of topic id to subscriber count
    fn topic_subscriber_counts(&self) -> HashMap<String, usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_ne;

    #[test]
    fn test_uuid_session_id_generator_uniqueness() {
        let fixture = UuidSessionIdGenerator;

        let first = fixture.generate("orders");
        let second = fixture.generate("orders");

        assert_ne!(first, second);
        assert!(!first.is_empty());
    }
}
