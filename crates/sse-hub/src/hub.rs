//! Broadcast hub facade
//!
//! Composes validator, channel factory, topic manager, stream composer,
//! session tracker and emission service behind a single
//! connect/emit/broadcast/shutdown API.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::channel::ChannelFactory;
use crate::config::HubConfig;
use crate::emitter::EmissionService;
use crate::error::{HubError, Result};
use crate::manager::TopicManager;
use crate::session::{Session, SessionTracker, TrackedStream};
use crate::stream::StreamComposer;
use crate::traits::{
    ChannelCustomizer, ClientFilter, ReconnectPolicy, SessionHook, SessionIdGenerator,
    TopicRegistry, UuidSessionIdGenerator,
};
use crate::validator::TopicValidator;

/// Server-side hub multiplexing named topics to many concurrently
/// connected subscribers, with out-of-band producers emitting into one
/// topic or broadcasting to all.
///
/// Topics are created lazily on first connect or left absent until then;
/// a topic persists across quiet periods and is only torn down when its
/// last subscriber leaves on cancellation or error, or at [`shutdown`].
///
/// `connect` must be called within a Tokio runtime.
///
/// [`shutdown`]: SseHub::shutdown
pub struct SseHub {
    config: HubConfig,
    validator: TopicValidator,
    manager: Arc<TopicManager>,
    composer: StreamComposer,
    tracker: SessionTracker,
    emission: EmissionService,
    id_generator: Arc<dyn SessionIdGenerator>,
    client_filter: Option<Arc<dyn ClientFilter>>,
    reconnect_policy: Option<Arc<dyn ReconnectPolicy>>,
}

impl SseHub {
    /// Create a hub with the given configuration and default strategies
    pub fn new(config: HubConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Start building a hub with injected strategies
    pub fn builder() -> SseHubBuilder {
        SseHubBuilder::new()
    }

    /// The active configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Connect to a topic, auto-generating a session id via the configured
    /// generator
    pub fn connect(&self, topic: &str) -> Result<TrackedStream> {
        self.validator.validate(topic)?;
        let session_id = self.id_generator.generate(topic);
        self.admit(topic, Session::new(session_id, topic))
    }

    /// Connect to a topic with caller-supplied session metadata
    pub fn connect_with_session(&self, topic: &str, session: Session) -> Result<TrackedStream> {
        self.validator.validate(topic)?;
        self.admit(topic, session)
    }

    fn admit(&self, topic: &str, session: Session) -> Result<TrackedStream> {
        if let Some(filter) = &self.client_filter {
            if !filter.allow(topic, &session) {
                return Err(HubError::subscription_rejected(
                    topic,
                    "Connection rejected by client filter",
                ));
            }
        }

        let channel = self.manager.get_or_create(topic);

        let max = self.config.topics.max_subscribers;
        if max > 0 && channel.subscriber_count() >= max {
            return Err(HubError::subscription_rejected(
                topic,
                format!("Max subscribers ({max}) exceeded"),
            ));
        }

        let subscription = channel.subscribe();
        let composed = self.composer.compose(topic, subscription);
        Ok(self.tracker.track(topic, composed, channel, session))
    }

    /// Emit a data-only frame to a topic
    pub fn emit(&self, topic: &str, payload: Value) -> Result<()> {
        self.validator.validate(topic)?;
        self.emission.emit(topic, None, payload, None)
    }

    /// Emit a frame with an event name to a topic
    pub fn emit_event(&self, topic: &str, event_name: &str, payload: Value) -> Result<()> {
        self.validator.validate(topic)?;
        self.emission.emit(topic, Some(event_name), payload, None)
    }

    /// Emit a frame with optional event name and resumption id to a topic
    pub fn emit_with_id(
        &self,
        topic: &str,
        event_name: Option<&str>,
        payload: Value,
        id: Option<&str>,
    ) -> Result<()> {
        self.validator.validate(topic)?;
        self.emission.emit(topic, event_name, payload, id)
    }

    /// Broadcast a data-only frame to all currently registered topics.
    /// Best-effort; never fails as a whole.
    pub fn broadcast(&self, payload: Value) {
        self.emission.broadcast(payload)
    }

    /// Snapshot of currently active topic ids
    pub fn current_topics(&self) -> Vec<String> {
        self.manager.topics()
    }

    /// Current subscriber count for a topic (0 if absent)
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.manager.subscriber_count(topic)
    }

    /// Snapshot copy of a topic's session map; empty if the topic is absent
    pub fn sessions(&self, topic: &str) -> HashMap<String, Session> {
        self.manager.sessions(topic)
    }

    /// Snapshot mapping of topic id to subscriber count
    pub fn topic_subscriber_counts(&self) -> HashMap<String, usize> {
        self.manager.topic_subscriber_counts()
    }

    /// Reconnect delay the endpoint layer should advertise via the
    /// `retry:` control line, if any
    pub fn retry_delay(&self, topic: &str) -> Option<Duration> {
        if let Some(policy) = &self.reconnect_policy {
            return policy.retry_delay(topic);
        }
        self.config
            .stream
            .retry_enabled
            .then_some(self.config.stream.retry)
    }

    /// Complete all topic channels and clear the registry. Invoked once
    /// during orderly process teardown; idempotent. Subsequent emissions
    /// fail with not-found; subsequent connects recreate topics on demand.
    pub fn shutdown(&self) {
        info!("Shutting down SSE hub");
        self.manager.shutdown_all();
    }
}

/// Builder wiring optional strategies into an [`SseHub`]
pub struct SseHubBuilder {
    config: HubConfig,
    channel_customizer: Option<Arc<dyn ChannelCustomizer>>,
    id_generator: Option<Arc<dyn SessionIdGenerator>>,
    session_hooks: Vec<Arc<dyn SessionHook>>,
    client_filter: Option<Arc<dyn ClientFilter>>,
    reconnect_policy: Option<Arc<dyn ReconnectPolicy>>,
}

impl SseHubBuilder {
    pub fn new() -> Self {
        Self {
            config: HubConfig::default(),
            channel_customizer: None,
            id_generator: None,
            session_hooks: Vec::new(),
            client_filter: None,
            reconnect_policy: None,
        }
    }

    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    pub fn channel_customizer(mut self, customizer: Arc<dyn ChannelCustomizer>) -> Self {
        self.channel_customizer = Some(customizer);
        self
    }

    pub fn session_id_generator(mut self, generator: Arc<dyn SessionIdGenerator>) -> Self {
        self.id_generator = Some(generator);
        self
    }

    /// Register a join/leave hook; may be called multiple times
    pub fn session_hook(mut self, hook: Arc<dyn SessionHook>) -> Self {
        self.session_hooks.push(hook);
        self
    }

    pub fn client_filter(mut self, filter: Arc<dyn ClientFilter>) -> Self {
        self.client_filter = Some(filter);
        self
    }

    pub fn reconnect_policy(mut self, policy: Arc<dyn ReconnectPolicy>) -> Self {
        self.reconnect_policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<SseHub> {
        let validator = TopicValidator::new(&self.config.topics)?;

        let mut factory = ChannelFactory::new(self.config.emitter.clone());
        if let Some(customizer) = self.channel_customizer {
            factory = factory.customizer(customizer);
        }

        let manager = Arc::new(TopicManager::new(factory));
        let composer = StreamComposer::new(self.config.stream.clone());
        let tracker = SessionTracker::new(self.session_hooks, manager.clone());
        let emission = EmissionService::new(manager.clone());

        Ok(SseHub {
            config: self.config,
            validator,
            manager,
            composer,
            tracker,
            emission,
            id_generator: self
                .id_generator
                .unwrap_or_else(|| Arc::new(UuidSessionIdGenerator)),
            client_filter: self.client_filter,
            reconnect_policy: self.reconnect_policy,
        })
    }
}

impl Default for SseHubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StreamConfig, TopicsConfig};
    use crate::error::ErrorCode;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn quiet_config() -> HubConfig {
        let mut stream = StreamConfig::default();
        stream.connected_event_enabled = false;
        stream.heartbeat_enabled = false;
        HubConfig::default().stream(stream)
    }

    #[tokio::test]
    async fn test_connect_then_emit_delivers_frame() {
        let fixture = SseHub::new(quiet_config()).unwrap();

        let mut stream = fixture.connect("orders").unwrap();
        fixture
            .emit_event("orders", "orderCreated", json!({"n": 1}))
            .unwrap();

        let actual = stream.next().await.unwrap().unwrap();
        assert_eq!(actual.payload, json!({"n": 1}));
        assert_eq!(actual.event.as_deref(), Some("orderCreated"));
    }

    #[tokio::test]
    async fn test_invalid_topic_fails_without_registry_mutation() {
        let fixture = SseHub::new(quiet_config()).unwrap();

        let connect_error = fixture.connect("with space").unwrap_err();
        assert_eq!(connect_error.code(), ErrorCode::InvalidTopic);

        let emit_error = fixture.emit("with space", json!("x")).unwrap_err();
        assert_eq!(emit_error.code(), ErrorCode::InvalidTopic);

        assert!(fixture.current_topics().is_empty());
    }

    #[tokio::test]
    async fn test_emit_without_prior_connect_fails_not_found() {
        let fixture = SseHub::new(quiet_config()).unwrap();

        let actual = fixture.emit("orders", json!("x")).unwrap_err();

        assert_eq!(actual.code(), ErrorCode::TopicNotFound);
    }

    #[tokio::test]
    async fn test_broadcast_with_no_topics_is_noop() {
        let fixture = SseHub::new(quiet_config()).unwrap();
        fixture.broadcast(json!("anyone?"));
        assert!(fixture.current_topics().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_connected_topics() {
        let fixture = SseHub::new(quiet_config()).unwrap();
        let mut orders = fixture.connect("orders").unwrap();
        let mut billing = fixture.connect("billing").unwrap();

        fixture.broadcast(json!("hello"));

        let from_orders = orders.next().await.unwrap().unwrap();
        assert_eq!(from_orders.payload, json!("hello"));
        let from_billing = billing.next().await.unwrap().unwrap();
        assert_eq!(from_billing.payload, json!("hello"));
    }

    #[tokio::test]
    async fn test_cancellation_removes_topic_normal_completion_keeps_it() {
        let fixture = SseHub::new(quiet_config()).unwrap();

        // Cancellation: drop the sole subscriber
        let cancelled = fixture.connect("orders").unwrap();
        drop(cancelled);
        assert!(!fixture.current_topics().contains(&"orders".to_string()));

        // Normal completion: the channel completes under the subscriber
        let mut stream = fixture.connect("billing").unwrap();
        fixture.manager.get("billing").unwrap().complete();
        assert!(stream.next().await.is_none());

        assert!(fixture.current_topics().contains(&"billing".to_string()));
        assert_eq!(fixture.subscriber_count("billing"), 0);
    }

    #[tokio::test]
    async fn test_max_subscribers_scenario() {
        let config = quiet_config().topics(
            TopicsConfig::default()
                .pattern("^[a-z]+$")
                .max_subscribers(1usize),
        );
        let fixture = SseHub::new(config).unwrap();

        // First connect succeeds
        let first = fixture.connect("orders").unwrap();
        assert_eq!(fixture.subscriber_count("orders"), 1);

        // Second connect is rejected without altering the count
        let rejected = fixture.connect("orders").unwrap_err();
        assert_eq!(rejected.code(), ErrorCode::SubscriptionRejected);
        assert_eq!(fixture.subscriber_count("orders"), 1);

        // Cancel the first subscription, then a third connect succeeds
        drop(first);
        let third = fixture.connect("orders").unwrap();
        assert_eq!(fixture.subscriber_count("orders"), 1);
        drop(third);
    }

    #[tokio::test]
    async fn test_connect_generates_session_id() {
        let fixture = SseHub::new(quiet_config()).unwrap();

        let stream = fixture.connect("orders").unwrap();

        let session = stream.session();
        assert!(!session.session_id.is_empty());
        assert_eq!(session.topic, "orders");
        let sessions = fixture.sessions("orders");
        assert!(sessions.contains_key(&session.session_id));
    }

    #[tokio::test]
    async fn test_connect_with_custom_session_id_generator() {
        struct FixedGenerator;
        impl SessionIdGenerator for FixedGenerator {
            fn generate(&self, topic: &str) -> String {
                format!("{topic}-001")
            }
        }

        let fixture = SseHub::builder()
            .config(quiet_config())
            .session_id_generator(Arc::new(FixedGenerator))
            .build()
            .unwrap();

        let stream = fixture.connect("orders").unwrap();

        assert_eq!(stream.session().session_id, "orders-001");
    }

    #[tokio::test]
    async fn test_connect_with_session_metadata() {
        let fixture = SseHub::new(quiet_config()).unwrap();
        let session = Session::new("s-1", "orders").remote_address("10.0.0.1");

        let _stream = fixture.connect_with_session("orders", session).unwrap();

        let sessions = fixture.sessions("orders");
        assert_eq!(
            sessions.get("s-1").unwrap().remote_address.as_deref(),
            Some("10.0.0.1")
        );
    }

    #[tokio::test]
    async fn test_client_filter_rejects_connection() {
        struct DenyAll;
        impl ClientFilter for DenyAll {
            fn allow(&self, _topic: &str, _session: &Session) -> bool {
                false
            }
        }

        let fixture = SseHub::builder()
            .config(quiet_config())
            .client_filter(Arc::new(DenyAll))
            .build()
            .unwrap();

        let actual = fixture.connect("orders").unwrap_err();

        assert_eq!(actual.code(), ErrorCode::SubscriptionRejected);
        assert!(fixture.current_topics().is_empty());
    }

    #[tokio::test]
    async fn test_retry_delay_from_config_and_policy() {
        let fixture = SseHub::new(quiet_config()).unwrap();
        assert_eq!(
            fixture.retry_delay("orders"),
            Some(Duration::from_secs(3))
        );

        let mut disabled_stream = StreamConfig::default();
        disabled_stream.retry_enabled = false;
        let disabled = SseHub::new(HubConfig::default().stream(disabled_stream)).unwrap();
        assert_eq!(disabled.retry_delay("orders"), None);

        struct SlowPolicy;
        impl ReconnectPolicy for SlowPolicy {
            fn retry_delay(&self, _topic: &str) -> Option<Duration> {
                Some(Duration::from_secs(30))
            }
        }
        let with_policy = SseHub::builder()
            .config(quiet_config())
            .reconnect_policy(Arc::new(SlowPolicy))
            .build()
            .unwrap();
        assert_eq!(
            with_policy.retry_delay("orders"),
            Some(Duration::from_secs(30))
        );
    }

    #[tokio::test]
    async fn test_shutdown_clears_topics_and_is_idempotent() {
        let fixture = SseHub::new(quiet_config()).unwrap();
        let mut stream = fixture.connect("orders").unwrap();

        fixture.shutdown();

        assert!(fixture.current_topics().is_empty());
        // The live subscriber's stream ends normally
        assert!(stream.next().await.is_none());
        // Emissions after shutdown are rejected
        let actual = fixture.emit("orders", json!("late")).unwrap_err();
        assert_eq!(actual.code(), ErrorCode::TopicNotFound);

        fixture.shutdown();
        assert!(fixture.current_topics().is_empty());

        // Connecting again recreates the topic on demand
        let _stream = fixture.connect("orders").unwrap();
        assert_eq!(fixture.current_topics(), vec!["orders".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_connects_share_one_channel() {
        let fixture = Arc::new(SseHub::new(quiet_config()).unwrap());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let hub = fixture.clone();
            handles.push(tokio::spawn(async move { hub.connect("orders").unwrap() }));
        }

        let mut streams = Vec::new();
        for handle in handles {
            streams.push(handle.await.unwrap());
        }

        assert_eq!(fixture.current_topics(), vec!["orders".to_string()]);
        assert_eq!(fixture.subscriber_count("orders"), 8);

        // One emission reaches every subscriber
        fixture.emit("orders", json!("fan-out")).unwrap();
        for stream in &mut streams {
            let actual = stream.next().await.unwrap().unwrap();
            assert_eq!(actual.payload, json!("fan-out"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_subscriber_sees_exactly_heartbeats() {
        let mut stream_config = StreamConfig::default();
        stream_config.connected_event_enabled = false;
        stream_config.heartbeat_interval = Duration::from_secs(1);
        let fixture = SseHub::new(HubConfig::default().stream(stream_config)).unwrap();

        let mut stream = fixture.connect("orders").unwrap();

        for _ in 0..3 {
            let actual = stream.next().await.unwrap().unwrap();
            assert_eq!(actual.event.as_deref(), Some("heartbeat"));
            assert_eq!(actual.payload, json!("::heartbeat::"));
        }
        // Heartbeats never affect bookkeeping
        assert_eq!(fixture.subscriber_count("orders"), 1);
        assert_eq!(fixture.sessions("orders").len(), 1);
    }

    #[tokio::test]
    async fn test_connected_frame_precedes_data() {
        let mut stream_config = StreamConfig::default();
        stream_config.heartbeat_enabled = false;
        let fixture = SseHub::new(HubConfig::default().stream(stream_config)).unwrap();

        let mut stream = fixture.connect("orders").unwrap();
        fixture.emit("orders", json!("payload")).unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.event.as_deref(), Some("connected"));
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.payload, json!("payload"));
    }

    #[tokio::test]
    async fn test_replay_sink_catches_up_late_joiner() {
        use crate::config::{EmitterConfig, SinkType};
        let config = quiet_config().emitter(
            EmitterConfig::default()
                .sink_type(SinkType::Replay)
                .replay_size(2usize),
        );
        let fixture = SseHub::new(config).unwrap();

        // Seed the topic with an early subscriber, then emit a burst
        let _early = fixture.connect("orders").unwrap();
        for n in 1..=3 {
            fixture.emit("orders", json!(n)).unwrap();
        }

        let mut late = fixture.connect("orders").unwrap();
        for expected in [json!(2), json!(3)] {
            let actual = late.next().await.unwrap().unwrap();
            assert_eq!(actual.payload, expected);
        }
    }

    #[tokio::test]
    async fn test_emit_overloads() {
        let fixture = SseHub::new(quiet_config()).unwrap();
        let mut stream = fixture.connect("orders").unwrap();

        fixture.emit("orders", json!(1)).unwrap();
        fixture.emit_event("orders", "created", json!(2)).unwrap();
        fixture
            .emit_with_id("orders", Some("updated"), json!(3), Some("id-3"))
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!((first.payload, first.event, first.id), (json!(1), None, None));

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.event.as_deref(), Some("created"));

        let third = stream.next().await.unwrap().unwrap();
        assert_eq!(third.event.as_deref(), Some("updated"));
        assert_eq!(third.id.as_deref(), Some("id-3"));
    }
}
