//! Configuration for the hub

use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fan-out/backpressure strategy for per-topic channels.
/// This choice is per-deployment, not per-topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkType {
    /// Hot fan-out with best-effort delivery; a send with zero current
    /// subscribers fails instead of buffering
    Multicast,
    /// Bounded or unbounded buffer replayed to every new subscriber
    /// before live frames
    Replay,
}

impl Default for SinkType {
    fn default() -> Self {
        Self::Multicast
    }
}

/// Top-level hub configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters, Default)]
#[setters(strip_option, into)]
pub struct HubConfig {
    /// Stream composition settings
    pub stream: StreamConfig,

    /// Topic validation and limits
    pub topics: TopicsConfig,

    /// Channel/sink settings
    pub emitter: EmitterConfig,
}

/// Stream composition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct StreamConfig {
    /// Send an initial "connected" frame
    pub connected_event_enabled: bool,

    /// Event name of the connected frame
    pub connected_event_name: String,

    /// Payload of the connected frame
    pub connected_event_data: String,

    /// Advertise a reconnect delay to clients
    pub retry_enabled: bool,

    /// Advertised reconnect delay
    pub retry: Duration,

    /// Merge periodic heartbeat frames into each stream
    pub heartbeat_enabled: bool,

    /// Interval between heartbeat frames
    pub heartbeat_interval: Duration,

    /// Event name of heartbeat frames
    pub heartbeat_event_name: String,

    /// Payload of heartbeat frames
    pub heartbeat_data: String,

    /// Convert in-stream errors to error frames instead of terminating
    pub map_errors_to_frames: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connected_event_enabled: true,
            connected_event_name: "connected".to_string(),
            connected_event_data: "connected".to_string(),
            retry_enabled: true,
            retry: Duration::from_secs(3),
            heartbeat_enabled: true,
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_event_name: "heartbeat".to_string(),
            heartbeat_data: "::heartbeat::".to_string(),
            map_errors_to_frames: true,
        }
    }
}

/// Topic validation and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct TopicsConfig {
    /// Regex for valid topic identifiers
    pub pattern: String,

    /// Max subscribers per topic (0 means unlimited)
    pub max_subscribers: usize,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            pattern: "^[A-Za-z0-9._-]+$".to_string(),
            max_subscribers: 0,
        }
    }
}

/// Channel/sink settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct EmitterConfig {
    /// Sink type used for new topic channels
    pub sink_type: SinkType,

    /// Frames retained for late joiners when using the replay sink
    /// (0 means retain all)
    pub replay_size: usize,

    /// Capacity of the underlying broadcast channel
    pub buffer_size: usize,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            sink_type: SinkType::Multicast,
            replay_size: 0,
            buffer_size: 256,
        }
    }
}
