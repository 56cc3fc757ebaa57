//! # sse-hub
//!
//! Server-Sent Events topic broadcast hub: one logical channel per named
//! topic, fan-out to all current subscribers, and out-of-band producers
//! that emit into a topic or broadcast to all topics.
//!
//! ## Key Components
//!
//! - **SseHub**: facade composing the whole hub behind
//!   connect/emit/broadcast/shutdown
//! - **TopicManager**: topic lifecycle and registry introspection
//! - **ChannelFactory/TopicChannel**: hot multi-consumer broadcast
//!   primitive (multicast or bounded replay)
//! - **StreamComposer**: heartbeat merging and initial "connected" framing
//! - **SessionTracker**: join/leave bookkeeping and terminal-signal
//!   dependent topic cleanup
//! - **EmissionService**: payload-to-frame conversion and the non-blocking
//!   send path with its failure taxonomy
//!
//! ## Usage
//!
//! ```rust
//! use serde_json::json;
//! use sse_hub::{HubConfig, SseHub};
//!
//! # async fn example() -> sse_hub::Result<()> {
//! let hub = SseHub::new(HubConfig::default())?;
//!
//! // Subscribers receive a stream of frames per topic
//! let stream = hub.connect("orders")?;
//!
//! // Producers push into a topic, or broadcast to all topics
//! hub.emit_event("orders", "orderCreated", json!({"id": 42}))?;
//! hub.broadcast(json!({"notice": "maintenance at noon"}));
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod emitter;
pub mod error;
pub mod hub;
pub mod manager;
pub mod session;
pub mod stream;
pub mod traits;
pub mod types;
pub mod validator;

// Re-export public API
pub use channel::{ChannelFactory, ChannelSubscription, SendRejection, TopicChannel};
pub use config::{EmitterConfig, HubConfig, SinkType, StreamConfig, TopicsConfig};
pub use emitter::EmissionService;
pub use error::{ErrorCode, ErrorPayload, HubError, Result, ERROR_EVENT_NAME};
pub use hub::{SseHub, SseHubBuilder};
pub use manager::TopicManager;
pub use session::{Session, SessionTracker, TerminalSignal, TrackedStream};
pub use stream::{ComposedStream, StreamComposer};
pub use traits::{
    ChannelCustomizer, ClientFilter, ReconnectPolicy, SessionHook, SessionIdGenerator,
    TopicRegistry, UuidSessionIdGenerator,
};
pub use types::Frame;
pub use validator::TopicValidator;
