use chrono::{DateTime, Utc};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One emitted unit on a topic stream: an opaque payload with optional
/// event name and resumption id. Frames are built per emission call and
/// never mutated afterwards; the hub never retries a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct Frame {
    /// Payload, opaque to the hub
    pub payload: Value,

    /// Optional SSE `event` name
    pub event: Option<String>,

    /// Optional SSE `id` used by clients for resumption
    pub id: Option<String>,

    /// When the frame was built
    #[setters(skip)]
    pub timestamp: DateTime<Utc>,
}

impl Frame {
    /// Create a data-only frame
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            event: None,
            id: None,
            timestamp: Utc::now(),
        }
    }
}
