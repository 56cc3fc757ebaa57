use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::types::Frame;

/// Event name used for error frames pushed into a live stream.
pub const ERROR_EVENT_NAME: &str = "error";

/// Result type for hub operations
pub type Result<T> = std::result::Result<T, HubError>;

/// Machine-readable error codes surfaced to collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidTopic,
    TopicNotFound,
    NoSubscribers,
    EmissionRejected,
    SubscriptionRejected,
    InternalError,
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidTopic => "INVALID_TOPIC",
            Self::TopicNotFound => "TOPIC_NOT_FOUND",
            Self::NoSubscribers => "NO_SUBSCRIBERS",
            Self::EmissionRejected => "EMISSION_REJECTED",
            Self::SubscriptionRejected => "SUBSCRIPTION_REJECTED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised by the hub
#[derive(Error, Debug)]
pub enum HubError {
    /// The topic identifier is blank or fails the configured pattern
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },

    /// An emission targeted a topic that was never created
    #[error("Topic not found: {topic}")]
    TopicNotFound { topic: String },

    /// A multicast send found zero current subscribers
    #[error("No subscribers on topic '{topic}'")]
    NoSubscribers {
        topic: String,
        details: HashMap<String, Value>,
    },

    /// The channel rejected a non-blocking send
    #[error("Emission rejected on topic '{topic}': {reason}")]
    EmissionRejected {
        topic: String,
        reason: String,
        details: HashMap<String, Value>,
    },

    /// A connection attempt was refused before any side effects
    #[error("Subscription rejected on topic '{topic}': {reason}")]
    SubscriptionRejected { topic: String, reason: String },

    /// Unexpected failures, including in-stream consumer lag
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        topic: Option<String>,
        details: HashMap<String, Value>,
    },
}

impl HubError {
    /// Create a new invalid-topic error
    pub fn invalid_topic(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTopic {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// Create a new topic-not-found error
    pub fn topic_not_found(topic: impl Into<String>) -> Self {
        Self::TopicNotFound {
            topic: topic.into(),
        }
    }

    /// Create a new no-subscribers error
    pub fn no_subscribers(topic: impl Into<String>, details: HashMap<String, Value>) -> Self {
        Self::NoSubscribers {
            topic: topic.into(),
            details,
        }
    }

    /// Create a new emission-rejected error
    pub fn emission_rejected(
        topic: impl Into<String>,
        reason: impl Into<String>,
        details: HashMap<String, Value>,
    ) -> Self {
        Self::EmissionRejected {
            topic: topic.into(),
            reason: reason.into(),
            details,
        }
    }

    /// Create a new subscription-rejected error
    pub fn subscription_rejected(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubscriptionRejected {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            topic: None,
            details: HashMap::new(),
        }
    }

    /// Get the machine-readable error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTopic { .. } => ErrorCode::InvalidTopic,
            Self::TopicNotFound { .. } => ErrorCode::TopicNotFound,
            Self::NoSubscribers { .. } => ErrorCode::NoSubscribers,
            Self::EmissionRejected { .. } => ErrorCode::EmissionRejected,
            Self::SubscriptionRejected { .. } => ErrorCode::SubscriptionRejected,
            Self::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Get the topic the error relates to, if any
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::InvalidTopic { topic, .. }
            | Self::TopicNotFound { topic }
            | Self::NoSubscribers { topic, .. }
            | Self::EmissionRejected { topic, .. }
            | Self::SubscriptionRejected { topic, .. } => Some(topic),
            Self::Internal { topic, .. } => topic.as_deref(),
        }
    }

    /// Get the structured details attached to the error
    pub fn details(&self) -> HashMap<String, Value> {
        match self {
            Self::NoSubscribers { details, .. }
            | Self::EmissionRejected { details, .. }
            | Self::Internal { details, .. } => details.clone(),
            _ => HashMap::new(),
        }
    }

    /// Check if the error is a caller mistake rather than a transient condition.
    /// Caller mistakes are never worth retrying; rejections may be retried by
    /// the caller with backoff.
    pub fn is_caller_error(&self) -> bool {
        match self {
            Self::InvalidTopic { .. } => true,
            Self::TopicNotFound { .. } => true,
            Self::NoSubscribers { .. } => false,
            Self::EmissionRejected { .. } => false,
            Self::SubscriptionRejected { .. } => false,
            Self::Internal { .. } => false,
        }
    }
}

/// Structured failure description delivered downstream instead of
/// terminating a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Topic the failure relates to, if any
    pub topic: Option<String>,
    /// When the payload was built
    pub timestamp: DateTime<Utc>,
    /// Structured details
    pub details: HashMap<String, Value>,
}

impl ErrorPayload {
    /// Build a payload from a hub error
    pub fn from_error(error: &HubError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
            topic: error.topic().map(str::to_string),
            timestamp: Utc::now(),
            details: error.details(),
        }
    }

    /// Convert the payload into an `error` frame for in-stream delivery
    pub fn into_frame(self) -> Frame {
        let payload = serde_json::to_value(&self).unwrap_or(Value::Null);
        Frame::new(payload).event(ERROR_EVENT_NAME)
    }
}
