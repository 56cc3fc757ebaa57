use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::channel::SendRejection;
use crate::error::{HubError, Result};
use crate::manager::TopicManager;
use crate::traits::TopicRegistry;
use crate::types::Frame;

/// Builds frames from payloads and pushes them into topic channels,
/// mapping channel-send failures to structured errors.
pub struct EmissionService {
    manager: Arc<TopicManager>,
}

impl EmissionService {
    pub fn new(manager: Arc<TopicManager>) -> Self {
        Self { manager }
    }

    /// Emit a single frame to a topic. The lookup never creates the topic;
    /// an absent topic is a hard error. The send is non-blocking and is not
    /// retried by the hub.
    pub fn emit(
        &self,
        topic: &str,
        event_name: Option<&str>,
        payload: Value,
        id: Option<&str>,
    ) -> Result<()> {
        let Some(channel) = self.manager.get(topic) else {
            return Err(HubError::topic_not_found(topic));
        };

        let mut frame = Frame::new(payload);
        if let Some(event_name) = event_name {
            frame = frame.event(event_name);
        }
        if let Some(id) = id {
            frame = frame.id(id);
        }

        debug!(
            "Emitting to topic {} eventName={:?} id={:?} payload={}",
            topic,
            event_name,
            id,
            describe_payload(&frame.payload)
        );

        match channel.try_send(frame) {
            Ok(_) => Ok(()),
            Err(rejection) => Err(map_send_rejection(topic, rejection, event_name, id)),
        }
    }

    /// Broadcast one data-only frame to all currently registered topics,
    /// independently. Per-topic failures are logged and skipped; the call
    /// never fails as a whole. Zero registered topics is a no-op.
    pub fn broadcast(&self, payload: Value) {
        let topics = self.manager.topics();
        if topics.is_empty() {
            warn!("No active topics to broadcast to; payload ignored");
            return;
        }

        let frame = Frame::new(payload);
        debug!(
            "Broadcasting to {} topic(s) payload={}",
            topics.len(),
            describe_payload(&frame.payload)
        );

        for topic in topics {
            let Some(channel) = self.manager.get(&topic) else {
                continue;
            };
            if let Err(rejection) = channel.try_send(frame.clone()) {
                warn!(
                    "Broadcast emit rejected for topic {} reason={}",
                    topic, rejection
                );
            }
        }
    }
}

fn map_send_rejection(
    topic: &str,
    rejection: SendRejection,
    event_name: Option<&str>,
    id: Option<&str>,
) -> HubError {
    warn!(
        "Failed to emit to topic {} reason={} eventName={:?} id={:?}",
        topic, rejection, event_name, id
    );

    let mut details = HashMap::new();
    details.insert(
        "reason".to_string(),
        Value::String(rejection.as_str().to_string()),
    );
    details.insert(
        "eventName".to_string(),
        Value::String(event_name.unwrap_or_default().to_string()),
    );
    details.insert(
        "id".to_string(),
        Value::String(id.unwrap_or_default().to_string()),
    );

    match rejection {
        SendRejection::NoSubscribers => HubError::no_subscribers(topic, details),
        SendRejection::Closed => {
            HubError::emission_rejected(topic, rejection.as_str(), details)
        }
    }
}

/// Concise payload description for logs: type and size hints, never content
fn describe_payload(payload: &Value) -> String {
    match payload {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(s) => format!("string[len={}]", s.len()),
        Value::Array(items) => format!("array[size={}]", items.len()),
        Value::Object(map) => format!("object[size={}]", map.len()),
    }
}
