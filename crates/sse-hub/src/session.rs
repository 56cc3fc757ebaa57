//! Subscriber sessions and subscription lifecycle bookkeeping

use chrono::{DateTime, Utc};
use derive_setters::Setters;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, info};

use crate::channel::TopicChannel;
use crate::manager::TopicManager;
use crate::stream::ComposedStream;
use crate::traits::SessionHook;
use crate::types::Frame;

/// How a subscription ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalSignal {
    /// The channel stream ended normally
    Completed,
    /// The subscriber detached before completion
    Cancelled,
    /// The stream ended with an error
    Errored,
}

impl fmt::Display for TerminalSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Errored => "errored",
        };
        write!(f, "{name}")
    }
}

/// Metadata describing one active subscriber of a topic.
///
/// The session id is supplied by the caller or by a configured
/// [`crate::traits::SessionIdGenerator`]; it is never derived here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct Session {
    /// Unique id for this session
    #[setters(skip)]
    pub session_id: String,

    /// Topic this session is subscribed to
    #[setters(skip)]
    pub topic: String,

    /// Remote address of the subscribing client, if known
    pub remote_address: Option<String>,

    /// Client `User-Agent` value, if known
    pub user_agent: Option<String>,

    /// When the session was created
    #[setters(skip)]
    pub created_at: DateTime<Utc>,

    /// Immutable attribute bag
    pub attributes: HashMap<String, Value>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            topic: topic.into(),
            remote_address: None,
            user_agent: None,
            created_at: Utc::now(),
            attributes: HashMap::new(),
        }
    }
}

/// Handles subscription lifecycle bookkeeping: counters, session map,
/// hooks, and terminal-signal-dependent cleanup.
pub struct SessionTracker {
    hooks: Vec<Arc<dyn SessionHook>>,
    manager: Arc<TopicManager>,
}

impl SessionTracker {
    pub fn new(hooks: Vec<Arc<dyn SessionHook>>, manager: Arc<TopicManager>) -> Self {
        Self { hooks, manager }
    }

    /// Decorate a composed stream with join/leave bookkeeping. Registration
    /// happens immediately: the subscriber counter is incremented, the
    /// session stored in the channel's session map, and join hooks invoked
    /// (hook failures are logged, never propagated).
    pub fn track(
        &self,
        topic: &str,
        upstream: ComposedStream,
        channel: Arc<TopicChannel>,
        session: Session,
    ) -> TrackedStream {
        let count = channel.add_subscriber();
        channel.insert_session(session.clone());
        for hook in &self.hooks {
            if let Err(error) = hook.on_join(&session) {
                debug!("Session hook on_join failed: {:#}", error);
            }
        }
        debug!("Subscriber added to topic {} (now: {})", topic, count);

        TrackedStream {
            inner: upstream,
            topic: topic.to_string(),
            channel,
            session,
            hooks: self.hooks.clone(),
            manager: self.manager.clone(),
            finished: false,
        }
    }
}

/// A subscriber's frame stream with lifecycle bookkeeping attached.
///
/// Cleanup policy (deliberate asymmetry): when the last subscriber leaves
/// on cancellation or error, the topic channel is completed and the topic
/// removed from the registry. On normal completion the topic stays alive
/// even at zero subscribers, letting topics persist across quiet periods.
pub struct TrackedStream {
    inner: ComposedStream,
    topic: String,
    channel: Arc<TopicChannel>,
    session: Session,
    hooks: Vec<Arc<dyn SessionHook>>,
    manager: Arc<TopicManager>,
    finished: bool,
}

impl std::fmt::Debug for TrackedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedStream")
            .field("topic", &self.topic)
            .field("session", &self.session)
            .field("finished", &self.finished)
            .finish()
    }
}

impl TrackedStream {
    /// The session attached to this subscription
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn finish(&mut self, signal: TerminalSignal) {
        if self.finished {
            return;
        }
        self.finished = true;

        self.channel.remove_session(&self.session.session_id);
        for hook in &self.hooks {
            if let Err(error) = hook.on_leave(&self.session, signal) {
                debug!("Session hook on_leave failed: {:#}", error);
            }
        }

        let remaining = self.channel.remove_subscriber();
        let cleanup = matches!(signal, TerminalSignal::Cancelled | TerminalSignal::Errored);
        if remaining == 0 && cleanup {
            self.channel.complete();
            self.manager.remove(&self.topic);
            info!(
                "Topic {} completed and removed (signal: {})",
                self.topic, signal
            );
        } else {
            debug!(
                "Subscriber removed from topic {} (remaining: {}, signal: {})",
                self.topic, remaining, signal
            );
        }
    }
}

impl Stream for TrackedStream {
    type Item = crate::error::Result<Frame>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(None) => {
                this.finish(TerminalSignal::Completed);
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(error))) => {
                this.finish(TerminalSignal::Errored);
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(Some(Ok(frame))) => Poll::Ready(Some(Ok(frame))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(TerminalSignal::Cancelled);
        }
    }
}
