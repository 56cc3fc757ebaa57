//! Per-topic broadcast channels and their factory
//!
//! A topic channel is a hot, multi-consumer primitive with one non-blocking
//! writer path. The multicast variant fans out best-effort and fails a send
//! with zero current subscribers; the replay variant retains the last N
//! frames and replays them to every new subscriber before live frames.

use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::{EmitterConfig, SinkType};
use crate::session::Session;
use crate::traits::ChannelCustomizer;
use crate::types::Frame;

/// Why a non-blocking send was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejection {
    /// The channel has been completed
    Closed,
    /// Multicast send with zero current subscribers
    NoSubscribers,
}

impl SendRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::NoSubscribers => "no_subscribers",
        }
    }
}

impl fmt::Display for SendRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug)]
struct ReplayBuffer {
    frames: VecDeque<Frame>,
    /// 0 means retain all
    limit: usize,
}

/// A subscriber's attachment to a channel: the replay backlog snapshot plus
/// a live receiver. `receiver` is `None` when the channel was already
/// completed; the subscription then yields the backlog and ends.
#[derive(Debug)]
pub struct ChannelSubscription {
    pub(crate) backlog: Vec<Frame>,
    pub(crate) receiver: Option<broadcast::Receiver<Frame>>,
}

/// State for one logical topic: the broadcast sender, the optional replay
/// buffer, the live subscriber counter, and the session map.
#[derive(Debug)]
pub struct TopicChannel {
    id: String,
    sender: Mutex<Option<broadcast::Sender<Frame>>>,
    replay: Option<Mutex<ReplayBuffer>>,
    subscribers: AtomicUsize,
    sessions: DashMap<String, Session>,
}

impl TopicChannel {
    /// Create a multicast channel: hot fan-out, no buffering for absent
    /// consumers
    pub fn multicast(id: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            id: id.into(),
            sender: Mutex::new(Some(sender)),
            replay: None,
            subscribers: AtomicUsize::new(0),
            sessions: DashMap::new(),
        }
    }

    /// Create a replay channel retaining the last `replay_size` frames
    /// (0 retains all)
    pub fn replay(id: impl Into<String>, capacity: usize, replay_size: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            id: id.into(),
            sender: Mutex::new(Some(sender)),
            replay: Some(Mutex::new(ReplayBuffer {
                frames: VecDeque::new(),
                limit: replay_size,
            })),
            subscribers: AtomicUsize::new(0),
            sessions: DashMap::new(),
        }
    }

    /// Topic identifier this channel belongs to
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current live subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    /// Attempt a non-blocking send. Returns the number of live receivers
    /// the frame reached.
    pub fn try_send(&self, frame: Frame) -> std::result::Result<usize, SendRejection> {
        let guard = lock(&self.sender);
        let Some(sender) = guard.as_ref() else {
            return Err(SendRejection::Closed);
        };
        match &self.replay {
            Some(replay) => {
                let mut buffer = lock(replay);
                buffer.frames.push_back(frame.clone());
                if buffer.limit > 0 {
                    while buffer.frames.len() > buffer.limit {
                        buffer.frames.pop_front();
                    }
                }
                // Zero live receivers is not a failure here; the frame is
                // retained for late joiners.
                Ok(sender.send(frame).unwrap_or(0))
            }
            None => sender
                .send(frame)
                .map_err(|_| SendRejection::NoSubscribers),
        }
    }

    /// Attach a new subscriber. The backlog snapshot and the live receiver
    /// are taken under the sender lock so a concurrent send lands in
    /// exactly one of them.
    pub fn subscribe(&self) -> ChannelSubscription {
        let guard = lock(&self.sender);
        let receiver = guard.as_ref().map(|sender| sender.subscribe());
        let backlog = match &self.replay {
            Some(replay) => lock(replay).frames.iter().cloned().collect(),
            None => Vec::new(),
        };
        ChannelSubscription { backlog, receiver }
    }

    /// Mark the channel complete, ending every live receiver after it
    /// drains. Idempotent.
    pub fn complete(&self) {
        let mut guard = lock(&self.sender);
        if guard.take().is_some() {
            debug!("Completed channel for topic {}", self.id);
        }
    }

    /// Check whether the channel has been completed
    pub fn is_completed(&self) -> bool {
        lock(&self.sender).is_none()
    }

    pub(crate) fn add_subscriber(&self) -> usize {
        self.subscribers.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrement the subscriber counter, never letting it go below zero.
    pub(crate) fn remove_subscriber(&self) -> usize {
        let mut current = self.subscribers.load(Ordering::SeqCst);
        loop {
            if current == 0 {
                return 0;
            }
            match self.subscribers.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return current - 1,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn insert_session(&self, session: Session) {
        self.sessions.insert(session.session_id.clone(), session);
    }

    pub(crate) fn remove_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Snapshot copy of the current session map
    pub fn sessions(&self) -> HashMap<String, Session> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Builds the per-topic channel, honoring an optional pluggable override
/// before falling back to the configured sink type.
pub struct ChannelFactory {
    config: EmitterConfig,
    customizer: Option<Arc<dyn ChannelCustomizer>>,
}

impl ChannelFactory {
    pub fn new(config: EmitterConfig) -> Self {
        Self {
            config,
            customizer: None,
        }
    }

    /// Install a channel-creation override
    pub fn customizer(mut self, customizer: Arc<dyn ChannelCustomizer>) -> Self {
        self.customizer = Some(customizer);
        self
    }

    /// Create a channel for the given topic
    pub fn create(&self, topic: &str) -> TopicChannel {
        if let Some(customizer) = &self.customizer {
            if let Some(channel) = customizer.create_channel(topic, &self.config) {
                info!("Using customized channel for topic {}", topic);
                return channel;
            }
        }
        match self.config.sink_type {
            SinkType::Multicast => TopicChannel::multicast(topic, self.config.buffer_size),
            SinkType::Replay => {
                TopicChannel::replay(topic, self.config.buffer_size, self.config.replay_size)
            }
        }
    }
}
