//! Stream composition: merging a topic's raw channel stream with a
//! heartbeat timer and an optional initial "connected" frame.
//!
//! Composition is purely additive; real data frames are never altered,
//! dropped, or reordered.

use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Interval};
use tracing::trace;

use crate::channel::ChannelSubscription;
use crate::config::StreamConfig;
use crate::error::{ErrorPayload, HubError, Result};
use crate::types::Frame;

/// Builds composed per-subscriber streams according to stream configuration
#[derive(Debug, Clone)]
pub struct StreamComposer {
    config: StreamConfig,
}

impl StreamComposer {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    /// Compose a subscriber stream for a topic: one optional "connected"
    /// frame, then the replay backlog, then live frames merged best-effort
    /// with heartbeats. The heartbeat timer stops as soon as the channel
    /// stream terminates or the composed stream is dropped; it never
    /// outlives the subscription it belongs to.
    ///
    /// Must be called within a Tokio runtime.
    pub fn compose(&self, topic: &str, subscription: ChannelSubscription) -> ComposedStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(pump(
            topic.to_string(),
            self.config.clone(),
            subscription,
            tx,
        ));
        ComposedStream { rx, handle }
    }
}

async fn pump(
    topic: String,
    config: StreamConfig,
    subscription: ChannelSubscription,
    tx: mpsc::UnboundedSender<Result<Frame>>,
) {
    if config.connected_event_enabled {
        let connected = Frame::new(Value::String(config.connected_event_data.clone()))
            .event(config.connected_event_name.clone());
        if tx.send(Ok(connected)).is_err() {
            return;
        }
    }

    for frame in subscription.backlog {
        if tx.send(Ok(frame)).is_err() {
            return;
        }
    }

    // Absent receiver means the channel already completed; the stream ends
    // after the backlog.
    let Some(mut receiver) = subscription.receiver else {
        return;
    };

    let mut heartbeat = config.heartbeat_enabled.then(|| {
        time::interval_at(
            time::Instant::now() + config.heartbeat_interval,
            config.heartbeat_interval,
        )
    });

    loop {
        tokio::select! {
            result = receiver.recv() => match result {
                Ok(frame) => {
                    if tx.send(Ok(frame)).is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    let mut details = HashMap::new();
                    details.insert("skipped".to_string(), Value::from(skipped));
                    let error = HubError::Internal {
                        message: format!(
                            "Subscriber lagged behind; skipped {} frame(s)",
                            skipped
                        ),
                        topic: Some(topic.clone()),
                        details,
                    };
                    if config.map_errors_to_frames {
                        let frame = ErrorPayload::from_error(&error).into_frame();
                        if tx.send(Ok(frame)).is_err() {
                            break;
                        }
                    } else {
                        let _ = tx.send(Err(error));
                        break;
                    }
                }
            },
            _ = next_tick(heartbeat.as_mut()) => {
                trace!("Sending heartbeat on topic {}", topic);
                let frame = Frame::new(Value::String(config.heartbeat_data.clone()))
                    .event(config.heartbeat_event_name.clone());
                if tx.send(Ok(frame)).is_err() {
                    break;
                }
            }
            _ = tx.closed() => break,
        }
    }
}

async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// A subscriber's composed frame stream. Dropping it aborts the pump task,
/// which stops the heartbeat timer promptly.
#[derive(Debug)]
pub struct ComposedStream {
    rx: mpsc::UnboundedReceiver<Result<Frame>>,
    handle: JoinHandle<()>,
}

impl Stream for ComposedStream {
    type Item = Result<Frame>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for ComposedStream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::TopicChannel;
    use crate::error::ErrorCode;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn quiet_config() -> StreamConfig {
        let mut config = StreamConfig::default();
        config.connected_event_enabled = false;
        config.heartbeat_enabled = false;
        config
    }

    #[tokio::test]
    async fn test_connected_frame_comes_first() {
        let mut config = quiet_config();
        config.connected_event_enabled = true;
        let channel = TopicChannel::multicast("orders", 16);
        let subscription = channel.subscribe();
        let composer = StreamComposer::new(config);

        let mut stream = composer.compose("orders", subscription);
        channel.try_send(Frame::new(json!("data"))).unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.event.as_deref(), Some("connected"));
        assert_eq!(first.payload, json!("connected"));

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.payload, json!("data"));
    }

    #[tokio::test]
    async fn test_backlog_replayed_before_live_frames() {
        let channel = TopicChannel::replay("orders", 16, 0);
        channel.try_send(Frame::new(json!(1))).unwrap();
        channel.try_send(Frame::new(json!(2))).unwrap();
        let subscription = channel.subscribe();
        let composer = StreamComposer::new(quiet_config());

        let mut stream = composer.compose("orders", subscription);
        channel.try_send(Frame::new(json!(3))).unwrap();

        for expected in [json!(1), json!(2), json!(3)] {
            let actual = stream.next().await.unwrap().unwrap();
            assert_eq!(actual.payload, expected);
        }
    }

    #[tokio::test]
    async fn test_data_frames_observed_in_send_order() {
        let channel = TopicChannel::multicast("orders", 16);
        let subscription = channel.subscribe();
        let composer = StreamComposer::new(quiet_config());
        let mut stream = composer.compose("orders", subscription);

        for n in 1..=5 {
            channel.try_send(Frame::new(json!(n))).unwrap();
        }

        for n in 1..=5 {
            let actual = stream.next().await.unwrap().unwrap();
            assert_eq!(actual.payload, json!(n));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_on_idle_stream() {
        let mut config = quiet_config();
        config.heartbeat_enabled = true;
        config.heartbeat_interval = Duration::from_secs(1);
        let channel = TopicChannel::multicast("orders", 16);
        let subscription = channel.subscribe();
        let composer = StreamComposer::new(config);

        let mut stream = composer.compose("orders", subscription);

        // An idle subscriber observes exactly heartbeats, nothing else
        for _ in 0..3 {
            let actual = stream.next().await.unwrap().unwrap();
            assert_eq!(actual.event.as_deref(), Some("heartbeat"));
            assert_eq!(actual.payload, json!("::heartbeat::"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_ends_when_channel_completes() {
        let mut config = quiet_config();
        config.heartbeat_enabled = true;
        config.heartbeat_interval = Duration::from_secs(60);
        let channel = TopicChannel::multicast("orders", 16);
        let subscription = channel.subscribe();
        let composer = StreamComposer::new(config);
        let mut stream = composer.compose("orders", subscription);

        channel.complete();

        let actual = stream.next().await;
        assert!(actual.is_none());
    }

    #[tokio::test]
    async fn test_lag_mapped_to_error_frame() {
        let channel = TopicChannel::multicast("orders", 1);
        let subscription = channel.subscribe();
        for n in 1..=3 {
            channel.try_send(Frame::new(json!(n))).unwrap();
        }
        let mut config = quiet_config();
        config.map_errors_to_frames = true;
        let composer = StreamComposer::new(config);

        let mut stream = composer.compose("orders", subscription);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.event.as_deref(), Some("error"));
        assert_eq!(
            first.payload.get("code"),
            Some(&json!(ErrorCode::InternalError))
        );
        assert_eq!(
            first.payload.get("topic"),
            Some(&json!("orders"))
        );

        // The stream continues with the retained frame
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.payload, json!(3));
    }

    #[tokio::test]
    async fn test_lag_terminates_stream_when_mapping_disabled() {
        let channel = TopicChannel::multicast("orders", 1);
        let subscription = channel.subscribe();
        for n in 1..=3 {
            channel.try_send(Frame::new(json!(n))).unwrap();
        }
        let mut config = quiet_config();
        config.map_errors_to_frames = false;
        let composer = StreamComposer::new(config);

        let mut stream = composer.compose("orders", subscription);

        let first = stream.next().await.unwrap();
        let error = first.unwrap_err();
        assert_eq!(error.code(), ErrorCode::InternalError);

        let second = stream.next().await;
        assert!(second.is_none());
    }
}
