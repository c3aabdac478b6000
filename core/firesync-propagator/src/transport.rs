//! Transport layer abstraction.
//!
//! Defines the publish channel to the propagation topic without exposing
//! any vendor client types to the engine. The real deployment plugs a
//! pubsub client in here; local development uses the in-process
//! [`local::LocalTopic`] and tests use [`mock::MockTransport`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that can occur while publishing.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The broker did not acknowledge the message.
    #[error("publish failed: {0}")]
    Publish(String),

    /// The topic is no longer accepting messages.
    #[error("topic closed")]
    Closed,
}

/// Message published to the propagation topic: the serialized change
/// payload plus routing attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub data: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
}

impl OutboundMessage {
    /// Looks up a single attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// A publish channel to the propagation topic.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes a message, resolving to the broker-assigned message id
    /// once the broker has acknowledged it.
    async fn publish(&self, message: OutboundMessage) -> TransportResult<String>;
}

/// In-process topic for local development.
pub mod local {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::broadcast;

    /// A topic backed by a broadcast channel. Every subscriber receives
    /// every message published after it subscribed; with no subscribers,
    /// messages are acknowledged and dropped.
    #[derive(Debug)]
    pub struct LocalTopic {
        sender: broadcast::Sender<OutboundMessage>,
        next_id: AtomicU64,
    }

    impl LocalTopic {
        /// Creates a topic buffering up to `capacity` messages per
        /// subscriber.
        #[must_use]
        pub fn new(capacity: usize) -> Self {
            let (sender, _) = broadcast::channel(capacity);
            Self {
                sender,
                next_id: AtomicU64::new(0),
            }
        }

        /// Subscribes to messages published from now on.
        pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
            self.sender.subscribe()
        }
    }

    impl Default for LocalTopic {
        fn default() -> Self {
            Self::new(256)
        }
    }

    #[async_trait]
    impl Transport for LocalTopic {
        async fn publish(&self, message: OutboundMessage) -> TransportResult<String> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            // A send error only means there are no subscribers.
            let _ = self.sender.send(message);
            Ok(id.to_string())
        }
    }
}

/// A mock transport for testing.
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Records every published message and can be told to fail.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        published: Mutex<Vec<OutboundMessage>>,
        fail_with: Mutex<Option<TransportError>>,
    }

    impl MockTransport {
        /// Creates a transport that acknowledges everything.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes all subsequent publishes fail with the given error.
        pub fn fail_publishes(&self, error: TransportError) {
            *self.fail_with.lock().unwrap() = Some(error);
        }

        /// Clears a previously configured failure.
        pub fn recover(&self) {
            *self.fail_with.lock().unwrap() = None;
        }

        /// All messages published so far.
        pub fn published(&self) -> Vec<OutboundMessage> {
            self.published.lock().unwrap().clone()
        }

        /// Number of messages published so far.
        pub fn published_count(&self) -> usize {
            self.published.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn publish(&self, message: OutboundMessage) -> TransportResult<String> {
            if let Some(error) = self.fail_with.lock().unwrap().clone() {
                return Err(error);
            }
            let mut published = self.published.lock().unwrap();
            published.push(message);
            Ok(published.len().to_string())
        }
    }
}
