//! Subscription registry: stream key to fan-out frame delivery.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::message::StreamFrame;

/// Maps each open subscription's stream key to its raw frame channel.
///
/// One instance per connection, owned by the pump. The read loop routes push
/// frames here by their wire `command`; the key of an entry must therefore
/// match the command string of the pushes it wants to receive. Frames for
/// unknown keys are dropped: the server may deliver a final push after an
/// unsubscribe was requested but before it took effect, which is expected.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: DashMap<String, mpsc::UnboundedSender<StreamFrame>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a subscription slot and returns its raw frame channel.
    ///
    /// The channel yields pushes until the slot is closed, then ends.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateSubscription`] when the key is already open.
    pub fn open(&self, key: &str) -> Result<mpsc::UnboundedReceiver<StreamFrame>> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => Err(Error::duplicate_subscription(key.to_string())),
            Entry::Vacant(slot) => {
                let (sender, receiver) = mpsc::unbounded_channel();
                slot.insert(sender);
                Ok(receiver)
            }
        }
    }

    /// Delivers a push frame to the subscription open under `key`.
    ///
    /// Returns `false` when the frame was dropped: no such key, or the
    /// subscriber has already gone away.
    pub fn route(&self, key: &str, frame: StreamFrame) -> bool {
        let Some(sender) = self.entries.get(key) else {
            return false;
        };
        if sender.send(frame).is_ok() {
            return true;
        }
        // Receiver dropped without an unsubscribe; reap the dead entry.
        drop(sender);
        self.entries.remove(key);
        false
    }

    /// Closes the subscription open under `key`; idempotent.
    ///
    /// Dropping the sender ends the subscriber's raw channel.
    pub fn close(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Closes every open subscription.
    ///
    /// Called once per connection lifetime, at pump teardown, so every
    /// subscriber observes end-of-stream.
    pub fn close_all(&self) {
        self.entries.clear();
    }

    /// Returns `true` when a subscription is open under `key`.
    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of open subscriptions.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no subscription is open.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(command: &str) -> StreamFrame {
        StreamFrame {
            command: command.to_string(),
            data: Some(serde_json::json!({"n": 1})),
            error_code: None,
            error_descr: None,
        }
    }

    #[tokio::test]
    async fn open_route_close() {
        let registry = SubscriptionRegistry::new();
        let mut receiver = registry.open("balance").unwrap();

        assert!(registry.route("balance", frame("balance")));
        assert_eq!(receiver.recv().await.unwrap().command, "balance");

        assert!(registry.close("balance"));
        assert!(receiver.recv().await.is_none());
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let registry = SubscriptionRegistry::new();
        let _receiver = registry.open("candle").unwrap();
        let err = registry.open("candle").unwrap_err();
        assert!(matches!(err, Error::DuplicateSubscription(_)));
    }

    #[test]
    fn route_unknown_key_drops_frame() {
        let registry = SubscriptionRegistry::new();
        assert!(!registry.route("ghost", frame("ghost")));
    }

    #[test]
    fn late_frame_after_close_is_dropped_without_reopening() {
        let registry = SubscriptionRegistry::new();
        let _receiver = registry.open("balance").unwrap();
        registry.close("balance");
        assert!(!registry.route("balance", frame("balance")));
        assert!(!registry.contains("balance"));
    }

    #[test]
    fn close_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let _receiver = registry.open("trade").unwrap();
        assert!(registry.close("trade"));
        assert!(!registry.close("trade"));
    }

    #[tokio::test]
    async fn close_all_ends_every_channel() {
        let registry = SubscriptionRegistry::new();
        let mut rx_a = registry.open("balance").unwrap();
        let mut rx_b = registry.open("candle").unwrap();

        registry.close_all();
        assert!(registry.is_empty());
        assert!(rx_a.recv().await.is_none());
        assert!(rx_b.recv().await.is_none());
    }

    #[test]
    fn route_to_dropped_subscriber_reaps_entry() {
        let registry = SubscriptionRegistry::new();
        let receiver = registry.open("news").unwrap();
        drop(receiver);
        assert!(!registry.route("news", frame("news")));
        assert!(!registry.contains("news"));
    }
}
