//! Pending-call table: correlation tag to one-shot reply delivery.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::message::Response;

/// Maps the correlation tag of each in-flight call to its reply channel.
///
/// One instance per connection, owned by the pump. `register` and `resolve`
/// may run concurrently from caller tasks and the read loop; both funnel
/// through the map's atomic entry operations, so each tag is delivered to at
/// most once. `fail_all` drains the table through the same removal path and is
/// therefore exclusive with `resolve` per tag.
#[derive(Debug, Default)]
pub struct PendingCallTable {
    entries: DashMap<String, oneshot::Sender<Response>>,
}

impl PendingCallTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an in-flight call and returns its reply channel.
    ///
    /// The channel receives exactly one [`Response`]: the server's reply or a
    /// synthetic failure.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateTag`] when a call with this tag is already in flight.
    pub fn register(&self, tag: &str) -> Result<oneshot::Receiver<Response>> {
        match self.entries.entry(tag.to_string()) {
            Entry::Occupied(_) => Err(Error::duplicate_tag(tag.to_string())),
            Entry::Vacant(slot) => {
                let (sender, receiver) = oneshot::channel();
                slot.insert(sender);
                Ok(receiver)
            }
        }
    }

    /// Delivers a reply to the call registered under `tag`.
    ///
    /// Returns `false` when no such call is registered (late or unknown tag).
    pub fn resolve(&self, tag: &str, response: Response) -> bool {
        match self.entries.remove(tag) {
            Some((_, sender)) => {
                let _ = sender.send(response);
                true
            }
            None => false,
        }
    }

    /// Removes a registration without delivering anything.
    ///
    /// Used by the caller that registered the tag when its enqueue fails and
    /// the error is returned synchronously instead.
    pub fn discard(&self, tag: &str) {
        self.entries.remove(tag);
    }

    /// Drains every registered call, delivering one synthetic transport
    /// failure each.
    ///
    /// Called once per connection lifetime, at pump teardown.
    pub fn fail_all(&self, description: &str) {
        let tags: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        for tag in tags {
            if let Some((tag, sender)) = self.entries.remove(&tag) {
                let _ = sender.send(Response::synthetic_failure(tag, description));
            }
        }
    }

    /// Number of calls currently in flight.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no call is in flight.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
