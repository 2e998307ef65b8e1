//! Change notifications for the tracked-show store.
//!
//! Every successful mutation on [`Storage`](crate::storage::Storage) publishes a
//! [`StoreEvent`] on a [`ChangeFeed`]. Consumers subscribe and refresh their
//! views when something they display changed.

use tokio::sync::broadcast;

use crate::models::{Category, ShowKey};

/// Buffer capacity for the broadcast channel.
const FEED_CAPACITY: usize = 256;

/// A mutation that was committed to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A record was inserted or its metadata refreshed.
    Upserted { key: ShowKey, inserted: bool },
    /// Personal fields of an existing record changed.
    Edited {
        key: ShowKey,
        category: Category,
        previous_category: Category,
    },
    /// A record and its episode markers were deleted.
    Removed { key: ShowKey },
    /// Episode-watch markers of a series changed.
    EpisodesChanged {
        external_id: u64,
        season: u32,
        episodes_seen: u32,
    },
}

impl StoreEvent {
    /// The natural key of the record the event concerns.
    pub fn key(&self) -> ShowKey {
        match self {
            Self::Upserted { key, .. } | Self::Edited { key, .. } | Self::Removed { key } => *key,
            Self::EpisodesChanged { external_id, .. } => ShowKey::series(*external_id),
        }
    }
}

/// Fan-out channel for [`StoreEvent`]s.
///
/// When the buffer is full, slow receivers observe `RecvError::Lagged` and
/// should reload everything.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<StoreEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: StoreEvent) {
        tracing::trace!(?event, "Store changed");
        // Only fails when nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}
