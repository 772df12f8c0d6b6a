//! Session event definitions and the broadcast EventBus
//!
//! The client session publishes a [`ClientEvent`] whenever a response frame
//! changes local state. The presentation layer subscribes and redraws when the
//! focused group is affected.

use tokio::sync::broadcast;

/// Notifications published by a client session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Tag alias list arrived
    TagListReady {
        /// Number of label columns
        tag_cnt: usize,
    },

    /// Projected row table arrived; the image cache was reset
    RowTableReady {
        /// Number of rows
        data_cnt: usize,
    },

    /// Clip layout arrived and groups were rebuilt
    ClipLayoutReady {
        /// Number of clips
        clip_cnt: usize,
        /// Number of groups across all clips
        group_cnt: usize,
    },

    /// Image bytes for a row are now cached
    ImageReady { row: u32 },

    /// Server reported an error for a row's image
    ImageFailed { row: u32, message: String },

    /// The focused group changed on screen and needs to be rendered again
    Redraw { group: usize },

    /// Server answered a tag mutation
    MutationAcked { ok: bool },

    /// Server answered a save request
    SaveAcked { ok: bool },

    /// The connection was lost
    Disconnected { reason: String },
}

/// Broadcast channel wrapper for session events
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the receive loop)
/// - Multiple concurrent subscribers
/// - Lagged subscribers lose old events instead of stalling the session
#[derive(Clone)]
pub struct EventBus<E: Clone> {
    tx: broadcast::Sender<E>,
    capacity: usize,
}

impl<E: Clone> EventBus<E> {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Having no subscribers is not an error for the emitter; the event is
    /// simply dropped.
    pub fn emit(&self, event: E) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
