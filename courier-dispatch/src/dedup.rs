//! Duplicate suppression keyed by message id
//!
//! An id is *reserved* when a dispatch starts and *committed* once a provider
//! accepts the message. A dispatch that ends any other way releases its
//! reservation, so only successfully sent ids are remembered. Entries are
//! never evicted; the store lives as long as the engine that owns it.
//!
//! A dispatch that finds its id reserved by another one waits for that
//! reservation to settle and then checks again: it is a duplicate only if
//! the other dispatch actually sent the message.

use courier_common::MessageId;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::watch;

#[derive(Debug)]
enum EntryState {
    /// Dropping the sender wakes every dispatch waiting on the reservation
    InFlight(watch::Sender<()>),
    Sent,
}

impl EntryState {
    const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Outcome of trying to reserve a message id
#[derive(Debug)]
pub enum Reservation<'a> {
    /// The id is now reserved for the caller
    Acquired(DedupGuard<'a>),
    /// The id has already been sent
    Duplicate,
    /// Another dispatch of the same id is currently in flight
    InFlight(Pending),
}

/// Set of message ids that have been dispatched successfully
#[derive(Debug, Default)]
pub struct DedupStore {
    entries: DashMap<MessageId, EntryState>,
}

impl DedupStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check `id` and reserve it if it is unknown
    pub fn reserve(&self, id: &MessageId) -> Reservation<'_> {
        match self.entries.entry(id.clone()) {
            Entry::Occupied(entry) => match entry.get() {
                EntryState::Sent => Reservation::Duplicate,
                EntryState::InFlight(settled) => Reservation::InFlight(Pending {
                    settled: settled.subscribe(),
                }),
            },
            Entry::Vacant(entry) => {
                let (settled, _) = watch::channel(());
                entry.insert(EntryState::InFlight(settled));
                Reservation::Acquired(DedupGuard {
                    store: self,
                    id: id.clone(),
                    committed: false,
                })
            }
        }
    }

    /// Returns `true` if `id` has been sent
    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.get(id).is_some_and(|state| state.is_sent())
    }

    /// Number of ids recorded as sent
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().is_sent())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, id: &MessageId) {
        self.entries.remove_if(id, |_, state| !state.is_sent());
    }
}

/// Handle on a reservation held by another dispatch
#[derive(Debug)]
#[must_use = "a pending reservation does nothing unless awaited"]
pub struct Pending {
    settled: watch::Receiver<()>,
}

impl Pending {
    /// Wait until the other dispatch commits or releases the id
    pub async fn settled(mut self) {
        // The sender only ever goes away, so this returns once it is dropped
        while self.settled.changed().await.is_ok() {}
    }
}

/// Reservation of a message id for one in-flight dispatch
///
/// Dropping the guard without calling [`DedupGuard::commit`] releases the id.
#[derive(Debug)]
#[must_use = "dropping the guard releases the reservation"]
pub struct DedupGuard<'a> {
    store: &'a DedupStore,
    id: MessageId,
    committed: bool,
}

impl DedupGuard<'_> {
    /// Record the id as sent
    pub fn commit(mut self) {
        self.store.entries.insert(self.id.clone(), EntryState::Sent);
        self.committed = true;
    }
}

impl Drop for DedupGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.store.release(&self.id);
        }
    }
}
