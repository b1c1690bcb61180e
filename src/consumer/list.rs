//! Consumer registration list
//!
//! Array-backed and ordered oldest-first in memory; every lookup and walk
//! goes newest-first. Lists that may be under delivery (pass snapshots) are
//! never unlinked in place: entries are marked uninterested and compacted
//! once no walk can be positioned on them.

use std::sync::{Arc, Weak};

use super::{ConsumerKey, ConsumerRef, ImageConsumer};
use crate::event::ImageEvent;
use crate::security::CallerContext;

/// One registered consumer
pub struct Registration {
    key: ConsumerKey,
    consumer: Weak<dyn ImageConsumer>,
    context: CallerContext,
    interested: bool,
    /// Received a final completion in its pass
    terminated: bool,
    /// Header events queued for delivery before the next broadcast
    catchup: Vec<ImageEvent>,
}

impl Registration {
    pub fn new(consumer: &ConsumerRef, context: CallerContext) -> Self {
        Self {
            key: ConsumerKey::of(consumer),
            consumer: Arc::downgrade(consumer),
            context,
            interested: true,
            terminated: false,
            catchup: Vec::new(),
        }
    }

    /// Entry that must first see `events` (header catch-up for a joiner)
    pub fn with_catchup(consumer: &ConsumerRef, context: CallerContext, events: Vec<ImageEvent>) -> Self {
        let mut entry = Self::new(consumer, context);
        entry.catchup = events;
        entry
    }

    pub fn key(&self) -> ConsumerKey {
        self.key
    }

    pub fn context(&self) -> CallerContext {
        self.context
    }

    /// Interested and still referenced by its owner
    pub fn is_interested(&self) -> bool {
        self.interested && self.is_alive()
    }

    pub fn is_alive(&self) -> bool {
        self.consumer.strong_count() > 0
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn upgrade(&self) -> Option<ConsumerRef> {
        self.consumer.upgrade()
    }

    pub(crate) fn set_interested(&mut self, interested: bool) {
        self.interested = interested;
    }

    pub(crate) fn set_context(&mut self, context: CallerContext) {
        self.context = context;
    }

    pub(crate) fn mark_terminated(&mut self) {
        self.terminated = true;
    }

    pub(crate) fn take_catchup(&mut self) -> Vec<ImageEvent> {
        std::mem::take(&mut self.catchup)
    }

    fn matches(&self, key: ConsumerKey) -> bool {
        self.key == key && self.is_alive()
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("key", &self.key)
            .field("context", &self.context)
            .field("interested", &self.interested)
            .field("alive", &self.is_alive())
            .field("terminated", &self.terminated)
            .field("catchup", &self.catchup.len())
            .finish()
    }
}

/// Ordered set of registrations
#[derive(Debug, Default)]
pub struct ConsumerList {
    entries: Vec<Registration>,
}

impl ConsumerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including ones marked uninterested
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add an entry as the most recent registration
    pub fn push(&mut self, entry: Registration) {
        self.entries.push(entry);
    }

    /// Most recent live entry for a consumer
    pub fn find(&self, key: ConsumerKey) -> Option<&Registration> {
        self.entries.iter().rev().find(|e| e.matches(key))
    }

    pub fn find_mut(&mut self, key: ConsumerKey) -> Option<&mut Registration> {
        self.entries.iter_mut().rev().find(|e| e.matches(key))
    }

    pub fn contains_interested(&self, key: ConsumerKey) -> bool {
        self.entries
            .iter()
            .any(|e| e.matches(key) && e.is_interested())
    }

    /// Detach a consumer's entry from a list that is not under delivery
    ///
    /// The returned entry keeps `leave_interested` as its interest flag.
    pub fn remove(&mut self, key: ConsumerKey, leave_interested: bool) -> Option<Registration> {
        let index = self.entries.iter().rposition(|e| e.matches(key))?;
        let mut entry = self.entries.remove(index);
        entry.interested = leave_interested;
        Some(entry)
    }

    /// Clear the interest flag of a consumer's entry without unlinking it
    ///
    /// Returns true if an interested entry was found.
    pub fn mark_uninterested(&mut self, key: ConsumerKey) -> bool {
        let mut found = false;
        for entry in self.entries.iter_mut().filter(|e| e.matches(key)) {
            found |= entry.interested;
            entry.interested = false;
        }
        found
    }

    pub fn interested_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_interested()).count()
    }

    pub fn has_interested(&self) -> bool {
        self.entries.iter().any(Registration::is_interested)
    }

    /// Drop entries that lost interest or whose consumer is gone
    ///
    /// Returns the number of entries removed.
    pub fn compact(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(Registration::is_interested);
        before - self.entries.len()
    }

    /// Move every interested entry into a new list, leaving this one empty
    pub fn take_interested(&mut self) -> ConsumerList {
        let mut entries = std::mem::take(&mut self.entries);
        entries.retain(Registration::is_interested);
        ConsumerList { entries }
    }

    /// Entries newest-first
    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.entries.iter().rev()
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Registration> {
        self.entries.get_mut(index)
    }
}
