//! Per-source bookkeeping
//!
//! Everything here is mutated only under the owning source's lock and never
//! calls into consumers; the source performs deliveries after unlocking.
//!
//! Each pass keeps its own snapshot of recipients. Until its first pixel
//! block the pass is the source's *active* pass and registrants join it,
//! catching up on the header events already sent. The first non-header
//! event latches the pass; from then on registrants wait in the live list
//! for the next pass.

use tracing::warn;

use super::SourcePhase;
use crate::consumer::{ConsumerKey, ConsumerList, ConsumerRef, Registration};
use crate::event::ImageEvent;
use crate::security::{CallerContext, SecurityContext};
use crate::stream::AbortSignal;

/// One pass from sniffing to its terminal event
pub(crate) struct PassRecord {
    pub(crate) id: u64,
    pub(crate) snapshot: ConsumerList,
    /// Header events broadcast so far
    pub(crate) headers: Vec<ImageEvent>,
    pub(crate) latched: bool,
    /// A final completion has been walked; only `end_pass` retires the pass
    pub(crate) finished: bool,
    pub(crate) abort: AbortSignal,
}

impl PassRecord {
    /// Unfinished, with no entry still waiting for its terminal event
    fn is_abandoned(&self) -> bool {
        !self.finished
            && !self
                .snapshot
                .iter()
                .any(|e| e.is_interested() && !e.is_terminated())
    }

    fn tracks(&self, key: ConsumerKey) -> bool {
        self.snapshot
            .iter()
            .any(|e| e.key() == key && e.is_interested() && !e.is_terminated())
    }
}

/// Result of a registration attempt
#[derive(Debug)]
pub(crate) enum Registered {
    /// Same consumer already tracked under a different identity; every
    /// conflicting entry was dropped
    Conflict { aborted: Vec<(u64, AbortSignal)> },
    /// Already receiving an in-flight pass
    Tracked,
    /// Joined the active, not yet latched pass
    Joined(u64),
    /// Waiting in the live list; `schedule` asks the caller to queue the source
    Live { added: bool, schedule: bool },
}

/// Result of an unregistration
#[derive(Debug, Default)]
pub(crate) struct Unregistered {
    pub(crate) found: bool,
    /// Passes left without recipients
    pub(crate) aborted: Vec<(u64, AbortSignal)>,
    /// The source should be pulled off the pool queue
    pub(crate) deschedule: bool,
}

/// Next consumer to deliver to, chosen under the lock
pub(crate) struct Recipient {
    pub(crate) consumer: ConsumerRef,
    pub(crate) context: CallerContext,
    /// Header events the consumer missed, delivered first
    pub(crate) catchup: Vec<ImageEvent>,
}

#[derive(Default)]
pub(crate) struct SourceState {
    pub(crate) live: ConsumerList,
    pub(crate) passes: Vec<PassRecord>,
    pub(crate) active: Option<u64>,
    pub(crate) queued: bool,
    next_pass: u64,
}

impl SourceState {
    pub(crate) fn phase(&self) -> SourcePhase {
        if self.queued {
            SourcePhase::Queued
        } else if !self.passes.is_empty() {
            SourcePhase::Decoding
        } else {
            SourcePhase::Idle
        }
    }

    fn pass_mut(&mut self, id: u64) -> Option<&mut PassRecord> {
        self.passes.iter_mut().find(|p| p.id == id)
    }

    pub(crate) fn register(&mut self, consumer: &ConsumerRef, context: CallerContext, start: bool) -> Registered {
        let key = ConsumerKey::of(consumer);

        if let Some(aborted) = self.drop_conflicts(key, context) {
            return Registered::Conflict { aborted };
        }
        if let CallerContext::Scoped(_) = context {
            self.adopt_scope(key, context);
        }

        if self.passes.iter().any(|p| p.tracks(key)) {
            return Registered::Tracked;
        }

        if let Some(id) = self.active {
            if let Some(pass) = self.passes.iter_mut().find(|p| p.id == id && !p.latched) {
                let catchup = pass.headers.clone();
                pass.snapshot
                    .push(Registration::with_catchup(consumer, context, catchup));
                return Registered::Joined(id);
            }
        }

        let added = match self.live.find_mut(key) {
            Some(entry) => {
                entry.set_interested(true);
                false
            }
            None => {
                self.live.compact();
                self.live.push(Registration::new(consumer, context));
                true
            }
        };

        let schedule = start && !self.queued && self.active.is_none();
        if schedule {
            self.queued = true;
        }
        Registered::Live { added, schedule }
    }

    /// Narrow trusted entries for `key` to the scope a caller now registers with
    fn adopt_scope(&mut self, key: ConsumerKey, context: CallerContext) {
        let lists = std::iter::once(&mut self.live).chain(self.passes.iter_mut().map(|p| &mut p.snapshot));
        for list in lists {
            if let Some(entry) = list.find_mut(key) {
                if entry.context() == CallerContext::Trusted {
                    entry.set_context(context);
                }
            }
        }
    }

    /// Drop every entry for `key` whose identity conflicts with `context`
    ///
    /// Returns `None` when there is no conflict.
    fn drop_conflicts(&mut self, key: ConsumerKey, context: CallerContext) -> Option<Vec<(u64, AbortSignal)>> {
        let conflicts = |entry: &Registration| {
            entry.key() == key && entry.is_interested() && entry.context().conflicts_with(&context)
        };

        let in_live = self.live.iter().any(conflicts);
        let in_passes: Vec<u64> = self
            .passes
            .iter()
            .filter(|p| p.snapshot.iter().any(|e| conflicts(e) && !e.is_terminated()))
            .map(|p| p.id)
            .collect();
        if !in_live && in_passes.is_empty() {
            return None;
        }

        if in_live {
            self.live.remove(key, false);
        }
        let mut aborted = Vec::new();
        for id in in_passes {
            let Some(pass) = self.pass_mut(id) else {
                continue;
            };
            pass.snapshot.mark_uninterested(key);
            if pass.is_abandoned() {
                if let Some(signal) = self.abort_pass(id) {
                    aborted.push((id, signal));
                }
            }
        }
        Some(aborted)
    }

    pub(crate) fn unregister(&mut self, key: ConsumerKey) -> Unregistered {
        let mut result = Unregistered {
            found: self.live.remove(key, false).is_some(),
            ..Default::default()
        };

        let mut emptied = Vec::new();
        for pass in &mut self.passes {
            if pass.snapshot.mark_uninterested(key) {
                result.found = true;
                if pass.is_abandoned() {
                    emptied.push(pass.id);
                }
            }
        }
        for id in emptied {
            if let Some(signal) = self.abort_pass(id) {
                result.aborted.push((id, signal));
            }
        }

        if self.queued && !self.live.has_interested() {
            self.queued = false;
            result.deschedule = true;
        }
        result
    }

    pub(crate) fn is_registered(&self, key: ConsumerKey) -> bool {
        self.live.contains_interested(key) || self.passes.iter().any(|p| p.tracks(key))
    }

    /// Start a pass over the interested live consumers
    ///
    /// Returns the pass id and recipient count, or `None` if nobody is
    /// waiting.
    pub(crate) fn begin_pass(&mut self, abort: AbortSignal) -> Option<(u64, usize)> {
        self.queued = false;
        let snapshot = self.live.take_interested();
        if snapshot.is_empty() {
            return None;
        }

        self.next_pass += 1;
        let id = self.next_pass;
        let recipients = snapshot.interested_count();
        self.passes.push(PassRecord {
            id,
            snapshot,
            headers: Vec::new(),
            latched: false,
            finished: false,
            abort,
        });
        self.active = Some(id);
        Some((id, recipients))
    }

    /// Retire a finished pass; returns true if the source must be queued again
    pub(crate) fn end_pass(&mut self, id: u64) -> bool {
        self.passes.retain(|p| p.id != id);
        if self.active == Some(id) {
            self.active = None;
        }

        let reschedule = !self.queued && self.active.is_none() && self.live.has_interested();
        if reschedule {
            self.queued = true;
        }
        reschedule
    }

    /// Detach a pass so nothing more is delivered for it
    ///
    /// Returns its abort signal for the caller to fire outside the lock.
    pub(crate) fn abort_pass(&mut self, id: u64) -> Option<AbortSignal> {
        let index = self.passes.iter().position(|p| p.id == id)?;
        let pass = self.passes.remove(index);
        if self.active == Some(id) {
            self.active = None;
        }
        Some(pass.abort)
    }

    /// Give up on queueing: detach every waiting consumer
    pub(crate) fn reject_schedule(&mut self) -> ConsumerList {
        self.queued = false;
        self.live.take_interested()
    }

    /// Pick the next recipient of `event` in `pass`
    ///
    /// `cursor` starts as `None` and is advanced on each call; entries are
    /// visited newest-first and state is re-read on every step, so entries
    /// may be marked uninterested between steps. Entries appended after the
    /// first step (pre-latch joiners) are not visited; their catch-up
    /// already holds the event.
    pub(crate) fn next_recipient(
        &mut self,
        pass: u64,
        event: &ImageEvent,
        cursor: &mut Option<usize>,
        allowed: &dyn Fn(&SecurityContext) -> bool,
    ) -> Option<Recipient> {
        let latch = !event.is_header();
        if cursor.is_none() && latch && self.active == Some(pass) {
            self.active = None;
        }

        let record = self.pass_mut(pass)?;
        if record.abort.is_aborted() {
            return None;
        }

        let mut index = match *cursor {
            Some(index) => index,
            None => {
                if latch {
                    record.latched = true;
                    record.finished |= event.is_terminal();
                } else {
                    record.headers.push(event.clone());
                }
                record.snapshot.len()
            }
        };

        let terminal = event.is_terminal();
        let mut found = None;
        while index > 0 {
            index -= 1;
            let Some(entry) = record.snapshot.get_mut(index) else {
                continue;
            };
            if !entry.is_interested() || entry.is_terminated() {
                continue;
            }
            if let CallerContext::Scoped(scope) = entry.context() {
                if !allowed(&scope) {
                    warn!(pass, scope = scope.scope(), "Delivery denied, dropping consumer");
                    entry.set_interested(false);
                    continue;
                }
            }
            let Some(consumer) = entry.upgrade() else {
                entry.set_interested(false);
                continue;
            };
            if terminal {
                entry.mark_terminated();
            }
            found = Some(Recipient {
                consumer,
                context: entry.context(),
                catchup: entry.take_catchup(),
            });
            break;
        }

        *cursor = Some(index);
        found
    }

    /// Consumers of a pass still waiting for their terminal event
    pub(crate) fn pending_consumers(&self, pass: u64) -> Vec<ConsumerRef> {
        self.passes
            .iter()
            .filter(|p| p.id == pass)
            .flat_map(|p| p.snapshot.iter())
            .filter(|e| e.is_interested() && !e.is_terminated())
            .filter_map(Registration::upgrade)
            .collect()
    }

    pub(crate) fn passes_in_flight(&self) -> usize {
        self.passes.len()
    }
}
