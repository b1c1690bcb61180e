//! Image source implementation
//!
//! The source is the one place where registrations, pass snapshots and the
//! Idle/Queued/Decoding state meet. All of it lives behind a single
//! per-source mutex; consumer callbacks always run after that mutex has
//! been released, so a callback may re-enter the source freely.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::state::{Registered, SourceState};
use super::{SourceConfig, SourceKey, SourcePhase};
use crate::consumer::{ConsumerKey, ConsumerRef};
use crate::decode::{Broadcaster, EngineOutcome, PassSink, SignatureTable};
use crate::error::{Error, Result};
use crate::event::{DecodeFailure, FailureKind, ImageEvent};
use crate::pool::{DecodePool, DecodeUnit, WorkerHandle};
use crate::security::{CallerContext, IdentityProvider, SecurityContext, TrustAll};
use crate::stats::{SourceMetrics, SourceStats};
use crate::stream::{AbortSignal, ImageStream, StreamProvider};

/// State shared between the public handle and the decode pool
struct SourceShared {
    key: SourceKey,
    provider: Arc<dyn StreamProvider>,
    pool: Arc<dyn DecodePool>,
    identity: Arc<dyn IdentityProvider>,
    signatures: SignatureTable,
    config: SourceConfig,
    metrics: SourceMetrics,
    state: Mutex<SourceState>,
}

impl SourceShared {
    /// Queue the source on its pool
    ///
    /// Called with `queued` already set. A refusal is reported to every
    /// waiting consumer exactly like an unrecognized stream.
    fn submit(self: &Arc<Self>) {
        let unit: Arc<dyn DecodeUnit> = self.clone();
        if self.pool.schedule(unit) {
            debug!(source = %self.key, "Source queued for decoding");
            return;
        }

        let waiting = self.state.lock().reject_schedule();
        warn!(
            source = %self.key,
            consumers = waiting.interested_count(),
            "Decode pool rejected source"
        );
        self.metrics.sniff_failed();

        let event = ImageEvent::failure(DecodeFailure::new(
            FailureKind::PoolRejected,
            "decode pool is saturated",
            true,
        ));
        for entry in waiting.iter() {
            let context = entry.context();
            if !self.is_allowed(&context) {
                continue;
            }
            if let Some(consumer) = entry.upgrade() {
                consumer.on_event(&event, &context);
                self.metrics.delivered(1);
            }
        }
    }

    fn is_allowed(&self, context: &CallerContext) -> bool {
        match context {
            CallerContext::Trusted => true,
            CallerContext::Scoped(scope) => self.identity.check_allowed(scope),
        }
    }

    /// Fire abort signals collected under the lock
    fn fire_aborts(&self, aborted: Vec<(u64, AbortSignal)>) {
        for (pass, signal) in aborted {
            if signal.trigger() {
                self.metrics.pass_aborted();
                info!(source = %self.key, pass, "Decode pass aborted, no consumers left");
            }
        }
    }

    /// Whether a failure of `pass` should tell caching recipients to reload
    fn has_caching_recipient(&self, pass: u64) -> bool {
        let consumers = self.state.lock().pending_consumers(pass);
        consumers.iter().any(|c| c.is_caching())
    }

    /// Broadcast the single error completion of a pass
    ///
    /// Nothing is sent once the pass was aborted.
    fn fail_pass(&self, pass: u64, abort: &AbortSignal, failure: DecodeFailure) {
        if abort.is_aborted() {
            debug!(source = %self.key, pass, reason = %failure.reason, "Failure of aborted pass suppressed");
            return;
        }
        warn!(
            source = %self.key,
            pass,
            kind = %failure.kind,
            reason = %failure.reason,
            discard = failure.discard,
            "Decode pass failed"
        );
        self.metrics.pass_failed();
        self.deliver(pass, &ImageEvent::failure(failure));
    }

    fn run_pass(&self, pass: u64, worker: &WorkerHandle, abort: AbortSignal) {
        let reader = match self.provider.open(&abort) {
            Ok(reader) => reader,
            Err(e) => {
                let failure = DecodeFailure::new(FailureKind::Stream, format!("cannot open stream: {}", e), true);
                self.fail_pass(pass, &abort, failure);
                return;
            }
        };
        let mut stream = ImageStream::with_chunk_size(reader, abort.clone(), self.config.read_chunk);

        let engine = match stream.peek(self.config.sniff_len) {
            Ok(prefix) => self.signatures.select(prefix),
            Err(e) => {
                let failure = DecodeFailure::new(FailureKind::Stream, format!("cannot read stream: {}", e), true);
                self.fail_pass(pass, &abort, failure);
                return;
            }
        };
        let Some(mut engine) = engine else {
            self.metrics.sniff_failed();
            let failure = DecodeFailure::new(FailureKind::Sniff, "unrecognized image format", true);
            self.fail_pass(pass, &abort, failure);
            return;
        };
        debug!(source = %self.key, pass, engine = engine.name(), "Engine selected");

        let (outcome, finished) = {
            let mut out = Broadcaster::new(self, pass, worker, abort.clone(), &self.config);
            let outcome = engine.run(&mut stream, &mut out);
            (outcome, out.is_finished())
        };
        self.metrics.read(stream.bytes_read());

        if abort.is_aborted() {
            debug!(source = %self.key, pass, engine = engine.name(), "Engine stopped after abort");
            return;
        }

        let reason = match outcome {
            EngineOutcome::Completed if finished => None,
            EngineOutcome::Completed => Some("decode ended before the final frame".to_string()),
            EngineOutcome::Failed(reason) if finished => {
                warn!(source = %self.key, pass, %reason, "Engine failed after its final completion");
                None
            }
            EngineOutcome::Failed(reason) => Some(reason),
            EngineOutcome::Aborted if finished => None,
            EngineOutcome::Aborted => Some("decode abandoned by engine".to_string()),
        };

        match reason {
            None => {
                self.metrics.pass_completed();
                info!(
                    source = %self.key,
                    pass,
                    engine = engine.name(),
                    bytes = stream.bytes_read(),
                    "Decode pass finished"
                );
            }
            Some(reason) => {
                let discard = self.has_caching_recipient(pass);
                self.fail_pass(pass, &abort, DecodeFailure::new(FailureKind::Parse, reason, discard));
            }
        }
    }
}

impl PassSink for SourceShared {
    fn deliver(&self, pass: u64, event: &ImageEvent) -> usize {
        let allowed = |scope: &SecurityContext| self.identity.check_allowed(scope);
        let mut cursor = None;
        let mut recipients = 0;

        loop {
            let next = self
                .state
                .lock()
                .next_recipient(pass, event, &mut cursor, &allowed);
            let Some(recipient) = next else {
                break;
            };

            for missed in &recipient.catchup {
                recipient.consumer.on_event(missed, &recipient.context);
            }
            recipient.consumer.on_event(event, &recipient.context);
            self.metrics.delivered(recipient.catchup.len() + 1);
            recipients += 1;
        }

        recipients
    }
}

/// Ends the pass even if the engine panics
struct PassGuard<'a> {
    source: &'a Arc<SourceShared>,
    pass: u64,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        let reschedule = self.source.state.lock().end_pass(self.pass);
        if reschedule {
            debug!(source = %self.source.key, pass = self.pass, "Consumers waiting, rescheduling");
            self.source.submit();
        }
    }
}

impl DecodeUnit for SourceShared {
    fn fetch(self: Arc<Self>, worker: &WorkerHandle) {
        let abort = AbortSignal::new();
        let started = self.state.lock().begin_pass(abort.clone());
        let Some((pass, recipients)) = started else {
            debug!(source = %self.key, "Fetched with no interested consumers");
            return;
        };

        self.metrics.pass_started();
        info!(source = %self.key, pass, recipients, worker = worker.id(), "Decode pass started");

        let _guard = PassGuard {
            source: &self,
            pass,
        };
        self.run_pass(pass, worker, abort);
    }

    fn name(&self) -> String {
        self.key.to_string()
    }
}

/// A decodable resource shared by any number of consumers
///
/// Cloning yields another handle to the same source.
#[derive(Clone)]
pub struct ImageSource {
    shared: Arc<SourceShared>,
}

impl ImageSource {
    /// Create a source with default configuration, trusting every caller
    pub fn new(
        key: impl Into<SourceKey>,
        provider: Arc<dyn StreamProvider>,
        pool: Arc<dyn DecodePool>,
    ) -> Self {
        Self::builder(key, provider, pool).build()
    }

    pub fn builder(
        key: impl Into<SourceKey>,
        provider: Arc<dyn StreamProvider>,
        pool: Arc<dyn DecodePool>,
    ) -> SourceBuilder {
        SourceBuilder {
            key: key.into(),
            provider,
            pool,
            identity: Arc::new(TrustAll),
            signatures: SignatureTable::standard(),
            config: SourceConfig::default(),
        }
    }

    pub fn key(&self) -> &SourceKey {
        &self.shared.key
    }

    pub fn config(&self) -> &SourceConfig {
        &self.shared.config
    }

    /// Register a consumer, or refresh its registration
    ///
    /// With `start` set and nothing decoding, the source is queued on its
    /// pool. A consumer already waiting on an in-flight pass is left alone.
    /// Registering the same consumer under a second scoped identity drops
    /// every entry for it and fails with [`Error::IdentityConflict`];
    /// decode failures are never reported here.
    pub fn register(&self, consumer: &ConsumerRef, context: CallerContext, start: bool) -> Result<()> {
        let shared = &self.shared;
        let outcome = shared.state.lock().register(consumer, context, start);

        match outcome {
            Registered::Conflict { aborted } => {
                warn!(source = %shared.key, ?context, "Consumer registered under a conflicting security context");
                shared.fire_aborts(aborted);
                return Err(Error::IdentityConflict(shared.key.clone()));
            }
            Registered::Tracked => {
                debug!(source = %shared.key, "Consumer already receiving an in-flight pass");
            }
            Registered::Joined(pass) => {
                debug!(source = %shared.key, pass, "Consumer joined the active pass");
            }
            Registered::Live { added, schedule } => {
                debug!(source = %shared.key, added, start, "Consumer registered");
                if schedule {
                    shared.submit();
                }
            }
        }
        Ok(())
    }

    /// Register under the identity captured from the source's provider
    pub fn register_current(&self, consumer: &ConsumerRef, start: bool) -> Result<()> {
        let context = CallerContext::from_captured(self.shared.identity.capture_current_context());
        self.register(consumer, context, start)
    }

    /// Register and ask for decoding to start
    pub fn start_production(&self, consumer: &ConsumerRef, context: CallerContext) -> Result<()> {
        self.register(consumer, context, true)
    }

    /// Stop delivering to a consumer
    ///
    /// Passes left without recipients are aborted, and a queued source
    /// nobody waits on anymore is pulled off the pool.
    pub fn unregister(&self, consumer: &ConsumerRef) {
        let shared = &self.shared;
        let result = shared.state.lock().unregister(ConsumerKey::of(consumer));
        if !result.found {
            return;
        }

        debug!(source = %shared.key, aborted = result.aborted.len(), "Consumer unregistered");
        shared.fire_aborts(result.aborted);

        if result.deschedule {
            let unit: Arc<dyn DecodeUnit> = shared.clone();
            let removed = shared.pool.deschedule(&unit);
            debug!(source = %shared.key, removed, "Source descheduled");
        }
    }

    /// Whether the consumer is waiting for data from this source
    pub fn is_registered(&self, consumer: &ConsumerRef) -> bool {
        self.shared.state.lock().is_registered(ConsumerKey::of(consumer))
    }

    /// Ask for the current pass to be sent again in top-down order
    ///
    /// Passes are always delivered top-down in one sweep, so there is
    /// nothing to resend.
    pub fn request_resend(&self, consumer: &ConsumerRef) {
        let registered = self.is_registered(consumer);
        debug!(source = %self.shared.key, registered, "Resend requested, passes are already top-down");
    }

    /// Forget the active pass without aborting it
    ///
    /// Consumers registering afterwards wait for a fresh pass; passes in
    /// flight keep delivering to their snapshots.
    pub fn flush(&self) {
        let previous = self.shared.state.lock().active.take();
        if let Some(pass) = previous {
            debug!(source = %self.shared.key, pass, "Active pass flushed");
        }
    }

    pub fn phase(&self) -> SourcePhase {
        self.shared.state.lock().phase()
    }

    pub fn stats(&self) -> SourceStats {
        let (phase, live, passes) = {
            let state = self.shared.state.lock();
            (state.phase(), state.live.interested_count(), state.passes_in_flight())
        };
        self.shared.metrics.snapshot(phase, live, passes)
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSource")
            .field("key", &self.shared.key)
            .field("provider", &self.shared.provider.describe())
            .field("phase", &self.phase())
            .finish()
    }
}

/// Builder for an [`ImageSource`]
pub struct SourceBuilder {
    key: SourceKey,
    provider: Arc<dyn StreamProvider>,
    pool: Arc<dyn DecodePool>,
    identity: Arc<dyn IdentityProvider>,
    signatures: SignatureTable,
    config: SourceConfig,
}

impl SourceBuilder {
    pub fn config(mut self, config: SourceConfig) -> Self {
        self.config = config;
        self
    }

    /// Identity provider used for captures and delivery checks
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self
    }

    /// Replace the standard signature table
    pub fn signatures(mut self, signatures: SignatureTable) -> Self {
        self.signatures = signatures;
        self
    }

    pub fn build(self) -> ImageSource {
        ImageSource {
            shared: Arc::new(SourceShared {
                key: self.key,
                provider: self.provider,
                pool: self.pool,
                identity: self.identity,
                signatures: self.signatures,
                config: self.config,
                metrics: SourceMetrics::new(),
                state: Mutex::new(SourceState::default()),
            }),
        }
    }
}
