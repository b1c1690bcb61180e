//! Ready-made consumer that records what it receives
//!
//! [`ImageObserver`] answers "what are the dimensions?" and "is it done?"
//! for callers that do not want to write their own consumer. Both questions
//! can be asked synchronously (the calling thread parks until the answer is
//! known, the pass fails, or the wait is interrupted) or asynchronously.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::watch;

use super::ImageConsumer;
use crate::event::{ColorModel, CompletionStatus, DecodeFailure, Hints, ImageEvent, Properties};
use crate::security::CallerContext;

/// Error returned by observer waits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// The pass ended with an error completion
    Failed(DecodeFailure),
    /// [`ImageObserver::interrupt`] was called
    Interrupted,
    /// The timeout elapsed first
    TimedOut,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::Failed(failure) => write!(f, "Image failed: {}", failure),
            WaitError::Interrupted => write!(f, "Wait interrupted"),
            WaitError::TimedOut => write!(f, "Wait timed out"),
        }
    }
}

impl std::error::Error for WaitError {}

/// Summary of everything observed so far
#[derive(Debug, Clone, Default)]
pub struct ObserverStatus {
    pub dimensions: Option<(u32, u32)>,
    pub properties: Option<Properties>,
    pub color_model: Option<ColorModel>,
    pub hints: Option<Hints>,
    /// Pixel blocks received
    pub pixel_blocks: u64,
    /// Frames completed (including the final one)
    pub frames: u32,
    /// A final completion arrived
    pub done: bool,
    pub failure: Option<DecodeFailure>,
    pub interrupted: bool,
}

impl ObserverStatus {
    fn result(&self) -> Option<Result<(), WaitError>> {
        if let Some(failure) = &self.failure {
            return Some(Err(WaitError::Failed(failure.clone())));
        }
        if self.interrupted {
            return Some(Err(WaitError::Interrupted));
        }
        self.done.then_some(Ok(()))
    }
}

#[derive(Default)]
struct ObservedState {
    status: ObserverStatus,
    events: Vec<ImageEvent>,
    contexts: Vec<CallerContext>,
}

/// Consumer that records events and supports blocking or async waits
pub struct ImageObserver {
    state: Mutex<ObservedState>,
    changed: Condvar,
    watch: watch::Sender<ObserverStatus>,
    caching: bool,
}

impl ImageObserver {
    pub fn new() -> Self {
        let (watch, _) = watch::channel(ObserverStatus::default());
        Self {
            state: Mutex::new(ObservedState::default()),
            changed: Condvar::new(),
            watch,
            caching: false,
        }
    }

    /// Observer that reports itself as a caching representation
    pub fn caching() -> Self {
        Self {
            caching: true,
            ..Self::new()
        }
    }

    pub fn status(&self) -> ObserverStatus {
        self.state.lock().status.clone()
    }

    /// Every event received, in arrival order
    pub fn events(&self) -> Vec<ImageEvent> {
        self.state.lock().events.clone()
    }

    /// Event kinds received, in arrival order
    pub fn event_kinds(&self) -> Vec<&'static str> {
        self.state.lock().events.iter().map(ImageEvent::kind).collect()
    }

    /// Contexts handed back with each delivery
    pub fn contexts(&self) -> Vec<CallerContext> {
        self.state.lock().contexts.clone()
    }

    /// Number of completion events received (terminal or not)
    pub fn completions(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, ImageEvent::Complete { .. }))
            .count()
    }

    /// Whether a failure asked caching recipients to discard the resource
    pub fn should_discard(&self) -> bool {
        self.state
            .lock()
            .status
            .failure
            .as_ref()
            .is_some_and(|f| f.discard)
    }

    /// Wake every waiter with [`WaitError::Interrupted`]
    pub fn interrupt(&self) {
        self.update(|status| status.interrupted = true);
    }

    /// Block until dimensions are known
    pub fn wait_dimensions(&self, timeout: Option<Duration>) -> Result<(u32, u32), WaitError> {
        self.wait_until(timeout, |status| {
            if let Some(dims) = status.dimensions {
                return Some(Ok(dims));
            }
            status.result().map(|r| r.map(|_| (0, 0)))
        })
    }

    /// Block until a final completion arrives
    pub fn wait_done(&self, timeout: Option<Duration>) -> Result<ObserverStatus, WaitError> {
        self.wait_until(timeout, |status| {
            status.result().map(|r| r.map(|_| status.clone()))
        })
    }

    /// Wait asynchronously until dimensions are known
    pub async fn dimensions(&self) -> Result<(u32, u32), WaitError> {
        let mut rx = self.watch.subscribe();
        let status = rx
            .wait_for(|s| s.dimensions.is_some() || s.result().is_some())
            .await
            .map_err(|_| WaitError::Interrupted)?;

        match status.dimensions {
            Some(dims) => Ok(dims),
            None => match status.result() {
                Some(Err(e)) => Err(e),
                _ => Err(WaitError::Interrupted),
            },
        }
    }

    /// Wait asynchronously until a final completion arrives
    pub async fn done(&self) -> Result<ObserverStatus, WaitError> {
        let mut rx = self.watch.subscribe();
        let status = rx
            .wait_for(|s| s.result().is_some())
            .await
            .map_err(|_| WaitError::Interrupted)?;

        match status.result() {
            Some(Err(e)) => Err(e),
            _ => Ok(status.clone()),
        }
    }

    fn wait_until<T>(
        &self,
        timeout: Option<Duration>,
        mut ready: impl FnMut(&ObserverStatus) -> Option<Result<T, WaitError>>,
    ) -> Result<T, WaitError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();

        loop {
            if let Some(result) = ready(&state.status) {
                return result;
            }
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut state, deadline).timed_out() {
                        return ready(&state.status).unwrap_or(Err(WaitError::TimedOut));
                    }
                }
                None => self.changed.wait(&mut state),
            }
        }
    }

    fn update(&self, apply: impl Fn(&mut ObserverStatus)) {
        {
            let mut state = self.state.lock();
            apply(&mut state.status);
            self.changed.notify_all();
        }
        self.watch.send_modify(|status| apply(status));
    }
}

impl Default for ImageObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageConsumer for ImageObserver {
    fn on_event(&self, event: &ImageEvent, context: &CallerContext) {
        {
            let mut state = self.state.lock();
            state.events.push(event.clone());
            state.contexts.push(*context);
        }

        self.update(|status| match event {
            ImageEvent::Dimensions { width, height } => status.dimensions = Some((*width, *height)),
            ImageEvent::Properties(props) => status.properties = Some(props.clone()),
            ImageEvent::ColorModel(model) => status.color_model = Some(model.clone()),
            ImageEvent::Hints(hints) => status.hints = Some(*hints),
            ImageEvent::Pixels(_) => status.pixel_blocks += 1,
            ImageEvent::Complete { status: done, is_final } => {
                match done {
                    CompletionStatus::Error(failure) => status.failure = Some(failure.clone()),
                    CompletionStatus::FrameDone | CompletionStatus::ImageDone => status.frames += 1,
                }
                if *is_final {
                    status.done = true;
                }
            }
        });
    }

    fn is_caching(&self) -> bool {
        self.caching
    }
}
