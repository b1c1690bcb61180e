//! Multi-consumer streaming image decode pipeline
//!
//! An [`ImageSource`] turns a byte stream into progressively delivered pixel
//! data for any number of independent [`ImageConsumer`]s. Decoding runs on a
//! background [`DecodePool`]; consumers may join or leave at any time,
//! including from inside their own delivery callbacks.
//!
//! # Architecture
//!
//! ```text
//!                        ImageSource (per resource)
//!                   ┌───────────────────────────────┐
//!   register() ───► │ live: ConsumerList            │
//!   unregister() ─► │ passes: [PassRecord {         │
//!                   │   snapshot, catchup, abort }] │
//!                   │ active / queued               │
//!                   └───────────────┬───────────────┘
//!                                   │ schedule()
//!                                   ▼
//!                             [WorkerPool] ── fetch() on a worker thread
//!                                   │
//!                 sniff ─► SignatureTable ─► DecodeEngine::run()
//!                                   │
//!                             Broadcaster ──► snapshot, newest first
//!                                   │
//!                ┌──────────────────┼──────────────────┐
//!                ▼                  ▼                  ▼
//!           [Consumer]         [Consumer]         [Consumer]
//! ```
//!
//! Each pass decodes against a snapshot of the consumers registered when it
//! started. Pixel samples travel as `bytes::Bytes`, so every recipient of a
//! block shares the same allocation.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use imgstream_rs::{
//!     BytesProvider, CallerContext, ConsumerRef, ImageObserver, ImageSource, WorkerPool,
//! };
//!
//! # fn example(data: bytes::Bytes) -> imgstream_rs::Result<()> {
//! let pool = Arc::new(WorkerPool::new());
//! let source = ImageSource::new("logo.gif", Arc::new(BytesProvider::new(data)), pool);
//!
//! let observer = Arc::new(ImageObserver::new());
//! let consumer: ConsumerRef = observer.clone();
//! source.register(&consumer, CallerContext::Trusted, true)?;
//!
//! if let Ok((w, h)) = observer.wait_dimensions(Some(Duration::from_secs(5))) {
//!     println!("{}x{}", w, h);
//! }
//! # Ok(())
//! # }
//! ```

pub mod consumer;
pub mod decode;
pub mod error;
pub mod event;
pub mod pool;
pub mod security;
pub mod source;
pub mod stats;
pub mod stream;

pub use consumer::{ConsumerRef, ImageConsumer, ImageObserver, ObserverStatus, WaitError};
pub use decode::{Broadcaster, DecodeEngine, DecodeError, EngineOutcome, SignatureTable};
pub use error::{Error, Result};
pub use event::{
    ColorModel, CompletionStatus, DecodeFailure, FailureKind, Hints, ImageEvent, Palette,
    PixelBlock, Properties, Rect,
};
pub use pool::{DecodePool, DecodeUnit, PoolConfig, Priority, WorkerHandle, WorkerPool};
pub use security::{CallerContext, IdentityProvider, ScopePolicy, SecurityContext, TrustAll};
pub use source::{ImageSource, SourceBuilder, SourceConfig, SourceKey, SourcePhase};
pub use stats::{PoolStats, SourceStats};
pub use stream::{
    AbortSignal, BytesProvider, FileProvider, ImageStream, StreamBuffer, StreamProvider,
};
