//! # PipeSync Engine
//!
//! The sync orchestrator.
//!
//! [`SyncEngine`] drives one sync from source to target through the
//! state machine `Registering → Fetching → Coercing → Diffing →
//! Applying`, ending in `Succeeded`, `Retrying`, or `Failed`. The
//! public surface is a `(success, message)` [`SyncOutcome`]: backend
//! failures are classified by [`EngineError`] and folded into the
//! outcome, never propagated.
//!
//! Chunks are coerced and applied as they are pulled from the source,
//! so streaming sources are never materialized in full. Independent
//! chunks run on a bounded `std::thread::scope` pool capped by the
//! backend's concurrency headroom; apply-phase failures are retried
//! with a fixed delay per [`RetryConfig`], re-applying only the failed
//! chunk.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
pub mod inplace;
mod options;
mod state;

pub use engine::{SyncEngine, SyncSource};
pub use error::{EngineError, EngineResult};
pub use options::{RetryConfig, SyncOptions, DEFAULT_CHUNKSIZE};
pub use state::{SyncOutcome, SyncState, SyncStats};
