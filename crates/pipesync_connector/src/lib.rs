//! # PipeSync Connector
//!
//! The external-interface contracts and the reference backends.
//!
//! Three seams, all compile-time traits:
//!
//! - [`InstanceConnector`] — a backend that stores pipes: metadata
//!   registration plus diff-based row application
//! - [`SourceConnector`] — a backend pipes pull rows from
//! - [`SqlClient`] — the statement-execution seam a real driver
//!   implements
//!
//! Two instance connectors ship here: [`MemoryInstance`] (tables held
//! as batches, the reference implementation) and [`SqlInstance`]
//! (renders everything through `pipesync_sql` onto a client).
//! [`RecordingClient`] is the scripted client used by tests and the
//! CLI's plan command.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod recording;
mod sql_instance;
mod traits;
mod window;

pub use error::{ConnectorError, ConnectorResult};
pub use memory::MemoryInstance;
pub use recording::RecordingClient;
pub use sql_instance::SqlInstance;
pub use traits::{
    ChunkHook, FetchPayload, InstanceConnector, SourceConnector, SqlClient, SyncReceipt,
};
pub use window::SyncWindow;
