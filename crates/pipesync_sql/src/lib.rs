//! # PipeSync SQL
//!
//! Dialect-aware query building.
//!
//! Every function takes a [`Flavor`](pipesync_types::Flavor) and returns
//! SQL text (a statement sequence where a backend needs one). Nothing in
//! this crate executes anything; execution lives behind the connector
//! seam.
//!
//! ## Key Invariants
//!
//! - Identifiers are always escaped per backend
//! - Join predicates on nullable columns wrap both sides in `COALESCE`
//!   with the type-specific sentinel, because raw SQL NULL equality
//!   silently drops matches
//! - Ephemeral table names derive from a per-attempt [`TransactionId`]

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ddl;
pub mod dml;
mod error;
pub mod inplace;
mod quote;
mod txid;

pub use error::{SqlBuildError, SqlBuildResult};
pub use quote::{literal, quote_ident, table_ref};
pub use txid::TransactionId;
