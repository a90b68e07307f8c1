//! # PipeSync Core
//!
//! The Pipe data model.
//!
//! A **pipe** is a named, addressable table of keyed or time-ordered
//! rows. Its identity is the triple (connector, metric, location) scoped
//! to an instance; its behavior is described by a nested parameter
//! document: column roles, dtypes, index definitions, flags, and an
//! optional fetch definition.
//!
//! ## Key Invariants
//!
//! - The identity triple plus instance is globally unique
//! - At most one `datetime` and one `primary` role
//! - `primary` takes precedence over other roles as the diff join key
//! - Dtypes are never silently narrowed, only widened or left unchanged

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod keys;
mod parameters;

pub use error::{PipeError, PipeResult};
pub use keys::PipeKeys;
pub use parameters::{ColumnRoles, DtypeChange, FetchDefinition, Pipe, PipeParameters};
