//! # PipeSync Batch
//!
//! In-memory columnar batches and the reconciliation engine.
//!
//! This crate provides:
//! - [`Cell`] — the dynamic value type a batch cell can hold
//! - [`Batch`] — an ordered, named, typed set of columns
//! - [`coerce`] — forcing a batch into a pipe's declared dtypes, plus
//!   type inference for undeclared columns
//! - [`diff`] — the NULL-safe hash join that separates incoming rows
//!   into unseen and update sets
//!
//! ## Key Invariants
//!
//! - A coercion failure never drops a row; the offending cell is left
//!   unmodified
//! - The diff is a pure function of its inputs: no I/O, no suspension
//! - Two NULL join keys compare equal (sentinel substitution)

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod cell;
pub mod coerce;
pub mod diff;
mod error;

pub use batch::{Batch, Column};
pub use cell::Cell;
pub use diff::{reconcile, DiffResult};
pub use error::{BatchError, BatchResult};
