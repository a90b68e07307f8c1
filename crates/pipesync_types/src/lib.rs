//! # PipeSync Types
//!
//! Logical type registry for the PipeSync engine.
//!
//! This crate provides:
//! - The canonical [`LogicalType`] set shared by every backend
//! - The [`Flavor`] enum describing each supported SQL backend and its
//!   capabilities
//! - Bidirectional mapping between logical types and native column types
//! - A width-insensitive equivalence relation used to avoid spurious
//!   schema churn
//! - The widening lattice used for schema evolution
//! - The configurable [`SentinelPolicy`] used for NULL-safe join keys
//!
//! ## Key Invariants
//!
//! - An unrecognized native type maps to `String` with a warning, never
//!   an error
//! - Equivalence treats all width variants of a family as equal
//! - Widening never narrows: `widens_to` only moves up the lattice

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod flavor;
mod logical;
mod sentinel;

pub use flavor::{Flavor, UnknownFlavor};
pub use logical::LogicalType;
pub use sentinel::SentinelPolicy;
