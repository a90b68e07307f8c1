//! # PipeSync Testkit
//!
//! Test utilities for PipeSync.
//!
//! This crate provides:
//! - Property-based generators for batches, cells, and pipe keys
//! - Canned pipe and batch fixtures
//! - Scenario harnesses for end-to-end sync checks

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod scenario;

pub use fixtures::*;
pub use generators::*;
pub use scenario::*;
