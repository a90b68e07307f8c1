//! CLI command implementations.

pub mod plan;
pub mod register;
pub mod show;
pub mod sync;
