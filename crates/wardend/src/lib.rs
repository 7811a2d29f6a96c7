//! Daemon internals — configuration loading and the built-in target kinds.
//!
//! Exposed as a library so integration tests can drive the same wiring the
//! `wardend` binary uses.

pub mod config;
pub mod targets;
