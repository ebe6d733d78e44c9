//! # bridge-host
//!
//! Reference host for the script bridge: configuration, a tick loop that
//! drives the dispatch table, a single-threaded script runtime, and the
//! bundled demo script.

pub mod config;
pub mod host;
pub mod runtime;
pub mod script;
