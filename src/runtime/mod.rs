//! # Runtime
//!
//! Process-level wiring: startup, the watch loop, error policy and the
//! mapping from watched inputs to the GitOpsSets that depend on them.

pub mod error_policy;
pub mod initialization;
pub mod triggers;
pub mod watch_loop;
