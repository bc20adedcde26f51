//! GitOpsSets Controller Library
//!
//! This library provides the core functionality for the GitOpsSets controller:
//! generators produce parameter elements, the combiner multiplies them, the
//! renderer expands resource templates, and the reconciler keeps the rendered
//! resources in sync with the cluster.
//!
//! ## Quick Start
//!
//! ```rust
//! use gitopssets_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;
