//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use gitopssets_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (GitOpsSet, generator specs, status)
//! - The generator trait, registry and parameter elements
//! - Reconciler types (Reconciler, ReconcilerError, etc.)
//! - The object store boundary
//! - Config types

// CRD types - most commonly used
pub use crate::crd::*;

// Generators - needed for implementing custom generator kinds
pub use crate::controller::generators::{
    Generator, GeneratorContext, GeneratorError, GeneratorRegistry, ParamValue, ParameterElement,
};

// Pipeline stages
pub use crate::controller::combine::{cartesian, OwnerInfo, RenderContext};
pub use crate::controller::render::{RenderError, RenderedResource, Renderer};

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    reconcile, render_gitopsset, run_pass, BackoffState, Reconciler, ReconcilerError,
};
pub use crate::controller::ErrorClass;

// Object store boundary
pub use crate::controller::store::{KubeStore, MemoryStore, ObjectStore, StoreError};

// Config types
pub use crate::config::{ControllerConfig, EmptyGeneratorsPolicy};
