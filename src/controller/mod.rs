//! # Controller
//!
//! Core GitOpsSet pipeline: generators feed the combiner, the combiner feeds
//! the renderer, and the reconciler applies what was rendered.

pub mod backoff;
pub mod combine;
pub mod duration;
pub mod fetch;
pub mod generators;
pub mod reconciler;
pub mod render;
pub mod store;

/// How a failure should be treated by the error policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The GitOpsSet itself is wrong; wait for it to change
    Configuration,
    /// Something outside may recover on its own; retry with backoff
    Transient,
    /// Inputs produced unusable output; retry with backoff
    Data,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Transient => "transient",
            Self::Data => "data",
        }
    }
}
