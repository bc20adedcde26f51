//! # Renderer
//!
//! Every string in a template is a Go-style text template. Actions are
//! translated to minijinja, rendered per element, and the rendered strings
//! are reassembled into resource manifests.

mod engine;
mod error;
mod functions;
mod translate;

pub use engine::{RenderedResource, Renderer};
pub use error::{RenderError, TranslateError};
pub use functions::sanitize;
pub use translate::{translate, Translated};
