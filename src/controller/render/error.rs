//! # Render Errors

use crate::controller::ErrorClass;
use thiserror::Error;

/// Problems translating Go-style template actions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("unclosed action starting at byte {0}")]
    UnclosedAction(usize),

    #[error("unterminated string in action {0:?}")]
    UnterminatedString(String),

    #[error("{0:?} actions are not supported")]
    UnsupportedAction(String),

    #[error("variables are not supported: {0}")]
    UnsupportedVariable(String),

    #[error("function {0:?} not defined")]
    UnknownFunction(String),

    #[error("{function} expects {expected} arguments, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("unexpected {token:?} in action {action:?}")]
    UnexpectedToken { token: String, action: String },

    #[error("unexpected {{{{end}}}}")]
    UnexpectedEnd,

    #[error("{{{{else}}}} outside of {{{{if}}}}")]
    UnexpectedElse,

    #[error("missing {{{{end}}}} for {0} open {{{{if}}}} action(s)")]
    MissingEnd(usize),
}

/// Errors raised while rendering templates
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to parse template {index}: {source}")]
    Translate {
        index: usize,
        #[source]
        source: TranslateError,
    },

    #[error("failed to compile template {index}: {reason}")]
    Compile { index: usize, reason: String },

    #[error("failed to render template {index}: template is empty: field {field} is not defined")]
    UndefinedField { index: usize, field: String },

    #[error("failed to render template {index}: {reason}")]
    Execute { index: usize, reason: String },

    #[error("failed to render template {index}: template is empty")]
    EmptyOutput { index: usize },

    #[error("rendered template {index} is not a mapping")]
    NotAMapping { index: usize },

    #[error("rendered template {index} is missing {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("rendered template {index} is not a valid object: {source}")]
    InvalidObject {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl RenderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Translate { .. } | Self::Compile { .. } => ErrorClass::Configuration,
            _ => ErrorClass::Data,
        }
    }

    /// Index of the template that failed
    pub fn template_index(&self) -> usize {
        match self {
            Self::Translate { index, .. }
            | Self::Compile { index, .. }
            | Self::UndefinedField { index, .. }
            | Self::Execute { index, .. }
            | Self::EmptyOutput { index }
            | Self::NotAMapping { index }
            | Self::MissingField { index, .. }
            | Self::InvalidObject { index, .. } => *index,
        }
    }
}
