//! # Generator Errors

use crate::controller::fetch::FetchError;
use crate::controller::store::StoreError;
use crate::controller::ErrorClass;
use thiserror::Error;

/// Errors raised while generating parameter elements
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator called without a GitOpsSet generator specification")]
    EmptyOwningObject,

    #[error("generator entry sets more than one generator: {0}")]
    AmbiguousGenerator(String),

    #[error("no generator registered for kind {0}")]
    Unregistered(String),

    #[error("list element {index} is not an object")]
    InvalidListElement { index: usize },

    #[error("name or labelSelector must be provided")]
    MissingConfigSource,

    #[error("unknown Config Kind {kind:?} {name:?}")]
    UnknownConfigKind { kind: String, name: String },

    #[error("invalid label selector: {0}")]
    InvalidSelector(String),

    #[error("failed to get {kind} {namespace}/{name}: {source}")]
    Lookup {
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("GitRepository {namespace}/{name} does not have an artifact")]
    NoArtifact { namespace: String, name: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("Secret {name} key {key} is not valid base64: {reason}")]
    InvalidSecretData {
        name: String,
        key: String,
        reason: String,
    },

    #[error("failed to read from archive file {path:?}: {reason}")]
    ReadFile { path: String, reason: String },

    #[error("failed to parse archive file {path:?}: {source}")]
    ParseFile {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("archive file {path:?} does not contain a mapping")]
    NotAMapping { path: String },

    #[error("invalid directory pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    #[error("unsupported headersRef kind {0:?}")]
    UnsupportedHeadersKind(String),

    #[error("invalid header {name:?} from {kind} {source_name}")]
    InvalidHeader {
        name: String,
        kind: String,
        source_name: String,
    },

    #[error("failed to fetch endpoint {endpoint}: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("got {status} response from endpoint {endpoint}: {body}")]
    HttpStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("failed to unmarshal JSON response from endpoint {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("failed to parse JSONPath {expression:?} for endpoint {endpoint}: {reason}")]
    InvalidJsonPath {
        expression: String,
        endpoint: String,
        reason: String,
    },

    #[error("{count} results found with expression {expression} accessing endpoint {endpoint}")]
    JsonPathResultCount {
        count: usize,
        expression: String,
        endpoint: String,
    },

    #[error("JSONPath {expression} did not generate a suitable array accessing endpoint {endpoint}")]
    JsonPathNotArray {
        expression: String,
        endpoint: String,
    },

    #[error("JSONPath {expression} did not generate suitable values accessing endpoint {endpoint}")]
    JsonPathNotObjects {
        expression: String,
        endpoint: String,
    },

    #[error("invalid interval {value:?}: {reason}")]
    InvalidInterval { value: String, reason: String },
}

impl GeneratorError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::EmptyOwningObject
            | Self::AmbiguousGenerator(_)
            | Self::Unregistered(_)
            | Self::InvalidListElement { .. }
            | Self::MissingConfigSource
            | Self::UnknownConfigKind { .. }
            | Self::InvalidSelector(_)
            | Self::InvalidPattern { .. }
            | Self::InvalidEndpoint { .. }
            | Self::InvalidMethod(_)
            | Self::UnsupportedHeadersKind(_)
            | Self::InvalidJsonPath { .. }
            | Self::InvalidInterval { .. } => ErrorClass::Configuration,
            Self::Lookup { .. }
            | Self::NotFound { .. }
            | Self::NoArtifact { .. }
            | Self::Scratch(_)
            | Self::Http { .. } => ErrorClass::Transient,
            Self::HttpStatus { status, .. } if *status >= 500 || *status == 429 => {
                ErrorClass::Transient
            }
            Self::Fetch(e) => e.class(),
            _ => ErrorClass::Data,
        }
    }
}
