//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::fetch::{ArchiveFetcher, HttpArchiveFetcher};
use crate::controller::generators::{GeneratorContext, GeneratorError, GeneratorRegistry};
use crate::controller::render::{RenderError, Renderer};
use crate::controller::store::{KubeStore, ObjectStore, StoreError};
use crate::controller::ErrorClass;
use crate::crd::GitOpsSet;
use anyhow::{Context, Result};
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Generate(#[from] GeneratorError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to apply {resource}: {source}")]
    Apply {
        resource: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to prune {resource}: {source}")]
    Prune {
        resource: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to update GitOpsSet: {0}")]
    Store(#[source] StoreError),

    #[error("duplicate resource {0} rendered")]
    DuplicateResource(String),

    #[error("reconciliation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

impl ReconcilerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Generate(e) => e.class(),
            Self::Render(e) => e.class(),
            Self::Apply { source, .. } | Self::Prune { source, .. } | Self::Store(source) => {
                match source {
                    StoreError::InvalidObject(_) | StoreError::Serialization(_) => ErrorClass::Data,
                    _ => ErrorClass::Transient,
                }
            }
            Self::DuplicateResource(_) => ErrorClass::Data,
            Self::Timeout(_) | Self::ReconciliationFailed(_) => ErrorClass::Transient,
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::from_minutes(min_minutes, max_minutes),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared reconciliation context
#[derive(Clone)]
pub struct Reconciler {
    pub store: Arc<dyn ObjectStore>,
    pub http: reqwest::Client,
    pub fetcher: Arc<dyn ArchiveFetcher>,
    pub generators: GeneratorRegistry,
    pub renderer: Arc<Renderer>,
    pub config: ControllerConfig,
    // Backoff state per resource (identified by namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &self.store)
            .field("generators", &self.generators)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Reconciler talking to the cluster behind `client`
    pub fn new(client: Client, config: ControllerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        let fetcher = HttpArchiveFetcher::new(http.clone(), config.fetch_config());
        Ok(Self::with_parts(
            Arc::new(KubeStore::new(client)),
            http,
            Arc::new(fetcher),
            config,
        ))
    }

    /// Reconciler over explicit collaborators
    pub fn with_parts(
        store: Arc<dyn ObjectStore>,
        http: reqwest::Client,
        fetcher: Arc<dyn ArchiveFetcher>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            http,
            fetcher,
            generators: GeneratorRegistry::standard(),
            renderer: Arc::new(Renderer::new()),
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn with_generators(mut self, generators: GeneratorRegistry) -> Self {
        self.generators = generators;
        self
    }

    /// Generator context for one GitOpsSet
    pub fn generator_context<'a>(&'a self, owner: &'a GitOpsSet) -> GeneratorContext<'a> {
        GeneratorContext {
            store: self.store.as_ref(),
            http: &self.http,
            fetcher: self.fetcher.as_ref(),
            owner,
        }
    }

    /// Record a failure for `key` and return how long to wait before retrying
    pub fn next_error_backoff(&self, key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(key.to_string()).or_insert_with(|| {
                    BackoffState::new(
                        self.config.error_backoff_min_minutes,
                        self.config.error_backoff_max_minutes,
                    )
                });
                state.increment_error();
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (Duration::from_secs(60), 0)
            }
        }
    }

    /// Forget failures for `key`, returning whether there were any
    pub fn reset_backoff(&self, key: &str) -> bool {
        match self.backoff_states.lock() {
            Ok(mut states) => states
                .get_mut(key)
                .map(|state| {
                    let had_errors = state.error_count > 0;
                    state.reset();
                    had_errors
                })
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// Key used for per-resource state
pub fn resource_key(gitopsset: &GitOpsSet) -> String {
    format!(
        "{}/{}",
        gitopsset.metadata.namespace.as_deref().unwrap_or("default"),
        gitopsset.metadata.name.as_deref().unwrap_or("unknown")
    )
}
