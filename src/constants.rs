//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Field manager name used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "gitopssets-controller";

/// Finalizer added to every GitOpsSet so managed resources are pruned on deletion
pub const FINALIZER: &str = "templates.weave.works/finalizer";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Minimum reconciliation error backoff (minutes)
pub const DEFAULT_ERROR_BACKOFF_MIN_MINUTES: u64 = 1;

/// Maximum reconciliation error backoff (minutes)
pub const DEFAULT_ERROR_BACKOFF_MAX_MINUTES: u64 = 10;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Default number of retries when downloading an artifact
pub const DEFAULT_FETCH_RETRIES: u32 = 9;

/// First delay between artifact download attempts (milliseconds)
pub const DEFAULT_FETCH_BACKOFF_MIN_MS: u64 = 1000;

/// Upper bound on the delay between artifact download attempts (milliseconds)
pub const DEFAULT_FETCH_BACKOFF_MAX_MS: u64 = 30_000;

/// Default timeout for outbound HTTP requests (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default upper bound on a single reconcile pass (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 300;

/// Default maximum concurrent reconciliations
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default poll interval for the APIClient generator
pub const DEFAULT_API_CLIENT_INTERVAL: &str = "5m";

/// Label carrying the name of the GitOpsSet that rendered a resource
pub const OWNER_NAME_LABEL: &str = "templates.weave.works/name";

/// Label carrying the namespace of the GitOpsSet that rendered a resource
pub const OWNER_NAMESPACE_LABEL: &str = "templates.weave.works/namespace";

/// Condition type reported on every GitOpsSet
pub const READY_CONDITION: &str = "Ready";

/// Reason reported when a reconciliation succeeds
pub const REASON_SUCCEEDED: &str = "ReconciliationSucceeded";

/// Reason reported when a reconciliation fails
pub const REASON_FAILED: &str = "ReconciliationFailed";

/// Reason reported while a GitOpsSet is suspended
pub const REASON_SUSPENDED: &str = "Suspended";
