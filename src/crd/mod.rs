//! # Custom Resource Definitions
//!
//! CRD types for the GitOpsSet controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - GitOpsSet specification and templates
//! - `generators.rs` - Generator variants
//! - `status.rs` - Status, conditions and resource inventory

mod generators;
mod spec;
mod status;

pub use generators::{
    APIClientGenerator, ClusterGenerator, ConfigGenerator, GeneratorKind, GitOpsSetGenerator,
    GitOpsSetNestedGenerator, GitRepositoryDirectoryItem, GitRepositoryFileItem,
    GitRepositoryGenerator, HeadersReference, ListGenerator, MatrixGenerator,
};
pub use spec::{GitOpsSet, GitOpsSetSpec, GitOpsSetTemplate};
pub use status::{Condition, GitOpsSetStatus, ResourceInventory, ResourceRef};

use schemars::{json_schema, Schema, SchemaGenerator};

/// Schema for free-form JSON objects kept as-is by the API server
pub(crate) fn preserve_unknown_object(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// Schema for arrays of free-form JSON values
pub(crate) fn preserve_unknown_array(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "array",
        "items": {
            "x-kubernetes-preserve-unknown-fields": true
        }
    })
}

/// Schema for a standard Kubernetes label selector
pub(crate) fn label_selector_schema(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "properties": {
            "matchLabels": {
                "type": "object",
                "additionalProperties": { "type": "string" }
            },
            "matchExpressions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["key", "operator"],
                    "properties": {
                        "key": { "type": "string" },
                        "operator": { "type": "string" },
                        "values": { "type": "array", "items": { "type": "string" } }
                    }
                }
            }
        }
    })
}
