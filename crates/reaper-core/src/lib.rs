//! Reaper Core - Execution policy for the pod reaper
//!
//! This crate provides:
//! - Typed access to a configuration snapshot
//! - Scalar parsers (durations, booleans, counts)
//! - Label and annotation requirements built from paired options
//! - Pod ordering strategies
//! - Assembly of the immutable execution policy

pub mod error;
pub mod parse;
pub mod policy;
pub mod rules;
pub mod selector;
pub mod sorting;
pub mod source;

// Re-export commonly used types
pub use error::{BoxError, PolicyError, Result};
pub use parse::{duration_from_str, format_duration};
pub use policy::{load_policy, ExecutionPolicy, RemovalMode};
pub use rules::{NoRules, RuleLoader};
pub use selector::{SelectorOperator, SelectorRequirement};
pub use sorting::{sort_pods, PodCandidate, SharedRng, SortingStrategy};
pub use source::{ConfigSource, EnvSnapshot};

// Re-export k8s-openapi for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::Pod;
