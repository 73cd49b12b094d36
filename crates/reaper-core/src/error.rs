// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Boxed error returned by external rule loaders
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Policy construction error type
///
/// Every variant is fatal to construction. The owning process is expected to
/// report it and exit non-zero.
#[derive(Error, Debug, Diagnostic)]
pub enum PolicyError {
    /// A scalar value could not be parsed
    #[error("invalid {key}: {reason}")]
    #[diagnostic(
        code(reaper::malformed_value),
        help("Check the value of {key}")
    )]
    MalformedValue {
        #[allow(unused)]
        key: String,
        #[allow(unused)]
        value: String,
        #[allow(unused)]
        reason: String,
    },

    /// One half of a paired option was given without the other
    #[error("{message}")]
    #[diagnostic(
        code(reaper::missing_paired_option),
        help("Set both the key and the values variable, or neither")
    )]
    MissingPairedOption {
        #[allow(unused)]
        message: String,
    },

    /// The label grammar rejected a requirement
    #[error("{context}: {reason}")]
    #[diagnostic(
        code(reaper::selector_construction),
        help("Keys must be qualified names and values valid label values (at most 63 characters of [A-Za-z0-9-_.])")
    )]
    SelectorConstruction {
        #[allow(unused)]
        context: String,
        #[allow(unused)]
        reason: String,
    },

    /// Unrecognized pod sorting strategy
    #[error("unknown pod sorting strategy: {value}")]
    #[diagnostic(
        code(reaper::unknown_strategy),
        help("Use one of: random, oldest-first, youngest-first, pod-deletion-cost")
    )]
    UnknownStrategy {
        #[allow(unused)]
        value: String,
    },

    /// The external rule loader failed
    #[error("{message}")]
    #[diagnostic(
        code(reaper::rule_load),
        help("Check the rule configuration variables")
    )]
    RuleLoad {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<BoxError>,
    },
}

/// Result type for policy construction
pub type Result<T> = std::result::Result<T, PolicyError>;

impl PolicyError {
    /// Create a MalformedValue error
    pub fn malformed_value(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// The key variable is set but its values variable is not
    pub fn key_without_values(key_var: &str, values_var: &str) -> Self {
        Self::MissingPairedOption {
            message: format!("specified {} but not {}", key_var, values_var),
        }
    }

    /// The values variable is set but its key variable is not
    pub fn values_without_key(key_var: &str, values_var: &str) -> Self {
        Self::MissingPairedOption {
            message: format!("did not specify {} but did specify {}", key_var, values_var),
        }
    }

    /// Create a SelectorConstruction error
    pub fn selector_construction(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SelectorConstruction {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnknownStrategy error
    pub fn unknown_strategy(value: impl Into<String>) -> Self {
        Self::UnknownStrategy {
            value: value.into(),
        }
    }

    /// Wrap a rule loader failure
    pub fn rule_load(source: BoxError) -> Self {
        Self::RuleLoad {
            message: source.to_string(),
            source: Some(source),
        }
    }
}
