use crate::error::{PolicyError, Result};
use crate::source::{
    ConfigSource, ENV_EXCLUDE_LABEL_KEY, ENV_EXCLUDE_LABEL_VALUES, ENV_REQUIRE_ANNOTATION_KEY,
    ENV_REQUIRE_ANNOTATION_VALUES, ENV_REQUIRE_LABEL_KEY, ENV_REQUIRE_LABEL_VALUES,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Maximum length of a label value and of the name part of a key
const MAX_NAME_LENGTH: usize = 63;
/// Maximum length of a key prefix (DNS-1123 subdomain)
const MAX_PREFIX_LENGTH: usize = 253;

/// Set-based selector operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SelectorOperator {
    In,
    NotIn,
}

impl SelectorOperator {
    /// Operator name as used in `LabelSelectorRequirement`
    pub fn as_api_str(&self) -> &'static str {
        match self {
            SelectorOperator::In => "In",
            SelectorOperator::NotIn => "NotIn",
        }
    }
}

impl fmt::Display for SelectorOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorOperator::In => write!(f, "in"),
            SelectorOperator::NotIn => write!(f, "notin"),
        }
    }
}

/// A single `(key, operator, values)` match predicate
///
/// Evaluated against either a pod's labels or its annotations; the
/// requirement itself does not know which.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorRequirement {
    key: String,
    operator: SelectorOperator,
    values: Vec<String>,
}

impl SelectorRequirement {
    /// Create a requirement, validating the key and values against the
    /// label grammar
    pub fn new(
        key: impl Into<String>,
        operator: SelectorOperator,
        values: Vec<String>,
    ) -> std::result::Result<Self, String> {
        let key = key.into();

        validate_key(&key)?;

        if values.is_empty() {
            return Err("for 'in', 'notin' operators, values set can't be empty".to_string());
        }
        for (i, value) in values.iter().enumerate() {
            validate_value(value).map_err(|reason| {
                format!("values[{}]: Invalid value: {:?}: {}", i, value, reason)
            })?;
        }

        Ok(Self {
            key,
            operator,
            values,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> SelectorOperator {
        self.operator
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Check the requirement against a label or annotation map
    ///
    /// `In` needs the key present with one of the values. `NotIn` passes when
    /// the key is absent or holds none of the values.
    pub fn matches(&self, map: Option<&BTreeMap<String, String>>) -> bool {
        let actual = map.and_then(|m| m.get(&self.key));
        match (self.operator, actual) {
            (SelectorOperator::In, None) => false,
            (SelectorOperator::In, Some(v)) => self.values.contains(v),
            (SelectorOperator::NotIn, None) => true,
            (SelectorOperator::NotIn, Some(v)) => !self.values.contains(v),
        }
    }

    /// Convert into the API's `LabelSelectorRequirement`
    pub fn to_label_selector_requirement(&self) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: self.key.clone(),
            operator: self.operator.as_api_str().to_string(),
            values: Some(self.values.clone()),
        }
    }
}

impl fmt::Display for SelectorRequirement {
    /// Selector string syntax, e.g. `tier notin (prod,staging)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sorted: Vec<&str> = self.values.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        write!(f, "{} {} ({})", self.key, self.operator, sorted.join(","))
    }
}

/// A pair of configuration keys that together describe one requirement
#[derive(Debug, Clone, Copy)]
pub struct PairedOption {
    /// Variable holding the requirement key
    pub key_var: &'static str,
    /// Variable holding the comma separated values
    pub values_var: &'static str,
    /// Operator the requirement is built with
    pub operator: SelectorOperator,
    /// Prefix for grammar errors
    pub context: &'static str,
}

/// Pods whose label matches one of the values are never reaped
pub const EXCLUDE_LABEL: PairedOption = PairedOption {
    key_var: ENV_EXCLUDE_LABEL_KEY,
    values_var: ENV_EXCLUDE_LABEL_VALUES,
    operator: SelectorOperator::NotIn,
    context: "could not create exclusion label",
};

/// Only pods whose label matches one of the values are reaped
pub const REQUIRE_LABEL: PairedOption = PairedOption {
    key_var: ENV_REQUIRE_LABEL_KEY,
    values_var: ENV_REQUIRE_LABEL_VALUES,
    operator: SelectorOperator::In,
    context: "could not create requirement label",
};

/// Only pods whose annotation matches one of the values are reaped
pub const REQUIRE_ANNOTATION: PairedOption = PairedOption {
    key_var: ENV_REQUIRE_ANNOTATION_KEY,
    values_var: ENV_REQUIRE_ANNOTATION_VALUES,
    operator: SelectorOperator::In,
    context: "could not create annotation requirement",
};

/// Build the requirement described by a paired option
///
/// Neither variable set yields `None`. Exactly one set is an error naming
/// the missing one. Values are split on `,` verbatim: no trimming and no
/// dropping of empty entries.
pub fn build_requirement(
    source: &dyn ConfigSource,
    option: &PairedOption,
) -> Result<Option<SelectorRequirement>> {
    let key = source.get(option.key_var);
    let values = source.get(option.values_var);

    let (key, values) = match (key, values) {
        (None, None) => return Ok(None),
        (Some(_), None) => {
            return Err(PolicyError::key_without_values(
                option.key_var,
                option.values_var,
            ))
        }
        (None, Some(_)) => {
            return Err(PolicyError::values_without_key(
                option.key_var,
                option.values_var,
            ))
        }
        (Some(key), Some(values)) => (key, values),
    };

    let values: Vec<String> = values.split(',').map(str::to_string).collect();
    let requirement = SelectorRequirement::new(key, option.operator, values)
        .map_err(|reason| PolicyError::selector_construction(option.context, reason))?;

    debug!("{} resolved to '{}'", option.key_var, requirement);

    Ok(Some(requirement))
}

/// Validate a qualified name: an optional DNS-1123 subdomain prefix and `/`,
/// followed by a name part
fn validate_key(key: &str) -> std::result::Result<(), String> {
    let invalid = |reason: &str| format!("key: Invalid value: {:?}: {}", key, reason);

    let parts: Vec<&str> = key.split('/').collect();
    let name = match parts.as_slice() {
        [name] => name,
        [prefix, name] => {
            if prefix.is_empty() {
                return Err(invalid("prefix part must be non-empty"));
            }
            if !is_dns1123_subdomain(prefix) {
                return Err(invalid(
                    "prefix part a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, '-' or '.', and must start and end with an alphanumeric character",
                ));
            }
            name
        }
        _ => {
            return Err(invalid(
                "a qualified name must consist of alphanumeric characters, '-', '_' or '.', and must start and end with an alphanumeric character, with an optional DNS subdomain prefix and '/'",
            ))
        }
    };

    if name.is_empty() {
        return Err(invalid("name part must be non-empty"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(invalid("name part must be no more than 63 characters"));
    }
    if !is_name_part(name) {
        return Err(invalid(
            "name part must consist of alphanumeric characters, '-', '_' or '.', and must start and end with an alphanumeric character",
        ));
    }

    Ok(())
}

/// Validate a label value: empty, or a name part of at most 63 characters
fn validate_value(value: &str) -> std::result::Result<(), String> {
    if value.len() > MAX_NAME_LENGTH {
        return Err("must be no more than 63 characters".to_string());
    }
    if !value.is_empty() && !is_name_part(value) {
        return Err(
            "a valid label must be an empty string or consist of alphanumeric characters, '-', '_' or '.', and must start and end with an alphanumeric character"
                .to_string(),
        );
    }
    Ok(())
}

fn is_name_part(s: &str) -> bool {
    let bytes = s.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };

    first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn is_dns1123_subdomain(s: &str) -> bool {
    if s.len() > MAX_PREFIX_LENGTH {
        return false;
    }

    s.split('.').all(|label| {
        let bytes = label.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                (first.is_ascii_lowercase() || first.is_ascii_digit())
                    && (last.is_ascii_lowercase() || last.is_ascii_digit())
                    && bytes
                        .iter()
                        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
            }
            _ => false,
        }
    })
}
