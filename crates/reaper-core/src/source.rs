use std::collections::{BTreeMap, HashMap};

// Configuration keys
pub const ENV_NAMESPACE: &str = "NAMESPACE";
pub const ENV_GRACE_PERIOD: &str = "GRACE_PERIOD";
pub const ENV_SCHEDULE: &str = "SCHEDULE";
pub const ENV_RUN_DURATION: &str = "RUN_DURATION";
pub const ENV_EXCLUDE_LABEL_KEY: &str = "EXCLUDE_LABEL_KEY";
pub const ENV_EXCLUDE_LABEL_VALUES: &str = "EXCLUDE_LABEL_VALUES";
pub const ENV_REQUIRE_LABEL_KEY: &str = "REQUIRE_LABEL_KEY";
pub const ENV_REQUIRE_LABEL_VALUES: &str = "REQUIRE_LABEL_VALUES";
pub const ENV_REQUIRE_ANNOTATION_KEY: &str = "REQUIRE_ANNOTATION_KEY";
pub const ENV_REQUIRE_ANNOTATION_VALUES: &str = "REQUIRE_ANNOTATION_VALUES";
pub const ENV_DRY_RUN: &str = "DRY_RUN";
pub const ENV_MAX_PODS: &str = "MAX_PODS";
pub const ENV_POD_SORTING_STRATEGY: &str = "POD_SORTING_STRATEGY";
pub const ENV_EVICT: &str = "EVICT";

/// Read-only key/value lookup the policy is resolved from
///
/// `None` means the key is not set at all, which is distinct from a key set
/// to the empty string.
pub trait ConfigSource {
    /// Look up a key
    fn get(&self, key: &str) -> Option<String>;
}

/// A point-in-time copy of the process environment
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment
    ///
    /// Names and values that are not valid UTF-8 are converted lossily.
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect();
        Self { vars }
    }

    /// Number of captured variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigSource for EnvSnapshot {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl ConfigSource for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}
