use crate::error::{PolicyError, Result};
use crate::parse::{
    format_duration, parse_bool, parse_duration, parse_non_negative_int, parse_optional_seconds,
};
use crate::rules::RuleLoader;
use crate::selector::{
    build_requirement, SelectorRequirement, EXCLUDE_LABEL, REQUIRE_ANNOTATION, REQUIRE_LABEL,
};
use crate::sorting::{sort_pods, PodCandidate, SharedRng, SortingStrategy};
use crate::source::{
    ConfigSource, ENV_DRY_RUN, ENV_EVICT, ENV_GRACE_PERIOD, ENV_MAX_PODS, ENV_NAMESPACE,
    ENV_POD_SORTING_STRATEGY, ENV_RUN_DURATION, ENV_SCHEDULE,
};
use chrono::Duration;
use serde::{Serialize, Serializer};
use tracing::debug;

/// Schedule used when SCHEDULE is not set
pub const DEFAULT_SCHEDULE: &str = "@every 1m";
/// Run duration used when RUN_DURATION is not set
pub const DEFAULT_RUN_DURATION: &str = "0s";

/// How a selected pod is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalMode {
    /// Direct deletion, bypassing disruption budgets
    Delete,
    /// The eviction subresource, honouring disruption budgets
    Evict,
}

/// Everything a reaping cycle needs to know, resolved once from configuration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPolicy<R = ()> {
    namespace: String,
    grace_period_seconds: Option<i64>,
    schedule: String,
    #[serde(serialize_with = "serialize_duration")]
    run_duration: Duration,
    exclusion_requirement: Option<SelectorRequirement>,
    required_label_requirement: Option<SelectorRequirement>,
    required_annotation_requirement: Option<SelectorRequirement>,
    dry_run: bool,
    max_pods: usize,
    sorting_strategy: SortingStrategy,
    evict: bool,
    #[serde(skip)]
    rules: R,
}

/// Resolve the policy from a configuration snapshot
///
/// Values are resolved in a fixed order and the first failure is returned
/// as-is; there is no partial policy.
pub fn load_policy<L: RuleLoader>(
    source: &dyn ConfigSource,
    rule_loader: &L,
) -> Result<ExecutionPolicy<L::Rules>> {
    let namespace = source.get(ENV_NAMESPACE).unwrap_or_default();

    let grace_period_seconds =
        parse_optional_seconds(ENV_GRACE_PERIOD, source.get(ENV_GRACE_PERIOD).as_deref())?;

    let schedule = source
        .get(ENV_SCHEDULE)
        .unwrap_or_else(|| DEFAULT_SCHEDULE.to_string());

    let run_duration = parse_duration(
        ENV_RUN_DURATION,
        source.get(ENV_RUN_DURATION).as_deref(),
        DEFAULT_RUN_DURATION,
    )?;

    let exclusion_requirement = build_requirement(source, &EXCLUDE_LABEL)?;
    let required_label_requirement = build_requirement(source, &REQUIRE_LABEL)?;
    let required_annotation_requirement = build_requirement(source, &REQUIRE_ANNOTATION)?;

    let dry_run = parse_bool(ENV_DRY_RUN, source.get(ENV_DRY_RUN).as_deref(), false)?;
    let max_pods = parse_non_negative_int(ENV_MAX_PODS, source.get(ENV_MAX_PODS).as_deref(), 0)?;
    let evict = parse_bool(ENV_EVICT, source.get(ENV_EVICT).as_deref(), false)?;

    let sorting_strategy =
        SortingStrategy::from_config(source.get(ENV_POD_SORTING_STRATEGY).as_deref())?;

    let rules = rule_loader
        .load_rules(source)
        .map_err(PolicyError::rule_load)?;

    debug!(
        "Resolved policy: namespace='{}', schedule='{}', dry_run={}, max_pods={}, strategy={}, evict={}",
        namespace, schedule, dry_run, max_pods, sorting_strategy, evict
    );

    Ok(ExecutionPolicy {
        namespace,
        grace_period_seconds,
        schedule,
        run_duration,
        exclusion_requirement,
        required_label_requirement,
        required_annotation_requirement,
        dry_run,
        max_pods,
        sorting_strategy,
        evict,
        rules,
    })
}

impl<R> ExecutionPolicy<R> {
    /// Namespace to scan; empty means all namespaces
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Deletion grace period; `None` means the cluster default
    pub fn grace_period_seconds(&self) -> Option<i64> {
        self.grace_period_seconds
    }

    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    pub fn run_duration(&self) -> Duration {
        self.run_duration
    }

    pub fn exclusion_requirement(&self) -> Option<&SelectorRequirement> {
        self.exclusion_requirement.as_ref()
    }

    pub fn required_label_requirement(&self) -> Option<&SelectorRequirement> {
        self.required_label_requirement.as_ref()
    }

    /// Applied to annotations, not labels
    pub fn required_annotation_requirement(&self) -> Option<&SelectorRequirement> {
        self.required_annotation_requirement.as_ref()
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Cap on pods removed per cycle; 0 means unlimited
    pub fn max_pods(&self) -> usize {
        self.max_pods
    }

    pub fn sorting_strategy(&self) -> SortingStrategy {
        self.sorting_strategy
    }

    pub fn evict(&self) -> bool {
        self.evict
    }

    pub fn removal_mode(&self) -> RemovalMode {
        if self.evict {
            RemovalMode::Evict
        } else {
            RemovalMode::Delete
        }
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    /// Label selector string for the pod list call
    ///
    /// Combines the exclusion and required-label requirements. The annotation
    /// requirement cannot be expressed here and is checked by [`Self::admits`].
    pub fn label_selector(&self) -> Option<String> {
        let parts: Vec<String> = [
            self.exclusion_requirement.as_ref(),
            self.required_label_requirement.as_ref(),
        ]
        .into_iter()
        .flatten()
        .map(ToString::to_string)
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(","))
        }
    }

    /// Whether a pod satisfies every configured requirement
    pub fn admits<P: PodCandidate>(&self, pod: &P) -> bool {
        let labels = pod.labels();
        let annotations = pod.annotations();

        self.exclusion_requirement
            .as_ref()
            .map_or(true, |r| r.matches(labels))
            && self
                .required_label_requirement
                .as_ref()
                .map_or(true, |r| r.matches(labels))
            && self
                .required_annotation_requirement
                .as_ref()
                .map_or(true, |r| r.matches(annotations))
    }

    /// Pick the pods to remove this cycle
    ///
    /// Drops pods the requirements reject, orders the rest with the configured
    /// strategy and keeps at most `max_pods` of them.
    pub fn select_victims<P: PodCandidate>(&self, pods: Vec<P>, rng: &SharedRng) -> Vec<P> {
        let total = pods.len();
        let mut victims: Vec<P> = pods.into_iter().filter(|p| self.admits(p)).collect();

        sort_pods(self.sorting_strategy, &mut victims, rng);

        if self.max_pods > 0 {
            victims.truncate(self.max_pods);
        }

        debug!(
            "Selected {} of {} pods (max_pods={})",
            victims.len(),
            total,
            self.max_pods
        );

        victims
    }
}

fn serialize_duration<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(*duration))
}
