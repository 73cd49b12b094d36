use crate::error::{PolicyError, Result};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Annotation the ReplicaSet controller uses to rank pods for scale-down
pub const POD_DELETION_COST_ANNOTATION: &str = "controller.kubernetes.io/pod-deletion-cost";

/// The parts of a pod the policy looks at
pub trait PodCandidate {
    /// When the pod was started, if it has been
    fn start_time(&self) -> Option<DateTime<Utc>>;

    /// Pod labels
    fn labels(&self) -> Option<&BTreeMap<String, String>>;

    /// Pod annotations
    fn annotations(&self) -> Option<&BTreeMap<String, String>>;
}

impl PodCandidate for Pod {
    fn start_time(&self) -> Option<DateTime<Utc>> {
        self.status
            .as_ref()
            .and_then(|s| s.start_time.as_ref())
            .map(|t| t.0)
    }

    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.labels.as_ref()
    }

    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }
}

/// Order in which eligible pods are picked when more are eligible than
/// `max_pods` allows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortingStrategy {
    /// Keep the order the pods were listed in
    #[default]
    None,
    Random,
    OldestFirst,
    YoungestFirst,
    PodDeletionCost,
}

impl SortingStrategy {
    /// Resolve the configured strategy; absent means no reordering
    pub fn from_config(raw: Option<&str>) -> Result<Self> {
        match raw {
            None => Ok(SortingStrategy::None),
            Some(value) => value.parse(),
        }
    }
}

impl FromStr for SortingStrategy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "random" => Ok(SortingStrategy::Random),
            "oldest-first" => Ok(SortingStrategy::OldestFirst),
            "youngest-first" => Ok(SortingStrategy::YoungestFirst),
            "pod-deletion-cost" => Ok(SortingStrategy::PodDeletionCost),
            other => Err(PolicyError::unknown_strategy(other)),
        }
    }
}

impl fmt::Display for SortingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortingStrategy::None => "none",
            SortingStrategy::Random => "random",
            SortingStrategy::OldestFirst => "oldest-first",
            SortingStrategy::YoungestFirst => "youngest-first",
            SortingStrategy::PodDeletionCost => "pod-deletion-cost",
        };
        f.write_str(name)
    }
}

/// Random source shared by every caller of the random strategy
///
/// Clones share one generator. Each shuffle holds the lock for its whole
/// permutation, so concurrent cycles never interleave draws.
#[derive(Debug, Clone)]
pub struct SharedRng {
    inner: Arc<Mutex<StdRng>>,
}

impl SharedRng {
    /// Generator seeded from the operating system
    pub fn from_entropy() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic generator for tests and reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rng)),
        }
    }

    /// Uniform in-place permutation (Fisher-Yates)
    pub fn shuffle<T>(&self, items: &mut [T]) {
        let mut rng = self.inner.lock();
        items.shuffle(&mut *rng);
    }
}

impl Default for SharedRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

/// Reorder candidates in place according to `strategy`
///
/// All deterministic strategies use a stable sort, so ties keep their input
/// order.
pub fn sort_pods<P: PodCandidate>(strategy: SortingStrategy, pods: &mut [P], rng: &SharedRng) {
    match strategy {
        SortingStrategy::None => {}
        SortingStrategy::Random => rng.shuffle(pods),
        SortingStrategy::OldestFirst => pods.sort_by(|a, b| compare_start(a, b, false)),
        SortingStrategy::YoungestFirst => pods.sort_by(|a, b| compare_start(a, b, true)),
        SortingStrategy::PodDeletionCost => pods.sort_by_key(deletion_cost),
    }

    debug!("Ordered {} pods using {} strategy", pods.len(), strategy);
}

/// Compare start times at whole-second resolution
///
/// A pod without a start time is never before another pod, and any pod with
/// a start time is before one without. Only the comparison of two present
/// timestamps flips for youngest-first; unstarted pods go last either way.
fn compare_start<P: PodCandidate>(a: &P, b: &P, youngest_first: bool) -> Ordering {
    let a = a.start_time().map(|t| t.timestamp());
    let b = b.start_time().map(|t| t.timestamp());

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) if youngest_first => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
    }
}

/// Pod deletion cost, 0 when missing or unparsable
pub fn deletion_cost<P: PodCandidate>(pod: &P) -> i32 {
    // Invalid values are rejected by the API server, so failures are not reported
    pod.annotations()
        .and_then(|a| a.get(POD_DELETION_COST_ANNOTATION))
        .map(|raw| parse_deletion_cost(raw))
        .unwrap_or(0)
}

/// Base-10 `i32`; syntactically valid but out of range numbers clamp to the
/// nearest bound, anything else is 0
fn parse_deletion_cost(raw: &str) -> i32 {
    let digits = raw
        .strip_prefix('-')
        .or_else(|| raw.strip_prefix('+'))
        .unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }

    match raw.parse::<i64>() {
        Ok(v) => v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
        Err(_) if raw.starts_with('-') => i32::MIN,
        Err(_) => i32::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn create_test_pod(name: &str, start: Option<i64>) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        if let Some(secs) = start {
            pod.status = Some(PodStatus {
                start_time: Some(Time(DateTime::from_timestamp(secs, 0).unwrap())),
                ..Default::default()
            });
        }
        pod
    }

    fn create_costed_pod(name: &str, cost: Option<&str>) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        if let Some(cost) = cost {
            let mut annotations = BTreeMap::new();
            annotations.insert(POD_DELETION_COST_ANNOTATION.to_string(), cost.to_string());
            pod.metadata.annotations = Some(annotations);
        }
        pod
    }

    fn names(pods: &[Pod]) -> Vec<&str> {
        pods.iter()
            .map(|p| p.metadata.name.as_deref().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_strategy_from_config() {
        assert_eq!(SortingStrategy::from_config(None).unwrap(), SortingStrategy::None);
        assert_eq!(
            SortingStrategy::from_config(Some("random")).unwrap(),
            SortingStrategy::Random
        );
        assert_eq!(
            SortingStrategy::from_config(Some("oldest-first")).unwrap(),
            SortingStrategy::OldestFirst
        );
        assert_eq!(
            SortingStrategy::from_config(Some("youngest-first")).unwrap(),
            SortingStrategy::YoungestFirst
        );
        assert_eq!(
            SortingStrategy::from_config(Some("pod-deletion-cost")).unwrap(),
            SortingStrategy::PodDeletionCost
        );

        for bad in ["bogus", "", "none", "Random"] {
            let err = SortingStrategy::from_config(Some(bad)).unwrap_err();
            assert!(matches!(err, PolicyError::UnknownStrategy { .. }), "{}", bad);
        }
    }

    #[test]
    fn test_no_strategy_keeps_order() {
        let mut pods = vec![
            create_test_pod("a", Some(200)),
            create_test_pod("b", None),
            create_test_pod("c", Some(100)),
        ];
        sort_pods(SortingStrategy::None, &mut pods, &SharedRng::seeded(1));
        assert_eq!(names(&pods), ["a", "b", "c"]);
    }

    #[test]
    fn test_oldest_first() {
        let mut pods = vec![
            create_test_pod("a", Some(200)),
            create_test_pod("b", None),
            create_test_pod("c", Some(100)),
        ];
        sort_pods(SortingStrategy::OldestFirst, &mut pods, &SharedRng::seeded(1));
        assert_eq!(names(&pods), ["c", "a", "b"]);
    }

    #[test]
    fn test_youngest_first_keeps_unstarted_last() {
        let mut pods = vec![
            create_test_pod("a", Some(200)),
            create_test_pod("b", None),
            create_test_pod("c", Some(100)),
        ];
        sort_pods(SortingStrategy::YoungestFirst, &mut pods, &SharedRng::seeded(1));
        assert_eq!(names(&pods), ["a", "c", "b"]);
    }

    #[test]
    fn test_start_time_ties_are_stable() {
        let mut pods = vec![
            create_test_pod("nil-1", None),
            create_test_pod("x", Some(100)),
            create_test_pod("nil-2", None),
            create_test_pod("y", Some(100)),
        ];
        // Same second, different sub-second offset
        pods[3].status.as_mut().unwrap().start_time =
            Some(Time(DateTime::from_timestamp(100, 500_000_000).unwrap()));

        let mut oldest = pods.clone();
        sort_pods(SortingStrategy::OldestFirst, &mut oldest, &SharedRng::seeded(1));
        assert_eq!(names(&oldest), ["x", "y", "nil-1", "nil-2"]);

        sort_pods(SortingStrategy::YoungestFirst, &mut pods, &SharedRng::seeded(1));
        assert_eq!(names(&pods), ["x", "y", "nil-1", "nil-2"]);
    }

    #[test]
    fn test_pod_deletion_cost() {
        let mut pods = vec![
            create_costed_pod("five", Some("5")),
            create_costed_pod("absent", None),
            create_costed_pod("bad", Some("bad")),
            create_costed_pod("negative", Some("-3")),
        ];
        sort_pods(SortingStrategy::PodDeletionCost, &mut pods, &SharedRng::seeded(1));
        assert_eq!(names(&pods), ["negative", "absent", "bad", "five"]);
    }

    #[test]
    fn test_parse_deletion_cost() {
        assert_eq!(parse_deletion_cost("42"), 42);
        assert_eq!(parse_deletion_cost("+42"), 42);
        assert_eq!(parse_deletion_cost("-42"), -42);
        assert_eq!(parse_deletion_cost(""), 0);
        assert_eq!(parse_deletion_cost("1.5"), 0);
        assert_eq!(parse_deletion_cost(" 1"), 0);
        assert_eq!(parse_deletion_cost("-"), 0);
        assert_eq!(parse_deletion_cost("3000000000"), i32::MAX);
        assert_eq!(parse_deletion_cost("-3000000000"), i32::MIN);
        assert_eq!(parse_deletion_cost("99999999999999999999999"), i32::MAX);
    }

    #[test]
    fn test_random_is_seeded_permutation() {
        let original: Vec<Pod> = (0..16)
            .map(|i| create_test_pod(&format!("pod-{}", i), Some(i)))
            .collect();

        let mut pods = original.clone();
        sort_pods(SortingStrategy::Random, &mut pods, &SharedRng::seeded(7));

        // Same seed, same permutation as a plain Fisher-Yates shuffle
        let mut expected = original.clone();
        expected.shuffle(&mut StdRng::seed_from_u64(7));
        assert_eq!(names(&pods), names(&expected));

        let mut sorted = names(&pods);
        sorted.sort_unstable();
        let mut all = names(&original);
        all.sort_unstable();
        assert_eq!(sorted, all);
    }

    #[test]
    fn test_shared_rng_clones_share_state() {
        let rng = SharedRng::seeded(3);
        let clone = rng.clone();

        let mut first: Vec<u32> = (0..32).collect();
        let mut second: Vec<u32> = (0..32).collect();
        rng.shuffle(&mut first);
        clone.shuffle(&mut second);

        // The clone continues the same stream rather than replaying it
        let mut direct = StdRng::seed_from_u64(3);
        let mut expected_first: Vec<u32> = (0..32).collect();
        let mut expected_second: Vec<u32> = (0..32).collect();
        expected_first.shuffle(&mut direct);
        expected_second.shuffle(&mut direct);
        assert_eq!(first, expected_first);
        assert_eq!(second, expected_second);
    }
}
