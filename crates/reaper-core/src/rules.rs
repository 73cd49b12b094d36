use crate::error::BoxError;
use crate::source::ConfigSource;

/// Loads the rule set that decides per-pod eligibility beyond selectors
///
/// The rules themselves are opaque to the policy; they are carried through
/// to whoever evaluates them.
pub trait RuleLoader {
    type Rules;

    /// Load rules from the same configuration snapshot as the policy
    fn load_rules(&self, source: &dyn ConfigSource) -> Result<Self::Rules, BoxError>;
}

impl<F, R> RuleLoader for F
where
    F: Fn(&dyn ConfigSource) -> Result<R, BoxError>,
{
    type Rules = R;

    fn load_rules(&self, source: &dyn ConfigSource) -> Result<R, BoxError> {
        self(source)
    }
}

/// Loader for callers that evaluate rules elsewhere
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRules;

impl RuleLoader for NoRules {
    type Rules = ();

    fn load_rules(&self, _source: &dyn ConfigSource) -> Result<(), BoxError> {
        Ok(())
    }
}
