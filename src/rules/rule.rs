//! Weighted dispatch rules

use std::sync::Arc;

use super::snapshot::QueueSnapshot;
use super::tier::PriorityTier;

/// Pure applicability test over a queue snapshot
pub type Predicate = Arc<dyn Fn(&QueueSnapshot<'_>) -> bool + Send + Sync>;

/// A rule adds `weight` to the score of `queue` in its tier whenever its
/// predicate holds for the current snapshot.
#[derive(Clone)]
pub struct Rule {
    tier: PriorityTier,
    queue: String,
    weight: i64,
    predicate: Predicate,
}

impl Rule {
    /// Create a rule with a custom predicate
    pub fn new<F>(tier: PriorityTier, queue: impl Into<String>, weight: i64, predicate: F) -> Self
    where
        F: Fn(&QueueSnapshot<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            tier,
            queue: queue.into(),
            weight,
            predicate: Arc::new(predicate),
        }
    }

    /// Create a rule from an already shared predicate
    pub fn with_predicate(tier: PriorityTier, queue: impl Into<String>, weight: i64, predicate: Predicate) -> Self {
        Self {
            tier,
            queue: queue.into(),
            weight,
            predicate,
        }
    }

    /// Create a rule that always applies
    pub fn always(tier: PriorityTier, queue: impl Into<String>, weight: i64) -> Self {
        Self::new(tier, queue, weight, |_| true)
    }

    pub fn tier(&self) -> PriorityTier {
        self.tier
    }

    /// Name of the queue this rule scores
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn weight(&self) -> i64 {
        self.weight
    }

    /// Evaluate the predicate against a snapshot
    pub fn applies(&self, snapshot: &QueueSnapshot<'_>) -> bool {
        (self.predicate)(snapshot)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("tier", &self.tier)
            .field("queue", &self.queue)
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use serde_json::{Value, json};

    use super::*;
    use crate::rules::snapshot::QueueView;

    #[test]
    fn test_rule_predicate_sees_snapshot() {
        let items: VecDeque<Value> = VecDeque::from(vec![json!("x"), json!("y")]);
        let snapshot = QueueSnapshot::new(vec![QueueView {
            name: "test2",
            items: &items,
        }]);

        let rule = Rule::new(PriorityTier::High, "test2", 1, |q| q.len("test2") > 1);
        assert!(rule.applies(&snapshot));

        let strict = Rule::new(PriorityTier::High, "test2", 1, |q| q.len("test2") > 2);
        assert!(!strict.applies(&snapshot));
    }

    #[test]
    fn test_always_rule() {
        let rule = Rule::always(PriorityTier::Low, "a", -3);
        assert!(rule.applies(&QueueSnapshot::default()));
        assert_eq!(rule.tier(), PriorityTier::Low);
        assert_eq!(rule.queue(), "a");
        assert_eq!(rule.weight(), -3);
    }

    #[test]
    fn test_rule_debug_omits_predicate() {
        let rule = Rule::always(PriorityTier::High, "a", 1);
        let text = format!("{:?}", rule);
        assert!(text.contains("High"));
        assert!(text.contains("\"a\""));
    }
}
