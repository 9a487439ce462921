//! Declarative rule conditions
//!
//! Lets rules be described in configuration instead of code. Every condition
//! compiles into a pure [`Predicate`] over a [`QueueSnapshot`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::rule::Predicate;
use super::snapshot::QueueSnapshot;

/// Condition under which a configured rule applies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RuleCondition {
    #[default]
    Always,
    Never,
    /// Queue holds strictly more than `threshold` items
    LengthAbove { queue: String, threshold: usize },
    /// Queue holds strictly fewer than `threshold` items
    LengthBelow { queue: String, threshold: usize },
    IsEmpty { queue: String },
    NonEmpty { queue: String },
    All { of: Vec<RuleCondition> },
    Any { of: Vec<RuleCondition> },
    Not { condition: Box<RuleCondition> },
}

impl RuleCondition {
    /// Evaluate against a snapshot
    pub fn evaluate(&self, snapshot: &QueueSnapshot<'_>) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::LengthAbove { queue, threshold } => snapshot.len(queue) > *threshold,
            Self::LengthBelow { queue, threshold } => snapshot.len(queue) < *threshold,
            Self::IsEmpty { queue } => snapshot.is_empty(queue),
            Self::NonEmpty { queue } => !snapshot.is_empty(queue),
            Self::All { of } => of.iter().all(|c| c.evaluate(snapshot)),
            Self::Any { of } => of.iter().any(|c| c.evaluate(snapshot)),
            Self::Not { condition } => !condition.evaluate(snapshot),
        }
    }

    /// Queue names this condition inspects
    pub fn referenced_queues(&self) -> Vec<&str> {
        match self {
            Self::Always | Self::Never => Vec::new(),
            Self::LengthAbove { queue, .. }
            | Self::LengthBelow { queue, .. }
            | Self::IsEmpty { queue }
            | Self::NonEmpty { queue } => vec![queue.as_str()],
            Self::All { of } | Self::Any { of } => of.iter().flat_map(|c| c.referenced_queues()).collect(),
            Self::Not { condition } => condition.referenced_queues(),
        }
    }

    /// Compile into a shareable predicate
    pub fn into_predicate(self) -> Predicate {
        Arc::new(move |snapshot: &QueueSnapshot<'_>| self.evaluate(snapshot))
    }
}
