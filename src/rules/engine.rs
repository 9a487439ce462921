//! Tiered weighted rule engine
//!
//! Picks the next queue to run. Each tier scores every queue by summing the
//! weights of its applicable rules; the first tier that yields a unique
//! maximum among non-empty queues decides. If no tier is decisive, the
//! first-registered non-empty queue is returned.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rule::Rule;
use super::snapshot::QueueSnapshot;
use super::tier::PriorityTier;

/// How a selection was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    /// A tier produced a single maximum-scoring queue
    Tier(PriorityTier),
    /// Every tier tied; registration order decided
    Fallback,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tier(tier) => write!(f, "{} tier", tier),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Result of a decisive evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub queue: String,
    pub decided_by: Decision,
    /// Winning score in the deciding tier (0 for fallback)
    pub score: i128,
}

/// Holds rules per tier, preserving registration order inside each tier
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    tiers: [Vec<Rule>; 3],
}

impl RuleEngine {
    /// Creates an empty rule engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Self::add_rule`]
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.add_rule(rule);
        self
    }

    /// Appends a rule to its tier
    pub fn add_rule(&mut self, rule: Rule) {
        debug!(tier = %rule.tier(), queue = %rule.queue(), weight = rule.weight(), "RuleEngine::add_rule: called");
        self.tiers[rule.tier().index()].push(rule);
    }

    /// Rules of one tier in registration order
    pub fn rules(&self, tier: PriorityTier) -> &[Rule] {
        &self.tiers[tier.index()]
    }

    /// Total number of rules across all tiers
    pub fn len(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-queue scores for one tier, in snapshot (registration) order
    ///
    /// Every queue starts at 0, empty ones included. Rules whose target is
    /// not in the snapshot are ignored. Sums are widened to `i128`, so they
    /// cannot overflow.
    pub fn scores<'a>(&self, snapshot: &QueueSnapshot<'a>, tier: PriorityTier) -> Vec<(&'a str, i128)> {
        let mut scores: Vec<(&'a str, i128)> = snapshot.names().map(|name| (name, 0)).collect();

        for rule in self.rules(tier) {
            let Some(slot) = scores.iter_mut().find(|(name, _)| *name == rule.queue()) else {
                continue;
            };
            if rule.applies(snapshot) {
                slot.1 += i128::from(rule.weight());
            }
        }

        scores
    }

    /// Select the next queue together with how it was chosen
    pub fn decide(&self, snapshot: &QueueSnapshot<'_>) -> Option<Selection> {
        if snapshot.all_empty() {
            debug!("RuleEngine::decide: all queues empty");
            return None;
        }

        for tier in PriorityTier::EVALUATION_ORDER {
            let candidates: Vec<(&str, i128)> = self
                .scores(snapshot, tier)
                .into_iter()
                .filter(|(name, _)| !snapshot.is_empty(name))
                .collect();

            let Some(max) = candidates.iter().map(|(_, score)| *score).max() else {
                continue;
            };

            let mut leaders = candidates.iter().filter(|(_, score)| *score == max);
            if let (Some((name, _)), None) = (leaders.next(), leaders.next()) {
                debug!(%tier, queue = %name, score = max, "RuleEngine::decide: tier decisive");
                return Some(Selection {
                    queue: name.to_string(),
                    decided_by: Decision::Tier(tier),
                    score: max,
                });
            }

            debug!(%tier, score = max, "RuleEngine::decide: tier indecisive");
        }

        let queue = snapshot.iter().find(|q| !q.is_empty())?.name.to_string();
        debug!(%queue, "RuleEngine::decide: falling back to registration order");
        Some(Selection {
            queue,
            decided_by: Decision::Fallback,
            score: 0,
        })
    }

    /// Name of the next queue to run, or `None` when every queue is empty
    pub fn select_next_queue(&self, snapshot: &QueueSnapshot<'_>) -> Option<String> {
        self.decide(snapshot).map(|selection| selection.queue)
    }
}
