//! Rule engine for choosing the next queue to dispatch
//!
//! Rules are grouped into three priority tiers. A tier sums the weights of
//! its applicable rules per queue; the first tier with a unique leader among
//! non-empty queues decides, otherwise registration order does.

mod condition;
mod engine;
mod rule;
mod snapshot;
mod tier;

pub use condition::RuleCondition;
pub use engine::{Decision, RuleEngine, Selection};
pub use rule::{Predicate, Rule};
pub use snapshot::{QueueSnapshot, QueueView};
pub use tier::PriorityTier;
