//! Priority tiers for dispatch rules

use serde::{Deserialize, Serialize};

/// Priority band a rule belongs to
///
/// Tiers are evaluated strictly from `High` to `Low`; a lower tier is only
/// consulted when every higher tier was indecisive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    Low,
    Medium,
    High,
}

impl PriorityTier {
    /// All tiers in evaluation order (highest first)
    pub const EVALUATION_ORDER: [PriorityTier; 3] = [PriorityTier::High, PriorityTier::Medium, PriorityTier::Low];

    /// Position of this tier in [`Self::EVALUATION_ORDER`]
    pub(crate) fn index(self) -> usize {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for PriorityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown priority tier: {}", s)),
        }
    }
}
