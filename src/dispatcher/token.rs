//! Completion tokens

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one Busy cycle of the execution slot
///
/// A fresh token is minted every time the slot is locked. Only a completion
/// carrying the active token can release the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionToken(Uuid);

impl CompletionToken {
    /// Mint a new token
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CompletionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CompletionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
