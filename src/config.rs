//! Configuration types and loading

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dispatcher::DispatcherConfig;
use crate::rules::{PriorityTier, Rule, RuleCondition};

/// Project-local config file, looked up in the working directory
pub const LOCAL_CONFIG: &str = ".queuedispatch.yml";

/// Per-user config file name under `<config_dir>/queuedispatch/`
pub const USER_CONFIG: &str = "queuedispatch.yml";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dispatcher tuning
    pub dispatcher: DispatcherConfig,

    /// Queues to register, in registration (fallback) order
    pub queues: Vec<QueueConfig>,

    /// Declarative rules
    pub rules: Vec<RuleConfig>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Rejects duplicate queue names and rules that reference undeclared
    /// queues, either as target or inside their condition.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for queue in &self.queues {
            if queue.name.is_empty() {
                return Err(eyre!("Queue names must not be empty"));
            }
            if !names.insert(queue.name.as_str()) {
                return Err(eyre!("Queue '{}' is declared more than once", queue.name));
            }
        }

        for (i, rule) in self.rules.iter().enumerate() {
            if !names.contains(rule.queue.as_str()) {
                return Err(eyre!("Rule #{} targets undeclared queue '{}'", i + 1, rule.queue));
            }
            if let Some(missing) = rule.when.referenced_queues().into_iter().find(|q| !names.contains(q)) {
                return Err(eyre!("Rule #{} condition references undeclared queue '{}'", i + 1, missing));
            }
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// An explicit path must load. Otherwise the first readable file among
    /// [`Config::search_paths`] is used, and defaults when there is none.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path).context(format!("Failed to load config from {}", path.display())),
            None => Self::load_first(&Self::search_paths()),
        }
    }

    /// Implicit config locations, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let user = dirs::config_dir().map(|dir| dir.join("queuedispatch").join(USER_CONFIG));
        std::iter::once(PathBuf::from(LOCAL_CONFIG)).chain(user).collect()
    }

    fn load_first(paths: &[PathBuf]) -> Result<Self> {
        for path in paths.iter().filter(|path| path.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!(path = %path.display(), "Skipping unusable config: {:#}", e),
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Effective timeout for a declared queue
    pub fn queue_timeout(&self, queue: &QueueConfig) -> Duration {
        queue.timeout().unwrap_or_else(|| self.dispatcher.default_timeout())
    }
}

/// A queue declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,

    /// Handler timeout in milliseconds; falls back to the dispatcher default
    #[serde(rename = "timeout-ms", default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl QueueConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// A rule declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub tier: PriorityTier,

    /// Queue whose score the rule contributes to
    pub queue: String,

    pub weight: i64,

    /// When the rule applies (defaults to always)
    ///
    /// Conditions are written as single-key maps (`length-above: {...}`)
    /// at every nesting level rather than as YAML `!tags`.
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub when: RuleCondition,
}

impl RuleConfig {
    /// Build the runtime rule
    pub fn to_rule(&self) -> Rule {
        Rule::with_predicate(self.tier, self.queue.clone(), self.weight, self.when.clone().into_predicate())
    }
}
