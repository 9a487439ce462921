//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// queuedispatch - single-flight rule-driven queue dispatcher
#[derive(Parser)]
#[command(
    name = "queuedispatch",
    about = "Dispatch queued work one item at a time using tiered weighted rules",
    version,
    after_help = "Logs are written to: ~/.local/share/queuedispatch/logs/queuedispatch.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Validate the configuration and print a summary
    Check,

    /// Dispatch items from a JSON-lines file through the configured queues
    Run {
        /// File with one {"queue": ..., "item": ...} object per line
        #[arg(value_name = "ITEMS")]
        items: PathBuf,

        /// Give up if the dispatcher is still busy after this many milliseconds
        #[arg(long, default_value = "60000")]
        limit_ms: u64,
    },

    /// Run the built-in two-queue demonstration
    Demo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["queuedispatch", "-v", "run", "items.jsonl", "--limit-ms", "10"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Run { items, limit_ms } => {
                assert_eq!(items, PathBuf::from("items.jsonl"));
                assert_eq!(limit_ms, 10);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["queuedispatch", "check", "--config", "q.yml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("q.yml")));
        assert!(matches!(cli.command, Command::Check));
    }
}
