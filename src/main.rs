//! queuedispatch - single-flight rule-driven queue dispatcher
//!
//! CLI entry point for validating configurations and running workloads.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use queuedispatch::cli::{Cli, Command};
use queuedispatch::config::{Config, QueueConfig, RuleConfig};
use queuedispatch::dispatcher::{CompletionToken, Completer, Dispatcher, DispatcherHandle, QueueHandler};
use queuedispatch::driver::drive_until_idle;
use queuedispatch::events::DispatchEvent;
use queuedispatch::rules::{PriorityTier, RuleCondition};

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    // Log to a file when the data directory is writable, otherwise to stderr
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("queuedispatch")
        .join("logs");
    let log_file = fs::create_dir_all(&log_dir).and_then(|_| fs::File::create(log_dir.join("queuedispatch.log")));

    match log_file {
        Ok(file) => tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init(),
        Err(_) => tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init(),
    }

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    match cli.command {
        Command::Check => {
            let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
            cmd_check(&config)
        }
        Command::Run { items, limit_ms } => {
            let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
            cmd_run(&config, &items, Duration::from_millis(limit_ms)).await
        }
        Command::Demo => cmd_demo().await,
    }
}

/// Prints every item it receives and completes immediately
struct EchoHandler {
    queue: String,
}

#[async_trait]
impl QueueHandler for EchoHandler {
    async fn handle(&self, token: CompletionToken, item: Value, completer: Completer) {
        match &item {
            Value::String(s) => println!("[{}] {}", self.queue, s),
            other => println!("[{}] {}", self.queue, other),
        }
        if let Err(e) = completer.complete(token).await {
            warn!(queue = %self.queue, %token, "Failed to report completion: {}", e);
        }
    }
}

/// One line of a `run` items file
#[derive(Debug, Deserialize)]
struct ItemLine {
    queue: String,
    item: Value,
}

/// Spawn a dispatcher with every configured queue and rule registered
async fn start_dispatcher(config: &Config) -> Result<(DispatcherHandle, JoinHandle<()>)> {
    config.validate()?;

    let (handle, task) = Dispatcher::spawn(config.dispatcher.clone());
    for queue in &config.queues {
        let handler = EchoHandler {
            queue: queue.name.clone(),
        };
        handle
            .register_queue(&queue.name, handler, config.queue_timeout(queue))
            .await?;
    }
    for rule in &config.rules {
        handle.register_rule(rule.to_rule()).await?;
    }

    Ok((handle, task))
}

/// Drive to idle, then print restarts and totals
async fn drain(config: &Config, handle: &DispatcherHandle, limit: Duration) -> Result<Vec<String>> {
    let mut events = handle.subscribe();
    let report = drive_until_idle(handle, config.dispatcher.poll_interval(), Some(limit)).await?;

    while let Ok(event) = events.try_recv() {
        if let DispatchEvent::Restarted { queue, token, reason } = event {
            println!("restarted: {} ({}, token {})", queue, reason, token);
        }
    }

    let metrics = handle.metrics().await?;
    println!(
        "dispatched {} item(s): {} completed, {} timed out, {} forced",
        metrics.dispatched, metrics.completed, metrics.timeouts, metrics.forced_restarts
    );
    Ok(report.dispatched)
}

fn cmd_check(config: &Config) -> Result<()> {
    config.validate()?;

    println!("{} queue(s), in fallback order:", config.queues.len());
    for queue in &config.queues {
        println!("  {} (timeout {:?})", queue.name, config.queue_timeout(queue));
    }

    println!("{} rule(s):", config.rules.len());
    for tier in PriorityTier::EVALUATION_ORDER {
        for rule in config.rules.iter().filter(|r| r.tier == tier) {
            println!("  {} {:+} -> {} when {:?}", tier, rule.weight, rule.queue, rule.when);
        }
    }

    println!("configuration OK");
    Ok(())
}

fn read_items(path: &Path) -> Result<Vec<ItemLine>> {
    let content = fs::read_to_string(path).context(format!("Failed to read items from {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| serde_json::from_str(line).context(format!("Invalid item on line {}", i + 1)))
        .collect()
}

async fn cmd_run(config: &Config, items: &Path, limit: Duration) -> Result<()> {
    if config.queues.is_empty() {
        return Err(eyre!("No queues configured; pass --config or create .queuedispatch.yml"));
    }

    let lines = read_items(items)?;
    let (handle, task) = start_dispatcher(config).await?;

    for line in lines {
        handle
            .enqueue(&line.queue, line.item)
            .await
            .context(format!("Failed to enqueue into '{}'", line.queue))?;
    }

    let result = drain(config, &handle, limit).await;
    handle.shutdown().await?;
    task.await?;
    result.map(|_| ())
}

async fn cmd_demo() -> Result<()> {
    let config = Config {
        queues: vec![
            QueueConfig {
                name: "test2".to_string(),
                timeout_ms: Some(1000),
            },
            QueueConfig {
                name: "test".to_string(),
                timeout_ms: Some(1000),
            },
        ],
        rules: vec![
            RuleConfig {
                tier: PriorityTier::High,
                queue: "test".to_string(),
                weight: 1,
                when: RuleCondition::Always,
            },
            RuleConfig {
                tier: PriorityTier::High,
                queue: "test2".to_string(),
                weight: 1,
                when: RuleCondition::LengthAbove {
                    queue: "test2".to_string(),
                    threshold: 1,
                },
            },
        ],
        ..Default::default()
    };

    let (handle, task) = start_dispatcher(&config).await?;
    for (queue, item) in [
        ("test", "test item 1"),
        ("test2", "test2 item 1"),
        ("test", "test item 2"),
        ("test2", "test2 item 2"),
    ] {
        handle.enqueue(queue, json!(item)).await?;
    }

    let result = drain(&config, &handle, Duration::from_secs(10)).await;
    handle.shutdown().await?;
    task.await?;

    println!("order: {}", result?.join(", "));
    Ok(())
}
