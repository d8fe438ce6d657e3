//! Linkharvest main entry point
//!
//! This is the command-line interface for Linkharvest.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linkharvest::config::{load_config, Config};
use linkharvest::storage::{CrawlStrategy, LogLevel, TaskRecord};
use linkharvest::{CrawlService, ManualCrawlRequest};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Linkharvest: depth-bounded link discovery for recorded websites
///
/// Register websites, run full or incremental crawls against them and
/// inspect the tasks, logs and links each crawl produced.
#[derive(Parser, Debug)]
#[command(name = "linkharvest")]
#[command(version)]
#[command(about = "Depth-bounded link discovery for recorded websites", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "linkharvest.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage crawl targets
    Websites {
        #[command(subcommand)]
        command: WebsiteCommand,
    },

    /// Crawl a website and wait for the task to finish (Ctrl-C cancels)
    Crawl {
        /// Website ID
        website_id: i64,

        /// "incremental" skips known links, "full" crawls everything
        #[arg(short, long, default_value = "incremental")]
        strategy: CrawlStrategy,

        /// Override the website's crawl depth
        #[arg(short, long)]
        depth: Option<u32>,

        /// Override the website's link ceiling
        #[arg(short, long)]
        max_links: Option<u32>,
    },

    /// Inspect and control crawl tasks
    Tasks {
        #[command(subcommand)]
        command: TaskCommand,
    },
}

#[derive(Subcommand, Debug)]
enum WebsiteCommand {
    /// Register a website
    Add {
        /// Start URL (http or https)
        url: String,

        #[arg(short, long)]
        depth: Option<u32>,

        #[arg(short, long)]
        max_links: Option<u32>,
    },

    /// List registered websites
    List,
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// List tasks, newest first
    List {
        /// Only tasks of this website
        #[arg(short, long)]
        website: Option<i64>,
    },

    /// Show one task
    Show { task_id: i64 },

    /// Show a task's log
    Logs {
        task_id: i64,

        /// Only entries of this level (info, warning, error)
        #[arg(short, long)]
        level: Option<LogLevel>,
    },

    /// List the links recorded for a website
    Links { website_id: i64 },

    /// Cancel a running task
    Cancel { task_id: i64 },

    /// Delete a finished task and its logs
    Delete { task_id: i64 },

    /// Fail pending or running tasks whose worker stopped sending heartbeats
    Recover,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let service = open_service(&config)?;

    match cli.command {
        Command::Websites { command } => handle_websites(&service, command),
        Command::Crawl {
            website_id,
            strategy,
            depth,
            max_links,
        } => {
            handle_crawl(
                &service,
                ManualCrawlRequest {
                    website_id,
                    strategy,
                    depth,
                    max_links,
                },
            )
            .await
        }
        Command::Tasks { command } => handle_tasks(&service, command),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("linkharvest=info,warn"),
            1 => EnvFilter::new("linkharvest=debug,info"),
            2 => EnvFilter::new("linkharvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_service(config: &Config) -> Result<CrawlService> {
    CrawlService::from_config(config)
        .with_context(|| format!("Failed to open database {}", config.storage.database_path))
}

fn handle_websites(service: &CrawlService, command: WebsiteCommand) -> Result<()> {
    match command {
        WebsiteCommand::Add {
            url,
            depth,
            max_links,
        } => {
            let id = service.register_website(&url, depth, max_links)?;
            println!("✓ Registered website {} ({})", id, url);
        }
        WebsiteCommand::List => {
            let websites = service.list_websites()?;
            if websites.is_empty() {
                println!("No websites registered");
            }
            for website in websites {
                println!(
                    "{:>5}  {:<8}  depth={:<3} max_links={:<6} {}",
                    website.id,
                    website.status.to_db_string(),
                    website.crawl_depth,
                    website.max_links,
                    website.url
                );
            }
        }
    }
    Ok(())
}

/// Starts a manual crawl and waits for it, cancelling on Ctrl-C
///
/// The crawling process hosts the workers, so it first fails any task
/// whose worker stopped sending heartbeats.
async fn handle_crawl(service: &CrawlService, request: ManualCrawlRequest) -> Result<()> {
    service.recover_interrupted_tasks()?;

    let task_id = service.start_manual_crawl(request)?;
    println!("Started task {}", task_id);

    tokio::select! {
        _ = service.shutdown() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::warn!("Interrupted, cancelling task {}", task_id);
            if let Err(e) = service.cancel_task(task_id) {
                tracing::warn!("Could not cancel task {}: {}", task_id, e);
            }
            service.shutdown().await;
        }
    }

    print_task(&service.get_task(task_id)?);
    Ok(())
}

fn handle_tasks(service: &CrawlService, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::List { website } => {
            for task in service.list_tasks(website)? {
                println!(
                    "{:>5}  website={:<5} {:<10} {:<11} {:<9} links={} started={}",
                    task.id,
                    task.website_id,
                    task.status.to_db_string(),
                    task.strategy.to_db_string(),
                    task.task_type.to_db_string(),
                    task.statistics.total_links,
                    task.started_at
                );
            }
        }
        TaskCommand::Show { task_id } => print_task(&service.get_task(task_id)?),
        TaskCommand::Logs { task_id, level } => {
            for entry in service.task_logs(task_id, level)? {
                println!(
                    "{} {:<7} {} {}",
                    entry.created_at,
                    entry.level.to_db_string(),
                    entry.message,
                    entry.details
                );
            }
        }
        TaskCommand::Links { website_id } => {
            for link in service.website_links(website_id)? {
                println!(
                    "{:<7} {:>4} x{:<3} {}",
                    link.link_type.to_db_string(),
                    link.status_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    link.crawl_count,
                    link.url
                );
            }
        }
        TaskCommand::Cancel { task_id } => {
            service.cancel_task(task_id)?;
            println!("✓ Task {} cancelled", task_id);
        }
        TaskCommand::Delete { task_id } => {
            service.delete_task(task_id)?;
            println!("✓ Task {} deleted", task_id);
        }
        TaskCommand::Recover => {
            let count = service.recover_interrupted_tasks()?;
            println!("✓ {} interrupted task(s) marked failed", count);
        }
    }
    Ok(())
}

fn print_task(task: &TaskRecord) {
    println!("Task {}", task.id);
    println!("  Website:  {}", task.website_id);
    println!("  Strategy: {}", task.strategy);
    println!("  Type:     {}", task.task_type.to_db_string());
    println!("  Status:   {}", task.status);
    println!("  Started:  {}", task.started_at);
    if let Some(finished_at) = &task.finished_at {
        println!("  Finished: {}", finished_at);
    }
    println!(
        "  Links:    {} total, {} valid, {} invalid, {} new",
        task.statistics.total_links,
        task.statistics.valid_links,
        task.statistics.invalid_links,
        task.statistics.new_links
    );
    println!(
        "  Rates:    {:.2}% valid, {:.2}% downloaded ({} download failures)",
        task.statistics.valid_rate() * 100.0,
        task.statistics.precision_rate() * 100.0,
        task.statistics.download_failed
    );
    if let Some(error) = &task.error_message {
        println!("  Error:    {}", error);
    }
}
