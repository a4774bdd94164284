//! Command-line utility for managing the courier message queue
//!
//! Works directly against the configured durable queue, so it can be used
//! while the service is running:
//! - Queue a single message
//! - Seed a handful of sample messages
//! - List delivered messages with their cached delivery data
//! - Empty the queue and the delivery cache

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courier_common::SentMessage;
use courier_queue::{QueueConfig, Stores};

/// Command-line utility for managing the courier message queue
#[derive(Parser, Debug)]
#[command(name = "courierctl")]
#[command(about = "Manage the courier message queue", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file (searched for like `courier` does if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue one message
    Add {
        /// Destination phone number, e.g. +905551111111
        destination: String,
        /// Message body
        body: String,
    },
    /// Queue numbered sample messages
    Seed {
        /// How many messages to queue
        #[arg(short = 'n', long, default_value_t = 4)]
        count: usize,
    },
    /// Print delivered messages as JSON
    Sent,
    /// Delete every message, delivered or not, and the delivery cache
    Clear,
}

async fn open(config: Option<PathBuf>) -> anyhow::Result<Stores> {
    let path = match config {
        Some(path) => path,
        None => courier::find_config_file()?,
    };
    let queue = courier::config::load(&path)?.queue().clone();

    if matches!(queue, QueueConfig::Memory(_)) {
        anyhow::bail!(
            "{} configures an in-memory queue; courierctl needs `queue: (type: \"Sqlite\", ...)`",
            path.display()
        );
    }

    Ok(tokio::task::spawn_blocking(move || queue.into_stores()).await??)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Stores { queue, cache } = open(cli.config).await?;

    match cli.command {
        Commands::Add { destination, body } => {
            let message = queue.enqueue(&destination, &body).await?;
            println!("Queued {} for {}", message.id, message.destination);
        }
        Commands::Seed { count } => {
            for n in 1..=count {
                let destination = format!("+90555{n:07}");
                let body = format!("Test message {n}");
                match queue.enqueue(&destination, &body).await {
                    Ok(message) => println!("Queued {} for {destination}", message.id),
                    Err(e) => eprintln!("Failed to queue message for {destination}: {e}"),
                }
            }
        }
        Commands::Sent => {
            let messages = queue.delivered_messages().await?;
            let ids: Vec<_> = messages.iter().map(|message| message.id).collect();
            let mut records = cache.get_many(&ids).await.unwrap_or_else(|e| {
                eprintln!("Delivery cache unavailable: {e}");
                std::collections::HashMap::new()
            });

            let sent: Vec<SentMessage> = messages
                .into_iter()
                .map(|message| {
                    let record = records.remove(&message.id);
                    SentMessage::new(message, record)
                })
                .collect();

            println!("{}", serde_json::to_string_pretty(&sent)?);
        }
        Commands::Clear => {
            let removed = queue.clear().await?;
            if let Err(e) = cache.clear().await {
                eprintln!("Delivery cache not cleared: {e}");
            }
            println!("Removed {removed} messages");
        }
    }

    Ok(())
}
