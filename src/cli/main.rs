use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use gamemaster_pipeline::config::Config;
use gamemaster_pipeline::messages::{
    ConversationMessageCreated, DocumentRecrackRequested, DocumentUploaded,
};
use gamemaster_pipeline::messaging::{
    broker_factory, BackfillJob, BackfillReport, PipelineMessage, Publisher,
};
use gamemaster_pipeline::pipeline::queue_depths;
use gamemaster_pipeline::standard_queues;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "gm-pipeline-cli")]
#[command(about = "Game master pipeline operator CLI", long_about = None)]
struct Cli {
    /// Config file (defaults to $GM_PIPELINE_CONFIG or config/pipeline.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a DocumentUploaded message
    PublishDocument {
        #[arg(short, long)]
        document_id: String,

        #[arg(short, long)]
        ruleset_id: String,

        #[arg(short, long)]
        file_path: String,

        #[arg(short, long)]
        game_id: Option<String>,
    },

    /// Ask for a document to be cracked and indexed again
    Recrack {
        #[arg(short, long)]
        document_id: String,

        #[arg(short, long)]
        ruleset_id: String,

        #[arg(short, long)]
        file_path: String,

        #[arg(short, long)]
        game_id: Option<String>,
    },

    /// Show the depth of every pipeline queue
    QueueDepths {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Publish every message in a JSON lines file
    Backfill {
        #[arg(value_name = "JSONL")]
        path: String,

        #[arg(short = 't', long, value_enum, default_value = "document-uploaded")]
        message_type: BackfillType,

        /// Publishes in flight; defaults to messaging.backfill_concurrency
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
    },

    /// Check the worker host status endpoint
    Health {
        #[arg(short, long, default_value = "http://localhost:9090")]
        endpoint: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackfillType {
    DocumentUploaded,
    DocumentRecrackRequested,
    ConversationMessageCreated,
}

fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    config.context("failed to load configuration")
}

async fn connect(config: &Config) -> anyhow::Result<Publisher> {
    let broker = broker_factory(&config.messaging)
        .connect()
        .await
        .context("failed to connect to the message bus")?;
    Ok(Publisher::new(broker))
}

async fn publish_one<M: PipelineMessage>(config: &Config, message: &M) -> anyhow::Result<()> {
    let publisher = connect(config).await?;
    let message_id = publisher
        .publish(message, &CancellationToken::new())
        .await
        .with_context(|| format!("failed to publish {}", M::MESSAGE_TYPE))?;
    publisher.close().await?;

    println!("Published {} ({})", M::MESSAGE_TYPE, message_id);
    Ok(())
}

fn read_jsonl<M: DeserializeOwned>(path: &str) -> anyhow::Result<Vec<M>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid message", path, number + 1))
        })
        .collect()
}

async fn backfill<M: PipelineMessage>(
    config: &Config,
    path: &str,
    concurrency: usize,
) -> anyhow::Result<BackfillReport> {
    let messages: Vec<M> = read_jsonl(path)?;
    let publisher = Arc::new(connect(config).await?);

    let handle = BackfillJob::spawn(publisher.clone(), messages, concurrency);
    let cancel = handle.cancellation();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping backfill");
            cancel.cancel();
        }
    });

    let report = handle.join().await;
    ctrl_c.abort();
    publisher.close().await?;
    Ok(report)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::PublishDocument {
            document_id,
            ruleset_id,
            file_path,
            game_id,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let message = DocumentUploaded {
                document_id,
                ruleset_id,
                file_path,
                game_id,
            };
            publish_one(&config, &message).await?;
        }

        Commands::Recrack {
            document_id,
            ruleset_id,
            file_path,
            game_id,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let message = DocumentRecrackRequested {
                document_id,
                ruleset_id,
                file_path,
                game_id,
            };
            publish_one(&config, &message).await?;
        }

        Commands::QueueDepths { json } => {
            let config = load_config(cli.config.as_deref())?;
            let publisher = connect(&config).await?;
            let depths = queue_depths(publisher.broker().as_ref(), &standard_queues()).await;
            publisher.close().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&depths)?);
            } else {
                println!("{:<45} {:<25} {:>8}", "QUEUE", "STAGE", "DEPTH");
                for depth in depths {
                    let stage = depth
                        .stage
                        .map(|stage| stage.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let count = match (depth.depth, depth.error) {
                        (Some(count), _) => count.to_string(),
                        (None, Some(error)) => format!("error: {}", error),
                        (None, None) => "-".to_string(),
                    };
                    println!("{:<45} {:<25} {:>8}", depth.queue, stage, count);
                }
            }
        }

        Commands::Backfill {
            path,
            message_type,
            concurrency,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let concurrency = concurrency.unwrap_or(config.messaging.backfill_concurrency);
            if concurrency == 0 {
                bail!("concurrency must be at least 1");
            }

            let report = match message_type {
                BackfillType::DocumentUploaded => {
                    backfill::<DocumentUploaded>(&config, &path, concurrency).await?
                }
                BackfillType::DocumentRecrackRequested => {
                    backfill::<DocumentRecrackRequested>(&config, &path, concurrency).await?
                }
                BackfillType::ConversationMessageCreated => {
                    backfill::<ConversationMessageCreated>(&config, &path, concurrency).await?
                }
            };

            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.failed > 0 {
                std::process::exit(1);
            }
        }

        Commands::Health { endpoint } => {
            let response = Client::new()
                .get(format!("{}/health", endpoint))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}
