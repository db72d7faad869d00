use anyhow::{Context, Result};
use budevents::config::Config;
use budevents::feed::{Consumer, Event, HandlerError, Merger};
use budevents::server::{self, aggregate_router, producer_router, EventGenerator};
use budevents::storage::{EventRepository, MemoryRepository, SqliteRepository};
use budevents::util::parse_duration;
use chrono::SecondsFormat;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "budevents", about = "Polling-based HATEOAS event feeds")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, global = true, value_name = "FILE", default_value = "budevents.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish events over HTTP as a paginated feed
    Serve {
        /// Listen port (overrides server.bind)
        #[arg(long)]
        port: Option<u16>,

        /// SQLite database file; events are kept in memory when omitted
        #[arg(long, value_name = "PATH")]
        db: Option<String>,
    },

    /// Poll every configured listener and print new events
    Consume,

    /// Serve the configured streams merged into one feed
    Aggregate {
        /// Listen port (overrides server.bind)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Serve an in-memory feed filled with random events
    Generate {
        /// Listen port (overrides server.bind)
        #[arg(long)]
        port: Option<u16>,

        /// Upper bound on events generated per batch
        #[arg(long, default_value_t = 10)]
        max_events: usize,

        /// Go-style interval between new batches; "0s" generates only once
        #[arg(long, value_name = "DURATION", default_value = "0s")]
        new_events_interval: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("budevents=info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    config.validate().context("Config file rejected")?;

    match args.command {
        Command::Serve { port, db } => run_serve(&config, port, db).await,
        Command::Consume => run_consume(&config).await,
        Command::Aggregate { port } => run_aggregate(&config, port).await,
        Command::Generate {
            port,
            max_events,
            new_events_interval,
        } => run_generate(&config, port, max_events, &new_events_interval).await,
    }
}

fn bind_addr(config: &Config, port: Option<u16>) -> Result<SocketAddr> {
    let mut addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid server.bind address: {}", config.server.bind))?;
    if let Some(port) = port {
        addr.set_port(port);
    }
    Ok(addr)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        // Without a signal handler the process can only be killed
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

async fn run_serve(config: &Config, port: Option<u16>, db: Option<String>) -> Result<()> {
    let repo: Arc<dyn EventRepository> = match db {
        Some(path) => Arc::new(
            SqliteRepository::open(&path)
                .await
                .with_context(|| format!("Failed to open event database at {}", path))?,
        ),
        None => {
            tracing::warn!("No --db given, events will be lost on exit");
            Arc::new(MemoryRepository::new())
        }
    };

    let addr = bind_addr(config, port)?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    server::serve(listener, producer_router(repo), shutdown_signal())
        .await
        .context("Producer server failed")
}

async fn run_aggregate(config: &Config, port: Option<u16>) -> Result<()> {
    if config.streams.is_empty() {
        anyhow::bail!("No [[streams]] configured, nothing to aggregate");
    }
    let client = config
        .client
        .feed_client()
        .context("Failed to build HTTP client")?;
    let merger = Arc::new(Merger::new(client, config.streams.clone()));

    let addr = bind_addr(config, port)?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(streams = config.streams.len(), "Serving merged feed");
    server::serve(listener, aggregate_router(merger), shutdown_signal())
        .await
        .context("Aggregate server failed")
}

async fn run_generate(
    config: &Config,
    port: Option<u16>,
    max_events: usize,
    new_events_interval: &str,
) -> Result<()> {
    let every = parse_duration(new_events_interval)
        .with_context(|| format!("Invalid --new-events-interval: {}", new_events_interval))?;

    let repo: Arc<dyn EventRepository> = Arc::new(MemoryRepository::new());
    let generator = EventGenerator::new(Arc::clone(&repo), max_events);
    let seeded = generator
        .publish_batch()
        .await
        .context("Failed to seed generated events")?;
    tracing::info!(seeded, "Generated initial events");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });
    let generating = tokio::spawn(generator.run(every, shutdown_rx.clone()));

    let addr = bind_addr(config, port)?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let mut server_shutdown = shutdown_rx;
    server::serve(listener, producer_router(repo), async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    })
    .await
    .context("Generator server failed")?;

    generating
        .await
        .context("Generator task panicked")?
        .context("Event generator failed")
}

async fn print_events(events: Vec<Event>) -> Result<(), HandlerError> {
    for event in events {
        println!(
            "[{}] [{}] {} {}",
            event
                .occurred_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            event.event_id,
            event.event_name,
            event.payload
        );
    }
    Ok(())
}

async fn run_consume(config: &Config) -> Result<()> {
    let client = config
        .client
        .feed_client()
        .context("Failed to build HTTP client")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let consumer = Consumer::new(client, Arc::new(print_events), config.listeners.clone());
    consumer
        .consume(shutdown_rx)
        .await
        .context("Consumer group stopped")
}
