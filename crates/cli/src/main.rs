mod config;

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use server::{create_router, state::AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{ShardConfig, CONFIG_DIR, CONFIG_FILE};

#[derive(Parser)]
#[command(name = "reshard-donor")]
#[command(about = "Donor side of collection resharding for one shard", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Overrides the port from the config file
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and create the store
    Init {
        #[arg(long, default_value = "shard0")]
        shard_id: String,
    },
    /// Step up as primary, resume unfinished donors and serve the admin API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print persisted donor documents
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { shard_id }) => init(&shard_id).await,
        Some(Commands::Serve { port }) => serve(port.or(cli.port)).await,
        Some(Commands::Status) => status().await,
        None => serve(cli.port).await,
    }
}

async fn init(shard_id: &str) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_dir = cwd.join(CONFIG_DIR);

    if config_dir.exists() {
        println!("Shard already initialized at {}", config_dir.display());
        return Ok(());
    }

    let config = ShardConfig::new(shard_id);
    config.donor_service_config()?;

    tokio::fs::create_dir_all(&config_dir).await?;
    config.save(&config_dir.join(CONFIG_FILE)).await?;

    db::open_store(&config.database_url(&config_dir))
        .await
        .context("Failed to create store")?;

    println!();
    println!("Initialized donor shard '{}'", shard_id);
    println!();
    println!("Created:");
    println!("  {}/", CONFIG_DIR);
    println!("  ├── {}", CONFIG_FILE);
    println!("  └── {}", config.storage.database.display());
    println!();
    println!("Run 'reshard-donor serve' to start the shard");

    Ok(())
}

async fn load_config(config_dir: &Path) -> Result<ShardConfig> {
    let config_path = config_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        anyhow::bail!(
            "No {} found. Run 'reshard-donor init' first.",
            config_path.display()
        );
    }
    ShardConfig::load(&config_path).await
}

async fn serve(port: Option<u16>) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_dir = cwd.join(CONFIG_DIR);
    let config = load_config(&config_dir).await?;
    let port = port.unwrap_or(config.server.port);

    init_tracing();

    let database_url = config.database_url(&config_dir);
    tracing::info!("Database: {}", database_url);

    let pool = db::open_store(&database_url)
        .await
        .context("Failed to open store")?;

    let state = AppState::new(pool, config.donor_service_config()?);
    let watcher_task = state.watcher.listen(&state.event_bus);

    let resumed = state
        .donor_service
        .step_up()
        .await
        .context("Failed to step up")?;
    tracing::info!(shard_id = %state.shard_id, resumed, "Shard is primary");

    let donor_service = state.donor_service.clone();
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    println!();
    println!("Resharding donor - shard {}", config.shard.id);
    println!("════════════════════════════════════════");
    println!();
    println!("  API Server:  http://localhost:{}", port);
    println!("  OpenAPI:     http://localhost:{}/api/openapi.json", port);
    println!("  Resumed:     {} donor(s)", resumed);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    donor_service.step_down();
    watcher_task.abort();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn status() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_dir = cwd.join(CONFIG_DIR);

    if !config_dir.exists() {
        println!("Not a donor shard directory.");
        println!("Run 'reshard-donor init' to initialize.");
        return Ok(());
    }

    let config = load_config(&config_dir).await?;
    let db_path = config.database_path(&config_dir);

    if !db_path.exists() {
        println!("Shard: {} (store not initialized)", config.shard.id);
        return Ok(());
    }

    let pool = db::open_store(&config.database_url(&config_dir)).await?;
    let docs = db::DonorStateRepository::new(pool).find_all().await?;

    println!();
    println!("Shard: {}", config.shard.id);
    println!("Store: {}", db_path.display());
    println!();

    if docs.is_empty() {
        println!("No resharding operations.");
    } else {
        println!("Donors ({}):", docs.len());
        for doc in &docs {
            let state = doc.state();
            let icon = match state {
                reshard_core::DonorState::Done => "●",
                reshard_core::DonorState::Error => "✗",
                reshard_core::DonorState::BlockingWrites => "◕",
                reshard_core::DonorState::DonatingOplogEntries => "◑",
                reshard_core::DonorState::DonatingInitialData => "◐",
                _ => "○",
            };
            println!(
                "  {} [{}] {} {}",
                icon,
                state.as_str(),
                doc.resharding_uuid,
                doc.source_nss
            );
            if let Some(reason) = &doc.mutable_state.abort_reason {
                println!("      abort reason: {}", reason);
            }
        }
    }

    println!();

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "reshard_donor=info,donor=info,server=info,tower_http=info".into()
            }),
        )
        .init();
}
