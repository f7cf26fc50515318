use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use duende_scraper::app::services::Services;
use duende_scraper::config::Config;
use duende_scraper::domain::{normalize_text, Artist, ArtistStatus};
use duende_scraper::{logging, metrics, server};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "duende_scraper")]
#[command(about = "Flamenco event scraper: rotates artists, searches the web, extracts and deduplicates events")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one refresh over the next batch of artists
    Run,
    /// Search discovery queries and queue unknown artists for review
    Discover,
    /// Serve the HTTP trigger
    Serve {
        /// Port to listen on (defaults to PORT or 3000)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Add artists by name, skipping ones already known
    AddArtist {
        /// Artist names
        #[arg(required = true)]
        names: Vec<String>,
        /// Status for the new artists
        #[arg(long, default_value = "approved")]
        status: String,
    },
}

#[tokio::main]
async fn main() {
    let _log_guard = logging::init_logging();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load().context("loading configuration")?;
    metrics::init_metrics(config.metrics_addr);
    let services = Services::from_config(&config).context("wiring services")?;

    match cli.command {
        Commands::Run => {
            println!("🔄 Running refresh...");
            let summary = services.refresh.run().await.context("refresh run failed")?;
            println!("✅ {}", summary.message());
            println!("   Artists stamped: {}", summary.artists_marked);
            println!("   Search errors: {}", summary.search_errors);
            println!("   Candidates: {}", summary.candidates);
            println!(
                "   Invalid: {}  Folded: {}  Already present: {}",
                summary.ingest.invalid, summary.ingest.folded, summary.ingest.already_present
            );
        }
        Commands::Discover => {
            println!("🔎 Running artist discovery...");
            let summary = services.discovery.run().await.context("discovery run failed")?;
            println!("✅ {}", summary.message());
        }
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.port);
            info!("Starting HTTP trigger on port {}", port);
            server::start_server(Arc::new(services), port)
                .await
                .map_err(|e| anyhow::anyhow!("server error: {e}"))?;
        }
        Commands::AddArtist { names, status } => {
            let status = ArtistStatus::from(status);
            let mut keys = HashSet::new();
            let names: Vec<String> = names
                .into_iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty() && keys.insert(normalize_text(n)))
                .collect();

            let known: HashSet<String> = services
                .store
                .artists_named(&names)
                .await?
                .iter()
                .map(Artist::name_key)
                .collect();
            let fresh: Vec<Artist> = names
                .into_iter()
                .filter(|n| !known.contains(&normalize_text(n)))
                .map(|n| Artist::new(n).with_status(status.clone()))
                .collect();

            let inserted = if fresh.is_empty() { 0 } else { services.store.insert_artists(&fresh).await? };
            println!("✅ Added {} artists ({} already known)", inserted, known.len());
        }
    }
    Ok(())
}
