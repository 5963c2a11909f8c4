use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use transcript_flow::config::EngineSettings;
use transcript_flow::engine::{JobController, SourceRegistry};
use transcript_flow::network::ChromiumSessionFactory;
use transcript_flow::ops::{self, IngestionTelemetry};
use transcript_flow::persistence::{InMemoryRecordStore, RecordStore, RegNo};

#[derive(Parser)]
#[command(name = "transcript-flow")]
#[command(about = "Result portal ingestion and reconciliation engine", long_about = None)]
struct Cli {
    /// JSON settings file; defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Human-readable logs instead of JSON
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the ingestion HTTP API
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one batch in the foreground and print its summary
    Run {
        /// Source key or a raw URL template containing {REG}
        #[arg(long)]
        source: String,
        #[arg(long)]
        start: RegNo,
        #[arg(long)]
        end: RegNo,
    },
    /// List active source links
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.pretty {
        ops::init_tracing_pretty();
    } else {
        ops::init_tracing();
    }

    let settings =
        EngineSettings::load(cli.config.as_deref()).context("failed to load engine settings")?;

    let store = match &settings.store_path {
        Some(path) => InMemoryRecordStore::load(path)
            .await
            .with_context(|| format!("failed to load record store {}", path.display()))?,
        None => InMemoryRecordStore::new(),
    };
    let store = Arc::new(store);

    let registry = SourceRegistry::new(settings.sources.clone());
    let controller = JobController::new(
        &settings,
        registry,
        Arc::clone(&store) as Arc<dyn RecordStore>,
        Arc::new(ChromiumSessionFactory::new(&settings)),
        Arc::new(IngestionTelemetry::new()),
    );

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.bind_addr.clone());
            let addr = ops::parse_bind_addr(&bind)?;

            let shutdown_controller = controller.clone();
            let shutdown = async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                }
                shutdown_controller.cancel();
            };

            let probe = controller.clone();
            ops::serve(controller, addr, shutdown)
                .await
                .context("ingestion API failed")?;

            // * Let a cancelled batch reach its teardown before the store is saved
            while probe.is_running() {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
        Commands::Run { source, start, end } => {
            let handle = controller
                .try_start(&source, start, end)
                .context("batch was not admitted")?;
            let summary = handle.await.context("batch task panicked")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Sources => {
            for link in controller.registry().list_active() {
                println!("{}\t{}", link.key, link.url_template);
            }
        }
    }

    if let Some(path) = &settings.store_path {
        store
            .save(path)
            .await
            .with_context(|| format!("failed to save record store {}", path.display()))?;
    }

    Ok(())
}
