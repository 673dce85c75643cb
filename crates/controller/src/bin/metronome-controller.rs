use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use metronome_admission::{AdmissionReview, Operation};
use metronome_controller::{Controller, SystemClock};
use metronome_core::config::{load_dotenv, Config};
use metronome_store::{MemoryStore, ObjectStore};

#[derive(Parser, Debug)]
#[command(name = "metronome-controller")]
#[command(about = "Cron-driven work-unit scheduling controller")]
struct Cli {
    /// Directory of schedule manifests (YAML) loaded at startup.
    #[arg(long, env = "METRONOME_MANIFEST_DIR")]
    manifests: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let controller = Arc::new(Controller::new(
        store.clone(),
        Arc::new(SystemClock),
        &config.controller,
    ));
    let shutdown = controller.shutdown_handle();

    let run = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run().await })
    };

    // Seed schedules through the same admission path the gateway uses, so
    // manifests get defaulted and validated like any other client write.
    if let Some(dir) = &cli.manifests {
        let review = AdmissionReview::new(config.defaults.clone());
        for schedule in metronome_controller::manifests::load_dir(dir)? {
            let key = schedule.key();
            match review.admit(Operation::Create, schedule) {
                Ok(admitted) => {
                    store.create_schedule(admitted).await?;
                    info!(key = %key, "schedule loaded");
                }
                Err(e) => warn!(key = %key, error = %e, "manifest rejected at admission"),
            }
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown.notify_one();

    run.await??;
    Ok(())
}
