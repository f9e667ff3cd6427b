//! Worker daemon entry point: loads settings, wires up the persistence
//! backend, and runs the poll loop until interrupted.

use anyhow::Result;
use orchestrator_common::{metrics, telemetry, Settings};
use orchestrator_core::persistence::Persistence;
use orchestrator_engine::backend::InMemoryBackend;
#[cfg(feature = "redis-backend")]
use orchestrator_engine::backend::RedisBackend;
use orchestrator_engine::Worker;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    telemetry::init_logging(&settings.observability);
    metrics::init_metrics();

    info!(version = env!("CARGO_PKG_VERSION"), "starting worker daemon");

    match &settings.redis_url {
        #[cfg(feature = "redis-backend")]
        Some(url) => {
            let backend = Arc::new(RedisBackend::connect(url).await?);
            run_until_shutdown(backend, &settings).await
        }
        _ => {
            let backend = Arc::new(InMemoryBackend::new());
            run_until_shutdown(backend, &settings).await
        }
    }
}

async fn run_until_shutdown<P: Persistence + 'static>(backend: Arc<P>, settings: &Settings) -> Result<()> {
    let worker = Worker::new(backend, settings.worker.poll_timeout_seconds);
    let one_shot = settings.worker.one_shot;

    tokio::select! {
        result = worker.run(one_shot) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    Ok(())
}
