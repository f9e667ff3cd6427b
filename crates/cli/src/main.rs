//! Command-line front end for the workflow orchestrator: schedule a DAG
//! run, drain the queue as a one-shot worker, or inspect status.

use clap::{Parser, Subcommand};
use orchestrator_common::{telemetry, RunStatus, Settings};
use orchestrator_core::{persistence::Persistence, Dag};
use orchestrator_engine::backend::InMemoryBackend;
#[cfg(feature = "redis-backend")]
use orchestrator_engine::backend::RedisBackend;
use orchestrator_engine::{Scheduler, Worker};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "orchestrator-cli", version, about = "Workflow orchestrator control plane")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a DAG document and schedule a run.
    Schedule {
        /// Path to the DAG document (JSON).
        #[arg(long)]
        dag: String,
        /// Identifier for this run.
        #[arg(long)]
        run_id: String,
    },
    /// Run the poll loop. Defaults to looping forever; pass `--one-shot`
    /// to drain the queue until empty and exit instead.
    Worker {
        /// Exit once the queue is empty instead of polling forever.
        #[arg(long)]
        one_shot: bool,
    },
    /// Print the status record for a run or a single task.
    Status {
        /// Run identifier.
        #[arg(long)]
        run_id: String,
        /// Task identifier; omit to print the run's own status.
        #[arg(long)]
        task_id: Option<String>,
    },
    /// Mark a run cancelled; in-flight and future attempts for the run
    /// skip execution the next time a worker picks them up.
    Cancel {
        /// Run identifier.
        #[arg(long)]
        run_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    telemetry::init_logging(&settings.observability);

    let cli = Cli::parse();

    match &settings.redis_url {
        #[cfg(feature = "redis-backend")]
        Some(url) => {
            let backend = Arc::new(RedisBackend::connect(url).await?);
            run(cli, backend, &settings).await
        }
        _ => {
            let backend = Arc::new(InMemoryBackend::new());
            run(cli, backend, &settings).await
        }
    }
}

async fn run<P: Persistence + 'static>(cli: Cli, backend: Arc<P>, settings: &Settings) -> anyhow::Result<()> {
    match cli.command {
        Commands::Schedule { dag, run_id } => {
            let document = std::fs::read_to_string(&dag)?;
            let dag: Dag = serde_json::from_str(&document)?;
            let scheduler = Scheduler::new(Arc::clone(&backend));
            scheduler.schedule_dag(&dag, &run_id).await?;
            println!("scheduled run '{run_id}' for DAG '{}'", dag.id);
        }
        Commands::Worker { one_shot } => {
            let worker = Worker::new(backend, settings.worker.poll_timeout_seconds);
            worker.run(one_shot || settings.worker.one_shot).await?;
        }
        Commands::Status { run_id, task_id } => {
            let key = match task_id {
                Some(task_id) => orchestrator_core::plan::canonical_status_key(&run_id, &task_id),
                None => format!("run:{run_id}"),
            };
            let record = backend.get_status(&key).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Cancel { run_id } => {
            let key = format!("run:{run_id}");
            let existing = backend.get_status(&key).await?;
            let meta = serde_json::to_value(existing.meta)?;
            backend.save_status(&key, RunStatus::Cancelled.as_str(), meta).await?;
            println!("run '{run_id}' marked cancelled");
        }
    }
    Ok(())
}
