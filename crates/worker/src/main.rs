use std::sync::Arc;

use anyhow::Context;
use storyreel_core::registry::{JobEvent, JobRegistry};
use storyreel_core::shot_state::InMemoryShotState;
use storyreel_pipeline::config::PipelineConfig;
use storyreel_pipeline::runner::JobRunner;
use storyreel_pipeline::service::GenerationService;
use storyreel_worker::{submit, WorkerRequest};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout carries only the job list.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storyreel_worker=debug,storyreel_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = PipelineConfig::from_env().context("loading configuration")?;
    tracing::info!(
        text_model = %config.text_model,
        image_model = %config.image_model,
        video_model = %config.video_model,
        "Worker starting",
    );

    let service = Arc::new(GenerationService::from_config(config).context("building clients")?);
    let registry = Arc::new(JobRegistry::new(Arc::new(InMemoryShotState::new())));
    let runner = Arc::new(JobRunner::new(Arc::clone(&registry)));

    let mut events = registry.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(JobEvent::Submitted { job }) => {
                    tracing::debug!(job_id = %job.id, kind = %job.kind, name = %job.name, "Submitted")
                }
                Ok(JobEvent::Updated { job }) => {
                    tracing::debug!(job_id = %job.id, status = %job.status, progress = job.progress, "Updated")
                }
                Ok(JobEvent::Removed { job_id }) => tracing::debug!(job_id = %job_id, "Removed"),
                Ok(JobEvent::Cleared { count }) => tracing::debug!(count, "Cleared"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling running jobs");
                runner.cancel_all();
            }
        });
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        line_no += 1;
        match WorkerRequest::parse_line(&line) {
            Ok(Some(request)) => {
                submit(&runner, Arc::clone(&service), request).await;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(line = line_no, error = %e, "Skipping malformed request"),
        }
    }

    runner.wait_all().await;

    let jobs = registry.list().await;
    println!("{}", serde_json::to_string_pretty(&jobs)?);
    Ok(())
}
