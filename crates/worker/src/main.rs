//! `gpuq-worker` -- GPU job dispatcher daemon.
//!
//! Long-polls an SQS queue for S3 event notifications, allocates a GPU
//! lease from the external scheduler for each message, stages the source
//! object plus the lease's environment directives into an archive,
//! triggers remote execution, and polls the output bucket for the result
//! artifact -- releasing every lease exactly once, including on
//! interrupt.
//!
//! # Environment variables
//!
//! | Variable                      | Required | Default | Description                                   |
//! |-------------------------------|----------|---------|-----------------------------------------------|
//! | `GPUQ_QUEUE_NAME`             | yes      | --      | SQS queue name                                |
//! | `GPUQ_SCHEDULER_PATH`         | yes      | --      | Scheduler CLI binary path                     |
//! | `GPUQ_SCHEDULER_ADDRESS`      | yes      | --      | Resource manager address                      |
//! | `GPUQ_SCHEDULER_PORT`         | yes      | --      | Resource manager port                         |
//! | `GPUQ_INTERMEDIATE_LOCATION`  | yes      | --      | `bucket/prefix` for packaged archives         |
//! | `GPUQ_OUTPUT_LOCATION`        | yes      | --      | `bucket/prefix` watched for result artifacts  |
//! | `GPUQ_GPU_COUNT`              | no       | `1`     | GPUs requested per allocation                 |
//! | `GPUQ_VISIBILITY_TIMEOUT_SECS`| no       | `30`    | SQS visibility timeout                        |
//! | `GPUQ_WAIT_TIME_SECS`         | no       | `20`    | SQS long-poll wait time                       |
//! | `GPUQ_EMPTY_QUEUE_WAIT_SECS`  | no       | `10`    | Backoff after an empty poll                   |
//! | `GPUQ_ALLOC_RETRY_SECS`       | no       | `30`    | Sleep between busy allocation attempts        |
//! | `GPUQ_ALLOC_DEADLINE_SECS`    | no       | unset   | Wall-clock deadline per allocation attempt    |
//! | `GPUQ_RESULT_POLL_SECS`       | no       | `60`    | Interval between output bucket listings       |
//! | `GPUQ_STAGING_DIR`            | no       | `/tmp`  | Directory for per-job staging files           |
//! | `GPUQ_INVOKER_PATH`           | no       | unset   | Invoker CLI binary; unset = direct S3 upload  |

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gpuq_cloud::{ObjectStore, S3Store, SqsQueue};
use gpuq_dispatch::{CliInvoker, DispatchSupervisor, FunctionInvoker, JobParams, UploadInvoker};
use gpuq_sched::{Scheduler, SsgmCli};
use gpuq_worker::config::WorkerConfig;
use gpuq_worker::consumer::Consumer;
use gpuq_worker::shutdown::shutdown_signal;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gpuq=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(started_at = %chrono::Utc::now().to_rfc3339(), "Starting gpuq-worker");

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Configuration error");
            std::process::exit(1);
        }
    };
    tracing::info!(
        queue = %config.queue_name,
        gpus = config.sched.gpus,
        intermediate = %config.intermediate,
        output = %config.output,
        "Loaded worker configuration",
    );

    let (consumer, supervisor) = match bootstrap(&config).await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let exit_code = tokio::select! {
        result = consumer.run(cancel.clone()) => {
            match result {
                Ok(()) => 0,
                Err(e) => {
                    tracing::error!(error = %e, "Queue transport failure, shutting down");
                    1
                }
            }
        }
        _ = shutdown_signal() => {
            cancel.cancel();
            0
        }
    };

    // Whatever ended the loop, no lease may outlive the process.
    let released = supervisor.release_all().await;
    tracing::info!(released, "gpuq-worker exiting");
    std::process::exit(exit_code);
}

/// Build the AWS transports and wire the dispatch stack.
async fn bootstrap(
    config: &WorkerConfig,
) -> anyhow::Result<(Consumer, Arc<DispatchSupervisor>)> {
    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let queue = SqsQueue::connect(
        aws_sdk_sqs::Client::new(&aws),
        &config.queue_name,
        config.visibility_timeout_secs,
        config.wait_time_secs,
    )
    .await
    .context("resolving the queue")?;

    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(aws_sdk_s3::Client::new(&aws)));
    let scheduler: Arc<dyn Scheduler> = Arc::new(SsgmCli::new(config.sched.clone()));

    let invoker: Arc<dyn FunctionInvoker> = match &config.invoker_program {
        Some(program) => Arc::new(CliInvoker::new(
            program.clone(),
            config.intermediate.bucket.clone(),
        )),
        None => Arc::new(UploadInvoker::new(
            Arc::clone(&store),
            config.intermediate.bucket.clone(),
        )),
    };

    let supervisor = Arc::new(DispatchSupervisor::new(
        Arc::clone(&scheduler),
        store,
        invoker,
        JobParams {
            staging_dir: config.staging_dir.clone(),
            intermediate: config.intermediate.clone(),
            output: config.output.clone(),
            result_poll_interval: config.result_poll_interval,
        },
    ));

    let consumer = Consumer::new(
        Arc::new(queue),
        scheduler,
        Arc::clone(&supervisor),
        config.empty_queue_backoff,
        config.alloc_retry_interval,
    );

    Ok((consumer, supervisor))
}
