//! The per-job unit of work.
//!
//! A job task walks `Staged -> Uploaded -> AwaitingResult -> Completed`,
//! failing over to `Failed` on the first unrecoverable step. Release of
//! the GPU lease is not handled here -- the supervisor wraps this body
//! and releases on every exit path, including panics.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gpuq_cloud::ObjectStore;
use gpuq_core::artifact;
use gpuq_core::location::BucketLocation;
use gpuq_core::notification::{parse_notification, SourceObject};

use crate::error::DispatchError;
use crate::invoker::FunctionInvoker;
use crate::poller::poll_until_present;

/// Immutable per-job parameters shared by all tasks.
#[derive(Debug, Clone)]
pub struct JobParams {
    /// Directory holding per-job staging files (input, script, archive).
    pub staging_dir: PathBuf,
    /// Intermediate location the archive is handed off to.
    pub intermediate: BucketLocation,
    /// Output location watched for the result artifact.
    pub output: BucketLocation,
    /// Fixed interval between result-poll listings.
    pub result_poll_interval: Duration,
}

/// File names derived during staging, all relative to the staging dir.
#[derive(Debug)]
struct StagedJob {
    source: SourceObject,
    input_name: String,
    script_name: String,
    archive_name: String,
}

/// Run one job to completion. Every early return is a `Failed` terminal
/// state; falling off the end is `Completed`.
pub async fn run_job(
    store: &dyn ObjectStore,
    invoker: &dyn FunctionInvoker,
    params: &JobParams,
    message_id: &str,
    body: &str,
    config_lines: &[String],
) -> Result<(), DispatchError> {
    let staged = stage(params, message_id, body, config_lines).await?;
    tracing::info!(
        message_id,
        bucket = %staged.source.bucket,
        key = %staged.source.key,
        "Job staged",
    );

    upload(store, invoker, params, &staged).await?;
    tracing::info!(message_id, archive = %staged.archive_name, "Job archive handed off");

    let needle = artifact::result_key(&params.output.prefix, message_id);
    poll_until_present(
        store,
        &params.output.bucket,
        &needle,
        params.result_poll_interval,
    )
    .await?;

    Ok(())
}

/// Parse the notification, derive the staging file names, and write the
/// scheduler's environment directives into the job's config script
/// (verbatim, order preserved, one line each).
async fn stage(
    params: &JobParams,
    message_id: &str,
    body: &str,
    config_lines: &[String],
) -> Result<StagedJob, DispatchError> {
    let source = parse_notification(body)?;
    let input_name = artifact::input_file_name(message_id, &source.key)?;
    let script_name = artifact::config_script_name(message_id);
    let archive_name = artifact::archive_name(message_id);

    tokio::fs::create_dir_all(&params.staging_dir).await?;

    let script: String = config_lines.iter().map(|line| format!("{line}\n")).collect();
    tokio::fs::write(params.staging_dir.join(&script_name), script).await?;

    Ok(StagedJob {
        source,
        input_name,
        script_name,
        archive_name,
    })
}

/// Download the source object, package it with the config script, and
/// hand the archive off for remote execution.
async fn upload(
    store: &dyn ObjectStore,
    invoker: &dyn FunctionInvoker,
    params: &JobParams,
    staged: &StagedJob,
) -> Result<(), DispatchError> {
    store
        .download(
            &staged.source.bucket,
            &staged.source.key,
            &params.staging_dir.join(&staged.input_name),
        )
        .await?;

    package(
        &params.staging_dir,
        &staged.archive_name,
        &staged.script_name,
        &staged.input_name,
    )
    .await?;

    let archive_key = params.intermediate.key_for(&staged.archive_name);
    invoker
        .invoke(&params.staging_dir.join(&staged.archive_name), &archive_key)
        .await?;

    Ok(())
}

/// Bundle the config script and the input into a gzipped tarball via the
/// system `tar`, with paths relative to the staging dir so the archive
/// contents carry bare file names.
async fn package(
    staging_dir: &Path,
    archive_name: &str,
    script_name: &str,
    input_name: &str,
) -> Result<(), DispatchError> {
    let output = tokio::process::Command::new("tar")
        .current_dir(staging_dir)
        .args(["-czf", archive_name, script_name, input_name])
        .output()
        .await?;

    if !output.status.success() {
        return Err(DispatchError::Package {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}
