//! Worker configuration from the process environment.
//!
//! Every knob of the dispatcher is an environment variable (see the
//! table in `main.rs`). Parsing happens once at startup; any missing or
//! malformed value aborts the process before it touches the queue.

use std::path::PathBuf;
use std::time::Duration;

use gpuq_core::location::BucketLocation;
use gpuq_sched::SchedConfig;

/// Default number of GPUs requested per allocation.
const DEFAULT_GPU_COUNT: u32 = 1;
/// Default SQS visibility timeout in seconds.
const DEFAULT_VISIBILITY_TIMEOUT_SECS: i32 = 30;
/// Default SQS long-poll wait time in seconds.
const DEFAULT_WAIT_TIME_SECS: i32 = 20;
/// Default backoff after an empty poll, in seconds.
const DEFAULT_EMPTY_QUEUE_WAIT_SECS: u64 = 10;
/// Default sleep between busy allocation attempts, in seconds.
const DEFAULT_ALLOC_RETRY_SECS: u64 = 30;
/// Default interval between result-poll listings, in seconds.
const DEFAULT_RESULT_POLL_SECS: u64 = 60;
/// Default staging directory for per-job files.
const DEFAULT_STAGING_DIR: &str = "/tmp";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is required")]
    Missing(&'static str),

    #[error("Environment variable {var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Fully parsed dispatcher configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue_name: String,
    pub visibility_timeout_secs: i32,
    pub wait_time_secs: i32,
    pub empty_queue_backoff: Duration,
    pub alloc_retry_interval: Duration,
    pub sched: SchedConfig,
    pub staging_dir: PathBuf,
    pub intermediate: BucketLocation,
    pub output: BucketLocation,
    pub result_poll_interval: Duration,
    /// Invoker CLI binary; when unset, archives are handed off by
    /// uploading them directly to the intermediate bucket.
    pub invoker_program: Option<PathBuf>,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let gpus: u32 = parse_or("GPUQ_GPU_COUNT", DEFAULT_GPU_COUNT)?;
        if gpus < 1 {
            return Err(ConfigError::Invalid {
                var: "GPUQ_GPU_COUNT",
                reason: "must be at least 1".to_string(),
            });
        }

        let alloc_deadline = optional("GPUQ_ALLOC_DEADLINE_SECS")
            .map(|v| parse_value("GPUQ_ALLOC_DEADLINE_SECS", &v))
            .transpose()?
            .map(Duration::from_secs);

        let sched = SchedConfig {
            program: PathBuf::from(required("GPUQ_SCHEDULER_PATH")?),
            address: required("GPUQ_SCHEDULER_ADDRESS")?,
            port: required("GPUQ_SCHEDULER_PORT")?,
            gpus,
            alloc_deadline,
        };

        Ok(Self {
            queue_name: required("GPUQ_QUEUE_NAME")?,
            visibility_timeout_secs: parse_or(
                "GPUQ_VISIBILITY_TIMEOUT_SECS",
                DEFAULT_VISIBILITY_TIMEOUT_SECS,
            )?,
            wait_time_secs: parse_or("GPUQ_WAIT_TIME_SECS", DEFAULT_WAIT_TIME_SECS)?,
            empty_queue_backoff: Duration::from_secs(parse_or(
                "GPUQ_EMPTY_QUEUE_WAIT_SECS",
                DEFAULT_EMPTY_QUEUE_WAIT_SECS,
            )?),
            alloc_retry_interval: Duration::from_secs(parse_or(
                "GPUQ_ALLOC_RETRY_SECS",
                DEFAULT_ALLOC_RETRY_SECS,
            )?),
            sched,
            staging_dir: PathBuf::from(
                optional("GPUQ_STAGING_DIR").unwrap_or_else(|| DEFAULT_STAGING_DIR.to_string()),
            ),
            intermediate: location("GPUQ_INTERMEDIATE_LOCATION")?,
            output: location("GPUQ_OUTPUT_LOCATION")?,
            result_poll_interval: Duration::from_secs(parse_or(
                "GPUQ_RESULT_POLL_SECS",
                DEFAULT_RESULT_POLL_SECS,
            )?),
            invoker_program: optional("GPUQ_INVOKER_PATH").map(PathBuf::from),
        })
    }
}

fn optional(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::Missing(var))
}

fn parse_value<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

fn parse_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(var) {
        Some(value) => parse_value(var, &value),
        None => Ok(default),
    }
}

fn location(var: &'static str) -> Result<BucketLocation, ConfigError> {
    required(var)?
        .parse()
        .map_err(|e: gpuq_core::CoreError| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        })
}
