//! Scheduler allocation response parsing.
//!
//! The scheduler CLI reports through a semicolon-terminated stream of
//! `key=value` tokens on stdout:
//!
//! ```text
//! SSGM_ERROR=0;SSGM_JOB_ID=42;RCUDA_DEVICE=host:0;RCUDA_DEVICE_COUNT=1;
//! ```
//!
//! Token 0 carries the status code, token 1 the scheduler job id, and
//! every later token an environment directive whose value is written
//! verbatim (order preserved) into the job's config script. Malformed
//! streams fail closed as a request error -- they are never truncated
//! into a partial grant.

/// Status code value meaning the allocation was granted.
pub const STATUS_GRANTED: &str = "0";
/// Status code value meaning the request itself failed.
pub const STATUS_REQUEST_ERROR: &str = "1";
/// Status code value meaning the resource manager has no capacity.
pub const STATUS_BUSY: &str = "2";

/// A granted claim on scheduler resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantedLease {
    /// Scheduler-assigned job id, required for deallocation.
    pub job_id: String,
    /// Environment directives for the job script, order preserved.
    pub config_lines: Vec<String>,
}

/// Outcome of a single allocation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// Resources were allocated.
    Granted(GrantedLease),
    /// The resource manager has no capacity right now; retry later.
    Busy,
    /// The attempt failed permanently for this message.
    RequestError(String),
    /// The allocation deadline elapsed before the scheduler answered.
    TimedOut,
}

/// Parse the raw stdout of an allocation invocation.
///
/// The stream is `;`-terminated, so exactly one trailing empty token is
/// tolerated. A busy or error status needs only the status token; a
/// grant additionally requires a non-empty job id token.
pub fn parse_alloc_response(raw: &str) -> AllocationOutcome {
    let trimmed = raw.trim();
    let mut tokens: Vec<&str> = trimmed.split(';').collect();
    if tokens.last() == Some(&"") {
        tokens.pop();
    }

    let values = match tokens.iter().map(|t| token_value(t)).collect::<Option<Vec<_>>>() {
        Some(values) if !values.is_empty() => values,
        _ => {
            return AllocationOutcome::RequestError(format!(
                "malformed scheduler response: '{trimmed}'"
            ))
        }
    };

    match values[0] {
        STATUS_BUSY => AllocationOutcome::Busy,
        STATUS_REQUEST_ERROR => {
            AllocationOutcome::RequestError("scheduler reported a request error".to_string())
        }
        STATUS_GRANTED => match values.get(1) {
            Some(job_id) if !job_id.is_empty() => AllocationOutcome::Granted(GrantedLease {
                job_id: job_id.to_string(),
                config_lines: values[2..].iter().map(|v| v.to_string()).collect(),
            }),
            _ => AllocationOutcome::RequestError(format!(
                "scheduler granted without a job id: '{trimmed}'"
            )),
        },
        other => {
            AllocationOutcome::RequestError(format!("unknown scheduler status code '{other}'"))
        }
    }
}

/// The value part of a `key=value` token, or `None` when the `=` is
/// missing entirely.
fn token_value(token: &str) -> Option<&str> {
    token.split('=').nth(1)
}
