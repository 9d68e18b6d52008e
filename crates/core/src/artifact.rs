//! Deterministic artifact naming.
//!
//! Every file a job touches is named after the queue message id, so the
//! staging directory, the intermediate archive, and the result artifact
//! can all be derived without any shared state:
//!
//! - local input:   `{message_id}.{ext}` (extension taken from the source key)
//! - config script: `{message_id}.txt`
//! - archive:       `{message_id}.tar.gz`
//! - result:        `{output_prefix}/{message_id}.png`

use crate::error::CoreError;

/// Extension appended to the result artifact produced downstream.
pub const RESULT_EXTENSION: &str = "png";

/// Derive the local input file name from the message id and the source
/// object key.
///
/// The extension is the first segment after the first `.` in the key
/// (`in/img.jpg` -> `jpg`, `data.tar.gz` -> `tar`). A key without an
/// extension is an error: the packaging step requires one.
pub fn input_file_name(message_id: &str, object_key: &str) -> Result<String, CoreError> {
    let extension = object_key
        .split('.')
        .nth(1)
        .filter(|ext| !ext.is_empty())
        .ok_or_else(|| CoreError::MissingExtension(object_key.to_string()))?;
    Ok(format!("{message_id}.{extension}"))
}

/// Name of the per-job config script holding the scheduler's
/// environment directives.
pub fn config_script_name(message_id: &str) -> String {
    format!("{message_id}.txt")
}

/// Name of the packaged input archive uploaded for remote execution.
pub fn archive_name(message_id: &str) -> String {
    format!("{message_id}.tar.gz")
}

/// Full key of the result artifact inside the output bucket.
pub fn result_key(output_prefix: &str, message_id: &str) -> String {
    format!("{output_prefix}/{message_id}.{RESULT_EXTENSION}")
}
