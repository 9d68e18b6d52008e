//! gpuq-core
//!
//! Pure domain logic shared by the gpuq crates: S3 event notification
//! parsing, deterministic artifact naming, and bucket-location handling.
//! No I/O lives here.

pub mod artifact;
pub mod error;
pub mod location;
pub mod notification;

pub use error::CoreError;
