//! gpuq-cloud
//!
//! AWS transport wrappers for the dispatcher: the SQS queue consumer and
//! the S3 object store. Both sit behind traits so the dispatch layer can
//! be exercised without AWS credentials.

pub mod queue;
pub mod store;

pub use queue::{MessageQueue, QueueError, QueueMessage, SqsQueue};
pub use store::{ObjectStore, S3Store, StoreError};
