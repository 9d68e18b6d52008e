#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid notification: {0}")]
    Notification(String),

    #[error("Object key has no file extension: '{0}'")]
    MissingExtension(String),

    #[error("Invalid bucket location '{0}': expected 'bucket/prefix'")]
    Location(String),
}
