use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("grouping failed: {0}")]
    Grouping(String),
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Write side of the hosting platform: one upload per piece plus per-category
/// playlist placement.
#[async_trait::async_trait]
pub trait UploadSink: Send + Sync {
    async fn upload(&self, path: &Path, title: &str, description: &str) -> SinkResult<String>;
    async fn ensure_group(&self, name: &str) -> SinkResult<String>;
    async fn add_to_group(&self, remote_id: &str, group_id: &str) -> SinkResult<()>;
}
