use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One archived broadcast as reported by the streaming platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordingRecord {
    pub id: String,
    pub url: String,
    /// Conventionally "<Category> | <rest>".
    pub title: String,
    /// May be blank; the title prefix then stands in for it.
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source credentials expired")]
    AuthExpired,
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Read side of the streaming platform: recent recordings and live status.
#[async_trait::async_trait]
pub trait RecordingSource: Send + Sync {
    async fn list_recent(&self, limit: usize) -> SourceResult<Vec<RecordingRecord>>;
    async fn is_live(&self) -> SourceResult<bool>;
}

/// Injected credential refresh. Returns the new token value; the caller
/// decides where it is persisted.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn refresh(&self) -> SourceResult<String>;
}

/// Durable home for the current access token.
pub trait SecretStore: Send + Sync {
    fn get_token(&self) -> std::io::Result<Option<String>>;
    fn set_token(&self, token: &str) -> std::io::Result<()>;
}
