use thiserror::Error;

use crate::ledger::LedgerError;
use crate::media::MediaError;
use crate::sink::SinkError;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("duration probe failed: {0}")]
    Probe(String),
    #[error("split failed: {0}")]
    Split(String),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("grouping failed: {0}")]
    Grouping(String),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl ArchiveError {
    pub(crate) fn download(error: MediaError) -> Self {
        ArchiveError::Download(error.to_string())
    }

    pub(crate) fn probe(error: MediaError) -> Self {
        ArchiveError::Probe(error.to_string())
    }

    pub(crate) fn split(error: MediaError) -> Self {
        ArchiveError::Split(error.to_string())
    }
}

impl From<SinkError> for ArchiveError {
    fn from(error: SinkError) -> Self {
        match error {
            SinkError::Upload(message) => ArchiveError::Upload(message),
            SinkError::Grouping(message) => ArchiveError::Grouping(message),
        }
    }
}

pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;
