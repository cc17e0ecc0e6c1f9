pub mod adapters;
pub mod archiver;
pub mod config;
pub mod error;
pub mod ledger;
pub mod media;
pub mod naming;
pub mod segment;
pub mod sink;
pub mod source;
pub mod sqlite;

pub use archiver::{ArchiveError, ArchiveResult, Archiver, OutcomeStatus, RecordingOutcome, RunReport, SkipReason};
pub use config::{load_archiver_config, ArchiverConfig};
pub use error::{ConfigError, Result};
pub use ledger::{LedgerEntry, LedgerError, LedgerResult, SqliteLedgerStore, SqliteLedgerStoreBuilder};
pub use media::{CommandExecutor, MediaError, MediaResult, MediaToolkit, SystemCommandExecutor, SystemMediaToolkit};
pub use naming::{continuous_output, derive_category, segmented_output, OutputName};
pub use segment::{classify, RecordingClass, SegmentPlan, DEFAULT_TARGET_SEGMENT_SECONDS};
pub use sink::{SinkError, SinkResult, UploadSink};
pub use source::{CredentialProvider, RecordingRecord, RecordingSource, SecretStore, SourceError, SourceResult};
