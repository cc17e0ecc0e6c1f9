mod error;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::fs;
use tracing::{info, warn};

use crate::config::ArchiverConfig;
use crate::ledger::{LedgerEntry, SqliteLedgerStore};
use crate::media::MediaToolkit;
use crate::naming::{continuous_output, derive_category, segmented_output, OutputName};
use crate::segment::{classify, RecordingClass, SegmentPlan};
use crate::sink::UploadSink;
use crate::source::{CredentialProvider, RecordingRecord, RecordingSource, SecretStore, SourceError};

pub use error::{ArchiveError, ArchiveResult};

/// Drives one archive pass: list pending recordings, process each in order,
/// canonicalize the ledger, clear staging. Strictly sequential; a single
/// recording's failure never aborts the run.
pub struct Archiver {
    ledger: SqliteLedgerStore,
    source: Arc<dyn RecordingSource>,
    credentials: Arc<dyn CredentialProvider>,
    secrets: Arc<dyn SecretStore>,
    toolkit: Arc<dyn MediaToolkit>,
    sink: Arc<dyn UploadSink>,
    config: Arc<ArchiverConfig>,
}

impl Archiver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: SqliteLedgerStore,
        source: Arc<dyn RecordingSource>,
        credentials: Arc<dyn CredentialProvider>,
        secrets: Arc<dyn SecretStore>,
        toolkit: Arc<dyn MediaToolkit>,
        sink: Arc<dyn UploadSink>,
        config: ArchiverConfig,
    ) -> Self {
        Self {
            ledger,
            source,
            credentials,
            secrets,
            toolkit,
            sink,
            config: Arc::new(config),
        }
    }

    pub async fn run(&self) -> ArchiveResult<RunReport> {
        self.ledger.initialize()?;

        let recordings = self.list_recent().await?;
        let live = if self.config.source.live_guard && !recordings.is_empty() {
            self.is_live().await?
        } else {
            false
        };

        let mut outcomes = Vec::with_capacity(recordings.len());
        for (index, recording) in recordings.iter().enumerate() {
            // The most recent recording of a live channel is still growing.
            let live_guard = live && index == 0;
            let outcome = match self.process_recording(recording, live_guard).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(
                        vod_id = %recording.id,
                        title = %recording.title,
                        error = %err,
                        "recording failed, continuing with the next one"
                    );
                    RecordingOutcome {
                        vod_id: recording.id.clone(),
                        title: recording.title.clone(),
                        status: OutcomeStatus::Failed {
                            reason: err.to_string(),
                        },
                    }
                }
            };
            outcomes.push(outcome);
        }

        self.ledger.canonicalize()?;
        self.clear_staging().await;

        Ok(RunReport { outcomes })
    }

    async fn process_recording(
        &self,
        recording: &RecordingRecord,
        live_guard: bool,
    ) -> ArchiveResult<RecordingOutcome> {
        // Fresh snapshot per recording: an earlier recording in this run may
        // have advanced the same category's part sequence.
        let entries = self.ledger.load()?;

        if SqliteLedgerStore::is_processed(&recording.id, &entries) {
            info!(vod_id = %recording.id, "already archived, skipping");
            return Ok(RecordingOutcome::skipped(recording, SkipReason::AlreadyProcessed));
        }
        if live_guard {
            info!(vod_id = %recording.id, "source is live, deferring most recent recording");
            return Ok(RecordingOutcome::skipped(recording, SkipReason::SourceLive));
        }

        let local = self
            .toolkit
            .download(&recording.url, &recording.id)
            .await
            .map_err(ArchiveError::download)?;

        let category = derive_category(&recording.title, &recording.category);
        let class = classify(
            &recording.title,
            &recording.category,
            &self.config.segmentation.continuous_categories,
        );
        let last_part = SqliteLedgerStore::last_part_number(&category, &entries);

        let final_part = match class {
            RecordingClass::Continuous => {
                let part = last_part + 1;
                let name = continuous_output(&recording.title, part);
                self.publish(&local, &name, &category).await?;
                self.ledger
                    .append(&LedgerEntry::new(&recording.id, &category, part))?;
                part
            }
            RecordingClass::Segmented => {
                let duration = self
                    .toolkit
                    .probe_duration(&local)
                    .await
                    .map_err(ArchiveError::probe)?;
                let plan = SegmentPlan::for_duration(
                    duration,
                    self.config.segmentation.target_segment_seconds,
                );
                let pieces = if plan.segment_count > 1 {
                    self.toolkit
                        .split(&local, plan.segment_duration_s)
                        .await
                        .map_err(ArchiveError::split)?
                } else {
                    vec![local.clone()]
                };
                // An empty piece list would record a part number that was
                // never uploaded.
                if pieces.is_empty() {
                    return Err(ArchiveError::Split(
                        "splitter returned no pieces".to_string(),
                    ));
                }
                // The splitter's actual output count is authoritative, not
                // the plan's target.
                let mut part = last_part;
                for piece in &pieces {
                    part += 1;
                    let name = segmented_output(&recording.title, part);
                    self.publish(piece, &name, &category).await?;
                }
                self.ledger
                    .append(&LedgerEntry::new(&recording.id, &category, part))?;
                part
            }
        };

        info!(
            vod_id = %recording.id,
            category = %category,
            final_part,
            "recording archived"
        );
        Ok(RecordingOutcome {
            vod_id: recording.id.clone(),
            title: recording.title.clone(),
            status: OutcomeStatus::Archived {
                class,
                category,
                parts: final_part - last_part,
                final_part,
            },
        })
    }

    async fn publish(
        &self,
        path: &Path,
        name: &OutputName,
        category: &str,
    ) -> ArchiveResult<()> {
        let remote_id = self
            .sink
            .upload(path, &name.title, &name.description)
            .await?;
        if self.config.upload.playlist_per_category {
            let group_id = self.sink.ensure_group(category).await?;
            self.sink.add_to_group(&remote_id, &group_id).await?;
        }
        Ok(())
    }

    async fn list_recent(&self) -> ArchiveResult<Vec<RecordingRecord>> {
        let limit = self.config.source.fetch_limit;
        match self.source.list_recent(limit).await {
            Ok(records) => Ok(records),
            Err(SourceError::AuthExpired) => {
                self.refresh_credentials().await?;
                self.source
                    .list_recent(limit)
                    .await
                    .map_err(|err| ArchiveError::SourceUnavailable(err.to_string()))
            }
            Err(SourceError::Unavailable(message)) => {
                Err(ArchiveError::SourceUnavailable(message))
            }
        }
    }

    async fn is_live(&self) -> ArchiveResult<bool> {
        match self.source.is_live().await {
            Ok(live) => Ok(live),
            Err(SourceError::AuthExpired) => {
                self.refresh_credentials().await?;
                self.source
                    .is_live()
                    .await
                    .map_err(|err| ArchiveError::SourceUnavailable(err.to_string()))
            }
            Err(SourceError::Unavailable(message)) => {
                Err(ArchiveError::SourceUnavailable(message))
            }
        }
    }

    /// One transparent recovery per call site: refresh, persist the new
    /// token, then the caller retries exactly once.
    async fn refresh_credentials(&self) -> ArchiveResult<()> {
        let token = self
            .credentials
            .refresh()
            .await
            .map_err(|err| ArchiveError::SourceUnavailable(err.to_string()))?;
        self.secrets
            .set_token(&token)
            .map_err(|err| ArchiveError::SourceUnavailable(err.to_string()))?;
        info!("refreshed source credentials");
        Ok(())
    }

    /// Staging is cleared only after a full run; a crash mid-run leaves
    /// stale files for the next run to overwrite.
    async fn clear_staging(&self) {
        for dir in [self.config.downloads_dir(), self.config.segments_dir()] {
            if let Err(err) = fs::remove_dir_all(&dir).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %dir.display(), error = %err, "failed to clear staging directory");
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<RecordingOutcome>,
}

impl RunReport {
    pub fn archived(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Archived { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Skipped { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingOutcome {
    pub vod_id: String,
    pub title: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl RecordingOutcome {
    fn skipped(recording: &RecordingRecord, reason: SkipReason) -> Self {
        Self {
            vod_id: recording.id.clone(),
            title: recording.title.clone(),
            status: OutcomeStatus::Skipped { reason },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Skipped {
        reason: SkipReason,
    },
    Archived {
        class: RecordingClass,
        category: String,
        parts: u32,
        final_part: u32,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyProcessed,
    SourceLive,
}
