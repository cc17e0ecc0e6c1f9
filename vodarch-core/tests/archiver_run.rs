use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vodarch_core::config::{
    ArchiverConfig, PathsSection, SegmentationSection, SourceSection, ToolsSection, UploadSection,
};
use vodarch_core::media::{MediaError, MediaResult, MediaToolkit};
use vodarch_core::sink::{SinkError, SinkResult, UploadSink};
use vodarch_core::source::{
    CredentialProvider, RecordingRecord, RecordingSource, SecretStore, SourceError, SourceResult,
};
use vodarch_core::{Archiver, OutcomeStatus, SkipReason, SqliteLedgerStore};

fn test_config(root: &Path, live_guard: bool) -> ArchiverConfig {
    ArchiverConfig {
        paths: PathsSection {
            base_dir: root.to_string_lossy().to_string(),
            data_dir: "data".into(),
            downloads_dir: "staging/vods".into(),
            segments_dir: "staging/segments".into(),
            logs_dir: "logs".into(),
        },
        source: SourceSection {
            fetch_limit: 10,
            live_guard,
        },
        segmentation: SegmentationSection {
            target_segment_seconds: 1800.0,
            continuous_categories: vec!["Just Chatting".into()],
        },
        upload: UploadSection {
            tags: vec![],
            privacy: "public".into(),
            playlist_per_category: true,
        },
        tools: ToolsSection {
            streamlink: "streamlink".into(),
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
            list_script: "scripts/source.sh".into(),
            upload_script: "scripts/uploader.sh".into(),
        },
    }
}

fn recording(id: &str, title: &str, category: &str) -> RecordingRecord {
    RecordingRecord {
        id: id.to_string(),
        url: format!("https://source.example/videos/{id}"),
        title: title.to_string(),
        category: category.to_string(),
        created_at: None,
    }
}

struct FakeSource {
    records: Vec<RecordingRecord>,
    live: bool,
    auth_failures: AtomicUsize,
}

impl FakeSource {
    fn new(records: Vec<RecordingRecord>, live: bool) -> Self {
        Self {
            records,
            live,
            auth_failures: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl RecordingSource for FakeSource {
    async fn list_recent(&self, limit: usize) -> SourceResult<Vec<RecordingRecord>> {
        if self.auth_failures.load(Ordering::SeqCst) > 0 {
            self.auth_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(SourceError::AuthExpired);
        }
        Ok(self.records.iter().take(limit).cloned().collect())
    }

    async fn is_live(&self) -> SourceResult<bool> {
        Ok(self.live)
    }
}

struct FakeCredentials;

#[async_trait::async_trait]
impl CredentialProvider for FakeCredentials {
    async fn refresh(&self) -> SourceResult<String> {
        Ok("fresh-token".to_string())
    }
}

#[derive(Default)]
struct MemorySecrets {
    token: Mutex<Option<String>>,
}

impl SecretStore for MemorySecrets {
    fn get_token(&self) -> std::io::Result<Option<String>> {
        Ok(self.token.lock().unwrap().clone())
    }

    fn set_token(&self, token: &str) -> std::io::Result<()> {
        *self.token.lock().unwrap() = Some(token.to_string());
        Ok(())
    }
}

struct FakeToolkit {
    downloads_dir: PathBuf,
    segments_dir: PathBuf,
    durations: HashMap<String, f64>,
    extra_pieces: i64,
    download_calls: AtomicUsize,
    split_calls: AtomicUsize,
}

impl FakeToolkit {
    fn new(config: &ArchiverConfig, durations: &[(&str, f64)]) -> Self {
        Self {
            downloads_dir: config.downloads_dir(),
            segments_dir: config.segments_dir(),
            durations: durations
                .iter()
                .map(|(id, d)| (id.to_string(), *d))
                .collect(),
            extra_pieces: 0,
            download_calls: AtomicUsize::new(0),
            split_calls: AtomicUsize::new(0),
        }
    }

    fn stem(path: &Path) -> String {
        path.file_stem().unwrap().to_string_lossy().to_string()
    }
}

#[async_trait::async_trait]
impl MediaToolkit for FakeToolkit {
    async fn download(&self, _url: &str, vod_id: &str) -> MediaResult<PathBuf> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        std::fs::create_dir_all(&self.downloads_dir).map_err(|source| MediaError::Io {
            path: self.downloads_dir.clone(),
            source,
        })?;
        let path = self.downloads_dir.join(format!("{vod_id}.mp4"));
        std::fs::write(&path, b"media").map_err(|source| MediaError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        self.durations
            .get(&Self::stem(path))
            .copied()
            .ok_or_else(|| MediaError::Probe("no duration for fixture".into()))
    }

    async fn split(&self, path: &Path, segment_seconds: f64) -> MediaResult<Vec<PathBuf>> {
        self.split_calls.fetch_add(1, Ordering::SeqCst);
        let stem = Self::stem(path);
        let total = self.durations[&stem];
        let planned = ((total / segment_seconds).round() as i64).max(1);
        let count = (planned + self.extra_pieces).max(0) as usize;
        let out_dir = self.segments_dir.join(&stem);
        std::fs::create_dir_all(&out_dir).map_err(|source| MediaError::Io {
            path: out_dir.clone(),
            source,
        })?;
        let mut pieces = Vec::new();
        for index in 0..count {
            let piece = out_dir.join(format!("{stem}_part_{index:03}.mp4"));
            std::fs::write(&piece, b"segment").map_err(|source| MediaError::Io {
                path: piece.clone(),
                source,
            })?;
            pieces.push(piece);
        }
        Ok(pieces)
    }
}

#[derive(Default)]
struct FakeSink {
    uploads: Mutex<Vec<(String, String)>>,
    groups: Mutex<Vec<String>>,
    placements: Mutex<Vec<(String, String)>>,
    deny_title: Mutex<Option<String>>,
    fail_after: Mutex<Option<usize>>,
}

impl FakeSink {
    fn titles(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(title, _)| title.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl UploadSink for FakeSink {
    async fn upload(&self, _path: &Path, title: &str, description: &str) -> SinkResult<String> {
        if let Some(deny) = self.deny_title.lock().unwrap().as_deref() {
            if title.contains(deny) {
                return Err(SinkError::Upload(format!("rejected title {title:?}")));
            }
        }
        let mut uploads = self.uploads.lock().unwrap();
        if let Some(limit) = *self.fail_after.lock().unwrap() {
            if uploads.len() >= limit {
                return Err(SinkError::Upload("quota exceeded".into()));
            }
        }
        uploads.push((title.to_string(), description.to_string()));
        Ok(format!("remote-{}", uploads.len()))
    }

    async fn ensure_group(&self, name: &str) -> SinkResult<String> {
        self.groups.lock().unwrap().push(name.to_string());
        Ok(format!("group-{name}"))
    }

    async fn add_to_group(&self, remote_id: &str, group_id: &str) -> SinkResult<()> {
        self.placements
            .lock()
            .unwrap()
            .push((remote_id.to_string(), group_id.to_string()));
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    archiver: Archiver,
    ledger: SqliteLedgerStore,
    source: Arc<FakeSource>,
    secrets: Arc<MemorySecrets>,
    toolkit: Arc<FakeToolkit>,
    sink: Arc<FakeSink>,
}

fn harness(
    records: Vec<RecordingRecord>,
    durations: &[(&str, f64)],
    live: bool,
    extra_pieces: i64,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), live);
    let ledger = SqliteLedgerStore::new(config.ledger_db()).unwrap();
    std::fs::create_dir_all(config.ledger_db().parent().unwrap()).unwrap();
    ledger.initialize().unwrap();

    let source = Arc::new(FakeSource::new(records, live));
    let secrets = Arc::new(MemorySecrets::default());
    let mut toolkit = FakeToolkit::new(&config, durations);
    toolkit.extra_pieces = extra_pieces;
    let toolkit = Arc::new(toolkit);
    let sink = Arc::new(FakeSink::default());

    let archiver = Archiver::new(
        ledger.clone(),
        source.clone(),
        Arc::new(FakeCredentials),
        secrets.clone(),
        toolkit.clone(),
        sink.clone(),
        config,
    );
    Harness {
        _dir: dir,
        archiver,
        ledger,
        source,
        secrets,
        toolkit,
        sink,
    }
}

#[tokio::test]
async fn segmented_recording_is_split_and_numbered_in_order() {
    let h = harness(
        vec![recording("v100", "Chess | blitz arena", "Chess")],
        &[("v100", 5400.0)],
        false,
        0,
    );
    let report = h.archiver.run().await.unwrap();
    assert_eq!(report.archived(), 1);

    assert_eq!(
        h.sink.titles(),
        vec![
            "Chess | blitz arena - Part 1",
            "Chess | blitz arena - Part 2",
            "Chess | blitz arena - Part 3",
        ]
    );
    assert_eq!(h.sink.groups.lock().unwrap().as_slice(), ["Chess"; 3]);

    let entries = h.ledger.load().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].vod_id, "v100");
    assert_eq!(entries[0].category_name, "Chess");
    assert_eq!(entries[0].part_number, 3);
}

#[tokio::test]
async fn short_recording_uploads_whole_without_split() {
    let h = harness(
        vec![recording("v1", "Chess | bullet", "Chess")],
        &[("v1", 1000.0)],
        false,
        0,
    );
    h.archiver.run().await.unwrap();
    assert_eq!(h.sink.titles(), vec!["Chess | bullet - Part 1"]);
    assert_eq!(h.toolkit.split_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn continuous_recording_continues_the_series() {
    let h = harness(
        vec![recording(
            "v7",
            "Just Chatting | cozy morning",
            "Just Chatting",
        )],
        &[],
        false,
        0,
    );
    h.ledger
        .append(&vodarch_core::LedgerEntry::new("old1", "Just Chatting", 1))
        .unwrap();
    h.ledger
        .append(&vodarch_core::LedgerEntry::new("old2", "just chatting", 2))
        .unwrap();

    let report = h.archiver.run().await.unwrap();
    assert_eq!(report.archived(), 1);
    assert_eq!(h.sink.titles(), vec!["Just Chatting 3 | cozy morning"]);
    assert_eq!(h.toolkit.split_calls.load(Ordering::SeqCst), 0);

    let entries = h.ledger.load().unwrap();
    let new = entries.iter().find(|e| e.vod_id == "v7").unwrap();
    assert_eq!(new.part_number, 3);
}

#[tokio::test]
async fn part_numbers_continue_across_recordings_within_one_run() {
    let h = harness(
        vec![
            recording("a", "Chess | first", "Chess"),
            recording("b", "Chess | second", "Chess"),
        ],
        &[("a", 3600.0), ("b", 3600.0)],
        false,
        0,
    );
    h.archiver.run().await.unwrap();
    assert_eq!(
        h.sink.titles(),
        vec![
            "Chess | first - Part 1",
            "Chess | first - Part 2",
            "Chess | second - Part 3",
            "Chess | second - Part 4",
        ]
    );
}

#[tokio::test]
async fn splitter_output_count_is_authoritative() {
    // The plan targets 3 pieces but the tool emits 4; numbering follows the
    // files that actually exist.
    let h = harness(
        vec![recording("v2", "Chess | marathon", "Chess")],
        &[("v2", 5400.0)],
        false,
        1,
    );
    h.archiver.run().await.unwrap();
    assert_eq!(h.sink.titles().len(), 4);
    let entries = h.ledger.load().unwrap();
    assert_eq!(entries[0].part_number, 4);
}

#[tokio::test]
async fn empty_splitter_output_fails_the_recording() {
    let h = harness(
        vec![recording("v9", "Chess | corrupt upload", "Chess")],
        &[("v9", 5400.0)],
        false,
        -3,
    );
    let report = h.archiver.run().await.unwrap();
    assert_eq!(report.failed(), 1);
    assert!(h.sink.titles().is_empty());
    // No entry may land without an uploaded piece behind it.
    assert!(h.ledger.load().unwrap().is_empty());
}

#[tokio::test]
async fn second_run_skips_processed_recordings() {
    let h = harness(
        vec![recording("v1", "Chess | blitz", "Chess")],
        &[("v1", 1000.0)],
        false,
        0,
    );
    h.archiver.run().await.unwrap();
    let uploads_after_first = h.sink.titles().len();

    let report = h.archiver.run().await.unwrap();
    assert_eq!(h.sink.titles().len(), uploads_after_first);
    assert_eq!(h.toolkit.download_calls.load(Ordering::SeqCst), 1);
    assert!(matches!(
        report.outcomes[0].status,
        OutcomeStatus::Skipped {
            reason: SkipReason::AlreadyProcessed
        }
    ));
}

#[tokio::test]
async fn live_source_defers_only_the_most_recent_recording() {
    let h = harness(
        vec![
            recording("new", "Chess | ongoing", "Chess"),
            recording("old", "Chess | finished", "Chess"),
        ],
        &[("old", 1000.0)],
        true,
        0,
    );
    let report = h.archiver.run().await.unwrap();
    assert!(matches!(
        report.outcomes[0].status,
        OutcomeStatus::Skipped {
            reason: SkipReason::SourceLive
        }
    ));
    assert!(matches!(
        report.outcomes[1].status,
        OutcomeStatus::Archived { .. }
    ));
    assert_eq!(h.toolkit.download_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn one_failed_recording_does_not_abort_the_run() {
    let h = harness(
        vec![
            recording("bad", "Chess | doomed", "Chess"),
            recording("good", "Art | painting", "Art"),
        ],
        &[("bad", 1000.0), ("good", 1000.0)],
        false,
        0,
    );
    *h.sink.deny_title.lock().unwrap() = Some("Chess".to_string());

    let report = h.archiver.run().await.unwrap();
    assert_eq!(report.failed(), 1);
    assert_eq!(report.archived(), 1);

    let entries = h.ledger.load().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].vod_id, "good");
}

#[tokio::test]
async fn partial_upload_failure_reruns_from_scratch() {
    // Known at-least-once gap: pieces uploaded before the failure are not in
    // the ledger, so the rerun uploads them again.
    let h = harness(
        vec![recording("v1", "Chess | long", "Chess")],
        &[("v1", 5400.0)],
        false,
        0,
    );
    *h.sink.fail_after.lock().unwrap() = Some(2);

    let report = h.archiver.run().await.unwrap();
    assert_eq!(report.failed(), 1);
    assert!(h.ledger.load().unwrap().is_empty());
    assert_eq!(h.sink.titles().len(), 2);

    *h.sink.fail_after.lock().unwrap() = None;
    let report = h.archiver.run().await.unwrap();
    assert_eq!(report.archived(), 1);
    // Two duplicates plus the full rerun.
    assert_eq!(h.sink.titles().len(), 5);
    assert_eq!(h.ledger.load().unwrap()[0].part_number, 3);
}

#[tokio::test]
async fn expired_credentials_are_refreshed_once_and_persisted() {
    let h = harness(
        vec![recording("v1", "Chess | blitz", "Chess")],
        &[("v1", 1000.0)],
        false,
        0,
    );
    h.source.auth_failures.store(1, Ordering::SeqCst);

    let report = h.archiver.run().await.unwrap();
    assert_eq!(report.archived(), 1);
    assert_eq!(h.secrets.get_token().unwrap().as_deref(), Some("fresh-token"));
}

#[tokio::test]
async fn repeated_auth_failure_surfaces_as_source_unavailable() {
    let h = harness(
        vec![recording("v1", "Chess | blitz", "Chess")],
        &[("v1", 1000.0)],
        false,
        0,
    );
    h.source.auth_failures.store(2, Ordering::SeqCst);

    let err = h.archiver.run().await.unwrap_err();
    assert!(matches!(
        err,
        vodarch_core::ArchiveError::SourceUnavailable(_)
    ));
    assert!(h.sink.titles().is_empty());
}
