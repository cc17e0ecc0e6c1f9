use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolsSection;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("download failed: {0}")]
    Download(String),
    #[error("duration probe failed: {0}")]
    Probe(String),
    #[error("split failed: {0}")]
    Split(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("command failed ({command}): {stderr}")]
    CommandFailure {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

pub type MediaResult<T> = std::result::Result<T, MediaError>;

#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait::async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output> {
        command.output().await
    }
}

/// Local media steps: fetch a recording to disk, measure it, cut it.
#[async_trait::async_trait]
pub trait MediaToolkit: Send + Sync {
    async fn download(&self, url: &str, vod_id: &str) -> MediaResult<PathBuf>;
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;
    /// Returns the emitted pieces in chronological order.
    async fn split(&self, path: &Path, segment_seconds: f64) -> MediaResult<Vec<PathBuf>>;
}

/// Toolkit backed by the operator-installed streamlink/ffmpeg/ffprobe
/// binaries.
pub struct SystemMediaToolkit {
    tools: ToolsSection,
    downloads_dir: PathBuf,
    segments_dir: PathBuf,
    executor: std::sync::Arc<dyn CommandExecutor>,
}

impl SystemMediaToolkit {
    pub fn new(
        tools: ToolsSection,
        downloads_dir: PathBuf,
        segments_dir: PathBuf,
        executor: Option<std::sync::Arc<dyn CommandExecutor>>,
    ) -> Self {
        let executor = executor.unwrap_or_else(|| std::sync::Arc::new(SystemCommandExecutor));
        Self {
            tools,
            downloads_dir,
            segments_dir,
            executor,
        }
    }

    async fn run_checked(&self, binary: &str, args: &[String]) -> MediaResult<Vec<u8>> {
        let mut command = Command::new(binary);
        command.args(args);
        let output = self
            .executor
            .run(&mut command)
            .await
            .map_err(|source| MediaError::Io {
                path: PathBuf::from(binary),
                source,
            })?;
        if !output.status.success() {
            return Err(MediaError::CommandFailure {
                command: format!("{binary} {}", args.join(" ")),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait::async_trait]
impl MediaToolkit for SystemMediaToolkit {
    async fn download(&self, url: &str, vod_id: &str) -> MediaResult<PathBuf> {
        fs::create_dir_all(&self.downloads_dir)
            .await
            .map_err(|source| MediaError::Io {
                path: self.downloads_dir.clone(),
                source,
            })?;
        let output_path = self.downloads_dir.join(format!("{vod_id}.mp4"));
        let args = vec![
            url.to_string(),
            "best".to_string(),
            // A rerun over a crashed run's leftovers overwrites stale files.
            "--force".to_string(),
            "-o".to_string(),
            output_path.to_string_lossy().to_string(),
        ];
        self.run_checked(&self.tools.streamlink, &args).await?;
        if !output_path.exists() {
            return Err(MediaError::Download(format!(
                "streamlink produced no output for {vod_id}"
            )));
        }
        debug!(vod_id, path = %output_path.display(), "download complete");
        Ok(output_path)
    }

    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let stdout = self.run_checked(&self.tools.ffprobe, &args).await?;
        let raw = String::from_utf8_lossy(&stdout);
        raw.trim()
            .parse::<f64>()
            .map_err(|_| MediaError::Probe(format!("unparseable duration {:?}", raw.trim())))
    }

    async fn split(&self, path: &Path, segment_seconds: f64) -> MediaResult<Vec<PathBuf>> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "recording".to_string());
        let out_dir = self.segments_dir.join(&stem);
        // An interrupted earlier run may have left pieces here cut at a
        // different segment length; the listing below must only see this
        // invocation's output.
        match fs::remove_dir_all(&out_dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(MediaError::Io {
                    path: out_dir.clone(),
                    source,
                })
            }
        }
        fs::create_dir_all(&out_dir)
            .await
            .map_err(|source| MediaError::Io {
                path: out_dir.clone(),
                source,
            })?;
        let template = out_dir.join(format!("{stem}_part_%03d.mp4"));
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            path.to_string_lossy().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-map".to_string(),
            "0".to_string(),
            "-segment_time".to_string(),
            format!("{segment_seconds:.3}"),
            "-reset_timestamps".to_string(),
            "1".to_string(),
            "-f".to_string(),
            "segment".to_string(),
            template.to_string_lossy().to_string(),
        ];
        self.run_checked(&self.tools.ffmpeg, &args).await?;

        // The %03d template makes lexical order chronological.
        let prefix = format!("{stem}_part_");
        let mut pieces = Vec::new();
        let mut dir = fs::read_dir(&out_dir)
            .await
            .map_err(|source| MediaError::Io {
                path: out_dir.clone(),
                source,
            })?;
        while let Some(item) = dir.next_entry().await.map_err(|source| MediaError::Io {
            path: out_dir.clone(),
            source,
        })? {
            let name = item.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) && name.ends_with(".mp4") {
                pieces.push(item.path());
            }
        }
        pieces.sort();
        if pieces.is_empty() {
            return Err(MediaError::Split(format!(
                "ffmpeg produced no segments under {}",
                out_dir.display()
            )));
        }
        Ok(pieces)
    }
}
