use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArchiverConfig {
    pub paths: PathsSection,
    pub source: SourceSection,
    pub segmentation: SegmentationSection,
    pub upload: UploadSection,
    pub tools: ToolsSection,
}

impl ArchiverConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    pub fn ledger_db(&self) -> PathBuf {
        self.resolve_path(&self.paths.data_dir).join("ledger.sqlite")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.downloads_dir)
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.segments_dir)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub data_dir: String,
    pub downloads_dir: String,
    pub segments_dir: String,
    pub logs_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    /// How many recent recordings to ask the source for per run.
    pub fetch_limit: usize,
    /// Skip the most recent recording while the channel is live.
    pub live_guard: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationSection {
    pub target_segment_seconds: f64,
    /// Categories archived as one growing part-numbered series instead of
    /// time-based segments. Matched case-insensitively.
    pub continuous_categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSection {
    pub tags: Vec<String>,
    pub privacy: String,
    pub playlist_per_category: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    pub streamlink: String,
    pub ffmpeg: String,
    pub ffprobe: String,
    /// Script printing recent recordings as JSON (see adapters::ScriptSource).
    pub list_script: String,
    /// Script uploading one file, printing the remote id (adapters::ScriptSink).
    pub upload_script: String,
}

pub fn load_archiver_config<P: AsRef<Path>>(path: P) -> Result<ArchiverConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/archiver.toml");
        let config = load_archiver_config(path).expect("config should parse");
        assert_eq!(config.segmentation.target_segment_seconds, 1800.0);
        assert!(config
            .segmentation
            .continuous_categories
            .iter()
            .any(|name| name == "Just Chatting"));
        assert!(config.source.fetch_limit >= 1);
    }

    #[test]
    fn resolve_path_joins_relative_to_base() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/archiver.toml");
        let config = load_archiver_config(path).unwrap();
        let absolute = config.resolve_path("/tmp/x");
        assert_eq!(absolute, PathBuf::from("/tmp/x"));
        let relative = config.resolve_path("vods");
        assert!(relative.starts_with(&config.paths.base_dir));
    }
}
