//! Platform adapters that shell out to operator-provided scripts. The core
//! stays ignorant of either platform's API; scripts speak JSON on stdout and
//! receive the current access token via the environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::process::Command;
use tracing::debug;

use crate::config::UploadSection;
use crate::media::{CommandExecutor, SystemCommandExecutor};
use crate::sink::{SinkError, SinkResult, UploadSink};
use crate::source::{
    CredentialProvider, RecordingRecord, RecordingSource, SecretStore, SourceError, SourceResult,
};

/// Exit code by which scripts report an expired token.
pub const AUTH_EXPIRED_EXIT: i32 = 4;

const TOKEN_ENV: &str = "VODARCH_TOKEN";

async fn run_script(
    executor: &dyn CommandExecutor,
    script: &Path,
    args: &[&str],
    token: Option<&str>,
) -> std::io::Result<std::process::Output> {
    let mut command = Command::new(script);
    command.args(args);
    command.stdin(std::process::Stdio::null());
    if let Some(token) = token {
        command.env(TOKEN_ENV, token);
    }
    executor.run(&mut command).await
}

/// Lists recordings and live status via the configured list script.
///
/// `<script> recordings --limit N` must print a JSON array of recording
/// records; `<script> live` must print a JSON boolean.
pub struct ScriptSource {
    script: PathBuf,
    secrets: Arc<dyn SecretStore>,
    executor: Arc<dyn CommandExecutor>,
}

impl ScriptSource {
    pub fn new(
        script: impl Into<PathBuf>,
        secrets: Arc<dyn SecretStore>,
        executor: Option<Arc<dyn CommandExecutor>>,
    ) -> Self {
        Self {
            script: script.into(),
            secrets,
            executor: executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor)),
        }
    }

    async fn invoke(&self, args: &[&str]) -> SourceResult<Vec<u8>> {
        let token = self
            .secrets
            .get_token()
            .map_err(|err| SourceError::Unavailable(err.to_string()))?;
        let output = run_script(
            self.executor.as_ref(),
            &self.script,
            args,
            token.as_deref(),
        )
        .await
        .map_err(|err| SourceError::Unavailable(err.to_string()))?;
        if output.status.code() == Some(AUTH_EXPIRED_EXIT) {
            return Err(SourceError::AuthExpired);
        }
        if !output.status.success() {
            return Err(SourceError::Unavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

#[async_trait::async_trait]
impl RecordingSource for ScriptSource {
    async fn list_recent(&self, limit: usize) -> SourceResult<Vec<RecordingRecord>> {
        let limit = limit.to_string();
        let stdout = self.invoke(&["recordings", "--limit", &limit]).await?;
        let records: Vec<RecordingRecord> = serde_json::from_slice(&stdout)
            .map_err(|err| SourceError::Unavailable(format!("invalid listing payload: {err}")))?;
        debug!(count = records.len(), "listed recordings");
        Ok(records)
    }

    async fn is_live(&self) -> SourceResult<bool> {
        let stdout = self.invoke(&["live"]).await?;
        serde_json::from_slice(&stdout)
            .map_err(|err| SourceError::Unavailable(format!("invalid live payload: {err}")))
    }
}

/// Refreshes credentials via `<script> refresh-token`, which prints the new
/// token on stdout.
pub struct ScriptCredentialProvider {
    script: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl ScriptCredentialProvider {
    pub fn new(script: impl Into<PathBuf>, executor: Option<Arc<dyn CommandExecutor>>) -> Self {
        Self {
            script: script.into(),
            executor: executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor)),
        }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for ScriptCredentialProvider {
    async fn refresh(&self) -> SourceResult<String> {
        let output = run_script(self.executor.as_ref(), &self.script, &["refresh-token"], None)
            .await
            .map_err(|err| SourceError::Unavailable(err.to_string()))?;
        if !output.status.success() {
            return Err(SourceError::Unavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(SourceError::Unavailable(
                "refresh-token printed no token".to_string(),
            ));
        }
        Ok(token)
    }
}

/// Uploads and playlist placement via the configured upload script.
///
/// `<script> upload --title T --description D --privacy P [--tags T] <file>`
/// prints the remote id; `<script> ensure-playlist <name>` prints the
/// playlist id; `<script> add-to-playlist <remote> <playlist>` prints
/// nothing.
pub struct ScriptSink {
    script: PathBuf,
    upload: UploadSection,
    executor: Arc<dyn CommandExecutor>,
}

impl ScriptSink {
    pub fn new(
        script: impl Into<PathBuf>,
        upload: UploadSection,
        executor: Option<Arc<dyn CommandExecutor>>,
    ) -> Self {
        Self {
            script: script.into(),
            upload,
            executor: executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor)),
        }
    }

    async fn invoke(&self, args: &[&str]) -> Result<String, String> {
        let output = run_script(self.executor.as_ref(), &self.script, args, None)
            .await
            .map_err(|err| err.to_string())?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait::async_trait]
impl UploadSink for ScriptSink {
    async fn upload(&self, path: &Path, title: &str, description: &str) -> SinkResult<String> {
        let path = path.to_string_lossy().to_string();
        let tags = self.upload.tags.join(",");
        let mut args = vec![
            "upload",
            "--title",
            title,
            "--description",
            description,
            "--privacy",
            &self.upload.privacy,
        ];
        if !tags.is_empty() {
            args.push("--tags");
            args.push(&tags);
        }
        args.push(&path);
        let remote_id = self
            .invoke(&args)
            .await
            .map_err(SinkError::Upload)?;
        if remote_id.is_empty() {
            return Err(SinkError::Upload("upload printed no remote id".into()));
        }
        Ok(remote_id)
    }

    async fn ensure_group(&self, name: &str) -> SinkResult<String> {
        let group_id = self
            .invoke(&["ensure-playlist", name])
            .await
            .map_err(SinkError::Grouping)?;
        if group_id.is_empty() {
            return Err(SinkError::Grouping(
                "ensure-playlist printed no playlist id".into(),
            ));
        }
        Ok(group_id)
    }

    async fn add_to_group(&self, remote_id: &str, group_id: &str) -> SinkResult<()> {
        self.invoke(&["add-to-playlist", remote_id, group_id])
            .await
            .map_err(SinkError::Grouping)?;
        Ok(())
    }
}

/// Token persisted as a single line under the data directory. Replaces the
/// ad-hoc secrets-file rewriting the platform scripts would otherwise do.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SecretStore for FileSecretStore {
    fn get_token(&self) -> std::io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let token = raw.trim().to_string();
                Ok(if token.is_empty() { None } else { Some(token) })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn set_token(&self, token: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, format!("{token}\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("secrets/token"));
        assert_eq!(store.get_token().unwrap(), None);
        store.set_token("abc123").unwrap();
        assert_eq!(store.get_token().unwrap().as_deref(), Some("abc123"));
    }
}
