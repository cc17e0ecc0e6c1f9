use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;
use vodarch_core::adapters::{FileSecretStore, ScriptCredentialProvider, ScriptSink, ScriptSource};
use vodarch_core::{
    classify, load_archiver_config, Archiver, ArchiverConfig, RecordingClass, RunReport,
    SegmentPlan, SqliteLedgerStore, SystemMediaToolkit,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] vodarch_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("ledger error: {0}")]
    Ledger(#[from] vodarch_core::LedgerError),
    #[error("archive run failed: {0}")]
    Archive(#[from] vodarch_core::ArchiveError),
    #[error("authentication failed")]
    Authentication,
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "VOD archiver command-line interface", long_about = None)]
pub struct Cli {
    /// Path to the main archiver.toml
    #[arg(long, default_value = "configs/archiver.toml")]
    pub config: PathBuf,
    /// Alternative path for ledger.sqlite
    #[arg(long)]
    pub ledger_db: Option<PathBuf>,
    /// Token for local authentication (when VODARCHCTL_TOKEN is set)
    #[arg(long)]
    pub token: Option<String>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show per-category ledger summary
    Status,
    /// Ledger operations
    #[command(subcommand)]
    Ledger(LedgerCommands),
    /// Preview the segmentation plan for a duration
    Plan(PlanArgs),
    /// Execute one archive pass
    Run,
    /// Run integrity checks
    #[command(name = "health")]
    #[command(subcommand)]
    Health(HealthCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Subcommand, Debug)]
pub enum LedgerCommands {
    /// List ledger entries
    List(LedgerListArgs),
    /// Rewrite the ledger in canonical order (by category, descending)
    Canonicalize,
}

#[derive(Args, Debug)]
pub struct LedgerListArgs {
    /// Filter by category (case-insensitive)
    #[arg(long)]
    pub category: Option<String>,
    /// Maximum number of rows returned
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Total recording duration in seconds
    pub seconds: f64,
    /// Override the configured target segment length
    #[arg(long)]
    pub target: Option<f64>,
    /// Classify this title against the configured continuous categories
    #[arg(long)]
    pub title: Option<String>,
    /// Explicit category for classification
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum HealthCommands {
    /// Run basic checks
    Check,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(args.shell, &mut command, "vodarchctl", &mut std::io::stdout());
        return Ok(());
    }

    enforce_token(&cli)?;
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Status => {
            let status = context.gather_status()?;
            render(&status, cli.format)?;
        }
        Commands::Ledger(LedgerCommands::List(args)) => {
            let list = context.ledger_list(args)?;
            render(&list, cli.format)?;
        }
        Commands::Ledger(LedgerCommands::Canonicalize) => {
            let result = context.ledger_canonicalize()?;
            render(&result, cli.format)?;
        }
        Commands::Plan(args) => {
            let preview = context.plan_preview(args);
            render(&preview, cli.format)?;
        }
        Commands::Run => {
            let summary = context.run_archiver()?;
            render(&summary, cli.format)?;
        }
        Commands::Health(HealthCommands::Check) => {
            let report = context.health_check();
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more checks failed".to_string(),
                ));
            }
        }
        Commands::Completions(_) => unreachable!("handled above"),
    }

    Ok(())
}

fn enforce_token(cli: &Cli) -> Result<()> {
    if let Ok(expected) = std::env::var("VODARCHCTL_TOKEN") {
        match &cli.token {
            Some(provided) if provided == &expected => Ok(()),
            _ => Err(AppError::Authentication),
        }
    } else {
        Ok(())
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: ArchiverConfig,
    config_path: PathBuf,
    ledger_db: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone();
        let config = load_archiver_config(&config_path)?;
        let ledger_db = cli.ledger_db.clone().unwrap_or_else(|| config.ledger_db());
        Ok(Self {
            config,
            config_path,
            ledger_db,
        })
    }

    fn gather_status(&self) -> Result<StatusReport> {
        if !self.ledger_db.exists() {
            return Ok(StatusReport {
                total: 0,
                categories: Vec::new(),
            });
        }
        let conn = self.open_database(&self.ledger_db)?;
        let mut stmt = conn.prepare(
            "SELECT category_name, COUNT(*), MAX(part_number) FROM ledger \
             GROUP BY category_name COLLATE NOCASE \
             ORDER BY category_name DESC",
        )?;
        let categories = stmt
            .query_map([], |row| {
                Ok(CategoryStatus {
                    category: row.get(0)?,
                    entries: row.get::<_, i64>(1)? as usize,
                    last_part: row.get::<_, i64>(2)? as u32,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let total = categories.iter().map(|c| c.entries).sum();
        Ok(StatusReport { total, categories })
    }

    fn ledger_list(&self, args: &LedgerListArgs) -> Result<LedgerList> {
        if !self.ledger_db.exists() {
            return Ok(LedgerList { rows: Vec::new() });
        }
        let conn = self.open_database(&self.ledger_db)?;
        let mut stmt = conn.prepare(
            "SELECT vod_id, category_name, part_number, recorded_at FROM ledger \
             WHERE (?1 IS NULL OR category_name = ?1 COLLATE NOCASE) \
             ORDER BY rowid \
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map((args.category.as_ref(), args.limit as i64), |row| {
                Ok(LedgerRow {
                    vod_id: row.get(0)?,
                    category: row.get(1)?,
                    part_number: row.get::<_, i64>(2)? as u32,
                    recorded_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(LedgerList { rows })
    }

    fn ledger_canonicalize(&self) -> Result<CanonicalizeResult> {
        let store = SqliteLedgerStore::new(&self.ledger_db)?;
        store.canonicalize()?;
        let entries = store.load()?.len();
        Ok(CanonicalizeResult { entries })
    }

    fn plan_preview(&self, args: &PlanArgs) -> PlanPreview {
        let target = args
            .target
            .unwrap_or(self.config.segmentation.target_segment_seconds);
        let plan = SegmentPlan::for_duration(args.seconds, target);
        let class = args.title.as_deref().map(|title| {
            classify(
                title,
                args.category.as_deref().unwrap_or(""),
                &self.config.segmentation.continuous_categories,
            )
        });
        PlanPreview { plan, class }
    }

    fn run_archiver(&self) -> Result<RunSummary> {
        if let Some(parent) = self.ledger_db.parent() {
            fs::create_dir_all(parent)?;
        }
        let ledger = SqliteLedgerStore::new(&self.ledger_db)?;
        let data_dir = self.config.resolve_path(&self.config.paths.data_dir);
        let secrets = Arc::new(FileSecretStore::new(data_dir.join("source.token")));
        let list_script = self.config.resolve_path(&self.config.tools.list_script);
        let upload_script = self.config.resolve_path(&self.config.tools.upload_script);
        let source = Arc::new(ScriptSource::new(&list_script, secrets.clone(), None));
        let credentials = Arc::new(ScriptCredentialProvider::new(&list_script, None));
        let toolkit = Arc::new(SystemMediaToolkit::new(
            self.config.tools.clone(),
            self.config.downloads_dir(),
            self.config.segments_dir(),
            None,
        ));
        let sink = Arc::new(ScriptSink::new(
            &upload_script,
            self.config.upload.clone(),
            None,
        ));
        let archiver = Archiver::new(
            ledger,
            source,
            credentials,
            secrets,
            toolkit,
            sink,
            self.config.clone(),
        );

        let runtime = tokio::runtime::Runtime::new()?;
        let report = runtime.block_on(archiver.run())?;
        Ok(RunSummary { report })
    }

    fn health_check(&self) -> Vec<HealthEntry> {
        let mut results = Vec::new();
        results.push(self.check_path("archiver.toml", &self.config_path));
        results.push(self.check_database("ledger.sqlite", &self.ledger_db));
        results.push(self.check_path(
            "list script",
            &self.config.resolve_path(&self.config.tools.list_script),
        ));
        results.push(self.check_path(
            "upload script",
            &self.config.resolve_path(&self.config.tools.upload_script),
        ));
        results.push(
            self.check_directory("data dir", &self.config.resolve_path(&self.config.paths.data_dir)),
        );
        results
    }

    fn check_path(&self, name: &str, path: &Path) -> HealthEntry {
        if path.exists() {
            HealthEntry::ok(name, format!("{}", path.display()))
        } else {
            HealthEntry::error(name, format!("{} missing", path.display()))
        }
    }

    fn check_directory(&self, name: &str, path: &Path) -> HealthEntry {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => HealthEntry::ok(name, format!("{}", path.display())),
            Ok(_) => HealthEntry::warn(name, format!("{} is not a directory", path.display())),
            Err(_) => HealthEntry::warn(name, format!("{} not found", path.display())),
        }
    }

    fn check_database(&self, name: &str, path: &Path) -> HealthEntry {
        if !path.exists() {
            return HealthEntry::warn(name, format!("{} not found", path.display()));
        }
        match self.open_database(path) {
            Ok(conn) => {
                let pragma: rusqlite::Result<String> =
                    conn.query_row("PRAGMA integrity_check;", [], |row| row.get(0));
                match pragma {
                    Ok(result) if result.to_lowercase() == "ok" => {
                        HealthEntry::ok(name, "integrity ok".to_string())
                    }
                    Ok(result) => HealthEntry::warn(name, format!("integrity_check: {result}")),
                    Err(err) => HealthEntry::warn(name, format!("error: {err}")),
                }
            }
            Err(err) => HealthEntry::error(name, format!("failed to open: {err}")),
        }
    }

    fn open_database(&self, path: &Path) -> Result<Connection> {
        if !path.exists() {
            return Err(AppError::MissingResource(format!(
                "database missing: {}",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(conn)
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub total: usize,
    pub categories: Vec<CategoryStatus>,
}

#[derive(Debug, Serialize)]
pub struct CategoryStatus {
    pub category: String,
    pub entries: usize,
    pub last_part: u32,
}

impl DisplayFallback for StatusReport {
    fn display(&self) -> String {
        if self.categories.is_empty() {
            return "Ledger empty".to_string();
        }
        let mut lines = vec![format!("{} processed unit(s)", self.total)];
        for category in &self.categories {
            lines.push(format!(
                "  - {}: {} entries, last part {}",
                category.category, category.entries, category.last_part
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct LedgerList {
    pub rows: Vec<LedgerRow>,
}

#[derive(Debug, Serialize)]
pub struct LedgerRow {
    pub vod_id: String,
    pub category: String,
    pub part_number: u32,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl DisplayFallback for LedgerList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No ledger entries found".to_string();
        }
        let mut lines = Vec::new();
        for row in &self.rows {
            lines.push(format!(
                "{} | {} | part={} | at={}",
                row.vod_id,
                row.category,
                row.part_number,
                row.recorded_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct CanonicalizeResult {
    pub entries: usize,
}

impl DisplayFallback for CanonicalizeResult {
    fn display(&self) -> String {
        format!("Ledger canonicalized ({} entries)", self.entries)
    }
}

#[derive(Debug, Serialize)]
pub struct PlanPreview {
    pub plan: SegmentPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<RecordingClass>,
}

impl DisplayFallback for PlanPreview {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "{:.0}s -> {} segment(s) of {:.1}s (target {:.0}s)",
            self.plan.total_duration_s,
            self.plan.segment_count,
            self.plan.segment_duration_s,
            self.plan.target_segment_s,
        )];
        if let Some(class) = &self.class {
            let label = match class {
                RecordingClass::Continuous => "continuous (uploaded whole)",
                RecordingClass::Segmented => "segmented (split before upload)",
            };
            lines.push(format!("class: {label}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub report: RunReport,
}

impl DisplayFallback for RunSummary {
    fn display(&self) -> String {
        if self.report.outcomes.is_empty() {
            return "No recordings pending".to_string();
        }
        let mut lines = vec![format!(
            "archived={} skipped={} failed={}",
            self.report.archived(),
            self.report.skipped(),
            self.report.failed(),
        )];
        for outcome in &self.report.outcomes {
            let status = serde_json::to_string(&outcome.status)
                .unwrap_or_else(|_| "unknown".to_string());
            lines.push(format!("  {} | {} | {status}", outcome.vod_id, outcome.title));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for entry in self {
            lines.push(format!(
                "[{status}] {name}: {detail}",
                status = entry.status,
                name = entry.name,
                detail = entry.detail
            ));
        }
        lines.join("\n")
    }
}
