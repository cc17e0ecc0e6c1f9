use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags};

use crate::sqlite::configure_connection;

use super::models::LedgerEntry;
use super::{LedgerError, LedgerResult};

const LEDGER_SCHEMA: &str = include_str!("../../../sql/ledger.sql");

#[derive(Debug, Clone)]
pub struct SqliteLedgerStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteLedgerStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteLedgerStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> LedgerResult<SqliteLedgerStore> {
        let path = self.path.ok_or(LedgerError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteLedgerStore { path, flags })
    }
}

#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteLedgerStore {
    pub fn builder() -> SqliteLedgerStoreBuilder {
        SqliteLedgerStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> LedgerResult<Self> {
        SqliteLedgerStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> LedgerResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            LedgerError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| LedgerError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> LedgerResult<()> {
        let conn = self.open()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(())
    }

    /// Loads every entry in physical row order. A store that was never
    /// written yields an empty snapshot rather than an error.
    pub fn load(&self) -> LedgerResult<Vec<LedgerEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let conn = self.open()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        let mut stmt = conn.prepare(
            "SELECT vod_id, category_name, part_number, recorded_at FROM ledger ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| LedgerEntry::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// One durable insert per call. Safe to invoke many times within a run.
    pub fn append(&self, entry: &LedgerEntry) -> LedgerResult<()> {
        let conn = self.open()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        let recorded_at = entry.recorded_at.unwrap_or_else(Utc::now);
        conn.execute(
            "INSERT INTO ledger(vod_id, category_name, part_number, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &entry.vod_id,
                &entry.category_name,
                entry.part_number as i64,
                recorded_at.naive_utc(),
            ],
        )?;
        Ok(())
    }

    /// Rewrites the table sorted by category name descending. A pure
    /// permutation: every row and every field survives unchanged. Invoked
    /// once at the end of a run, never mid-run.
    pub fn canonicalize(&self) -> LedgerResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut conn = self.open()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        let tx = conn.transaction()?;
        let entries = {
            let mut stmt = tx.prepare(
                "SELECT vod_id, category_name, part_number, recorded_at FROM ledger
                 ORDER BY category_name DESC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([], |row| LedgerEntry::from_row(row))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        tx.execute("DELETE FROM ledger", [])?;
        for entry in &entries {
            tx.execute(
                "INSERT INTO ledger(vod_id, category_name, part_number, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    &entry.vod_id,
                    &entry.category_name,
                    entry.part_number as i64,
                    entry.recorded_at.map(|dt| dt.naive_utc()),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// True iff some entry's vod id equals the argument exactly.
    pub fn is_processed(vod_id: &str, entries: &[LedgerEntry]) -> bool {
        entries.iter().any(|entry| entry.vod_id == vod_id)
    }

    /// The highest part number consumed so far within a category, matched
    /// case-insensitively, or 0 for an unseen category. Sole source of truth
    /// for where the part sequence left off; tolerates rows stored in any
    /// order.
    pub fn last_part_number(category: &str, entries: &[LedgerEntry]) -> u32 {
        entries
            .iter()
            .filter(|entry| entry.category_name.eq_ignore_ascii_case(category))
            .map(|entry| entry.part_number)
            .max()
            .unwrap_or(0)
    }
}
