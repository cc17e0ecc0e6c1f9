use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// One processed unit: a whole recording archived under its final part
/// number. Rows are never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub vod_id: String,
    pub category_name: String,
    pub part_number: u32,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn new(
        vod_id: impl Into<String>,
        category_name: impl Into<String>,
        part_number: u32,
    ) -> Self {
        Self {
            vod_id: vod_id.into(),
            category_name: category_name.into(),
            part_number,
            recorded_at: None,
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let recorded_at: Option<NaiveDateTime> = row.get("recorded_at")?;
        Ok(Self {
            vod_id: row.get("vod_id")?,
            category_name: row.get("category_name")?,
            part_number: row.get::<_, i64>("part_number")? as u32,
            recorded_at: recorded_at.map(|dt| Utc.from_utc_datetime(&dt)),
        })
    }
}
