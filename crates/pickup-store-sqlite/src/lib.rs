use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use pickup_core::{GroupedPickup, NewPickup, PickupRecord, SearchHit, EXPORT_COLUMNS};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const CREATE_PICKUPS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS pickups (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT,
  address TEXT,
  locality TEXT,
  postal_code TEXT,
  carrier_code TEXT,
  carrier_name TEXT
);
";

const INSERT_PICKUP_SQL: &str = r"
INSERT INTO pickups(name, address, locality, postal_code, carrier_code, carrier_name)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
";

const SELECT_ALL_SQL: &str = r"
SELECT id, name, address, locality, postal_code, carrier_code, carrier_name
FROM pickups
ORDER BY id ASC
";

const SELECT_GROUPED_SQL: &str = r"
SELECT name, address, locality, postal_code, carrier_code, carrier_name, COUNT(*) AS total
FROM pickups
GROUP BY name, address, locality, postal_code, carrier_code, carrier_name
ORDER BY carrier_name, address
";

// MIN(id) makes SQLite take the bare columns from the lowest-id row of each group.
const SEARCH_SQL: &str = r"
SELECT MIN(id) AS id, name, address, locality, postal_code, carrier_code, carrier_name,
       COUNT(*) AS total
FROM pickups
WHERE address LIKE ?1 ESCAPE '\'
   OR name LIKE ?1 ESCAPE '\'
   OR locality LIKE ?1 ESCAPE '\'
   OR postal_code LIKE ?1 ESCAPE '\'
GROUP BY address, carrier_name
ORDER BY carrier_name, address
";

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: String,
    pub records: usize,
    pub sha256: String,
    pub exported_at: String,
}

impl SqliteStore {
    /// Open a SQLite-backed pickup store and configure runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Create the `pickups` table when it does not exist yet.
    ///
    /// # Errors
    /// Returns an error when the DDL statement fails.
    pub fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(CREATE_PICKUPS_SQL).context("failed to create pickups table")
    }

    /// Append rows in one transaction; ids are assigned by `SQLite`.
    ///
    /// # Errors
    /// Returns an error when any insert or the commit fails. Nothing is kept
    /// from a failed call.
    pub fn insert_many(&mut self, rows: &[NewPickup]) -> Result<usize> {
        let tx = self.conn.transaction().context("failed to start insert transaction")?;
        {
            let mut stmt =
                tx.prepare(INSERT_PICKUP_SQL).context("failed to prepare pickup insert")?;
            for row in rows {
                stmt.execute(params![
                    row.name,
                    row.address,
                    row.locality,
                    row.postal_code,
                    row.carrier_code,
                    row.carrier_name,
                ])
                .context("failed to insert pickup row")?;
            }
        }
        tx.commit().context("failed to commit insert transaction")?;
        Ok(rows.len())
    }

    /// Every raw row, oldest first.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read from `SQLite`.
    pub fn select_all(&self) -> Result<Vec<PickupRecord>> {
        let mut stmt = self.conn.prepare(SELECT_ALL_SQL)?;
        let rows = stmt.query_map([], pickup_record_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to read pickup rows")
    }

    /// One row per distinct six-field tuple, ordered by carrier name then address.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read from `SQLite`.
    pub fn select_grouped(&self) -> Result<Vec<GroupedPickup>> {
        let mut stmt = self.conn.prepare(SELECT_GROUPED_SQL)?;
        let rows = stmt.query_map([], |row| {
            Ok(GroupedPickup {
                name: row.get(0)?,
                address: row.get(1)?,
                locality: row.get(2)?,
                postal_code: row.get(3)?,
                carrier_code: row.get(4)?,
                carrier_name: row.get(5)?,
                total: row.get(6)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to read grouped pickups")
    }

    /// Substring search over address, name, locality and postal code, grouped
    /// by address and carrier name.
    ///
    /// `%` and `_` in `query` match literally. Matching follows `SQLite`'s
    /// `LIKE`: case-insensitive for ASCII letters only.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let pattern = like_pattern(query);
        let mut stmt = self.conn.prepare(SEARCH_SQL)?;
        let rows = stmt.query_map(params![pattern], |row| {
            Ok(SearchHit {
                id: row.get(0)?,
                name: row.get(1)?,
                address: row.get(2)?,
                locality: row.get(3)?,
                postal_code: row.get(4)?,
                carrier_code: row.get(5)?,
                carrier_name: row.get(6)?,
                total: row.get(7)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("failed to search pickups for {query:?}"))
    }

    /// Delete every row and report how many were removed.
    ///
    /// # Errors
    /// Returns an error when the delete or its commit fails.
    pub fn delete_all(&mut self) -> Result<usize> {
        let tx = self.conn.transaction().context("failed to start clear transaction")?;
        let deleted = tx.execute("DELETE FROM pickups", []).context("failed to delete pickups")?;
        tx.commit().context("failed to commit clear transaction")?;
        Ok(deleted)
    }

    /// Number of raw rows.
    ///
    /// # Errors
    /// Returns an error when the count query fails.
    pub fn count(&self) -> Result<usize> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pickups", [], |row| row.get(0))
            .context("failed to count pickups")?;
        usize::try_from(total).context("pickup count out of range")
    }

    /// Write every raw row, id included, as CSV to `path`, replacing any
    /// previous file.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or the file cannot be written.
    pub fn export_csv(&self, path: &Path) -> Result<ExportSummary> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create export directory {}", parent.display())
            })?;
        }

        let records = self.select_all()?;
        let file = File::create(path)
            .with_context(|| format!("failed to create export file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let mut hasher = Sha256::new();

        let mut lines = vec![EXPORT_COLUMNS.join(",")];
        lines.extend(records.iter().map(csv_line));
        for line in &lines {
            writer
                .write_all(line.as_bytes())
                .and_then(|()| writer.write_all(b"\n"))
                .with_context(|| format!("failed to write export file {}", path.display()))?;
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }

        writer.flush().with_context(|| format!("failed to flush export file {}", path.display()))?;

        Ok(ExportSummary {
            path: path.display().to_string(),
            records: records.len(),
            sha256: format!("{:x}", hasher.finalize()),
            exported_at: now_rfc3339()?,
        })
    }
}

fn pickup_record_from_row(row: &Row<'_>) -> rusqlite::Result<PickupRecord> {
    Ok(PickupRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        locality: row.get(3)?,
        postal_code: row.get(4)?,
        carrier_code: row.get(5)?,
        carrier_name: row.get(6)?,
    })
}

fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn csv_line(record: &PickupRecord) -> String {
    let fields = [
        &record.name,
        &record.address,
        &record.locality,
        &record.postal_code,
        &record.carrier_code,
        &record.carrier_name,
    ];
    let mut line = record.id.to_string();
    for field in fields {
        line.push(',');
        line.push_str(&csv_escape(field.as_deref().unwrap_or("")));
    }
    line
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).context("failed to format export timestamp")
}
