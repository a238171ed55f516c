use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pickup_core::{GroupedPickup, PickupRecord, SearchHit};
use pickup_ingest::{read_workbook, read_workbook_file, Extraction};
use pickup_store_sqlite::{ExportSummary, SqliteStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClearSummary {
    pub deleted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreStatus {
    pub records: usize,
}

/// Query service over the pickup store. Every call opens its own connection
/// and drops it before returning, on success and on error alike.
#[derive(Debug, Clone)]
pub struct PickupApi {
    db_path: PathBuf,
    export_path: PathBuf,
}

impl PickupApi {
    #[must_use]
    pub fn new(db_path: PathBuf, export_path: PathBuf) -> Self {
        Self { db_path, export_path }
    }

    #[must_use]
    pub fn export_path(&self) -> &Path {
        &self.export_path
    }

    fn open_store(&self) -> Result<SqliteStore> {
        let store = SqliteStore::open(&self.db_path)?;
        store.ensure_schema()?;
        Ok(store)
    }

    /// Create the pickups table if needed.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or the table cannot be created.
    pub fn ensure_schema(&self) -> Result<()> {
        self.open_store().map(drop)
    }

    /// Parse an uploaded workbook and append its accepted rows.
    ///
    /// # Errors
    /// Returns an error when the workbook is unreadable or too narrow, or the
    /// insert fails. No rows are kept from a failed call.
    pub fn import_workbook(&self, bytes: &[u8]) -> Result<ImportSummary> {
        let extraction = read_workbook(bytes)?;
        self.store_extraction(extraction)
    }

    /// Same as [`Self::import_workbook`] for a workbook on disk.
    ///
    /// # Errors
    /// Returns an error when the file is unreadable or too narrow, or the insert fails.
    pub fn import_workbook_file(&self, path: &Path) -> Result<ImportSummary> {
        let extraction = read_workbook_file(path)
            .with_context(|| format!("failed to import {}", path.display()))?;
        self.store_extraction(extraction)
    }

    fn store_extraction(&self, extraction: Extraction) -> Result<ImportSummary> {
        let mut store = self.open_store()?;
        let inserted = store.insert_many(&extraction.rows)?;
        info!(inserted, skipped = extraction.skipped, "imported pickup rows");
        Ok(ImportSummary { inserted, skipped: extraction.skipped })
    }

    /// Every stored row, ungrouped.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn list_all(&self) -> Result<Vec<PickupRecord>> {
        self.open_store()?.select_all()
    }

    /// Distinct pickups with occurrence counts for the overview page.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn list_grouped(&self) -> Result<Vec<GroupedPickup>> {
        self.open_store()?.select_grouped()
    }

    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.open_store()?.search(query)
    }

    /// Write the CSV export to the configured export path.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read or the file cannot be written.
    pub fn export(&self) -> Result<ExportSummary> {
        let summary = self.open_store()?.export_csv(&self.export_path)?;
        info!(records = summary.records, path = %summary.path, "exported pickups");
        Ok(summary)
    }

    /// Delete every stored pickup.
    ///
    /// # Errors
    /// Returns an error when the delete fails.
    pub fn clear(&self) -> Result<ClearSummary> {
        let deleted = self.open_store()?.delete_all()?;
        warn!(deleted, "cleared all pickups");
        Ok(ClearSummary { deleted })
    }

    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn status(&self) -> Result<StoreStatus> {
        Ok(StoreStatus { records: self.open_store()?.count()? })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use pickup_ingest::fixtures;
    use ulid::Ulid;

    struct TempApi {
        dir: PathBuf,
        api: PickupApi,
    }

    impl TempApi {
        fn new() -> Result<Self> {
            let dir = std::env::temp_dir().join(format!("recogidas-api-{}", Ulid::new()));
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create temp dir {}", dir.display()))?;
            let api = PickupApi::new(dir.join("recogidas.sqlite3"), dir.join("export.csv"));
            Ok(Self { dir, api })
        }
    }

    impl Drop for TempApi {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    const ROWS: [[&str; 6]; 4] = [
        ["ACME", "Calle Mayor 1", "Madrid", "28001", "R12", "Ruta Norte"],
        ["ACME", "Calle Mayor 1", "Madrid", "28001", "R12", "Ruta Norte"],
        ["Globex", "Av. Oeste 9", "Sevilla", "41005", "R7", "Ruta Sur"],
        ["", "Calle Luna 4", "Madrid", "28004", "R12", "Ruta Norte"],
    ];

    #[test]
    fn import_inserts_only_rows_with_name_and_address() -> Result<()> {
        let temp = TempApi::new()?;
        let bytes = fixtures::pickup_workbook(&ROWS)?;

        let summary = temp.api.import_workbook(&bytes)?;
        assert_eq!(summary, ImportSummary { inserted: 3, skipped: 1 });
        assert_eq!(temp.api.status()?.records, 3);
        assert!(temp
            .api
            .list_all()?
            .iter()
            .all(|record| record.name.is_some() && record.address.is_some()));
        Ok(())
    }

    #[test]
    fn narrow_workbook_is_rejected_without_inserting() -> Result<()> {
        let temp = TempApi::new()?;
        let bytes = fixtures::narrow_workbook(46, 5)?;

        let err = match temp.api.import_workbook(&bytes) {
            Ok(summary) => panic!("expected narrow workbook to fail, got {summary:?}"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("required columns"), "unexpected error: {err}");
        assert_eq!(temp.api.status()?.records, 0);
        Ok(())
    }

    #[test]
    fn export_after_import_contains_exactly_the_imported_rows() -> Result<()> {
        let temp = TempApi::new()?;
        temp.api.import_workbook(&fixtures::pickup_workbook(&ROWS)?)?;

        let summary = temp.api.export()?;
        assert_eq!(summary.records, 3);

        let body = fs::read_to_string(temp.api.export_path())?;
        let data_lines = body.lines().skip(1).collect::<Vec<_>>();
        let expected = temp
            .api
            .list_all()?
            .iter()
            .map(|record| {
                format!(
                    "{},{},{},{},{},{},{}",
                    record.id,
                    record.name.as_deref().unwrap_or(""),
                    record.address.as_deref().unwrap_or(""),
                    record.locality.as_deref().unwrap_or(""),
                    record.postal_code.as_deref().unwrap_or(""),
                    record.carrier_code.as_deref().unwrap_or(""),
                    record.carrier_name.as_deref().unwrap_or(""),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(data_lines, expected);
        Ok(())
    }

    #[test]
    fn grouped_listing_counts_duplicate_uploads() -> Result<()> {
        let temp = TempApi::new()?;
        temp.api.import_workbook(&fixtures::pickup_workbook(&ROWS)?)?;

        let grouped = temp.api.list_grouped()?;
        assert_eq!(grouped.len(), 2);
        let acme = grouped
            .iter()
            .find(|group| group.name.as_deref() == Some("ACME"))
            .unwrap_or_else(|| panic!("ACME group missing from {grouped:?}"));
        assert_eq!(acme.total, 2);
        Ok(())
    }

    #[test]
    fn search_finds_rows_by_postal_code() -> Result<()> {
        let temp = TempApi::new()?;
        temp.api.import_workbook(&fixtures::pickup_workbook(&ROWS)?)?;

        let hits = temp.api.search("41005")?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name.as_deref(), Some("Globex"));
        Ok(())
    }

    #[test]
    fn clear_removes_everything() -> Result<()> {
        let temp = TempApi::new()?;
        temp.api.import_workbook(&fixtures::pickup_workbook(&ROWS)?)?;

        assert_eq!(temp.api.clear()?, ClearSummary { deleted: 3 });
        assert!(temp.api.list_all()?.is_empty());
        assert!(temp.api.list_grouped()?.is_empty());

        temp.api.export()?;
        let body = fs::read_to_string(temp.api.export_path())?;
        assert_eq!(body.lines().count(), 1);
        Ok(())
    }

    #[test]
    fn import_workbook_file_reads_from_disk() -> Result<()> {
        let temp = TempApi::new()?;
        let path = temp.dir.join("recogidas.xlsx");
        fs::write(&path, fixtures::pickup_workbook(&ROWS)?)?;

        let summary = temp.api.import_workbook_file(&path)?;
        assert_eq!(summary.inserted, 3);
        Ok(())
    }
}
