//! Spreadsheet ingestion for pickup records.
//!
//! Reads the first worksheet of a carrier workbook, takes the fixed source
//! columns, drops rows without name or address, and turns every kept cell
//! into text.

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use pickup_core::{IngestError, NewPickup, REQUIRED_WIDTH, SOURCE_COLUMNS};
use tracing::debug;

#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;

/// Rows accepted from one worksheet, plus how many data rows were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub rows: Vec<NewPickup>,
    pub skipped: usize,
}

/// Parse workbook bytes of any format calamine detects (xlsx, xls, xlsb, ods).
///
/// # Errors
/// Returns [`IngestError`] when the bytes are not a readable workbook, the
/// workbook has no sheets, or the first sheet is too narrow.
pub fn read_workbook(bytes: &[u8]) -> Result<Extraction, IngestError> {
    let workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(workbook_error)?;
    extract_first_sheet(workbook)
}

/// Parse a workbook from disk; the format is picked from the file extension.
///
/// # Errors
/// Returns [`IngestError`] when the file cannot be opened or parsed, or the
/// first sheet is too narrow.
pub fn read_workbook_file(path: &Path) -> Result<Extraction, IngestError> {
    let workbook = open_workbook_auto(path).map_err(workbook_error)?;
    extract_first_sheet(workbook)
}

/// Extract pickup rows from a worksheet whose first row is a header.
///
/// # Errors
/// Returns [`IngestError::MissingColumns`] when the sheet, counted from
/// column A, is narrower than [`REQUIRED_WIDTH`].
pub fn extract_pickups(range: &Range<Data>) -> Result<Extraction, IngestError> {
    let (Some((header_row, _)), Some((last_row, last_column))) = (range.start(), range.end())
    else {
        return Err(IngestError::missing_columns(0));
    };

    let width = last_column + 1;
    if width < REQUIRED_WIDTH {
        return Err(IngestError::missing_columns(width));
    }

    let mut extraction = Extraction::default();
    for row in (header_row + 1)..=last_row {
        match pickup_from_row(range, row) {
            Some(pickup) => extraction.rows.push(pickup),
            None => extraction.skipped += 1,
        }
    }

    debug!(
        accepted = extraction.rows.len(),
        skipped = extraction.skipped,
        "extracted pickup rows from worksheet"
    );
    Ok(extraction)
}

fn extract_first_sheet<RS>(mut workbook: Sheets<RS>) -> Result<Extraction, IngestError>
where
    RS: Read + Seek,
{
    let range =
        workbook.worksheet_range_at(0).ok_or(IngestError::NoWorksheet)?.map_err(workbook_error)?;
    extract_pickups(&range)
}

fn workbook_error(err: calamine::Error) -> IngestError {
    IngestError::Workbook(err.to_string())
}

fn pickup_from_row(range: &Range<Data>, row: u32) -> Option<NewPickup> {
    let [name, address, locality, postal_code, carrier_code, carrier_name] =
        SOURCE_COLUMNS.map(|column| range.get_value((row, column.index)).and_then(cell_text));

    Some(NewPickup {
        name: name?,
        address: address?,
        locality,
        postal_code,
        carrier_code,
        carrier_name,
    })
}

// Blank text and error cells count as missing. Date cells render as
// `YYYY-MM-DD HH:MM:SS`.
fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(value) | Data::DateTimeIso(value) | Data::DurationIso(value) => value.clone(),
        Data::Float(value) => format_float(*value),
        Data::Int(value) => value.to_string(),
        Data::Bool(value) => (if *value { "TRUE" } else { "FALSE" }).to_string(),
        Data::DateTime(value) => value
            .as_datetime()
            .map_or_else(|| value.to_string(), |datetime| datetime.to_string()),
    };

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn format_float(value: f64) -> String {
    // Postal codes and carrier codes arrive as floats; keep them integral.
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}
