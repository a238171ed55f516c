use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum IngestError {
    #[error("failed to read spreadsheet: {0}")]
    Workbook(String),
    #[error("spreadsheet has no worksheets")]
    NoWorksheet,
    #[error(
        "the spreadsheet does not have the required columns ({letters}); \
         found {found} columns, need at least {required}"
    )]
    MissingColumns { letters: String, found: u32, required: u32 },
}

impl IngestError {
    #[must_use]
    pub fn missing_columns(found: u32) -> Self {
        Self::MissingColumns { letters: required_letters(), found, required: REQUIRED_WIDTH }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PickupField {
    Name,
    Address,
    Locality,
    PostalCode,
    CarrierCode,
    CarrierName,
}

impl PickupField {
    pub const ALL: [Self; 6] = [
        Self::Name,
        Self::Address,
        Self::Locality,
        Self::PostalCode,
        Self::CarrierCode,
        Self::CarrierName,
    ];

    /// Column name used by the `pickups` table and the CSV export header.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Address => "address",
            Self::Locality => "locality",
            Self::PostalCode => "postal_code",
            Self::CarrierCode => "carrier_code",
            Self::CarrierName => "carrier_name",
        }
    }

    /// Rows missing a required field never reach storage.
    #[must_use]
    pub fn is_required(self) -> bool {
        matches!(self, Self::Name | Self::Address)
    }
}

impl Display for PickupField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A spreadsheet column feeding one pickup field.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SourceColumn {
    pub field: PickupField,
    pub letter: &'static str,
    /// Zero-based position, column A is 0.
    pub index: u32,
}

impl SourceColumn {
    #[must_use]
    pub const fn new(field: PickupField, letter: &'static str) -> Self {
        Self { field, letter, index: column_index(letter) }
    }
}

/// Fixed positional layout of the carrier workbook, in field order.
pub const SOURCE_COLUMNS: [SourceColumn; 6] = [
    SourceColumn::new(PickupField::Name, "M"),
    SourceColumn::new(PickupField::Address, "N"),
    SourceColumn::new(PickupField::Locality, "O"),
    SourceColumn::new(PickupField::PostalCode, "P"),
    SourceColumn::new(PickupField::CarrierCode, "AT"),
    SourceColumn::new(PickupField::CarrierName, "AU"),
];

/// Minimum sheet width for every source column to exist.
pub const REQUIRED_WIDTH: u32 = required_width(&SOURCE_COLUMNS);

/// Header line of the CSV export.
pub const EXPORT_COLUMNS: [&str; 7] =
    ["id", "name", "address", "locality", "postal_code", "carrier_code", "carrier_name"];

/// Convert spreadsheet column letters (`A`, `M`, `AU`) to a zero-based index.
///
/// # Panics
/// Panics when `letters` is empty or contains anything but `A`-`Z`. Layout
/// constants are evaluated at compile time, so a bad letter fails the build.
#[must_use]
pub const fn column_index(letters: &str) -> u32 {
    let bytes = letters.as_bytes();
    assert!(!bytes.is_empty(), "column letters must not be empty");

    let mut index: u32 = 0;
    let mut position = 0;
    while position < bytes.len() {
        let byte = bytes[position];
        assert!(byte.is_ascii_uppercase(), "column letters must be A-Z");
        index = index * 26 + (byte - b'A' + 1) as u32;
        position += 1;
    }
    index - 1
}

/// Inverse of [`column_index`].
#[must_use]
pub fn column_letters(index: u32) -> String {
    let mut letters = Vec::new();
    let mut remaining = index + 1;
    while remaining > 0 {
        let digit = (remaining - 1) % 26;
        letters.push(char::from(b'A' + u8::try_from(digit).unwrap_or(0)));
        remaining = (remaining - 1) / 26;
    }
    letters.iter().rev().collect()
}

const fn required_width(columns: &[SourceColumn]) -> u32 {
    let mut widest = 0;
    let mut position = 0;
    while position < columns.len() {
        if columns[position].index + 1 > widest {
            widest = columns[position].index + 1;
        }
        position += 1;
    }
    widest
}

fn required_letters() -> String {
    SOURCE_COLUMNS.iter().map(|column| column.letter).collect::<Vec<_>>().join(", ")
}

/// A pickup row accepted by ingestion and not yet stored.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewPickup {
    pub name: String,
    pub address: String,
    pub locality: Option<String>,
    pub postal_code: Option<String>,
    pub carrier_code: Option<String>,
    pub carrier_name: Option<String>,
}

/// One stored row of the `pickups` table.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PickupRecord {
    pub id: i64,
    pub name: Option<String>,
    pub address: Option<String>,
    pub locality: Option<String>,
    pub postal_code: Option<String>,
    pub carrier_code: Option<String>,
    pub carrier_name: Option<String>,
}

/// Distinct six-field tuple with the number of rows sharing it.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct GroupedPickup {
    pub name: Option<String>,
    pub address: Option<String>,
    pub locality: Option<String>,
    pub postal_code: Option<String>,
    pub carrier_code: Option<String>,
    pub carrier_name: Option<String>,
    pub total: i64,
}

/// Search result grouped by address and carrier name.
///
/// `id` and the remaining fields come from the lowest-id row of the group.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SearchHit {
    pub id: i64,
    pub name: Option<String>,
    pub address: Option<String>,
    pub locality: Option<String>,
    pub postal_code: Option<String>,
    pub carrier_code: Option<String>,
    pub carrier_name: Option<String>,
    pub total: i64,
}
