//! Minimal `.xlsx` writer for tests: one sheet, inline strings, numeric
//! cells for all-digit values.

use std::io::{Cursor, Write};

use pickup_core::{column_letters, REQUIRED_WIDTH, SOURCE_COLUMNS};
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

const WORKBOOK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Recogidas" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;

/// Build an `.xlsx` whose first sheet holds `rows` verbatim. Empty strings
/// leave the cell out.
///
/// # Errors
/// Returns an error when the zip archive cannot be written.
pub fn workbook_xlsx(rows: &[Vec<String>]) -> ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, body) in [
        ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
        ("_rels/.rels", ROOT_RELS_XML.to_string()),
        ("xl/workbook.xml", WORKBOOK_XML.to_string()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML.to_string()),
        ("xl/worksheets/sheet1.xml", sheet_xml(rows)),
    ] {
        writer.start_file(
            name,
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
        )?;
        writer.write_all(body.as_bytes())?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Build a carrier workbook: a full-width header row, then one row per entry
/// with the six values placed in the source columns.
///
/// # Errors
/// Returns an error when the zip archive cannot be written.
pub fn pickup_workbook(rows: &[[&str; 6]]) -> ZipResult<Vec<u8>> {
    let width = usize::try_from(REQUIRED_WIDTH).unwrap_or(usize::MAX);
    let mut grid: Vec<Vec<String>> =
        vec![(0..REQUIRED_WIDTH).map(|index| format!("Col {}", column_letters(index))).collect()];

    for values in rows {
        let mut row = vec![String::new(); width];
        for (column, value) in SOURCE_COLUMNS.iter().zip(values) {
            let index = usize::try_from(column.index).unwrap_or(usize::MAX);
            if let Some(cell) = row.get_mut(index) {
                *cell = (*value).to_string();
            }
        }
        grid.push(row);
    }

    workbook_xlsx(&grid)
}

/// Build a workbook `width` columns wide with `rows` filled data rows.
///
/// # Errors
/// Returns an error when the zip archive cannot be written.
pub fn narrow_workbook(width: u32, rows: usize) -> ZipResult<Vec<u8>> {
    let mut grid =
        vec![(0..width).map(|index| format!("Col {}", column_letters(index))).collect::<Vec<_>>()];
    for row in 0..rows {
        grid.push((0..width).map(|index| format!("r{row}c{index}")).collect());
    }
    workbook_xlsx(&grid)
}

fn sheet_xml(rows: &[Vec<String>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );

    for (row_number, row) in (1..).zip(rows) {
        xml.push_str(&format!(r#"<row r="{row_number}">"#));
        for (index, value) in (0..).zip(row) {
            if value.is_empty() {
                continue;
            }
            let reference = format!("{}{row_number}", column_letters(index));
            if value.bytes().all(|byte| byte.is_ascii_digit()) {
                xml.push_str(&format!(r#"<c r="{reference}"><v>{value}</v></c>"#));
            } else {
                xml.push_str(&format!(
                    r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    escape_xml(value)
                ));
            }
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    xml
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}
