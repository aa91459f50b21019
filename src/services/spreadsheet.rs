//! Spreadsheet reader for product imports
//!
//! Turns uploaded bytes (CSV in an unknown encoding, or an xlsx/xls/ods
//! workbook) into a header row plus data rows. Every data row keeps the line
//! number it had in the source file so row errors can point back to it.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, BIG5, GB18030, GBK, UTF_8, WINDOWS_1252};
use thiserror::Error;
use tracing::{debug, warn};

/// Marker text found in the merged title row of our own templates
const TITLE_MARKERS: &[&str] = &["导入模板"];

/// Rows examined when looking for the header row
const HEADER_SCAN_ROWS: usize = 3;

/// Minimum populated cells for a row to win header detection
const MIN_HEADER_CELLS: usize = 3;

#[derive(Debug, Error)]
pub enum SpreadsheetError {
    #[error("文件为空或格式不正确")]
    EmptyOrMalformedFile,

    #[error("CSV 解析失败: {0}")]
    Csv(#[from] csv::Error),

    #[error("表格解析失败: {0}")]
    Workbook(String),
}

/// One data row with its 1-based line in the source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub line: usize,
    pub cells: Vec<String>,
}

impl SheetRow {
    fn populated_cells(&self) -> usize {
        self.cells.iter().filter(|c| !c.trim().is_empty()).count()
    }

    fn is_blank(&self) -> bool {
        self.populated_cells() == 0
    }
}

#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    #[cfg(test)]
    pub header_line: usize,
    pub rows: Vec<SheetRow>,
}

/// Read an uploaded spreadsheet. `.csv` files go through encoding detection,
/// everything else is handed to the workbook parser.
pub fn read_spreadsheet(bytes: &[u8], file_name: &str) -> Result<ParsedSheet, SpreadsheetError> {
    let raw = if is_csv(file_name) {
        read_csv_rows(bytes)?
    } else {
        read_workbook_rows(bytes)?
    };
    split_header(raw)
}

fn is_csv(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".csv")
}

// =============================================================================
// Header detection
// =============================================================================

/// Pick the header row index.
///
/// A first row with at most one populated cell, or carrying a template title
/// marker, is treated as a title and skipped. Among the first three rows the
/// one with the most populated cells (at least three) then wins.
pub fn detect_header_row(rows: &[SheetRow]) -> usize {
    let Some(first) = rows.first() else {
        return 0;
    };

    let first_cell = first.cells.first().map(String::as_str).unwrap_or("");
    let looks_like_title = first.populated_cells() <= 1
        || TITLE_MARKERS.iter().any(|m| first_cell.contains(m));

    let mut best = if looks_like_title && rows.len() > 1 { 1 } else { 0 };
    let mut best_count = rows[best].populated_cells();

    for (idx, row) in rows.iter().enumerate().take(HEADER_SCAN_ROWS) {
        let count = row.populated_cells();
        if count > best_count && count >= MIN_HEADER_CELLS {
            best = idx;
            best_count = count;
        }
    }
    best
}

fn split_header(raw: Vec<SheetRow>) -> Result<ParsedSheet, SpreadsheetError> {
    if raw.len() < 2 {
        return Err(SpreadsheetError::EmptyOrMalformedFile);
    }

    let header_idx = detect_header_row(&raw);
    let mut iter = raw.into_iter().skip(header_idx);
    let header = iter.next().ok_or(SpreadsheetError::EmptyOrMalformedFile)?;
    let rows: Vec<SheetRow> = iter.filter(|r| !r.is_blank()).collect();

    if rows.is_empty() {
        return Err(SpreadsheetError::EmptyOrMalformedFile);
    }

    debug!(
        header_line = header.line,
        data_rows = rows.len(),
        "Spreadsheet header detected"
    );

    Ok(ParsedSheet {
        headers: header.cells,
        #[cfg(test)]
        header_line: header.line,
        rows,
    })
}

// =============================================================================
// CSV
// =============================================================================

/// Choose a decoder: byte-order mark first, statistical detection otherwise.
/// Returns the encoding and the BOM length to skip.
pub fn detect_encoding(bytes: &[u8]) -> (&'static Encoding, usize) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return (encoding, bom_len);
    }
    if bytes.is_ascii() {
        return (UTF_8, 0);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let guess = detector.guess(None, true);
    (supported_codec(guess), 0)
}

/// Narrow a detected charset to the codecs we decode with.
/// GB2312 is served by the GBK decoder and ISO-8859-1 by windows-1252.
fn supported_codec(guess: &'static Encoding) -> &'static Encoding {
    if guess == GBK || guess == GB18030 {
        GB18030
    } else if guess == BIG5 {
        BIG5
    } else if guess == WINDOWS_1252 {
        WINDOWS_1252
    } else {
        UTF_8
    }
}

/// Decode CSV bytes to text, falling back to lossy UTF-8 when the chosen
/// codec rejects the input.
pub fn decode_csv_bytes(bytes: &[u8]) -> String {
    let (encoding, bom_len) = detect_encoding(bytes);
    let body = &bytes[bom_len..];

    match encoding.decode_without_bom_handling_and_without_replacement(body) {
        Some(text) => text.into_owned(),
        None => {
            warn!(encoding = encoding.name(), "CSV decode failed, falling back to UTF-8");
            String::from_utf8_lossy(body).into_owned()
        }
    }
}

fn read_csv_rows(bytes: &[u8]) -> Result<Vec<SheetRow>, SpreadsheetError> {
    let text = decode_csv_bytes(bytes);
    let text = text.trim_start_matches('\u{feff}');

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 1);
        rows.push(SheetRow {
            line,
            cells: record.iter().map(|c| c.trim().to_string()).collect(),
        });
    }
    Ok(rows)
}

// =============================================================================
// Workbooks
// =============================================================================

fn read_workbook_rows(bytes: &[u8]) -> Result<Vec<SheetRow>, SpreadsheetError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| SpreadsheetError::Workbook(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SpreadsheetError::EmptyOrMalformedFile)?
        .map_err(|e| SpreadsheetError::Workbook(e.to_string()))?;

    // The range starts at the first used cell, not necessarily A1
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);

    Ok(range
        .rows()
        .enumerate()
        .map(|(idx, cells)| SheetRow {
            line: first_row + idx + 1,
            cells: cells.iter().map(cell_text).collect(),
        })
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_float(*f),
        Data::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

/// Whole numbers come back from workbooks as floats; print them without `.0`
fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<SheetRow> {
        data.iter()
            .enumerate()
            .map(|(i, cells)| SheetRow {
                line: i + 1,
                cells: cells.iter().map(|c| c.to_string()).collect(),
            })
            .collect()
    }

    #[test]
    fn test_header_is_first_row_for_plain_files() {
        let data = rows(&[
            &["名称", "规格", "单价"],
            &["螺丝", "M4", "0.5"],
        ]);
        assert_eq!(detect_header_row(&data), 0);
    }

    #[test]
    fn test_merged_title_row_is_skipped() {
        let data = rows(&[
            &["产品导入模板", "", "", "", "", "", ""],
            &["供应商", "名称", "规格", "单价", "提前预定天数", "数量", "产品介绍"],
            &["", "螺丝", "M4", "0.5", "", "1", ""],
        ]);
        assert_eq!(detect_header_row(&data), 1);
    }

    #[test]
    fn test_title_marker_skips_first_row_even_when_populated() {
        let data = rows(&[
            &["供应商导入模板", "说明", "版本"],
            &["名称", "规格", "单价"],
            &["螺丝", "M4", "0.5"],
        ]);
        assert_eq!(detect_header_row(&data), 1);
    }

    #[test]
    fn test_widest_row_among_first_three_wins() {
        let data = rows(&[
            &["备注", "导出于 2025-01-01"],
            &["", "", ""],
            &["名称", "规格", "单价", "数量"],
            &["螺丝", "M4", "0.5", "1"],
        ]);
        assert_eq!(detect_header_row(&data), 2);
    }

    #[test]
    fn test_single_row_file_is_rejected() {
        let result = read_spreadsheet("名称,规格,单价\n".as_bytes(), "products.csv");
        assert!(matches!(result, Err(SpreadsheetError::EmptyOrMalformedFile)));
    }

    #[test]
    fn test_header_without_data_is_rejected() {
        let csv = "产品导入模板\n名称,规格,单价\n";
        let result = read_spreadsheet(csv.as_bytes(), "products.csv");
        assert!(matches!(result, Err(SpreadsheetError::EmptyOrMalformedFile)));
    }

    #[test]
    fn test_csv_rows_keep_source_line_numbers() {
        let csv = "产品导入模板\n名称,规格,单价\n螺丝,M4,0.5\n螺母,M4,0.2\n";
        let sheet = read_spreadsheet(csv.as_bytes(), "Products.CSV").unwrap();
        assert_eq!(sheet.headers, vec!["名称", "规格", "单价"]);
        assert_eq!(sheet.header_line, 2);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].line, 3);
        assert_eq!(sheet.rows[1].cells[0], "螺母");
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("名称,规格,单价\n螺丝,M4,0.5\n".as_bytes());
        let sheet = read_spreadsheet(&bytes, "a.csv").unwrap();
        assert_eq!(sheet.headers[0], "名称");
    }

    #[test]
    fn test_utf16le_bom_is_decoded() {
        let text = "名称,规格,单价\n螺丝,M4,0.5\n";
        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let (encoding, bom_len) = detect_encoding(&bytes);
        assert_eq!(encoding, encoding_rs::UTF_16LE);
        assert_eq!(bom_len, 2);
        assert_eq!(decode_csv_bytes(&bytes), text);
    }

    #[test]
    fn test_utf16be_bom_is_decoded() {
        let text = "名称,规格,单价\n";
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_csv_bytes(&bytes), text);
    }

    #[test]
    fn test_gbk_csv_without_bom_is_detected() {
        let mut text = String::from("名称,规格,单价,数量,产品介绍\n");
        for i in 0..20 {
            text.push_str(&format!(
                "不锈钢螺丝{},型号甲{},12.5,{},适用于仓库货架安装的标准紧固件\n",
                i,
                i,
                i + 1
            ));
        }
        let (encoded, _, had_errors) = GBK.encode(&text);
        assert!(!had_errors);

        let decoded = decode_csv_bytes(&encoded);
        assert_eq!(decoded, text);

        let sheet = read_spreadsheet(&encoded, "gbk.csv").unwrap();
        assert_eq!(sheet.headers[0], "名称");
        assert_eq!(sheet.rows.len(), 20);
    }

    #[test]
    fn test_plain_ascii_decodes_as_utf8() {
        let (encoding, _) = detect_encoding(b"name,spec,price\nbolt,M4,1\n");
        assert_eq!(encoding, UTF_8);
    }

    #[test]
    fn test_blank_rows_are_dropped() {
        let csv = "名称,规格,单价\n螺丝,M4,0.5\n,,\n螺母,M4,0.2\n";
        let sheet = read_spreadsheet(csv.as_bytes(), "a.csv").unwrap();
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[1].line, 4);
    }

    #[test]
    fn test_workbook_cells_are_read() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "名称").unwrap();
        sheet.write_string(0, 1, "规格").unwrap();
        sheet.write_string(0, 2, "单价").unwrap();
        sheet.write_string(0, 3, "数量").unwrap();
        sheet.write_string(1, 0, "螺丝").unwrap();
        sheet.write_string(1, 1, "M4").unwrap();
        sheet.write_number(1, 2, 12.5).unwrap();
        sheet.write_number(1, 3, 3.0).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let parsed = read_spreadsheet(&bytes, "products.xlsx").unwrap();
        assert_eq!(parsed.headers, vec!["名称", "规格", "单价", "数量"]);
        assert_eq!(parsed.rows[0].cells, vec!["螺丝", "M4", "12.5", "3"]);
        assert_eq!(parsed.rows[0].line, 2);
    }

    #[test]
    fn test_garbage_workbook_is_an_error() {
        let result = read_spreadsheet(b"not a zip file", "products.xlsx");
        assert!(matches!(result, Err(SpreadsheetError::Workbook(_))));
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(3.0), "3");
        assert_eq!(format_float(123.45), "123.45");
    }
}
