//! Downloadable product import templates

use anyhow::Result;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};

pub const CSV_TEMPLATE_FILE_NAME: &str = "products_template.csv";
pub const XLSX_TEMPLATE_FILE_NAME: &str = "products_template.xlsx";

const TEMPLATE_TITLE: &str = "产品导入模板";
const INSTRUCTIONS_SHEET: &str = "使用说明";

/// Template columns with their xlsx widths
const COLUMNS: &[(&str, f64)] = &[
    ("供应商（可选，若为空请在页面选择）", 30.0),
    ("名称（必填）", 24.0),
    ("规格（必填）", 22.0),
    ("单价（必填）", 16.0),
    ("提前预定天数（可选）", 20.0),
    ("数量（必填）", 14.0),
    ("产品介绍（可选）", 36.0),
];

const INSTRUCTIONS: &[&str] = &[
    "填写说明：",
    "- 标注“必填”的列必须填写；“可选”列可留空",
    "- 单价为数字，数量为不小于 1 的整数",
    "- 供应商列可以填写现有供应商名称；若留空，请在导入页面选择",
    "- 建议使用此模板直接填写，避免格式问题",
];

/// CSV template with a UTF-8 BOM so spreadsheet tools pick the right encoding
pub fn csv_template() -> String {
    let headers: Vec<&str> = COLUMNS.iter().map(|(h, _)| *h).collect();
    let example = ["", "示例产品", "型号A", "123.45", "", "1", "示例介绍"];
    format!("\u{FEFF}{}\n{}", headers.join(","), example.join(","))
}

/// Styled xlsx template: merged title row, header row 2 with a filter,
/// frozen panes below the header and an instructions sheet.
pub fn xlsx_template() -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let last_col = (COLUMNS.len() - 1) as u16;

    let title_format = Format::new()
        .set_font_name("Microsoft YaHei")
        .set_bold()
        .set_font_size(16)
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0xFF8A00))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::RGB(0x333333))
        .set_background_color(Color::RGB(0xFDF3E7))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::RGB(0xE0E0E0));
    let example_format = Format::new()
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Hair);
    let wrap_format = Format::new()
        .set_align(FormatAlign::Top)
        .set_text_wrap()
        .set_border(FormatBorder::Hair);

    let sheet = workbook.add_worksheet();
    sheet.set_name(TEMPLATE_TITLE)?;
    sheet.set_paper_size(9);
    sheet.set_portrait();

    sheet.merge_range(0, 0, 0, last_col, TEMPLATE_TITLE, &title_format)?;
    sheet.set_row_height(0, 28)?;

    for (col, (header, width)) in COLUMNS.iter().enumerate() {
        let col = col as u16;
        sheet.set_column_width(col, *width)?;
        sheet.write_string_with_format(1, col, *header, &header_format)?;
    }
    sheet.set_row_height(1, 24)?;

    sheet.write_string_with_format(2, 0, "", &example_format)?;
    sheet.write_string_with_format(2, 1, "示例产品", &example_format)?;
    sheet.write_string_with_format(2, 2, "型号A", &example_format)?;
    sheet.write_number_with_format(2, 3, 123.45, &example_format)?;
    sheet.write_string_with_format(2, 4, "", &example_format)?;
    sheet.write_number_with_format(2, 5, 1, &example_format)?;
    sheet.write_string_with_format(2, 6, "示例介绍", &wrap_format)?;
    sheet.set_row_height(2, 22)?;

    sheet.autofilter(1, 0, 1, last_col)?;
    sheet.set_freeze_panes(2, 0)?;

    let info = workbook.add_worksheet();
    info.set_name(INSTRUCTIONS_SHEET)?;
    info.set_column_width(0, 100)?;
    let bold = Format::new().set_bold();
    for (row, line) in INSTRUCTIONS.iter().enumerate() {
        let row = row as u32;
        if row == 0 {
            info.write_string_with_format(row, 0, *line, &bold)?;
        } else {
            info.write_string(row, 0, *line)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::field_mapper::auto_map_fields;
    use crate::services::spreadsheet::read_spreadsheet;
    use crate::types::ProductField;

    #[test]
    fn test_csv_template_has_bom_headers_and_example() {
        let csv = csv_template();
        assert!(csv.starts_with('\u{FEFF}'));
        let lines: Vec<&str> = csv.trim_start_matches('\u{FEFF}').lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split(',').count(), 7);
        assert_eq!(lines[1], ",示例产品,型号A,123.45,,1,示例介绍");
    }

    #[test]
    fn test_csv_template_is_importable() {
        let parsed = read_spreadsheet(csv_template().as_bytes(), CSV_TEMPLATE_FILE_NAME).unwrap();
        assert_eq!(parsed.header_line, 1);
        let mapping = auto_map_fields(&parsed.headers);
        assert_eq!(mapping.len(), 7);
        assert_eq!(mapping["名称（必填）"], ProductField::Name);
        assert_eq!(mapping["产品介绍（可选）"], ProductField::Description);
    }

    #[test]
    fn test_xlsx_template_header_is_second_row() {
        let bytes = xlsx_template().unwrap();
        let parsed = read_spreadsheet(&bytes, XLSX_TEMPLATE_FILE_NAME).unwrap();

        assert_eq!(parsed.header_line, 2);
        assert_eq!(parsed.headers[1], "名称（必填）");
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].line, 3);
        assert_eq!(parsed.rows[0].cells[3], "123.45");
        assert_eq!(parsed.rows[0].cells[5], "1");
    }
}
