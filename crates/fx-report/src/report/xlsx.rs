//! Single-sheet xlsx rendering of the merged rows.

use super::ReportRow;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, XlsxError};
use std::path::Path;

pub const SHEET_NAME: &str = "Sheet1";

/// Number format of the rate columns.
pub const RUBLE_FORMAT: &str = "#,##0.00 [$₽-419];-#,##0.00 [$₽-419]";

/// Number format of the ratio column.
pub const YEN_FORMAT: &str = "[$￥-411]#,##0.00;-[$￥-411]#,##0.00";

/// Date/rate/time for each side plus the ratio.
pub const COLUMN_COUNT: usize = 7;

/// Column G carries the ratio and the yen format.
const YEN_COLUMN: usize = 6;

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    Number(Decimal),
    Blank,
}

impl Cell {
    /// Text the width calculation is based on.
    fn display(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(d) => d.normalize().to_string(),
            Cell::Blank => String::new(),
        }
    }
}

fn cells(row: &ReportRow) -> [Cell; COLUMN_COUNT] {
    let side = |record: &Option<crate::parser::RateRecord>| match record {
        Some(r) => [
            Cell::Text(r.date.clone()),
            Cell::Number(r.rate),
            Cell::Text(r.time.clone()),
        ],
        None => [Cell::Blank, Cell::Blank, Cell::Blank],
    };
    let [a_date, a_rate, a_time] = side(&row.a);
    let [b_date, b_rate, b_time] = side(&row.b);
    let ratio = row.ratio.map(Cell::Number).unwrap_or(Cell::Blank);
    [a_date, a_rate, a_time, b_date, b_rate, b_time, ratio]
}

/// Width for a column whose longest cell has `max_chars` characters.
pub fn column_width(max_chars: usize) -> f64 {
    (max_chars as f64 + 2.0) * 1.2
}

/// Write `headers` and `rows` to `path`, replacing any existing file.
pub fn render(headers: &[String], rows: &[ReportRow], path: &Path) -> Result<(), XlsxError> {
    let header_format = Format::new()
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center);
    let text_format = Format::new().set_align(FormatAlign::Center);
    let ruble_format = Format::new()
        .set_align(FormatAlign::Center)
        .set_num_format(RUBLE_FORMAT);
    let yen_format = Format::new()
        .set_align(FormatAlign::Center)
        .set_num_format(YEN_FORMAT);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let mut widths = vec![0usize; COLUMN_COUNT.max(headers.len())];
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header.as_str(), &header_format)?;
        widths[col] = header.chars().count();
    }

    for (i, row) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        for (col, cell) in cells(row).iter().enumerate() {
            let c = col as u16;
            let number_format = if col == YEN_COLUMN {
                &yen_format
            } else {
                &ruble_format
            };
            match cell {
                Cell::Text(s) => worksheet.write_string_with_format(r, c, s.as_str(), &text_format)?,
                Cell::Number(d) => match d.to_f64() {
                    Some(v) => worksheet.write_number_with_format(r, c, v, number_format)?,
                    None => worksheet.write_string_with_format(r, c, d.to_string(), &text_format)?,
                },
                Cell::Blank => worksheet.write_blank(r, c, &text_format)?,
            };
            widths[col] = widths[col].max(cell.display().chars().count());
        }
    }

    for (col, width) in widths.iter().enumerate() {
        worksheet.set_column_width(col as u16, column_width(*width))?;
    }

    workbook.save(path)
}
