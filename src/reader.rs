//! Sheet readers: turn files into [`Grid`]s.
//!
//! This is the crate's only contact with on-disk formats. Native workbooks
//! (xlsx/xlsm/xlsb/xls/ods) go through calamine; delimited text (csv/tsv)
//! goes through the csv crate with delimiter sniffing and a windows-1252
//! fallback for non-UTF-8 input. Everything downstream works on grids.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{LoadError, LoadResult};
use crate::grid::{CellValue, Grid, MergedRange};

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];
const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// Whether the file is a native workbook eligible for structure auto-detection
/// and the direct range/header read path.
pub fn is_native_workbook(path: &Path) -> bool {
    matches!(extension_of(path).as_str(), "xlsx" | "xlsm")
}

/// Modification time of a file, used for analysis cache keys and load metadata.
pub fn modified_time(path: &Path) -> LoadResult<SystemTime> {
    Ok(fs::metadata(path)?.modified()?)
}

/// Read one sheet of a file into a [`Grid`].
///
/// For delimited files the `sheet` argument is ignored (a CSV is a single
/// implicit sheet).
pub fn read_grid(path: &Path, sheet: &str) -> LoadResult<Grid> {
    let ext = extension_of(path);
    if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
        read_workbook_grid(path, sheet)
    } else if DELIMITED_EXTENSIONS.contains(&ext.as_str()) {
        read_delimited_grid(path)
    } else {
        Err(LoadError::UnsupportedFormat {
            file: path.to_path_buf(),
            extension: ext,
        })
    }
}

/// List the sheet names of a file.
///
/// Delimited files report a single synthetic `Sheet1`, mirroring how
/// downstream callers address them.
pub fn sheet_names(path: &Path) -> LoadResult<Vec<String>> {
    let ext = extension_of(path);
    if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
        let workbook = open_workbook_auto(path)?;
        Ok(workbook.sheet_names().to_vec())
    } else if DELIMITED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(vec!["Sheet1".to_string()])
    } else {
        Err(LoadError::UnsupportedFormat {
            file: path.to_path_buf(),
            extension: ext,
        })
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn read_workbook_grid(path: &Path, sheet: &str) -> LoadResult<Grid> {
    let mut workbook = open_workbook_auto(path)?;

    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(LoadError::SheetNotFound {
            file: path.to_path_buf(),
            sheet: sheet.to_string(),
        });
    }

    let range = workbook.worksheet_range(sheet)?;

    // calamine ranges start at the first used cell; pad so grid coordinates
    // stay absolute.
    let (row0, col0) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut cells: Vec<Vec<CellValue>> = vec![Vec::new(); row0];
    for row in range.rows() {
        let mut out = Vec::with_capacity(col0 + row.len());
        out.resize(col0, CellValue::Empty);
        out.extend(row.iter().map(convert_cell));
        cells.push(out);
    }

    let merged_ranges = load_merged_ranges(&mut workbook, sheet);

    Ok(Grid {
        cells,
        merged_ranges,
        ..Default::default()
    })
}

fn load_merged_ranges(workbook: &mut Sheets<std::io::BufReader<fs::File>>, sheet: &str) -> Vec<MergedRange> {
    // Merged regions are only exposed for xlsx; other formats just get an
    // empty set.
    let Sheets::Xlsx(xlsx) = workbook else {
        return Vec::new();
    };
    if xlsx.load_merged_regions().is_err() {
        return Vec::new();
    }
    xlsx.merged_regions()
        .iter()
        .filter(|(name, _, _)| name == sheet)
        .map(|(_, _, dims)| MergedRange {
            min_row: dims.start.0 as usize,
            min_col: dims.start.1 as usize,
            max_row: dims.end.0 as usize,
            max_col: dims.end.1 as usize,
        })
        .collect()
}

fn convert_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match excel_serial_to_datetime(dt.as_f64()) {
            Some(ts) => CellValue::DateTime(ts),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => match parse_iso_datetime(s) {
            Some(ts) => CellValue::DateTime(ts),
            None => CellValue::Text(s.clone()),
        },
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
    }
}

/// Convert a spreadsheet date serial (days since 1899-12-30) to a timestamp.
pub(crate) fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(Duration::seconds(seconds))
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn read_delimited_grid(path: &Path) -> LoadResult<Grid> {
    let raw = fs::read(path)?;
    let text = decode_text(&raw);
    let delimiter = sniff_delimiter(&text, &extension_of(path));

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut cells = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Vec<CellValue> = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(field.to_string())
                }
            })
            .collect();
        cells.push(row);
    }

    Ok(Grid::new(cells))
}

/// Decode raw bytes as UTF-8 (with BOM stripping), falling back to
/// windows-1252. The fallback never fails, so every byte sequence yields
/// some text; garbage in, garbage out, never an abort.
fn decode_text(raw: &[u8]) -> String {
    let raw = raw.strip_prefix(b"\xef\xbb\xbf").unwrap_or(raw);
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(raw);
            decoded.into_owned()
        }
    }
}

/// Pick the delimiter whose count on the first line is highest.
fn sniff_delimiter(text: &str, ext: &str) -> u8 {
    if ext == "tsv" {
        return b'\t';
    }
    let first_line = text.lines().next().unwrap_or_default();
    [b',', b'\t', b';', b'|']
        .into_iter()
        .max_by_key(|&d| first_line.bytes().filter(|&b| b == d).count())
        .unwrap_or(b',')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_sniffing_prefers_majority() {
        assert_eq!(sniff_delimiter("a;b;c;d\n1;2;3;4\n", "csv"), b';');
        assert_eq!(sniff_delimiter("a,b\tc\n", "csv"), b',');
        assert_eq!(sniff_delimiter("anything", "tsv"), b'\t');
    }

    #[test]
    fn decode_strips_bom_and_falls_back() {
        assert_eq!(decode_text(b"\xef\xbb\xbfabc"), "abc");
        // 0xE9 is 'é' in windows-1252 and invalid standalone UTF-8.
        assert_eq!(decode_text(b"caf\xe9"), "caf\u{e9}");
    }

    #[test]
    fn serial_conversion_matches_spreadsheet_epoch() {
        let ts = excel_serial_to_datetime(1.0).unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(1899, 12, 31).unwrap());
        let ts = excel_serial_to_datetime(45_000.0).unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2023, 3, 15).unwrap());
        assert!(excel_serial_to_datetime(-5.0).is_none());
    }
}
