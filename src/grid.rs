//! Raw worksheet cell grids.
//!
//! A [`Grid`] is the unit the structure analyzer and the extraction pipeline
//! operate on: a dense 2-D array of [`CellValue`]s for one sheet, plus
//! side-sets for hidden rows, hidden columns, and merged ranges, and an
//! optional sample of cell number-format strings for locale detection.
//!
//! All coordinates are 0-based; A1 notation is converted at the boundary by
//! [`SheetRange`].

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::error::{LoadError, LoadResult};

/// One raw cell value as delivered by a sheet reader.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// No value.
    Empty,
    /// Text cell.
    Text(String),
    /// Numeric cell (integers widen to `f64`).
    Number(f64),
    /// Boolean cell.
    Bool(bool),
    /// Date/time cell.
    DateTime(NaiveDateTime),
    /// Spreadsheet error literal (e.g. `#DIV/0!`).
    Error(String),
}

impl CellValue {
    /// Whether the cell holds no value.
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Whether the cell holds text. Error literals do not count as text.
    pub fn is_text(&self) -> bool {
        matches!(self, CellValue::Text(_))
    }

    /// Whether the cell holds a number.
    pub fn is_number(&self) -> bool {
        matches!(self, CellValue::Number(_))
    }

    /// Render the cell as verbatim text, or `None` when empty.
    ///
    /// Whole-number floats render without a fraction so that RAW loads of
    /// integer cells read back as `"42"`, not `"42.0"`.
    pub fn to_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Number(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    Some(format!("{}", *v as i64))
                } else {
                    Some(v.to_string())
                }
            }
            CellValue::Bool(b) => Some(b.to_string()),
            CellValue::DateTime(ts) => Some(ts.to_string()),
            CellValue::Error(e) => Some(e.clone()),
        }
    }
}

/// A merged cell rectangle, 0-based inclusive bounds.
///
/// Merged ranges never overlap; the value lives only at the top-left cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRange {
    pub min_row: usize,
    pub min_col: usize,
    pub max_row: usize,
    pub max_col: usize,
}

impl MergedRange {
    /// Whether the rectangle contains (row, col).
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.min_row && row <= self.max_row && col >= self.min_col && col <= self.max_col
    }

    /// Top-left (anchor) cell of the rectangle.
    pub fn anchor(&self) -> (usize, usize) {
        (self.min_row, self.min_col)
    }
}

/// A worksheet's raw cell grid plus structural side-channels.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    /// Row-major cells. Rows may be ragged; [`Grid::cell`] treats missing
    /// positions as [`CellValue::Empty`].
    pub cells: Vec<Vec<CellValue>>,
    /// 0-based indices of hidden rows.
    pub hidden_rows: BTreeSet<usize>,
    /// 0-based indices of hidden columns.
    pub hidden_cols: BTreeSet<usize>,
    /// Merged cell rectangles.
    pub merged_ranges: Vec<MergedRange>,
    /// Sampled number-format strings, when the reader exposes them.
    pub number_formats: Vec<String>,
}

impl Grid {
    /// Create a grid from row-major cells with empty side-sets.
    pub fn new(cells: Vec<Vec<CellValue>>) -> Self {
        Self {
            cells,
            ..Default::default()
        }
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.cells.len()
    }

    /// Number of columns (widest row).
    pub fn n_cols(&self) -> usize {
        self.cells.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Cell at (row, col); out-of-bounds positions read as empty.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    /// Whether every cell of `row` within `[start_col, end_col]` is empty.
    pub fn row_is_blank(&self, row: usize, start_col: usize, end_col: usize) -> bool {
        (start_col..=end_col).all(|col| self.cell(row, col).is_empty())
    }
}

/// An A1-style cell range with optional bounds, 0-based inclusive.
///
/// Parses single cells ("A1"), full ranges ("B2:C5"), and partial ranges
/// ("A:C", "1:10"); absent parts are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SheetRange {
    /// Lower row bound, `None` for unbounded.
    pub row_lower: Option<usize>,
    /// Upper row bound, `None` for unbounded.
    pub row_upper: Option<usize>,
    /// Lower column bound, `None` for unbounded.
    pub col_lower: Option<usize>,
    /// Upper column bound, `None` for unbounded.
    pub col_upper: Option<usize>,
}

impl SheetRange {
    /// Parse an A1-notation range spec.
    pub fn parse(spec: &str) -> LoadResult<Self> {
        let pattern = Regex::new(r"^([A-Z]*)(\d*)(:([A-Z]*)(\d*))?$").expect("hardcoded regex");
        let upper = spec.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Err(LoadError::InvalidRange {
                spec: spec.to_string(),
            });
        }
        let captures = pattern
            .captures(upper.as_str())
            .ok_or_else(|| LoadError::InvalidRange {
                spec: spec.to_string(),
            })?;
        Ok(SheetRange {
            col_lower: captures.get(1).and_then(|m| col_to_index(m.as_str())),
            row_lower: captures.get(2).and_then(|m| row_to_index(m.as_str())),
            col_upper: captures.get(4).and_then(|m| col_to_index(m.as_str())),
            row_upper: captures.get(5).and_then(|m| row_to_index(m.as_str())),
        })
    }

    /// A fully-bounded range over a rectangle.
    pub fn bounded(start_row: usize, end_row: usize, start_col: usize, end_col: usize) -> Self {
        Self {
            row_lower: Some(start_row),
            row_upper: Some(end_row),
            col_lower: Some(start_col),
            col_upper: Some(end_col),
        }
    }

    /// Render back to A1 notation (unbounded sides fall back to the given
    /// grid extent).
    pub fn to_a1(&self, grid_rows: usize, grid_cols: usize) -> String {
        let r0 = self.row_lower.unwrap_or(0);
        let c0 = self.col_lower.unwrap_or(0);
        let r1 = self.row_upper.unwrap_or(grid_rows.saturating_sub(1));
        let c1 = self.col_upper.unwrap_or(grid_cols.saturating_sub(1));
        format!(
            "{}{}:{}{}",
            col_letter(c0),
            r0 + 1,
            col_letter(c1),
            r1 + 1
        )
    }

    /// Clamp against a grid's extent, producing concrete inclusive bounds.
    /// Returns `None` when the range lies entirely outside the grid.
    pub fn resolve(&self, n_rows: usize, n_cols: usize) -> Option<(usize, usize, usize, usize)> {
        if n_rows == 0 || n_cols == 0 {
            return None;
        }
        let r0 = self.row_lower.unwrap_or(0);
        let c0 = self.col_lower.unwrap_or(0);
        let r1 = self.row_upper.unwrap_or(n_rows - 1).min(n_rows - 1);
        let c1 = self.col_upper.unwrap_or(n_cols - 1).min(n_cols - 1);
        if r0 > r1 || c0 > c1 {
            return None;
        }
        Some((r0, r1, c0, c1))
    }
}

/// Convert a column letter run ("A", "AB") to a 0-based index.
fn col_to_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for ch in letters.chars() {
        index = index * 26 + (ch as usize - 'A' as usize + 1);
    }
    Some(index - 1)
}

/// Convert a 1-based row number string to a 0-based index.
fn row_to_index(digits: &str) -> Option<usize> {
    if digits.is_empty() {
        return None;
    }
    digits.parse::<usize>().ok().map(|n| n.saturating_sub(1))
}

/// Convert a 0-based column index to letters ("A", "AB").
pub(crate) fn col_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).expect("ascii letters")
}
