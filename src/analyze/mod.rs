//! Worksheet structure analysis.
//!
//! [`StructureAnalyzer::analyze`] examines one sheet's cell grid and produces
//! a [`StructureInfo`] fingerprint: data bounding box, header row and
//! confidence, metadata rows, locale guess, and one-or-more table sub-regions
//! separated by blank-row runs. Results are cached by
//! (path, sheet, modification time).
//!
//! Analysis is advisory. Every internal failure is converted into a
//! conservative default so a bad heuristic can never make a load fail; the
//! loader merges findings into overrides where explicit fields always win.
//!
//! Confidence values are ordinal signals, not calibrated probabilities, and
//! values from the sheet-level and per-region detectors are not comparable
//! with each other.

pub mod cache;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use regex::Regex;
use serde::Serialize;

use crate::grid::{Grid, MergedRange};
use crate::observe::{LoadEvent, LoadObserver, NullObserver};
use crate::reader;
use cache::LruCache;

/// Default capacity of the analysis result cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// How many rows below the start of a section the header scan examines.
const HEADER_SCAN_ROWS: usize = 10;

/// Sample window for locale detection.
const LOCALE_SAMPLE_ROWS: usize = 50;
const LOCALE_SAMPLE_COLS: usize = 20;

/// Lookahead cap for per-region column-width detection. Tables whose outer
/// columns are blank for more than this many leading rows get width-truncated.
const WIDTH_SCAN_ROWS: usize = 100;

/// Number-format fragments that indicate European (comma-decimal) formatting.
const EUROPEAN_FORMAT_INDICATORS: &[&str] =
    &["#.##0,00", "#,##0.00_-", "0.00_-", "[$\u{20ac}-*] #,##0.00"];

/// A detected table sub-region within a sheet, 0-based inclusive bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRegion {
    pub start_row: usize,
    pub end_row: usize,
    pub start_col: usize,
    pub end_col: usize,
    /// Whether the region's first rows contain a detected header.
    pub has_header: bool,
    /// Absolute row index of the header, when present.
    pub header_row: Option<usize>,
    /// Header confidence for this region.
    pub confidence: f64,
    /// Non-empty rows above the header within the region's section (table
    /// titles and the like).
    pub title_rows: Vec<usize>,
}

/// Detected decimal/thousands separator pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocaleInfo {
    /// Locale tag, `en_US` or `de_DE`.
    pub locale: String,
    pub decimal_separator: char,
    pub thousands_separator: char,
}

impl LocaleInfo {
    /// US-style formatting (period decimal, comma thousands).
    pub fn en_us() -> Self {
        Self {
            locale: "en_US".to_string(),
            decimal_separator: '.',
            thousands_separator: ',',
        }
    }

    /// European-style formatting (comma decimal, period thousands).
    pub fn de_de() -> Self {
        Self {
            locale: "de_DE".to_string(),
            decimal_separator: ',',
            thousands_separator: '.',
        }
    }
}

/// Structural fingerprint of one worksheet. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureInfo {
    /// Bounding box of non-hidden, non-empty cells, 0-based inclusive.
    pub data_start_row: usize,
    pub data_end_row: usize,
    pub data_start_col: usize,
    pub data_end_col: usize,
    /// Absolute row index of the detected sheet-level header.
    pub header_row: Option<usize>,
    pub header_rows_count: usize,
    /// Sheet-level header confidence.
    pub header_confidence: f64,
    /// Title rows between the box start and the header.
    pub metadata_rows: Vec<usize>,
    #[serde(skip)]
    pub merged_ranges: Vec<MergedRange>,
    pub hidden_rows: Vec<usize>,
    pub hidden_columns: Vec<usize>,
    pub locale: LocaleInfo,
    /// Detected table sub-regions. May be empty when no header was found
    /// anywhere.
    pub regions: Vec<TableRegion>,
    /// Fully-blank rows inside the bounding box.
    pub blank_rows: Vec<usize>,
    /// Rows the loader should skip to land on the header.
    pub suggested_skip_rows: usize,
    pub suggested_skip_footer: usize,
}

impl StructureInfo {
    /// Number of detected table sub-regions.
    pub fn num_tables(&self) -> usize {
        self.regions.len()
    }

    /// Conservative fallback used when analysis fails: a single-cell box,
    /// no header, US locale.
    pub fn conservative_default() -> Self {
        Self {
            data_start_row: 0,
            data_end_row: 0,
            data_start_col: 0,
            data_end_col: 0,
            header_row: None,
            header_rows_count: 0,
            header_confidence: 0.0,
            metadata_rows: Vec::new(),
            merged_ranges: Vec::new(),
            hidden_rows: Vec::new(),
            hidden_columns: Vec::new(),
            locale: LocaleInfo::en_us(),
            regions: Vec::new(),
            blank_rows: Vec::new(),
            suggested_skip_rows: 0,
            suggested_skip_footer: 0,
        }
    }
}

type CacheKey = (PathBuf, String, SystemTime);

/// Cached worksheet structure analyzer.
///
/// Cache keys include the file's modification time, so a rewritten file gets
/// a fresh analysis; stale entries linger until LRU capacity evicts them.
/// Concurrent analysis of the same key is not deduplicated; the last writer's
/// result wins, which is acceptable because analysis is deterministic.
pub struct StructureAnalyzer {
    cache: Mutex<LruCache<CacheKey, StructureInfo>>,
    observer: Arc<dyn LoadObserver>,
}

impl Default for StructureAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, Arc::new(NullObserver))
    }
}

impl StructureAnalyzer {
    /// Create an analyzer with the given cache capacity and observer.
    pub fn new(cache_capacity: usize, observer: Arc<dyn LoadObserver>) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(cache_capacity)),
            observer,
        }
    }

    /// Analyze one sheet of a file, consulting the cache first.
    ///
    /// Never fails: I/O or parse errors produce
    /// [`StructureInfo::conservative_default`] after an
    /// [`LoadEvent::AnalysisFailed`] event.
    pub fn analyze(&self, path: &Path, sheet: &str) -> StructureInfo {
        let key = match reader::modified_time(path) {
            Ok(mtime) => (path.to_path_buf(), sheet.to_string(), mtime),
            Err(err) => {
                self.observer.on_event(&LoadEvent::AnalysisFailed {
                    file: path.to_path_buf(),
                    sheet: sheet.to_string(),
                    error: err.to_string(),
                });
                return StructureInfo::conservative_default();
            }
        };

        {
            let mut cache = self.cache.lock().expect("analyzer cache poisoned");
            if let Some(hit) = cache.get(&key).cloned() {
                self.observer.on_event(&LoadEvent::AnalysisCacheHit {
                    file: path.to_path_buf(),
                    sheet: sheet.to_string(),
                    cache_len: cache.len(),
                });
                return hit;
            }
        }

        self.observer.on_event(&LoadEvent::AnalysisStarted {
            file: path.to_path_buf(),
            sheet: sheet.to_string(),
        });

        let info = match reader::read_grid(path, sheet) {
            Ok(grid) => analyze_grid(&grid),
            Err(err) => {
                self.observer.on_event(&LoadEvent::AnalysisFailed {
                    file: path.to_path_buf(),
                    sheet: sheet.to_string(),
                    error: err.to_string(),
                });
                return StructureInfo::conservative_default();
            }
        };

        self.observer.on_event(&LoadEvent::StructureDetected {
            file: path.to_path_buf(),
            sheet: sheet.to_string(),
            header_row: info.header_row,
            header_confidence: info.header_confidence,
            num_tables: info.num_tables(),
            detected_locale: info.locale.locale.clone(),
        });

        let mut cache = self.cache.lock().expect("analyzer cache poisoned");
        cache.put(key, info.clone());
        info
    }

    /// Drop all cached analyses.
    pub fn clear_cache(&self) {
        self.cache.lock().expect("analyzer cache poisoned").clear();
    }
}

/// Analyze an in-memory grid. Pure; the cached entry point wraps this.
pub fn analyze_grid(grid: &Grid) -> StructureInfo {
    let bbox = bounding_box(grid);
    let header = detect_header(grid, bbox.0, bbox.1, bbox.2, bbox.3);
    let metadata_rows: Vec<usize> = match header.row {
        Some(header_row) if header_row > bbox.0 => (bbox.0..header_row).collect(),
        _ => Vec::new(),
    };
    let locale = detect_locale(grid, bbox.0, bbox.1, bbox.2, bbox.3);
    let regions = detect_regions(grid);
    let blank_rows = blank_rows_in(grid, bbox.0, bbox.1, bbox.2, bbox.3);

    StructureInfo {
        data_start_row: bbox.0,
        data_end_row: bbox.1,
        data_start_col: bbox.2,
        data_end_col: bbox.3,
        header_row: header.row,
        header_rows_count: if header.row.is_some() { 1 } else { 0 },
        header_confidence: header.confidence,
        suggested_skip_rows: metadata_rows.len(),
        suggested_skip_footer: 0,
        metadata_rows,
        merged_ranges: grid.merged_ranges.clone(),
        hidden_rows: grid.hidden_rows.iter().copied().collect(),
        hidden_columns: grid.hidden_cols.iter().copied().collect(),
        locale,
        regions,
        blank_rows,
    }
}

/// Detect table sub-regions inside a grid's bounding box.
///
/// Runs of two or more fully-blank rows split the box into sections; a
/// single blank row never splits a table. Sections without a detectable
/// header are dropped. With no qualifying section left, the whole box
/// becomes one region, provided a sheet-level header exists at all.
pub fn detect_regions(grid: &Grid) -> Vec<TableRegion> {
    let (start_row, end_row, start_col, end_col) = bounding_box(grid);
    let header = detect_header(grid, start_row, end_row, start_col, end_col);

    let blank = blank_rows_in(grid, start_row, end_row, start_col, end_col);
    let separators: Vec<(usize, usize)> = group_consecutive(&blank)
        .into_iter()
        .filter(|(first, last)| last - first + 1 >= 2)
        .collect();

    let whole_box_region = |header_row: usize, confidence: f64| TableRegion {
        start_row: header_row,
        end_row,
        start_col,
        end_col,
        has_header: true,
        header_row: Some(header_row),
        confidence,
        title_rows: Vec::new(),
    };

    if separators.is_empty() {
        return match header.row {
            Some(row) => vec![whole_box_region(row, header.confidence)],
            None => Vec::new(),
        };
    }

    let mut regions = Vec::new();
    for (section_start, section_end) in split_by_separators(start_row, end_row, &separators) {
        let section = detect_section_header(grid, section_start, section_end, start_col, end_col);
        let Some(header_row) = section.row else {
            continue;
        };

        let title_rows: Vec<usize> = (section_start..header_row)
            .filter(|&row| !grid.row_is_blank(row, start_col, end_col))
            .collect();
        let (table_start_col, table_end_col) =
            detect_table_width(grid, header_row, section_end, start_col, end_col);

        regions.push(TableRegion {
            start_row: header_row,
            end_row: section_end,
            start_col: table_start_col,
            end_col: table_end_col,
            has_header: true,
            header_row: Some(header_row),
            confidence: section.confidence,
            title_rows,
        });
    }

    if regions.is_empty() {
        if let Some(row) = header.row {
            regions.push(whole_box_region(row, header.confidence));
        }
    }
    regions
}

/// Minimal rectangle over non-hidden rows and columns containing a non-empty
/// cell. An empty sheet collapses to the single cell (0, 0).
fn bounding_box(grid: &Grid) -> (usize, usize, usize, usize) {
    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for row in 0..grid.n_rows() {
        if grid.hidden_rows.contains(&row) {
            continue;
        }
        for col in 0..grid.n_cols() {
            if grid.hidden_cols.contains(&col) {
                continue;
            }
            if grid.cell(row, col).is_empty() {
                continue;
            }
            bounds = Some(match bounds {
                None => (row, row, col, col),
                Some((r0, _, c0, c1)) => (r0, row, c0.min(col), c1.max(col)),
            });
        }
    }
    bounds.unwrap_or((0, 0, 0, 0))
}

struct HeaderFinding {
    row: Option<usize>,
    confidence: f64,
}

/// Sheet-level header scan: up to [`HEADER_SCAN_ROWS`] rows from the box
/// start, first row whose non-empty cells are all text and that either has a
/// numeric cell directly beneath or is the box's last row.
fn detect_header(
    grid: &Grid,
    start_row: usize,
    end_row: usize,
    start_col: usize,
    end_col: usize,
) -> HeaderFinding {
    match scan_for_header(grid, start_row, end_row, start_col, end_col) {
        Some((row, _)) => HeaderFinding {
            row: Some(row),
            confidence: 0.9,
        },
        None => HeaderFinding {
            row: None,
            confidence: 0.0,
        },
    }
}

/// Per-section header scan. Same qualification rule as the sheet-level scan,
/// but a header validated only by being the section's last row gets the
/// weaker 0.5 score.
fn detect_section_header(
    grid: &Grid,
    section_start: usize,
    section_end: usize,
    start_col: usize,
    end_col: usize,
) -> HeaderFinding {
    match scan_for_header(grid, section_start, section_end, start_col, end_col) {
        Some((row, numbers_below)) => HeaderFinding {
            row: Some(row),
            confidence: if numbers_below { 0.9 } else { 0.5 },
        },
        None => HeaderFinding {
            row: None,
            confidence: 0.0,
        },
    }
}

/// Returns (header row, had numbers beneath) for the first qualifying row.
fn scan_for_header(
    grid: &Grid,
    start_row: usize,
    end_row: usize,
    start_col: usize,
    end_col: usize,
) -> Option<(usize, bool)> {
    let scan_end = end_row.min(start_row + HEADER_SCAN_ROWS - 1);
    for row in start_row..=scan_end {
        let cells: Vec<_> = (start_col..=end_col)
            .map(|col| grid.cell(row, col))
            .filter(|cell| !cell.is_empty())
            .collect();
        if cells.is_empty() {
            continue;
        }
        let all_text = cells.iter().all(|cell| cell.is_text());
        if !all_text {
            continue;
        }

        let numbers_below = row < end_row
            && (start_col..=end_col).any(|col| grid.cell(row + 1, col).is_number());
        if numbers_below || row == end_row {
            return Some((row, numbers_below));
        }
    }
    None
}

/// Guess the numeric locale from a bounded sample of the box.
///
/// Number-format strings matching known European patterns win immediately;
/// otherwise string samples vote, and comma-decimal plus dot-thousands must
/// both dominate their opposites.
fn detect_locale(
    grid: &Grid,
    start_row: usize,
    end_row: usize,
    start_col: usize,
    end_col: usize,
) -> LocaleInfo {
    let has_european_format = grid
        .number_formats
        .iter()
        .any(|fmt| EUROPEAN_FORMAT_INDICATORS.iter().any(|p| fmt.contains(p)));

    let mut samples: Vec<&str> = Vec::new();
    let row_cap = end_row.min(start_row + LOCALE_SAMPLE_ROWS - 1);
    let col_cap = end_col.min(start_col + LOCALE_SAMPLE_COLS - 1);
    for row in start_row..=row_cap {
        for col in start_col..=col_cap {
            if let crate::grid::CellValue::Text(s) = grid.cell(row, col) {
                samples.push(s.as_str());
            }
        }
    }

    // The regex crate has no lookahead; "not followed by a digit" becomes an
    // explicit non-digit-or-end alternative.
    let comma_decimal = Regex::new(r"\d,\d\d(?:[^0-9]|$)").expect("hardcoded regex");
    let dot_decimal = Regex::new(r"\d\.\d\d(?:[^0-9]|$)").expect("hardcoded regex");
    let dot_thousands = Regex::new(r"\d\.\d{3}").expect("hardcoded regex");
    let comma_thousands = Regex::new(r"\d,\d{3}").expect("hardcoded regex");

    let count = |re: &Regex| samples.iter().filter(|s| re.is_match(s)).count();
    let comma_decimal_votes = count(&comma_decimal);
    let dot_decimal_votes = count(&dot_decimal);
    let dot_thousands_votes = count(&dot_thousands);
    let comma_thousands_votes = count(&comma_thousands);

    if has_european_format
        || (comma_decimal_votes > dot_decimal_votes && dot_thousands_votes > comma_thousands_votes)
    {
        LocaleInfo::de_de()
    } else {
        LocaleInfo::en_us()
    }
}

/// Fully-blank rows within the box, in order.
fn blank_rows_in(
    grid: &Grid,
    start_row: usize,
    end_row: usize,
    start_col: usize,
    end_col: usize,
) -> Vec<usize> {
    (start_row..=end_row)
        .filter(|&row| grid.row_is_blank(row, start_col, end_col))
        .collect()
}

/// Group sorted row indices into maximal consecutive runs, returned as
/// inclusive (first, last) pairs.
fn group_consecutive(rows: &[usize]) -> Vec<(usize, usize)> {
    let mut groups = Vec::new();
    let mut iter = rows.iter().copied();
    let Some(first) = iter.next() else {
        return groups;
    };
    let mut run = (first, first);
    for row in iter {
        if row == run.1 + 1 {
            run.1 = row;
        } else {
            groups.push(run);
            run = (row, row);
        }
    }
    groups.push(run);
    groups
}

/// Split [start_row, end_row] into sections between separator runs.
fn split_by_separators(
    start_row: usize,
    end_row: usize,
    separators: &[(usize, usize)],
) -> Vec<(usize, usize)> {
    let mut sections = Vec::new();
    let mut current = start_row;
    let mut sorted: Vec<(usize, usize)> = separators.to_vec();
    sorted.sort_unstable();
    for (sep_start, sep_end) in sorted {
        if current < sep_start {
            sections.push((current, sep_start - 1));
        }
        current = sep_end + 1;
    }
    if current <= end_row {
        sections.push((current, end_row));
    }
    sections
}

/// Widest column span with data between the header and the section end,
/// scanning at most [`WIDTH_SCAN_ROWS`] rows.
fn detect_table_width(
    grid: &Grid,
    header_row: usize,
    end_row: usize,
    start_col: usize,
    end_col: usize,
) -> (usize, usize) {
    let mut min_col = end_col;
    let mut max_col = start_col;
    let row_cap = end_row.min(header_row + WIDTH_SCAN_ROWS - 1);
    for row in header_row..=row_cap {
        for col in start_col..=end_col {
            if !grid.cell(row, col).is_empty() {
                min_col = min_col.min(col);
                max_col = max_col.max(col);
            }
        }
    }
    if min_col <= max_col {
        (min_col, max_col)
    } else {
        (start_col, end_col)
    }
}
