//! Grid-to-table extraction.
//!
//! [`extract_raw`] materializes a whole grid verbatim as all-text columns.
//! [`extract_assisted`] applies an override: rectangle selection, hidden and
//! merged cell handling, skip/header/footer slicing, normalization, then the
//! fixed transformation chain (drop_regex, drop_conditions, renames, type
//! hints, unpivot). [`extract_region`] scopes an override down to one
//! detected sub-table and reuses the assisted path; keeping the loop driver
//! and the single-table path as separate functions avoids the two recursing
//! into each other.

use std::collections::HashMap;

use regex::Regex;

use crate::analyze::TableRegion;
use crate::error::{LoadError, LoadResult};
use crate::grid::{CellValue, Grid, SheetRange};
use crate::infer;
use crate::normalize::{self, NormalizeOptions};
use crate::observe::{LoadEvent, LoadObserver};
use crate::reader::excel_serial_to_datetime;
use crate::types::{DataType, Table, Value};

use super::overrides::{DropCondition, MergeStrategy, SheetOverride};

/// Load an entire grid verbatim: every cell as text, columns `col_0`,
/// `col_1`, ... No transformation of any kind.
pub fn extract_raw(grid: &Grid) -> Table {
    let n_cols = grid.n_cols();
    let columns: Vec<String> = (0..n_cols).map(|i| format!("col_{i}")).collect();
    let rows: Vec<Vec<Option<String>>> = (0..grid.n_rows())
        .map(|row| (0..n_cols).map(|col| grid.cell(row, col).to_text()).collect())
        .collect();
    Table::from_text_rows(columns, rows)
}

/// Load a grid under an override.
///
/// `native` marks sources that support the direct read path; non-native
/// sources, hidden-content filtering, and merged-cell handling all route
/// through the generic path, which additionally normalizes the result.
pub fn extract_assisted(
    grid: &Grid,
    override_: &SheetOverride,
    native: bool,
    observer: &dyn LoadObserver,
) -> LoadResult<Table> {
    let use_generic = !native || !override_.include_hidden || override_.merge_handling.is_some();

    let rect_spec = override_.table_range.as_deref().or(override_.range.as_deref());
    let rect = match rect_spec {
        Some(spec) => {
            let range = SheetRange::parse(spec)?;
            range
                .resolve(grid.n_rows(), grid.n_cols())
                .ok_or_else(|| LoadError::InvalidRange {
                    spec: spec.to_string(),
                })?
        }
        None => match SheetRange::default().resolve(grid.n_rows(), grid.n_cols()) {
            Some(rect) => rect,
            None => return Ok(Table::from_text_rows(Vec::new(), Vec::new())),
        },
    };

    let filter_hidden = use_generic && !override_.include_hidden;
    let merge_fill = use_generic
        && override_
            .merge_handling
            .map(|m| m.strategy)
            .unwrap_or(MergeStrategy::Fill)
            == MergeStrategy::Fill;

    let (r0, r1, c0, c1) = rect;
    let visible_cols: Vec<usize> = (c0..=c1)
        .filter(|col| !(filter_hidden && grid.hidden_cols.contains(col)))
        .collect();

    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    for row in r0..=r1 {
        if filter_hidden && grid.hidden_rows.contains(&row) {
            continue;
        }
        rows.push(
            visible_cols
                .iter()
                .map(|&col| effective_cell(grid, row, col, merge_fill).to_text())
                .collect(),
        );
    }

    if override_.skip_rows > 0 {
        rows.drain(..override_.skip_rows.min(rows.len()));
    }
    if override_.skip_footer > 0 {
        let keep = rows.len().saturating_sub(override_.skip_footer);
        rows.truncate(keep);
    }

    let width = visible_cols.len();
    let columns = if override_.header_rows > 0 && rows.len() >= override_.header_rows {
        let header_rows: Vec<Vec<Option<String>>> = rows.drain(..override_.header_rows).collect();
        build_column_names(&header_rows, width)
    } else {
        (0..width).map(|i| format!("col_{i}")).collect()
    };

    let mut table = Table::from_text_rows(columns, rows);

    if use_generic {
        // Seed the normalizer with semantic hints so ID-like text columns
        // survive numeric parsing; explicit hints overlay the seeded ones.
        let mut seed = infer::generate_type_hints(&table);
        seed.extend(override_.type_hints.clone());
        let options = NormalizeOptions {
            locale: override_.number_locale(),
            type_hints: seed,
            ..NormalizeOptions::default()
        };
        table = normalize::normalize(table, &options);
    }

    if let Some(pattern) = override_.drop_regex.as_deref() {
        table = apply_drop_regex(table, pattern, observer)?;
    }
    if !override_.drop_conditions.is_empty() {
        table = apply_drop_conditions(table, &override_.drop_conditions, observer)?;
    }
    if !override_.column_renames.is_empty() {
        table.rename_columns(&override_.column_renames);
    }

    let mut hints = infer::generate_type_hints(&table);
    hints.extend(override_.type_hints.clone());
    if !hints.is_empty() {
        apply_type_hints(&mut table, &hints);
    }

    if let Some(unpivot) = &override_.unpivot {
        table = table.unpivot(
            &unpivot.id_vars,
            &unpivot.value_vars,
            &unpivot.var_name,
            &unpivot.value_name,
        );
    }

    Ok(table)
}

/// Load one detected sub-table by scoping the override to its rectangle.
///
/// The scoped override disables auto-detection and clears the sub-table
/// selectors so the region cannot split again.
pub fn extract_region(
    grid: &Grid,
    region: &TableRegion,
    override_: &SheetOverride,
    native: bool,
    observer: &dyn LoadObserver,
) -> LoadResult<Table> {
    let range = SheetRange::bounded(
        region.start_row,
        region.end_row,
        region.start_col,
        region.end_col,
    );
    let scoped = SheetOverride {
        skip_rows: 0,
        header_rows: if region.has_header { 1 } else { 0 },
        skip_footer: 0,
        range: Some(range.to_a1(grid.n_rows(), grid.n_cols())),
        auto_detect: false,
        extract_table: None,
        table_range: None,
        ..override_.clone()
    };
    extract_assisted(grid, &scoped, native, observer)
}

/// Resolve a cell, expanding merged ranges when filling is on.
fn effective_cell<'g>(grid: &'g Grid, row: usize, col: usize, merge_fill: bool) -> &'g CellValue {
    if merge_fill {
        for merged in &grid.merged_ranges {
            if merged.contains(row, col) {
                let (ar, ac) = merged.anchor();
                return grid.cell(ar, ac);
            }
        }
    }
    grid.cell(row, col)
}

/// Build column names from one or more header rows. Multi-row headers join
/// non-blank parts per column with a double underscore; fully blank columns
/// fall back to `col_{i}`.
fn build_column_names(header_rows: &[Vec<Option<String>>], width: usize) -> Vec<String> {
    (0..width)
        .map(|col| {
            let parts: Vec<&str> = header_rows
                .iter()
                .filter_map(|row| row.get(col).and_then(|c| c.as_deref()))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            if parts.is_empty() {
                format!("col_{col}")
            } else {
                parts.join("__")
            }
        })
        .collect()
}

/// Drop rows whose first-column text matches the anchored pattern. Missing
/// values never match.
fn apply_drop_regex(
    table: Table,
    pattern: &str,
    observer: &dyn LoadObserver,
) -> LoadResult<Table> {
    if table.column_count() == 0 {
        return Ok(table);
    }
    let regex = compile_anchored(pattern)?;
    let before = table.row_count();
    let filtered = table.filter_rows(|row| match &row[0] {
        Value::Null => true,
        value => !regex.is_match(&value.render()),
    });
    let dropped = before - filtered.row_count();
    if dropped > 0 {
        observer.on_event(&LoadEvent::RowsDropped {
            column: filtered.schema.fields[0].name.clone(),
            rule: format!("drop_regex {pattern}"),
            rows: dropped,
        });
    }
    Ok(filtered)
}

/// Apply drop conditions: each computes an independent row mask against its
/// column; the masks are ANDed. Conditions naming unknown columns are
/// skipped with an advisory event.
fn apply_drop_conditions(
    mut table: Table,
    conditions: &[DropCondition],
    observer: &dyn LoadObserver,
) -> LoadResult<Table> {
    if table.row_count() == 0 {
        return Ok(table);
    }

    let mut keep = vec![true; table.row_count()];
    for condition in conditions {
        let Some(index) = table.schema.index_of(&condition.column) else {
            observer.on_event(&LoadEvent::DropColumnMissing {
                column: condition.column.clone(),
            });
            continue;
        };

        let (rule, matches): (String, Vec<bool>) = if let Some(pattern) = &condition.regex {
            let regex = compile_anchored(pattern)?;
            let mask = table
                .column_values(index)
                .map(|v| !v.is_null() && regex.is_match(&v.render()))
                .collect();
            (format!("regex {pattern}"), mask)
        } else if let Some(value) = &condition.equals {
            let mask = table
                .column_values(index)
                .map(|v| !v.is_null() && v.render() == *value)
                .collect();
            (format!("equals {value}"), mask)
        } else if let Some(is_null) = condition.is_null {
            let mask = table
                .column_values(index)
                .map(|v| v.is_null() == is_null)
                .collect();
            (format!("is_null {is_null}"), mask)
        } else {
            continue;
        };

        let dropped = matches.iter().filter(|&&m| m).count();
        if dropped > 0 {
            observer.on_event(&LoadEvent::RowsDropped {
                column: condition.column.clone(),
                rule,
                rows: dropped,
            });
        }
        for (k, m) in keep.iter_mut().zip(matches) {
            *k &= !m;
        }
    }

    table.retain_rows(&keep);
    Ok(table)
}

/// Coerce columns per SQL type-name hints. Unknown columns and unrecognized
/// type names are ignored.
fn apply_type_hints(table: &mut Table, hints: &HashMap<String, String>) {
    for (column, hint) in hints {
        let Some(index) = table.schema.index_of(column) else {
            continue;
        };
        let upper = hint.to_uppercase();

        if upper.contains("INT") {
            let values = coerce(table, index, |v| {
                numeric_of(v).map(|f| Value::Int64(f as i64))
            });
            table.replace_column(index, DataType::Int64, values);
        } else if ["DECIMAL", "NUMERIC", "DOUBLE", "FLOAT"]
            .iter()
            .any(|t| upper.contains(t))
        {
            let values = coerce(table, index, |v| numeric_of(v).map(Value::Float64));
            table.replace_column(index, DataType::Float64, values);
        } else if upper.contains("DATE") || upper.contains("TIME") {
            let values = coerce(table, index, |v| match v {
                Value::Timestamp(ts) => Some(Value::Timestamp(*ts)),
                Value::Utf8(s) => normalize::parse_date_string(s).map(Value::Timestamp),
                other => other
                    .as_f64()
                    .and_then(excel_serial_to_datetime)
                    .map(Value::Timestamp),
            });
            table.replace_column(index, DataType::Timestamp, values);
        } else if upper.contains("BOOL") {
            let truthy = ["true", "1", "yes", "y"];
            let values: Vec<Value> = table
                .column_values(index)
                .map(|v| Value::Bool(truthy.contains(&v.render().to_lowercase().as_str())))
                .collect();
            table.replace_column(index, DataType::Bool, values);
        } else if ["VARCHAR", "TEXT", "STRING", "CHAR"]
            .iter()
            .any(|t| upper.contains(t))
        {
            let values = coerce(table, index, |v| Some(Value::Utf8(v.render())));
            table.replace_column(index, DataType::Utf8, values);
        }
    }
}

fn coerce<F>(table: &Table, index: usize, f: F) -> Vec<Value>
where
    F: Fn(&Value) -> Option<Value>,
{
    table
        .column_values(index)
        .map(|v| {
            if v.is_null() {
                Value::Null
            } else {
                f(v).unwrap_or(Value::Null)
            }
        })
        .collect()
}

fn numeric_of(value: &Value) -> Option<f64> {
    match value {
        Value::Utf8(s) => s.trim().parse::<f64>().ok(),
        other => other.as_f64(),
    }
}

/// Compile a row-filter pattern anchored at the start of the value, the
/// prefix-match convention used throughout the override surface.
fn compile_anchored(pattern: &str) -> LoadResult<Regex> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|e| LoadError::InvalidRange {
        spec: format!("drop pattern '{pattern}': {e}"),
    })
}
