//! End-to-end loading tests against generated workbooks.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rust_xlsxwriter::Workbook;

use sheetsense::catalog::MemoryCatalog;
use sheetsense::load::{Loader, SheetOverride};
use sheetsense::naming::TableRegistry;
use sheetsense::observe::{LoadEvent, LoadObserver};
use sheetsense::types::Value;
use sheetsense::LoadMode;

fn tmp_file(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("sheetsense-{name}-{nanos}.xlsx"))
}

fn new_loader() -> (Loader, Arc<MemoryCatalog>) {
    let registry = Arc::new(TableRegistry::new());
    let catalog = Arc::new(MemoryCatalog::new());
    (Loader::new(registry, catalog.clone()), catalog)
}

/// Records every advisory event for later assertions.
#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl LoadObserver for RecordingObserver {
    fn on_event(&self, event: &LoadEvent) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{event:?}"));
    }
}

impl RecordingObserver {
    fn saw(&self, needle: &str) -> bool {
        self.events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.contains(needle))
    }
}

/// Two mini-tables separated by four blank rows.
fn write_two_table_workbook(path: &Path) {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("Sheet1").unwrap();

    ws.write_string(0, 0, "Product").unwrap();
    ws.write_string(0, 1, "Price").unwrap();
    ws.write_string(1, 0, "Widget").unwrap();
    ws.write_number(1, 1, 100).unwrap();

    // rows 2..=5 left blank

    ws.write_string(6, 0, "Category").unwrap();
    ws.write_string(6, 1, "Count").unwrap();
    ws.write_string(7, 0, "Tools").unwrap();
    ws.write_number(7, 1, 50).unwrap();

    wb.save(path).unwrap();
}

#[test]
fn raw_mode_loads_everything_as_text() {
    let path = tmp_file("raw");
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.write_string(0, 0, "Some Title").unwrap();
    ws.write_string(1, 0, "Name").unwrap();
    ws.write_number(2, 0, 42).unwrap();
    wb.save(&path).unwrap();

    let (loader, catalog) = new_loader();
    let metas = loader
        .load_sheet(&path, "raw.xlsx", "Sheet1", "excel", None)
        .unwrap();
    assert_eq!(metas.len(), 1);
    assert_eq!(metas[0].mode, LoadMode::Raw);
    assert_eq!(metas[0].est_rows, 3);

    let table = catalog.get(&metas[0].table_name).unwrap();
    assert_eq!(table.schema.fields[0].name, "col_0");
    assert_eq!(table.rows[2][0], Value::Utf8("42".to_string()));

    std::fs::remove_file(&path).ok();
}

#[test]
fn auto_detect_splits_two_tables() {
    let path = tmp_file("two-tables");
    write_two_table_workbook(&path);

    let (loader, catalog) = new_loader();
    let override_ = SheetOverride {
        auto_detect: true,
        ..SheetOverride::default()
    };
    let metas = loader
        .load_sheet(&path, "multi.xlsx", "Sheet1", "excel", Some(&override_))
        .unwrap();

    assert_eq!(metas.len(), 2);
    assert!(metas[0].table_name.ends_with("_table0"));
    assert!(metas[1].table_name.ends_with("_table1"));
    assert!(metas.iter().all(|m| m.mode == LoadMode::Assisted));

    let first = catalog.get(&metas[0].table_name).unwrap();
    assert_eq!(first.schema.fields[0].name, "Product");
    assert_eq!(first.row_count(), 1);
    assert_eq!(first.rows[0][0], Value::Utf8("Widget".to_string()));
    assert_eq!(first.rows[0][1].render(), "100");

    let second = catalog.get(&metas[1].table_name).unwrap();
    assert_eq!(second.schema.fields[0].name, "Category");
    assert_eq!(second.row_count(), 1);
    assert_eq!(second.rows[0][0], Value::Utf8("Tools".to_string()));
    assert_eq!(second.rows[0][1].render(), "50");

    std::fs::remove_file(&path).ok();
}

#[test]
fn single_blank_row_does_not_split() {
    let path = tmp_file("one-blank");
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.write_string(0, 0, "Name").unwrap();
    ws.write_string(0, 1, "Qty").unwrap();
    ws.write_string(1, 0, "a").unwrap();
    ws.write_number(1, 1, 1).unwrap();
    // row 2 blank
    ws.write_string(3, 0, "b").unwrap();
    ws.write_number(3, 1, 2).unwrap();
    wb.save(&path).unwrap();

    let (loader, catalog) = new_loader();
    let override_ = SheetOverride {
        auto_detect: true,
        ..SheetOverride::default()
    };
    let metas = loader
        .load_sheet(&path, "one-blank.xlsx", "Sheet1", "excel", Some(&override_))
        .unwrap();

    assert_eq!(metas.len(), 1);
    let table = catalog.get(&metas[0].table_name).unwrap();
    // Both data rows survive in one table; the blank row is dropped by
    // normalization, not used as a separator.
    assert_eq!(table.row_count(), 2);
    assert_eq!(table.rows[0][0], Value::Utf8("a".to_string()));
    assert_eq!(table.rows[1][0], Value::Utf8("b".to_string()));

    std::fs::remove_file(&path).ok();
}

#[test]
fn out_of_range_extract_table_clamps_to_zero() {
    let path = tmp_file("clamp");
    write_two_table_workbook(&path);

    let registry = Arc::new(TableRegistry::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let observer = Arc::new(RecordingObserver::default());
    let loader = Loader::with_observer(registry, catalog.clone(), observer.clone());

    let override_ = SheetOverride {
        auto_detect: true,
        extract_table: Some(10),
        ..SheetOverride::default()
    };
    let metas = loader
        .load_sheet(&path, "clamp.xlsx", "Sheet1", "excel", Some(&override_))
        .unwrap();

    assert_eq!(metas.len(), 1);
    assert!(observer.saw("RegionIndexClamped"));

    let table = catalog.get(&metas[0].table_name).unwrap();
    assert_eq!(table.schema.fields[0].name, "Product");

    std::fs::remove_file(&path).ok();
}

#[test]
fn detected_title_rows_are_skipped() {
    let path = tmp_file("title");
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.write_string(0, 0, "Quarterly Report 2024").unwrap();
    ws.write_string(1, 0, "Name").unwrap();
    ws.write_string(1, 1, "Qty").unwrap();
    ws.write_string(2, 0, "a").unwrap();
    ws.write_number(2, 1, 1).unwrap();
    ws.write_string(3, 0, "b").unwrap();
    ws.write_number(3, 1, 2).unwrap();
    wb.save(&path).unwrap();

    let (loader, catalog) = new_loader();
    let override_ = SheetOverride {
        auto_detect: true,
        ..SheetOverride::default()
    };
    let metas = loader
        .load_sheet(&path, "title.xlsx", "Sheet1", "excel", Some(&override_))
        .unwrap();

    let table = catalog.get(&metas[0].table_name).unwrap();
    assert_eq!(table.schema.fields[0].name, "Name");
    assert_eq!(table.row_count(), 2);

    std::fs::remove_file(&path).ok();
}

#[test]
fn explicit_table_range_beats_detection() {
    let path = tmp_file("table-range");
    write_two_table_workbook(&path);

    let (loader, catalog) = new_loader();
    let override_ = SheetOverride {
        auto_detect: true,
        table_range: Some("A7:B8".to_string()),
        ..SheetOverride::default()
    };
    let metas = loader
        .load_sheet(&path, "range.xlsx", "Sheet1", "excel", Some(&override_))
        .unwrap();

    // The manual rectangle collapses the multi-table fan-out to one load.
    assert_eq!(metas.len(), 1);
    assert!(!metas[0].table_name.contains("_table"));
    let table = catalog.get(&metas[0].table_name).unwrap();
    assert_eq!(table.schema.fields[0].name, "Category");
    assert_eq!(table.row_count(), 1);

    std::fs::remove_file(&path).ok();
}

#[test]
fn missing_sheet_is_a_descriptive_error() {
    let path = tmp_file("missing-sheet");
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.write_string(0, 0, "x").unwrap();
    wb.save(&path).unwrap();

    let (loader, _catalog) = new_loader();
    let err = loader
        .load_sheet(&path, "m.xlsx", "NoSuchSheet", "excel", None)
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("RAW"));
    assert!(message.contains("NoSuchSheet"));

    std::fs::remove_file(&path).ok();
}

#[test]
fn multi_row_headers_and_renames() {
    let path = tmp_file("multirow");
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.write_string(0, 0, "Region").unwrap();
    ws.write_string(0, 1, "2024").unwrap();
    ws.write_string(1, 1, "Q1").unwrap();
    ws.write_string(2, 0, "north").unwrap();
    ws.write_number(2, 1, 10).unwrap();
    wb.save(&path).unwrap();

    let (loader, catalog) = new_loader();
    let override_ = SheetOverride {
        header_rows: 2,
        column_renames: std::collections::HashMap::from([(
            "2024__Q1".to_string(),
            "q1_sales".to_string(),
        )]),
        ..SheetOverride::default()
    };
    let metas = loader
        .load_sheet(&path, "multirow.xlsx", "Sheet1", "excel", Some(&override_))
        .unwrap();

    let table = catalog.get(&metas[0].table_name).unwrap();
    assert_eq!(table.schema.fields[0].name, "Region");
    assert_eq!(table.schema.fields[1].name, "q1_sales");

    std::fs::remove_file(&path).ok();
}
