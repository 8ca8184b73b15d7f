//! Load orchestration: RAW vs ASSISTED mode, detection merging, multi-table
//! iteration, and directory bulk loads.
//!
//! [`Loader::load_sheet`] is the main entry point. With no override, the
//! sheet loads RAW (verbatim, all-text). With an override it loads ASSISTED:
//! optionally merged with analyzer suggestions, split into detected
//! sub-tables, and run through the extraction chain. Every resulting table
//! is named by the registry and handed to the sink.
//!
//! Per-region failures are recoverable (the loop continues); a load call
//! that exhausts its fallbacks raises one descriptive [`LoadError::Load`]
//! with a remediation suggestion.

pub mod extract;
pub mod overrides;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::analyze::{StructureAnalyzer, StructureInfo};
use crate::catalog::TableSink;
use crate::error::{LoadError, LoadMode, LoadResult};
use crate::naming::TableRegistry;
use crate::observe::{LoadEvent, LoadObserver, NullObserver};
use crate::reader;
use crate::types::Table;

pub use overrides::{
    DropCondition, FileOverride, LocaleOverride, MergeHandling, MergeStrategy, SheetOverride,
    UnpivotSpec,
};

/// Advisory threshold below which header confidence triggers a warning event.
const LOW_CONFIDENCE_THRESHOLD: f64 = 0.3;

/// Default include patterns for directory loads.
const DEFAULT_INCLUDE: &[&str] = &["**/*.xlsx", "**/*.xlsm", "**/*.xls", "**/*.csv", "**/*.tsv"];

/// Metadata for one registered table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    /// Registered table name.
    pub table_name: String,
    /// Absolute path of the source file.
    pub file: PathBuf,
    /// Path relative to the load root.
    pub relpath: String,
    /// Source sheet name.
    pub sheet: String,
    /// RAW or ASSISTED.
    pub mode: LoadMode,
    /// File modification time at load time.
    pub mtime: SystemTime,
    /// Namespace the table was registered under.
    pub namespace: String,
    /// Row count after all transformations.
    pub est_rows: usize,
}

/// Configuration for a bulk directory load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Glob patterns (relative to the root) selecting files to load; empty
    /// means the default spreadsheet/CSV patterns.
    pub include: Vec<String>,
    /// Glob patterns excluding files after inclusion.
    pub exclude: Vec<String>,
    /// Per-file overrides keyed by relative path.
    pub overrides: HashMap<String, FileOverride>,
}

/// One failed file or sheet in a bulk load.
#[derive(Debug, Clone)]
pub struct FailedLoad {
    pub relpath: String,
    pub sheet: Option<String>,
    pub error: String,
}

/// Outcome of a directory load: successes and failures side by side. A
/// failed file never aborts the rest of the walk.
#[derive(Debug, Clone, Default)]
pub struct DirectoryLoadReport {
    pub loaded: Vec<TableMeta>,
    pub failed: Vec<FailedLoad>,
}

/// Sheet loader. Holds no mutable state of its own; the registry and sink
/// are shared handles owned by the surrounding process.
pub struct Loader {
    analyzer: StructureAnalyzer,
    registry: Arc<TableRegistry>,
    sink: Arc<dyn TableSink>,
    observer: Arc<dyn LoadObserver>,
}

impl Loader {
    /// Create a loader with a silent observer.
    pub fn new(registry: Arc<TableRegistry>, sink: Arc<dyn TableSink>) -> Self {
        Self::with_observer(registry, sink, Arc::new(NullObserver))
    }

    /// Create a loader emitting advisory events to `observer`. The internal
    /// analyzer shares the same observer.
    pub fn with_observer(
        registry: Arc<TableRegistry>,
        sink: Arc<dyn TableSink>,
        observer: Arc<dyn LoadObserver>,
    ) -> Self {
        Self {
            analyzer: StructureAnalyzer::new(
                crate::analyze::DEFAULT_CACHE_CAPACITY,
                observer.clone(),
            ),
            registry,
            sink,
            observer,
        }
    }

    /// Access the loader's structure analyzer (for direct analysis queries).
    pub fn analyzer(&self) -> &StructureAnalyzer {
        &self.analyzer
    }

    /// Load one sheet, returning one [`TableMeta`] per registered table.
    ///
    /// No override loads RAW. An override loads ASSISTED; with `auto_detect`
    /// set and a native workbook source, analyzer suggestions are merged in
    /// first (explicit fields win) and multi-table detection may fan the
    /// sheet out into several tables.
    pub fn load_sheet(
        &self,
        file: &Path,
        relpath: &str,
        sheet: &str,
        namespace: &str,
        override_: Option<&SheetOverride>,
    ) -> LoadResult<Vec<TableMeta>> {
        let native = reader::is_native_workbook(file);
        let mut effective = override_.cloned();
        let mut structure: Option<StructureInfo> = None;

        if let Some(ov) = override_ {
            if ov.auto_detect && native {
                // Analysis never fails; a broken sheet just yields the
                // conservative default, which merges as a no-op.
                let info = self.analyzer.analyze(file, sheet);
                effective = Some(ov.merge_with_detection(&info));
                structure = Some(info);
            }
        }

        if let Some(ov) = &effective {
            self.validate_options(ov, structure.as_ref());
        }

        if let (Some(ov), Some(info)) = (effective.as_ref(), structure.as_ref()) {
            if info.num_tables() > 1 {
                return self.load_multi_table(file, relpath, sheet, namespace, ov, info, native);
            }
        }

        let table_name = self.registry.register(namespace, relpath, sheet, 0);
        let meta = match effective.as_ref() {
            Some(ov) => {
                self.load_assisted(file, relpath, sheet, &table_name, namespace, ov, native)?
            }
            None => self.load_raw(file, relpath, sheet, &table_name, namespace)?,
        };
        Ok(vec![meta])
    }

    /// Walk a directory, loading every included file. Failures are recorded
    /// in the report, never propagated.
    pub fn load_directory(
        &self,
        root: &Path,
        namespace: &str,
        config: &LoadConfig,
    ) -> LoadResult<DirectoryLoadReport> {
        let default_include: Vec<String> =
            DEFAULT_INCLUDE.iter().map(|s| s.to_string()).collect();
        let include_patterns = if config.include.is_empty() {
            &default_include
        } else {
            &config.include
        };
        let include = compile_patterns(include_patterns)?;
        let exclude = compile_patterns(&config.exclude)?;

        let mut report = DirectoryLoadReport::default();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    report.failed.push(FailedLoad {
                        relpath: err
                            .path()
                            .map(|p| p.display().to_string())
                            .unwrap_or_default(),
                        sheet: None,
                        error: err.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relpath = match entry.path().strip_prefix(root) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            if !include.iter().any(|p| p.matches(&relpath)) {
                continue;
            }
            if exclude.iter().any(|p| p.matches(&relpath)) {
                continue;
            }

            let sheets = match reader::sheet_names(entry.path()) {
                Ok(sheets) => sheets,
                Err(err) => {
                    report.failed.push(FailedLoad {
                        relpath: relpath.clone(),
                        sheet: None,
                        error: err.to_string(),
                    });
                    continue;
                }
            };

            let file_override = config.overrides.get(relpath.as_str());
            for sheet in sheets {
                let sheet_override =
                    file_override.and_then(|f| f.sheet_overrides.get(sheet.as_str()));
                match self.load_sheet(entry.path(), &relpath, &sheet, namespace, sheet_override) {
                    Ok(metas) => report.loaded.extend(metas),
                    Err(err) => report.failed.push(FailedLoad {
                        relpath: relpath.clone(),
                        sheet: Some(sheet),
                        error: err.to_string(),
                    }),
                }
            }
        }
        Ok(report)
    }

    fn validate_options(&self, override_: &SheetOverride, structure: Option<&StructureInfo>) {
        if override_.extract_table.is_some() && override_.table_range.is_some() {
            self.observer.on_event(&LoadEvent::ConflictingOptions {
                message: "both extract_table and table_range set; table_range takes precedence"
                    .to_string(),
            });
        }
        if override_.drop_regex.is_some() && !override_.drop_conditions.is_empty() {
            self.observer.on_event(&LoadEvent::ConflictingOptions {
                message: "both drop_regex and drop_conditions set; both will be applied"
                    .to_string(),
            });
        }
        if let Some(info) = structure {
            if info.header_confidence < LOW_CONFIDENCE_THRESHOLD {
                self.observer.on_event(&LoadEvent::LowHeaderConfidence {
                    confidence: info.header_confidence,
                });
            }
        }
    }

    /// Drive the multi-table loop: one assisted load per detected region.
    fn load_multi_table(
        &self,
        file: &Path,
        relpath: &str,
        sheet: &str,
        namespace: &str,
        override_: &SheetOverride,
        info: &StructureInfo,
        native: bool,
    ) -> LoadResult<Vec<TableMeta>> {
        // A manual rectangle beats detection outright.
        if override_.table_range.is_some() {
            let name = self.registry.register(namespace, relpath, sheet, 0);
            let meta =
                self.load_assisted(file, relpath, sheet, &name, namespace, override_, native)?;
            return Ok(vec![meta]);
        }

        let grid = reader::read_grid(file, sheet)
            .map_err(|e| LoadError::load_failure(file, sheet, None, LoadMode::Assisted, &e))?;

        if let Some(requested) = override_.extract_table {
            let index = if requested >= info.num_tables() {
                self.observer.on_event(&LoadEvent::RegionIndexClamped {
                    requested,
                    available: info.num_tables(),
                });
                0
            } else {
                requested
            };
            let suffix = region_suffix(index, info.num_tables());
            let name = self
                .registry
                .register(namespace, relpath, &format!("{sheet}{suffix}"), 0);
            let table = extract::extract_region(
                &grid,
                &info.regions[index],
                override_,
                native,
                self.observer.as_ref(),
            )
            .map_err(|e| {
                LoadError::load_failure(file, sheet, Some(index), LoadMode::Assisted, &e)
            })?;
            let meta =
                self.finish(name, file, relpath, sheet, namespace, LoadMode::Assisted, table)?;
            return Ok(vec![meta]);
        }

        let mut metas = Vec::new();
        for (index, region) in info.regions.iter().enumerate() {
            let suffix = region_suffix(index, info.num_tables());
            let name = self
                .registry
                .register(namespace, relpath, &format!("{sheet}{suffix}"), 0);
            match extract::extract_region(&grid, region, override_, native, self.observer.as_ref())
            {
                Ok(table) => {
                    let meta = self.finish(
                        name,
                        file,
                        relpath,
                        sheet,
                        namespace,
                        LoadMode::Assisted,
                        table,
                    )?;
                    metas.push(meta);
                }
                Err(err) => {
                    self.observer.on_event(&LoadEvent::RegionLoadFailed {
                        index,
                        error: err.to_string(),
                    });
                }
            }
        }

        if metas.is_empty() {
            self.observer.on_event(&LoadEvent::FallbackToRaw {
                file: file.to_path_buf(),
                sheet: sheet.to_string(),
            });
            let name = self.registry.register(namespace, relpath, sheet, 0);
            return Ok(vec![self.load_raw(file, relpath, sheet, &name, namespace)?]);
        }
        Ok(metas)
    }

    fn load_raw(
        &self,
        file: &Path,
        relpath: &str,
        sheet: &str,
        table_name: &str,
        namespace: &str,
    ) -> LoadResult<TableMeta> {
        let grid = reader::read_grid(file, sheet)
            .map_err(|e| LoadError::load_failure(file, sheet, None, LoadMode::Raw, &e))?;
        let table = extract::extract_raw(&grid);
        self.finish(
            table_name.to_string(),
            file,
            relpath,
            sheet,
            namespace,
            LoadMode::Raw,
            table,
        )
    }

    fn load_assisted(
        &self,
        file: &Path,
        relpath: &str,
        sheet: &str,
        table_name: &str,
        namespace: &str,
        override_: &SheetOverride,
        native: bool,
    ) -> LoadResult<TableMeta> {
        let result = reader::read_grid(file, sheet).and_then(|grid| {
            extract::extract_assisted(&grid, override_, native, self.observer.as_ref())
        });
        let table = result
            .map_err(|e| LoadError::load_failure(file, sheet, None, LoadMode::Assisted, &e))?;
        self.finish(
            table_name.to_string(),
            file,
            relpath,
            sheet,
            namespace,
            LoadMode::Assisted,
            table,
        )
    }

    /// Register a finished table and wrap it in metadata.
    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        table_name: String,
        file: &Path,
        relpath: &str,
        sheet: &str,
        namespace: &str,
        mode: LoadMode,
        table: Table,
    ) -> LoadResult<TableMeta> {
        let est_rows = table.row_count();
        let mtime = reader::modified_time(file)?;
        self.sink.register_table(&table_name, table);
        Ok(TableMeta {
            table_name,
            file: file.to_path_buf(),
            relpath: relpath.to_string(),
            sheet: sheet.to_string(),
            mode,
            mtime,
            namespace: namespace.to_string(),
            est_rows,
        })
    }
}

fn region_suffix(index: usize, num_tables: usize) -> String {
    if num_tables > 1 {
        format!("_table{index}")
    } else {
        String::new()
    }
}

fn compile_patterns(patterns: &[String]) -> LoadResult<Vec<Pattern>> {
    patterns.iter().map(|p| Ok(Pattern::new(p)?)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_suffix_only_when_multiple() {
        assert_eq!(region_suffix(0, 1), "");
        assert_eq!(region_suffix(0, 2), "_table0");
        assert_eq!(region_suffix(1, 2), "_table1");
    }

    #[test]
    fn load_config_deserializes_sparse_json() {
        let json = r#"{
            "include": ["**/*.csv"],
            "overrides": {
                "data/sales.csv": {
                    "sheet_overrides": {"Sheet1": {"skip_rows": 2}}
                }
            }
        }"#;
        let config: LoadConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.include, vec!["**/*.csv".to_string()]);
        let ov = &config.overrides["data/sales.csv"].sheet_overrides["Sheet1"];
        assert_eq!(ov.skip_rows, 2);
        assert_eq!(ov.header_rows, 1);
    }
}
