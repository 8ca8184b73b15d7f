//! Declarative per-sheet load configuration.
//!
//! A [`SheetOverride`] is the manual escape hatch for sheets the structure
//! detector gets wrong: skip counts, header depth, explicit ranges, row
//! filters, renames, type hints, and reshaping. All fields are optional with
//! documented defaults, so configs stay terse and deserialize straight from
//! JSON.
//!
//! [`SheetOverride::merge_with_detection`] folds analyzer suggestions into an
//! override field by field; explicit settings always win over suggestions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::analyze::StructureInfo;
use crate::normalize::NumberLocale;

/// How merged cells are expanded during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Propagate the anchor value into every cell of the merged range.
    #[default]
    Fill,
    /// Keep only the anchor value; the rest of the range stays empty.
    Skip,
}

/// Merged-cell handling for data and header rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergeHandling {
    #[serde(default)]
    pub strategy: MergeStrategy,
    #[serde(default)]
    pub header_strategy: MergeStrategy,
}

/// Explicit locale configuration for numeric parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleOverride {
    /// Locale tag, informational only.
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub decimal_separator: Option<char>,
    #[serde(default)]
    pub thousands_separator: Option<char>,
    /// When true (the default), separators are still auto-detected and the
    /// explicit values are ignored.
    #[serde(default = "default_true")]
    pub auto_detect: bool,
}

impl LocaleOverride {
    /// Effective separator pair, or `None` when detection should run.
    pub fn number_locale(&self) -> Option<NumberLocale> {
        if self.auto_detect {
            return None;
        }
        Some(NumberLocale {
            decimal_separator: self.decimal_separator.unwrap_or('.'),
            thousands_separator: self.thousands_separator.unwrap_or(','),
        })
    }
}

/// One row-filter predicate. Exactly one of `regex`, `equals`, `is_null`
/// should be set; when several are, the first in that order applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCondition {
    pub column: String,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub equals: Option<String>,
    #[serde(default)]
    pub is_null: Option<bool>,
}

/// Wide-to-long reshaping configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpivotSpec {
    #[serde(default)]
    pub id_vars: Vec<String>,
    /// Columns to melt; empty means every non-id column.
    #[serde(default)]
    pub value_vars: Vec<String>,
    #[serde(default = "default_var_name")]
    pub var_name: String,
    #[serde(default = "default_value_name")]
    pub value_name: String,
}

/// Per-sheet load overrides. Every field optional; the default value loads
/// a conventional one-header-row table with no transformations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetOverride {
    /// Leading rows to drop before header handling. Zero means "unset" for
    /// the purpose of detection merging.
    pub skip_rows: usize,
    /// Header depth; 0 loads headerless, >1 joins header text per column
    /// with a double underscore.
    pub header_rows: usize,
    /// Trailing rows to drop.
    pub skip_footer: usize,
    /// Explicit A1 cell range to load.
    pub range: Option<String>,
    /// Rows whose first-column text matches this anchored regex are dropped.
    pub drop_regex: Option<String>,
    pub column_renames: HashMap<String, String>,
    /// Explicit column type hints (SQL type names); these always beat
    /// name-based inference.
    pub type_hints: HashMap<String, String>,
    pub unpivot: Option<UnpivotSpec>,
    /// Run structure analysis and merge its suggestions in.
    pub auto_detect: bool,
    pub merge_handling: Option<MergeHandling>,
    /// Load hidden rows/columns instead of filtering them.
    pub include_hidden: bool,
    pub locale: Option<LocaleOverride>,
    pub drop_conditions: Vec<DropCondition>,
    /// Index of the one detected sub-table to load.
    pub extract_table: Option<usize>,
    /// Explicit sub-table rectangle; wins over `extract_table` when both
    /// are set.
    pub table_range: Option<String>,
}

impl Default for SheetOverride {
    fn default() -> Self {
        Self {
            skip_rows: 0,
            header_rows: 1,
            skip_footer: 0,
            range: None,
            drop_regex: None,
            column_renames: HashMap::new(),
            type_hints: HashMap::new(),
            unpivot: None,
            auto_detect: false,
            merge_handling: None,
            include_hidden: false,
            locale: None,
            drop_conditions: Vec::new(),
            extract_table: None,
            table_range: None,
        }
    }
}

impl SheetOverride {
    /// Fold analyzer suggestions into this override, field by field.
    ///
    /// Explicit values always win; a zero skip count is the "unset" sentinel
    /// for the two skip fields. Merge handling defaults on when the sheet
    /// has merged ranges and nothing was configured.
    pub fn merge_with_detection(&self, info: &StructureInfo) -> SheetOverride {
        let mut merged = self.clone();
        if merged.skip_rows == 0 {
            merged.skip_rows = info.suggested_skip_rows;
        }
        if merged.skip_footer == 0 {
            merged.skip_footer = info.suggested_skip_footer;
        }
        if merged.merge_handling.is_none() && !info.merged_ranges.is_empty() {
            merged.merge_handling = Some(MergeHandling::default());
        }
        merged
    }

    /// Effective locale for numeric parsing, when explicitly configured.
    pub fn number_locale(&self) -> Option<NumberLocale> {
        self.locale.as_ref().and_then(LocaleOverride::number_locale)
    }
}

/// Per-file override block as it appears in load configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOverride {
    /// Overrides keyed by sheet name.
    pub sheet_overrides: HashMap<String, SheetOverride>,
}

fn default_true() -> bool {
    true
}

fn default_var_name() -> String {
    "variable".to_string()
}

fn default_value_name() -> String {
    "value".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{LocaleInfo, StructureInfo};
    use crate::grid::MergedRange;

    fn info_with(skip: usize, merged: bool) -> StructureInfo {
        let mut info = StructureInfo::conservative_default();
        info.suggested_skip_rows = skip;
        if merged {
            info.merged_ranges.push(MergedRange {
                min_row: 0,
                min_col: 0,
                max_row: 1,
                max_col: 0,
            });
        }
        info.locale = LocaleInfo::en_us();
        info
    }

    #[test]
    fn detection_fills_only_unset_fields() {
        let explicit = SheetOverride {
            skip_rows: 5,
            ..SheetOverride::default()
        };
        let merged = explicit.merge_with_detection(&info_with(2, false));
        assert_eq!(merged.skip_rows, 5);

        let unset = SheetOverride::default();
        let merged = unset.merge_with_detection(&info_with(2, false));
        assert_eq!(merged.skip_rows, 2);
    }

    #[test]
    fn merged_ranges_enable_default_merge_handling() {
        let merged = SheetOverride::default().merge_with_detection(&info_with(0, true));
        assert_eq!(merged.merge_handling, Some(MergeHandling::default()));

        let explicit = SheetOverride {
            merge_handling: Some(MergeHandling {
                strategy: MergeStrategy::Skip,
                header_strategy: MergeStrategy::Skip,
            }),
            ..SheetOverride::default()
        };
        let merged = explicit.merge_with_detection(&info_with(0, true));
        assert_eq!(merged.merge_handling.unwrap().strategy, MergeStrategy::Skip);
    }

    #[test]
    fn deserializes_from_sparse_json() {
        let json = r#"{
            "auto_detect": true,
            "drop_conditions": [{"column": "Status", "equals": "DELETED"}],
            "unpivot": {"id_vars": ["region"]}
        }"#;
        let ov: SheetOverride = serde_json::from_str(json).unwrap();
        assert!(ov.auto_detect);
        assert_eq!(ov.header_rows, 1);
        assert_eq!(ov.drop_conditions[0].equals.as_deref(), Some("DELETED"));
        let unpivot = ov.unpivot.unwrap();
        assert_eq!(unpivot.var_name, "variable");
        assert_eq!(unpivot.value_name, "value");
    }

    #[test]
    fn locale_override_respects_auto_detect_flag() {
        let auto = LocaleOverride {
            locale: None,
            decimal_separator: Some(','),
            thousands_separator: Some('.'),
            auto_detect: true,
        };
        assert!(auto.number_locale().is_none());

        let explicit = LocaleOverride {
            auto_detect: false,
            ..auto
        };
        let locale = explicit.number_locale().unwrap();
        assert_eq!(locale.decimal_separator, ',');
        assert_eq!(locale.thousands_separator, '.');
    }
}
