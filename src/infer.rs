//! Semantic type inference from column names.
//!
//! Name-only classification applied before value-based coercion, so that
//! ID-like columns stay text (leading zeros survive), amount-like columns
//! become decimal, and date-like columns become timestamps. Priority order is
//! date over identifier over amount; first match wins. Explicit user type
//! hints for the same column always take precedence downstream.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::RegexSet;

use crate::types::Table;

const DATE_PATTERNS: &[&str] = &[
    r"^.*date.*$",
    r"^.*time.*$",
    r"^.*timestamp.*$",
    r"^.*when.*$",
    r"^.*created.*$",
    r"^.*modified.*$",
    r"^.*due.*$",
    r"^.*start.*$",
    r"^.*end.*$",
    r"^.*period.*$",
    r"^.*year.*$",
    r"^.*month.*$",
];

const TEXT_ID_PATTERNS: &[&str] = &[
    r"^id$",
    r"^.*_id$",
    r"^.*id$",
    r"^.*number$",
    r"^.*code$",
    r"^.*ref$",
    r"^.*key$",
    r"^sku$",
    r"^.*sku$",
    r"^.*zip.*$",
    r"^.*postal.*$",
    r"^account.*code.*$",
    r"^.*batch.*$",
    r"^tracking.*$",
    r"^invoice.*number.*$",
    r"^order.*number.*$",
    r"^customer.*id.*$",
    r"^employee.*id.*$",
];

const NUMERIC_PATTERNS: &[&str] = &[
    r"^.*amount.*$",
    r"^.*price.*$",
    r"^.*cost.*$",
    r"^.*revenue.*$",
    r"^.*total.*$",
    r"^.*sum.*$",
    r"^.*value.*$",
    r"^.*balance.*$",
    r"^.*qty.*$",
    r"^.*quantity.*$",
    r"^.*count.*$",
    r"^.*sales.*$",
    r"^.*profit.*$",
    r"^.*expense.*$",
    r"^.*fee.*$",
    r"^.*charge.*$",
    r"^.*rate.*$",
    r"^.*percent.*$",
    r"^.*margin.*$",
];

fn pattern_sets() -> &'static (RegexSet, RegexSet, RegexSet) {
    static SETS: OnceLock<(RegexSet, RegexSet, RegexSet)> = OnceLock::new();
    SETS.get_or_init(|| {
        (
            RegexSet::new(DATE_PATTERNS).expect("hardcoded regexes"),
            RegexSet::new(TEXT_ID_PATTERNS).expect("hardcoded regexes"),
            RegexSet::new(NUMERIC_PATTERNS).expect("hardcoded regexes"),
        )
    })
}

/// Infer a SQL type name from a column name, or `None` when nothing matches.
///
/// Returns `"TIMESTAMP"` for date-like names, `"VARCHAR"` for identifier-like
/// names, `"DECIMAL"` for amount-like names.
pub fn infer_type_from_name(column: &str) -> Option<&'static str> {
    let (dates, ids, numbers) = pattern_sets();
    let lower = column.trim().to_lowercase();
    if dates.is_match(&lower) {
        Some("TIMESTAMP")
    } else if ids.is_match(&lower) {
        Some("VARCHAR")
    } else if numbers.is_match(&lower) {
        Some("DECIMAL")
    } else {
        None
    }
}

/// Generate type hints for every column of a table whose name matches a
/// semantic pattern.
pub fn generate_type_hints(table: &Table) -> HashMap<String, String> {
    table
        .schema
        .field_names()
        .filter_map(|name| infer_type_from_name(name).map(|t| (name.to_string(), t.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Field, Schema, Table};

    #[test]
    fn classifies_invoice_columns() {
        let table = Table::new(
            Schema::new(vec![
                Field::new("InvoiceAmount", DataType::Utf8),
                Field::new("OrderDate", DataType::Utf8),
                Field::new("CustomerID", DataType::Utf8),
            ]),
            Vec::new(),
        );
        let hints = generate_type_hints(&table);
        assert_eq!(hints.get("InvoiceAmount").map(String::as_str), Some("DECIMAL"));
        assert_eq!(hints.get("OrderDate").map(String::as_str), Some("TIMESTAMP"));
        assert_eq!(hints.get("CustomerID").map(String::as_str), Some("VARCHAR"));
    }

    #[test]
    fn date_patterns_outrank_id_and_amount() {
        // "start_price" matches both a date pattern (start) and an amount
        // pattern (price); the date pattern must win. Identifier patterns
        // outrank amount patterns the same way.
        assert_eq!(infer_type_from_name("start_price"), Some("TIMESTAMP"));
        assert_eq!(infer_type_from_name("product_code"), Some("VARCHAR"));
    }

    #[test]
    fn unmatched_names_get_no_hint() {
        assert_eq!(infer_type_from_name("Description"), None);
        assert_eq!(infer_type_from_name("Region"), None);
    }
}
