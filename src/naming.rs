//! Deterministic, collision-resistant table naming.
//!
//! Names are dotted lowercase `[a-z0-9_$]` identifiers built from
//! namespace + path segments (extension stripped, separators become dots) +
//! sheet + optional region suffix, truncated to 63 characters. Registering
//! the same inputs again yields a `_2`, `_3`, ... suffixed name.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock};

use regex::Regex;

/// Maximum length of an issued table name.
const MAX_NAME_LEN: usize = 63;

#[derive(Debug, Default)]
struct RegistryState {
    issued: HashSet<String>,
    collision_counts: HashMap<String, usize>,
}

/// Shared registry of issued table names.
///
/// All mutation happens under one mutex; the registry is meant to be owned
/// by the server context and shared by handle, never as an ambient global.
#[derive(Debug, Default)]
pub struct TableRegistry {
    state: Mutex<RegistryState>,
}

impl TableRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build, deduplicate, and record a table name.
    ///
    /// `region_id` greater than zero appends an `r{id}` path component,
    /// used when one sheet yields several sub-tables.
    pub fn register(&self, namespace: &str, relpath: &str, sheet: &str, region_id: usize) -> String {
        let mut state = self.state.lock().expect("registry poisoned");
        let base = build_name(namespace, relpath, sheet, region_id);
        let name = resolve_collision(&mut state, base);
        state.issued.insert(name.clone());
        name
    }

    /// Number of names issued so far.
    pub fn len(&self) -> usize {
        self.state.lock().expect("registry poisoned").issued.len()
    }

    /// Whether no names have been issued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every issued name and collision counter.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("registry poisoned");
        state.issued.clear();
        state.collision_counts.clear();
    }
}

fn resolve_collision(state: &mut RegistryState, base: String) -> String {
    if !state.issued.contains(&base) {
        return base;
    }
    let counter = state.collision_counts.entry(base.clone()).or_insert(0);
    *counter += 1;
    let mut suffix = *counter + 1;
    loop {
        let candidate = format!("{base}_{suffix}");
        if !state.issued.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

fn build_name(namespace: &str, relpath: &str, sheet: &str, region_id: usize) -> String {
    let stem = match relpath.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => relpath,
    };
    let path_components = stem.replace('\\', "/");

    let mut parts: Vec<String> = Vec::new();
    parts.push(namespace.to_string());
    parts.extend(path_components.split('/').map(str::to_string));
    parts.push(sheet.to_string());
    if region_id > 0 {
        parts.push(format!("r{region_id}"));
    }

    let mut sanitized: Vec<String> = parts
        .iter()
        .map(|p| sanitize_component(p))
        .filter(|p| !p.is_empty())
        .collect();

    if sanitized.is_empty() {
        return "table".to_string();
    }
    if sanitized.len() == 1 {
        sanitized.push("table".to_string());
    }

    let mut name = sanitized.join(".");

    let digit_leading = sanitized
        .iter()
        .any(|p| p.chars().next().is_some_and(|c| c.is_ascii_digit()));
    if digit_leading {
        name = format!("t_{name}");
    }

    if name.len() > MAX_NAME_LEN {
        name.truncate(MAX_NAME_LEN);
    }
    name
}

fn sanitize_component(component: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    static UNDERSCORE_RUNS: OnceLock<Regex> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| Regex::new(r"[^a-z0-9_$]").expect("hardcoded regex"));
    let underscore_runs =
        UNDERSCORE_RUNS.get_or_init(|| Regex::new(r"_+").expect("hardcoded regex"));

    let lowered = component.to_lowercase().replace(' ', "_");
    let stripped = invalid.replace_all(&lowered, "");
    let collapsed = underscore_runs.replace_all(&stripped, "_");
    collapsed.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_dotted_lowercase_names() {
        let registry = TableRegistry::new();
        let name = registry.register("excel", "cnc/Job Orders.xlsx", "Orders", 0);
        assert_eq!(name, "excel.cnc.job_orders.orders");
    }

    #[test]
    fn region_suffix_is_appended() {
        let registry = TableRegistry::new();
        let name = registry.register("excel", "data.xlsx", "Sheet1", 2);
        assert_eq!(name, "excel.data.sheet1.r2");
    }

    #[test]
    fn duplicate_registrations_get_numeric_suffixes() {
        let registry = TableRegistry::new();
        let first = registry.register("ns", "sales.csv", "Sheet1", 0);
        let second = registry.register("ns", "sales.csv", "Sheet1", 0);
        let third = registry.register("ns", "sales.csv", "Sheet1", 0);
        assert_eq!(second, format!("{first}_2"));
        assert_eq!(third, format!("{first}_3"));
    }

    #[test]
    fn digit_leading_components_get_a_prefix() {
        let registry = TableRegistry::new();
        let name = registry.register("excel", "2024/report.xlsx", "Q1", 0);
        assert!(name.starts_with("t_"));
        assert!(name.contains("2024"));
    }

    #[test]
    fn long_names_are_truncated() {
        let registry = TableRegistry::new();
        let long = "a".repeat(80);
        let name = registry.register("ns", &format!("{long}.csv"), "Sheet1", 0);
        assert_eq!(name.len(), 63);
    }

    #[test]
    fn clear_resets_collision_state() {
        let registry = TableRegistry::new();
        let first = registry.register("ns", "a.csv", "s", 0);
        registry.register("ns", "a.csv", "s", 0);
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.register("ns", "a.csv", "s", 0), first);
    }
}
