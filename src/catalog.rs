//! Registration boundary toward the query engine.
//!
//! The loader only ever hands finished tables to a [`TableSink`]; what the
//! sink does with them (register a view in an analytic engine, serialize,
//! collect for tests) is its business. [`MemoryCatalog`] is the in-process
//! implementation backing introspection queries by name.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{Schema, Table};

/// Receives finished tables under their registered names.
pub trait TableSink: Send + Sync {
    /// Register one table. An existing table under the same name is
    /// replaced; the naming registry makes accidental reuse impossible.
    fn register_table(&self, name: &str, table: Table);
}

/// In-memory table catalog keyed by registered name.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: Mutex<HashMap<String, Table>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a table by registered name.
    pub fn get(&self, name: &str) -> Option<Table> {
        self.tables.lock().expect("catalog poisoned").get(name).cloned()
    }

    /// Names of all registered tables, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .lock()
            .expect("catalog poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Row count of a registered table.
    pub fn row_count(&self, name: &str) -> Option<usize> {
        self.tables
            .lock()
            .expect("catalog poisoned")
            .get(name)
            .map(Table::row_count)
    }

    /// Schema of a registered table.
    pub fn schema(&self, name: &str) -> Option<Schema> {
        self.tables
            .lock()
            .expect("catalog poisoned")
            .get(name)
            .map(|t| t.schema.clone())
    }

    /// Drop every registered table.
    pub fn clear(&self) {
        self.tables.lock().expect("catalog poisoned").clear();
    }
}

impl TableSink for MemoryCatalog {
    fn register_table(&self, name: &str, table: Table) {
        self.tables
            .lock()
            .expect("catalog poisoned")
            .insert(name.to_string(), table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Field, Value};

    #[test]
    fn registered_tables_are_introspectable() {
        let catalog = MemoryCatalog::new();
        let table = Table::new(
            Schema::new(vec![Field::new("x", DataType::Int64)]),
            vec![vec![Value::Int64(1)], vec![Value::Int64(2)]],
        );
        catalog.register_table("ns.data.sheet1", table);

        assert_eq!(catalog.names(), vec!["ns.data.sheet1".to_string()]);
        assert_eq!(catalog.row_count("ns.data.sheet1"), Some(2));
        assert_eq!(
            catalog.schema("ns.data.sheet1").unwrap().fields[0].name,
            "x"
        );
        assert!(catalog.get("missing").is_none());

        catalog.clear();
        assert!(catalog.names().is_empty());
    }
}
