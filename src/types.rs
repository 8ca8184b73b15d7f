//! Core tabular data model.
//!
//! The override pipeline materializes each sheet (or sheet sub-region) into an
//! in-memory [`Table`]: an ordered [`Schema`] of typed [`Field`]s plus
//! row-major [`Value`] storage. The pipeline's transformation chain (filter,
//! rename, coerce, reshape) is expressed as methods on [`Table`].

use std::collections::HashMap;

use chrono::NaiveDateTime;

/// Logical data type for a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
    /// Date/time without timezone.
    Timestamp,
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Column data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of fields describing a table's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A single typed value in a [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Date/time without timezone.
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Whether this value is missing.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the inner string if this is a `Utf8` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view used by coercion stages; `Int64` widens to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// String rendering used for regex/equality row filters.
    ///
    /// `Null` renders as the empty string so that predicates on missing
    /// cells behave like predicates on blanks.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int64(v) => v.to_string(),
            Value::Float64(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    format!("{}", *v as i64)
                } else {
                    v.to_string()
                }
            }
            Value::Bool(b) => b.to_string(),
            Value::Utf8(s) => s.clone(),
            Value::Timestamp(ts) => ts.to_string(),
        }
    }
}

/// In-memory table: a [`Schema`] plus row-major [`Value`] storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage; every row has `schema.fields.len()` values.
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create a table from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Build an all-text table from column names and optional cell strings.
    ///
    /// `None` cells become [`Value::Null`]; every column gets
    /// [`DataType::Utf8`]. Short rows are padded with nulls, long rows
    /// truncated to the header width.
    pub fn from_text_rows(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let width = columns.len();
        let schema = Schema::new(
            columns
                .into_iter()
                .map(|name| Field::new(name, DataType::Utf8))
                .collect(),
        );
        let rows = rows
            .into_iter()
            .map(|row| {
                let mut out: Vec<Value> = row
                    .into_iter()
                    .take(width)
                    .map(|cell| match cell {
                        Some(s) => Value::Utf8(s),
                        None => Value::Null,
                    })
                    .collect();
                out.resize(width, Value::Null);
                out
            })
            .collect();
        Self { schema, rows }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.schema.fields.len()
    }

    /// Iterate the values of one column.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Replace one column's values and type in place.
    ///
    /// # Panics
    ///
    /// Panics if `values.len() != self.row_count()`.
    pub fn replace_column(&mut self, index: usize, data_type: DataType, values: Vec<Value>) {
        assert_eq!(
            values.len(),
            self.row_count(),
            "replacement column length {} does not match row count {}",
            values.len(),
            self.row_count()
        );
        self.schema.fields[index].data_type = data_type;
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[index] = value;
        }
    }

    /// Keep only rows whose mask entry is `true`, preserving order.
    ///
    /// # Panics
    ///
    /// Panics if `mask.len() != self.row_count()`.
    pub fn retain_rows(&mut self, mask: &[bool]) {
        assert_eq!(mask.len(), self.row_count(), "mask length mismatch");
        let mut keep = mask.iter();
        self.rows.retain(|_| *keep.next().unwrap());
    }

    /// Create a new table containing only rows that match `predicate`.
    pub fn filter_rows<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&[Value]) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|row| predicate(row.as_slice()))
            .cloned()
            .collect();
        Self {
            schema: self.schema.clone(),
            rows,
        }
    }

    /// Rename columns according to `renames` (keyed by old name).
    ///
    /// Unknown old names are ignored.
    pub fn rename_columns(&mut self, renames: &HashMap<String, String>) {
        for field in &mut self.schema.fields {
            if let Some(new_name) = renames.get(&field.name) {
                field.name = new_name.clone();
            }
        }
    }

    /// Drop the columns at the given indices (order-insensitive).
    pub fn drop_columns(&mut self, indices: &[usize]) {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for &idx in sorted.iter().rev() {
            self.schema.fields.remove(idx);
            for row in &mut self.rows {
                row.remove(idx);
            }
        }
    }

    /// Reshape wide value columns into long format.
    ///
    /// Each output row carries the `id_vars` values, the source column name
    /// under `var_name`, and the cell value under `value_name`. When
    /// `value_vars` is empty, every non-id column is melted. Unknown column
    /// names are skipped.
    pub fn unpivot(
        &self,
        id_vars: &[String],
        value_vars: &[String],
        var_name: &str,
        value_name: &str,
    ) -> Self {
        let id_idx: Vec<usize> = id_vars
            .iter()
            .filter_map(|name| self.schema.index_of(name))
            .collect();
        let value_idx: Vec<usize> = if value_vars.is_empty() {
            (0..self.column_count())
                .filter(|i| !id_idx.contains(i))
                .collect()
        } else {
            value_vars
                .iter()
                .filter_map(|name| self.schema.index_of(name))
                .collect()
        };

        let mut fields: Vec<Field> = id_idx
            .iter()
            .map(|&i| self.schema.fields[i].clone())
            .collect();
        fields.push(Field::new(var_name, DataType::Utf8));
        let value_type = common_type(value_idx.iter().map(|&i| self.schema.fields[i].data_type));
        fields.push(Field::new(value_name, value_type));

        let mut rows = Vec::with_capacity(self.row_count() * value_idx.len());
        for row in &self.rows {
            for &vi in &value_idx {
                let mut out: Vec<Value> = id_idx.iter().map(|&i| row[i].clone()).collect();
                out.push(Value::Utf8(self.schema.fields[vi].name.clone()));
                out.push(row[vi].clone());
                rows.push(out);
            }
        }

        Self {
            schema: Schema::new(fields),
            rows,
        }
    }
}

fn common_type(mut types: impl Iterator<Item = DataType>) -> DataType {
    let first = match types.next() {
        Some(t) => t,
        None => return DataType::Utf8,
    };
    if types.all(|t| t == first) {
        first
    } else {
        DataType::Utf8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        Table::new(
            Schema::new(vec![
                Field::new("region", DataType::Utf8),
                Field::new("q1", DataType::Float64),
                Field::new("q2", DataType::Float64),
            ]),
            vec![
                vec![
                    Value::Utf8("north".to_string()),
                    Value::Float64(1.0),
                    Value::Float64(2.0),
                ],
                vec![
                    Value::Utf8("south".to_string()),
                    Value::Float64(3.0),
                    Value::Float64(4.0),
                ],
            ],
        )
    }

    #[test]
    fn from_text_rows_pads_and_truncates() {
        let t = Table::from_text_rows(
            vec!["a".to_string(), "b".to_string()],
            vec![
                vec![Some("1".to_string())],
                vec![Some("2".to_string()), Some("3".to_string()), Some("4".to_string())],
            ],
        );
        assert_eq!(t.rows[0], vec![Value::Utf8("1".to_string()), Value::Null]);
        assert_eq!(
            t.rows[1],
            vec![Value::Utf8("2".to_string()), Value::Utf8("3".to_string())]
        );
    }

    #[test]
    fn retain_rows_preserves_order() {
        let mut t = sample_table();
        t.retain_rows(&[false, true]);
        assert_eq!(t.row_count(), 1);
        assert_eq!(t.rows[0][0], Value::Utf8("south".to_string()));
    }

    #[test]
    fn rename_ignores_unknown_columns() {
        let mut t = sample_table();
        let renames = HashMap::from([
            ("region".to_string(), "area".to_string()),
            ("missing".to_string(), "ghost".to_string()),
        ]);
        t.rename_columns(&renames);
        assert_eq!(t.schema.index_of("area"), Some(0));
        assert_eq!(t.schema.index_of("ghost"), None);
    }

    #[test]
    fn unpivot_defaults_to_all_non_id_columns() {
        let t = sample_table();
        let long = t.unpivot(&["region".to_string()], &[], "quarter", "sales");
        assert_eq!(long.column_count(), 3);
        assert_eq!(long.row_count(), 4);
        assert_eq!(long.rows[0][1], Value::Utf8("q1".to_string()));
        assert_eq!(long.rows[1][1], Value::Utf8("q2".to_string()));
        assert_eq!(long.rows[1][2], Value::Float64(2.0));
        assert_eq!(long.schema.fields[2].data_type, DataType::Float64);
    }

    #[test]
    fn render_of_whole_floats_drops_fraction() {
        assert_eq!(Value::Float64(100.0).render(), "100");
        assert_eq!(Value::Float64(1.5).render(), "1.5");
        assert_eq!(Value::Null.render(), "");
    }
}
