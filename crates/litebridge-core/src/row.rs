//! Result rows in engine storage form.

use crate::value::SqlValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Column metadata shared across all rows in a result set.
///
/// Wrapped in `Arc` so every row from one statement shares the same names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    names: Vec<String>,
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column names.
    ///
    /// When a name repeats, lookups by name resolve to its first occurrence.
    pub fn new(names: Vec<String>) -> Self {
        let mut name_to_index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            name_to_index.entry(name.clone()).or_insert(i);
        }
        Self {
            names,
            name_to_index,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get the name of a column by index.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single row returned from a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<SqlValue>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a row sharing the given column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<SqlValue>) -> Self {
        Self { values, columns }
    }

    /// Get the shared column metadata.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&SqlValue> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Consume the row, returning its values.
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_index() {
        let cols = Arc::new(ColumnInfo::new(vec!["id".into(), "name".into()]));
        let row = Row::with_columns(
            Arc::clone(&cols),
            vec![SqlValue::Integer(1), SqlValue::Text("Ann".into())],
        );

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&SqlValue::Integer(1)));
        assert_eq!(row.get_by_name("name"), Some(&SqlValue::Text("Ann".into())));
        assert_eq!(row.get_by_name("missing"), None);
        assert!(Arc::ptr_eq(&row.column_info(), &cols));
    }

    #[test]
    fn duplicate_names_resolve_to_first() {
        let cols = ColumnInfo::new(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(cols.index_of("a"), Some(0));
        assert_eq!(cols.name_at(2), Some("a"));
    }
}
