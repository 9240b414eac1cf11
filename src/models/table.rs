//! Tabular view of captured events
//!
//! Each collected record becomes one row; the column set is the union of the
//! keys seen across all records, in first-seen order.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use super::event::Record;

/// Read-only table built from collected records
///
/// A `None` cell means the row's record did not carry that key. A record that
/// carried an explicit JSON null has `Some(Value::Null)` instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<Value>>>,
}

/// Build a table from an ordered sequence of records
pub fn materialize(records: &[Record]) -> Table {
    if records.is_empty() {
        return Table::default();
    }

    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for record in records {
        for key in record.keys() {
            if !index.contains_key(key.as_str()) {
                index.insert(key.as_str(), columns.len());
                columns.push(key.clone());
            }
        }
    }

    let rows = records
        .iter()
        .map(|record| {
            let mut row = vec![None; columns.len()];
            for (key, value) in record {
                row[index[key.as_str()]] = Some(value.clone());
            }
            row
        })
        .collect();

    Table { columns, rows }
}

impl Table {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<Value>>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<Option<&Value>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].as_ref()).collect())
    }

    /// Single cell lookup; `None` for unknown rows/columns and missing cells
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }

    /// Rows as JSON objects over the full column set, missing cells as null
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| (column.clone(), cell.clone().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test records must be objects"),
        }
    }

    #[test]
    fn test_empty_input() {
        let table = materialize(&[]);
        assert!(table.is_empty());
        assert!(table.columns().is_empty());
        assert_eq!(table, Table::default());
    }

    #[test]
    fn test_heterogeneous_records() {
        let records = vec![record(json!({"a": 1, "b": 2})), record(json!({"a": 3, "c": 4}))];
        let table = materialize(&records);

        assert_eq!(table.columns(), &["a", "b", "c"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0], vec![Some(json!(1)), Some(json!(2)), None]);
        assert_eq!(table.rows()[1], vec![Some(json!(3)), None, Some(json!(4))]);
        assert_eq!(table.get(1, "b"), None);
        assert_eq!(table.get(1, "c"), Some(&json!(4)));
    }

    #[test]
    fn test_first_seen_column_order() {
        let records = vec![
            record(json!({"z": 1})),
            record(json!({"y": 2, "z": 3})),
            record(json!({"x": 4, "y": 5})),
        ];
        let table = materialize(&records);
        assert_eq!(table.columns(), &["z", "y", "x"]);
    }

    #[test]
    fn test_explicit_null_distinct_from_missing() {
        let records = vec![record(json!({"a": null})), record(json!({"b": true}))];
        let table = materialize(&records);

        assert_eq!(table.rows()[0][0], Some(Value::Null));
        assert_eq!(table.rows()[1][0], None);
    }

    #[test]
    fn test_nested_values_kept() {
        let records = vec![record(json!({"meta": {"region": "eu"}, "tags": ["x", "y"]}))];
        let table = materialize(&records);
        assert_eq!(table.get(0, "meta"), Some(&json!({"region": "eu"})));
        assert_eq!(table.get(0, "tags"), Some(&json!(["x", "y"])));
    }

    #[test]
    fn test_column_and_records() {
        let records = vec![record(json!({"a": 1, "b": 2})), record(json!({"a": 3, "c": 4}))];
        let table = materialize(&records);

        assert_eq!(table.column("a"), Some(vec![Some(&json!(1)), Some(&json!(3))]));
        assert_eq!(table.column("missing"), None);

        let out = table.records();
        assert_eq!(Value::Object(out[1].clone()), json!({"a": 3, "b": null, "c": 4}));
    }

    #[test]
    fn test_pure() {
        let records = vec![record(json!({"a": 1})), record(json!({"b": 2}))];
        assert_eq!(materialize(&records), materialize(&records));
    }

    #[test]
    fn test_serializes_missing_as_null() {
        let records = vec![record(json!({"a": 1})), record(json!({"b": 2}))];
        let json = serde_json::to_value(materialize(&records)).unwrap();
        assert_eq!(
            json,
            json!({"columns": ["a", "b"], "rows": [[1, null], [null, 2]]})
        );
    }
}
