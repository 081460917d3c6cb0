use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single row: column name to value. A missing key reads as null.
pub type Row = Map<String, Value>;

/// A materialized table flowing between pipeline stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Column names in declaration order
    pub columns: Vec<String>,
    /// Row data
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from row objects, collecting columns in first-seen order
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    /// Serialize typed records into a table.
    ///
    /// Records must serialize as JSON objects; anything else is rejected.
    pub fn from_records<T: Serialize>(records: &[T]) -> anyhow::Result<Self> {
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::to_value(record)? {
                Value::Object(map) => rows.push(map),
                other => anyhow::bail!("record serialized to non-object value: {}", other),
            }
        }
        Ok(Self::from_rows(rows))
    }

    /// Deserialize every row into a typed record
    pub fn to_records<T: DeserializeOwned>(&self) -> anyhow::Result<Vec<T>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                serde_json::from_value(Value::Object(row.clone()))
                    .map_err(|e| anyhow::anyhow!("row {} does not match record shape: {}", index, e))
            })
            .collect()
    }

    /// Append a row, registering any columns not seen before
    pub fn push_row(&mut self, row: Row) {
        for key in row.keys() {
            if !self.columns.iter().any(|c| c == key) {
                self.columns.push(key.clone());
            }
        }
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Count rows holding null (or no value) in the given column
    pub fn null_count(&self, column: &str) -> usize {
        self.rows
            .iter()
            .filter(|row| matches!(row.get(column), None | Some(Value::Null)))
            .count()
    }

    /// First `n` rows, used for diagnostics
    pub fn head(&self, n: usize) -> &[Row] {
        &self.rows[..self.rows.len().min(n)]
    }
}

/// Read a cell as text, rendering numbers and booleans in their display form
pub fn cell_text(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        id: String,
        count: Option<i64>,
    }

    #[test]
    fn test_from_rows_collects_columns_in_order() {
        let rows = vec![
            json!({"a": 1, "b": 2}).as_object().cloned().unwrap_or_default(),
            json!({"b": 3, "c": null}).as_object().cloned().unwrap_or_default(),
        ];
        let table = Table::from_rows(rows);
        assert_eq!(table.columns, vec!["a", "b", "c"]);
        assert_eq!(table.null_count("c"), 2);
        assert_eq!(table.null_count("a"), 1);
    }

    #[test]
    fn test_typed_records_survive_table_conversion() {
        let records = vec![
            Sample { id: "x".to_string(), count: Some(3) },
            Sample { id: "y".to_string(), count: None },
        ];
        let table = Table::from_records(&records).unwrap();
        assert_eq!(table.len(), 2);
        let back: Vec<Sample> = table.to_records().unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn test_cell_text_reads_numbers() {
        let row = json!({"code": 100000000, "name": "Region I", "empty": null});
        let row = row.as_object().cloned().unwrap_or_default();
        assert_eq!(cell_text(&row, "code"), Some("100000000".to_string()));
        assert_eq!(cell_text(&row, "name"), Some("Region I".to_string()));
        assert_eq!(cell_text(&row, "empty"), None);
        assert_eq!(cell_text(&row, "missing"), None);
    }
}
