//! Declarative table contracts checked before a stage's output is accepted.
//!
//! A contract names the columns a table must carry and which of them may hold
//! nulls. Extra, undeclared columns are allowed and ignored.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::*;
use crate::pipeline::table::{Row, Table};
use serde_json::Value;

/// Logical column type, informational for downstream loaders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl ColumnDef {
    /// A nullable column
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: true,
        }
    }

    /// A column that must never hold nulls
    pub fn required(name: &str, column_type: ColumnType) -> Self {
        Self {
            nullable: false,
            ..Self::new(name, column_type)
        }
    }
}

/// Shape of a logical table produced by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn new(name: &str, primary_key: &[&str], columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.to_string(),
            columns,
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Return human-readable violations (empty if the table conforms).
    ///
    /// Missing columns are reported together first, then one entry per
    /// non-nullable column that holds nulls.
    pub fn validate(&self, table: &Table) -> Vec<String> {
        let mut violations = Vec::new();

        let mut missing: Vec<&str> = self
            .columns
            .iter()
            .filter(|col| !table.has_column(&col.name))
            .map(|col| col.name.as_str())
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            violations.push(format!("[{}] missing columns: {}", self.name, missing.join(", ")));
        }

        for col in &self.columns {
            if col.nullable || !table.has_column(&col.name) {
                continue;
            }
            let nulls = table.null_count(&col.name);
            if nulls > 0 {
                violations.push(format!(
                    "[{}] column '{}' contains nulls ({} rows)",
                    self.name, col.name, nulls
                ));
            }
        }

        violations
    }

    /// Up to `limit` rows holding a null in a present, non-nullable column
    pub fn offending_rows<'a>(&self, table: &'a Table, limit: usize) -> Vec<&'a Row> {
        let required: Vec<&str> = self
            .columns
            .iter()
            .filter(|col| !col.nullable && table.has_column(&col.name))
            .map(|col| col.name.as_str())
            .collect();
        table
            .rows
            .iter()
            .filter(|row| {
                required
                    .iter()
                    .any(|col| matches!(row.get(*col), None | Some(Value::Null)))
            })
            .take(limit)
            .collect()
    }
}

static BUILTIN: Lazy<HashMap<String, TableSchema>> = Lazy::new(|| {
    builtin_schemas()
        .into_iter()
        .map(|schema| (schema.name.clone(), schema))
        .collect()
});

/// Look up the declared contract for a table name
pub fn schema_for(table_name: &str) -> Option<&'static TableSchema> {
    BUILTIN.get(table_name)
}

fn code_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("psgc_region_id", ColumnType::Text),
        ColumnDef::new("psgc_provhuc_id", ColumnType::Text),
        ColumnDef::new("psgc_muni_id", ColumnType::Text),
        ColumnDef::new("psgc_brgy_id", ColumnType::Text),
    ]
}

fn location_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::required("record_id", ColumnType::Text),
        ColumnDef::new("region", ColumnType::Text),
        ColumnDef::new("province", ColumnType::Text),
        ColumnDef::new("municipality", ColumnType::Text),
        ColumnDef::new("barangay", ColumnType::Text),
    ]
}

/// Contracts for every table the standard stages emit
pub fn builtin_schemas() -> Vec<TableSchema> {
    let mut region = location_columns();
    region.push(ColumnDef::required("psgc_region_id", ColumnType::Text));

    let mut provhuc = region.clone();
    provhuc.push(ColumnDef::new("psgc_provhuc_id", ColumnType::Text));

    let mut muni = provhuc.clone();
    muni.push(ColumnDef::new("psgc_muni_id", ColumnType::Text));

    let mut brgy = muni.clone();
    brgy.push(ColumnDef::new("psgc_brgy_id", ColumnType::Text));

    let mut meta = location_columns();
    meta.extend(code_columns());

    let mut address = vec![
        ColumnDef::required("address_id", ColumnType::Integer),
        ColumnDef::required("address_hash", ColumnType::Integer),
    ];
    address.extend(code_columns());

    let mut with_hash = vec![
        ColumnDef::required("record_id", ColumnType::Text),
        ColumnDef::required("address_hash", ColumnType::Integer),
        ColumnDef::required("address_id", ColumnType::Integer),
    ];
    with_hash.extend(code_columns());

    let mut geo = vec![
        ColumnDef::required("record_id", ColumnType::Text),
        ColumnDef::required("address_hash", ColumnType::Integer),
        ColumnDef::new("address_id", ColumnType::Integer),
        ColumnDef::new("longitude", ColumnType::Float),
        ColumnDef::new("latitude", ColumnType::Float),
    ];
    geo.extend(code_columns());

    vec![
        TableSchema::new(
            TABLE_PSGC,
            &["code"],
            vec![
                ColumnDef::required("code", ColumnType::Text),
                ColumnDef::new("name", ColumnType::Text),
                ColumnDef::required("level", ColumnType::Text),
                ColumnDef::new("class_flags", ColumnType::Text),
                ColumnDef::new("correspondence_code", ColumnType::Text),
            ],
        ),
        TableSchema::new(TABLE_LOCATIONS, &["record_id"], location_columns()),
        TableSchema::new(TABLE_LOCATIONS_REGION, &["record_id"], region),
        TableSchema::new(TABLE_LOCATIONS_PROVHUC, &["record_id"], provhuc),
        TableSchema::new(TABLE_LOCATIONS_MUNI, &["record_id"], muni),
        TableSchema::new(TABLE_LOCATIONS_BRGY, &["record_id"], brgy),
        TableSchema::new(TABLE_META_PSGC, &["record_id"], meta),
        TableSchema::new(TABLE_ADDRESS, &["address_id"], address),
        TableSchema::new(TABLE_META_WITH_HASH, &["record_id"], with_hash),
        TableSchema::new(
            TABLE_DIVISIONS,
            &["division_id"],
            vec![
                ColumnDef::required("psgc_region_id", ColumnType::Text),
                ColumnDef::required("division", ColumnType::Text),
                ColumnDef::required("division_seq", ColumnType::Integer),
                ColumnDef::required("division_id", ColumnType::Text),
            ],
        ),
        TableSchema::new(
            TABLE_ENROLLMENT,
            &["school_year", "school_id", "grade", "sex", "strand"],
            vec![
                ColumnDef::required("school_year", ColumnType::Text),
                ColumnDef::required("school_id", ColumnType::Text),
                ColumnDef::new("grade", ColumnType::Text),
                ColumnDef::new("strand", ColumnType::Text),
                ColumnDef::new("sex", ColumnType::Text),
                ColumnDef::required("num_students", ColumnType::Integer),
            ],
        ),
        TableSchema::new(
            TABLE_SCHOOL_LEVELS,
            &["school_id", "school_year", "level"],
            vec![
                ColumnDef::required("school_id", ColumnType::Text),
                ColumnDef::required("school_year", ColumnType::Text),
                ColumnDef::required("level", ColumnType::Text),
                ColumnDef::new("offered", ColumnType::Boolean),
            ],
        ),
        TableSchema::new(TABLE_GEO, &["record_id"], geo),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> crate::pipeline::table::Row {
        value.as_object().cloned().unwrap_or_default()
    }

    fn sample_schema() -> TableSchema {
        TableSchema::new(
            "sample",
            &["id"],
            vec![
                ColumnDef::required("id", ColumnType::Text),
                ColumnDef::new("note", ColumnType::Text),
            ],
        )
    }

    #[test]
    fn test_conformant_table_has_no_violations() {
        let table = Table::from_rows(vec![
            row(json!({"id": "1", "note": null, "extra": 5})),
            row(json!({"id": "2", "note": "x"})),
        ]);
        assert!(sample_schema().validate(&table).is_empty());
    }

    #[test]
    fn test_missing_columns_reported_together() {
        let schema = TableSchema::new(
            "sample",
            &[],
            vec![
                ColumnDef::required("b", ColumnType::Text),
                ColumnDef::required("a", ColumnType::Text),
            ],
        );
        let table = Table::from_rows(vec![row(json!({"c": 1}))]);
        let violations = schema.validate(&table);
        assert_eq!(violations, vec!["[sample] missing columns: a, b".to_string()]);
    }

    #[test]
    fn test_nulls_in_required_column_are_reported() {
        let table = Table::from_rows(vec![
            row(json!({"id": "1"})),
            row(json!({"id": null, "note": "x"})),
        ]);
        let violations = sample_schema().validate(&table);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("'id'"));
    }

    #[test]
    fn test_offending_rows_skip_valid_ones() {
        let mut rows: Vec<_> = (0..5).map(|i| row(json!({"id": i.to_string(), "note": "ok"}))).collect();
        rows.push(row(json!({"id": null, "note": "BAD"})));
        rows.push(row(json!({"note": "ALSO BAD"})));
        let table = Table::from_rows(rows);

        let offending = sample_schema().offending_rows(&table, 3);
        assert_eq!(offending.len(), 2);
        assert_eq!(offending[0]["note"], json!("BAD"));
        assert_eq!(offending[1]["note"], json!("ALSO BAD"));
        assert_eq!(sample_schema().offending_rows(&table, 1).len(), 1);
    }

    #[test]
    fn test_nulls_in_nullable_column_are_fine() {
        let table = Table::from_rows(vec![row(json!({"id": "1", "note": null}))]);
        assert!(sample_schema().validate(&table).is_empty());
    }

    #[test]
    fn test_builtin_schemas_cover_standard_tables() {
        for name in [TABLE_PSGC, TABLE_META_PSGC, TABLE_ADDRESS, TABLE_META_WITH_HASH] {
            assert!(schema_for(name).is_some(), "missing schema for {}", name);
        }
        assert!(schema_for("not_a_table").is_none());
    }
}
