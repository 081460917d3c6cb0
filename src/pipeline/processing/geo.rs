//! Joins school coordinates onto the address-keyed records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use crate::pipeline::processing::address::{AddressRow, HashedRecord};
use crate::pipeline::table::{cell_text, Row, Table};

/// Id columns accepted in the coordinate source, in lookup order
const ID_COLUMNS: [&str; 2] = ["id", "school_id"];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Coordinates {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

/// One record with its coordinates and address dimension codes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRow {
    pub record_id: String,
    pub address_hash: i64,
    pub address_id: Option<i64>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub psgc_region_id: Option<String>,
    pub psgc_provhuc_id: Option<String>,
    pub psgc_muni_id: Option<String>,
    pub psgc_brgy_id: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GeoStats {
    /// Records that found a coordinate row
    pub located: usize,
    /// Records with no coordinate row
    pub unlocated: usize,
    /// Source rows with no usable id
    pub rows_without_id: usize,
    /// Source rows repeating an id already seen
    pub duplicate_ids: usize,
    /// Coordinate cells present but not a finite number
    pub invalid_values: usize,
}

/// Index the coordinate source by school id. The first row for an id wins.
pub fn coordinate_index(source: &Table, stats: &mut GeoStats) -> HashMap<String, Coordinates> {
    let mut index = HashMap::new();
    for row in &source.rows {
        let Some(id) = ID_COLUMNS
            .iter()
            .find_map(|col| cell_text(row, col))
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
        else {
            stats.rows_without_id += 1;
            continue;
        };
        if index.contains_key(&id) {
            stats.duplicate_ids += 1;
            continue;
        }
        let coordinates = Coordinates {
            longitude: coordinate(row, "longitude", stats),
            latitude: coordinate(row, "latitude", stats),
        };
        index.insert(id, coordinates);
    }
    if stats.duplicate_ids > 0 {
        warn!("⚠️ {} coordinate rows repeat an id and were ignored", stats.duplicate_ids);
    }
    index
}

fn coordinate(row: &Row, column: &str, stats: &mut GeoStats) -> Option<f64> {
    let parsed = match row.get(column)? {
        Value::Null => return None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => return None,
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed.filter(|v| v.is_finite()) {
        Some(value) => Some(value),
        None => {
            stats.invalid_values += 1;
            None
        }
    }
}

/// Left-join coordinates onto every record, taking codes from the address dimension
pub fn attach_coordinates(
    records: Vec<HashedRecord>,
    addresses: &[AddressRow],
    coordinates: &HashMap<String, Coordinates>,
    stats: &mut GeoStats,
) -> Vec<GeoRow> {
    let by_hash: HashMap<i64, &AddressRow> = addresses.iter().map(|a| (a.address_hash, a)).collect();

    records
        .into_iter()
        .map(|hashed| {
            let found = coordinates.get(&hashed.record.record_id).copied();
            if found.is_some() {
                stats.located += 1;
            } else {
                stats.unlocated += 1;
            }
            let point = found.unwrap_or_default();
            let address = by_hash.get(&hashed.address_hash);
            GeoRow {
                address_id: address.map(|a| a.address_id),
                address_hash: hashed.address_hash,
                longitude: point.longitude,
                latitude: point.latitude,
                psgc_region_id: address.and_then(|a| a.psgc_region_id.clone()),
                psgc_provhuc_id: address.and_then(|a| a.psgc_provhuc_id.clone()),
                psgc_muni_id: address.and_then(|a| a.psgc_muni_id.clone()),
                psgc_brgy_id: address.and_then(|a| a.psgc_brgy_id.clone()),
                record_id: hashed.record.record_id,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::address::canonicalize;
    use crate::pipeline::processing::location::LocationRecord;
    use serde_json::json;

    fn source(rows: Value) -> Table {
        Table::from_rows(
            rows.as_array()
                .map(|a| a.iter().filter_map(|r| r.as_object().cloned()).collect())
                .unwrap_or_default(),
        )
    }

    #[test]
    fn test_index_parses_and_counts() {
        let table = source(json!([
            {"id": 100001, "longitude": 120.59, "latitude": "18.25"},
            {"id": "100001", "longitude": 1.0, "latitude": 1.0},
            {"school_id": "100002", "longitude": "east", "latitude": null},
            {"longitude": 1.0, "latitude": 2.0}
        ]));
        let mut stats = GeoStats::default();
        let index = coordinate_index(&table, &mut stats);

        assert_eq!(index.len(), 2);
        assert_eq!(index["100001"].longitude, Some(120.59));
        assert_eq!(index["100001"].latitude, Some(18.25));
        assert_eq!(index["100002"], Coordinates::default());
        assert_eq!(stats.duplicate_ids, 1);
        assert_eq!(stats.rows_without_id, 1);
        assert_eq!(stats.invalid_values, 1);
    }

    #[test]
    fn test_missing_coordinates_keep_the_record() {
        let mut a = LocationRecord::new("100001");
        a.region_code = Some("0100000000".to_string());
        let mut b = a.clone();
        b.record_id = "100002".to_string();
        let (addresses, hashed) = canonicalize(vec![a, b]);

        let mut stats = GeoStats::default();
        let index = coordinate_index(
            &source(json!([{"id": "100001", "longitude": 120.5, "latitude": 18.2}])),
            &mut stats,
        );
        let rows = attach_coordinates(hashed, &addresses, &index, &mut stats);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].longitude, Some(120.5));
        assert_eq!(rows[1].longitude, None);
        assert!(rows.iter().all(|r| r.address_id == Some(1)));
        assert!(rows.iter().all(|r| r.psgc_region_id.as_deref() == Some("0100000000")));
        assert_eq!((stats.located, stats.unlocated), (1, 1));
    }
}
