use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::pipeline::processing::names::collapse_whitespace;
use crate::pipeline::table::Row;

/// One source entity (e.g. a school in a school year) to be placed in the
/// administrative hierarchy.
///
/// Resolver stages fill the `*_code` fields level by level. Columns this
/// struct does not name travel along untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    #[serde(alias = "school_id", deserialize_with = "required_text")]
    pub record_id: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub province: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub municipality: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub barangay: Option<String>,

    #[serde(rename = "psgc_region_id", default, deserialize_with = "optional_text")]
    pub region_code: Option<String>,
    #[serde(rename = "psgc_provhuc_id", default, deserialize_with = "optional_text")]
    pub provhuc_code: Option<String>,
    #[serde(rename = "psgc_muni_id", default, deserialize_with = "optional_text")]
    pub muni_code: Option<String>,
    #[serde(rename = "psgc_brgy_id", default, deserialize_with = "optional_text")]
    pub brgy_code: Option<String>,

    #[serde(flatten)]
    pub extra: Row,
}

impl LocationRecord {
    pub fn new(record_id: &str) -> Self {
        Self {
            record_id: record_id.to_string(),
            region: None,
            province: None,
            municipality: None,
            barangay: None,
            region_code: None,
            provhuc_code: None,
            muni_code: None,
            brgy_code: None,
            extra: Row::new(),
        }
    }

    pub fn field(&self, field: LocationField) -> Option<&str> {
        match field {
            LocationField::Region => self.region.as_deref(),
            LocationField::Province => self.province.as_deref(),
            LocationField::Municipality => self.municipality.as_deref(),
            LocationField::Barangay => self.barangay.as_deref(),
        }
    }

    pub fn set_field(&mut self, field: LocationField, value: Option<String>) {
        let slot = match field {
            LocationField::Region => &mut self.region,
            LocationField::Province => &mut self.province,
            LocationField::Municipality => &mut self.municipality,
            LocationField::Barangay => &mut self.barangay,
        };
        *slot = value;
    }

    /// Collapse whitespace runs in every text field; blank becomes null
    pub fn tidy_text(&mut self) {
        for field in LocationField::ALL {
            let tidied = self
                .field(field)
                .map(collapse_whitespace)
                .filter(|s| !s.is_empty());
            self.set_field(field, tidied);
        }
    }

    /// The resolved 4-tuple in hierarchy order
    pub fn codes(&self) -> [Option<&str>; 4] {
        [
            self.region_code.as_deref(),
            self.provhuc_code.as_deref(),
            self.muni_code.as_deref(),
            self.brgy_code.as_deref(),
        ]
    }

    /// Free-text column from `extra`, if present
    pub fn extra_text(&self, column: &str) -> Option<String> {
        crate::pipeline::table::cell_text(&self.extra, column).filter(|s| !s.trim().is_empty())
    }
}

/// Text fields rules may read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationField {
    Region,
    Province,
    Municipality,
    Barangay,
}

impl LocationField {
    pub const ALL: [LocationField; 4] = [
        LocationField::Region,
        LocationField::Province,
        LocationField::Municipality,
        LocationField::Barangay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LocationField::Region => "region",
            LocationField::Province => "province",
            LocationField::Municipality => "municipality",
            LocationField::Barangay => "barangay",
        }
    }
}

impl fmt::Display for LocationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "region" => Ok(LocationField::Region),
            "province" => Ok(LocationField::Province),
            "municipality" => Ok(LocationField::Municipality),
            "barangay" => Ok(LocationField::Barangay),
            other => Err(format!("unknown location field '{}'", other)),
        }
    }
}

/// Render a scalar JSON value as text. Integral floats lose their `.0`.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        other => Some(other.to_string()),
    }
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_text(&value))
}

fn required_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_text(&value)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| serde::de::Error::custom("record id is null or blank"))
}
