//! Reference table preparer: turns the raw geographic master list into
//! typed, fixed-width [`ReferenceRecord`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::constants::CODE_WIDTH;
use crate::pipeline::processing::location::value_text;
use crate::pipeline::table::Row;

/// Hierarchy level of a reference row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GeoLevel {
    Region,
    Province,
    City,
    /// Highly urbanized city, province-equivalent for matching
    UrbanizedCity,
    Municipality,
    SubMunicipality,
    Barangay,
    Other(String),
}

impl GeoLevel {
    /// Classify a raw level tag; cities flagged HUC become [`GeoLevel::UrbanizedCity`]
    pub fn classify(tag: &str, class_flags: &BTreeSet<String>) -> Self {
        let level = GeoLevel::from(tag.to_string());
        if level == GeoLevel::City && class_flags.iter().any(|f| f.contains("huc")) {
            return GeoLevel::UrbanizedCity;
        }
        level
    }

    pub fn tag(&self) -> &str {
        match self {
            GeoLevel::Region => "Reg",
            GeoLevel::Province => "Prov",
            GeoLevel::City => "City",
            GeoLevel::UrbanizedCity => "HUC",
            GeoLevel::Municipality => "Mun",
            GeoLevel::SubMunicipality => "SubMun",
            GeoLevel::Barangay => "Bgy",
            GeoLevel::Other(tag) => tag,
        }
    }

    /// Levels a municipality name may resolve to
    pub fn is_municipal(&self) -> bool {
        matches!(
            self,
            GeoLevel::City
                | GeoLevel::UrbanizedCity
                | GeoLevel::Municipality
                | GeoLevel::SubMunicipality
        )
    }
}

impl From<String> for GeoLevel {
    fn from(tag: String) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "reg" => GeoLevel::Region,
            "prov" => GeoLevel::Province,
            "city" => GeoLevel::City,
            "huc" => GeoLevel::UrbanizedCity,
            "mun" => GeoLevel::Municipality,
            "submun" => GeoLevel::SubMunicipality,
            "bgy" => GeoLevel::Barangay,
            _ => GeoLevel::Other(tag.trim().to_string()),
        }
    }
}

impl From<GeoLevel> for String {
    fn from(level: GeoLevel) -> Self {
        level.tag().to_string()
    }
}

impl fmt::Display for GeoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One authoritative row of the geographic master list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    /// Fixed-width, prefix-encoded code
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub level: GeoLevel,
    #[serde(default)]
    pub class_flags: BTreeSet<String>,
    #[serde(default)]
    pub correspondence_code: Option<String>,
    #[serde(default)]
    pub old_names: Option<String>,
    #[serde(default)]
    pub income_class: Option<String>,
    #[serde(default)]
    pub urban_rural: Option<String>,
    #[serde(default)]
    pub population: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ReferenceRecord {
    pub fn new(code: &str, name: &str, level: GeoLevel) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            level,
            class_flags: BTreeSet::new(),
            correspondence_code: None,
            old_names: None,
            income_class: None,
            urban_rural: None,
            population: None,
            status: None,
        }
    }

    pub fn with_flags(mut self, flags: &[&str]) -> Self {
        self.class_flags = flags.iter().map(|f| f.to_ascii_lowercase()).collect();
        self.level = GeoLevel::classify(self.level.tag(), &self.class_flags);
        self
    }

    /// First `len` characters of the code
    pub fn prefix(&self, len: usize) -> &str {
        &self.code[..len.min(self.code.len())]
    }
}

/// Counts from preparing a raw master list
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrepStats {
    pub rows_in: usize,
    pub rows_out: usize,
    pub invalid_code: usize,
    pub missing_level: usize,
    pub renamed_provinces: usize,
}

/// Prepare raw master-list rows.
///
/// Accepts `id`/`code`, `name`, `geo`/`level`, `city_class`, `cc`,
/// `old_names`, `income_class`, `urban_rural`, `population`, `status`.
/// Rows whose code cannot be read, or that have no level, are skipped.
pub fn prepare_reference(rows: &[Row]) -> (Vec<ReferenceRecord>, PrepStats) {
    let mut stats = PrepStats {
        rows_in: rows.len(),
        ..PrepStats::default()
    };
    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(code) = first_present(row, &["id", "code"]).and_then(pad_code) else {
            stats.invalid_code += 1;
            continue;
        };
        let Some(tag) = first_present(row, &["geo", "level"]).and_then(|v| clean_text(&v)) else {
            stats.missing_level += 1;
            continue;
        };

        let class_flags = text(row, "city_class")
            .map(|raw| split_flags(&raw))
            .unwrap_or_default();
        let level = GeoLevel::classify(&tag, &class_flags);

        let old_names = text(row, "old_names");
        let mut name = text(row, "name").unwrap_or_default();
        if level == GeoLevel::Province {
            if let Some(old) = &old_names {
                name = old.clone();
                stats.renamed_provinces += 1;
            }
        }

        records.push(ReferenceRecord {
            code,
            name,
            level,
            class_flags,
            correspondence_code: first_present(row, &["cc", "correspondence_code"])
                .and_then(integer_text),
            old_names,
            income_class: text(row, "income_class")
                .map(|c| c.replace('*', ""))
                .filter(|c| !c.is_empty()),
            urban_rural: text(row, "urban_rural"),
            population: first_present(row, &["population", "2024_pop"])
                .and_then(integer_text)
                .and_then(|p| p.parse().ok()),
            status: text(row, "status"),
        });
    }

    stats.rows_out = records.len();
    debug!(
        "Prepared {} reference rows ({} invalid codes, {} without level)",
        stats.rows_out, stats.invalid_code, stats.missing_level
    );
    (records, stats)
}

/// Left-pad a numeric code to the fixed width.
///
/// Numbers, digit strings and integral floats (`100000000.0`) are accepted;
/// anything longer than the width or non-numeric is rejected.
pub fn pad_code(value: Value) -> Option<String> {
    let digits = integer_text(value)?;
    if digits.len() > CODE_WIDTH {
        return None;
    }
    Some(format!("{:0>width$}", digits, width = CODE_WIDTH))
}

/// Digits of an integral value, or `None` for blanks, `-` and non-numbers
fn integer_text(value: Value) -> Option<String> {
    let raw = clean_text(&value)?;
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        return Some(raw);
    }
    let parsed: f64 = raw.parse().ok()?;
    if parsed.is_finite() && parsed >= 0.0 && parsed.fract() == 0.0 && parsed < 1e15 {
        Some(format!("{}", parsed as u64))
    } else {
        None
    }
}

fn first_present(row: &Row, columns: &[&str]) -> Option<Value> {
    columns
        .iter()
        .filter_map(|c| row.get(*c))
        .find(|v| !v.is_null())
        .cloned()
}

/// Trimmed text with `-` and blanks treated as null
fn clean_text(value: &Value) -> Option<String> {
    value_text(value)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "-")
}

fn text(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(clean_text)
}

fn split_flags(raw: &str) -> BTreeSet<String> {
    raw.split(|c: char| c == ',' || c == '/' || c == ';' || c.is_whitespace())
        .map(|f| f.trim().to_ascii_lowercase())
        .filter(|f| !f.is_empty())
        .collect()
}
