//! Wide enrollment counts to long rows.
//!
//! Every non-id column of the source is a count whose name encodes grade,
//! optional strand, and sex, e.g. `g11_stem_male` or `k_female`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::pipeline::processing::location::value_text;
use crate::pipeline::table::{Row, Table};

/// Columns carried onto every long row instead of being unpivoted
pub const ID_COLUMNS: [&str; 2] = ["school_year", "school_id"];

/// Offered-level flags; read by the school levels table, never unpivoted
pub const OFFER_COLUMNS: [&str; 3] = ["offers_es", "offers_jhs", "offers_shs"];

/// Strands whose names contain the token separator
const CUSTOM_STRANDS: [&str; 2] = ["sshs_acad", "sshs_techpro"];

const SEPARATOR: char = '_';

/// Parsed shape of one count column name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradeColumn {
    /// `grade_<custom strand>_sex`, where the strand itself contains `_`
    Custom { grade: String, strand: String, sex: String },
    /// `grade_sex`
    GradeSex { grade: String, sex: String },
    /// `grade_strand_sex`
    Standard { grade: String, strand: String, sex: String },
    /// More than three tokens; the middle ones form the strand
    Extended { grade: String, strand: String, sex: String },
    /// A single token
    GradeOnly { grade: String },
}

impl GradeColumn {
    pub fn grade(&self) -> &str {
        match self {
            GradeColumn::Custom { grade, .. }
            | GradeColumn::GradeSex { grade, .. }
            | GradeColumn::Standard { grade, .. }
            | GradeColumn::Extended { grade, .. }
            | GradeColumn::GradeOnly { grade } => grade,
        }
    }

    pub fn strand(&self) -> Option<&str> {
        match self {
            GradeColumn::Custom { strand, .. }
            | GradeColumn::Standard { strand, .. }
            | GradeColumn::Extended { strand, .. } => Some(strand),
            GradeColumn::GradeSex { .. } | GradeColumn::GradeOnly { .. } => None,
        }
    }

    pub fn sex(&self) -> Option<&str> {
        match self {
            GradeColumn::Custom { sex, .. }
            | GradeColumn::GradeSex { sex, .. }
            | GradeColumn::Standard { sex, .. }
            | GradeColumn::Extended { sex, .. } => Some(sex),
            GradeColumn::GradeOnly { .. } => None,
        }
    }
}

/// Split a count column name into grade, strand and sex
pub fn parse_grade_column(column: &str) -> Option<GradeColumn> {
    if column.is_empty() {
        return None;
    }
    let tokens: Vec<&str> = column.split(SEPARATOR).collect();
    let grade = tokens[0].to_string();

    match tokens.len() {
        1 => Some(GradeColumn::GradeOnly { grade }),
        2 => Some(GradeColumn::GradeSex {
            grade,
            sex: tokens[1].to_string(),
        }),
        3 => Some(GradeColumn::Standard {
            grade,
            strand: tokens[1].to_string(),
            sex: tokens[2].to_string(),
        }),
        n => {
            let strand = tokens[1..n - 1].join("_");
            let sex = tokens[n - 1].to_string();
            if CUSTOM_STRANDS.contains(&strand.as_str()) {
                Some(GradeColumn::Custom { grade, strand, sex })
            } else {
                Some(GradeColumn::Extended { grade, strand, sex })
            }
        }
    }
}

/// Parse a raw count: commas and surrounding whitespace removed, digits only
pub fn normalize_num_students(raw: &str) -> Option<i64> {
    let cleaned: String = raw.replace(',', "").trim().to_string();
    if cleaned.is_empty() || !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    cleaned.parse().ok()
}

/// One long-format enrollment row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRow {
    pub school_year: Option<String>,
    pub school_id: Option<String>,
    pub grade: Option<String>,
    pub strand: Option<String>,
    pub sex: Option<String>,
    pub num_students: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UnpivotStats {
    pub rows_emitted: usize,
    /// Non-null counts that did not parse
    pub rows_invalid: usize,
    /// Null or zero counts
    pub rows_dropped: usize,
}

/// Unpivot a wide enrollment table
pub fn unpivot(source: &Table) -> (Vec<EnrollmentRow>, UnpivotStats) {
    let value_columns: Vec<(&str, Option<GradeColumn>)> = source
        .columns
        .iter()
        .filter(|c| !ID_COLUMNS.contains(&c.as_str()) && !OFFER_COLUMNS.contains(&c.as_str()))
        .map(|c| (c.as_str(), parse_grade_column(c)))
        .collect();

    let mut stats = UnpivotStats::default();
    let mut rows = Vec::new();
    let mut invalid_samples: Vec<String> = Vec::new();

    for row in &source.rows {
        let school_year = id_text(row, "school_year");
        let school_id = id_text(row, "school_id");

        for (column, parsed) in &value_columns {
            let Some(raw) = row.get(*column).and_then(value_text) else {
                stats.rows_dropped += 1;
                continue;
            };
            let count = match normalize_num_students(&raw) {
                Some(0) => {
                    stats.rows_dropped += 1;
                    continue;
                }
                Some(count) => count,
                None => {
                    stats.rows_invalid += 1;
                    if invalid_samples.len() < 5 && !invalid_samples.contains(&raw) {
                        invalid_samples.push(raw);
                    }
                    continue;
                }
            };

            rows.push(EnrollmentRow {
                school_year: school_year.clone(),
                school_id: school_id.clone(),
                grade: parsed.as_ref().map(|p| p.grade().to_string()),
                strand: parsed.as_ref().and_then(|p| p.strand()).map(str::to_string),
                sex: parsed.as_ref().and_then(|p| p.sex()).map(str::to_string),
                num_students: count,
            });
        }
    }

    if stats.rows_invalid > 0 {
        warn!(
            "⚠️ Dropped {} invalid num_students values (samples: {:?})",
            stats.rows_invalid, invalid_samples
        );
    }
    stats.rows_emitted = rows.len();
    (rows, stats)
}

fn id_text(row: &Row, column: &str) -> Option<String> {
    row.get(column)
        .filter(|v| !matches!(v, Value::Null))
        .and_then(value_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
