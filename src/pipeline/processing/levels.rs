//! School levels offered per school year, from the `offers_*` flags of the
//! wide enrollment source.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

use crate::pipeline::processing::enrollment::{EnrollmentRow, OFFER_COLUMNS};
use crate::pipeline::table::{cell_text, Row, Table};

const OFFER_PREFIX: &str = "offers_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolLevelRow {
    pub school_id: String,
    pub school_year: String,
    pub level: String,
    pub offered: Option<bool>,
}

/// Read an offer flag. Booleans, 0/1 and yes/no/true/false spellings are
/// accepted; anything else is unknown.
pub fn parse_offered(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Level label for an offer column: `offers_jhs` becomes `jhs`
pub fn level_name(column: &str) -> String {
    column.trim_start_matches(OFFER_PREFIX).to_lowercase()
}

/// Offer flags from each school's latest school year in the source
fn latest_offers(source: &Table) -> HashMap<String, (String, [Option<bool>; 3])> {
    let mut latest: HashMap<String, (String, [Option<bool>; 3])> = HashMap::new();
    for row in &source.rows {
        let (Some(school_id), Some(school_year)) = (key(row, "school_id"), key(row, "school_year")) else {
            continue;
        };
        let flags = OFFER_COLUMNS.map(|col| row.get(col).and_then(parse_offered));
        match latest.get(&school_id) {
            Some((seen_year, _)) if *seen_year >= school_year => {}
            _ => {
                latest.insert(school_id, (school_year, flags));
            }
        }
    }
    latest
}

fn key(row: &Row, column: &str) -> Option<String> {
    cell_text(row, column)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// One row per (school, school year, level) for every school year seen in
/// the long enrollment rows, sorted by school then year.
pub fn offered_levels(source: &Table, enrollment: &[EnrollmentRow]) -> Vec<SchoolLevelRow> {
    let offers = latest_offers(source);
    let pairs: BTreeSet<(&str, &str)> = enrollment
        .iter()
        .filter_map(|row| Some((row.school_id.as_deref()?, row.school_year.as_deref()?)))
        .collect();

    let mut rows = Vec::with_capacity(pairs.len() * OFFER_COLUMNS.len());
    for (school_id, school_year) in pairs {
        let flags = offers.get(school_id).map(|(_, flags)| *flags).unwrap_or_default();
        for (column, offered) in OFFER_COLUMNS.iter().zip(flags) {
            rows.push(SchoolLevelRow {
                school_id: school_id.to_string(),
                school_year: school_year.to_string(),
                level: level_name(column),
                offered,
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn enrolled(school_id: &str, school_year: &str) -> EnrollmentRow {
        EnrollmentRow {
            school_year: Some(school_year.to_string()),
            school_id: Some(school_id.to_string()),
            grade: Some("g1".to_string()),
            strand: None,
            sex: Some("male".to_string()),
            num_students: 10,
        }
    }

    #[test]
    fn test_parse_offered() {
        assert_eq!(parse_offered(&json!(true)), Some(true));
        assert_eq!(parse_offered(&json!(0)), Some(false));
        assert_eq!(parse_offered(&json!(" Yes ")), Some(true));
        assert_eq!(parse_offered(&json!("FALSE")), Some(false));
        assert_eq!(parse_offered(&json!("maybe")), None);
        assert_eq!(parse_offered(&json!(null)), None);
    }

    #[test]
    fn test_latest_year_flags_apply_to_every_year() {
        let source = Table::from_rows(vec![
            json!({"school_id": "1", "school_year": "2022-2023", "offers_es": false, "offers_jhs": "1", "offers_shs": "0"})
                .as_object()
                .cloned()
                .unwrap(),
            json!({"school_id": "1", "school_year": "2023-2024", "offers_es": true, "offers_jhs": "1", "offers_shs": "0"})
                .as_object()
                .cloned()
                .unwrap(),
        ]);
        let rows = offered_levels(
            &source,
            &[enrolled("1", "2023-2024"), enrolled("1", "2022-2023"), enrolled("1", "2023-2024")],
        );

        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].school_year, "2022-2023");
        assert_eq!(rows[0].level, "es");
        assert_eq!(rows[0].offered, Some(true));
        assert_eq!(rows[1].level, "jhs");
        assert_eq!(rows[2].offered, Some(false));
    }

    #[test]
    fn test_school_without_flags_is_unknown() {
        let rows = offered_levels(&Table::default(), &[enrolled("9", "2023-2024")]);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.offered.is_none()));
        assert_eq!(level_name("offers_shs"), "shs");
    }
}
