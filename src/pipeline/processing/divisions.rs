use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::pipeline::processing::location::LocationRecord;

/// Source column naming a record's school division
pub const DIVISION_COLUMN: &str = "division";

/// A school division numbered within its region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionRow {
    pub psgc_region_id: String,
    pub division: String,
    pub division_seq: i64,
    pub division_id: String,
}

/// Number the distinct `(region code, division)` pairs per region, in
/// region then division-name order. Records missing either are skipped.
pub fn assign_division_ids<'a, I>(records: I) -> Vec<DivisionRow>
where
    I: IntoIterator<Item = &'a LocationRecord>,
{
    let pairs: BTreeSet<(String, String)> = records
        .into_iter()
        .filter_map(|r| {
            let region = r.region_code.clone()?;
            let division = r.extra_text(DIVISION_COLUMN)?;
            Some((region, division.trim().to_string()))
        })
        .collect();

    let mut rows = Vec::with_capacity(pairs.len());
    let mut current_region: Option<String> = None;
    let mut seq = 0;
    for (region, division) in pairs {
        if current_region.as_deref() != Some(region.as_str()) {
            current_region = Some(region.clone());
            seq = 0;
        }
        seq += 1;
        rows.push(DivisionRow {
            division_id: format!("{}-{}", region, seq),
            psgc_region_id: region,
            division,
            division_seq: seq,
        });
    }
    rows
}
