//! Manual override layer.
//!
//! Pre-resolution rules patch raw text before any matching. Post-resolution
//! rules (barangay corrections, then the backfill) only touch records the
//! resolvers left incomplete.

use std::collections::HashMap;
use tracing::debug;

use crate::config::{BackfillRule, BarangayCorrection, FixesConfig};
use crate::constants::MUNICIPALITY_PREFIX_LEN;
use crate::pipeline::processing::location::{LocationField, LocationRecord};
use crate::pipeline::processing::reference::{GeoLevel, ReferenceRecord};
use crate::pipeline::processing::resolve::code_prefix;

/// How many records each pre-resolution rule touched
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PreResolutionStats {
    pub provincial_muni_fixes: usize,
    pub municipality_fixes: usize,
    pub province_fixes_by_record_id: usize,
    pub special_fixes: usize,
    pub region_assignment: usize,
    pub province_split: usize,
}

fn key(text: &str) -> String {
    text.trim().to_lowercase()
}

fn field_key(record: &LocationRecord, field: LocationField) -> Option<String> {
    record.field(field).map(key)
}

/// Apply every pre-resolution rule to one record, in order:
/// provincial municipality fixes, municipality fixes, record-id province
/// fixes, conditional fixes, region assignment, province split.
///
/// Each step sees the values written by the steps before it.
pub fn apply_pre_resolution(record: &mut LocationRecord, config: &FixesConfig, stats: &mut PreResolutionStats) {
    let province = field_key(record, LocationField::Province);
    let municipality = field_key(record, LocationField::Municipality);
    if let (Some(province), Some(municipality)) = (&province, &municipality) {
        if let Some(rule) = config
            .provincial_muni_fixes
            .iter()
            .find(|r| key(&r.province) == *province && key(&r.municipality) == *municipality)
        {
            record.municipality = Some(rule.corrected.clone());
            stats.provincial_muni_fixes += 1;
        }
    }

    if let Some(municipality) = field_key(record, LocationField::Municipality) {
        if let Some((_, corrected)) = config
            .municipality_fixes
            .iter()
            .find(|(raw, _)| key(raw) == municipality)
        {
            record.municipality = Some(corrected.clone());
            stats.municipality_fixes += 1;
        }
    }

    if let Some((province, _)) = config
        .province_fixes_by_record_id
        .iter()
        .find(|(_, ids)| ids.iter().any(|id| id.matches(&record.record_id)))
    {
        record.province = Some(province.to_uppercase());
        stats.province_fixes_by_record_id += 1;
    }

    for rule in &config.special_fixes {
        let applies = rule.when.iter().all(|(field, expected)| {
            match field.parse::<LocationField>() {
                Ok(field) => field_key(record, field).as_deref() == Some(key(expected).as_str()),
                Err(_) => false,
            }
        });
        if !applies {
            continue;
        }
        for (field, value) in &rule.set {
            if let Ok(field) = field.parse::<LocationField>() {
                record.set_field(field, Some(value.clone()));
            }
        }
        stats.special_fixes += 1;
    }

    if let Some(assignment) = &config.region_assignment {
        if let Some(province) = field_key(record, LocationField::Province) {
            if assignment.provinces.iter().any(|p| key(p) == province) {
                record.region = Some(assignment.set_region.clone());
                stats.region_assignment += 1;
            }
        }
    }

    if let Some(split) = &config.province_split {
        if field_key(record, LocationField::Province).as_deref() == Some(key(&split.province).as_str()) {
            let municipality = field_key(record, LocationField::Municipality).unwrap_or_default();
            let successor = if split
                .primary_municipalities
                .iter()
                .any(|m| key(m) == municipality)
            {
                Some(&split.primary_successor)
            } else {
                split.default_successor.as_ref()
            };
            if let Some(successor) = successor {
                record.province = Some(successor.clone());
                stats.province_split += 1;
            }
        }
    }
}

/// Rename barangays the resolver missed and look their codes up again.
///
/// A rule applies to records with no barangay code, the rule's exact
/// municipality code, and a case-insensitive barangay name match. Returns
/// how many records were renamed.
pub fn apply_barangay_corrections(
    records: &mut [LocationRecord],
    reference: &[ReferenceRecord],
    corrections: &[BarangayCorrection],
) -> usize {
    let mut renamed = 0;
    for rule in corrections {
        let prefix = code_prefix(&rule.municipality_code, MUNICIPALITY_PREFIX_LEN);
        let target = rule.new.to_uppercase();
        let code = reference
            .iter()
            .find(|r| {
                r.level == GeoLevel::Barangay
                    && r.code.starts_with(prefix)
                    && r.name.to_uppercase() == target
            })
            .map(|r| r.code.clone());

        for record in records.iter_mut() {
            let hit = record.brgy_code.is_none()
                && record.muni_code.as_deref() == Some(rule.municipality_code.as_str())
                && record
                    .barangay
                    .as_deref()
                    .map_or(false, |b| b.to_uppercase() == rule.old.to_uppercase());
            if !hit {
                continue;
            }
            record.barangay = Some(rule.new.clone());
            if code.is_some() {
                record.brgy_code = code.clone();
            }
            renamed += 1;
        }
    }
    renamed
}

/// Complete records still missing a municipality or barangay code from a
/// single barangay row of the configured subset.
///
/// The subset is reference rows whose code starts with `code_prefix`, whose
/// level tag equals `level`, and (when set) whose correspondence code starts
/// with `correspondence_prefix`. Names compare trimmed and lowercased.
pub fn apply_backfill(records: &mut [LocationRecord], reference: &[ReferenceRecord], rule: &BackfillRule) -> usize {
    let level = GeoLevel::from(rule.level.clone());
    let mut subset: HashMap<String, &str> = HashMap::new();
    for row in reference.iter().filter(|r| {
        r.level == level
            && r.code.starts_with(rule.code_prefix.as_str())
            && rule.correspondence_prefix.as_deref().map_or(true, |p| {
                r.correspondence_code
                    .as_deref()
                    .map_or(false, |cc| cc.starts_with(p))
            })
    }) {
        subset.entry(key(&row.name)).or_insert(row.code.as_str());
    }
    if subset.is_empty() {
        return 0;
    }

    let mut filled = 0;
    for record in records.iter_mut() {
        if record.muni_code.is_some() && record.brgy_code.is_some() {
            continue;
        }
        let Some(code) = record.barangay.as_deref().and_then(|b| subset.get(&key(b))) else {
            continue;
        };
        record.region_code = Some(rule.region_code.clone());
        record.provhuc_code = Some(rule.province_code.clone());
        record.muni_code = Some(format!("{}000", code_prefix(code, MUNICIPALITY_PREFIX_LEN)));
        record.brgy_code = Some(code.to_string());
        debug!("Backfilled record {} from barangay {}", record.record_id, code);
        filled += 1;
    }
    filled
}

/// Title-case a name: first letter of every alphabetic run upper, the rest lower
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}
