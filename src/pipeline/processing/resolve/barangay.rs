use std::collections::HashMap;

use super::{code_prefix, LevelStats};
use crate::constants::MUNICIPALITY_PREFIX_LEN;
use crate::pipeline::processing::location::LocationRecord;
use crate::pipeline::processing::names::{barangay_key, NameNormalizer};
use crate::pipeline::processing::reference::{GeoLevel, ReferenceRecord};

/// Barangay names grouped by their municipality's 7-digit prefix
#[derive(Debug, Clone)]
pub struct BarangayResolver {
    by_municipality: HashMap<String, Vec<(String, String)>>,
    normalizer: NameNormalizer,
}

impl BarangayResolver {
    pub fn new(reference: &[ReferenceRecord], normalizer: NameNormalizer) -> Self {
        let mut by_municipality: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for record in reference.iter().filter(|r| r.level == GeoLevel::Barangay) {
            by_municipality
                .entry(code_prefix(&record.code, MUNICIPALITY_PREFIX_LEN).to_string())
                .or_default()
                .push((barangay_key(&normalizer, &record.name), record.code.clone()));
        }
        Self {
            by_municipality,
            normalizer,
        }
    }

    /// Match a barangay name inside its municipality. Requires a municipality code.
    pub fn resolve(&self, barangay: Option<&str>, muni_code: Option<&str>) -> Option<String> {
        let muni_code = muni_code?;
        let key = barangay_key(&self.normalizer, barangay?);
        if key.is_empty() {
            return None;
        }
        self.by_municipality
            .get(code_prefix(muni_code, MUNICIPALITY_PREFIX_LEN))?
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, code)| code.clone())
    }
}

/// Attach barangay codes in place
pub fn resolve_barangays(
    records: &mut [LocationRecord],
    reference: &[ReferenceRecord],
    normalizer: &NameNormalizer,
) -> LevelStats {
    let resolver = BarangayResolver::new(reference, normalizer.clone());
    let mut stats = LevelStats::default();
    for record in records.iter_mut() {
        record.brgy_code = resolver.resolve(record.barangay.as_deref(), record.muni_code.as_deref());
        stats.record(record.brgy_code.is_some());
    }
    stats
}
