use std::collections::HashMap;

use super::LevelStats;
use crate::constants::{CODE_WIDTH, MUNICIPALITY_PREFIX_LEN, PROVINCE_LEVEL_TRAILING_ZEROS, PROVINCE_PREFIX_LEN};
use crate::pipeline::processing::location::LocationRecord;
use crate::pipeline::processing::names::NameNormalizer;
use crate::pipeline::processing::reference::ReferenceRecord;

/// Code prefixes a municipality may carry, given the province/HUC code.
///
/// A province-level code (five or more trailing zeros) allows only its
/// 5-digit prefix. A more specific code also allows its 7-digit prefix.
/// No code, or one without digits, allows everything (empty result).
pub fn allowed_prefixes(provhuc: Option<&str>) -> Vec<String> {
    let Some(raw) = provhuc else {
        return Vec::new();
    };
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Vec::new();
    }

    let padded = format!("{:0>width$}", digits, width = CODE_WIDTH);
    let code = &padded[padded.len() - CODE_WIDTH..];
    let trailing_zeros = code.len() - code.trim_end_matches('0').len();

    let mut prefixes = vec![code[..PROVINCE_PREFIX_LEN].to_string()];
    if trailing_zeros < PROVINCE_LEVEL_TRAILING_ZEROS {
        prefixes.push(code[..MUNICIPALITY_PREFIX_LEN].to_string());
    }
    prefixes
}

/// City, municipality and sub-municipality names in reference order
#[derive(Debug, Clone)]
pub struct MunicipalityResolver {
    candidates: Vec<(String, String)>,
    first_by_name: HashMap<String, String>,
    normalizer: NameNormalizer,
}

impl MunicipalityResolver {
    pub fn new(reference: &[ReferenceRecord], normalizer: NameNormalizer) -> Self {
        let candidates: Vec<(String, String)> = reference
            .iter()
            .filter(|r| r.level.is_municipal())
            .map(|r| (r.code.clone(), normalizer.normalize(&r.name)))
            .collect();

        let mut first_by_name = HashMap::new();
        for (code, key) in &candidates {
            first_by_name.entry(key.clone()).or_insert_with(|| code.clone());
        }

        Self {
            candidates,
            first_by_name,
            normalizer,
        }
    }

    /// First candidate whose code carries an allowed prefix and whose
    /// normalized name equals the record's
    pub fn resolve(&self, municipality: Option<&str>, provhuc: Option<&str>) -> Option<String> {
        let key = self.normalizer.normalize(municipality?);
        if key.is_empty() {
            return None;
        }

        let prefixes = allowed_prefixes(provhuc);
        if prefixes.is_empty() {
            return self.first_by_name.get(&key).cloned();
        }

        self.candidates
            .iter()
            .find(|(code, name)| *name == key && prefixes.iter().any(|p| code.starts_with(p.as_str())))
            .map(|(code, _)| code.clone())
    }
}

/// Attach municipality codes in place
pub fn resolve_municipalities(
    records: &mut [LocationRecord],
    reference: &[ReferenceRecord],
    normalizer: &NameNormalizer,
) -> LevelStats {
    let resolver = MunicipalityResolver::new(reference, normalizer.clone());
    let mut stats = LevelStats::default();
    for record in records.iter_mut() {
        record.muni_code = resolver.resolve(record.municipality.as_deref(), record.provhuc_code.as_deref());
        stats.record(record.muni_code.is_some());
    }
    stats
}
