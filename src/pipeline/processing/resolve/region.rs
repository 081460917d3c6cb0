use std::collections::HashMap;
use tracing::debug;

use crate::config::{FixesConfig, RegionAlias};
use crate::pipeline::processing::location::LocationRecord;
use crate::pipeline::processing::names::normalize_region_name;
use crate::pipeline::processing::reference::{GeoLevel, ReferenceRecord};

/// Outcome of matching one region label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionMatch {
    Matched(String),
    /// The alias table marks this label as deliberately unresolved
    Excluded,
    Unmatched,
}

/// Region-level lookup: normalized region name to code, plus aliases
#[derive(Debug, Clone)]
pub struct RegionResolver {
    by_name: HashMap<String, String>,
    aliases: HashMap<String, Option<String>>,
}

impl RegionResolver {
    pub fn new(reference: &[ReferenceRecord], config: &FixesConfig) -> Self {
        // Later rows win on duplicate names
        let by_name = reference
            .iter()
            .filter(|r| r.level == GeoLevel::Region)
            .map(|r| (normalize_region_name(&r.name), r.code.clone()))
            .collect();

        let aliases = config
            .region_aliases
            .keys()
            .map(|raw| {
                let key = normalize_region_name(raw);
                let target = match config.region_alias(raw) {
                    Some(RegionAlias::Canonical(target)) => Some(normalize_region_name(target)),
                    _ => None,
                };
                (key, target)
            })
            .collect();

        Self { by_name, aliases }
    }

    pub fn resolve(&self, region: Option<&str>) -> RegionMatch {
        let normalized = normalize_region_name(region.unwrap_or_default());
        let key = match self.aliases.get(&normalized) {
            Some(None) => return RegionMatch::Excluded,
            Some(Some(target)) => target,
            None => &normalized,
        };
        match self.by_name.get(key) {
            Some(code) => RegionMatch::Matched(code.clone()),
            None => RegionMatch::Unmatched,
        }
    }
}

/// Counts from the region pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegionStats {
    pub matched: usize,
    pub excluded: usize,
    pub unmatched: usize,
}

/// Attach region codes. Excluded and unmatched records are dropped.
pub fn resolve_regions(
    records: Vec<LocationRecord>,
    reference: &[ReferenceRecord],
    config: &FixesConfig,
) -> (Vec<LocationRecord>, RegionStats) {
    let resolver = RegionResolver::new(reference, config);
    let mut stats = RegionStats::default();
    let mut kept = Vec::with_capacity(records.len());

    for mut record in records {
        match resolver.resolve(record.region.as_deref()) {
            RegionMatch::Matched(code) => {
                record.region_code = Some(code);
                stats.matched += 1;
                kept.push(record);
            }
            RegionMatch::Excluded => {
                debug!("Record {} excluded by region alias", record.record_id);
                stats.excluded += 1;
            }
            RegionMatch::Unmatched => {
                debug!(
                    "Record {} has unmatched region {:?}",
                    record.record_id, record.region
                );
                stats.unmatched += 1;
            }
        }
    }

    (kept, stats)
}
