use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::code_prefix;
use crate::config::{FixesConfig, ProvinceCodeOverride};
use crate::constants::REGION_PREFIX_LEN;
use crate::pipeline::processing::location::LocationRecord;
use crate::pipeline::processing::names::NameNormalizer;
use crate::pipeline::processing::reference::{GeoLevel, ReferenceRecord};

/// Which lookup produced a province/HUC code, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProvHucTier {
    UrbanizedCity,
    SubMunicipality,
    ExceptionMunicipality,
    Province,
}

/// Lookups scoped to a single region
#[derive(Debug, Default, Clone)]
struct RegionScope {
    urbanized_cities: HashMap<String, String>,
    sub_municipalities: HashMap<String, String>,
    provinces: HashMap<String, String>,
    exception: Option<String>,
}

impl RegionScope {
    fn lookup(&self, municipality: &str, province: &str, allow_exception: bool) -> Option<(ProvHucTier, &str)> {
        named(&self.urbanized_cities, municipality)
            .map(|code| (ProvHucTier::UrbanizedCity, code))
            .or_else(|| named(&self.sub_municipalities, municipality).map(|code| (ProvHucTier::SubMunicipality, code)))
            .or_else(|| {
                self.exception
                    .as_deref()
                    .filter(|_| allow_exception)
                    .map(|code| (ProvHucTier::ExceptionMunicipality, code))
            })
            .or_else(|| named(&self.provinces, province).map(|code| (ProvHucTier::Province, code)))
    }
}

fn named<'a>(map: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    if key.is_empty() {
        return None;
    }
    map.get(key).map(String::as_str)
}

/// Province / highly-urbanized-city resolver.
///
/// Priority inside a region: urbanized city, sub-municipality, the
/// exception municipality, then province. Named overrides are applied
/// afterwards so a coincidental generic match cannot mask them.
#[derive(Debug, Clone)]
pub struct ProvHucResolver {
    scopes: BTreeMap<String, RegionScope>,
    overrides: Vec<ProvinceCodeOverride>,
    normalizer: NameNormalizer,
}

impl ProvHucResolver {
    pub fn new(reference: &[ReferenceRecord], normalizer: NameNormalizer, config: &FixesConfig) -> Self {
        let exception_key = normalizer.normalize(&config.exception_municipality);
        let mut scopes: BTreeMap<String, RegionScope> = BTreeMap::new();

        for record in reference {
            let key = normalizer.normalize(&record.name);
            let scope = scopes
                .entry(code_prefix(&record.code, REGION_PREFIX_LEN).to_string())
                .or_default();
            let map = match record.level {
                GeoLevel::UrbanizedCity => &mut scope.urbanized_cities,
                GeoLevel::SubMunicipality => &mut scope.sub_municipalities,
                GeoLevel::Province => &mut scope.provinces,
                GeoLevel::City | GeoLevel::Municipality => {
                    if key == exception_key && scope.exception.is_none() {
                        scope.exception = Some(record.code.clone());
                    }
                    continue;
                }
                _ => continue,
            };
            // First row in reference order wins
            map.entry(key).or_insert_with(|| record.code.clone());
        }

        Self {
            scopes,
            overrides: config.province_code_overrides.clone(),
            normalizer,
        }
    }

    /// Generic match for one record, without overrides
    pub fn resolve(&self, record: &LocationRecord) -> Option<(ProvHucTier, String)> {
        let municipality = self.normalizer.normalize(record.municipality.as_deref().unwrap_or_default());
        let province = self.normalizer.normalize(record.province.as_deref().unwrap_or_default());

        match record.region_code.as_deref() {
            Some(region_code) => self
                .scopes
                .get(code_prefix(region_code, REGION_PREFIX_LEN))
                .and_then(|scope| scope.lookup(&municipality, &province, true))
                .map(|(tier, code)| (tier, code.to_string())),
            // Without a region there is no scope; search every region, but the
            // exception municipality only applies inside its own region
            None => self
                .scopes
                .values()
                .filter_map(|scope| scope.lookup(&municipality, &province, false))
                .min_by_key(|(tier, _)| *tier)
                .map(|(tier, code)| (tier, code.to_string())),
        }
    }

    /// Apply the first named override whose province text matches.
    /// Returns true when one fired.
    pub fn apply_overrides(&self, record: &mut LocationRecord) -> bool {
        let Some(province) = record.province.as_deref().map(|p| p.trim().to_lowercase()) else {
            return false;
        };
        let Some(rule) = self
            .overrides
            .iter()
            .find(|o| o.province.trim().to_lowercase() == province)
        else {
            return false;
        };

        if let Some(region) = &rule.set_region {
            record.region = Some(region.clone());
        }
        if let Some(name) = &rule.set_province {
            record.province = Some(name.clone());
        }
        record.region_code = Some(rule.region_code.clone());
        record.provhuc_code = Some(rule.province_code.clone());
        true
    }
}

/// Counts from the province/HUC pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProvHucStats {
    pub urbanized_city: usize,
    pub sub_municipality: usize,
    pub exception_municipality: usize,
    pub province: usize,
    pub overridden: usize,
    pub unmatched: usize,
}

/// Attach province/HUC codes in place
pub fn resolve_provhuc(
    records: &mut [LocationRecord],
    reference: &[ReferenceRecord],
    normalizer: &NameNormalizer,
    config: &FixesConfig,
) -> ProvHucStats {
    let resolver = ProvHucResolver::new(reference, normalizer.clone(), config);
    let mut stats = ProvHucStats::default();

    for record in records.iter_mut() {
        record.provhuc_code = match resolver.resolve(record) {
            Some((tier, code)) => {
                match tier {
                    ProvHucTier::UrbanizedCity => stats.urbanized_city += 1,
                    ProvHucTier::SubMunicipality => stats.sub_municipality += 1,
                    ProvHucTier::ExceptionMunicipality => stats.exception_municipality += 1,
                    ProvHucTier::Province => stats.province += 1,
                }
                Some(code)
            }
            None => None,
        };

        if resolver.apply_overrides(record) {
            debug!("Record {} province codes overridden", record.record_id);
            stats.overridden += 1;
        }
        if record.provhuc_code.is_none() {
            stats.unmatched += 1;
        }
    }

    stats
}
