use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_EXCEPTION_MUNICIPALITY;
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::location::LocationField;
use crate::pipeline::processing::names::{default_abbreviations, NameNormalizer};

/// Declarative correction rules, loaded once and shared by the stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixesConfig {
    /// Normalized region text to canonical normalized text. An empty value
    /// marks the region as intentionally excluded.
    pub region_aliases: BTreeMap<String, String>,
    pub provincial_muni_fixes: Vec<ProvincialMuniFix>,
    /// Raw municipality name to corrected name
    pub municipality_fixes: BTreeMap<String, String>,
    /// Province name to the record ids that belong to it
    pub province_fixes_by_record_id: BTreeMap<String, Vec<RecordId>>,
    pub special_fixes: Vec<SpecialFix>,
    pub region_assignment: Option<RegionAssignment>,
    pub province_split: Option<ProvinceSplit>,
    pub province_code_overrides: Vec<ProvinceCodeOverride>,
    pub exception_municipality: String,
    pub barangay_corrections: Vec<BarangayCorrection>,
    pub backfill: Option<BackfillRule>,
    /// Whole-word abbreviation expansions used by name normalization
    pub abbreviations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvincialMuniFix {
    pub province: String,
    pub municipality: String,
    pub corrected: String,
}

/// Record ids show up as numbers or strings depending on the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl RecordId {
    pub fn matches(&self, record_id: &str) -> bool {
        match self {
            RecordId::Number(n) => record_id.trim().parse::<i64>().map_or(false, |id| id == *n),
            RecordId::Text(s) => s.trim() == record_id.trim(),
        }
    }
}

/// `when` every listed field equals its value (case-insensitive), `set` the
/// listed fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialFix {
    pub when: BTreeMap<String, String>,
    pub set: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionAssignment {
    pub provinces: Vec<String>,
    pub set_region: String,
}

/// Split one province into two successors by municipality membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvinceSplit {
    pub province: String,
    pub primary_successor: String,
    pub primary_municipalities: Vec<String>,
    /// Successor for every other municipality; left untouched when absent
    pub default_successor: Option<String>,
}

/// Force codes for a province text known to be misclassified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvinceCodeOverride {
    pub province: String,
    pub region_code: String,
    pub province_code: String,
    pub set_region: Option<String>,
    pub set_province: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarangayCorrection {
    pub municipality_code: String,
    pub old: String,
    pub new: String,
}

/// Narrow barangay-name lookup for records still missing codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillRule {
    pub code_prefix: String,
    pub level: String,
    pub correspondence_prefix: Option<String>,
    pub region_code: String,
    pub province_code: String,
}

/// Outcome of a region alias lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionAlias<'a> {
    Excluded,
    Canonical(&'a str),
}

impl Default for FixesConfig {
    fn default() -> Self {
        Self {
            region_aliases: BTreeMap::new(),
            provincial_muni_fixes: Vec::new(),
            municipality_fixes: BTreeMap::new(),
            province_fixes_by_record_id: BTreeMap::new(),
            special_fixes: Vec::new(),
            region_assignment: None,
            province_split: None,
            province_code_overrides: default_province_code_overrides(),
            exception_municipality: DEFAULT_EXCEPTION_MUNICIPALITY.to_string(),
            barangay_corrections: Vec::new(),
            backfill: Some(default_backfill()),
            abbreviations: default_abbreviations(),
        }
    }
}

fn default_province_code_overrides() -> Vec<ProvinceCodeOverride> {
    vec![
        ProvinceCodeOverride {
            province: "(sga - north cotabato)".to_string(),
            region_code: "1900000000".to_string(),
            province_code: "1999900000".to_string(),
            set_region: Some("BARMM".to_string()),
            set_province: Some("NORTH COTABATO".to_string()),
        },
        ProvinceCodeOverride {
            province: "city of isabela".to_string(),
            region_code: "0900000000".to_string(),
            province_code: "0990101000".to_string(),
            set_region: None,
            set_province: None,
        },
    ]
}

fn default_backfill() -> BackfillRule {
    BackfillRule {
        code_prefix: "19999".to_string(),
        level: "Bgy".to_string(),
        correspondence_prefix: Some("1247".to_string()),
        region_code: "1900000000".to_string(),
        province_code: "1999900000".to_string(),
    }
}

impl FixesConfig {
    /// Read, parse and validate a TOML rules file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read fixes file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: FixesConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject rules that could never apply
    pub fn validate(&self) -> Result<()> {
        for (index, rule) in self.special_fixes.iter().enumerate() {
            if rule.when.is_empty() {
                return Err(PipelineError::Config(format!(
                    "special_fixes[{}] has an empty `when` clause",
                    index
                )));
            }
            for field in rule.when.keys().chain(rule.set.keys()) {
                if field.parse::<LocationField>().is_err() {
                    return Err(PipelineError::Config(format!(
                        "special_fixes[{}] names unknown field '{}'",
                        index, field
                    )));
                }
            }
        }

        let codes = self
            .province_code_overrides
            .iter()
            .flat_map(|o| [o.region_code.as_str(), o.province_code.as_str()])
            .chain(self.barangay_corrections.iter().map(|c| c.municipality_code.as_str()))
            .chain(
                self.backfill
                    .iter()
                    .flat_map(|b| [b.region_code.as_str(), b.province_code.as_str()]),
            );
        for code in codes {
            if code.len() != crate::constants::CODE_WIDTH || !code.bytes().all(|b| b.is_ascii_digit()) {
                return Err(PipelineError::Config(format!(
                    "'{}' is not a {}-digit code",
                    code,
                    crate::constants::CODE_WIDTH
                )));
            }
        }

        if let Some((from, _)) = self
            .abbreviations
            .iter()
            .find(|(from, to)| from.trim().is_empty() || to.trim().is_empty())
        {
            return Err(PipelineError::Config(format!(
                "abbreviation '{}' has an empty side",
                from
            )));
        }

        if self.exception_municipality.trim().is_empty() {
            return Err(PipelineError::Config(
                "exception_municipality must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Name normalizer carrying the configured abbreviations
    pub fn normalizer(&self) -> NameNormalizer {
        NameNormalizer::new(&self.abbreviations)
    }

    /// Look up a normalized region name in the alias table
    pub fn region_alias(&self, normalized: &str) -> Option<RegionAlias<'_>> {
        self.region_aliases.get(normalized).map(|target| {
            if target.trim().is_empty() {
                RegionAlias::Excluded
            } else {
                RegionAlias::Canonical(target.as_str())
            }
        })
    }
}

/// Input locations resolved from flags or the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub psgc_file: Option<PathBuf>,
    pub locations_file: Option<PathBuf>,
    pub fixes_file: Option<PathBuf>,
    pub enrollment_file: Option<PathBuf>,
    pub geo_file: Option<PathBuf>,
}

impl Settings {
    /// Read `PSGC_FILE`, `LOCATIONS_FILE`, `FIXES_FILE`, `ENROLLMENT_FILE` and
    /// `GEO_FILE`, loading a `.env` file first when present
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let path = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty()).map(PathBuf::from);
        Self {
            psgc_file: path("PSGC_FILE"),
            locations_file: path("LOCATIONS_FILE"),
            fixes_file: path("FIXES_FILE"),
            enrollment_file: path("ENROLLMENT_FILE"),
            geo_file: path("GEO_FILE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
exception_municipality = "pateros"

[region_aliases]
"region iv a" = "calabarzon"
"pso" = ""

[municipality_fixes]
"sto nino" = "Santo Niño"

[province_fixes_by_record_id]
"Cebu" = [100001, "100002"]

[[provincial_muni_fixes]]
province = "Leyte"
municipality = "Tacloban"
corrected = "City of Tacloban"

[[special_fixes]]
when = { province = "isabela city" }
set = { region = "Region IX" }

[province_split]
province = "maguindanao"
primary_successor = "Maguindanao del Norte"
primary_municipalities = ["datu odin sinsuat"]
default_successor = "Maguindanao del Sur"
"#;

    #[test]
    fn test_sample_rules_parse() {
        let config = FixesConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.region_alias("region iv a"), Some(RegionAlias::Canonical("calabarzon")));
        assert_eq!(config.region_alias("pso"), Some(RegionAlias::Excluded));
        assert_eq!(config.region_alias("region i"), None);
        assert_eq!(config.provincial_muni_fixes.len(), 1);
        let ids = &config.province_fixes_by_record_id["Cebu"];
        assert!(ids[0].matches("100001"));
        assert!(ids[1].matches(" 100002 "));
        // Omitted sections keep their defaults
        assert_eq!(config.province_code_overrides.len(), 2);
        assert!(config.backfill.is_some());
    }

    #[test]
    fn test_unknown_special_fix_field_rejected() {
        let bad = r#"
[[special_fixes]]
when = { zip = "1000" }
set = { region = "NCR" }
"#;
        let err = FixesConfig::from_toml(bad).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("zip"));
    }

    #[test]
    fn test_malformed_code_rejected() {
        let bad = r#"
[[barangay_corrections]]
municipality_code = "12345"
old = "a"
new = "b"
"#;
        assert!(FixesConfig::from_toml(bad).is_err());
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(matches!(
            FixesConfig::from_toml("[nir_rules]\nprovinces = []\n"),
            Err(PipelineError::Toml(_))
        ));
    }

    #[test]
    fn test_abbreviations_configurable() {
        let config = FixesConfig::from_toml("[abbreviations]\ngen = \"general\"\n").unwrap();
        assert_eq!(config.normalizer().normalize("Gen. Santos"), "general santos");
        assert_eq!(FixesConfig::default().normalizer().normalize("Sto. Tomas"), "santo tomas");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = FixesConfig::load(file.path()).unwrap();
        assert_eq!(config.municipality_fixes["sto nino"], "Santo Niño");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = FixesConfig::load("/nonexistent/fixes.toml").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
