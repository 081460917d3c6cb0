//! Canonical comparison keys for free-text place names.
//!
//! Every function here is total: odd input yields an empty or unchanged
//! string, never an error.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use unicode_normalization::UnicodeNormalization;

static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(.*?\)").unwrap());
static PERIOD_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.,]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9 ]+").unwrap());
static TRAILING_ROMAN: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"\b(I|II|III|IV|V|VI|VII|VIII|IX|X)\b\.?$")
        .case_insensitive(true)
        .build()
        .unwrap()
});

static DEFAULT_NORMALIZER: Lazy<NameNormalizer> = Lazy::new(NameNormalizer::default);

/// Known mis-encoding of `Ñ` seen in barangay names
const MOJIBAKE_ENYE: &str = "Ã‘";

const CITY_OF: &str = "city of ";

/// Legacy abbreviations expanded during normalization
pub fn default_abbreviations() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("sta".to_string(), "santa".to_string()),
        ("sto".to_string(), "santo".to_string()),
    ])
}

/// Geographic name normalizer with a configurable abbreviation table
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    abbreviations: Vec<(Regex, String)>,
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::new(&default_abbreviations())
    }
}

impl NameNormalizer {
    /// Build from `abbreviation -> expansion` pairs. Keys are matched as
    /// whole lowercase words; keys that are not words are ignored.
    pub fn new(abbreviations: &BTreeMap<String, String>) -> Self {
        let abbreviations = abbreviations
            .iter()
            .filter_map(|(short, long)| {
                let short = short.trim().to_lowercase();
                if short.is_empty() {
                    return None;
                }
                Regex::new(&format!(r"\b{}\b", regex::escape(&short)))
                    .ok()
                    .map(|re| (re, long.trim().to_lowercase()))
            })
            .collect();
        Self { abbreviations }
    }

    /// Canonical key for a place name.
    ///
    /// Lowercase, fold diacritics to ASCII, drop parenthesized text and
    /// periods/commas, collapse whitespace, expand abbreviations, then
    /// rewrite "city of X" to "X city". A repeated "city of" prefix is
    /// rewritten until none is left, so the result is a fixed point.
    pub fn normalize(&self, name: &str) -> String {
        if name.trim().is_empty() {
            return String::new();
        }

        let lowered = name.to_lowercase();
        let folded: String = lowered.trim().nfkd().filter(|c| c.is_ascii()).collect();
        let folded = collapse_whitespace(&folded.to_ascii_lowercase());

        let without_parens = PARENTHESIZED.replace_all(&folded, "");
        let mut key = collapse_whitespace(&PERIOD_COMMA.replace_all(&without_parens, ""));

        for (pattern, expansion) in &self.abbreviations {
            key = pattern.replace_all(&key, expansion.as_str()).into_owned();
        }
        key = collapse_whitespace(&key);

        while let Some(rest) = key.strip_prefix(CITY_OF) {
            key = format!("{} city", rest);
        }
        key
    }
}

/// Normalize with the built-in abbreviation table
pub fn normalize_geo_name(name: &str) -> String {
    DEFAULT_NORMALIZER.normalize(name)
}

/// Stricter key for region labels: anything outside `[a-z0-9 ]` becomes a space
pub fn normalize_region_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let without_parens = PARENTHESIZED.replace_all(&lowered, "");
    let spaced = NON_ALNUM.replace_all(&without_parens, " ");
    WHITESPACE.replace_all(&spaced, " ").trim().to_string()
}

/// Replace a trailing roman numeral (I through X, optional period) with its digits
pub fn convert_trailing_roman(text: &str) -> String {
    let Some(found) = TRAILING_ROMAN.captures(text) else {
        return text.to_string();
    };
    let (Some(whole), Some(numeral)) = (found.get(0), found.get(1)) else {
        return text.to_string();
    };
    let arabic = match numeral.as_str().to_ascii_uppercase().as_str() {
        "I" => "1",
        "II" => "2",
        "III" => "3",
        "IV" => "4",
        "V" => "5",
        "VI" => "6",
        "VII" => "7",
        "VIII" => "8",
        "IX" => "9",
        "X" => "10",
        _ => return text.to_string(),
    };
    format!("{}{}", &text[..whole.start()], arabic)
}

/// Repair the mis-encoded enye before normalizing barangay names
pub fn fix_enye(name: &str) -> String {
    name.replace(MOJIBAKE_ENYE, "Ñ")
}

/// Barangay key: enye repair, normalization, then trailing roman numerals
pub fn barangay_key(normalizer: &NameNormalizer, name: &str) -> String {
    convert_trailing_roman(&normalizer.normalize(&fix_enye(name)))
}

/// Collapse internal whitespace runs and trim
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_cases() {
        assert_eq!(normalize_geo_name("Sto. Tomas"), "santo tomas");
        assert_eq!(normalize_geo_name("City of Manila"), "manila city");
        assert_eq!(normalize_geo_name("Quezon City (2nd District)"), "quezon city");
        assert_eq!(normalize_geo_name("Sta. Cruz"), "santa cruz");
        assert_eq!(normalize_geo_name("City (North) of Manila"), "manila city");
        assert_eq!(normalize_geo_name("City of City of Manila"), "manila city city");
    }

    #[test]
    fn test_diacritics_fold() {
        assert_eq!(normalize_geo_name("Parañaque"), "paranaque");
        assert_eq!(normalize_geo_name("  Biñan,  Laguna "), "binan laguna");
    }

    #[test]
    fn test_empty_and_blank() {
        assert_eq!(normalize_geo_name(""), "");
        assert_eq!(normalize_geo_name("   \t"), "");
        assert_eq!(normalize_geo_name("(only parens)"), "");
    }

    #[test]
    fn test_abbreviation_needs_word_boundary() {
        assert_eq!(normalize_geo_name("Stock Farm"), "stock farm");
        assert_eq!(normalize_geo_name("Basta"), "basta");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "Sto. Tomas",
            "City of Manila",
            "City of\tSan Fernando",
            "Quezon City (2nd District)",
            "Ciudad ℌermosa",
            "Santa Rosa, Laguna",
            "  CITY OF  (x)  Batac ",
            "Ã‘ato",
            "City (North) of Manila",
            "City , of Manila",
            "City of City of Manila",
            "city of (a\nb) x",
            "",
        ];
        for s in samples {
            let once = normalize_geo_name(s);
            assert_eq!(normalize_geo_name(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_custom_abbreviations() {
        let mut table = default_abbreviations();
        table.insert("gen".to_string(), "general".to_string());
        let normalizer = NameNormalizer::new(&table);
        assert_eq!(normalizer.normalize("Gen. Santos"), "general santos");
        assert_eq!(normalizer.normalize("Sto. Nino"), "santo nino");
    }

    #[test]
    fn test_region_name() {
        assert_eq!(normalize_region_name("Region I (Ilocos Region)"), "region i");
        assert_eq!(normalize_region_name("Region IV-A"), "region iv a");
        assert_eq!(normalize_region_name("NCR"), "ncr");
        assert_eq!(normalize_region_name(""), "");
    }

    #[test]
    fn test_trailing_roman() {
        assert_eq!(convert_trailing_roman("District I"), "District 1");
        assert_eq!(convert_trailing_roman("Division X."), "Division 10");
        assert_eq!(convert_trailing_roman("barangay viii"), "barangay 8");
        assert_eq!(convert_trailing_roman("No roman here"), "No roman here");
        assert_eq!(convert_trailing_roman("II Corinthians"), "II Corinthians");
        assert_eq!(convert_trailing_roman("Zone XI"), "Zone XI");
    }

    #[test]
    fn test_barangay_key() {
        let normalizer = NameNormalizer::default();
        assert_eq!(barangay_key(&normalizer, "Barangay IX"), "barangay 9");
        assert_eq!(barangay_key(&normalizer, "Barangay 9"), "barangay 9");
        assert_eq!(barangay_key(&normalizer, "Sto. NiÃ‘o"), "santo nino");
    }
}
