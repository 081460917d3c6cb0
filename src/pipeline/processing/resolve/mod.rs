//! Hierarchical code resolution.
//!
//! Four resolvers run in order: region, province/HUC, municipality,
//! barangay. Each narrows its candidate reference rows using the code the
//! previous level assigned. A miss leaves that level's code null and never
//! stops the next level from trying.

pub mod barangay;
pub mod municipality;
pub mod province;
pub mod region;

pub use barangay::{resolve_barangays, BarangayResolver};
pub use municipality::{allowed_prefixes, resolve_municipalities, MunicipalityResolver};
pub use province::{resolve_provhuc, ProvHucResolver, ProvHucStats, ProvHucTier};
pub use region::{resolve_regions, RegionMatch, RegionResolver, RegionStats};

/// Matched/unmatched counts for a single level
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LevelStats {
    pub matched: usize,
    pub unmatched: usize,
}

impl LevelStats {
    pub fn record(&mut self, found: bool) {
        if found {
            self.matched += 1;
        } else {
            self.unmatched += 1;
        }
    }
}

/// First `len` characters of a code, or the whole code if shorter
pub(crate) fn code_prefix(code: &str, len: usize) -> &str {
    match code.char_indices().nth(len) {
        Some((end, _)) => &code[..end],
        None => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_prefix() {
        assert_eq!(code_prefix("0100100101", 7), "0100100");
        assert_eq!(code_prefix("01", 7), "01");
        assert_eq!(code_prefix("", 2), "");
    }

    #[test]
    fn test_level_stats() {
        let mut stats = LevelStats::default();
        stats.record(true);
        stats.record(false);
        stats.record(true);
        assert_eq!(stats, LevelStats { matched: 2, unmatched: 1 });
    }
}
