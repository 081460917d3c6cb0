/// Table names shared across stages, schemas, and the CLI.
/// These constants keep producer/consumer wiring free of magic strings.

// Raw inputs supplied by the external loader
pub const SOURCE_PSGC: &str = "psgc_source";
pub const SOURCE_LOCATIONS: &str = "locations_source";
pub const SOURCE_ENROLLMENT: &str = "enrollment_source";
pub const SOURCE_GEO: &str = "geo_source";

// Tables produced by pipeline stages
pub const TABLE_PSGC: &str = "psgc";
pub const TABLE_LOCATIONS: &str = "locations";
pub const TABLE_LOCATIONS_REGION: &str = "locations_region";
pub const TABLE_LOCATIONS_PROVHUC: &str = "locations_provhuc";
pub const TABLE_LOCATIONS_MUNI: &str = "locations_muni";
pub const TABLE_LOCATIONS_BRGY: &str = "locations_brgy";
pub const TABLE_META_PSGC: &str = "meta_psgc";
pub const TABLE_ADDRESS: &str = "address";
pub const TABLE_META_WITH_HASH: &str = "meta_with_hash";
pub const TABLE_DIVISIONS: &str = "divisions";
pub const TABLE_ENROLLMENT: &str = "enrollment";
pub const TABLE_SCHOOL_LEVELS: &str = "school_levels";
pub const TABLE_GEO: &str = "geo";

/// Fixed width of a PSGC code
pub const CODE_WIDTH: usize = 10;

// Code prefix lengths per hierarchy level
pub const REGION_PREFIX_LEN: usize = 2;
pub const PROVINCE_PREFIX_LEN: usize = 5;
pub const MUNICIPALITY_PREFIX_LEN: usize = 7;
pub const BARANGAY_PREFIX_LEN: usize = 10;

/// Trailing zeros at or above this count mark a province-level code
pub const PROVINCE_LEVEL_TRAILING_ZEROS: usize = 5;

/// Sample rows included in a schema violation error
pub const SCHEMA_SAMPLE_ROWS: usize = 3;

/// Municipality administered outside normal province boundaries
pub const DEFAULT_EXCEPTION_MUNICIPALITY: &str = "pateros";
