// Domain transforms: reference preparation, name normalization, resolution,
// overrides, address canonicalization, coordinates and enrollment reshaping

pub mod address;
pub mod divisions;
pub mod enrollment;
pub mod geo;
pub mod levels;
pub mod location;
pub mod names;
pub mod overrides;
pub mod reference;
pub mod resolve;

pub use location::{LocationField, LocationRecord};
pub use names::{normalize_geo_name, NameNormalizer};
pub use reference::{GeoLevel, ReferenceRecord};
