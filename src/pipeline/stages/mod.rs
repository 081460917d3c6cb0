//! Concrete pipeline stages, registered statically by
//! [`StageRegistry::standard`](crate::pipeline::registry::StageRegistry::standard).

use anyhow::Result;
use serde::Serialize;

use crate::constants::TABLE_PSGC;
use crate::pipeline::processing::location::LocationRecord;
use crate::pipeline::processing::reference::ReferenceRecord;
use crate::pipeline::schema::schema_for;
use crate::pipeline::stage::StageInputs;
use crate::pipeline::table::Table;

pub mod address;
pub mod enrollment;
pub mod geo;
pub mod locations;
pub mod meta;
pub mod reference;
pub mod resolve;

pub use address::{AddressStage, DivisionsStage};
pub use enrollment::{EnrollmentStage, SchoolLevelsStage};
pub use geo::GeoStage;
pub use locations::LocationsStage;
pub use meta::MetaPsgcStage;
pub use reference::PsgcStage;
pub use resolve::{BarangayMatchStage, MunicipalityMatchStage, ProvHucMatchStage, RegionMatchStage};

/// Serialize records into the named table.
///
/// An empty result still carries the declared columns so it passes its
/// schema contract.
pub(crate) fn table_of<T: Serialize>(name: &str, records: &[T]) -> Result<Table> {
    let mut table = Table::from_records(records)?;
    if table.columns.is_empty() {
        if let Some(schema) = schema_for(name) {
            table.columns = schema.columns.iter().map(|c| c.name.clone()).collect();
        }
    }
    Ok(table)
}

pub(crate) fn reference_input(inputs: &StageInputs) -> Result<Vec<ReferenceRecord>> {
    inputs.require(TABLE_PSGC)?.to_records()
}

pub(crate) fn location_input(inputs: &StageInputs, table: &str) -> Result<Vec<LocationRecord>> {
    inputs.require(table)?.to_records()
}
