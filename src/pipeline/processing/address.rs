//! Address canonicalizer: collapses resolved 4-tuples into a deduplicated
//! address dimension with dense surrogate ids.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::pipeline::processing::location::LocationRecord;

/// Hex digits of the digest kept in the hash (60 bits, always fits `i64`)
const HASH_HEX_DIGITS: usize = 15;

/// One row of the address dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRow {
    pub address_id: i64,
    pub address_hash: i64,
    pub psgc_region_id: Option<String>,
    pub psgc_provhuc_id: Option<String>,
    pub psgc_muni_id: Option<String>,
    pub psgc_brgy_id: Option<String>,
}

/// A record with its address join columns attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashedRecord {
    #[serde(flatten)]
    pub record: LocationRecord,
    pub address_hash: i64,
    pub address_id: i64,
}

/// Deterministic hash of a code tuple.
///
/// Segments are pipe-joined with null as the empty string, so the position
/// of a null is part of the key.
pub fn address_hash(codes: &[Option<&str>; 4]) -> i64 {
    let joined = codes
        .iter()
        .map(|c| c.unwrap_or_default())
        .collect::<Vec<_>>()
        .join("|");
    let digest = hex::encode(Sha256::digest(joined.as_bytes()));
    // 15 hex digits never exceed i64::MAX, and hex::encode only emits hex
    i64::from_str_radix(&digest[..HASH_HEX_DIGITS], 16).unwrap_or_default()
}

/// Build the address dimension and attach `address_hash`/`address_id` to
/// every record.
///
/// Ids are dense, start at 1 and follow ascending hash order, so the result
/// does not depend on record order.
pub fn canonicalize(records: Vec<LocationRecord>) -> (Vec<AddressRow>, Vec<HashedRecord>) {
    let hashes: Vec<i64> = records.iter().map(|r| address_hash(&r.codes())).collect();

    let mut tuples: BTreeMap<i64, [Option<String>; 4]> = BTreeMap::new();
    for (record, hash) in records.iter().zip(&hashes) {
        tuples
            .entry(*hash)
            .or_insert_with(|| record.codes().map(|c| c.map(str::to_string)));
    }

    let ids: BTreeMap<i64, i64> = tuples.keys().zip(1..).map(|(hash, id)| (*hash, id)).collect();

    let addresses = tuples
        .into_iter()
        .map(|(hash, [region, provhuc, muni, brgy])| AddressRow {
            address_id: ids[&hash],
            address_hash: hash,
            psgc_region_id: region,
            psgc_provhuc_id: provhuc,
            psgc_muni_id: muni,
            psgc_brgy_id: brgy,
        })
        .collect();

    let hashed = records
        .into_iter()
        .zip(hashes)
        .map(|(record, hash)| HashedRecord {
            record,
            address_hash: hash,
            address_id: ids[&hash],
        })
        .collect();

    (addresses, hashed)
}
