use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;

use psgc_pipeline::constants::*;
use psgc_pipeline::pipeline::processing::location::LocationRecord;
use psgc_pipeline::pipeline::stage::{PipelineStage, StageContext, StageInputs, StageOutput};
use psgc_pipeline::pipeline::{Pipeline, SourceTables, StageRegistry, Table};
use psgc_pipeline::{FixesConfig, PipelineError};

fn table(rows: Value) -> Table {
    Table::from_rows(
        rows.as_array()
            .map(|a| a.iter().filter_map(|r| r.as_object().cloned()).collect())
            .unwrap_or_default(),
    )
}

fn reference() -> Table {
    table(json!([
        {"id": 100000000, "name": "Region I", "geo": "Reg"},
        {"id": 100100000, "name": "Ilocos Norte", "geo": "Prov"},
        {"id": 100100100, "name": "Bacarra", "geo": "Mun"},
        {"id": 100100101, "name": "Libtong", "geo": "Bgy"},
        {"id": 300000000, "name": "Region III", "geo": "Reg"},
        {"id": 335400000, "name": "Pampanga", "geo": "Prov"},
        {"id": 330100000, "name": "City of Angeles", "geo": "City", "city_class": "HUC"},
        {"id": 330100001, "name": "Balibago", "geo": "Bgy"}
    ]))
}

fn standard_pipeline() -> Result<Pipeline> {
    Ok(Pipeline::new(StageRegistry::standard(Arc::new(FixesConfig::default()))?)?)
}

#[test]
fn test_single_record_resolves_to_address_one() -> Result<()> {
    let sources = SourceTables::new()
        .with(SOURCE_PSGC, reference())
        .with(
            SOURCE_LOCATIONS,
            table(json!([{
                "school_id": 100001,
                "region": "Region I",
                "province": "Ilocos Norte",
                "municipality": "Bacarra",
                "barangay": "Libtong",
                "division": "Ilocos Norte"
            }])),
        );

    let output = standard_pipeline()?.execute(&sources)?;

    let records: Vec<LocationRecord> = output.table(TABLE_META_PSGC).unwrap().to_records()?;
    assert_eq!(
        records[0].codes(),
        [Some("0100000000"), Some("0100100000"), Some("0100100100"), Some("0100100101")]
    );

    let with_hash = output.table(TABLE_META_WITH_HASH).unwrap();
    assert_eq!(with_hash.rows[0]["address_id"], json!(1));
    assert_eq!(with_hash.rows[0]["record_id"], json!("100001"));
    assert_eq!(output.table(TABLE_ADDRESS).unwrap().len(), 1);
    assert_eq!(output.table(TABLE_DIVISIONS).unwrap().rows[0]["division_id"], json!("0100000000-1"));
    assert_eq!(output.metric("brgy_match", "rows_matched"), Some(1));
    assert!(!output.run_id.is_empty());
    Ok(())
}

#[test]
fn test_urbanized_city_beats_province() -> Result<()> {
    let sources = SourceTables::new().with(SOURCE_PSGC, reference()).with(
        SOURCE_LOCATIONS,
        table(json!([{
            "school_id": "300001",
            "region": "Region III",
            "province": "Pampanga",
            "municipality": "Angeles City",
            "barangay": "Balibago"
        }])),
    );

    let output = standard_pipeline()?.execute(&sources)?;
    let records: Vec<LocationRecord> = output.table(TABLE_META_PSGC).unwrap().to_records()?;
    assert_eq!(records[0].provhuc_code.as_deref(), Some("0330100000"));
    assert_eq!(records[0].muni_code.as_deref(), Some("0330100000"));
    assert_eq!(records[0].brgy_code.as_deref(), Some("0330100001"));
    Ok(())
}

#[test]
fn test_unmatched_levels_stay_null_and_region_misses_drop() -> Result<()> {
    let sources = SourceTables::new().with(SOURCE_PSGC, reference()).with(
        SOURCE_LOCATIONS,
        table(json!([
            {"school_id": "1", "region": "Region I", "province": "Ilocos Norte", "municipality": "Nowhere"},
            {"school_id": "2", "region": "Atlantis", "province": "Ilocos Norte", "municipality": "Bacarra"}
        ])),
    );

    let output = standard_pipeline()?.execute(&sources)?;
    assert_eq!(output.metric("region_match", "rows_dropped"), Some(1));

    let records: Vec<LocationRecord> = output.table(TABLE_META_PSGC).unwrap().to_records()?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].provhuc_code.as_deref(), Some("0100100000"));
    assert_eq!(records[0].muni_code, None);
    assert_eq!(records[0].brgy_code, None);
    assert_eq!(output.metric("meta_psgc", "rows_incomplete"), Some(1));
    Ok(())
}

#[test]
fn test_identical_tuples_share_address_and_null_patterns_differ() -> Result<()> {
    let sources = SourceTables::new().with(SOURCE_PSGC, reference()).with(
        SOURCE_LOCATIONS,
        table(json!([
            {"school_id": "1", "region": "Region I", "province": "Ilocos Norte", "municipality": "Bacarra", "barangay": "Libtong"},
            {"school_id": "2", "region": "Region I", "province": "Ilocos Norte", "municipality": "Bacarra", "barangay": "Libtong"},
            {"school_id": "3", "region": "Region I", "province": "Ilocos Norte", "municipality": "Bacarra"},
            {"school_id": "4", "region": "Region I", "province": "Ilocos Norte"}
        ])),
    );

    let first = standard_pipeline()?.execute(&sources)?;
    let second = standard_pipeline()?.execute(&sources)?;
    assert_eq!(first.table(TABLE_ADDRESS), second.table(TABLE_ADDRESS));

    let ids: Vec<Value> = first
        .table(TABLE_META_WITH_HASH)
        .unwrap()
        .rows
        .iter()
        .map(|r| r["address_id"].clone())
        .collect();
    assert_eq!(ids[0], ids[1]);
    assert_ne!(ids[0], ids[2]);
    assert_ne!(ids[2], ids[3]);
    assert_eq!(first.table(TABLE_ADDRESS).unwrap().len(), 3);
    Ok(())
}

#[test]
fn test_enrollment_stage_is_opt_in() -> Result<()> {
    let registry = StageRegistry::standard(Arc::new(FixesConfig::default()))?;
    assert!(!Pipeline::new(registry)?.plan().contains(&"enrollment"));

    let registry = StageRegistry::standard(Arc::new(FixesConfig::default()))?.with_enrollment()?;
    let pipeline = Pipeline::new(registry)?;
    assert!(pipeline.plan().contains(&"enrollment"));

    let sources = SourceTables::new()
        .with(SOURCE_PSGC, reference())
        .with(SOURCE_LOCATIONS, table(json!([])))
        .with(
            SOURCE_ENROLLMENT,
            table(json!([{"school_year": "2023-2024", "school_id": "1", "g1_male": "12", "g1_female": "0"}])),
        );
    let output = pipeline.execute(&sources)?;
    assert_eq!(output.table(TABLE_ENROLLMENT).unwrap().len(), 1);
    assert_eq!(output.table(TABLE_ADDRESS).unwrap().len(), 0);
    assert_eq!(output.table(TABLE_SCHOOL_LEVELS).unwrap().len(), 3);
    assert_eq!(output.metric("school_levels", "rows_unknown"), Some(3));
    Ok(())
}

#[test]
fn test_geo_stage_joins_coordinates() -> Result<()> {
    let registry = StageRegistry::standard(Arc::new(FixesConfig::default()))?.with_geo()?;
    let pipeline = Pipeline::new(registry)?;
    let plan = pipeline.plan();
    let position = |name: &str| plan.iter().position(|s| *s == name);
    assert!(position("address") < position("geo"));

    let sources = SourceTables::new()
        .with(SOURCE_PSGC, reference())
        .with(
            SOURCE_LOCATIONS,
            table(json!([
                {"school_id": "100001", "region": "Region I", "province": "Ilocos Norte", "municipality": "Bacarra", "barangay": "Libtong"},
                {"school_id": "100002", "region": "Region I", "province": "Ilocos Norte"}
            ])),
        )
        .with(SOURCE_GEO, table(json!([{"id": "100001", "longitude": 120.61, "latitude": 18.25}])));

    let output = pipeline.execute(&sources)?;
    let geo = output.table(TABLE_GEO).unwrap();
    assert_eq!(geo.len(), 2);
    let located = geo.rows.iter().find(|r| r["record_id"] == json!("100001")).unwrap();
    assert_eq!(located["latitude"], json!(18.25));
    assert_eq!(located["psgc_brgy_id"], json!("0100100101"));
    let unlocated = geo.rows.iter().find(|r| r["record_id"] == json!("100002")).unwrap();
    assert_eq!(unlocated["longitude"], Value::Null);
    assert_eq!(output.metric("geo", "rows_unlocated"), Some(1));
    Ok(())
}

struct FakeStage {
    name: &'static str,
    needs: Vec<&'static str>,
    makes: Vec<&'static str>,
    rows: Value,
}

impl PipelineStage for FakeStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn depends_on(&self) -> Vec<&'static str> {
        self.needs.clone()
    }

    fn outputs(&self) -> Vec<&'static str> {
        self.makes.clone()
    }

    fn execute(&self, _ctx: &StageContext<'_>, _inputs: &StageInputs) -> anyhow::Result<StageOutput> {
        let mut output = StageOutput::new();
        for table_name in &self.makes {
            output = output.with_table(table_name, table(self.rows.clone()));
        }
        Ok(output)
    }
}

fn fake(name: &'static str, needs: &[&'static str], makes: &[&'static str]) -> Box<FakeStage> {
    Box::new(FakeStage {
        name,
        needs: needs.to_vec(),
        makes: makes.to_vec(),
        rows: json!([]),
    })
}

#[test]
fn test_duplicate_producer_rejected() {
    let mut registry = StageRegistry::standard(Arc::new(FixesConfig::default())).unwrap();
    let err = registry.register(fake("shadow", &[], &[TABLE_ADDRESS])).unwrap_err();
    assert!(err.is_configuration());
    match err {
        PipelineError::DuplicateProducer { table, first, second } => {
            assert_eq!(table, TABLE_ADDRESS);
            assert_eq!(first, "address");
            assert_eq!(second, "shadow");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_cycle_names_both_stages() {
    let mut registry = StageRegistry::new();
    registry.register(fake("a", &["b_out"], &["a_out"])).unwrap();
    registry.register(fake("b", &["a_out"], &["b_out"])).unwrap();

    match Pipeline::new(registry) {
        Err(PipelineError::DependencyCycle { stages }) => {
            assert_eq!(stages, vec!["a".to_string(), "b".to_string()]);
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("cycle was scheduled"),
    }
}

#[test]
fn test_schema_violation_aborts_run() {
    let mut registry = StageRegistry::new();
    registry
        .register(Box::new(FakeStage {
            name: "bad_divisions",
            needs: vec![],
            makes: vec![TABLE_DIVISIONS],
            rows: json!([{"psgc_region_id": "0100000000", "division": null, "division_seq": 1, "division_id": "0100000000-1"}]),
        }))
        .unwrap();

    let err = Pipeline::new(registry).unwrap().execute(&SourceTables::new()).unwrap_err();
    match err {
        PipelineError::SchemaViolation { stage, table, violations, sample } => {
            assert_eq!(stage, "bad_divisions");
            assert_eq!(table, TABLE_DIVISIONS);
            assert!(violations.iter().any(|v| v.contains("division")));
            assert!(sample.contains("0100000000-1"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_missing_source_is_stage_failure() {
    let err = standard_pipeline()
        .unwrap()
        .execute(&SourceTables::new())
        .unwrap_err();
    assert!(!err.is_configuration());
    assert_eq!(err.stage(), Some("psgc"));
}
