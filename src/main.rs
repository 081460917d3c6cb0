use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use psgc_pipeline::constants::{SOURCE_ENROLLMENT, SOURCE_GEO, SOURCE_LOCATIONS, SOURCE_PSGC};
use psgc_pipeline::pipeline::{Pipeline, PipelineOutput, Row, SourceTables, StageRegistry, Table};
use psgc_pipeline::{logging, observability, FixesConfig, Settings};

#[derive(Parser)]
#[command(name = "psgc_pipeline")]
#[command(about = "Resolve school location records to PSGC codes")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full resolution pipeline
    Run {
        /// Reference master list (JSON array of row objects). Falls back to PSGC_FILE
        #[arg(long)]
        psgc: Option<PathBuf>,
        /// Location records (JSON array of row objects). Falls back to LOCATIONS_FILE
        #[arg(long)]
        locations: Option<PathBuf>,
        /// Correction rules (TOML). Falls back to FIXES_FILE, then built-in defaults
        #[arg(long)]
        fixes: Option<PathBuf>,
        /// Wide enrollment counts; enables the enrollment stage. Falls back to ENROLLMENT_FILE
        #[arg(long)]
        enrollment: Option<PathBuf>,
        /// School coordinates (`id`, `longitude`, `latitude`); enables the geo stage. Falls back to GEO_FILE
        #[arg(long)]
        geo: Option<PathBuf>,
        /// Write every produced table here as one JSON object
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the scheduled stage order
    Plan {
        /// Include the enrollment stages
        #[arg(long)]
        enrollment: bool,
        /// Include the geo stage
        #[arg(long)]
        geo: bool,
    },
}

/// Read a JSON array of row objects into a table
fn load_table(path: &Path) -> Result<Table, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let rows: Vec<Row> = serde_json::from_str(&content)
        .map_err(|e| format!("'{}' is not a JSON array of objects: {}", path.display(), e))?;
    info!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(Table::from_rows(rows))
}

fn build_registry(config: Arc<FixesConfig>, enrollment: bool, geo: bool) -> psgc_pipeline::Result<StageRegistry> {
    let mut registry = StageRegistry::standard(config)?;
    if enrollment {
        registry = registry.with_enrollment()?;
    }
    if geo {
        registry = registry.with_geo()?;
    }
    Ok(registry)
}

fn print_summary(output: &PipelineOutput) {
    println!("\n📊 Pipeline Results (run {}):", output.run_id);
    println!("   Stages: {}", output.stage_order.join(" → "));
    for (name, table) in &output.tables {
        println!("   {:<20} {} rows", name, table.len());
    }
    println!("\n📈 Stage metrics:");
    for (name, value) in &output.metrics {
        println!("   {:<45} {}", name, value);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = logging::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { enrollment, geo } => {
            let pipeline = Pipeline::new(build_registry(Arc::new(FixesConfig::default()), enrollment, geo)?)?;
            println!("🗺️  Execution plan:");
            for (position, stage) in pipeline.plan().iter().enumerate() {
                println!("   {}. {}", position + 1, stage);
            }
        }
        Commands::Run {
            psgc,
            locations,
            fixes,
            enrollment,
            geo,
            output,
        } => {
            let settings = Settings::from_env();
            let psgc = psgc
                .or(settings.psgc_file)
                .ok_or("no reference file: pass --psgc or set PSGC_FILE")?;
            let locations = locations
                .or(settings.locations_file)
                .ok_or("no locations file: pass --locations or set LOCATIONS_FILE")?;
            let enrollment = enrollment.or(settings.enrollment_file);
            let geo = geo.or(settings.geo_file);

            let config = match fixes.or(settings.fixes_file) {
                Some(path) => FixesConfig::load(&path)?,
                None => {
                    warn!("⚠️ No fixes file given, using built-in rules");
                    FixesConfig::default()
                }
            };

            if let Err(e) = observability::init() {
                warn!("⚠️ Metrics recorder unavailable: {}", e);
            }

            let mut sources = SourceTables::new()
                .with(SOURCE_PSGC, load_table(&psgc)?)
                .with(SOURCE_LOCATIONS, load_table(&locations)?);
            if let Some(path) = &enrollment {
                sources.insert(SOURCE_ENROLLMENT, load_table(path)?);
            }
            if let Some(path) = &geo {
                sources.insert(SOURCE_GEO, load_table(path)?);
            }

            println!("🚀 Running PSGC pipeline...");
            let pipeline = Pipeline::new(build_registry(Arc::new(config), enrollment.is_some(), geo.is_some())?)?;
            let result = match pipeline.execute(&sources) {
                Ok(result) => result,
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    println!("❌ Pipeline failed: {}", e);
                    return Err(e.into());
                }
            };

            print_summary(&result);
            if let Some(path) = output {
                fs::write(&path, serde_json::to_string_pretty(&result.tables)?)?;
                println!("\n💾 Tables written to {}", path.display());
            }
            if let Some(snapshot) = observability::render() {
                println!("\n{}", snapshot);
            }
            println!("✅ Pipeline completed successfully");
        }
    }

    Ok(())
}
