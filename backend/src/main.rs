//! Roadsafety CLI - Build a star schema from STATS19 extracts
//!
//! # Commands
//!
//! ```bash
//! roadsafety run --collisions c.csv --vehicles v.csv --casualties k.csv --out out/
//! roadsafety config                       # Print the default configuration
//! roadsafety inspect vehicles.csv -d vehicles
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`). A `.env` file in the
//! working directory is loaded first.

use clap::{Parser, Subcommand, ValueEnum};
use roadsafety::transform::cleaner::{
    clean_casualties, clean_collisions, clean_vehicles, CleanReport, SchemaContract,
};
use roadsafety::{parse_csv_file_auto, run, CsvSink, Dataset, PipelineConfig, SourceTables};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roadsafety")]
#[command(about = "Clean road-safety collision data and build a star schema", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the five tables as CSV
    Run {
        /// Collisions extract
        #[arg(long)]
        collisions: PathBuf,

        /// Vehicles extract
        #[arg(long)]
        vehicles: PathBuf,

        /// Casualties extract
        #[arg(long)]
        casualties: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "star")]
        out: PathBuf,

        /// JSON configuration file (defaults apply when omitted)
        #[arg(short, long, env = "ROADSAFETY_CONFIG")]
        config: Option<PathBuf>,

        /// Override the sample fraction
        #[arg(long)]
        sample_fraction: Option<f64>,

        /// Override the sampling seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the default configuration as JSON
    Config,

    /// Parse and clean one extract, then print what the Cleaner did
    Inspect {
        /// Input CSV file
        input: PathBuf,

        /// Which table the file holds
        #[arg(short, long, value_enum)]
        dataset: DatasetArg,

        /// JSON configuration file (for the driver age bounds)
        #[arg(short, long, env = "ROADSAFETY_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DatasetArg {
    Collisions,
    Vehicles,
    Casualties,
}

impl From<DatasetArg> for Dataset {
    fn from(arg: DatasetArg) -> Self {
        match arg {
            DatasetArg::Collisions => Dataset::Collisions,
            DatasetArg::Vehicles => Dataset::Vehicles,
            DatasetArg::Casualties => Dataset::Casualties,
        }
    }
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            collisions,
            vehicles,
            casualties,
            out,
            config,
            sample_fraction,
            seed,
        } => cmd_run(
            &collisions,
            &vehicles,
            &casualties,
            &out,
            config.as_deref(),
            sample_fraction,
            seed,
        ),

        Commands::Config => cmd_config(),

        Commands::Inspect {
            input,
            dataset,
            config,
        } => cmd_inspect(&input, dataset.into(), config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            eprintln!("Using configuration: {}", path.display());
            Ok(PipelineConfig::from_file(path)?)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn cmd_run(
    collisions: &Path,
    vehicles: &Path,
    casualties: &Path,
    out: &Path,
    config_path: Option<&Path>,
    sample_fraction: Option<f64>,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    if let Some(fraction) = sample_fraction {
        config.sample_fraction = fraction;
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }
    config.validate()?;

    eprintln!("Reading extracts...");
    let sources = SourceTables::from_csv_files(collisions, vehicles, casualties)?;
    eprintln!("   Collisions: {} rows", sources.collisions.len());
    eprintln!("   Vehicles:   {} rows", sources.vehicles.len());
    eprintln!("   Casualties: {} rows", sources.casualties.len());

    let mut sink = CsvSink::new(out);
    let report = run(&sources, &config, &mut sink)?;

    let report_path = out.join("run_report.json");
    fs::write(&report_path, report.to_json()?)?;

    eprintln!("\nRun {}", report.run_id);
    for (table, rows) in &report.tables {
        eprintln!("   {table}: {rows} rows");
    }
    eprintln!("   Report saved to: {}", report_path.display());
    eprintln!("\nDone!");
    Ok(())
}

fn cmd_config() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", PipelineConfig::default().to_json()?);
    Ok(())
}

fn cmd_inspect(
    input: &Path,
    dataset: Dataset,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    eprintln!("Inspecting {}: {}", dataset, input.display());

    let table = parse_csv_file_auto(input, dataset)?;
    eprintln!("   Rows: {}", table.len());
    eprintln!("   Columns: {}", table.headers.join(", "));

    let contract = SchemaContract::for_dataset(dataset);
    eprintln!("   Required: {}", contract.required.join(", "));

    let report: CleanReport = match dataset {
        Dataset::Collisions => clean_collisions(&table)?.report,
        Dataset::Vehicles => clean_vehicles(&table, config.age_min, config.age_max)?.report,
        Dataset::Casualties => clean_casualties(&table)?.report,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
