//! Sheetnest benchmark runner CLI

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use sheetnest_benchmark::{BenchmarkConfig, BenchmarkRunner, Instance, SyntheticGenerator};
use sheetnest_core::{Config, PlacementType};
use sheetnest_d2::{plan_sheets, SheetSize};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sheetnest-bench")]
#[command(about = "Benchmark runner for sheetnest")]
#[command(version)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "[off, error, warn, info, debug, trace]",
        default_value = "info"
    )]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the nester on a synthetic instance
    Run {
        /// Instance to generate
        #[arg(short, long, value_enum, default_value = "sample")]
        scenario: ScenarioArg,

        /// Number of part kinds for generated instances
        #[arg(short, long, default_value = "12")]
        kinds: usize,

        /// Maximum number of iterations
        #[arg(short, long, default_value = "10")]
        iterations: u32,

        /// GA population size
        #[arg(short, long, default_value = "10")]
        population: usize,

        /// Placement heuristic
        #[arg(long, value_enum, default_value = "gravity")]
        placement: PlacementArg,

        /// RNG seed for both the instance and the search
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Evaluate chromosomes on a single thread
        #[arg(long)]
        sequential: bool,

        /// Output file for the report (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Plan the sheets needed for a synthetic instance
    Plan {
        /// Instance to generate
        #[arg(short, long, value_enum, default_value = "sample")]
        scenario: ScenarioArg,

        /// Offered sheet sizes as WIDTHxHEIGHT
        #[arg(long, default_values_t = vec!["3000x1500".to_string(), "1000x1000".to_string()])]
        sizes: Vec<String>,

        /// RNG seed for generated instances
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ScenarioArg {
    /// 200 rectangles of 250x220 on five 3000x1500 sheets
    Sample,
    /// Random rectangles
    Rectangles,
    /// Rectangles, L-shapes and framed parts with holes
    Mixed,
}

#[derive(Clone, Copy, ValueEnum)]
enum PlacementArg {
    Gravity,
    BoundingBox,
    BottomLeft,
}

impl From<PlacementArg> for PlacementType {
    fn from(arg: PlacementArg) -> Self {
        match arg {
            PlacementArg::Gravity => PlacementType::Gravity,
            PlacementArg::BoundingBox => PlacementType::BoundingBox,
            PlacementArg::BottomLeft => PlacementType::BottomLeft,
        }
    }
}

fn instance(scenario: ScenarioArg, kinds: usize, seed: u64) -> Instance {
    let mut generator = SyntheticGenerator::with_seed(seed);
    match scenario {
        ScenarioArg::Sample => generator.sample(),
        ScenarioArg::Rectangles => generator.rectangles(kinds, 2000.0, 1000.0),
        ScenarioArg::Mixed => generator.mixed(kinds, 2000.0, 1000.0),
    }
}

fn parse_size(text: &str) -> anyhow::Result<SheetSize> {
    let (w, h) = text
        .split_once('x')
        .ok_or_else(|| anyhow::anyhow!("sheet size '{}' is not WIDTHxHEIGHT", text))?;
    Ok(SheetSize::new(w.trim().parse()?, h.trim().parse()?))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_default_env()
        .filter_level(cli.log_level)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            kinds,
            iterations,
            population,
            placement,
            seed,
            sequential,
            output,
        } => {
            let instance = instance(scenario, kinds, seed);
            log::info!(
                "Running {} ({} parts) for up to {} iterations",
                instance.name,
                instance.part_count(),
                iterations
            );

            let nest = Config::new()
                .with_population_size(population)
                .with_placement_type(placement.into())
                .with_parallel(!sequential)
                .with_seed(seed);
            let config = BenchmarkConfig::new()
                .with_iterations(iterations)
                .with_nest_config(nest)
                .with_progress(true);

            let report = BenchmarkRunner::new(config).run(&instance)?;
            let json = serde_json::to_string_pretty(&report)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("Report saved to: {}", path.display());
                }
                None => println!("{}", json),
            }
        }

        Commands::Plan {
            scenario,
            sizes,
            seed,
        } => {
            let instance = instance(scenario, 12, seed);
            let sizes = sizes
                .iter()
                .map(|s| parse_size(s))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let sheets = plan_sheets(&sizes, &instance.parts, &Config::new())?;
            println!("{} sheets for {}:", sheets.len(), instance.name);
            for sheet in &sheets {
                println!("  - {} x {}", sheet.width(), sheet.height());
            }
        }
    }

    Ok(())
}
