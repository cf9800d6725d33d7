//! Command line mutation tester.

mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use mutant_core::MutantConfig;
use mutant_engine::testmod;
use mutant_runtime::{demo, DocTestHarness, Module, ModuleSpec, TestHarness};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mutant", about = "Mutation testing for documentation examples")]
struct Cli {
    /// Serialised module (`.json` or bincode), or `example` for the built-in demo
    module: String,

    /// Stop each function/strategy pair at its first escaped mutant
    #[arg(long, default_value_t = false)]
    stop_on_escape: bool,

    /// Seed for random literal replacement
    #[arg(long)]
    seed: Option<u64>,

    /// Print the full report as JSON instead of `(escaped, attempted)`
    #[arg(long, default_value_t = false)]
    json: bool,

    /// JSON configuration file; flags given here take precedence
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<MutantConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => MutantConfig::default(),
    };

    if cli.stop_on_escape {
        config.mutation.stop_on_escape = true;
    }
    if cli.seed.is_some() {
        config.mutation.seed = cli.seed;
    }
    Ok(config)
}

fn load_module(name: &str) -> Result<Module> {
    if name == demo::MODULE_NAME {
        return Ok(demo::example_module()?);
    }
    let path = Path::new(name);
    let spec = ModuleSpec::load(path).with_context(|| format!("loading module {}", path.display()))?;
    Ok(spec.into_module()?)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    telemetry::init_telemetry(cli.json)?;

    let config = load_config(&cli)?;
    let module = load_module(&cli.module)?;
    let harness = DocTestHarness::new(config.runtime.clone());

    info!("Testing module {} ({} functions)", module.name(), module.len());
    let report = testmod(&module, &harness, &config.mutation)?;

    if let Err(e) = report.check_baseline() {
        warn!("{}", e);
        if !config.harness.quiet {
            // Rerun loudly so the failing examples are logged.
            harness.run(&module, false)?;
        }
        println!("Un-mutated tests fail.");
        return Ok(ExitCode::FAILURE);
    }

    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report);
    }
    Ok(ExitCode::SUCCESS)
}
