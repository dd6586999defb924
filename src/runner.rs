//! Headless CLI runner: loads a configuration file, runs the engine to
//! completion synchronously (no host pacing), and optionally writes the
//! history report.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::config::SimulationConfig;
use crate::engine::{SimulationEngine, SimulationStatus};
use crate::error::TbError;
use crate::log::{info, set_log_level, LevelFilter};
use crate::report::write_history;

/// Default cli arguments for the tbsim runner
#[derive(Parser, Debug)]
#[command(name = "tbsim")]
pub struct BaseArgs {
    /// Optional path to a JSON configuration file; defaults apply otherwise
    #[arg(short, long, default_value = "")]
    pub config: String,

    /// Optional path for the CSV history report
    #[arg(short, long, default_value = "")]
    pub output: String,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(short, long, default_value = "off")]
    pub log_level: String,
}

fn parse_level(level: &str) -> Result<LevelFilter, TbError> {
    level
        .parse::<LevelFilter>()
        .map_err(|_| TbError::InvalidConfig(format!("unknown log level '{level}'")))
}

/// Runs a simulation described by `args` to completion and returns the
/// finished engine for inspection.
pub fn run(args: &BaseArgs) -> Result<SimulationEngine, TbError> {
    set_log_level(parse_level(&args.log_level)?);

    let config = if args.config.is_empty() {
        SimulationConfig::default()
    } else {
        info!("loading configuration from {}", args.config);
        SimulationConfig::from_file(Path::new(&args.config))?
    };

    let mut engine = SimulationEngine::new(config)?;
    engine.start();
    while engine.step()? == SimulationStatus::Running {}

    if !args.output.is_empty() {
        let path = PathBuf::from(&args.output);
        write_history(&path, engine.history())?;
        info!("wrote {} history rows to {}", engine.history().len(), args.output);
    }

    Ok(engine)
}

/// Parses command line arguments and runs the simulation.
pub fn run_with_args() -> Result<SimulationEngine, Box<dyn std::error::Error>> {
    let args = BaseArgs::parse();
    Ok(run(&args)?)
}
