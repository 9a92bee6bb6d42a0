//! `page-collector`: command-line front end of the collection engine.

mod cli;
mod pipeline;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use collector_logging::{collector_info, LogDestination};

use cli::Args;
use settings::AppConfig;

fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::from_args(&args)?;

    if args.print_config {
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default())
            .context("serializing configuration")?;
        println!("{text}");
        return Ok(());
    }

    let destination = match &args.log_file {
        Some(path) => LogDestination::Both(path.clone()),
        None => LogDestination::Terminal,
    };
    if !collector_logging::initialize(destination, args.log_level()) {
        eprintln!("warning: logging could not be initialized");
    }
    collector_info!("page-collector {} starting", env!("CARGO_PKG_VERSION"));

    let (run, files) = pipeline::run(&config)?;
    println!("{}", pipeline::summary(&run, &files));
    Ok(())
}
