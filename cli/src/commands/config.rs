//! Config command implementation

use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use gpuscope_cupti::SamplingConfig;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Path to a TOML or JSON sampling config
    pub path: PathBuf,

    /// Print the resolved config as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    let config = SamplingConfig::load(&args.path)
        .with_context(|| format!("Invalid config {}", args.path.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    output::success(&format!("{} is valid", args.path.display()));
    output::field("sampling_period", config.sampling_period);
    output::field("collect_num_pcs", config.collect_num_pcs);
    output::field("scratch_buffer_size", config.scratch_buffer_size);
    output::field("hardware_buffer_size", config.hardware_buffer_size);
    output::field("collection_mode", format!("{:?}", config.collection_mode));

    println!("Attributes:");
    for attribute in config.attributes() {
        println!("  {:?}", attribute);
    }

    Ok(())
}
