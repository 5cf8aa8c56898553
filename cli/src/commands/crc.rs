//! Crc command implementation

use crate::backend;
use anyhow::{Context, Result};
use clap::Args;
use gpuscope_cupti::cupti::pcsampling;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CrcArgs {
    /// Path to the cubin
    pub cubin: PathBuf,
}

pub fn run(args: CrcArgs) -> Result<()> {
    let cubin = std::fs::read(&args.cubin)
        .with_context(|| format!("Failed to read {}", args.cubin.display()))?;
    let api = backend::cupti()?;

    let crc = pcsampling::get_cubin_crc(&*api, &cubin).context("Failed to compute cubin CRC")?;
    println!("{:#018x}  {}", crc, args.cubin.display());

    Ok(())
}
