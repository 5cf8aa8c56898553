//! Correlate command implementation

use crate::{backend, output};
use anyhow::{Context, Result};
use clap::Args;
use gpuscope_cupti::cupti::pcsampling;
use gpuscope_cupti::Strictness;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CorrelateArgs {
    /// Path to the cubin
    pub cubin: PathBuf,

    /// Mangled name of the function containing the PC
    #[arg(short, long)]
    pub function: String,

    /// PC offset within the function (decimal or 0x-prefixed hex)
    #[arg(short, long, value_parser = parse_offset)]
    pub offset: u64,

    /// Fail when the cubin has no line information for the offset
    #[arg(long)]
    pub strict: bool,
}

fn parse_offset(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid offset {s:?}: {e}"))
}

pub fn run(args: CorrelateArgs) -> Result<()> {
    let cubin = std::fs::read(&args.cubin)
        .with_context(|| format!("Failed to read {}", args.cubin.display()))?;
    let api = backend::cupti()?;

    let strictness = if args.strict {
        Strictness::Strict
    } else {
        Strictness::Lenient
    };
    let location = pcsampling::get_sass_to_source_correlation(
        &*api,
        &args.function,
        args.offset,
        &cubin,
        strictness,
    )
    .with_context(|| format!("Failed to correlate {}+{:#x}", args.function, args.offset))?;

    if location.is_resolved() {
        output::success(&format!("{}+{:#x} -> {}", args.function, args.offset, location));
    } else {
        output::warning(&format!(
            "No line information for {}+{:#x}",
            args.function, args.offset
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("0x1f0").unwrap(), 0x1f0);
        assert_eq!(parse_offset("0X10").unwrap(), 16);
        assert_eq!(parse_offset("64").unwrap(), 64);
        assert!(parse_offset("0xzz").is_err());
        assert!(parse_offset("").is_err());
    }
}
