//! Catalogs command implementation

use crate::output;
use anyhow::Result;
use clap::Args;
use gpuscope_cupti::cupti::callbacks::{is_driver_api_launch, CATALOGS};
use gpuscope_shared::CallbackDomain;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct CatalogsArgs {
    /// Print catalogs as JSON
    #[arg(long)]
    pub json: bool,

    /// Report whether a driver API callback id is a kernel launch
    #[arg(long, value_name = "CBID")]
    pub check: Option<u32>,
}

#[derive(Serialize)]
struct CatalogEntry {
    name: &'static str,
    domain: CallbackDomain,
    ids: &'static [u32],
}

pub fn run(args: CatalogsArgs) -> Result<()> {
    if let Some(cbid) = args.check {
        if is_driver_api_launch(cbid) {
            output::success(&format!("driver callback {} is a kernel launch", cbid));
        } else {
            output::info(&format!("driver callback {} is not a kernel launch", cbid));
        }
        return Ok(());
    }

    let entries: Vec<CatalogEntry> = CATALOGS
        .iter()
        .map(|c| CatalogEntry {
            name: c.name,
            domain: c.domain,
            ids: c.ids,
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        println!("{} ({} domain, {} ids)", entry.name, entry.domain, entry.ids.len());
        let ids: Vec<String> = entry.ids.iter().map(u32::to_string).collect();
        println!("  {}", ids.join(", "));
    }

    Ok(())
}
