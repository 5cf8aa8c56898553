//! Vendor transport selection

use anyhow::Result;
use gpuscope_cupti::CuptiApi;

/// The CUPTI implementation for commands that call into the vendor library
#[cfg(feature = "cuda")]
pub fn cupti() -> Result<Box<dyn CuptiApi>> {
    Ok(Box::new(gpuscope_cupti::cupti::native::NativeCupti::new()))
}

#[cfg(not(feature = "cuda"))]
pub fn cupti() -> Result<Box<dyn CuptiApi>> {
    anyhow::bail!("gpuscope was built without CUPTI support; rebuild with `--features cuda`")
}
