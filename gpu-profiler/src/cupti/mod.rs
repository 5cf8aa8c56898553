//! CUDA CUPTI integration
//!
//! Callback selection for launch, graph, resource and NVTX events, and the
//! PC sampling session driver.

pub mod bindings;
pub mod buffer;
pub mod callbacks;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(feature = "cuda")]
pub mod native;
pub mod pcsampling;
pub mod session;
pub mod transport;

pub use buffer::{DataBufferPtr, SamplingBuffer};
pub use callbacks::{is_driver_api_launch, Catalog, CATALOGS};
pub use pcsampling::{
    CollectionMode, ConfigurationAttribute, OutputDataFormat, Strictness,
};
pub use session::{PcSamplingSession, SessionState};
pub use transport::CuptiApi;
