//! GPU profiling through CUPTI
//!
//! Selects the CUPTI callbacks a profiler subscribes to and drives PC sampling
//! sessions: buffer allocation, the enable/start/stop state machine, data
//! retrieval and SASS to source correlation.
//!
//! Every vendor call goes through the [`CuptiApi`] trait. Build with the
//! `cuda` feature for the `libcupti` backed implementation, or the `mock`
//! feature for an in-memory one.

pub mod config;
pub mod cupti;
pub mod error;
pub mod metrics;

pub use crate::config::SamplingConfig;
pub use cupti::{
    CollectionMode, ConfigurationAttribute, CuptiApi, PcSamplingSession, SamplingBuffer,
    SessionState, Strictness,
};
pub use error::{CuptiError, Result};
pub use metrics::{Hotspot, SampleAggregator};
