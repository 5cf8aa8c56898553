//! Shared types for gpuscope
//!
//! Plain data carried between the CUPTI instrumentation core, the CLI, and
//! whatever orchestrates a profiling run: callback domains, PC samples, and
//! source correlation results.

pub mod types;

// Re-export commonly used types
pub use types::{callback::*, sample::*, source::*};
