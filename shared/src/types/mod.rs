//! Value types exchanged between the instrumentation core and its callers

pub mod callback;
pub mod sample;
pub mod source;
