//! Error types for the CUPTI core

use crate::cupti::bindings::CuptiResult;
use crate::cupti::session::SessionState;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CuptiError>;

#[derive(Debug, Error)]
pub enum CuptiError {
    /// A CUPTI call returned a failure code
    #[error("{call} failed: {result}")]
    Api {
        call: &'static str,
        result: CuptiResult,
    },

    /// A session operation was attempted from the wrong state
    #[error("cannot {op} a PC sampling session that is {state}")]
    InvalidTransition {
        op: &'static str,
        state: SessionState,
    },

    #[error("failed to allocate PC sampling buffer ({collect_num_pcs} PCs x {num_stall_reasons} stall reasons)")]
    Allocation {
        collect_num_pcs: usize,
        num_stall_reasons: usize,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid sampling configuration: {0}")]
    Config(String),
}

impl CuptiError {
    /// Vendor result code, if the error came from CUPTI
    pub fn result(&self) -> Option<CuptiResult> {
        match self {
            Self::Api { result, .. } => Some(*result),
            _ => None,
        }
    }
}

/// Turn a vendor result code into a `Result`
pub(crate) fn check(call: &'static str, result: CuptiResult) -> Result<()> {
    if result.is_success() {
        Ok(())
    } else {
        Err(CuptiError::Api { call, result })
    }
}
