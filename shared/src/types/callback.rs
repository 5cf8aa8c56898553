//! Callback domain definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// CUPTI callback domain
///
/// Discriminants are the vendor's `CUpti_CallbackDomain` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum CallbackDomain {
    /// CUDA driver API functions
    DriverApi = 1,
    /// CUDA runtime API functions
    RuntimeApi = 2,
    /// Resource tracking (contexts, streams, modules, graphs)
    Resource = 3,
    /// Synchronization events
    Synchronize = 4,
    /// NVTX markers and ranges
    Nvtx = 5,
}

impl CallbackDomain {
    /// Raw vendor value of the domain
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Look up a domain from its raw vendor value
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::DriverApi),
            2 => Some(Self::RuntimeApi),
            3 => Some(Self::Resource),
            4 => Some(Self::Synchronize),
            5 => Some(Self::Nvtx),
            _ => None,
        }
    }

    /// Short human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::DriverApi => "driver_api",
            Self::RuntimeApi => "runtime_api",
            Self::Resource => "resource",
            Self::Synchronize => "synchronize",
            Self::Nvtx => "nvtx",
        }
    }
}

impl fmt::Display for CallbackDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip() {
        for domain in [
            CallbackDomain::DriverApi,
            CallbackDomain::RuntimeApi,
            CallbackDomain::Resource,
            CallbackDomain::Synchronize,
            CallbackDomain::Nvtx,
        ] {
            assert_eq!(CallbackDomain::from_raw(domain.raw()), Some(domain));
        }
        assert_eq!(CallbackDomain::from_raw(0), None);
    }

    #[test]
    fn test_serde_name() {
        let json = serde_json::to_string(&CallbackDomain::DriverApi).unwrap();
        assert_eq!(json, "\"driver_api\"");
    }
}
