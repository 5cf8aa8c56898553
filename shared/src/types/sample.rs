//! PC sampling record types
//!
//! Owned copies of what the vendor writes into a sampling buffer. These carry no
//! pointers and can be stored, serialized, or sent across threads freely.

use serde::{Deserialize, Serialize};

/// Samples attributed to one stall reason at a program counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StallReasonCount {
    /// Vendor stall-reason index
    pub index: u32,

    /// Number of samples observed for this reason
    pub samples: u32,
}

/// A stall reason supported by a device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StallReasonInfo {
    /// Vendor stall-reason index
    pub index: u32,

    /// Vendor counter name (e.g. `smsp__pcsamp_warps_issue_stalled_barrier`)
    pub name: String,
}

/// One program counter record copied out of a sampling buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcSample {
    /// Checksum of the binary the PC belongs to
    pub cubin_crc: u64,

    /// Offset of the PC within the function
    pub pc_offset: u64,

    /// Index of the function within the binary
    pub function_index: u32,

    /// Function name, if the vendor reported one
    pub function_name: Option<String>,

    /// Correlation ID of the launch that produced the sample
    pub correlation_id: u32,

    /// Per-stall-reason sample counts
    pub stall_reasons: Vec<StallReasonCount>,
}

impl PcSample {
    /// Total samples across all stall reasons
    pub fn total_samples(&self) -> u64 {
        self.stall_reasons.iter().map(|r| r.samples as u64).sum()
    }
}

/// Header fields of a sampling buffer after a retrieval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingSummary {
    /// Samples collected in this retrieval
    pub total_samples: u64,

    /// Samples the hardware could not store
    pub dropped_samples: u64,

    /// PC records written into the buffer
    pub total_num_pcs: usize,

    /// PC records still pending in the vendor's buffers
    pub remaining_num_pcs: usize,

    /// Range the samples belong to (start/stop control)
    pub range_id: u64,

    /// Samples taken in kernels not owned by the user
    pub non_user_kernels_total_samples: u64,

    /// Whether the hardware buffer overflowed
    pub hardware_buffer_full: bool,
}

impl SamplingSummary {
    /// Whether all pending records have been retrieved
    pub fn is_drained(&self) -> bool {
        self.remaining_num_pcs == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_samples() {
        let sample = PcSample {
            cubin_crc: 0xdead_beef,
            pc_offset: 0x40,
            function_index: 0,
            function_name: Some("matmul_kernel".to_string()),
            correlation_id: 3,
            stall_reasons: vec![
                StallReasonCount { index: 0, samples: 4 },
                StallReasonCount { index: 2, samples: 6 },
            ],
        };
        assert_eq!(sample.total_samples(), 10);
    }

    #[test]
    fn test_summary_json_shape() {
        let summary = SamplingSummary {
            total_samples: 50,
            remaining_num_pcs: 30,
            ..Default::default()
        };
        assert!(!summary.is_drained());

        let value = serde_json::to_value(summary).unwrap();
        assert_eq!(value["total_samples"], 50);
        assert_eq!(value["remaining_num_pcs"], 30);
        assert_eq!(value["hardware_buffer_full"], false);
    }
}
