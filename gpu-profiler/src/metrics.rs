//! PC sample aggregation

use gpuscope_shared::{PcSample, SamplingSummary};
use serde::Serialize;
use std::collections::HashMap;

/// Sample totals for one PC
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hotspot {
    pub cubin_crc: u64,
    pub pc_offset: u64,
    pub function_name: Option<String>,
    pub samples: u64,
}

#[derive(Debug, Default)]
struct PcTotals {
    function_name: Option<String>,
    samples: u64,
}

/// Accumulates retrieved PC samples across buffer fills
#[derive(Debug, Default)]
pub struct SampleAggregator {
    total_samples: u64,
    dropped_samples: u64,
    retrievals: usize,
    by_pc: HashMap<(u64, u64), PcTotals>,
    by_stall_reason: HashMap<u32, u64>,
}

impl SampleAggregator {
    /// Create a new aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the header counters of one retrieval
    pub fn add_summary(&mut self, summary: &SamplingSummary) {
        self.total_samples += summary.total_samples;
        self.dropped_samples += summary.dropped_samples;
        self.retrievals += 1;
    }

    /// Add the records of one retrieval
    pub fn add_samples(&mut self, samples: impl IntoIterator<Item = PcSample>) {
        for sample in samples {
            let total = sample.total_samples();
            let entry = self
                .by_pc
                .entry((sample.cubin_crc, sample.pc_offset))
                .or_default();
            entry.samples += total;
            if entry.function_name.is_none() {
                entry.function_name = sample.function_name;
            }

            for reason in &sample.stall_reasons {
                *self.by_stall_reason.entry(reason.index).or_default() +=
                    u64::from(reason.samples);
            }
        }
    }

    /// Samples reported by the buffer headers
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    pub fn retrievals(&self) -> usize {
        self.retrievals
    }

    /// Distinct PCs seen
    pub fn num_pcs(&self) -> usize {
        self.by_pc.len()
    }

    /// Samples per stall reason index, sorted by index
    pub fn stall_reason_totals(&self) -> Vec<(u32, u64)> {
        let mut totals: Vec<_> = self
            .by_stall_reason
            .iter()
            .map(|(&index, &samples)| (index, samples))
            .collect();
        totals.sort_unstable();
        totals
    }

    /// The `n` PCs with the most samples, hottest first
    pub fn hotspots(&self, n: usize) -> Vec<Hotspot> {
        let mut hotspots: Vec<Hotspot> = self
            .by_pc
            .iter()
            .map(|(&(cubin_crc, pc_offset), totals)| Hotspot {
                cubin_crc,
                pc_offset,
                function_name: totals.function_name.clone(),
                samples: totals.samples,
            })
            .collect();

        hotspots.sort_by(|a, b| {
            b.samples
                .cmp(&a.samples)
                .then(a.cubin_crc.cmp(&b.cubin_crc))
                .then(a.pc_offset.cmp(&b.pc_offset))
        });
        hotspots.truncate(n);
        hotspots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuscope_shared::StallReasonCount;

    fn sample(pc_offset: u64, reasons: &[(u32, u32)]) -> PcSample {
        PcSample {
            cubin_crc: 0xabc,
            pc_offset,
            function_index: 0,
            function_name: Some("gemm".to_string()),
            correlation_id: 0,
            stall_reasons: reasons
                .iter()
                .map(|&(index, samples)| StallReasonCount { index, samples })
                .collect(),
        }
    }

    #[test]
    fn test_totals_across_retrievals() {
        let mut agg = SampleAggregator::new();
        agg.add_summary(&SamplingSummary {
            total_samples: 7,
            dropped_samples: 1,
            ..Default::default()
        });
        agg.add_summary(&SamplingSummary {
            total_samples: 3,
            ..Default::default()
        });

        assert_eq!(agg.total_samples(), 10);
        assert_eq!(agg.dropped_samples(), 1);
        assert_eq!(agg.retrievals(), 2);
    }

    #[test]
    fn test_same_pc_merges() {
        let mut agg = SampleAggregator::new();
        agg.add_samples(vec![sample(0x10, &[(0, 2)]), sample(0x20, &[(1, 1)])]);
        agg.add_samples(vec![sample(0x10, &[(0, 3), (2, 1)])]);

        assert_eq!(agg.num_pcs(), 2);
        assert_eq!(agg.stall_reason_totals(), vec![(0, 5), (1, 1), (2, 1)]);
    }

    #[test]
    fn test_hotspots_ordering() {
        let mut agg = SampleAggregator::new();
        agg.add_samples(vec![
            sample(0x30, &[(0, 1)]),
            sample(0x10, &[(0, 9)]),
            sample(0x20, &[(0, 4)]),
        ]);

        let top = agg.hotspots(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].pc_offset, 0x10);
        assert_eq!(top[0].samples, 9);
        assert_eq!(top[1].pc_offset, 0x20);
        assert!(agg.hotspots(0).is_empty());
    }
}
