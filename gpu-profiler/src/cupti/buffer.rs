//! PC sampling data buffer
//!
//! [`SamplingBuffer`] owns a `CUpti_PCSamplingData` header, its array of PC
//! records and one stall-reason array per record. The layout is exactly what
//! CUPTI expects, so the header pointer can be handed to `GetData` (or bound as
//! the sampling data buffer attribute) and CUPTI fills it in place.
//!
//! All three allocations are kept behind raw pointers for the buffer's whole
//! life: CUPTI writes through pointers it was given, so the buffer never
//! re-borrows them through a `Box` while they are shared with the vendor.

use super::bindings::{PcSamplingData, PcSamplingPcData, PcSamplingStallReason};
use super::transport::{CuptiApi, VendorString};
use crate::error::{CuptiError, Result};
use gpuscope_shared::{PcSample, SamplingSummary, StallReasonCount};
use std::ffi::c_void;
use std::mem::size_of;
use std::ptr::{self, NonNull};
use std::slice;
use tracing::{info, warn};

/// Header address of a [`SamplingBuffer`], as bound through configuration
///
/// Only obtainable from [`SamplingBuffer::as_data_buffer_ptr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBufferPtr(NonNull<c_void>);

impl DataBufferPtr {
    pub(crate) fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Caller-owned buffer CUPTI fills with PC samples
///
/// Capacity is fixed at allocation. The buffer can be refilled any number of
/// times, across start/stop cycles, as long as the device's stall-reason count
/// does not exceed the per-record capacity it was allocated with.
///
/// CUPTI allocates a function name for every record it writes. Those names are
/// released by [`take_samples`](Self::take_samples), by
/// [`release_vendor_strings`](Self::release_vendor_strings), or before the next
/// retrieval; dropping a buffer that still holds them leaks them.
#[derive(Debug)]
pub struct SamplingBuffer {
    data: NonNull<PcSamplingData>,
    pc_data: NonNull<PcSamplingPcData>,
    stall_reasons: Vec<NonNull<PcSamplingStallReason>>,
    collect_num_pcs: usize,
    num_stall_reasons: usize,
}

// SAFETY: the buffer exclusively owns every allocation it points to, like a Box.
unsafe impl Send for SamplingBuffer {}

fn zeroed_slice<T: Clone + Default>(len: usize) -> Option<Box<[T]>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).ok()?;
    v.resize(len, T::default());
    Some(v.into_boxed_slice())
}

fn leak_slice<T>(slice: Box<[T]>) -> NonNull<T> {
    NonNull::from(Box::leak(slice)).cast()
}

impl SamplingBuffer {
    /// Allocate a zeroed buffer for `collect_num_pcs` PC records with room for
    /// `num_stall_reasons` stall-reason counts each
    pub fn new(collect_num_pcs: usize, num_stall_reasons: usize) -> Result<Self> {
        if collect_num_pcs == 0 {
            return Err(CuptiError::InvalidArgument(
                "PC sampling buffer needs room for at least one PC".to_string(),
            ));
        }

        let alloc_err = || CuptiError::Allocation {
            collect_num_pcs,
            num_stall_reasons,
        };

        // Build everything as owned boxes first so a failure halfway frees what
        // was already allocated.
        let mut reasons: Vec<Box<[PcSamplingStallReason]>> = Vec::new();
        reasons
            .try_reserve_exact(collect_num_pcs)
            .map_err(|_| alloc_err())?;
        for _ in 0..collect_num_pcs {
            reasons.push(zeroed_slice(num_stall_reasons).ok_or_else(alloc_err)?);
        }
        let mut pc_data =
            zeroed_slice::<PcSamplingPcData>(collect_num_pcs).ok_or_else(alloc_err)?;
        let mut stall_reasons = Vec::new();
        stall_reasons
            .try_reserve_exact(collect_num_pcs)
            .map_err(|_| alloc_err())?;

        for (entry, reasons) in pc_data.iter_mut().zip(reasons) {
            let reasons = leak_slice(reasons);
            entry.stall_reason = reasons.as_ptr();
            stall_reasons.push(reasons);
        }
        let pc_data = leak_slice(pc_data);

        let data = Box::new(PcSamplingData {
            size: size_of::<PcSamplingData>(),
            collect_num_pcs,
            p_pc_data: pc_data.as_ptr(),
            ..Default::default()
        });

        info!(
            "Allocated PC sampling buffer: {} PCs x {} stall reasons",
            collect_num_pcs, num_stall_reasons
        );

        Ok(Self {
            data: NonNull::from(Box::leak(data)),
            pc_data,
            stall_reasons,
            collect_num_pcs,
            num_stall_reasons,
        })
    }

    fn header(&self) -> &PcSamplingData {
        // SAFETY: `data` is a live allocation owned by self; the vendor only
        // writes to it during calls that hold `&mut self`.
        unsafe { self.data.as_ref() }
    }

    fn entries_mut(&mut self) -> &mut [PcSamplingPcData] {
        // SAFETY: `pc_data` points at `collect_num_pcs` records owned by self.
        unsafe { slice::from_raw_parts_mut(self.pc_data.as_ptr(), self.collect_num_pcs) }
    }

    /// Raw header pointer handed to CUPTI
    pub(crate) fn as_raw(&mut self) -> *mut PcSamplingData {
        self.data.as_ptr()
    }

    /// Header pointer for the sampling-data-buffer configuration attribute
    ///
    /// # Safety
    ///
    /// Once the pointer is applied with
    /// [`ConfigurationAttribute::SamplingDataBuffer`](super::pcsampling::ConfigurationAttribute::SamplingDataBuffer),
    /// CUPTI writes into this buffer whenever sampling stops. The buffer must
    /// not be dropped until PC sampling on that context is disabled, and must
    /// not be read while a stop is in progress.
    pub unsafe fn as_data_buffer_ptr(&mut self) -> DataBufferPtr {
        DataBufferPtr(self.data.cast())
    }

    /// Number of PC records the buffer can hold
    pub fn collect_num_pcs(&self) -> usize {
        self.collect_num_pcs
    }

    /// Number of stall-reason counts each record can hold
    pub fn num_stall_reasons(&self) -> usize {
        self.num_stall_reasons
    }

    pub fn total_samples(&self) -> u64 {
        self.header().total_samples
    }

    pub fn dropped_samples(&self) -> u64 {
        self.header().dropped_samples
    }

    /// PC records written by the last retrieval
    pub fn total_num_pcs(&self) -> usize {
        self.header().total_num_pcs
    }

    /// PC records CUPTI still holds after the last retrieval
    pub fn remaining_num_pcs(&self) -> usize {
        self.header().remaining_num_pcs
    }

    pub fn range_id(&self) -> u64 {
        self.header().range_id
    }

    pub fn hardware_buffer_full(&self) -> bool {
        self.header().hardware_buffer_full != 0
    }

    /// Snapshot of the header fields after a retrieval
    pub fn summary(&self) -> SamplingSummary {
        let header = self.header();
        SamplingSummary {
            total_samples: header.total_samples,
            dropped_samples: header.dropped_samples,
            total_num_pcs: header.total_num_pcs,
            remaining_num_pcs: header.remaining_num_pcs,
            range_id: header.range_id,
            non_user_kernels_total_samples: header.non_usr_kernels_total_samples,
            hardware_buffer_full: header.hardware_buffer_full != 0,
        }
    }

    /// The PC records, including ones not written by the last retrieval
    pub fn entries(&self) -> &[PcSamplingPcData] {
        // SAFETY: `pc_data` points at `collect_num_pcs` records owned by self.
        unsafe { slice::from_raw_parts(self.pc_data.as_ptr(), self.collect_num_pcs) }
    }

    /// Full stall-reason array of record `index`, sized to the buffer's capacity
    pub fn stall_reasons(&self, index: usize) -> Option<&[PcSamplingStallReason]> {
        let reasons = self.stall_reasons.get(index)?;
        // SAFETY: each array holds `num_stall_reasons` entries owned by self.
        Some(unsafe { slice::from_raw_parts(reasons.as_ptr(), self.num_stall_reasons) })
    }

    /// Copy the records written by the last retrieval and release the function
    /// names CUPTI allocated for them
    ///
    /// Header counters are left untouched; calling this twice yields the same
    /// records without function names.
    pub fn take_samples<A: CuptiApi + ?Sized>(&mut self, api: &A) -> Vec<PcSample> {
        let filled = self.total_num_pcs().min(self.collect_num_pcs);
        let num_stall_reasons = self.num_stall_reasons;
        let mut samples = Vec::with_capacity(filled);

        for (i, entry) in self.entries_mut().iter_mut().take(filled).enumerate() {
            let name_ptr = std::mem::replace(&mut entry.function_name, ptr::null_mut());
            let name = VendorString::new(api, name_ptr);
            let count = entry.stall_reason_count.min(num_stall_reasons);
            let stall_reasons = if count == 0 || entry.stall_reason.is_null() {
                Vec::new()
            } else {
                // SAFETY: `stall_reason` points at this record's array of
                // `num_stall_reasons` entries and `count` is clamped to it.
                unsafe { slice::from_raw_parts(entry.stall_reason, count) }
                    .iter()
                    .map(|r| StallReasonCount {
                        index: r.pc_sampling_stall_reason_index,
                        samples: r.samples,
                    })
                    .collect()
            };

            if count < entry.stall_reason_count {
                warn!(
                    "PC record {} reports {} stall reasons, buffer holds {}",
                    i, entry.stall_reason_count, num_stall_reasons
                );
            }

            samples.push(PcSample {
                cubin_crc: entry.cubin_crc,
                pc_offset: entry.pc_offset,
                function_index: entry.function_index,
                function_name: name.to_option(),
                correlation_id: entry.correlation_id,
                stall_reasons,
            });
        }

        samples
    }

    /// Free every function name CUPTI left in the records, returning how many
    pub fn release_vendor_strings<A: CuptiApi + ?Sized>(&mut self, api: &A) -> usize {
        let mut released = 0;
        for entry in self.entries_mut() {
            if !entry.function_name.is_null() {
                let name_ptr = std::mem::replace(&mut entry.function_name, ptr::null_mut());
                drop(VendorString::new(api, name_ptr));
                released += 1;
            }
        }
        released
    }
}

impl Drop for SamplingBuffer {
    fn drop(&mut self) {
        let leaked = self
            .entries()
            .iter()
            .filter(|e| !e.function_name.is_null())
            .count();
        if leaked > 0 {
            warn!(
                "Dropping PC sampling buffer with {} unreleased vendor function names",
                leaked
            );
        }

        // SAFETY: each pointer came from `Box::leak` in `new` with these lengths
        // and is reclaimed exactly once here.
        unsafe {
            for reasons in &self.stall_reasons {
                drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                    reasons.as_ptr(),
                    self.num_stall_reasons,
                )));
            }
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                self.pc_data.as_ptr(),
                self.collect_num_pcs,
            )));
            drop(Box::from_raw(self.data.as_ptr()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_capacity_and_zeroed() {
        let buffer = SamplingBuffer::new(8, 3).unwrap();

        assert_eq!(buffer.collect_num_pcs(), 8);
        assert_eq!(buffer.num_stall_reasons(), 3);
        assert_eq!(buffer.summary(), SamplingSummary::default());
        assert_eq!(buffer.entries().len(), 8);

        for (i, entry) in buffer.entries().iter().enumerate() {
            assert_eq!(entry.cubin_crc, 0);
            assert_eq!(entry.pc_offset, 0);
            assert_eq!(entry.stall_reason_count, 0);
            assert!(entry.function_name.is_null());
            assert!(!entry.stall_reason.is_null());

            let reasons = buffer.stall_reasons(i).unwrap();
            assert_eq!(reasons.len(), 3);
            assert!(reasons.iter().all(|r| *r == PcSamplingStallReason::default()));
        }
        assert!(buffer.stall_reasons(8).is_none());
    }

    #[test]
    fn test_header_points_at_records() {
        let mut buffer = SamplingBuffer::new(4, 2).unwrap();
        let records = buffer.entries().as_ptr();
        // SAFETY: reading the header of a live buffer.
        let header = unsafe { &*buffer.as_raw() };
        assert_eq!(header.size, size_of::<PcSamplingData>());
        assert_eq!(header.collect_num_pcs, 4);
        assert_eq!(header.p_pc_data as *const _, records);
    }

    #[test]
    fn test_zero_pcs_rejected() {
        assert!(matches!(
            SamplingBuffer::new(0, 4),
            Err(CuptiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_zero_stall_reasons_allowed() {
        let buffer = SamplingBuffer::new(2, 0).unwrap();
        assert_eq!(buffer.stall_reasons(1).unwrap().len(), 0);
    }

    #[test]
    fn test_data_buffer_ptr_is_header() {
        let mut buffer = SamplingBuffer::new(2, 2).unwrap();
        let header = buffer.as_raw();
        // SAFETY: the pointer is only compared, never bound to a context.
        let bound = unsafe { buffer.as_data_buffer_ptr() };
        assert_eq!(bound.as_ptr(), header.cast::<c_void>());
    }

    #[test]
    fn test_buffer_survives_move() {
        let buffer = SamplingBuffer::new(2, 2).unwrap();
        let before = buffer.entries().as_ptr();
        let moved = Box::new(buffer);
        assert_eq!(moved.entries().as_ptr(), before);
    }
}
