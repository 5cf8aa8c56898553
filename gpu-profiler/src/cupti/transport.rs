//! Dispatch layer between the core and the CUPTI library
//!
//! The core never calls CUPTI directly: every vendor entry point goes through a
//! [`CuptiApi`] implementation. [`NativeCupti`](super::native::NativeCupti)
//! forwards to `libcupti`; [`MockCupti`](super::mock::MockCupti) models the
//! vendor state machine in memory.

use super::bindings::*;
use std::ffi::{c_char, CStr};

/// One method per CUPTI entry point the core consumes
///
/// Methods return the raw vendor result code; turning it into an error is the
/// caller's job.
///
/// # Safety
///
/// Every method is `unsafe` because the parameter records carry raw pointers.
/// Callers must ensure each pointer in a record is either null where CUPTI
/// permits it or valid for the reads and writes CUPTI performs, for the
/// duration of the call, and that the record's `size` tag is set.
pub trait CuptiApi {
    /// `cuptiEnableCallback`
    unsafe fn enable_callback(
        &self,
        enable: u32,
        subscriber: SubscriberHandle,
        domain: CallbackDomain,
        cbid: CallbackId,
    ) -> CuptiResult;

    /// `cuptiGetCubinCrc`
    unsafe fn get_cubin_crc(&self, params: &mut GetCubinCrcParams) -> CuptiResult;

    /// `cuptiPCSamplingGetNumStallReasons`
    unsafe fn pc_sampling_get_num_stall_reasons(
        &self,
        params: &mut PcSamplingGetNumStallReasonsParams,
    ) -> CuptiResult;

    /// `cuptiPCSamplingGetStallReasons`
    unsafe fn pc_sampling_get_stall_reasons(
        &self,
        params: &mut PcSamplingGetStallReasonsParams,
    ) -> CuptiResult;

    /// `cuptiGetSassToSourceCorrelation`
    unsafe fn get_sass_to_source_correlation(
        &self,
        params: &mut GetSassToSourceCorrelationParams,
    ) -> CuptiResult;

    /// `cuptiPCSamplingEnable`
    unsafe fn pc_sampling_enable(&self, params: &mut PcSamplingEnableParams) -> CuptiResult;

    /// `cuptiPCSamplingDisable`
    unsafe fn pc_sampling_disable(&self, params: &mut PcSamplingDisableParams) -> CuptiResult;

    /// `cuptiPCSamplingStart`
    unsafe fn pc_sampling_start(&self, params: &mut PcSamplingStartParams) -> CuptiResult;

    /// `cuptiPCSamplingStop`
    unsafe fn pc_sampling_stop(&self, params: &mut PcSamplingStopParams) -> CuptiResult;

    /// `cuptiPCSamplingGetData`
    unsafe fn pc_sampling_get_data(&self, params: &mut PcSamplingGetDataParams) -> CuptiResult;

    /// `cuptiPCSamplingSetConfigurationAttribute`
    unsafe fn pc_sampling_set_configuration_attribute(
        &self,
        params: &mut PcSamplingConfigurationInfoParams,
    ) -> CuptiResult;

    /// Release a string CUPTI allocated and handed to the caller
    ///
    /// `ptr` must be non-null, vendor-allocated, and not freed before.
    unsafe fn free_vendor_string(&self, ptr: *mut c_char);
}

/// A string allocated by CUPTI, released exactly once when dropped
///
/// Wrap every vendor-owned pointer as soon as the call that produced it
/// returns, before looking at the result code, so early returns cannot leak it.
pub(crate) struct VendorString<'a, A: CuptiApi + ?Sized> {
    api: &'a A,
    ptr: *mut c_char,
}

impl<'a, A: CuptiApi + ?Sized> VendorString<'a, A> {
    /// Take ownership of `ptr`, which may be null
    pub(crate) fn new(api: &'a A, ptr: *mut c_char) -> Self {
        Self { api, ptr }
    }

    /// Copy the string out, `None` when the vendor returned null
    pub(crate) fn to_option(&self) -> Option<String> {
        if self.ptr.is_null() {
            return None;
        }
        // SAFETY: non-null vendor strings are NUL-terminated and stay alive until drop.
        let s = unsafe { CStr::from_ptr(self.ptr) };
        Some(s.to_string_lossy().into_owned())
    }

    /// Copy the string out, empty when the vendor returned null
    pub(crate) fn to_string_lossy(&self) -> String {
        self.to_option().unwrap_or_default()
    }
}

impl<A: CuptiApi + ?Sized> Drop for VendorString<'_, A> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: the pointer came from CUPTI and this guard is its only owner.
            unsafe { self.api.free_vendor_string(self.ptr) };
        }
    }
}
