//! `libcupti` backed [`CuptiApi`]

use super::bindings::*;
use super::transport::CuptiApi;
use std::ffi::{c_char, c_void};

#[link(name = "cupti")]
extern "C" {
    fn cuptiEnableCallback(
        enable: u32,
        subscriber: *mut c_void,
        domain: u32,
        cbid: CallbackId,
    ) -> CuptiResult;
    fn cuptiGetCubinCrc(params: *mut GetCubinCrcParams) -> CuptiResult;
    fn cuptiPCSamplingGetNumStallReasons(
        params: *mut PcSamplingGetNumStallReasonsParams,
    ) -> CuptiResult;
    fn cuptiPCSamplingGetStallReasons(params: *mut PcSamplingGetStallReasonsParams)
        -> CuptiResult;
    fn cuptiGetSassToSourceCorrelation(
        params: *mut GetSassToSourceCorrelationParams,
    ) -> CuptiResult;
    fn cuptiPCSamplingEnable(params: *mut PcSamplingEnableParams) -> CuptiResult;
    fn cuptiPCSamplingDisable(params: *mut PcSamplingDisableParams) -> CuptiResult;
    fn cuptiPCSamplingStart(params: *mut PcSamplingStartParams) -> CuptiResult;
    fn cuptiPCSamplingStop(params: *mut PcSamplingStopParams) -> CuptiResult;
    fn cuptiPCSamplingGetData(params: *mut PcSamplingGetDataParams) -> CuptiResult;
    fn cuptiPCSamplingSetConfigurationAttribute(
        params: *mut PcSamplingConfigurationInfoParams,
    ) -> CuptiResult;
}

/// Forwards every call to the CUPTI shared library
///
/// Strings CUPTI returns (file, directory and function names) are allocated
/// with `malloc` and released with `free`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCupti;

impl NativeCupti {
    pub fn new() -> Self {
        Self
    }
}

impl CuptiApi for NativeCupti {
    unsafe fn enable_callback(
        &self,
        enable: u32,
        subscriber: SubscriberHandle,
        domain: CallbackDomain,
        cbid: CallbackId,
    ) -> CuptiResult {
        cuptiEnableCallback(enable, subscriber.as_raw(), domain.raw(), cbid)
    }

    unsafe fn get_cubin_crc(&self, params: &mut GetCubinCrcParams) -> CuptiResult {
        cuptiGetCubinCrc(params)
    }

    unsafe fn pc_sampling_get_num_stall_reasons(
        &self,
        params: &mut PcSamplingGetNumStallReasonsParams,
    ) -> CuptiResult {
        cuptiPCSamplingGetNumStallReasons(params)
    }

    unsafe fn pc_sampling_get_stall_reasons(
        &self,
        params: &mut PcSamplingGetStallReasonsParams,
    ) -> CuptiResult {
        cuptiPCSamplingGetStallReasons(params)
    }

    unsafe fn get_sass_to_source_correlation(
        &self,
        params: &mut GetSassToSourceCorrelationParams,
    ) -> CuptiResult {
        cuptiGetSassToSourceCorrelation(params)
    }

    unsafe fn pc_sampling_enable(&self, params: &mut PcSamplingEnableParams) -> CuptiResult {
        cuptiPCSamplingEnable(params)
    }

    unsafe fn pc_sampling_disable(&self, params: &mut PcSamplingDisableParams) -> CuptiResult {
        cuptiPCSamplingDisable(params)
    }

    unsafe fn pc_sampling_start(&self, params: &mut PcSamplingStartParams) -> CuptiResult {
        cuptiPCSamplingStart(params)
    }

    unsafe fn pc_sampling_stop(&self, params: &mut PcSamplingStopParams) -> CuptiResult {
        cuptiPCSamplingStop(params)
    }

    unsafe fn pc_sampling_get_data(&self, params: &mut PcSamplingGetDataParams) -> CuptiResult {
        cuptiPCSamplingGetData(params)
    }

    unsafe fn pc_sampling_set_configuration_attribute(
        &self,
        params: &mut PcSamplingConfigurationInfoParams,
    ) -> CuptiResult {
        cuptiPCSamplingSetConfigurationAttribute(params)
    }

    unsafe fn free_vendor_string(&self, ptr: *mut c_char) {
        libc::free(ptr.cast());
    }
}
