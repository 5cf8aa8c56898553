//! PC sampling session driver
//!
//! Checked wrappers around the CUPTI PC sampling entry points. Each call fills
//! the vendor parameter record, sets its size tag, dispatches through
//! [`CuptiApi`] and turns the result code into a [`CuptiError`]. No call is
//! retried.
//!
//! The session state (disabled, enabled, started) lives in the vendor; a call
//! made from the wrong state comes back as a [`CuptiError::Api`]. Use
//! [`PcSamplingSession`](super::session::PcSamplingSession) to catch misuse
//! before it reaches the driver.

use super::bindings::*;
use super::buffer::{DataBufferPtr, SamplingBuffer};
use super::transport::{CuptiApi, VendorString};
use crate::error::{check, CuptiError, Result};
use gpuscope_shared::{PcSample, SamplingSummary, SourceLocation, StallReasonInfo};
use serde::{Deserialize, Serialize};
use std::ffi::{c_char, CStr, CString};
use std::ptr;
use tracing::{debug, trace, warn};

/// How a missing source mapping is reported by
/// [`get_sass_to_source_correlation`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strictness {
    /// Vendor failures are returned as errors
    #[default]
    Strict,
    /// Vendor failures yield an empty location; for binaries that may lack
    /// line information (e.g. optimized builds)
    ///
    /// Every failure code is swallowed, not only a missing mapping: an invalid
    /// context or a malformed cubin also comes back as an empty location and
    /// is only visible in the `debug` log.
    Lenient,
}

/// How CUPTI collects samples across kernels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// Sample concurrently running kernels
    #[default]
    Continuous,
    /// Serialize kernels and sample one at a time
    KernelSerialized,
}

impl CollectionMode {
    pub fn raw(self) -> u32 {
        match self {
            Self::Continuous => CUPTI_PC_SAMPLING_COLLECTION_MODE_CONTINUOUS,
            Self::KernelSerialized => CUPTI_PC_SAMPLING_COLLECTION_MODE_KERNEL_SERIALIZED,
        }
    }
}

/// Layout CUPTI writes samples in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputDataFormat {
    #[default]
    Parsed,
}

/// One PC sampling configuration attribute and its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationAttribute {
    /// Sampling period; CUPTI reads it as a power-of-two exponent of SM cycles
    SamplingPeriod(u32),
    /// Stall reason indices to collect
    StallReasons(Vec<u32>),
    /// Host-side scratch buffer size in bytes
    ScratchBufferSize(usize),
    /// Device-side hardware buffer size in bytes
    HardwareBufferSize(usize),
    CollectionMode(CollectionMode),
    /// Only sample between explicit start and stop calls
    EnableStartStopControl(bool),
    OutputDataFormat(OutputDataFormat),
    /// Header of a [`SamplingBuffer`] CUPTI stores data into on stop; see
    /// [`SamplingBuffer::as_data_buffer_ptr`]
    SamplingDataBuffer(DataBufferPtr),
    /// Sleep span of the CUPTI worker thread in milliseconds
    WorkerThreadPeriodicSleepSpan(u32),
}

impl ConfigurationAttribute {
    /// Vendor attribute type
    pub fn attribute_type(&self) -> u32 {
        match self {
            Self::SamplingPeriod(_) => CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_SAMPLING_PERIOD,
            Self::StallReasons(_) => CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_STALL_REASON,
            Self::ScratchBufferSize(_) => {
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_SCRATCH_BUFFER_SIZE
            }
            Self::HardwareBufferSize(_) => {
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_HARDWARE_BUFFER_SIZE
            }
            Self::CollectionMode(_) => CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_COLLECTION_MODE,
            Self::EnableStartStopControl(_) => {
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_ENABLE_START_STOP_CONTROL
            }
            Self::OutputDataFormat(_) => {
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_OUTPUT_DATA_FORMAT
            }
            Self::SamplingDataBuffer(_) => {
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_SAMPLING_DATA_BUFFER
            }
            Self::WorkerThreadPeriodicSleepSpan(_) => {
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_WORKER_THREAD_PERIODIC_SLEEP_SPAN
            }
        }
    }

    /// Vendor record for this attribute
    ///
    /// The stall reason list is borrowed, so the record must not outlive `self`.
    fn to_raw(&self) -> PcSamplingConfigurationInfo {
        let attribute_data = match self {
            Self::SamplingPeriod(period) => PcSamplingConfigurationData {
                sampling_period: *period,
            },
            Self::StallReasons(indices) => PcSamplingConfigurationData {
                stall_reason: StallReasonData {
                    stall_reason_count: indices.len(),
                    // CUPTI only reads the index list
                    p_stall_reason_index: indices.as_ptr().cast_mut(),
                },
            },
            Self::ScratchBufferSize(size) => PcSamplingConfigurationData {
                scratch_buffer_size: *size,
            },
            Self::HardwareBufferSize(size) => PcSamplingConfigurationData {
                hardware_buffer_size: *size,
            },
            Self::CollectionMode(mode) => PcSamplingConfigurationData {
                collection_mode: mode.raw(),
            },
            Self::EnableStartStopControl(enabled) => PcSamplingConfigurationData {
                enable_start_stop_control: u32::from(*enabled),
            },
            Self::OutputDataFormat(OutputDataFormat::Parsed) => PcSamplingConfigurationData {
                output_data_format: CUPTI_PC_SAMPLING_OUTPUT_DATA_FORMAT_PARSED,
            },
            Self::SamplingDataBuffer(buffer) => PcSamplingConfigurationData {
                sampling_data_buffer: buffer.as_ptr(),
            },
            Self::WorkerThreadPeriodicSleepSpan(span) => PcSamplingConfigurationData {
                worker_thread_periodic_sleep_span: *span,
            },
        };

        PcSamplingConfigurationInfo {
            attribute_type: self.attribute_type(),
            attribute_status: CuptiResult::SUCCESS,
            attribute_data,
        }
    }
}

/// Get CRC checksum of a cubin
pub fn get_cubin_crc<A: CuptiApi + ?Sized>(api: &A, cubin: &[u8]) -> Result<u64> {
    let mut params = GetCubinCrcParams {
        size: GET_CUBIN_CRC_PARAMS_SIZE,
        cubin_size: cubin.len(),
        cubin: cubin.as_ptr().cast(),
        cubin_crc: 0,
    };
    // SAFETY: CUPTI reads `cubin_size` bytes of `cubin`, which outlives the call.
    check("cuptiGetCubinCrc", unsafe { api.get_cubin_crc(&mut params) })?;
    trace!("cubin of {} bytes has crc {:#018x}", cubin.len(), params.cubin_crc);
    Ok(params.cubin_crc)
}

/// Get the number of stall reasons supported by the GPU behind `ctx`
pub fn get_num_stall_reasons<A: CuptiApi + ?Sized>(api: &A, ctx: ContextHandle) -> Result<usize> {
    let mut num_stall_reasons = 0usize;
    let mut params = PcSamplingGetNumStallReasonsParams {
        size: PC_SAMPLING_GET_NUM_STALL_REASONS_PARAMS_SIZE,
        p_priv: ptr::null_mut(),
        ctx,
        num_stall_reasons: &mut num_stall_reasons,
    };
    // SAFETY: `num_stall_reasons` is a live local CUPTI writes one value into.
    check("cuptiPCSamplingGetNumStallReasons", unsafe {
        api.pc_sampling_get_num_stall_reasons(&mut params)
    })?;
    debug!("Context {:?} supports {} stall reasons", ctx, num_stall_reasons);
    Ok(num_stall_reasons)
}

/// Get the index and counter name of the first `count` stall reasons
pub fn get_stall_reasons<A: CuptiApi + ?Sized>(
    api: &A,
    ctx: ContextHandle,
    count: usize,
) -> Result<Vec<StallReasonInfo>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut indices = vec![0u32; count];
    let mut names = vec![[0u8; CUPTI_STALL_REASON_STRING_SIZE]; count];
    let mut name_ptrs: Vec<*mut c_char> = names
        .iter_mut()
        .map(|name| name.as_mut_ptr().cast::<c_char>())
        .collect();

    let mut params = PcSamplingGetStallReasonsParams {
        size: PC_SAMPLING_GET_STALL_REASONS_PARAMS_SIZE,
        p_priv: ptr::null_mut(),
        ctx,
        num_stall_reasons: count,
        stall_reason_index: indices.as_mut_ptr(),
        stall_reasons: name_ptrs.as_mut_ptr(),
    };
    // SAFETY: both arrays hold `count` entries and every name buffer is
    // CUPTI_STALL_REASON_STRING_SIZE bytes, all owned by this frame.
    check("cuptiPCSamplingGetStallReasons", unsafe {
        api.pc_sampling_get_stall_reasons(&mut params)
    })?;

    Ok(indices
        .into_iter()
        .zip(&names)
        .map(|(index, name)| StallReasonInfo {
            index,
            name: CStr::from_bytes_until_nul(name)
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(name).into_owned()),
        })
        .collect())
}

/// Get the source line and file a PC offset within `function_name` maps to
///
/// CUPTI allocates the file and directory names; they are copied into the
/// returned [`SourceLocation`] and released before returning, on every path.
/// In [`Strictness::Lenient`] mode a vendor failure produces whatever fields
/// were filled in (usually none) instead of an error.
pub fn get_sass_to_source_correlation<A: CuptiApi + ?Sized>(
    api: &A,
    function_name: &str,
    pc_offset: u64,
    cubin: &[u8],
    strictness: Strictness,
) -> Result<SourceLocation> {
    let c_function_name = CString::new(function_name).map_err(|_| {
        CuptiError::InvalidArgument(format!("function name {function_name:?} contains a NUL byte"))
    })?;

    let mut params = GetSassToSourceCorrelationParams {
        size: GET_SASS_TO_SOURCE_CORRELATION_PARAMS_SIZE,
        cubin: cubin.as_ptr().cast(),
        function_name: c_function_name.as_ptr(),
        cubin_size: cubin.len(),
        line_number: 0,
        pc_offset,
        file_name: ptr::null_mut(),
        dir_name: ptr::null_mut(),
    };
    // SAFETY: the cubin and the function name outlive the call; the out
    // pointers start null and are taken over right below.
    let result = unsafe { api.get_sass_to_source_correlation(&mut params) };

    // Own the vendor strings before looking at the result so they are freed on
    // every return path.
    let file = VendorString::new(api, params.file_name);
    let dir = VendorString::new(api, params.dir_name);

    if let Err(e) = check("cuptiGetSassToSourceCorrelation", result) {
        match strictness {
            Strictness::Strict => return Err(e),
            Strictness::Lenient => {
                debug!("No source mapping for {}+{:#x}: {}", function_name, pc_offset, e)
            }
        }
    }

    Ok(SourceLocation {
        line: params.line_number,
        file: file.to_string_lossy(),
        dir: dir.to_string_lossy(),
    })
}

/// Allocate a PC sampling data buffer
///
/// Ownership passes to the caller; the memory is released when the buffer is
/// dropped.
pub fn alloc_pc_sampling_data(
    collect_num_pcs: usize,
    num_valid_stall_reasons: usize,
) -> Result<SamplingBuffer> {
    SamplingBuffer::new(collect_num_pcs, num_valid_stall_reasons)
}

/// Enable PC sampling for a context
pub fn enable_pc_sampling<A: CuptiApi + ?Sized>(api: &A, ctx: ContextHandle) -> Result<()> {
    let mut params = PcSamplingEnableParams::new(ctx);
    // SAFETY: the record carries no pointers besides the opaque context.
    check("cuptiPCSamplingEnable", unsafe { api.pc_sampling_enable(&mut params) })?;
    debug!("PC sampling enabled on context {:?}", ctx);
    Ok(())
}

/// Disable PC sampling for a context
pub fn disable_pc_sampling<A: CuptiApi + ?Sized>(api: &A, ctx: ContextHandle) -> Result<()> {
    let mut params = PcSamplingDisableParams::new(ctx);
    // SAFETY: the record carries no pointers besides the opaque context.
    check("cuptiPCSamplingDisable", unsafe { api.pc_sampling_disable(&mut params) })?;
    debug!("PC sampling disabled on context {:?}", ctx);
    Ok(())
}

/// Start PC sampling
pub fn start_pc_sampling<A: CuptiApi + ?Sized>(api: &A, ctx: ContextHandle) -> Result<()> {
    let mut params = PcSamplingStartParams::new(ctx);
    // SAFETY: the record carries no pointers besides the opaque context.
    check("cuptiPCSamplingStart", unsafe { api.pc_sampling_start(&mut params) })?;
    debug!("PC sampling started on context {:?}", ctx);
    Ok(())
}

/// Stop PC sampling
pub fn stop_pc_sampling<A: CuptiApi + ?Sized>(api: &A, ctx: ContextHandle) -> Result<()> {
    let mut params = PcSamplingStopParams::new(ctx);
    // SAFETY: the record carries no pointers besides the opaque context.
    check("cuptiPCSamplingStop", unsafe { api.pc_sampling_stop(&mut params) })?;
    debug!("PC sampling stopped on context {:?}", ctx);
    Ok(())
}

/// Get PC sampling data into `buffer`
///
/// Fills at most the buffer's capacity. Records CUPTI could not fit are
/// reported through [`SamplingBuffer::remaining_num_pcs`]; keep retrieving (or
/// use [`drain_pc_sampling_data`]) until it reaches zero. Function names left
/// over from the previous fill are released first.
///
/// Fails with [`CuptiError::InvalidArgument`] before reaching CUPTI when the
/// buffer's records hold fewer stall reasons than the device reports.
pub fn get_pc_sampling_data<A: CuptiApi + ?Sized>(
    api: &A,
    ctx: ContextHandle,
    buffer: &mut SamplingBuffer,
) -> Result<()> {
    let num_stall_reasons = get_num_stall_reasons(api, ctx)?;
    if buffer.num_stall_reasons() < num_stall_reasons {
        return Err(CuptiError::InvalidArgument(format!(
            "buffer holds {} stall reasons per PC, context {:?} reports {}",
            buffer.num_stall_reasons(),
            ctx,
            num_stall_reasons
        )));
    }

    let released = buffer.release_vendor_strings(api);
    if released > 0 {
        trace!("Released {} function names from the previous fill", released);
    }

    let mut params = PcSamplingGetDataParams {
        size: PC_SAMPLING_GET_DATA_PARAMS_SIZE,
        p_priv: ptr::null_mut(),
        ctx,
        pc_sampling_data: buffer.as_raw().cast(),
    };
    // SAFETY: the buffer is exclusively borrowed for the call, its layout
    // matches what CUPTI writes into and every stall-reason array was checked
    // to hold the device's count.
    check("cuptiPCSamplingGetData", unsafe { api.pc_sampling_get_data(&mut params) })?;

    debug!(
        "Retrieved {} PCs ({} samples, {} dropped, {} PCs remaining)",
        buffer.total_num_pcs(),
        buffer.total_samples(),
        buffer.dropped_samples(),
        buffer.remaining_num_pcs()
    );
    if buffer.hardware_buffer_full() {
        warn!("PC sampling hardware buffer overflowed on context {:?}", ctx);
    }
    Ok(())
}

/// Retrieve until CUPTI reports no remaining records
///
/// After each retrieval the copied records and the header summary are passed
/// to `sink`. Returns the number of retrievals performed.
pub fn drain_pc_sampling_data<A, F>(
    api: &A,
    ctx: ContextHandle,
    buffer: &mut SamplingBuffer,
    mut sink: F,
) -> Result<usize>
where
    A: CuptiApi + ?Sized,
    F: FnMut(&SamplingSummary, Vec<PcSample>),
{
    let mut rounds = 0;
    loop {
        get_pc_sampling_data(api, ctx, buffer)?;
        rounds += 1;

        let summary = buffer.summary();
        sink(&summary, buffer.take_samples(api));

        if summary.remaining_num_pcs == 0 {
            break;
        }
        if summary.total_num_pcs == 0 {
            warn!(
                "CUPTI reports {} remaining PCs but returned none; giving up",
                summary.remaining_num_pcs
            );
            break;
        }
    }
    Ok(rounds)
}

/// Set configuration attributes
///
/// Must be applied before sampling starts. On failure each rejected attribute
/// is logged with the status CUPTI reported for it.
pub fn set_configuration_attribute<A: CuptiApi + ?Sized>(
    api: &A,
    ctx: ContextHandle,
    attributes: &[ConfigurationAttribute],
) -> Result<()> {
    let mut infos: Vec<PcSamplingConfigurationInfo> =
        attributes.iter().map(ConfigurationAttribute::to_raw).collect();

    let mut params = PcSamplingConfigurationInfoParams {
        size: PC_SAMPLING_CONFIGURATION_INFO_PARAMS_SIZE,
        p_priv: ptr::null_mut(),
        ctx,
        num_attributes: infos.len(),
        p_pc_sampling_configuration_info: infos.as_mut_ptr(),
    };
    // SAFETY: `infos` and the attribute values it borrows outlive the call.
    let result = unsafe { api.pc_sampling_set_configuration_attribute(&mut params) };

    if let Err(e) = check("cuptiPCSamplingSetConfigurationAttribute", result) {
        for (attribute, info) in attributes.iter().zip(&infos) {
            if !info.attribute_status.is_success() {
                warn!("Attribute {:?} rejected: {}", attribute, info.attribute_status);
            }
        }
        return Err(e);
    }

    debug!("Applied {} PC sampling attributes to context {:?}", attributes.len(), ctx);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cupti::mock::{MockCupti, MockPcRecord};
    use std::ffi::c_void;

    const CUBIN: &[u8] = b"\x7fELF fake cubin";

    fn ctx() -> ContextHandle {
        ContextHandle::from_raw(0xc0 as *mut c_void)
    }

    fn api_with_context(num_stall_reasons: usize) -> MockCupti {
        let api = MockCupti::new();
        api.add_context(ctx(), num_stall_reasons);
        api
    }

    #[test]
    fn test_cubin_crc() {
        let api = MockCupti::new();
        let crc = get_cubin_crc(&api, CUBIN).unwrap();
        assert_eq!(crc, get_cubin_crc(&api, CUBIN).unwrap());
        assert_ne!(crc, get_cubin_crc(&api, b"other").unwrap());
    }

    #[test]
    fn test_cubin_crc_rejects_empty_image() {
        let api = MockCupti::new();
        let err = get_cubin_crc(&api, &[]).unwrap_err();
        assert_eq!(err.result(), Some(CuptiResult::ERROR_INVALID_PARAMETER));
    }

    #[test]
    fn test_num_stall_reasons() {
        let api = api_with_context(12);
        assert_eq!(get_num_stall_reasons(&api, ctx()).unwrap(), 12);

        let unknown = ContextHandle::from_raw(0xbad as *mut c_void);
        let err = get_num_stall_reasons(&api, unknown).unwrap_err();
        assert_eq!(err.result(), Some(CuptiResult::ERROR_INVALID_CONTEXT));
    }

    #[test]
    fn test_stall_reason_names() {
        let api = api_with_context(3);
        let reasons = get_stall_reasons(&api, ctx(), 3).unwrap();
        assert_eq!(reasons.len(), 3);
        assert_eq!(reasons[0].index, 0);
        assert!(reasons[0].name.starts_with("smsp__pcsamp_warps_issue_stalled_"));
        assert!(get_stall_reasons(&api, ctx(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_correlation_copies_and_frees() {
        let api = MockCupti::new();
        api.add_source_mapping("matmul_kernel", 0x80, 17, Some("matmul.py"), Some("/src"));

        let loc =
            get_sass_to_source_correlation(&api, "matmul_kernel", 0x80, CUBIN, Strictness::Strict)
                .unwrap();
        assert_eq!(loc.line, 17);
        assert_eq!(loc.file, "matmul.py");
        assert_eq!(loc.dir, "/src");
        assert_eq!(api.live_vendor_strings(), 0);
        assert_eq!(api.invalid_frees(), 0);
    }

    #[test]
    fn test_correlation_missing_mapping() {
        let api = MockCupti::new();

        let loc =
            get_sass_to_source_correlation(&api, "opt_kernel", 0x10, CUBIN, Strictness::Lenient)
                .unwrap();
        assert_eq!(loc, SourceLocation::default());

        let err =
            get_sass_to_source_correlation(&api, "opt_kernel", 0x10, CUBIN, Strictness::Strict)
                .unwrap_err();
        assert_eq!(err.result(), Some(CuptiResult::ERROR_UNKNOWN));
        assert_eq!(api.live_vendor_strings(), 0);
    }

    #[test]
    fn test_correlation_frees_on_failure_path() {
        let api = MockCupti::new();
        api.add_failing_mapping(
            "kernel",
            0x20,
            Some("partial.cu"),
            None,
            CuptiResult::ERROR_UNKNOWN,
        );

        assert!(
            get_sass_to_source_correlation(&api, "kernel", 0x20, CUBIN, Strictness::Strict)
                .is_err()
        );
        assert_eq!(api.live_vendor_strings(), 0);

        let loc = get_sass_to_source_correlation(&api, "kernel", 0x20, CUBIN, Strictness::Lenient)
            .unwrap();
        assert_eq!(loc.file, "partial.cu");
        assert_eq!(loc.dir, "");
        assert_eq!(api.live_vendor_strings(), 0);
        assert_eq!(api.invalid_frees(), 0);
    }

    #[test]
    fn test_lenient_correlation_hides_argument_errors() {
        let api = MockCupti::new();
        api.add_source_mapping("matmul_kernel", 0x80, 17, Some("matmul.py"), Some("/src"));

        let err =
            get_sass_to_source_correlation(&api, "matmul_kernel", 0x80, &[], Strictness::Strict)
                .unwrap_err();
        assert_eq!(err.result(), Some(CuptiResult::ERROR_INVALID_PARAMETER));

        let loc =
            get_sass_to_source_correlation(&api, "matmul_kernel", 0x80, &[], Strictness::Lenient)
                .unwrap();
        assert_eq!(loc, SourceLocation::default());
        assert_eq!(api.live_vendor_strings(), 0);
    }

    #[test]
    fn test_correlation_rejects_nul_in_name() {
        let api = MockCupti::new();
        let err = get_sass_to_source_correlation(&api, "bad\0name", 0, CUBIN, Strictness::Lenient)
            .unwrap_err();
        assert!(matches!(err, CuptiError::InvalidArgument(_)));
    }

    #[test]
    fn test_start_requires_enable() {
        let api = api_with_context(3);
        let err = start_pc_sampling(&api, ctx()).unwrap_err();
        assert_eq!(err.result(), Some(CuptiResult::ERROR_INVALID_OPERATION));
    }

    #[test]
    fn test_double_stop_rejected() {
        let api = api_with_context(3);
        enable_pc_sampling(&api, ctx()).unwrap();
        start_pc_sampling(&api, ctx()).unwrap();
        stop_pc_sampling(&api, ctx()).unwrap();
        assert!(stop_pc_sampling(&api, ctx()).is_err());
    }

    #[test]
    fn test_configuration_after_start_rejected() {
        let api = api_with_context(3);
        enable_pc_sampling(&api, ctx()).unwrap();
        set_configuration_attribute(&api, ctx(), &[ConfigurationAttribute::SamplingPeriod(7)])
            .unwrap();
        start_pc_sampling(&api, ctx()).unwrap();

        let err =
            set_configuration_attribute(&api, ctx(), &[ConfigurationAttribute::SamplingPeriod(9)])
                .unwrap_err();
        assert_eq!(err.result(), Some(CuptiResult::ERROR_INVALID_OPERATION));
        assert_eq!(api.sampling_period(ctx()), Some(7));
    }

    #[test]
    fn test_stall_reason_attribute_passes_indices() {
        let api = api_with_context(4);
        enable_pc_sampling(&api, ctx()).unwrap();
        set_configuration_attribute(
            &api,
            ctx(),
            &[ConfigurationAttribute::StallReasons(vec![0, 2, 3])],
        )
        .unwrap();
        assert_eq!(api.selected_stall_reasons(ctx()), Some(vec![0, 2, 3]));
    }

    #[test]
    fn test_retrieve_before_start_rejected() {
        let api = api_with_context(3);
        let mut buffer = alloc_pc_sampling_data(4, 3).unwrap();
        enable_pc_sampling(&api, ctx()).unwrap();
        assert!(get_pc_sampling_data(&api, ctx(), &mut buffer).is_err());
    }

    #[test]
    fn test_retrieve_releases_previous_names() {
        let api = api_with_context(2);
        let mut buffer = alloc_pc_sampling_data(4, 2).unwrap();
        enable_pc_sampling(&api, ctx()).unwrap();
        start_pc_sampling(&api, ctx()).unwrap();

        api.record_samples(ctx(), (0..3).map(|i| MockPcRecord::new("k", i * 16, vec![(0, 1)])));
        get_pc_sampling_data(&api, ctx(), &mut buffer).unwrap();
        assert_eq!(api.live_vendor_strings(), 3);

        // Not taken: the next retrieval frees them
        get_pc_sampling_data(&api, ctx(), &mut buffer).unwrap();
        assert_eq!(api.live_vendor_strings(), 0);
        assert_eq!(buffer.total_num_pcs(), 0);
    }

    #[test]
    fn test_retrieve_rejects_short_stall_reason_arrays() {
        let api = api_with_context(3);
        enable_pc_sampling(&api, ctx()).unwrap();
        start_pc_sampling(&api, ctx()).unwrap();
        api.record_samples(ctx(), [MockPcRecord::new("k", 0, vec![(0, 1), (1, 2), (2, 3)])]);

        for capacity in [0, 2] {
            let mut buffer = alloc_pc_sampling_data(4, capacity).unwrap();
            let err = get_pc_sampling_data(&api, ctx(), &mut buffer).unwrap_err();
            assert!(matches!(err, CuptiError::InvalidArgument(_)));
            assert_eq!(buffer.total_num_pcs(), 0);
            assert!(buffer.entries().iter().all(|e| e.function_name.is_null()));
        }

        // The record is still there for a buffer that fits
        let mut buffer = alloc_pc_sampling_data(4, 3).unwrap();
        get_pc_sampling_data(&api, ctx(), &mut buffer).unwrap();
        let samples = buffer.take_samples(&api);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].total_samples(), 6);
    }

    #[test]
    fn test_retrieve_accepts_wider_buffer() {
        let api = api_with_context(2);
        enable_pc_sampling(&api, ctx()).unwrap();
        start_pc_sampling(&api, ctx()).unwrap();
        api.record_samples(ctx(), [MockPcRecord::new("k", 0, vec![(1, 4)])]);

        let mut buffer = alloc_pc_sampling_data(2, 8).unwrap();
        get_pc_sampling_data(&api, ctx(), &mut buffer).unwrap();
        assert_eq!(buffer.take_samples(&api)[0].stall_reasons.len(), 1);
    }
}
