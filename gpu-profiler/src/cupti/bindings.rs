//! CUPTI FFI bindings
//!
//! Hand-written subset of `cupti_callbacks.h`, `cupti_*_cbid.h` and
//! `cupti_pcsampling.h`: result codes, callback identifiers and the parameter
//! records the PC sampling entry points take. Every record starts with a `size`
//! tag that must equal the size CUPTI expects for that struct version.

#![allow(non_upper_case_globals)]

use std::ffi::{c_char, c_void};
use std::fmt;
use std::mem::{offset_of, size_of};
use std::ptr;

pub use gpuscope_shared::CallbackDomain;

/// `CUptiResult`
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CuptiResult(pub u32);

impl CuptiResult {
    pub const SUCCESS: Self = Self(0);
    pub const ERROR_INVALID_PARAMETER: Self = Self(1);
    pub const ERROR_INVALID_DEVICE: Self = Self(2);
    pub const ERROR_INVALID_CONTEXT: Self = Self(3);
    pub const ERROR_INVALID_OPERATION: Self = Self(7);
    pub const ERROR_OUT_OF_MEMORY: Self = Self(8);
    pub const ERROR_PARAMETER_SIZE_NOT_SUFFICIENT: Self = Self(10);
    pub const ERROR_API_NOT_IMPLEMENTED: Self = Self(11);
    pub const ERROR_MAX_LIMIT_REACHED: Self = Self(12);
    pub const ERROR_NOT_READY: Self = Self(13);
    pub const ERROR_NOT_COMPATIBLE: Self = Self(14);
    pub const ERROR_NOT_INITIALIZED: Self = Self(15);
    pub const ERROR_UNKNOWN: Self = Self(999);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Vendor name of the result code
    pub fn name(self) -> &'static str {
        match self {
            Self::SUCCESS => "CUPTI_SUCCESS",
            Self::ERROR_INVALID_PARAMETER => "CUPTI_ERROR_INVALID_PARAMETER",
            Self::ERROR_INVALID_DEVICE => "CUPTI_ERROR_INVALID_DEVICE",
            Self::ERROR_INVALID_CONTEXT => "CUPTI_ERROR_INVALID_CONTEXT",
            Self::ERROR_INVALID_OPERATION => "CUPTI_ERROR_INVALID_OPERATION",
            Self::ERROR_OUT_OF_MEMORY => "CUPTI_ERROR_OUT_OF_MEMORY",
            Self::ERROR_PARAMETER_SIZE_NOT_SUFFICIENT => "CUPTI_ERROR_PARAMETER_SIZE_NOT_SUFFICIENT",
            Self::ERROR_API_NOT_IMPLEMENTED => "CUPTI_ERROR_API_NOT_IMPLEMENTED",
            Self::ERROR_MAX_LIMIT_REACHED => "CUPTI_ERROR_MAX_LIMIT_REACHED",
            Self::ERROR_NOT_READY => "CUPTI_ERROR_NOT_READY",
            Self::ERROR_NOT_COMPATIBLE => "CUPTI_ERROR_NOT_COMPATIBLE",
            Self::ERROR_NOT_INITIALIZED => "CUPTI_ERROR_NOT_INITIALIZED",
            Self::ERROR_UNKNOWN => "CUPTI_ERROR_UNKNOWN",
            _ => "CUPTI_ERROR_<unrecognized>",
        }
    }
}

impl fmt::Display for CuptiResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// `CUpti_CallbackId`
pub type CallbackId = u32;

/// Opaque `CUcontext`
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(*mut c_void);

impl ContextHandle {
    /// Wrap a raw `CUcontext`. The handle is never dereferenced by this crate.
    pub const fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// Opaque `CUpti_SubscriberHandle`, created and destroyed by the caller
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle(*mut c_void);

impl SubscriberHandle {
    pub const fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

// Driver API callback IDs (cupti_driver_cbid.h)
pub const CUPTI_DRIVER_TRACE_CBID_cuLaunch: CallbackId = 123;
pub const CUPTI_DRIVER_TRACE_CBID_cuLaunchGrid: CallbackId = 124;
pub const CUPTI_DRIVER_TRACE_CBID_cuLaunchGridAsync: CallbackId = 125;
pub const CUPTI_DRIVER_TRACE_CBID_cuLaunchKernel: CallbackId = 307;
pub const CUPTI_DRIVER_TRACE_CBID_cuLaunchKernel_ptsz: CallbackId = 442;
pub const CUPTI_DRIVER_TRACE_CBID_cuLaunchCooperativeKernel: CallbackId = 477;
pub const CUPTI_DRIVER_TRACE_CBID_cuLaunchCooperativeKernel_ptsz: CallbackId = 478;
pub const CUPTI_DRIVER_TRACE_CBID_cuStreamBeginCapture: CallbackId = 484;
pub const CUPTI_DRIVER_TRACE_CBID_cuStreamEndCapture: CallbackId = 485;
pub const CUPTI_DRIVER_TRACE_CBID_cuStreamBeginCapture_ptsz: CallbackId = 487;
pub const CUPTI_DRIVER_TRACE_CBID_cuStreamEndCapture_ptsz: CallbackId = 488;
pub const CUPTI_DRIVER_TRACE_CBID_cuLaunchCooperativeKernelMultiDevice: CallbackId = 500;
pub const CUPTI_DRIVER_TRACE_CBID_cuGraphLaunch: CallbackId = 514;
pub const CUPTI_DRIVER_TRACE_CBID_cuGraphLaunch_ptsz: CallbackId = 515;
pub const CUPTI_DRIVER_TRACE_CBID_cuStreamBeginCapture_v2: CallbackId = 571;
pub const CUPTI_DRIVER_TRACE_CBID_cuStreamBeginCapture_v2_ptsz: CallbackId = 572;
pub const CUPTI_DRIVER_TRACE_CBID_cuLaunchKernelEx: CallbackId = 652;
pub const CUPTI_DRIVER_TRACE_CBID_cuLaunchKernelEx_ptsz: CallbackId = 653;
pub const CUPTI_DRIVER_TRACE_CBID_cuStreamBeginCaptureToGraph: CallbackId = 789;
pub const CUPTI_DRIVER_TRACE_CBID_cuStreamBeginCaptureToGraph_ptsz: CallbackId = 790;

// Runtime API callback IDs (cupti_runtime_cbid.h)
pub const CUPTI_RUNTIME_TRACE_CBID_cudaLaunch_v3020: CallbackId = 13;
pub const CUPTI_RUNTIME_TRACE_CBID_cudaLaunchKernel_v7000: CallbackId = 211;
pub const CUPTI_RUNTIME_TRACE_CBID_cudaLaunch_ptsz_v7000: CallbackId = 213;
pub const CUPTI_RUNTIME_TRACE_CBID_cudaLaunchKernel_ptsz_v7000: CallbackId = 214;
pub const CUPTI_RUNTIME_TRACE_CBID_cudaLaunchCooperativeKernel_v9000: CallbackId = 269;
pub const CUPTI_RUNTIME_TRACE_CBID_cudaLaunchCooperativeKernel_ptsz_v9000: CallbackId = 270;
pub const CUPTI_RUNTIME_TRACE_CBID_cudaLaunchCooperativeKernelMultiDevice_v9000: CallbackId = 271;
pub const CUPTI_RUNTIME_TRACE_CBID_cudaGraphLaunch_v10000: CallbackId = 311;
pub const CUPTI_RUNTIME_TRACE_CBID_cudaGraphLaunch_ptsz_v10000: CallbackId = 312;
pub const CUPTI_RUNTIME_TRACE_CBID_cudaLaunchKernelExC_v11060: CallbackId = 430;
pub const CUPTI_RUNTIME_TRACE_CBID_cudaLaunchKernelExC_ptsz_v11060: CallbackId = 431;

// Resource callback IDs (CUpti_CallbackIdResource)
pub const CUPTI_CBID_RESOURCE_CONTEXT_CREATED: CallbackId = 1;
pub const CUPTI_CBID_RESOURCE_CONTEXT_DESTROY_STARTING: CallbackId = 2;
pub const CUPTI_CBID_RESOURCE_MODULE_LOADED: CallbackId = 6;
pub const CUPTI_CBID_RESOURCE_MODULE_UNLOAD_STARTING: CallbackId = 7;
pub const CUPTI_CBID_RESOURCE_GRAPHNODE_CREATED: CallbackId = 12;
pub const CUPTI_CBID_RESOURCE_GRAPHNODE_DESTROY_STARTING: CallbackId = 13;
pub const CUPTI_CBID_RESOURCE_GRAPHEXEC_CREATED: CallbackId = 16;
pub const CUPTI_CBID_RESOURCE_GRAPHEXEC_DESTROY_STARTING: CallbackId = 17;
pub const CUPTI_CBID_RESOURCE_GRAPHNODE_CLONED: CallbackId = 18;

// NVTX callback IDs (cupti_nvtx_cbid.h)
pub const CUPTI_CBID_NVTX_nvtxRangePushA: CallbackId = 8;
pub const CUPTI_CBID_NVTX_nvtxRangePop: CallbackId = 11;

/// Length of each caller-provided stall reason name buffer
pub const CUPTI_STALL_REASON_STRING_SIZE: usize = 128;

// CUpti_PCSamplingConfigurationAttributeType
pub const CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_INVALID: u32 = 0;
pub const CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_SAMPLING_PERIOD: u32 = 1;
pub const CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_STALL_REASON: u32 = 2;
pub const CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_SCRATCH_BUFFER_SIZE: u32 = 3;
pub const CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_HARDWARE_BUFFER_SIZE: u32 = 4;
pub const CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_COLLECTION_MODE: u32 = 5;
pub const CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_ENABLE_START_STOP_CONTROL: u32 = 6;
pub const CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_OUTPUT_DATA_FORMAT: u32 = 7;
pub const CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_SAMPLING_DATA_BUFFER: u32 = 8;
pub const CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_WORKER_THREAD_PERIODIC_SLEEP_SPAN: u32 = 9;

// CUpti_PCSamplingCollectionMode
pub const CUPTI_PC_SAMPLING_COLLECTION_MODE_CONTINUOUS: u32 = 1;
pub const CUPTI_PC_SAMPLING_COLLECTION_MODE_KERNEL_SERIALIZED: u32 = 2;

// CUpti_PCSamplingOutputDataFormat
pub const CUPTI_PC_SAMPLING_OUTPUT_DATA_FORMAT_PARSED: u32 = 1;

/// Size tag of a parameter record: offset of its last field plus that field's size
macro_rules! params_size {
    ($ty:ty, $field:ident: $fty:ty) => {
        offset_of!($ty, $field) + size_of::<$fty>()
    };
}

/// `CUpti_GetCubinCrcParams`
#[repr(C)]
#[derive(Debug)]
pub struct GetCubinCrcParams {
    pub size: usize,
    pub cubin_size: usize,
    pub cubin: *const c_void,
    pub cubin_crc: u64,
}

pub const GET_CUBIN_CRC_PARAMS_SIZE: usize = params_size!(GetCubinCrcParams, cubin_crc: u64);

/// `CUpti_PCSamplingGetNumStallReasonsParams`
#[repr(C)]
#[derive(Debug)]
pub struct PcSamplingGetNumStallReasonsParams {
    pub size: usize,
    pub p_priv: *mut c_void,
    pub ctx: ContextHandle,
    pub num_stall_reasons: *mut usize,
}

pub const PC_SAMPLING_GET_NUM_STALL_REASONS_PARAMS_SIZE: usize =
    params_size!(PcSamplingGetNumStallReasonsParams, num_stall_reasons: *mut usize);

/// `CUpti_PCSamplingGetStallReasonsParams`
///
/// `stall_reasons` points at `num_stall_reasons` caller-owned buffers of
/// [`CUPTI_STALL_REASON_STRING_SIZE`] bytes each.
#[repr(C)]
#[derive(Debug)]
pub struct PcSamplingGetStallReasonsParams {
    pub size: usize,
    pub p_priv: *mut c_void,
    pub ctx: ContextHandle,
    pub num_stall_reasons: usize,
    pub stall_reason_index: *mut u32,
    pub stall_reasons: *mut *mut c_char,
}

pub const PC_SAMPLING_GET_STALL_REASONS_PARAMS_SIZE: usize =
    params_size!(PcSamplingGetStallReasonsParams, stall_reasons: *mut *mut c_char);

/// `CUpti_GetSassToSourceCorrelationParams`
///
/// On success CUPTI allocates `file_name` and `dir_name` with `malloc`; the
/// caller owns and must free them.
#[repr(C)]
#[derive(Debug)]
pub struct GetSassToSourceCorrelationParams {
    pub size: usize,
    pub cubin: *const c_void,
    pub function_name: *const c_char,
    pub cubin_size: usize,
    pub line_number: u32,
    pub pc_offset: u64,
    pub file_name: *mut c_char,
    pub dir_name: *mut c_char,
}

pub const GET_SASS_TO_SOURCE_CORRELATION_PARAMS_SIZE: usize =
    params_size!(GetSassToSourceCorrelationParams, dir_name: *mut c_char);

/// `CUpti_PCSamplingStallReason`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PcSamplingStallReason {
    pub pc_sampling_stall_reason_index: u32,
    pub samples: u32,
}

/// `CUpti_PCSamplingPCData`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PcSamplingPcData {
    pub size: usize,
    pub cubin_crc: u64,
    pub pc_offset: u64,
    pub function_index: u32,
    pub pad: u32,
    /// Allocated by CUPTI on retrieval, freed by the caller
    pub function_name: *mut c_char,
    pub stall_reason_count: usize,
    pub stall_reason: *mut PcSamplingStallReason,
    pub correlation_id: u32,
}

impl Default for PcSamplingPcData {
    fn default() -> Self {
        Self {
            size: 0,
            cubin_crc: 0,
            pc_offset: 0,
            function_index: 0,
            pad: 0,
            function_name: ptr::null_mut(),
            stall_reason_count: 0,
            stall_reason: ptr::null_mut(),
            correlation_id: 0,
        }
    }
}

/// `CUpti_PCSamplingData`
#[repr(C)]
#[derive(Debug)]
pub struct PcSamplingData {
    pub size: usize,
    pub collect_num_pcs: usize,
    pub total_samples: u64,
    pub dropped_samples: u64,
    pub total_num_pcs: usize,
    pub remaining_num_pcs: usize,
    pub range_id: u64,
    pub p_pc_data: *mut PcSamplingPcData,
    pub non_usr_kernels_total_samples: u64,
    pub hardware_buffer_full: u8,
}

impl Default for PcSamplingData {
    fn default() -> Self {
        Self {
            size: 0,
            collect_num_pcs: 0,
            total_samples: 0,
            dropped_samples: 0,
            total_num_pcs: 0,
            remaining_num_pcs: 0,
            range_id: 0,
            p_pc_data: ptr::null_mut(),
            non_usr_kernels_total_samples: 0,
            hardware_buffer_full: 0,
        }
    }
}

/// `stallReasonData` member of the configuration union
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StallReasonData {
    pub stall_reason_count: usize,
    pub p_stall_reason_index: *mut u32,
}

/// `attributeData` union of `CUpti_PCSamplingConfigurationInfo`
///
/// Every variant is a single-member struct in the C header, so the members are
/// flattened here.
#[repr(C)]
#[derive(Clone, Copy)]
pub union PcSamplingConfigurationData {
    pub sampling_period: u32,
    pub stall_reason: StallReasonData,
    pub scratch_buffer_size: usize,
    pub hardware_buffer_size: usize,
    pub collection_mode: u32,
    pub enable_start_stop_control: u32,
    pub output_data_format: u32,
    pub sampling_data_buffer: *mut c_void,
    pub worker_thread_periodic_sleep_span: u32,
}

/// `CUpti_PCSamplingConfigurationInfo`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PcSamplingConfigurationInfo {
    pub attribute_type: u32,
    pub attribute_status: CuptiResult,
    pub attribute_data: PcSamplingConfigurationData,
}

impl fmt::Debug for PcSamplingConfigurationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcSamplingConfigurationInfo")
            .field("attribute_type", &self.attribute_type)
            .field("attribute_status", &self.attribute_status)
            .finish_non_exhaustive()
    }
}

/// `CUpti_PCSamplingConfigurationInfoParams`
#[repr(C)]
#[derive(Debug)]
pub struct PcSamplingConfigurationInfoParams {
    pub size: usize,
    pub p_priv: *mut c_void,
    pub ctx: ContextHandle,
    pub num_attributes: usize,
    pub p_pc_sampling_configuration_info: *mut PcSamplingConfigurationInfo,
}

pub const PC_SAMPLING_CONFIGURATION_INFO_PARAMS_SIZE: usize = params_size!(
    PcSamplingConfigurationInfoParams,
    p_pc_sampling_configuration_info: *mut PcSamplingConfigurationInfo
);

/// `CUpti_PCSamplingGetDataParams`
#[repr(C)]
#[derive(Debug)]
pub struct PcSamplingGetDataParams {
    pub size: usize,
    pub p_priv: *mut c_void,
    pub ctx: ContextHandle,
    /// Points at a [`PcSamplingData`]
    pub pc_sampling_data: *mut c_void,
}

pub const PC_SAMPLING_GET_DATA_PARAMS_SIZE: usize =
    params_size!(PcSamplingGetDataParams, pc_sampling_data: *mut c_void);

/// Records for the entry points that take only a context
macro_rules! context_params {
    ($($(#[$meta:meta])* $name:ident, $size:ident;)*) => {
        $(
            $(#[$meta])*
            #[repr(C)]
            #[derive(Debug)]
            pub struct $name {
                pub size: usize,
                pub p_priv: *mut c_void,
                pub ctx: ContextHandle,
            }

            impl $name {
                pub fn new(ctx: ContextHandle) -> Self {
                    Self {
                        size: $size,
                        p_priv: ptr::null_mut(),
                        ctx,
                    }
                }
            }

            pub const $size: usize = params_size!($name, ctx: ContextHandle);
        )*
    };
}

context_params! {
    /// `CUpti_PCSamplingEnableParams`
    PcSamplingEnableParams, PC_SAMPLING_ENABLE_PARAMS_SIZE;
    /// `CUpti_PCSamplingDisableParams`
    PcSamplingDisableParams, PC_SAMPLING_DISABLE_PARAMS_SIZE;
    /// `CUpti_PCSamplingStartParams`
    PcSamplingStartParams, PC_SAMPLING_START_PARAMS_SIZE;
    /// `CUpti_PCSamplingStopParams`
    PcSamplingStopParams, PC_SAMPLING_STOP_PARAMS_SIZE;
}
