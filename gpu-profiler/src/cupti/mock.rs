//! In-memory CUPTI for tests and GPU-less development
//!
//! [`MockCupti`] models the parts of the vendor library the core relies on:
//! callback arming, the per-context enable/start state machine, attribute
//! validation, buffered PC records and the allocation of vendor strings. Every
//! string it hands out is tracked so tests can assert that each one is freed
//! exactly once.

use super::bindings::*;
use super::session::SessionState;
use super::transport::CuptiApi;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::ffi::{c_char, CStr, CString};
use std::mem::size_of;
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

const STALL_REASON_NAMES: &[&str] = &[
    "barrier",
    "branch_resolving",
    "dispatch_stall",
    "drain",
    "imc_miss",
    "lg_throttle",
    "long_scoreboard",
    "math_pipe_throttle",
    "membar",
    "mio_throttle",
    "misc",
    "no_instructions",
    "not_selected",
    "selected",
    "short_scoreboard",
    "sleeping",
    "tex_throttle",
    "wait",
];

/// A PC record queued for retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPcRecord {
    pub function_name: String,
    pub pc_offset: u64,
    pub cubin_crc: u64,
    pub function_index: u32,
    pub correlation_id: u32,
    /// `(stall reason index, samples)` pairs
    pub stall_reasons: Vec<(u32, u32)>,
}

impl MockPcRecord {
    pub fn new(function_name: &str, pc_offset: u64, stall_reasons: Vec<(u32, u32)>) -> Self {
        Self {
            function_name: function_name.to_string(),
            pc_offset,
            cubin_crc: 0,
            function_index: 0,
            correlation_id: 0,
            stall_reasons,
        }
    }

    pub fn with_cubin_crc(mut self, cubin_crc: u64) -> Self {
        self.cubin_crc = cubin_crc;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: u32) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    fn total_samples(&self) -> u64 {
        self.stall_reasons.iter().map(|&(_, n)| u64::from(n)).sum()
    }
}

#[derive(Debug)]
struct MockContext {
    num_stall_reasons: usize,
    state: SessionState,
    sampling_period: Option<u32>,
    stall_reasons: Option<Vec<u32>>,
    pending: VecDeque<MockPcRecord>,
    dropped: u64,
    range_id: u64,
}

#[derive(Debug)]
struct MockMapping {
    line: u32,
    file: Option<String>,
    dir: Option<String>,
    result: CuptiResult,
}

#[derive(Debug, Default)]
struct MockState {
    armed: BTreeSet<(usize, u32, CallbackId)>,
    rejected: HashSet<(u32, CallbackId)>,
    contexts: HashMap<usize, MockContext>,
    mappings: HashMap<(String, u64), MockMapping>,
    live_strings: HashSet<usize>,
    invalid_frees: usize,
}

impl MockState {
    fn alloc_string(&mut self, s: &str) -> *mut c_char {
        let ptr = CString::new(s.replace('\0', ""))
            .unwrap_or_default()
            .into_raw();
        self.live_strings.insert(ptr as usize);
        ptr
    }

    fn context(&mut self, ctx: ContextHandle) -> Result<&mut MockContext, CuptiResult> {
        self.contexts
            .get_mut(&(ctx.as_raw() as usize))
            .ok_or(CuptiResult::ERROR_INVALID_CONTEXT)
    }
}

/// In-memory [`CuptiApi`]
#[derive(Debug, Default)]
pub struct MockCupti {
    state: Mutex<MockState>,
}

/// Bail out of a trait method with the given code
macro_rules! try_cupti {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(code) => return code,
        }
    };
}

fn check_size(size: usize, expected: usize) -> Result<(), CuptiResult> {
    if size < expected {
        Err(CuptiResult::ERROR_PARAMETER_SIZE_NOT_SUFFICIENT)
    } else {
        Ok(())
    }
}

fn expect_state(ctx: &MockContext, expected: SessionState) -> Result<(), CuptiResult> {
    if ctx.state == expected {
        Ok(())
    } else {
        Err(CuptiResult::ERROR_INVALID_OPERATION)
    }
}

/// FNV-1a, stable across runs
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl MockCupti {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a context supporting `num_stall_reasons` stall reasons
    pub fn add_context(&self, ctx: ContextHandle, num_stall_reasons: usize) {
        self.lock().contexts.insert(
            ctx.as_raw() as usize,
            MockContext {
                num_stall_reasons,
                state: SessionState::Disabled,
                sampling_period: None,
                stall_reasons: None,
                pending: VecDeque::new(),
                dropped: 0,
                range_id: 0,
            },
        );
    }

    /// Make `cuptiEnableCallback` fail for one identifier
    pub fn reject_callback(&self, domain: CallbackDomain, cbid: CallbackId) {
        self.lock().rejected.insert((domain.raw(), cbid));
    }

    pub fn is_armed(
        &self,
        subscriber: SubscriberHandle,
        domain: CallbackDomain,
        cbid: CallbackId,
    ) -> bool {
        self.lock()
            .armed
            .contains(&(subscriber.as_raw() as usize, domain.raw(), cbid))
    }

    /// Every callback armed for `subscriber`
    pub fn armed(&self, subscriber: SubscriberHandle) -> Vec<(CallbackDomain, CallbackId)> {
        let key = subscriber.as_raw() as usize;
        self.lock()
            .armed
            .iter()
            .filter(|(sub, _, _)| *sub == key)
            .filter_map(|&(_, domain, cbid)| Some((CallbackDomain::from_raw(domain)?, cbid)))
            .collect()
    }

    pub fn state(&self, ctx: ContextHandle) -> Option<SessionState> {
        self.lock()
            .contexts
            .get(&(ctx.as_raw() as usize))
            .map(|c| c.state)
    }

    pub fn sampling_period(&self, ctx: ContextHandle) -> Option<u32> {
        self.lock()
            .contexts
            .get(&(ctx.as_raw() as usize))
            .and_then(|c| c.sampling_period)
    }

    pub fn selected_stall_reasons(&self, ctx: ContextHandle) -> Option<Vec<u32>> {
        self.lock()
            .contexts
            .get(&(ctx.as_raw() as usize))
            .and_then(|c| c.stall_reasons.clone())
    }

    /// Queue records as if the GPU had sampled them
    ///
    /// Only accepted while sampling is started; returns whether they were.
    pub fn record_samples(
        &self,
        ctx: ContextHandle,
        records: impl IntoIterator<Item = MockPcRecord>,
    ) -> bool {
        let mut state = self.lock();
        match state.context(ctx) {
            Ok(c) if c.state == SessionState::Started => {
                c.pending.extend(records);
                c.range_id += 1;
                true
            }
            _ => false,
        }
    }

    /// Report `dropped` samples on the next retrieval
    pub fn set_dropped(&self, ctx: ContextHandle, dropped: u64) {
        if let Ok(c) = self.lock().context(ctx) {
            c.dropped = dropped;
        }
    }

    /// Map `(function_name, pc_offset)` to a source location
    pub fn add_source_mapping(
        &self,
        function_name: &str,
        pc_offset: u64,
        line: u32,
        file: Option<&str>,
        dir: Option<&str>,
    ) {
        self.insert_mapping(function_name, pc_offset, line, file, dir, CuptiResult::SUCCESS);
    }

    /// Fail the lookup with `result` after allocating the given names
    pub fn add_failing_mapping(
        &self,
        function_name: &str,
        pc_offset: u64,
        file: Option<&str>,
        dir: Option<&str>,
        result: CuptiResult,
    ) {
        self.insert_mapping(function_name, pc_offset, 0, file, dir, result);
    }

    fn insert_mapping(
        &self,
        function_name: &str,
        pc_offset: u64,
        line: u32,
        file: Option<&str>,
        dir: Option<&str>,
        result: CuptiResult,
    ) {
        self.lock().mappings.insert(
            (function_name.to_string(), pc_offset),
            MockMapping {
                line,
                file: file.map(str::to_string),
                dir: dir.map(str::to_string),
                result,
            },
        );
    }

    /// Vendor strings handed out and not yet freed
    pub fn live_vendor_strings(&self) -> usize {
        self.lock().live_strings.len()
    }

    /// Frees of pointers that were never handed out or already freed
    pub fn invalid_frees(&self) -> usize {
        self.lock().invalid_frees
    }

    fn transition(
        &self,
        ctx: ContextHandle,
        from: SessionState,
        to: SessionState,
    ) -> CuptiResult {
        let mut state = self.lock();
        let c = try_cupti!(state.context(ctx));
        try_cupti!(expect_state(c, from));
        c.state = to;
        CuptiResult::SUCCESS
    }
}

impl Drop for MockState {
    fn drop(&mut self) {
        for ptr in self.live_strings.drain() {
            // SAFETY: every live pointer came from `CString::into_raw`.
            drop(unsafe { CString::from_raw(ptr as *mut c_char) });
        }
    }
}

impl CuptiApi for MockCupti {
    unsafe fn enable_callback(
        &self,
        enable: u32,
        subscriber: SubscriberHandle,
        domain: CallbackDomain,
        cbid: CallbackId,
    ) -> CuptiResult {
        if subscriber.is_null() {
            return CuptiResult::ERROR_INVALID_PARAMETER;
        }
        let mut state = self.lock();
        if state.rejected.contains(&(domain.raw(), cbid)) {
            return CuptiResult::ERROR_NOT_COMPATIBLE;
        }
        let key = (subscriber.as_raw() as usize, domain.raw(), cbid);
        if enable != 0 {
            state.armed.insert(key);
        } else {
            state.armed.remove(&key);
        }
        CuptiResult::SUCCESS
    }

    unsafe fn get_cubin_crc(&self, params: &mut GetCubinCrcParams) -> CuptiResult {
        try_cupti!(check_size(params.size, GET_CUBIN_CRC_PARAMS_SIZE));
        if params.cubin.is_null() || params.cubin_size == 0 {
            return CuptiResult::ERROR_INVALID_PARAMETER;
        }
        let image = std::slice::from_raw_parts(params.cubin.cast::<u8>(), params.cubin_size);
        params.cubin_crc = fnv1a(image);
        CuptiResult::SUCCESS
    }

    unsafe fn pc_sampling_get_num_stall_reasons(
        &self,
        params: &mut PcSamplingGetNumStallReasonsParams,
    ) -> CuptiResult {
        try_cupti!(check_size(
            params.size,
            PC_SAMPLING_GET_NUM_STALL_REASONS_PARAMS_SIZE
        ));
        if params.num_stall_reasons.is_null() {
            return CuptiResult::ERROR_INVALID_PARAMETER;
        }
        let mut state = self.lock();
        let c = try_cupti!(state.context(params.ctx));
        *params.num_stall_reasons = c.num_stall_reasons;
        CuptiResult::SUCCESS
    }

    unsafe fn pc_sampling_get_stall_reasons(
        &self,
        params: &mut PcSamplingGetStallReasonsParams,
    ) -> CuptiResult {
        try_cupti!(check_size(
            params.size,
            PC_SAMPLING_GET_STALL_REASONS_PARAMS_SIZE
        ));
        if params.stall_reason_index.is_null() || params.stall_reasons.is_null() {
            return CuptiResult::ERROR_INVALID_PARAMETER;
        }
        let mut state = self.lock();
        let c = try_cupti!(state.context(params.ctx));
        if params.num_stall_reasons > c.num_stall_reasons {
            return CuptiResult::ERROR_INVALID_PARAMETER;
        }

        for i in 0..params.num_stall_reasons {
            let suffix = STALL_REASON_NAMES
                .get(i)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("reason_{i}"));
            let name = format!("smsp__pcsamp_warps_issue_stalled_{suffix}");
            let len = name.len().min(CUPTI_STALL_REASON_STRING_SIZE - 1);

            *params.stall_reason_index.add(i) = i as u32;
            let dst = *params.stall_reasons.add(i);
            ptr::copy_nonoverlapping(name.as_ptr(), dst.cast::<u8>(), len);
            *dst.add(len) = 0;
        }
        CuptiResult::SUCCESS
    }

    unsafe fn get_sass_to_source_correlation(
        &self,
        params: &mut GetSassToSourceCorrelationParams,
    ) -> CuptiResult {
        try_cupti!(check_size(
            params.size,
            GET_SASS_TO_SOURCE_CORRELATION_PARAMS_SIZE
        ));
        if params.cubin.is_null() || params.cubin_size == 0 || params.function_name.is_null() {
            return CuptiResult::ERROR_INVALID_PARAMETER;
        }
        let name = CStr::from_ptr(params.function_name)
            .to_string_lossy()
            .into_owned();

        let mut state = self.lock();
        let Some(mapping) = state.mappings.get(&(name, params.pc_offset)) else {
            return CuptiResult::ERROR_UNKNOWN;
        };
        let (line, file, dir, result) = (
            mapping.line,
            mapping.file.clone(),
            mapping.dir.clone(),
            mapping.result,
        );

        params.line_number = line;
        if let Some(file) = file {
            params.file_name = state.alloc_string(&file);
        }
        if let Some(dir) = dir {
            params.dir_name = state.alloc_string(&dir);
        }
        result
    }

    unsafe fn pc_sampling_enable(&self, params: &mut PcSamplingEnableParams) -> CuptiResult {
        try_cupti!(check_size(params.size, PC_SAMPLING_ENABLE_PARAMS_SIZE));
        self.transition(params.ctx, SessionState::Disabled, SessionState::Enabled)
    }

    unsafe fn pc_sampling_disable(&self, params: &mut PcSamplingDisableParams) -> CuptiResult {
        try_cupti!(check_size(params.size, PC_SAMPLING_DISABLE_PARAMS_SIZE));
        let result = self.transition(params.ctx, SessionState::Enabled, SessionState::Disabled);
        if result.is_success() {
            if let Ok(c) = self.lock().context(params.ctx) {
                c.pending.clear();
                c.sampling_period = None;
                c.stall_reasons = None;
            }
        }
        result
    }

    unsafe fn pc_sampling_start(&self, params: &mut PcSamplingStartParams) -> CuptiResult {
        try_cupti!(check_size(params.size, PC_SAMPLING_START_PARAMS_SIZE));
        self.transition(params.ctx, SessionState::Enabled, SessionState::Started)
    }

    unsafe fn pc_sampling_stop(&self, params: &mut PcSamplingStopParams) -> CuptiResult {
        try_cupti!(check_size(params.size, PC_SAMPLING_STOP_PARAMS_SIZE));
        self.transition(params.ctx, SessionState::Started, SessionState::Enabled)
    }

    unsafe fn pc_sampling_get_data(&self, params: &mut PcSamplingGetDataParams) -> CuptiResult {
        try_cupti!(check_size(params.size, PC_SAMPLING_GET_DATA_PARAMS_SIZE));
        if params.pc_sampling_data.is_null() {
            return CuptiResult::ERROR_INVALID_PARAMETER;
        }
        let header = &mut *params.pc_sampling_data.cast::<PcSamplingData>();
        if header.size < size_of::<PcSamplingData>() || header.p_pc_data.is_null() {
            return CuptiResult::ERROR_INVALID_PARAMETER;
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        let c = try_cupti!(state
            .contexts
            .get_mut(&(params.ctx.as_raw() as usize))
            .ok_or(CuptiResult::ERROR_INVALID_CONTEXT));
        try_cupti!(expect_state(c, SessionState::Started));

        let n = header.collect_num_pcs.min(c.pending.len());
        let mut total_samples = 0;
        let records: Vec<MockPcRecord> = c.pending.drain(..n).collect();
        let max_reasons = c.num_stall_reasons;

        header.total_num_pcs = n;
        header.remaining_num_pcs = c.pending.len();
        header.dropped_samples = std::mem::take(&mut c.dropped);
        header.range_id = c.range_id;
        header.non_usr_kernels_total_samples = 0;
        header.hardware_buffer_full = 0;

        for (i, record) in records.iter().enumerate() {
            let entry = &mut *header.p_pc_data.add(i);
            let count = record.stall_reasons.len().min(max_reasons);

            entry.size = size_of::<PcSamplingPcData>();
            entry.cubin_crc = record.cubin_crc;
            entry.pc_offset = record.pc_offset;
            entry.function_index = record.function_index;
            entry.correlation_id = record.correlation_id;
            entry.stall_reason_count = count;
            entry.function_name = state.alloc_string(&record.function_name);

            // The caller sized each record's array for the context's stall
            // reason count
            for (j, &(index, samples)) in record.stall_reasons.iter().take(count).enumerate() {
                *entry.stall_reason.add(j) = PcSamplingStallReason {
                    pc_sampling_stall_reason_index: index,
                    samples,
                };
            }
            total_samples += record.total_samples();
        }
        header.total_samples = total_samples;

        CuptiResult::SUCCESS
    }

    unsafe fn pc_sampling_set_configuration_attribute(
        &self,
        params: &mut PcSamplingConfigurationInfoParams,
    ) -> CuptiResult {
        try_cupti!(check_size(
            params.size,
            PC_SAMPLING_CONFIGURATION_INFO_PARAMS_SIZE
        ));
        if params.num_attributes > 0 && params.p_pc_sampling_configuration_info.is_null() {
            return CuptiResult::ERROR_INVALID_PARAMETER;
        }
        let mut state = self.lock();
        let c = try_cupti!(state.context(params.ctx));
        try_cupti!(expect_state(c, SessionState::Enabled));

        let infos: &mut [PcSamplingConfigurationInfo] = if params.num_attributes == 0 {
            &mut []
        } else {
            std::slice::from_raw_parts_mut(
                params.p_pc_sampling_configuration_info,
                params.num_attributes,
            )
        };

        // Validate everything before applying anything
        let mut failed = false;
        for info in infos.iter_mut() {
            let data = &info.attribute_data;
            let ok = match info.attribute_type {
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_SAMPLING_PERIOD => {
                    data.sampling_period != 0
                }
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_STALL_REASON => {
                    let sr = data.stall_reason;
                    (sr.stall_reason_count == 0 || !sr.p_stall_reason_index.is_null())
                        && (0..sr.stall_reason_count).all(|i| {
                            (*sr.p_stall_reason_index.add(i) as usize) < c.num_stall_reasons
                        })
                }
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_COLLECTION_MODE => matches!(
                    data.collection_mode,
                    CUPTI_PC_SAMPLING_COLLECTION_MODE_CONTINUOUS
                        | CUPTI_PC_SAMPLING_COLLECTION_MODE_KERNEL_SERIALIZED
                ),
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_OUTPUT_DATA_FORMAT => {
                    data.output_data_format == CUPTI_PC_SAMPLING_OUTPUT_DATA_FORMAT_PARSED
                }
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_SAMPLING_DATA_BUFFER => {
                    !data.sampling_data_buffer.is_null()
                }
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_SCRATCH_BUFFER_SIZE
                | CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_HARDWARE_BUFFER_SIZE
                | CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_ENABLE_START_STOP_CONTROL
                | CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_WORKER_THREAD_PERIODIC_SLEEP_SPAN => {
                    true
                }
                _ => false,
            };
            info.attribute_status = if ok {
                CuptiResult::SUCCESS
            } else {
                failed = true;
                CuptiResult::ERROR_INVALID_PARAMETER
            };
        }
        if failed {
            return CuptiResult::ERROR_INVALID_PARAMETER;
        }

        for info in infos.iter() {
            let data = &info.attribute_data;
            match info.attribute_type {
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_SAMPLING_PERIOD => {
                    c.sampling_period = Some(data.sampling_period);
                }
                CUPTI_PC_SAMPLING_CONFIGURATION_ATTR_TYPE_STALL_REASON => {
                    let sr = data.stall_reason;
                    let indices = if sr.stall_reason_count == 0 {
                        Vec::new()
                    } else {
                        std::slice::from_raw_parts(sr.p_stall_reason_index, sr.stall_reason_count)
                            .to_vec()
                    };
                    c.stall_reasons = Some(indices);
                }
                _ => {}
            }
        }
        CuptiResult::SUCCESS
    }

    unsafe fn free_vendor_string(&self, ptr: *mut c_char) {
        let mut state = self.lock();
        if state.live_strings.remove(&(ptr as usize)) {
            drop(CString::from_raw(ptr));
        } else {
            state.invalid_frees += 1;
        }
    }
}
