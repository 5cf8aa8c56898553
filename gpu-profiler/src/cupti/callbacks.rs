//! CUPTI callback catalogs
//!
//! Groups vendor callback identifiers into the coarse instrumentation classes
//! the profiler arms and disarms as tracing starts and stops: kernel launches
//! through the runtime and driver APIs, graph and generic resource lifecycle,
//! and NVTX ranges.
//!
//! Toggling a catalog is not atomic. Identifiers are armed one at a time and the
//! first vendor failure is returned as is, leaving the identifiers before it
//! toggled. A failure here means the driver does not know an identifier, which
//! the caller should treat as an unusable environment rather than retry.

use super::bindings::*;
use super::transport::CuptiApi;
use crate::error::{check, Result};
use tracing::{debug, trace, warn};

/// A fixed, ordered set of callback identifiers within one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Catalog {
    pub name: &'static str,
    pub domain: CallbackDomain,
    pub ids: &'static [CallbackId],
}

impl Catalog {
    pub fn contains(&self, cbid: CallbackId) -> bool {
        self.ids.contains(&cbid)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Kernel launches and stream capture through the driver API
pub const DRIVER_API_LAUNCH: Catalog = Catalog {
    name: "driver-launch",
    domain: CallbackDomain::DriverApi,
    ids: &[
        CUPTI_DRIVER_TRACE_CBID_cuLaunch,
        CUPTI_DRIVER_TRACE_CBID_cuLaunchGrid,
        CUPTI_DRIVER_TRACE_CBID_cuLaunchGridAsync,
        CUPTI_DRIVER_TRACE_CBID_cuLaunchKernel,
        CUPTI_DRIVER_TRACE_CBID_cuLaunchKernel_ptsz,
        CUPTI_DRIVER_TRACE_CBID_cuLaunchKernelEx,
        CUPTI_DRIVER_TRACE_CBID_cuLaunchKernelEx_ptsz,
        CUPTI_DRIVER_TRACE_CBID_cuLaunchCooperativeKernel,
        CUPTI_DRIVER_TRACE_CBID_cuLaunchCooperativeKernel_ptsz,
        CUPTI_DRIVER_TRACE_CBID_cuLaunchCooperativeKernelMultiDevice,
        CUPTI_DRIVER_TRACE_CBID_cuGraphLaunch,
        CUPTI_DRIVER_TRACE_CBID_cuGraphLaunch_ptsz,
        CUPTI_DRIVER_TRACE_CBID_cuStreamBeginCapture,
        CUPTI_DRIVER_TRACE_CBID_cuStreamBeginCapture_ptsz,
        CUPTI_DRIVER_TRACE_CBID_cuStreamEndCapture,
        CUPTI_DRIVER_TRACE_CBID_cuStreamEndCapture_ptsz,
        CUPTI_DRIVER_TRACE_CBID_cuStreamBeginCapture_v2,
        CUPTI_DRIVER_TRACE_CBID_cuStreamBeginCapture_v2_ptsz,
        CUPTI_DRIVER_TRACE_CBID_cuStreamBeginCaptureToGraph,
        CUPTI_DRIVER_TRACE_CBID_cuStreamBeginCaptureToGraph_ptsz,
    ],
};

/// Kernel launches through the runtime API
pub const RUNTIME_API_LAUNCH: Catalog = Catalog {
    name: "runtime-launch",
    domain: CallbackDomain::RuntimeApi,
    ids: &[
        CUPTI_RUNTIME_TRACE_CBID_cudaLaunch_v3020,
        CUPTI_RUNTIME_TRACE_CBID_cudaLaunchKernel_v7000,
        CUPTI_RUNTIME_TRACE_CBID_cudaLaunch_ptsz_v7000,
        CUPTI_RUNTIME_TRACE_CBID_cudaLaunchKernel_ptsz_v7000,
        CUPTI_RUNTIME_TRACE_CBID_cudaLaunchKernelExC_v11060,
        CUPTI_RUNTIME_TRACE_CBID_cudaLaunchKernelExC_ptsz_v11060,
        CUPTI_RUNTIME_TRACE_CBID_cudaLaunchCooperativeKernel_v9000,
        CUPTI_RUNTIME_TRACE_CBID_cudaLaunchCooperativeKernel_ptsz_v9000,
        CUPTI_RUNTIME_TRACE_CBID_cudaLaunchCooperativeKernelMultiDevice_v9000,
        CUPTI_RUNTIME_TRACE_CBID_cudaGraphLaunch_v10000,
        CUPTI_RUNTIME_TRACE_CBID_cudaGraphLaunch_ptsz_v10000,
    ],
};

/// Graph node and executable graph lifecycle
pub const GRAPH_RESOURCE: Catalog = Catalog {
    name: "graph-resource",
    domain: CallbackDomain::Resource,
    ids: &[
        CUPTI_CBID_RESOURCE_GRAPHNODE_CREATED,
        CUPTI_CBID_RESOURCE_GRAPHNODE_CLONED,
        CUPTI_CBID_RESOURCE_GRAPHNODE_DESTROY_STARTING,
        CUPTI_CBID_RESOURCE_GRAPHEXEC_CREATED,
        CUPTI_CBID_RESOURCE_GRAPHEXEC_DESTROY_STARTING,
    ],
};

/// Module load/unload and context create/destroy
pub const GENERIC_RESOURCE: Catalog = Catalog {
    name: "resource",
    domain: CallbackDomain::Resource,
    ids: &[
        CUPTI_CBID_RESOURCE_MODULE_LOADED,
        CUPTI_CBID_RESOURCE_MODULE_UNLOAD_STARTING,
        CUPTI_CBID_RESOURCE_CONTEXT_CREATED,
        CUPTI_CBID_RESOURCE_CONTEXT_DESTROY_STARTING,
    ],
};

/// NVTX range push/pop
pub const NVTX_RANGE: Catalog = Catalog {
    name: "nvtx",
    domain: CallbackDomain::Nvtx,
    ids: &[
        CUPTI_CBID_NVTX_nvtxRangePushA,
        CUPTI_CBID_NVTX_nvtxRangePop,
    ],
};

/// All catalogs, in the order the profiler arms them
pub const CATALOGS: [Catalog; 5] = [
    RUNTIME_API_LAUNCH,
    DRIVER_API_LAUNCH,
    GRAPH_RESOURCE,
    GENERIC_RESOURCE,
    NVTX_RANGE,
];

/// Arm or disarm every identifier of `catalog` on `subscriber`
pub fn set_catalog_callbacks<A: CuptiApi + ?Sized>(
    api: &A,
    subscriber: SubscriberHandle,
    catalog: &Catalog,
    enable: bool,
) -> Result<()> {
    debug!(
        "{} {} callbacks ({} ids in {} domain)",
        if enable { "Enabling" } else { "Disabling" },
        catalog.name,
        catalog.len(),
        catalog.domain
    );

    for &cbid in catalog.ids {
        trace!("cuptiEnableCallback({}, {}, {})", enable, catalog.domain, cbid);
        // SAFETY: the subscriber is owned by the caller and outlives this call.
        let result =
            unsafe { api.enable_callback(u32::from(enable), subscriber, catalog.domain, cbid) };
        if let Err(e) = check("cuptiEnableCallback", result) {
            warn!(
                "Failed to toggle {} callback {} in {} domain: {}",
                catalog.name, cbid, catalog.domain, e
            );
            return Err(e);
        }
    }

    Ok(())
}

/// Enable/disable runtime API callbacks for kernel launches
pub fn set_runtime_callbacks<A: CuptiApi + ?Sized>(
    api: &A,
    subscriber: SubscriberHandle,
    enable: bool,
) -> Result<()> {
    set_catalog_callbacks(api, subscriber, &RUNTIME_API_LAUNCH, enable)
}

/// Enable/disable driver API callbacks for kernel launches
pub fn set_driver_callbacks<A: CuptiApi + ?Sized>(
    api: &A,
    subscriber: SubscriberHandle,
    enable: bool,
) -> Result<()> {
    set_catalog_callbacks(api, subscriber, &DRIVER_API_LAUNCH, enable)
}

/// Enable/disable graph resource callbacks
pub fn set_graph_callbacks<A: CuptiApi + ?Sized>(
    api: &A,
    subscriber: SubscriberHandle,
    enable: bool,
) -> Result<()> {
    set_catalog_callbacks(api, subscriber, &GRAPH_RESOURCE, enable)
}

/// Enable/disable resource callbacks (module load/unload, context create/destroy)
pub fn set_resource_callbacks<A: CuptiApi + ?Sized>(
    api: &A,
    subscriber: SubscriberHandle,
    enable: bool,
) -> Result<()> {
    set_catalog_callbacks(api, subscriber, &GENERIC_RESOURCE, enable)
}

/// Enable/disable NVTX callbacks
pub fn set_nvtx_callbacks<A: CuptiApi + ?Sized>(
    api: &A,
    subscriber: SubscriberHandle,
    enable: bool,
) -> Result<()> {
    set_catalog_callbacks(api, subscriber, &NVTX_RANGE, enable)
}

/// Check if a callback ID is a driver API launch
pub fn is_driver_api_launch(cbid: CallbackId) -> bool {
    DRIVER_API_LAUNCH.contains(cbid)
}
