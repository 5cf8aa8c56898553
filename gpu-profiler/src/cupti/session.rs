//! PC sampling session with local state tracking

use super::bindings::ContextHandle;
use super::buffer::SamplingBuffer;
use super::pcsampling::{self, ConfigurationAttribute};
use super::transport::CuptiApi;
use crate::error::{CuptiError, Result};
use gpuscope_shared::{PcSample, SamplingSummary};
use std::fmt;
use tracing::{info, warn};

/// Lifecycle of PC sampling on one context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disabled,
    Enabled,
    Started,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
            Self::Started => "started",
        };
        f.write_str(s)
    }
}

/// PC sampling on a single context
///
/// Mirrors the vendor state machine so out-of-order calls fail with
/// [`CuptiError::InvalidTransition`] without reaching CUPTI. Dropping a
/// session stops and disables sampling if it is still active.
pub struct PcSamplingSession<'a, A: CuptiApi + ?Sized> {
    api: &'a A,
    ctx: ContextHandle,
    state: SessionState,
}

impl<'a, A: CuptiApi + ?Sized> PcSamplingSession<'a, A> {
    /// Create a session for `ctx`; sampling is not enabled yet
    pub fn new(api: &'a A, ctx: ContextHandle) -> Self {
        Self {
            api,
            ctx,
            state: SessionState::Disabled,
        }
    }

    pub fn context(&self) -> ContextHandle {
        self.ctx
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn expect_state(&self, op: &'static str, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CuptiError::InvalidTransition {
                op,
                state: self.state,
            })
        }
    }

    pub fn enable(&mut self) -> Result<()> {
        self.expect_state("enable", SessionState::Disabled)?;
        pcsampling::enable_pc_sampling(self.api, self.ctx)?;
        self.state = SessionState::Enabled;
        Ok(())
    }

    /// Apply configuration attributes; only allowed while enabled
    pub fn configure(&mut self, attributes: &[ConfigurationAttribute]) -> Result<()> {
        self.expect_state("configure", SessionState::Enabled)?;
        pcsampling::set_configuration_attribute(self.api, self.ctx, attributes)
    }

    pub fn start(&mut self) -> Result<()> {
        self.expect_state("start", SessionState::Enabled)?;
        pcsampling::start_pc_sampling(self.api, self.ctx)?;
        self.state = SessionState::Started;
        info!("PC sampling session started on context {:?}", self.ctx);
        Ok(())
    }

    /// Fill `buffer` once; see [`pcsampling::get_pc_sampling_data`]
    pub fn retrieve(&mut self, buffer: &mut SamplingBuffer) -> Result<()> {
        self.expect_state("retrieve data from", SessionState::Started)?;
        pcsampling::get_pc_sampling_data(self.api, self.ctx, buffer)
    }

    /// Retrieve until nothing remains; see [`pcsampling::drain_pc_sampling_data`]
    pub fn drain<F>(&mut self, buffer: &mut SamplingBuffer, sink: F) -> Result<usize>
    where
        F: FnMut(&SamplingSummary, Vec<PcSample>),
    {
        self.expect_state("drain", SessionState::Started)?;
        pcsampling::drain_pc_sampling_data(self.api, self.ctx, buffer, sink)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.expect_state("stop", SessionState::Started)?;
        pcsampling::stop_pc_sampling(self.api, self.ctx)?;
        self.state = SessionState::Enabled;
        info!("PC sampling session stopped on context {:?}", self.ctx);
        Ok(())
    }

    pub fn disable(&mut self) -> Result<()> {
        self.expect_state("disable", SessionState::Enabled)?;
        pcsampling::disable_pc_sampling(self.api, self.ctx)?;
        self.state = SessionState::Disabled;
        Ok(())
    }
}

impl<A: CuptiApi + ?Sized> Drop for PcSamplingSession<'_, A> {
    fn drop(&mut self) {
        if self.state == SessionState::Started {
            if let Err(e) = self.stop() {
                warn!("Failed to stop PC sampling on drop: {}", e);
                return;
            }
        }
        if self.state == SessionState::Enabled {
            if let Err(e) = self.disable() {
                warn!("Failed to disable PC sampling on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cupti::mock::{MockCupti, MockPcRecord};
    use std::ffi::c_void;

    fn setup() -> (MockCupti, ContextHandle) {
        let api = MockCupti::new();
        let ctx = ContextHandle::from_raw(0x1000 as *mut c_void);
        api.add_context(ctx, 4);
        (api, ctx)
    }

    #[test]
    fn test_lifecycle() {
        let (api, ctx) = setup();
        let mut session = PcSamplingSession::new(&api, ctx);
        assert_eq!(session.state(), SessionState::Disabled);

        session.enable().unwrap();
        session
            .configure(&[ConfigurationAttribute::SamplingPeriod(5)])
            .unwrap();
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Started);
        session.stop().unwrap();
        session.disable().unwrap();
        assert_eq!(session.state(), SessionState::Disabled);
    }

    #[test]
    fn test_start_before_enable() {
        let (api, ctx) = setup();
        let mut session = PcSamplingSession::new(&api, ctx);
        let err = session.start().unwrap_err();
        assert!(matches!(
            err,
            CuptiError::InvalidTransition {
                op: "start",
                state: SessionState::Disabled
            }
        ));
    }

    #[test]
    fn test_configure_while_started() {
        let (api, ctx) = setup();
        let mut session = PcSamplingSession::new(&api, ctx);
        session.enable().unwrap();
        session.start().unwrap();
        assert!(session
            .configure(&[ConfigurationAttribute::SamplingPeriod(9)])
            .is_err());
        assert_eq!(api.sampling_period(ctx), None);
    }

    #[test]
    fn test_double_stop() {
        let (api, ctx) = setup();
        let mut session = PcSamplingSession::new(&api, ctx);
        session.enable().unwrap();
        session.start().unwrap();
        session.stop().unwrap();
        assert!(session.stop().is_err());
        assert_eq!(session.state(), SessionState::Enabled);
    }

    #[test]
    fn test_drop_stops_and_disables() {
        let (api, ctx) = setup();
        {
            let mut session = PcSamplingSession::new(&api, ctx);
            session.enable().unwrap();
            session.start().unwrap();
        }
        // A fresh session can walk the whole lifecycle again
        let mut session = PcSamplingSession::new(&api, ctx);
        session.enable().unwrap();
        session.start().unwrap();
    }

    #[test]
    fn test_drain_collects_everything() {
        let (api, ctx) = setup();
        let mut buffer = SamplingBuffer::new(4, 4).unwrap();
        let mut session = PcSamplingSession::new(&api, ctx);
        session.enable().unwrap();
        session.start().unwrap();

        api.record_samples(
            ctx,
            (0..10).map(|i| MockPcRecord::new("reduce", i * 8, vec![(1, 2)])),
        );

        let mut pcs = 0;
        let mut samples = 0;
        let rounds = session
            .drain(&mut buffer, |summary, batch| {
                pcs += batch.len();
                samples += summary.total_samples;
            })
            .unwrap();

        assert_eq!(rounds, 3);
        assert_eq!(pcs, 10);
        assert_eq!(samples, 20);
        assert_eq!(api.live_vendor_strings(), 0);
    }
}
