use gpuscope_cupti::cupti::bindings::{ContextHandle, PcSamplingStallReason};
use gpuscope_cupti::cupti::mock::{MockCupti, MockPcRecord};
use gpuscope_cupti::cupti::pcsampling::{self, ConfigurationAttribute, Strictness};
use gpuscope_cupti::{CuptiError, PcSamplingSession, Result, SampleAggregator, SamplingConfig};
use std::ffi::c_void;

const NUM_STALL_REASONS: usize = 3;
const CUBIN: &[u8] = b"\x7fELF\x02\x01\x01 sm_90 image";

fn ctx() -> ContextHandle {
    ContextHandle::from_raw(0xc7c as *mut c_void)
}

fn setup() -> MockCupti {
    let api = MockCupti::new();
    api.add_context(ctx(), NUM_STALL_REASONS);
    api
}

/// 50 single-sample PCs spread over the three stall reasons
fn fifty_samples() -> Vec<MockPcRecord> {
    (0..50u32)
        .map(|i| {
            MockPcRecord::new("attention_fwd", u64::from(i) * 16, vec![(i % 3, 1)])
                .with_cubin_crc(0xfeed)
                .with_correlation_id(i)
        })
        .collect()
}

fn enable_configure_start(api: &MockCupti) -> Result<()> {
    pcsampling::enable_pc_sampling(api, ctx())?;
    pcsampling::set_configuration_attribute(
        api,
        ctx(),
        &[ConfigurationAttribute::SamplingPeriod(1000)],
    )?;
    pcsampling::start_pc_sampling(api, ctx())?;
    assert_eq!(api.sampling_period(ctx()), Some(1000));
    Ok(())
}

#[test]
fn test_allocation_shape() -> Result<()> {
    let buffer = pcsampling::alloc_pc_sampling_data(50, NUM_STALL_REASONS)?;

    assert_eq!(buffer.collect_num_pcs(), 50);
    assert_eq!(buffer.entries().len(), 50);
    assert_eq!(buffer.total_num_pcs(), 0);
    assert_eq!(buffer.remaining_num_pcs(), 0);
    for i in 0..50 {
        let reasons = buffer.stall_reasons(i).unwrap();
        assert_eq!(reasons.len(), NUM_STALL_REASONS);
        assert!(reasons
            .iter()
            .all(|r| *r == PcSamplingStallReason::default()));
    }

    assert!(matches!(
        pcsampling::alloc_pc_sampling_data(0, NUM_STALL_REASONS),
        Err(CuptiError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn test_end_to_end_single_retrieval() -> Result<()> {
    let api = setup();
    let mut buffer = pcsampling::alloc_pc_sampling_data(50, NUM_STALL_REASONS)?;

    enable_configure_start(&api)?;
    assert!(api.record_samples(ctx(), fifty_samples()));

    pcsampling::get_pc_sampling_data(&api, ctx(), &mut buffer)?;
    assert_eq!(buffer.total_samples(), 50);
    assert_eq!(buffer.remaining_num_pcs(), 0);
    assert_eq!(buffer.dropped_samples(), 0);
    assert_eq!(buffer.total_num_pcs(), 50);

    let samples = buffer.take_samples(&api);
    assert_eq!(samples.len(), 50);
    assert_eq!(samples[7].pc_offset, 7 * 16);
    assert_eq!(samples[7].cubin_crc, 0xfeed);
    assert_eq!(samples[7].correlation_id, 7);
    assert_eq!(samples[7].function_name.as_deref(), Some("attention_fwd"));
    assert_eq!(samples[7].stall_reasons[0].index, 1);
    assert_eq!(api.live_vendor_strings(), 0);

    pcsampling::stop_pc_sampling(&api, ctx())?;
    pcsampling::disable_pc_sampling(&api, ctx())?;
    assert_eq!(api.invalid_frees(), 0);
    Ok(())
}

#[test]
fn test_end_to_end_small_buffer() -> Result<()> {
    let api = setup();
    let mut buffer = pcsampling::alloc_pc_sampling_data(20, NUM_STALL_REASONS)?;

    enable_configure_start(&api)?;
    api.record_samples(ctx(), fifty_samples());

    pcsampling::get_pc_sampling_data(&api, ctx(), &mut buffer)?;
    assert_eq!(buffer.total_num_pcs(), 20);
    assert_eq!(buffer.remaining_num_pcs(), 30);

    pcsampling::get_pc_sampling_data(&api, ctx(), &mut buffer)?;
    assert_eq!(buffer.total_num_pcs(), 20);
    assert_eq!(buffer.remaining_num_pcs(), 10);

    pcsampling::get_pc_sampling_data(&api, ctx(), &mut buffer)?;
    assert_eq!(buffer.total_num_pcs(), 10);
    assert_eq!(buffer.remaining_num_pcs(), 0);

    buffer.release_vendor_strings(&api);
    assert_eq!(api.live_vendor_strings(), 0);

    pcsampling::stop_pc_sampling(&api, ctx())?;
    pcsampling::disable_pc_sampling(&api, ctx())?;
    Ok(())
}

#[test]
fn test_drain_into_aggregator() -> Result<()> {
    let api = setup();
    let mut buffer = pcsampling::alloc_pc_sampling_data(20, NUM_STALL_REASONS)?;
    let mut aggregator = SampleAggregator::new();

    enable_configure_start(&api)?;
    api.record_samples(ctx(), fifty_samples());
    api.set_dropped(ctx(), 4);

    let rounds = pcsampling::drain_pc_sampling_data(&api, ctx(), &mut buffer, |summary, batch| {
        aggregator.add_summary(summary);
        aggregator.add_samples(batch);
    })?;

    assert_eq!(rounds, 3);
    assert_eq!(aggregator.total_samples(), 50);
    assert_eq!(aggregator.dropped_samples(), 4);
    assert_eq!(aggregator.num_pcs(), 50);
    assert_eq!(aggregator.stall_reason_totals(), vec![(0, 17), (1, 17), (2, 16)]);
    assert_eq!(api.live_vendor_strings(), 0);
    Ok(())
}

#[test]
fn test_state_machine_misuse() -> Result<()> {
    let api = setup();

    // Start without enable
    assert!(pcsampling::start_pc_sampling(&api, ctx()).is_err());

    pcsampling::enable_pc_sampling(&api, ctx())?;
    pcsampling::start_pc_sampling(&api, ctx())?;
    pcsampling::stop_pc_sampling(&api, ctx())?;

    // Second stop
    assert!(pcsampling::stop_pc_sampling(&api, ctx()).is_err());
    Ok(())
}

#[test]
fn test_session_with_config() -> Result<()> {
    let api = setup();
    let config = SamplingConfig {
        collect_num_pcs: 16,
        stall_reasons: Some(vec![0, 2]),
        ..Default::default()
    };
    let mut buffer = pcsampling::alloc_pc_sampling_data(config.collect_num_pcs, NUM_STALL_REASONS)?;

    let mut session = PcSamplingSession::new(&api, ctx());
    session.enable()?;
    let mut attributes = config.attributes();
    // SAFETY: `buffer` is declared before `session`, so the session's drop
    // disables sampling before the buffer is freed.
    let bound = unsafe { buffer.as_data_buffer_ptr() };
    attributes.push(ConfigurationAttribute::SamplingDataBuffer(bound));
    session.configure(&attributes)?;
    assert_eq!(api.selected_stall_reasons(ctx()), Some(vec![0, 2]));

    session.start()?;
    api.record_samples(ctx(), fifty_samples().into_iter().take(5));
    session.retrieve(&mut buffer)?;
    assert_eq!(buffer.take_samples(&api).len(), 5);

    assert!(matches!(
        session.configure(&attributes),
        Err(CuptiError::InvalidTransition { .. })
    ));
    session.stop()?;
    session.disable()?;
    Ok(())
}

#[test]
fn test_buffer_reused_across_start_stop_cycles() -> Result<()> {
    let api = setup();
    let mut buffer = pcsampling::alloc_pc_sampling_data(8, NUM_STALL_REASONS)?;
    let mut session = PcSamplingSession::new(&api, ctx());
    session.enable()?;

    session.start()?;
    api.record_samples(ctx(), fifty_samples().into_iter().take(6));
    session.retrieve(&mut buffer)?;
    assert_eq!(buffer.total_num_pcs(), 6);
    assert_eq!(api.live_vendor_strings(), 6);
    session.stop()?;

    session.start()?;
    let second = (0..3u32).map(|i| {
        MockPcRecord::new("softmax_bwd", 0x800 + u64::from(i) * 8, vec![(2, 5)])
            .with_correlation_id(100 + i)
    });
    api.record_samples(ctx(), second);
    session.retrieve(&mut buffer)?;

    // Names from the first fill were released before the second one
    assert_eq!(buffer.total_num_pcs(), 3);
    assert_eq!(buffer.total_samples(), 15);
    assert_eq!(api.live_vendor_strings(), 3);

    let samples = buffer.take_samples(&api);
    assert_eq!(samples.len(), 3);
    assert!(samples
        .iter()
        .all(|s| s.function_name.as_deref() == Some("softmax_bwd")));
    assert_eq!(samples[2].pc_offset, 0x810);
    assert_eq!(samples[2].correlation_id, 102);
    assert_eq!(samples[2].stall_reasons.len(), 1);
    assert_eq!(samples[2].stall_reasons[0].samples, 5);

    session.stop()?;
    session.disable()?;
    assert_eq!(api.live_vendor_strings(), 0);
    assert_eq!(api.invalid_frees(), 0);
    Ok(())
}

#[test]
fn test_correlation_modes() -> Result<()> {
    let api = setup();
    api.add_source_mapping("attention_fwd", 0x40, 88, Some("attn.py"), Some("/work"));

    let loc = pcsampling::get_sass_to_source_correlation(
        &api,
        "attention_fwd",
        0x40,
        CUBIN,
        Strictness::Strict,
    )?;
    assert_eq!(loc.line, 88);
    assert_eq!(loc.path(), std::path::Path::new("/work/attn.py"));

    let missing = pcsampling::get_sass_to_source_correlation(
        &api,
        "attention_fwd",
        0x44,
        CUBIN,
        Strictness::Lenient,
    )?;
    assert_eq!(missing.line, 0);
    assert!(missing.file.is_empty());
    assert!(missing.dir.is_empty());

    assert!(pcsampling::get_sass_to_source_correlation(
        &api,
        "attention_fwd",
        0x44,
        CUBIN,
        Strictness::Strict,
    )
    .is_err());

    assert_eq!(api.live_vendor_strings(), 0);
    assert_eq!(api.invalid_frees(), 0);
    Ok(())
}

#[test]
fn test_cubin_crc_identifies_image() -> Result<()> {
    let api = setup();
    let crc = pcsampling::get_cubin_crc(&api, CUBIN)?;
    assert_eq!(crc, pcsampling::get_cubin_crc(&api, CUBIN)?);
    assert!(pcsampling::get_cubin_crc(&api, &[]).is_err());
    Ok(())
}
