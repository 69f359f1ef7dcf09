//! Lifecycle controller: init, prepare, process, reset, free.
//!
//! Key invariants:
//! - init against a missing id fails NotFound with nothing allocated
//! - a second prepare makes no capability calls
//! - process reports exactly what the codec reports
//! - reset returns to READY, or surfaces the re-init failure unchanged
//! - every teardown path releases each allocation exactly once

use std::sync::Arc;

use aulos::codec::{
    AdapterConfig, AdapterError, AdapterState, CapabilityRegistry, CodecAdapter, CodecStatus,
    ConfigKind, InitPhase, KnownCodec,
};
use aulos_test_utils::{CodecCall, CountingAllocator, Op, ScriptedCodec};
use rstest::rstest;

use crate::common::{
    SCRIPTED_ID, SETUP_PARAM, counter, scripted_adapter, standard_codec, tracing_setup,
};

fn prepared(codec: &ScriptedCodec, counter: &Arc<CountingAllocator>) -> CodecAdapter {
    let mut adapter = scripted_adapter(codec, counter);
    adapter.init().unwrap();
    adapter.prepare().unwrap();
    adapter
}

#[rstest]
fn init_resolves_every_registered_id(
    #[from(tracing_setup)] _tracing: (),
    #[values(0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07)] api_id: u8,
) {
    let codec = ScriptedCodec::builder().build();
    let counter = CountingAllocator::new();
    let mut adapter = CodecAdapter::new(
        AdapterConfig::new(0x0000_AB00 | u32::from(api_id)),
        codec.registry(api_id),
    )
    .with_allocator(counter.shared());

    adapter.init().unwrap();
    assert_eq!(adapter.state(), AdapterState::Ready);
    assert_eq!(adapter.name(), Some("scripted"));
    // Codec object only.
    assert_eq!(counter.live(), 1);
}

#[rstest]
fn init_unknown_id_allocates_nothing(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
) {
    let registry = Arc::new(
        CapabilityRegistry::builder()
            .register(ScriptedCodec::builder().build().descriptor(0x02))
            .build(),
    );
    let mut adapter = CodecAdapter::new(AdapterConfig::new(KnownCodec::Mp3Dec), registry)
        .with_allocator(counter.shared());

    let err = adapter.init().unwrap_err();
    assert!(matches!(err, AdapterError::NotFound { api_id: 0x06 }));
    assert_eq!(adapter.state(), AdapterState::Uninit);
    assert_eq!(counter.attempts(), 0);
}

#[rstest]
fn init_object_allocation_failure_retains_nothing(
    #[from(tracing_setup)] _tracing: (),
    standard_codec: ScriptedCodec,
) {
    let counter = CountingAllocator::failing_at(0);
    let mut adapter = scripted_adapter(&standard_codec, &counter);

    let err = adapter.init().unwrap_err();
    assert!(matches!(err, AdapterError::OutOfMemory { size: 16, .. }));
    assert!(err.is_retryable());
    assert_eq!(adapter.state(), AdapterState::Uninit);
    assert_eq!(counter.live(), 0);

    // The failure was transient; a second attempt succeeds.
    adapter.init().unwrap();
    assert_eq!(adapter.state(), AdapterState::Ready);
}

#[rstest]
fn prepare_runs_phases_in_order(
    #[from(tracing_setup)] _tracing: (),
    standard_codec: ScriptedCodec,
    counter: Arc<CountingAllocator>,
) {
    let adapter = prepared(&standard_codec, &counter);
    assert_eq!(adapter.state(), AdapterState::Prepared);

    let phases: Vec<InitPhase> = standard_codec
        .log()
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            CodecCall::Initialize(phase) => Some(phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        [
            InitPhase::PreConfig,
            InitPhase::PostConfig,
            InitPhase::Process,
            InitPhase::QueryInitDone
        ]
    );

    let calls = standard_codec.log().calls();
    let tables_at = calls
        .iter()
        .position(|c| matches!(c, CodecCall::SetMemoryTablesPointer { len: 32 }))
        .unwrap();
    let post_config_at = calls
        .iter()
        .position(|c| *c == CodecCall::Initialize(InitPhase::PostConfig))
        .unwrap();
    assert!(tables_at < post_config_at);

    // Object, tables, four blocks.
    assert_eq!(counter.live(), 6);
    assert_eq!(adapter.input_capacity(), 64);
    assert_eq!(adapter.output_capacity(), 64);
}

#[rstest]
fn second_prepare_makes_no_calls(
    #[from(tracing_setup)] _tracing: (),
    standard_codec: ScriptedCodec,
    counter: Arc<CountingAllocator>,
) {
    let mut adapter = prepared(&standard_codec, &counter);
    let calls = standard_codec.log().len();
    let live = counter.live();

    adapter.prepare().unwrap();

    assert_eq!(standard_codec.log().len(), calls);
    assert_eq!(counter.live(), live);
    assert_eq!(adapter.state(), AdapterState::Prepared);
}

#[rstest]
fn prepare_without_setup_config_fails(
    #[from(tracing_setup)] _tracing: (),
    standard_codec: ScriptedCodec,
    counter: Arc<CountingAllocator>,
) {
    let mut adapter = CodecAdapter::new(
        AdapterConfig::new(u32::from(SCRIPTED_ID)),
        standard_codec.registry(SCRIPTED_ID),
    )
    .with_allocator(counter.shared());
    adapter.init().unwrap();

    let err = adapter.prepare().unwrap_err();
    assert!(matches!(err, AdapterError::NoConfig(ConfigKind::Setup)));
    assert_eq!(adapter.state(), AdapterState::Ready);
    assert_eq!(standard_codec.log().count(Op::SetConfigParam), 0);

    // Supplying configuration makes the same call succeed.
    adapter.set_setup_config(aulos_test_utils::setup_blob(&[(1, 1)]));
    adapter.prepare().unwrap();
    assert_eq!(adapter.state(), AdapterState::Prepared);
}

#[rstest]
fn prepare_not_ready_releases_everything(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
) {
    let codec = ScriptedCodec::builder()
        .standard_blocks(32)
        .init_done(0)
        .build();
    let mut adapter = scripted_adapter(&codec, &counter);
    adapter.init().unwrap();

    let err = adapter.prepare().unwrap_err();
    assert!(matches!(err, AdapterError::NotReady));
    assert_eq!(adapter.state(), AdapterState::Ready);
    // Only the codec object survives.
    assert_eq!(counter.live(), 1);
    assert!(codec.bound_blocks().iter().all(|b| !b.is_live()));
    assert!(!codec.tables().unwrap().is_live());
}

#[rstest]
#[case::process_init(Op::Initialize(InitPhase::Process))]
#[case::tables_bind(Op::SetMemoryTablesPointer)]
#[case::block_count(Op::MemoryTableCount)]
#[case::block_bind(Op::SetMemoryBlockPointer)]
fn prepare_failure_after_tables_releases_tables(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
    #[case] op: Op,
) {
    let status = CodecStatus::fatal(0x42);
    let codec = ScriptedCodec::builder()
        .standard_blocks(16)
        .fail(op, status)
        .build();
    let mut adapter = scripted_adapter(&codec, &counter);
    adapter.init().unwrap();

    let err = adapter.prepare().unwrap_err();
    assert_eq!(err.status(), Some(status));
    assert_eq!(counter.live(), 1);
    assert_eq!(counter.allocated(), counter.released() + 1);
}

#[rstest]
fn process_passes_codec_counts_through(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
) {
    let codec = ScriptedCodec::builder()
        .standard_blocks(128)
        .produce(|input| input * 3 + 1)
        .build();
    let mut adapter = prepared(&codec, &counter);

    for avail in [0, 1, 17, 128] {
        let outcome = adapter.process(avail).unwrap();
        assert_eq!(outcome.consumed, avail);
        assert_eq!(outcome.produced, avail * 3 + 1);
    }
    assert_eq!(codec.log().count(Op::Execute), 4);
}

#[rstest]
fn process_rejects_oversized_input(
    #[from(tracing_setup)] _tracing: (),
    standard_codec: ScriptedCodec,
    counter: Arc<CountingAllocator>,
) {
    let mut adapter = prepared(&standard_codec, &counter);
    let calls = standard_codec.log().len();

    let err = adapter.process(65).unwrap_err();
    assert!(matches!(
        err,
        AdapterError::InputOverflow {
            requested: 65,
            capacity: 64
        }
    ));
    assert_eq!(standard_codec.log().len(), calls);
}

#[rstest]
#[case::set_input(Op::SetInputBytes)]
#[case::execute(Op::Execute)]
#[case::output(Op::OutputBytes)]
fn process_codec_failure_is_fatal_to_call(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
    #[case] op: Op,
) {
    let status = CodecStatus::recoverable(0x09);
    let codec = ScriptedCodec::builder()
        .standard_blocks(16)
        .fail_nth(op, 0, status)
        .build();
    let mut adapter = prepared(&codec, &counter);

    let err = adapter.process(4).unwrap_err();
    assert_eq!(err.status(), Some(status));
    assert_eq!(adapter.state(), AdapterState::Prepared);

    // The instance stays usable.
    assert_eq!(adapter.process(4).unwrap().produced, 4);
}

#[rstest]
fn failed_process_invalidates_earlier_output(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
) {
    let codec = ScriptedCodec::builder()
        .standard_blocks(64)
        .fail_nth(Op::Execute, 1, CodecStatus::fatal(0x61))
        .build();
    let mut adapter = prepared(&codec, &counter);
    let mut out = [0u8; 16];

    assert_eq!(adapter.process(4).unwrap().produced, 4);
    assert_eq!(adapter.read_output(&mut out).unwrap(), 4);

    assert!(adapter.process(4).is_err());
    assert_eq!(adapter.read_output(&mut out).unwrap(), 0);

    // The next successful run makes output readable again.
    assert_eq!(adapter.process(8).unwrap().produced, 8);
    assert_eq!(adapter.read_output(&mut out).unwrap(), 8);
}

#[rstest]
fn process_before_prepare_is_rejected(
    #[from(tracing_setup)] _tracing: (),
    standard_codec: ScriptedCodec,
    counter: Arc<CountingAllocator>,
) {
    let mut adapter = scripted_adapter(&standard_codec, &counter);
    assert!(matches!(
        adapter.process(0),
        Err(AdapterError::InvalidTransition {
            state: AdapterState::Uninit,
            ..
        })
    ));

    adapter.init().unwrap();
    assert!(matches!(
        adapter.process(0),
        Err(AdapterError::InvalidTransition {
            state: AdapterState::Ready,
            ..
        })
    ));
}

#[rstest]
fn reset_returns_to_ready_and_releases(
    #[from(tracing_setup)] _tracing: (),
    standard_codec: ScriptedCodec,
    counter: Arc<CountingAllocator>,
) {
    let mut adapter = prepared(&standard_codec, &counter);
    let blocks = standard_codec.bound_blocks();
    assert!(blocks.iter().all(|b| b.is_live()));

    adapter.reset().unwrap();
    assert_eq!(adapter.state(), AdapterState::Ready);
    assert!(blocks.iter().all(|b| !b.is_live()));
    // Fresh codec object only.
    assert_eq!(counter.live(), 1);
    assert_eq!(standard_codec.log().count(Op::ApiObjectSize), 2);
}

#[rstest]
fn reset_then_prepare_reuses_setup_config(
    #[from(tracing_setup)] _tracing: (),
    standard_codec: ScriptedCodec,
    counter: Arc<CountingAllocator>,
) {
    let mut adapter = prepared(&standard_codec, &counter);
    adapter.reset().unwrap();
    adapter.prepare().unwrap();

    let params = standard_codec.log().params();
    let setup_pushes = params
        .iter()
        .filter(|(id, _)| *id == SETUP_PARAM.0)
        .count();
    assert_eq!(setup_pushes, 2);
    assert_eq!(adapter.state(), AdapterState::Prepared);
}

#[rstest]
fn reset_failure_is_surfaced_unmasked(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
) {
    let status = CodecStatus::fatal(0x77);
    let codec = ScriptedCodec::builder()
        .standard_blocks(8)
        .fail_nth(Op::ApiObjectSize, 1, status)
        .build();
    let mut adapter = prepared(&codec, &counter);

    let err = adapter.reset().unwrap_err();
    assert!(matches!(
        err,
        AdapterError::Codec { op: "api object size", status: s } if s == status
    ));
    assert_eq!(adapter.state(), AdapterState::Uninit);
    assert_eq!(counter.live(), 0);

    // The capability stays bound; a retry re-opens it.
    adapter.reset().unwrap();
    assert_eq!(adapter.state(), AdapterState::Ready);
    assert_eq!(codec.log().count(Op::ApiObjectSize), 3);
}

#[rstest]
fn reset_from_uninit_runs_full_init(
    #[from(tracing_setup)] _tracing: (),
    standard_codec: ScriptedCodec,
    counter: Arc<CountingAllocator>,
) {
    let mut adapter = scripted_adapter(&standard_codec, &counter);
    adapter.reset().unwrap();
    assert_eq!(adapter.state(), AdapterState::Ready);
    assert_eq!(adapter.name(), Some("scripted"));
}

#[rstest]
fn free_releases_everything_and_is_terminal(
    #[from(tracing_setup)] _tracing: (),
    standard_codec: ScriptedCodec,
    counter: Arc<CountingAllocator>,
) {
    let mut adapter = prepared(&standard_codec, &counter);
    adapter.free().unwrap();

    assert_eq!(adapter.state(), AdapterState::Freed);
    assert_eq!(counter.live(), 0);
    assert_eq!(counter.live_bytes(), 0);

    for result in [adapter.init(), adapter.prepare(), adapter.reset()] {
        assert!(matches!(
            result,
            Err(AdapterError::InvalidTransition {
                state: AdapterState::Freed,
                ..
            })
        ));
    }
    adapter.free().unwrap();
    assert_eq!(counter.released(), counter.allocated());
}

#[rstest]
fn drop_releases_everything(
    #[from(tracing_setup)] _tracing: (),
    standard_codec: ScriptedCodec,
    counter: Arc<CountingAllocator>,
) {
    let adapter = prepared(&standard_codec, &counter);
    assert_eq!(counter.live(), 6);
    drop(adapter);
    assert_eq!(counter.live(), 0);
}

#[rstest]
fn library_info_reports_strings(
    #[from(tracing_setup)] _tracing: (),
    standard_codec: ScriptedCodec,
    counter: Arc<CountingAllocator>,
) {
    let mut adapter = scripted_adapter(&standard_codec, &counter);
    assert!(adapter.library_info().is_err());

    adapter.init().unwrap();
    let info = adapter.library_info().unwrap();
    assert_eq!(info.name, "scripted");
    assert_eq!(info.lib_version, "0.0.1-scripted");
    assert_eq!(info.api_version, "1.0");
}
