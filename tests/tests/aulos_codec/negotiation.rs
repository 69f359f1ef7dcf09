//! Memory negotiation: every declared block allocated, bound and owned
//! exactly once; partial work released on failure.

use std::sync::Arc;

use aulos::codec::{
    AdapterError, AdapterState, ApiObject, CodecStatus, InitPhase, MemoryRole, negotiate,
};
use aulos_test_utils::{BlockSpec, CodecCall, CountingAllocator, Op, ScriptedCodec};
use rstest::rstest;

use crate::common::{counter, scripted_adapter, tracing_setup};

/// Allocation attempts made before the first memory block: codec object,
/// then the memory-table area.
const BLOCKS_START_AT: usize = 2;

#[rstest]
fn zero_blocks_leaves_buffers_unbound(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
) {
    let codec = ScriptedCodec::builder().build();
    let mut adapter = scripted_adapter(&codec, &counter);
    adapter.init().unwrap();
    adapter.prepare().unwrap();

    let memory = adapter.memory().unwrap();
    assert!(memory.is_empty());
    assert!(memory.input().is_none());
    assert!(memory.output().is_none());
    assert_eq!(adapter.input_capacity(), 0);
    assert_eq!(adapter.output_capacity(), 0);
    assert_eq!(codec.log().count(Op::MemoryBlockType), 0);
    assert_eq!(counter.live(), BLOCKS_START_AT);
}

#[rstest]
fn blocks_are_bound_by_index_with_requested_sizes(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
) {
    let codec = ScriptedCodec::builder()
        .block(BlockSpec::persistent(40))
        .block(BlockSpec::new(MemoryRole::Scratch, 100, 64))
        .block(BlockSpec::input(24))
        .block(BlockSpec::output(56))
        .build();
    let mut adapter = scripted_adapter(&codec, &counter);
    adapter.init().unwrap();
    adapter.prepare().unwrap();

    let binds: Vec<(u32, usize)> = codec
        .log()
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            CodecCall::SetMemoryBlockPointer { index, len } => Some((index, len)),
            _ => None,
        })
        .collect();
    assert_eq!(binds, [(0, 40), (1, 100), (2, 24), (3, 56)]);

    let memory = adapter.memory().unwrap();
    assert_eq!(memory.len(), 4);
    assert_eq!(memory.total_bytes(), 220);
    assert_eq!(memory.scratch().unwrap().addr() % 64, 0);
    assert_eq!(adapter.input_capacity(), 24);
    assert_eq!(adapter.output_capacity(), 56);

    let bound = codec.bound_blocks();
    assert_eq!(bound[2].addr(), memory.input().unwrap().addr());
    assert_eq!(bound[3].addr(), memory.output().unwrap().addr());
}

#[rstest]
fn allocation_failure_releases_earlier_blocks(
    #[from(tracing_setup)] _tracing: (),
    #[values(0, 1, 2, 3)] failing_block: usize,
) {
    let codec = ScriptedCodec::builder().standard_blocks(32).build();
    let counter = CountingAllocator::failing_at(BLOCKS_START_AT + failing_block);
    let mut adapter = scripted_adapter(&codec, &counter);
    adapter.init().unwrap();

    let err = adapter.prepare().unwrap_err();
    assert!(matches!(err, AdapterError::OutOfMemory { size: 32, align: 8 }));
    assert!(err.is_retryable());
    assert_eq!(adapter.state(), AdapterState::Ready);

    let bound = codec.bound_blocks();
    assert_eq!(bound.len(), failing_block);
    assert!(bound.iter().all(|b| !b.is_live()));
    // Codec object only.
    assert_eq!(counter.live(), 1);
    assert_eq!(codec.log().count(Op::Initialize(InitPhase::Process)), 0);

    // The allocator recovers; a second prepare completes.
    adapter.prepare().unwrap();
    assert_eq!(adapter.state(), AdapterState::Prepared);
    assert_eq!(counter.live(), BLOCKS_START_AT + 4);
}

#[rstest]
fn unknown_role_fails_before_allocating(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
) {
    let codec = ScriptedCodec::builder()
        .block(BlockSpec::persistent(16))
        .block(BlockSpec::scratch(16))
        .block(BlockSpec::raw(9, 16, 8))
        .block(BlockSpec::output(16))
        .build();
    let mut adapter = scripted_adapter(&codec, &counter);
    adapter.init().unwrap();

    let err = adapter.prepare().unwrap_err();
    assert!(matches!(
        err,
        AdapterError::UnknownMemoryRole { index: 2, code: 9 }
    ));
    assert_eq!(counter.attempts(), BLOCKS_START_AT + 2);
    assert_eq!(codec.log().count(Op::MemoryBlockSize), 2);
    assert_eq!(counter.live(), 1);
}

#[rstest]
fn invalid_alignment_is_reported(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
) {
    let codec = ScriptedCodec::builder()
        .block(BlockSpec::persistent(16))
        .block(BlockSpec::new(MemoryRole::Input, 16, 12))
        .build();
    let mut adapter = scripted_adapter(&codec, &counter);
    adapter.init().unwrap();

    let err = adapter.prepare().unwrap_err();
    assert!(matches!(err, AdapterError::InvalidAlignment { align: 12 }));
    assert!(!err.is_retryable());
    assert_eq!(counter.live(), 1);
}

#[rstest]
#[case::block_type(Op::MemoryBlockType)]
#[case::block_size(Op::MemoryBlockSize)]
#[case::block_alignment(Op::MemoryBlockAlignment)]
#[case::block_bind(Op::SetMemoryBlockPointer)]
fn codec_failure_mid_negotiation_releases_partial_work(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
    #[case] op: Op,
) {
    let status = CodecStatus::fatal(0x5A);
    let codec = ScriptedCodec::builder()
        .standard_blocks(16)
        .fail_index(op, 2, status)
        .build();
    let mut adapter = scripted_adapter(&codec, &counter);
    adapter.init().unwrap();

    let err = adapter.prepare().unwrap_err();
    assert_eq!(err.status(), Some(status));
    assert!(codec.bound_blocks().iter().all(|b| !b.is_live()));
    assert_eq!(counter.live(), 1);
    assert_eq!(counter.allocated(), counter.released() + 1);
}

#[rstest]
fn duplicate_role_keeps_every_block_owned(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
) {
    let codec = ScriptedCodec::builder()
        .block(BlockSpec::input(32))
        .block(BlockSpec::input(48))
        .block(BlockSpec::output(16))
        .build();
    let mut adapter = scripted_adapter(&codec, &counter);
    adapter.init().unwrap();
    adapter.prepare().unwrap();

    // The later declaration serves the role.
    assert_eq!(adapter.input_capacity(), 48);
    assert_eq!(adapter.memory().unwrap().len(), 3);
    assert!(codec.bound_blocks().iter().all(|b| b.is_live()));
    assert_eq!(counter.live(), BLOCKS_START_AT + 3);

    adapter.free().unwrap();
    assert!(codec.bound_blocks().iter().all(|b| !b.is_live()));
    assert_eq!(counter.live(), 0);
}

#[rstest]
fn negotiate_directly_against_an_object(
    #[from(tracing_setup)] _tracing: (),
    counter: Arc<CountingAllocator>,
) {
    let codec = ScriptedCodec::builder()
        .block(BlockSpec::persistent(8))
        .block(BlockSpec::output(24))
        .build();
    let allocator = counter.shared();
    let object = ApiObject::allocate(&allocator, 16, 8).unwrap();

    let table = negotiate(&codec, &object, &allocator).unwrap();
    assert_eq!(
        codec.log().calls().first(),
        Some(&CodecCall::Initialize(InitPhase::PostConfig))
    );

    let roles: Vec<(u32, MemoryRole)> = table.entries().map(|e| (e.index(), e.role())).collect();
    assert_eq!(roles, [(0, MemoryRole::Persistent), (1, MemoryRole::Output)]);
    assert!(table.input().is_none());
    assert_eq!(table.output_capacity(), 24);
    assert_eq!(counter.live(), 3);

    drop(table);
    assert_eq!(counter.live(), 1);
    drop(object);
    assert_eq!(counter.live(), 0);
}
