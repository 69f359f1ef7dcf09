//! Lifecycle controller.
//!
//! [`CodecAdapter`] sequences the fallible calls into one codec library:
//!
//! ```text
//! UNINIT --init--> READY --prepare--> PREPARED --process/apply_runtime_config
//!    ^               ^                    |
//!    |               +------reset---------+
//!    +--- reset (full init) ---+     free (any state) --> FREED
//! ```
//!
//! Every allocation is owned by the adapter through [`Block`]s, so any
//! failing phase releases what it allocated simply by returning.

use std::{fmt, sync::Arc};

use aulos_memory::{Allocator, Block};
use tracing::{debug, error, info, trace, warn};

use crate::{
    config::AdapterConfig,
    error::{AdapterError, AdapterResult},
    memory::{MemoryTable, negotiate},
    params::{ApplySummary, ConfigBlob, ConfigKind, apply_config},
    registry::{CapabilityRegistry, CodecId},
    stream::{StreamParams, update_stream_params},
    traits::{ApiObject, CodecApi, InitPhase, LibStringKind},
};

/// Lifecycle state of a [`CodecAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterState {
    /// No library bound, or the last reset could not re-open it.
    Uninit,
    /// Library bound and codec object allocated.
    Ready,
    /// Configured, memory negotiated, ready to process.
    Prepared,
    /// Terminal.
    Freed,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninit => "uninit",
            Self::Ready => "ready",
            Self::Prepared => "prepared",
            Self::Freed => "freed",
        })
    }
}

/// Byte counts of one [`CodecAdapter::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessOutcome {
    pub consumed: usize,
    pub produced: usize,
}

/// Identification strings reported by the bound library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryInfo {
    pub name: String,
    pub lib_version: String,
    pub api_version: String,
}

/// Codec object plus the name it reported when opened.
struct Session {
    object: ApiObject,
    name: String,
}

/// Resources that exist only while prepared.
struct Prepared {
    memory: MemoryTable,
    /// Library bookkeeping area. Dropped after `memory`.
    _tables: Block,
}

/// Hosts one codec library instance.
///
/// Operations take `&mut self`; callers serialize access to one instance.
/// Distinct instances share nothing but the registry.
pub struct CodecAdapter {
    config: AdapterConfig,
    registry: Arc<CapabilityRegistry>,
    allocator: Arc<dyn Allocator>,
    state: AdapterState,
    prepared: Option<Prepared>,
    session: Option<Session>,
    api: Option<Box<dyn CodecApi>>,
    setup: ConfigBlob,
    runtime: ConfigBlob,
    last_produced: usize,
}

impl CodecAdapter {
    /// Create an adapter in [`AdapterState::Uninit`]. Nothing is allocated
    /// until [`init`](Self::init).
    #[must_use]
    pub fn new(config: AdapterConfig, registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            config,
            registry,
            allocator: aulos_memory::heap(),
            state: AdapterState::Uninit,
            prepared: None,
            session: None,
            api: None,
            setup: ConfigBlob::new(),
            runtime: ConfigBlob::new(),
            last_produced: 0,
        }
    }

    /// Use `allocator` for the codec object and every negotiated block.
    #[must_use]
    pub fn with_allocator(mut self, allocator: Arc<dyn Allocator>) -> Self {
        self.allocator = allocator;
        self
    }

    #[must_use]
    pub fn state(&self) -> AdapterState {
        self.state
    }

    #[must_use]
    pub fn codec_id(&self) -> CodecId {
        self.config.codec_id
    }

    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Library name reported when the codec object was opened.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.name.as_str())
    }

    /// Negotiated memory, present while prepared.
    #[must_use]
    pub fn memory(&self) -> Option<&MemoryTable> {
        self.prepared.as_ref().map(|p| &p.memory)
    }

    /// Size of the bound input block; zero unless prepared.
    #[must_use]
    pub fn input_capacity(&self) -> usize {
        self.memory().map_or(0, MemoryTable::input_capacity)
    }

    /// Size of the bound output block; zero unless prepared.
    #[must_use]
    pub fn output_capacity(&self) -> usize {
        self.memory().map_or(0, MemoryTable::output_capacity)
    }

    fn expect_state(&self, op: &'static str, allowed: &[AdapterState]) -> AdapterResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(AdapterError::InvalidTransition {
                op,
                state: self.state,
            })
        }
    }

    /// Resolve the library and open a codec object.
    ///
    /// # Errors
    ///
    /// - [`AdapterError::NotFound`] if no capability has the configured API id.
    /// - [`AdapterError::OutOfMemory`] if the codec object cannot be allocated.
    /// - [`AdapterError::Codec`] if the library fails a size or name query.
    ///
    /// On error nothing is retained and the adapter stays uninitialized.
    pub fn init(&mut self) -> AdapterResult<()> {
        self.expect_state("init", &[AdapterState::Uninit])?;

        let codec_id = self.config.codec_id;
        let descriptor = self
            .registry
            .lookup(codec_id.api_id())
            .inspect_err(|err| error!(%codec_id, %err, "Codec capability not found"))?;
        let api = descriptor.instantiate();
        debug!(%codec_id, capability = descriptor.name(), "Codec capability resolved");

        let session = open_session(api.as_ref(), &self.allocator, self.config.object_align)
            .inspect_err(|err| error!(%codec_id, %err, "Codec init failed"))?;

        info!(%codec_id, codec = %session.name, "Codec initialized");
        self.api = Some(api);
        self.session = Some(session);
        self.state = AdapterState::Ready;
        Ok(())
    }

    /// Configure the codec and negotiate its memory.
    ///
    /// Does nothing when already prepared.
    ///
    /// # Errors
    ///
    /// - [`AdapterError::NoConfig`] if no setup configuration was ever set.
    /// - [`AdapterError::ParamRejected`] / [`AdapterError::MalformedParam`]
    ///   from the setup configuration or stream parameters.
    /// - [`AdapterError::OutOfMemory`], [`AdapterError::UnknownMemoryRole`]
    ///   from negotiation.
    /// - [`AdapterError::NotReady`] if the codec does not report init done.
    ///
    /// On error every block allocated during the call is released and the
    /// adapter stays ready.
    pub fn prepare(&mut self) -> AdapterResult<()> {
        if self.state == AdapterState::Prepared {
            trace!("Already prepared");
            return Ok(());
        }
        self.expect_state("prepare", &[AdapterState::Ready])?;

        let prepared = self
            .run_prepare()
            .inspect_err(|err| error!(codec_id = %self.config.codec_id, %err, "Prepare failed"))?;

        info!(
            codec_id = %self.config.codec_id,
            blocks = prepared.memory.len(),
            input = prepared.memory.input_capacity(),
            output = prepared.memory.output_capacity(),
            "Codec prepared"
        );
        self.prepared = Some(prepared);
        self.state = AdapterState::Prepared;
        Ok(())
    }

    fn run_prepare(&mut self) -> AdapterResult<Prepared> {
        let Self {
            config,
            allocator,
            session,
            api,
            setup,
            ..
        } = self;
        let (Some(api), Some(session)) = (api.as_deref(), session.as_ref()) else {
            return Err(AdapterError::InvalidTransition {
                op: "prepare",
                state: AdapterState::Uninit,
            });
        };
        let object = &session.object;

        api.initialize(object, InitPhase::PreConfig)
            .map_err(AdapterError::codec("pre-config init"))?;

        if !setup.is_fresh() && !setup.is_empty() {
            warn!(bytes = setup.len(), "Reusing previously applied setup configuration");
            setup.revive();
        }
        apply_config(api, object, ConfigKind::Setup, setup)?;
        setup.mark_consumed();

        update_stream_params(api, object, &config.stream_ids, &config.stream)?;

        let tables_size = api
            .memory_tables_size(object)
            .map_err(AdapterError::codec("memory tables size"))?;
        let tables = Block::allocate(allocator, tables_size, config.memtabs_align)?;
        api.set_memory_tables_pointer(object, tables.handle())
            .map_err(AdapterError::codec("bind memory tables"))?;
        trace!(size = tables_size, "Memory tables bound");

        let memory = negotiate(api, object, allocator)?;

        api.initialize(object, InitPhase::Process)
            .map_err(AdapterError::codec("process init"))?;
        let done = api
            .initialize(object, InitPhase::QueryInitDone)
            .map_err(AdapterError::codec("init done query"))?;
        if done == 0 {
            return Err(AdapterError::NotReady);
        }

        Ok(Prepared {
            memory,
            _tables: tables,
        })
    }

    /// Run the codec over `avail` bytes previously written to the input
    /// block.
    ///
    /// The produced count is whatever the codec reports; no output is
    /// assumed valid when this returns an error.
    ///
    /// # Errors
    ///
    /// - [`AdapterError::InvalidTransition`] unless prepared.
    /// - [`AdapterError::InputOverflow`] if `avail` exceeds the input block.
    /// - [`AdapterError::Codec`] for any fatal or recoverable codec status.
    pub fn process(&mut self, avail: usize) -> AdapterResult<ProcessOutcome> {
        self.expect_state("process", &[AdapterState::Prepared])?;

        let capacity = self.input_capacity();
        if avail > capacity {
            return Err(AdapterError::InputOverflow {
                requested: avail,
                capacity,
            });
        }

        // Output from an earlier run is no longer valid once the codec runs again.
        self.last_produced = 0;
        let (api, object) = self.bound()?;
        let produced = execute(api, object, avail)
            .inspect_err(|err| error!(avail, %err, "Process failed"))?;

        trace!(consumed = avail, produced, "Processed");
        self.last_produced = produced;
        Ok(ProcessOutcome {
            consumed: avail,
            produced,
        })
    }

    /// Apply the runtime configuration while prepared.
    ///
    /// # Errors
    ///
    /// - [`AdapterError::InvalidTransition`] unless prepared.
    /// - [`AdapterError::NoConfig`] if no new runtime configuration was set
    ///   since the last successful apply.
    /// - [`AdapterError::ParamRejected`] / [`AdapterError::MalformedParam`].
    pub fn apply_runtime_config(&mut self) -> AdapterResult<ApplySummary> {
        self.expect_state("apply runtime config", &[AdapterState::Prepared])?;

        let (api, object) = self.bound()?;
        let summary = apply_config(api, object, ConfigKind::Runtime, &self.runtime)
            .inspect_err(|err| warn!(%err, "Runtime configuration not applied"))?;
        self.runtime.mark_consumed();
        Ok(summary)
    }

    /// Release everything the codec holds and open it again.
    ///
    /// Configuration blobs are kept; a setup configuration that was already
    /// applied is reused by the next [`prepare`](Self::prepare).
    ///
    /// # Errors
    ///
    /// Returns the re-open failure unchanged. The adapter is then left
    /// uninitialized with its capability still bound, so `reset` may be
    /// retried.
    pub fn reset(&mut self) -> AdapterResult<()> {
        self.expect_state(
            "reset",
            &[
                AdapterState::Uninit,
                AdapterState::Ready,
                AdapterState::Prepared,
            ],
        )?;

        self.release();
        self.state = AdapterState::Uninit;

        let Some(api) = self.api.as_deref() else {
            debug!("Reset without a bound capability, running full init");
            return self.init();
        };

        let session = open_session(api, &self.allocator, self.config.object_align)
            .inspect_err(|err| error!(codec_id = %self.config.codec_id, %err, "Reset failed"))?;

        debug!(codec_id = %self.config.codec_id, "Codec reset");
        self.session = Some(session);
        self.state = AdapterState::Ready;
        Ok(())
    }

    /// Release every allocation and unbind the library. Terminal.
    ///
    /// No library-side teardown call exists; any cleanup beyond returning
    /// memory is up to the library itself.
    ///
    /// # Errors
    ///
    /// Currently infallible.
    pub fn free(&mut self) -> AdapterResult<()> {
        if self.state == AdapterState::Freed {
            return Ok(());
        }
        self.release();
        self.api = None;
        self.state = AdapterState::Freed;
        debug!(codec_id = %self.config.codec_id, "Codec freed");
        Ok(())
    }

    fn release(&mut self) {
        self.prepared = None;
        self.session = None;
        self.last_produced = 0;
    }

    fn bound(&self) -> AdapterResult<(&dyn CodecApi, &ApiObject)> {
        match (self.api.as_deref(), self.session.as_ref()) {
            (Some(api), Some(session)) => Ok((api, &session.object)),
            _ => Err(AdapterError::InvalidTransition {
                op: "access codec",
                state: self.state,
            }),
        }
    }

    /// Deliver setup configuration for the next [`prepare`](Self::prepare).
    pub fn set_setup_config(&mut self, data: impl Into<Vec<u8>>) {
        self.setup.set(data);
        trace!(bytes = self.setup.len(), "Setup configuration delivered");
    }

    /// Deliver runtime configuration for the next
    /// [`apply_runtime_config`](Self::apply_runtime_config).
    pub fn set_runtime_config(&mut self, data: impl Into<Vec<u8>>) {
        self.runtime.set(data);
        trace!(bytes = self.runtime.len(), "Runtime configuration delivered");
    }

    /// Stream format pushed by the next [`prepare`](Self::prepare).
    pub fn set_stream_params(&mut self, params: StreamParams) {
        debug!(%params, "Stream parameters updated");
        self.config.stream = params;
    }

    /// Copy `data` to the start of the input block.
    ///
    /// # Errors
    ///
    /// - [`AdapterError::InvalidTransition`] unless prepared.
    /// - [`AdapterError::InputOverflow`] if `data` does not fit.
    pub fn write_input(&mut self, data: &[u8]) -> AdapterResult<usize> {
        self.expect_state("write input", &[AdapterState::Prepared])?;
        let capacity = self.input_capacity();
        let block = match self.memory().and_then(MemoryTable::input) {
            Some(block) if data.len() <= capacity => block,
            _ => {
                return Err(AdapterError::InputOverflow {
                    requested: data.len(),
                    capacity,
                });
            }
        };
        block.write(|bytes| bytes[..data.len()].copy_from_slice(data));
        Ok(data.len())
    }

    /// Copy the bytes produced by the last [`process`](Self::process) into
    /// `out`. Returns how many were copied.
    ///
    /// # Errors
    ///
    /// [`AdapterError::InvalidTransition`] unless prepared.
    pub fn read_output(&self, out: &mut [u8]) -> AdapterResult<usize> {
        self.expect_state("read output", &[AdapterState::Prepared])?;
        let Some(block) = self.memory().and_then(MemoryTable::output) else {
            return Ok(0);
        };
        let count = self.last_produced.min(block.len()).min(out.len());
        block.read(|bytes| out[..count].copy_from_slice(&bytes[..count]));
        Ok(count)
    }

    /// Query the bound library's identification strings.
    ///
    /// # Errors
    ///
    /// - [`AdapterError::InvalidTransition`] when no codec object is open.
    /// - [`AdapterError::Codec`] if a query fails.
    pub fn library_info(&self) -> AdapterResult<LibraryInfo> {
        let (api, _) = self.bound()?;
        let query = |kind, op| api.lib_string(kind).map_err(AdapterError::codec(op));
        Ok(LibraryInfo {
            name: query(LibStringKind::Name, "library name")?,
            lib_version: query(LibStringKind::LibVersion, "library version")?,
            api_version: query(LibStringKind::ApiVersion, "api version")?,
        })
    }
}

impl fmt::Debug for CodecAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecAdapter")
            .field("codec_id", &self.config.codec_id)
            .field("state", &self.state)
            .field("name", &self.name())
            .field("memory", &self.memory())
            .finish_non_exhaustive()
    }
}

fn execute(api: &dyn CodecApi, object: &ApiObject, avail: usize) -> AdapterResult<usize> {
    api.set_input_bytes(object, avail)
        .map_err(AdapterError::codec("set input bytes"))?;
    api.execute(object).map_err(AdapterError::codec("execute"))?;
    api.output_bytes(object)
        .map_err(AdapterError::codec("output bytes"))
}

/// Query name and object size, then allocate the codec object.
fn open_session(
    api: &dyn CodecApi,
    allocator: &Arc<dyn Allocator>,
    object_align: usize,
) -> AdapterResult<Session> {
    let name = api
        .lib_string(LibStringKind::Name)
        .map_err(AdapterError::codec("library name"))?;
    let size = api
        .api_object_size()
        .map_err(AdapterError::codec("api object size"))?;
    let object = ApiObject::allocate(allocator, size, object_align)?;
    trace!(codec = %name, size, "Codec object allocated");
    Ok(Session { object, name })
}
