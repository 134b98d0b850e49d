//! The link graph: the composition-wide slot table.
//!
//! Every output, input, and adapter lives in the [`LinkGraph`], addressed
//! by typed handles. Links are relations between handles, never owning
//! pointers, so the graph can mediate arbitrary pull chains and
//! notification cascades without reference cycles. An adapter's box is
//! checked out of its slot while one of its hooks runs; finding the slot
//! empty means the call re-entered a true cycle.
//!
//! All graph operations are synchronous and run on the scheduler's thread
//! of control. Notifications for one push complete before the push
//! returns.

use std::collections::VecDeque;
use std::path::PathBuf;

use indexmap::IndexMap;
use tracing::{debug, trace};

use confluence_core::{
    DataError, Envelope, Info, MetadataError, PullError, SetupError, Time,
};

use crate::adapter::{Adapter, AdapterContext, AdapterKind};
use crate::component::{CallbackHost, ComponentKey};
use crate::spill::{SpillHandle, SpillStore};

// ── Handles ────────────────────────────────────────────────────────

/// Handle to an output slot in the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub u32);

/// Handle to an input slot in the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputId(pub u32);

/// Handle to an adapter node in the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdapterId(pub u32);

/// Anything that can serve data: an output or an adapter's downstream
/// side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// An output slot.
    Output(OutputId),
    /// An adapter's downstream side.
    Adapter(AdapterId),
}

/// Anything that can receive data or notifications: an input or an
/// adapter's upstream side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetId {
    /// An input slot.
    Input(InputId),
    /// An adapter's upstream side.
    Adapter(AdapterId),
}

/// How an output originates data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    /// The owning component pushes actively.
    Push,
    /// Data is generated on demand by the owning component's `generate`
    /// hook; this output never pushes on its own.
    Callback(
        /// The owning component.
        ComponentKey,
    ),
}

/// How an input consumes data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// The owning component pulls actively.
    Pull,
    /// Notifications are delivered to the owning component's
    /// `source_updated` hook; this input never pulls on its own.
    Callback(
        /// The owning component.
        ComponentKey,
    ),
}

/// Lifecycle phase of the graph's link structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphPhase {
    /// Slots and links may still be added.
    Open,
    /// Connect negotiation in progress; links are frozen.
    Sealed,
    /// The scheduler is running.
    Running,
}

// ── Slots ──────────────────────────────────────────────────────────

enum HistoryEntry {
    Memory(Envelope),
    Spilled(SpillHandle),
}

impl HistoryEntry {
    fn time(&self) -> Time {
        match self {
            Self::Memory(env) => env.time(),
            Self::Spilled(handle) => handle.time,
        }
    }
}

struct OutputSlot {
    path: String,
    local: String,
    owner: Option<ComponentKey>,
    kind: OutputKind,
    is_static: bool,
    declared: Info,
    info: Option<Info>,
    history: VecDeque<HistoryEntry>,
    targets: Vec<TargetId>,
    watermarks: IndexMap<TargetId, Time>,
    memory_limit: Option<usize>,
    mem_bytes: usize,
    spill: Option<SpillStore>,
    scratch_dir: PathBuf,
    pushed_in_run: bool,
}

impl OutputSlot {
    fn enforce_budget(&mut self) -> Result<(), DataError> {
        let Some(limit) = self.memory_limit else {
            return Ok(());
        };
        if self.mem_bytes <= limit {
            return Ok(());
        }
        // Spill from the oldest end. The newest entry always stays in
        // memory: the next push's alias check needs its buffer.
        let last = self.history.len().saturating_sub(1);
        for idx in 0..last {
            if self.mem_bytes <= limit {
                break;
            }
            if let HistoryEntry::Memory(env) = &self.history[idx] {
                if self.spill.is_none() {
                    self.spill = Some(SpillStore::create(&self.scratch_dir)?);
                }
                let store = self.spill.as_mut().ok_or_else(|| DataError::Spill {
                    reason: "spill store missing after creation".to_string(),
                })?;
                let handle = store.append(env)?;
                self.mem_bytes -= env.payload_bytes();
                self.history[idx] = HistoryEntry::Spilled(handle);
            }
        }
        Ok(())
    }

    /// Discard entries no connected target can ever request again.
    ///
    /// The entry immediately at or before the minimum watermark is the
    /// oldest one still required (step-left pulls may land on it).
    fn trim_history(&mut self) {
        if self.is_static || self.watermarks.len() < self.targets.len() {
            return;
        }
        let Some(&min) = self.watermarks.values().min() else {
            return;
        };
        let Some(keep_from) = self.history.iter().rposition(|e| e.time() <= min) else {
            return;
        };
        for _ in 0..keep_from {
            if let Some(HistoryEntry::Memory(env)) = self.history.pop_front() {
                self.mem_bytes -= env.payload_bytes();
            }
        }
    }
}

struct InputSlot {
    path: String,
    local: String,
    owner: ComponentKey,
    kind: InputKind,
    source: Option<SourceId>,
    declared: Info,
    info: Option<Info>,
    source_info: Option<Info>,
    last_notified: Option<Time>,
}

struct AdapterSlot {
    path: String,
    adapter: Option<Box<dyn Adapter>>,
    source: Option<SourceId>,
    targets: Vec<TargetId>,
    info: Option<Info>,
    kind: AdapterKind,
    is_delay: bool,
    no_branch: bool,
}

// ── LinkGraph ──────────────────────────────────────────────────────

/// The composition-wide slot table.
///
/// Owned by the composition; components and adapters refer to slots
/// through handles. Composition-wide slot policy (memory budget, scratch
/// directory) is applied to outputs as they are registered.
pub struct LinkGraph {
    outputs: Vec<OutputSlot>,
    inputs: Vec<InputSlot>,
    adapters: Vec<AdapterSlot>,
    phase: GraphPhase,
    default_memory_limit: Option<usize>,
    scratch_dir: PathBuf,
}

impl Default for LinkGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkGraph {
    /// An empty graph with unlimited slot memory and the OS temp
    /// directory as spill location.
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
            inputs: Vec::new(),
            adapters: Vec::new(),
            phase: GraphPhase::Open,
            default_memory_limit: None,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Set the slot policy applied to outputs registered from now on.
    pub fn set_slot_policy(&mut self, memory_limit: Option<usize>, scratch_dir: Option<PathBuf>) {
        self.default_memory_limit = memory_limit;
        if let Some(dir) = scratch_dir {
            self.scratch_dir = dir;
        }
    }

    /// The current link-structure phase.
    pub fn phase(&self) -> GraphPhase {
        self.phase
    }

    /// Freeze the link structure; called when the connect phase begins.
    pub fn seal(&mut self) {
        self.phase = GraphPhase::Sealed;
    }

    /// Mark the start of the run phase.
    pub fn begin_run(&mut self) {
        self.phase = GraphPhase::Running;
    }

    /// Drop spill files and release history memory; called at finalize.
    pub fn finalize(&mut self) {
        for slot in &mut self.outputs {
            slot.history.clear();
            slot.spill = None;
            slot.mem_bytes = 0;
        }
    }

    // ── Registration ───────────────────────────────────────────────

    /// Register an output slot.
    pub fn add_output(
        &mut self,
        owner: Option<ComponentKey>,
        path: String,
        local: String,
        kind: OutputKind,
        is_static: bool,
        declared: Info,
    ) -> Result<OutputId, SetupError> {
        if self.phase != GraphPhase::Open {
            return Err(SetupError::AlreadyConnecting { slot: path });
        }
        let id = OutputId(self.outputs.len() as u32);
        self.outputs.push(OutputSlot {
            path,
            local,
            owner,
            kind,
            is_static,
            declared,
            info: None,
            history: VecDeque::new(),
            targets: Vec::new(),
            watermarks: IndexMap::new(),
            memory_limit: self.default_memory_limit,
            mem_bytes: 0,
            spill: None,
            scratch_dir: self.scratch_dir.clone(),
            pushed_in_run: false,
        });
        Ok(id)
    }

    /// Register an input slot.
    pub fn add_input(
        &mut self,
        owner: ComponentKey,
        path: String,
        local: String,
        kind: InputKind,
        declared: Info,
    ) -> Result<InputId, SetupError> {
        if self.phase != GraphPhase::Open {
            return Err(SetupError::AlreadyConnecting { slot: path });
        }
        let id = InputId(self.inputs.len() as u32);
        self.inputs.push(InputSlot {
            path,
            local,
            owner,
            kind,
            source: None,
            declared,
            info: None,
            source_info: None,
            last_notified: None,
        });
        Ok(id)
    }

    /// Register an adapter node. The adapter's markers are cached so the
    /// engine's checks never need the box itself.
    pub fn add_adapter(&mut self, adapter: Box<dyn Adapter>) -> Result<AdapterId, SetupError> {
        let id = AdapterId(self.adapters.len() as u32);
        let path = format!("{}#{}", adapter.name(), id.0);
        if self.phase != GraphPhase::Open {
            return Err(SetupError::AlreadyConnecting { slot: path });
        }
        let kind = adapter.kind();
        let is_delay = adapter.is_delay();
        let no_branch = adapter.no_branch();
        self.adapters.push(AdapterSlot {
            path,
            adapter: Some(adapter),
            source: None,
            targets: Vec::new(),
            info: None,
            kind,
            is_delay,
            no_branch,
        });
        Ok(id)
    }

    /// Link a source to a target.
    ///
    /// The target's source binding is exclusive; targets are notified in
    /// the order they were chained.
    pub fn chain(&mut self, from: SourceId, to: TargetId) -> Result<(), SetupError> {
        if self.phase != GraphPhase::Open {
            return Err(SetupError::AlreadyConnecting {
                slot: self.target_path(to).to_string(),
            });
        }
        match to {
            TargetId::Input(i) => {
                let slot = &mut self.inputs[i.0 as usize];
                if slot.source.is_some() {
                    return Err(SetupError::AlreadyBound {
                        slot: slot.path.clone(),
                    });
                }
                slot.source = Some(from);
            }
            TargetId::Adapter(a) => {
                let slot = &mut self.adapters[a.0 as usize];
                if slot.source.is_some() {
                    return Err(SetupError::AlreadyBound {
                        slot: slot.path.clone(),
                    });
                }
                slot.source = Some(from);
            }
        }
        match from {
            SourceId::Output(o) => self.outputs[o.0 as usize].targets.push(to),
            SourceId::Adapter(a) => self.adapters[a.0 as usize].targets.push(to),
        }
        Ok(())
    }

    // ── Metadata exchange ──────────────────────────────────────────

    /// Publish an output's metadata.
    ///
    /// Idempotent for equal infos; a differing re-publication must be
    /// acceptable against the stored one and is merged in, otherwise the
    /// exchange fails with a metadata conflict.
    pub fn push_info(&mut self, id: OutputId, info: Info) -> Result<(), MetadataError> {
        let slot = &mut self.outputs[id.0 as usize];
        match &slot.info {
            None => {
                slot.info = Some(info);
                Ok(())
            }
            Some(existing) if existing == &info => Ok(()),
            Some(existing) => {
                existing
                    .accepts(&info, false)
                    .map_err(|e| MetadataError::Conflict {
                        output: slot.path.clone(),
                        detail: e.to_string(),
                    })?;
                slot.info = Some(existing.merge(&info));
                Ok(())
            }
        }
    }

    /// Run one info exchange for an input: send its desired metadata
    /// upstream through the adapter chain, absorb at the output, and
    /// bring the source's answer back down.
    ///
    /// Returns the input's resolved metadata (its own fields win, unset
    /// fields absorbed from the source). [`PullError::InfoPending`] when
    /// the upstream output has not published yet — the connector retries
    /// on the next pass.
    pub fn exchange_info(&mut self, id: InputId, desired: &Info) -> Result<Info, PullError> {
        // Walk the chain up to the output, collecting adapters.
        let mut chain: Vec<AdapterId> = Vec::new();
        let mut cursor = self.inputs[id.0 as usize].source.ok_or_else(|| {
            PullError::Setup(SetupError::UnconnectedInput {
                input: self.inputs[id.0 as usize].path.clone(),
            })
        })?;
        let output = loop {
            match cursor {
                SourceId::Adapter(a) => {
                    chain.push(a);
                    cursor = self.adapters[a.0 as usize].source.ok_or_else(|| {
                        PullError::Setup(SetupError::UnconnectedInput {
                            input: self.adapters[a.0 as usize].path.clone(),
                        })
                    })?;
                }
                SourceId::Output(o) => break o,
            }
        };

        // Downstream → upstream: adapters rewrite the request.
        let mut request = desired.clone();
        for &a in &chain {
            let adapter = self.adapters[a.0 as usize].adapter.as_ref().ok_or_else(|| {
                PullError::Setup(SetupError::ReentrantNode {
                    node: self.adapters[a.0 as usize].path.clone(),
                })
            })?;
            request = adapter.transform_request(&request);
        }

        // At the output: absorb and answer.
        let slot = &mut self.outputs[output.0 as usize];
        let published = slot.info.clone().ok_or_else(|| PullError::InfoPending {
            slot: slot.path.clone(),
        })?;
        published.accepts(&request, true).map_err(PullError::Metadata)?;
        let merged = published.merge(&request);
        slot.info = Some(merged.clone());

        // Upstream → downstream: adapters rewrite the answer.
        let mut info = merged;
        for &a in chain.iter().rev() {
            let adapter = self.adapters[a.0 as usize].adapter.as_ref().ok_or_else(|| {
                PullError::Setup(SetupError::ReentrantNode {
                    node: self.adapters[a.0 as usize].path.clone(),
                })
            })?;
            info = adapter.transform_info(&info).map_err(PullError::Metadata)?;
            self.adapters[a.0 as usize].info = Some(info.clone());
        }

        // At the input: check, absorb, store.
        desired.accepts(&info, false).map_err(PullError::Metadata)?;
        let resolved = desired.merge(&info);
        let slot = &mut self.inputs[id.0 as usize];
        slot.info = Some(resolved.clone());
        slot.source_info = Some(info);
        trace!(input = %slot.path, "info exchanged");
        Ok(resolved)
    }

    // ── Data flow ──────────────────────────────────────────────────

    /// Push an envelope into an output and notify its targets.
    ///
    /// All notifications triggered by this push complete before it
    /// returns.
    pub fn push(
        &mut self,
        host: &mut dyn CallbackHost,
        id: OutputId,
        env: Envelope,
    ) -> Result<(), PullError> {
        if self.phase == GraphPhase::Open {
            return Err(PullError::Setup(SetupError::WrongPhase {
                expected: "connect or run",
            }));
        }
        let time = env.time();
        {
            let running = self.phase == GraphPhase::Running;
            let slot = &mut self.outputs[id.0 as usize];
            if slot.info.is_none() {
                return Err(PullError::InfoPending {
                    slot: slot.path.clone(),
                });
            }
            if slot.is_static && !slot.history.is_empty() {
                return Err(PullError::Data(DataError::StaticRepush {
                    slot: slot.path.clone(),
                }));
            }
            if let Some(back) = slot.history.back() {
                let last = back.time();
                let first_run_push = running && !slot.pushed_in_run;
                let advances = time > last || (time == last && first_run_push);
                if !advances {
                    return Err(PullError::Data(DataError::TimeRegress {
                        slot: slot.path.clone(),
                        last,
                        pushed: time,
                    }));
                }
                if let HistoryEntry::Memory(prev) = back {
                    if env.same_buffer(prev) {
                        return Err(PullError::Data(DataError::AliasedBuffer {
                            slot: slot.path.clone(),
                        }));
                    }
                }
            }
            if running {
                slot.pushed_in_run = true;
            }
            slot.mem_bytes += env.payload_bytes();
            slot.history.push_back(HistoryEntry::Memory(env));
            slot.enforce_budget().map_err(PullError::Data)?;
            debug!(output = %slot.path, %time, "push");
        }
        let targets = self.outputs[id.0 as usize].targets.clone();
        self.notify_targets(host, targets, time)
    }

    /// Fire `source_updated` down a target list, in insertion order.
    /// Adapters propagate the notification to their own targets after
    /// their hook returns.
    fn notify_targets(
        &mut self,
        host: &mut dyn CallbackHost,
        targets: Vec<TargetId>,
        time: Time,
    ) -> Result<(), PullError> {
        for target in targets {
            match target {
                TargetId::Input(i) => {
                    let slot = &mut self.inputs[i.0 as usize];
                    slot.last_notified = Some(time);
                    if let InputKind::Callback(owner) = slot.kind {
                        let local = slot.local.clone();
                        host.deliver_notification(self, owner, &local, time)?;
                    }
                }
                TargetId::Adapter(a) => {
                    let slot = &mut self.adapters[a.0 as usize];
                    let mut adapter =
                        slot.adapter.take().ok_or_else(|| {
                            PullError::Setup(SetupError::ReentrantNode {
                                node: slot.path.clone(),
                            })
                        })?;
                    let source = slot.source;
                    let name = slot.path.clone();
                    let info = slot.info.clone();
                    let mut ctx = AdapterContext::new(
                        self,
                        host,
                        source,
                        TargetId::Adapter(a),
                        name,
                        info,
                    );
                    let result = adapter.source_updated(&mut ctx, time);
                    drop(ctx);
                    self.adapters[a.0 as usize].adapter = Some(adapter);
                    result?;
                    let downstream = self.adapters[a.0 as usize].targets.clone();
                    self.notify_targets(host, downstream, time)?;
                }
            }
        }
        Ok(())
    }

    /// Serve a pull against a source.
    ///
    /// Outputs answer with step-left semantics from their history;
    /// adapters are checked out and asked.
    pub fn get_data(
        &mut self,
        host: &mut dyn CallbackHost,
        source: SourceId,
        time: Time,
        requester: TargetId,
    ) -> Result<Envelope, PullError> {
        match source {
            SourceId::Output(o) => {
                if let OutputKind::Callback(owner) = self.outputs[o.0 as usize].kind {
                    let local = self.outputs[o.0 as usize].local.clone();
                    return host.generate(self, owner, &local, time);
                }
                self.output_get(o, time, requester)
            }
            SourceId::Adapter(a) => {
                let slot = &mut self.adapters[a.0 as usize];
                let mut adapter = slot.adapter.take().ok_or_else(|| {
                    PullError::Setup(SetupError::ReentrantNode {
                        node: slot.path.clone(),
                    })
                })?;
                let upstream = slot.source;
                let name = slot.path.clone();
                let info = slot.info.clone();
                let mut ctx =
                    AdapterContext::new(self, host, upstream, TargetId::Adapter(a), name, info);
                let result = adapter.pull(&mut ctx, time);
                drop(ctx);
                self.adapters[a.0 as usize].adapter = Some(adapter);
                result
            }
        }
    }

    /// Step-left history lookup with watermark bookkeeping.
    fn output_get(
        &mut self,
        id: OutputId,
        time: Time,
        requester: TargetId,
    ) -> Result<Envelope, PullError> {
        let slot = &mut self.outputs[id.0 as usize];
        if slot.is_static {
            // A static output answers any pull with its single entry.
            return match slot.history.front() {
                Some(HistoryEntry::Memory(env)) => Ok(env.clone()),
                Some(HistoryEntry::Spilled(_)) | None => Err(PullError::NoData {
                    slot: slot.path.clone(),
                    time,
                }),
            };
        }
        let idx = slot
            .history
            .iter()
            .rposition(|e| e.time() <= time)
            .ok_or_else(|| PullError::NoData {
                slot: slot.path.clone(),
                time,
            })?;
        let env = match &slot.history[idx] {
            HistoryEntry::Memory(env) => env.clone(),
            HistoryEntry::Spilled(handle) => {
                let store = slot.spill.as_mut().ok_or_else(|| {
                    PullError::Data(DataError::Spill {
                        reason: "spilled entry without a spill store".to_string(),
                    })
                })?;
                store.restore(handle).map_err(PullError::Data)?
            }
        };
        slot.watermarks.insert(requester, time);
        slot.trim_history();
        Ok(env)
    }

    /// Pull through an input: resolve the source chain, then apply the
    /// input's automatic unit conversion and axis transform.
    pub fn pull(
        &mut self,
        host: &mut dyn CallbackHost,
        id: InputId,
        time: Time,
    ) -> Result<Envelope, PullError> {
        let source = self.inputs[id.0 as usize].source.ok_or_else(|| {
            PullError::Setup(SetupError::UnconnectedInput {
                input: self.inputs[id.0 as usize].path.clone(),
            })
        })?;
        let mut env = self.get_data(host, source, time, TargetId::Input(id))?;

        let slot = &self.inputs[id.0 as usize];
        if let Some(info) = &slot.info {
            if let Some(units) = &info.units {
                env = env.convert_units(units).map_err(PullError::Data)?;
            }
            if let Some(grid) = &info.grid {
                if env.grid() != grid {
                    let transform =
                        env.grid()
                            .transform_to(grid)
                            .ok_or_else(|| PullError::Metadata(
                                MetadataError::IncompatibleGrids {
                                    ours: grid.to_string(),
                                    theirs: env.grid().to_string(),
                                },
                            ))?;
                    env = env.apply_transform(&transform, grid);
                }
            }
        }
        Ok(env)
    }

    // ── Accessors for checks, contexts, and metadata ───────────────

    /// Number of registered outputs.
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Number of registered inputs.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of registered adapters.
    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// An output's composition-wide path (`component.slot`).
    pub fn output_path(&self, id: OutputId) -> &str {
        &self.outputs[id.0 as usize].path
    }

    /// An output's origin kind.
    pub fn output_kind(&self, id: OutputId) -> OutputKind {
        self.outputs[id.0 as usize].kind
    }

    /// Whether an output is static.
    pub fn output_is_static(&self, id: OutputId) -> bool {
        self.outputs[id.0 as usize].is_static
    }

    /// An output's owning component.
    pub fn output_owner(&self, id: OutputId) -> Option<ComponentKey> {
        self.outputs[id.0 as usize].owner
    }

    /// An output's chained targets, in notification order.
    pub fn output_targets(&self, id: OutputId) -> &[TargetId] {
        &self.outputs[id.0 as usize].targets
    }

    /// An output's published metadata.
    pub fn output_info(&self, id: OutputId) -> Option<&Info> {
        self.outputs[id.0 as usize].info.as_ref()
    }

    /// The metadata an output was declared with.
    pub fn output_declared(&self, id: OutputId) -> &Info {
        &self.outputs[id.0 as usize].declared
    }

    /// An input's composition-wide path.
    pub fn input_path(&self, id: InputId) -> &str {
        &self.inputs[id.0 as usize].path
    }

    /// An input's consumption kind.
    pub fn input_kind(&self, id: InputId) -> InputKind {
        self.inputs[id.0 as usize].kind
    }

    /// An input's owning component.
    pub fn input_owner(&self, id: InputId) -> ComponentKey {
        self.inputs[id.0 as usize].owner
    }

    /// An input's bound source, if any.
    pub fn input_source(&self, id: InputId) -> Option<SourceId> {
        self.inputs[id.0 as usize].source
    }

    /// An input's resolved metadata.
    pub fn input_info(&self, id: InputId) -> Option<&Info> {
        self.inputs[id.0 as usize].info.as_ref()
    }

    /// The metadata an input was declared with.
    pub fn input_declared(&self, id: InputId) -> &Info {
        &self.inputs[id.0 as usize].declared
    }

    /// The time of the most recent notification that reached an input.
    pub fn input_last_notified(&self, id: InputId) -> Option<Time> {
        self.inputs[id.0 as usize].last_notified
    }

    /// An adapter's composition-wide path (`name#index`).
    pub fn adapter_path(&self, id: AdapterId) -> &str {
        &self.adapters[id.0 as usize].path
    }

    /// An adapter's protocol kind.
    pub fn adapter_kind(&self, id: AdapterId) -> AdapterKind {
        self.adapters[id.0 as usize].kind
    }

    /// Whether an adapter cuts dependency edges.
    pub fn adapter_is_delay(&self, id: AdapterId) -> bool {
        self.adapters[id.0 as usize].is_delay
    }

    /// Whether an adapter forbids branching.
    pub fn adapter_no_branch(&self, id: AdapterId) -> bool {
        self.adapters[id.0 as usize].no_branch
    }

    /// An adapter's bound upstream source, if any.
    pub fn adapter_source(&self, id: AdapterId) -> Option<SourceId> {
        self.adapters[id.0 as usize].source
    }

    /// An adapter's chained targets, in notification order.
    pub fn adapter_targets(&self, id: AdapterId) -> &[TargetId] {
        &self.adapters[id.0 as usize].targets
    }

    /// An adapter's negotiated downstream-facing metadata.
    pub fn adapter_info(&self, id: AdapterId) -> Option<&Info> {
        self.adapters[id.0 as usize].info.as_ref()
    }

    /// The path of either end of a link, for error reporting.
    pub fn source_path(&self, id: SourceId) -> &str {
        match id {
            SourceId::Output(o) => self.output_path(o),
            SourceId::Adapter(a) => self.adapter_path(a),
        }
    }

    /// The path of a link target, for error reporting.
    pub fn target_path(&self, id: TargetId) -> &str {
        match id {
            TargetId::Input(i) => self.input_path(i),
            TargetId::Adapter(a) => self.adapter_path(a),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::NoCallbacks;
    use chrono::NaiveDate;
    use confluence_core::{GridSpec, Units};

    fn day(d: u32) -> Time {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn scalar_info() -> Info {
        Info::new()
            .with_grid(GridSpec::scalar())
            .with_units(Units::dimensionless())
            .with_time(day(1))
    }

    fn scalar_env(value: f64, time: Time) -> Envelope {
        Envelope::prepare(vec![value], &scalar_info(), time).unwrap()
    }

    /// Graph with one push output chained to one pull input, sealed.
    fn linked_pair() -> (LinkGraph, OutputId, InputId) {
        let mut graph = LinkGraph::new();
        let out = graph
            .add_output(
                None,
                "src.out".into(),
                "out".into(),
                OutputKind::Push,
                false,
                scalar_info(),
            )
            .unwrap();
        let inp = graph
            .add_input(
                ComponentKey(0),
                "sink.in".into(),
                "in".into(),
                InputKind::Pull,
                Info::new(),
            )
            .unwrap();
        graph
            .chain(SourceId::Output(out), TargetId::Input(inp))
            .unwrap();
        graph.seal();
        graph.push_info(out, scalar_info()).unwrap();
        (graph, out, inp)
    }

    // ── Push and step-left retrieval ─────────────────────────────

    #[test]
    fn push_then_pull_returns_entry() {
        let (mut graph, out, inp) = linked_pair();
        graph.exchange_info(inp, &Info::new()).unwrap();
        graph.push(&mut NoCallbacks, out, scalar_env(1.0, day(1))).unwrap();
        let env = graph.pull(&mut NoCallbacks, inp, day(1)).unwrap();
        assert_eq!(env.scalar().unwrap(), 1.0);
    }

    #[test]
    fn pull_between_entries_steps_left() {
        let (mut graph, out, inp) = linked_pair();
        graph.exchange_info(inp, &Info::new()).unwrap();
        graph.begin_run();
        graph.push(&mut NoCallbacks, out, scalar_env(1.0, day(1))).unwrap();
        graph.push(&mut NoCallbacks, out, scalar_env(3.0, day(3))).unwrap();
        // Day 2 falls strictly between: the earlier entry answers.
        let env = graph.pull(&mut NoCallbacks, inp, day(2)).unwrap();
        assert_eq!(env.scalar().unwrap(), 1.0);
        // Exactly on a stored timestamp returns that entry.
        let env = graph.pull(&mut NoCallbacks, inp, day(3)).unwrap();
        assert_eq!(env.scalar().unwrap(), 3.0);
    }

    #[test]
    fn pull_before_first_entry_is_no_data() {
        let (mut graph, out, inp) = linked_pair();
        graph.exchange_info(inp, &Info::new()).unwrap();
        graph.begin_run();
        graph.push(&mut NoCallbacks, out, scalar_env(5.0, day(5))).unwrap();
        match graph.pull(&mut NoCallbacks, inp, day(2)) {
            Err(PullError::NoData { slot, .. }) => assert_eq!(slot, "src.out"),
            other => panic!("expected NoData, got {other:?}"),
        }
    }

    // ── Push validation ──────────────────────────────────────────

    #[test]
    fn time_regress_rejected() {
        let (mut graph, out, _) = linked_pair();
        graph.begin_run();
        graph.push(&mut NoCallbacks, out, scalar_env(1.0, day(3))).unwrap();
        match graph.push(&mut NoCallbacks, out, scalar_env(2.0, day(2))) {
            Err(PullError::Data(DataError::TimeRegress { .. })) => {}
            other => panic!("expected TimeRegress, got {other:?}"),
        }
    }

    #[test]
    fn equal_time_allowed_only_for_first_run_push() {
        let (mut graph, out, _) = linked_pair();
        // Connect-phase initial push at day 1.
        graph.push(&mut NoCallbacks, out, scalar_env(0.0, day(1))).unwrap();
        graph.begin_run();
        // First run push may repeat the connect timestamp.
        graph.push(&mut NoCallbacks, out, scalar_env(1.0, day(1))).unwrap();
        // A second equal-time push is a regression.
        match graph.push(&mut NoCallbacks, out, scalar_env(2.0, day(1))) {
            Err(PullError::Data(DataError::TimeRegress { .. })) => {}
            other => panic!("expected TimeRegress, got {other:?}"),
        }
    }

    #[test]
    fn aliased_buffer_rejected() {
        let (mut graph, out, _) = linked_pair();
        graph.begin_run();
        let env = scalar_env(1.0, day(1));
        let alias = env.at_time(day(2));
        graph.push(&mut NoCallbacks, out, env).unwrap();
        match graph.push(&mut NoCallbacks, out, alias) {
            Err(PullError::Data(DataError::AliasedBuffer { .. })) => {}
            other => panic!("expected AliasedBuffer, got {other:?}"),
        }
    }

    #[test]
    fn static_output_single_push_any_time() {
        let mut graph = LinkGraph::new();
        let out = graph
            .add_output(
                None,
                "s.out".into(),
                "out".into(),
                OutputKind::Push,
                true,
                scalar_info(),
            )
            .unwrap();
        let inp = graph
            .add_input(
                ComponentKey(0),
                "sink.in".into(),
                "in".into(),
                InputKind::Pull,
                Info::new(),
            )
            .unwrap();
        graph.chain(SourceId::Output(out), TargetId::Input(inp)).unwrap();
        graph.seal();
        graph.push_info(out, scalar_info()).unwrap();
        graph.exchange_info(inp, &Info::new()).unwrap();

        graph.push(&mut NoCallbacks, out, scalar_env(7.0, day(1))).unwrap();
        // Any pull time answers with the single entry, even earlier ones.
        for d in [1, 5, 28] {
            let env = graph.pull(&mut NoCallbacks, inp, day(d)).unwrap();
            assert_eq!(env.scalar().unwrap(), 7.0);
        }
        match graph.push(&mut NoCallbacks, out, scalar_env(8.0, day(9))) {
            Err(PullError::Data(DataError::StaticRepush { .. })) => {}
            other => panic!("expected StaticRepush, got {other:?}"),
        }
    }

    // ── Wiring rules ─────────────────────────────────────────────

    #[test]
    fn double_bind_rejected() {
        let mut graph = LinkGraph::new();
        let a = graph
            .add_output(None, "a.out".into(), "out".into(), OutputKind::Push, false, scalar_info())
            .unwrap();
        let b = graph
            .add_output(None, "b.out".into(), "out".into(), OutputKind::Push, false, scalar_info())
            .unwrap();
        let inp = graph
            .add_input(ComponentKey(0), "c.in".into(), "in".into(), InputKind::Pull, Info::new())
            .unwrap();
        graph.chain(SourceId::Output(a), TargetId::Input(inp)).unwrap();
        match graph.chain(SourceId::Output(b), TargetId::Input(inp)) {
            Err(SetupError::AlreadyBound { slot }) => assert_eq!(slot, "c.in"),
            other => panic!("expected AlreadyBound, got {other:?}"),
        }
    }

    #[test]
    fn chain_after_seal_rejected() {
        let (mut graph, out, _) = linked_pair();
        let extra = graph.add_input(
            ComponentKey(1),
            "late.in".into(),
            "in".into(),
            InputKind::Pull,
            Info::new(),
        );
        // Slot registration itself is also frozen.
        assert!(matches!(extra, Err(SetupError::AlreadyConnecting { .. })));
        let _ = out;
    }

    // ── History retention ────────────────────────────────────────

    #[test]
    fn history_trims_behind_watermarks() {
        let (mut graph, out, inp) = linked_pair();
        graph.exchange_info(inp, &Info::new()).unwrap();
        graph.begin_run();
        for d in 1..=5 {
            graph
                .push(&mut NoCallbacks, out, scalar_env(d as f64, day(d)))
                .unwrap();
        }
        assert_eq!(graph.outputs[out.0 as usize].history.len(), 5);

        // Pull at day 4: entries 1-3 are no longer required.
        graph.pull(&mut NoCallbacks, inp, day(4)).unwrap();
        assert_eq!(graph.outputs[out.0 as usize].history.len(), 2);

        // The retained entry at day 4 still answers a repeat pull.
        let env = graph.pull(&mut NoCallbacks, inp, day(4)).unwrap();
        assert_eq!(env.scalar().unwrap(), 4.0);
    }

    #[test]
    fn history_keeps_step_left_entry() {
        let (mut graph, out, inp) = linked_pair();
        graph.exchange_info(inp, &Info::new()).unwrap();
        graph.begin_run();
        graph.push(&mut NoCallbacks, out, scalar_env(1.0, day(1))).unwrap();
        graph.push(&mut NoCallbacks, out, scalar_env(4.0, day(4))).unwrap();
        // Pull at day 2 lands between entries; day 1 must survive the trim.
        graph.pull(&mut NoCallbacks, inp, day(2)).unwrap();
        let env = graph.pull(&mut NoCallbacks, inp, day(3)).unwrap();
        assert_eq!(env.scalar().unwrap(), 1.0);
    }

    // ── Spill under memory budget ────────────────────────────────

    #[test]
    fn over_budget_history_spills_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = LinkGraph::new();
        // Two scalar envelopes (8 bytes each) fit; the third spills.
        graph.set_slot_policy(Some(16), Some(dir.path().to_path_buf()));
        let out = graph
            .add_output(None, "src.out".into(), "out".into(), OutputKind::Push, false, scalar_info())
            .unwrap();
        let inp = graph
            .add_input(ComponentKey(0), "sink.in".into(), "in".into(), InputKind::Pull, Info::new())
            .unwrap();
        graph.chain(SourceId::Output(out), TargetId::Input(inp)).unwrap();
        graph.seal();
        graph.push_info(out, scalar_info()).unwrap();
        graph.exchange_info(inp, &Info::new()).unwrap();
        graph.begin_run();

        for d in 1..=3 {
            graph
                .push(&mut NoCallbacks, out, scalar_env(d as f64, day(d)))
                .unwrap();
        }
        let slot = &graph.outputs[out.0 as usize];
        assert!(slot.mem_bytes <= 16, "mem_bytes {} over budget", slot.mem_bytes);
        assert!(matches!(slot.history[0], HistoryEntry::Spilled(_)));

        // Spilled entries still answer pulls.
        let env = graph.pull(&mut NoCallbacks, inp, day(1)).unwrap();
        assert_eq!(env.scalar().unwrap(), 1.0);
    }

    // ── Metadata exchange through adapters ───────────────────────

    /// Doubles values; rewrites no metadata.
    struct Doubling;
    impl Adapter for Doubling {
        fn name(&self) -> &str {
            "doubling"
        }
        fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
            let env = ctx.pull(time)?;
            let doubled: Vec<f64> = env.values().iter().map(|v| v * 2.0).collect();
            Ok(Envelope::from_parts(
                doubled.into(),
                env.grid().clone(),
                env.units().clone(),
                env.time(),
            ))
        }
    }

    /// Buffers the latest pushed envelope; serves pulls from the buffer.
    struct LatestValue {
        cached: Option<Envelope>,
    }
    impl Adapter for LatestValue {
        fn name(&self) -> &str {
            "latest"
        }
        fn kind(&self) -> AdapterKind {
            AdapterKind::TimeCaching
        }
        fn source_updated(
            &mut self,
            ctx: &mut AdapterContext<'_>,
            time: Time,
        ) -> Result<(), PullError> {
            self.cached = Some(ctx.pull(time)?);
            Ok(())
        }
        fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
            self.cached.clone().ok_or_else(|| ctx.no_data(time))
        }
    }

    fn linked_via(adapter: Box<dyn Adapter>) -> (LinkGraph, OutputId, InputId) {
        let mut graph = LinkGraph::new();
        let out = graph
            .add_output(None, "src.out".into(), "out".into(), OutputKind::Push, false, scalar_info())
            .unwrap();
        let ad = graph.add_adapter(adapter).unwrap();
        let inp = graph
            .add_input(ComponentKey(0), "sink.in".into(), "in".into(), InputKind::Pull, Info::new())
            .unwrap();
        graph.chain(SourceId::Output(out), TargetId::Adapter(ad)).unwrap();
        graph.chain(SourceId::Adapter(ad), TargetId::Input(inp)).unwrap();
        graph.seal();
        graph.push_info(out, scalar_info()).unwrap();
        (graph, out, inp)
    }

    #[test]
    fn stateless_adapter_transforms_on_pull() {
        let (mut graph, out, inp) = linked_via(Box::new(Doubling));
        graph.exchange_info(inp, &Info::new()).unwrap();
        graph.push(&mut NoCallbacks, out, scalar_env(21.0, day(1))).unwrap();
        let env = graph.pull(&mut NoCallbacks, inp, day(1)).unwrap();
        assert_eq!(env.scalar().unwrap(), 42.0);
    }

    #[test]
    fn time_caching_adapter_buffers_on_push() {
        let (mut graph, out, inp) = linked_via(Box::new(LatestValue { cached: None }));
        graph.exchange_info(inp, &Info::new()).unwrap();
        // Before any push the cache is empty.
        match graph.pull(&mut NoCallbacks, inp, day(1)) {
            Err(PullError::NoData { slot, .. }) => assert!(slot.starts_with("latest")),
            other => panic!("expected NoData, got {other:?}"),
        }
        graph.push(&mut NoCallbacks, out, scalar_env(9.0, day(1))).unwrap();
        let env = graph.pull(&mut NoCallbacks, inp, day(1)).unwrap();
        assert_eq!(env.scalar().unwrap(), 9.0);
    }

    #[test]
    fn exchange_absorbs_both_ways() {
        let (mut graph, _out, inp) = linked_via(Box::new(Doubling));
        // Input declares units but no grid; the source's scalar grid is
        // absorbed through the adapter chain.
        let desired = Info::new().with_units(Units::parse("1").unwrap());
        let resolved = graph.exchange_info(inp, &desired).unwrap();
        assert_eq!(resolved.grid, Some(GridSpec::scalar()));
        assert_eq!(resolved.units, Some(Units::parse("1").unwrap()));
        // The adapter recorded its downstream-facing info.
        assert!(graph.adapter_info(AdapterId(0)).is_some());
    }

    #[test]
    fn exchange_before_publish_is_pending() {
        let mut graph = LinkGraph::new();
        let out = graph
            .add_output(None, "src.out".into(), "out".into(), OutputKind::Push, false, scalar_info())
            .unwrap();
        let inp = graph
            .add_input(ComponentKey(0), "sink.in".into(), "in".into(), InputKind::Pull, Info::new())
            .unwrap();
        graph.chain(SourceId::Output(out), TargetId::Input(inp)).unwrap();
        graph.seal();
        match graph.exchange_info(inp, &Info::new()) {
            Err(PullError::InfoPending { slot }) => assert_eq!(slot, "src.out"),
            other => panic!("expected InfoPending, got {other:?}"),
        }
    }

    #[test]
    fn input_converts_units_automatically() {
        let mut graph = LinkGraph::new();
        let info = Info::new()
            .with_grid(GridSpec::scalar())
            .with_units(Units::parse("m/s").unwrap())
            .with_time(day(1));
        let out = graph
            .add_output(None, "src.out".into(), "out".into(), OutputKind::Push, false, info.clone())
            .unwrap();
        let inp = graph
            .add_input(ComponentKey(0), "sink.in".into(), "in".into(), InputKind::Pull, Info::new())
            .unwrap();
        graph.chain(SourceId::Output(out), TargetId::Input(inp)).unwrap();
        graph.seal();
        graph.push_info(out, info.clone()).unwrap();
        graph
            .exchange_info(inp, &Info::new().with_units(Units::parse("km/h").unwrap()))
            .unwrap();

        let env = Envelope::prepare(vec![10.0], &info, day(1)).unwrap();
        graph.push(&mut NoCallbacks, out, env).unwrap();
        let pulled = graph.pull(&mut NoCallbacks, inp, day(1)).unwrap();
        assert!((pulled.scalar().unwrap() - 36.0).abs() < 1e-9);
    }

    #[test]
    fn identity_units_are_bit_identical() {
        let (mut graph, out, inp) = linked_pair();
        graph.exchange_info(inp, &Info::new().with_units(Units::dimensionless())).unwrap();
        let env = scalar_env(0.1 + 0.2, day(1));
        let expected = env.values().to_vec();
        graph.push(&mut NoCallbacks, out, env).unwrap();
        let pulled = graph.pull(&mut NoCallbacks, inp, day(1)).unwrap();
        assert_eq!(pulled.values(), expected.as_slice());
    }
}
