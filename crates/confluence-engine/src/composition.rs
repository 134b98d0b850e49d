//! The [`Composition`]: container, phase driver, and scheduler loop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use confluence_core::{
    ComponentError, CompositionError, SetupError, StalledComponent, Time,
};
use confluence_sdk::{
    Component, ComponentKey, ComponentStatus, ConnectStatus, InputId, LinkGraph, SourceId,
    TargetId,
};

use crate::checks;
use crate::link::Link;
use crate::logging;
use crate::metadata::{AdapterMetadata, ComponentMetadata, LinkMetadata, Metadata};
use crate::schedule;
use crate::table::ComponentTable;

// ── Options ────────────────────────────────────────────────────────

/// Where composition logs go, in addition to `print_log`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LogFile {
    /// No log file.
    #[default]
    None,
    /// A file named `<logger_name>.log` in the working directory.
    Default,
    /// An explicit path.
    Path(PathBuf),
}

/// Construction options for a [`Composition`].
#[derive(Clone, Debug)]
pub struct CompositionOptions {
    /// Name used in log output and the default log file name.
    pub logger_name: String,
    /// Whether to log to stdout.
    pub print_log: bool,
    /// Log file policy.
    pub log_file: LogFile,
    /// Maximum level to log.
    pub log_level: tracing::Level,
    /// Byte budget per output slot before history spills to disk.
    /// `None` = unlimited.
    pub slot_memory_limit: Option<usize>,
    /// Directory for spill scratch files. `None` = the OS temp
    /// directory.
    pub slot_memory_location: Option<PathBuf>,
}

impl Default for CompositionOptions {
    fn default() -> Self {
        Self {
            logger_name: "confluence".to_string(),
            print_log: true,
            log_file: LogFile::None,
            log_level: tracing::Level::INFO,
            slot_memory_limit: None,
            slot_memory_location: None,
        }
    }
}

/// Cooperative stop handle; checked at the top of every scheduler step.
#[derive(Clone)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Request a clean stop: the scheduler finishes the step in progress
    /// and moves to the finalize phase.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Created,
    Initialized,
    Connected,
    Finished,
}

// ── Composition ────────────────────────────────────────────────────

/// A coupled-model composition.
///
/// Usage follows the lifecycle: register components, `initialize()`,
/// wire links, `connect(start)`, `run(end)`. Each phase validates its
/// precondition; calling out of order is a setup error.
pub struct Composition {
    graph: LinkGraph,
    table: ComponentTable,
    options: CompositionOptions,
    phase: Phase,
    stop: Arc<AtomicBool>,
    deps: Vec<Vec<usize>>,
    time_frame: Option<(Time, Time)>,
}

impl Composition {
    /// A composition with the given options. Installs the logging
    /// subscriber (best-effort) and records the slot policy.
    pub fn new(options: CompositionOptions) -> Self {
        logging::init(&options);
        let mut graph = LinkGraph::new();
        graph.set_slot_policy(
            options.slot_memory_limit,
            options.slot_memory_location.clone(),
        );
        Self {
            graph,
            table: ComponentTable::default(),
            options,
            phase: Phase::Created,
            stop: Arc::new(AtomicBool::new(false)),
            deps: Vec::new(),
            time_frame: None,
        }
    }

    /// A composition with default options.
    pub fn with_defaults() -> Self {
        Self::new(CompositionOptions::default())
    }

    /// Register a component. Only valid before `initialize()`.
    pub fn add_component(
        &mut self,
        component: Box<dyn Component>,
    ) -> Result<ComponentKey, CompositionError> {
        if self.phase != Phase::Created {
            return Err(SetupError::WrongPhase {
                expected: "pre-initialize",
            }
            .into());
        }
        Ok(self.table.add(component)?)
    }

    /// Run `initialize` on every component, in registration order.
    pub fn initialize(&mut self) -> Result<(), CompositionError> {
        if self.phase != Phase::Created {
            return Err(SetupError::WrongPhase {
                expected: "created",
            }
            .into());
        }
        for idx in 0..self.table.len() {
            self.table.call_initialize(&mut self.graph, idx)?;
        }
        self.phase = Phase::Initialized;
        info!(components = self.table.len(), "composition initialized");
        Ok(())
    }

    /// Realize a wired link built with [`src`](crate::src) `>>` … `>>`
    /// [`dst`](crate::dst). Only valid between `initialize()` and
    /// `connect()`.
    pub fn link(&mut self, link: Link) -> Result<(), CompositionError> {
        if self.phase != Phase::Initialized {
            return Err(SetupError::WrongPhase {
                expected: "initialized",
            }
            .into());
        }
        let output = self.resolve_output(link.source.0, &link.source.1)?;
        let input = self.resolve_input(link.target.0, &link.target.1)?;

        let mut cursor = SourceId::Output(output);
        for adapter in link.adapters {
            let id = self.graph.add_adapter(adapter)?;
            self.graph.chain(cursor, TargetId::Adapter(id))?;
            cursor = SourceId::Adapter(id);
        }
        self.graph.chain(cursor, TargetId::Input(input))?;
        Ok(())
    }

    fn resolve_output(
        &self,
        key: ComponentKey,
        slot: &str,
    ) -> Result<confluence_sdk::OutputId, CompositionError> {
        let idx = key.0 as usize;
        if idx >= self.table.len() {
            return Err(SetupError::UnknownComponent {
                name: key.to_string(),
            }
            .into());
        }
        self.table
            .slots(idx)
            .outputs
            .get(slot)
            .copied()
            .ok_or_else(|| {
                SetupError::UnknownSlot {
                    component: self.table.name(idx).to_string(),
                    slot: slot.to_string(),
                }
                .into()
            })
    }

    fn resolve_input(&self, key: ComponentKey, slot: &str) -> Result<InputId, CompositionError> {
        let idx = key.0 as usize;
        if idx >= self.table.len() {
            return Err(SetupError::UnknownComponent {
                name: key.to_string(),
            }
            .into());
        }
        self.table
            .slots(idx)
            .inputs
            .get(slot)
            .copied()
            .ok_or_else(|| {
                SetupError::UnknownSlot {
                    component: self.table.name(idx).to_string(),
                    slot: slot.to_string(),
                }
                .into()
            })
    }

    /// Run the connect fixpoint from `start`, then the structural
    /// checks, then `validate` on every component.
    ///
    /// The fixpoint calls every unconnected component's `connect` hook
    /// once per pass until all report connected. A pass in which nothing
    /// progressed and not everything is connected is a stall, reported
    /// with the stalled components and their unresolved slots.
    pub fn connect(&mut self, start: Time) -> Result<(), CompositionError> {
        if self.phase != Phase::Initialized {
            return Err(SetupError::WrongPhase {
                expected: "initialized",
            }
            .into());
        }
        self.graph.seal();
        for idx in 0..self.table.len() {
            self.table.set_status(idx, ComponentStatus::Connecting);
        }

        loop {
            if (0..self.table.len()).all(|i| self.table.status(i) == ComponentStatus::Connected) {
                break;
            }
            let mut any_progress = false;
            for idx in 0..self.table.len() {
                if self.table.status(idx) == ComponentStatus::Connected {
                    continue;
                }
                match self.table.call_connect(&mut self.graph, idx, start)? {
                    ConnectStatus::Connected => {
                        self.table.set_status(idx, ComponentStatus::Connected);
                        any_progress = true;
                    }
                    ConnectStatus::Connecting => {
                        self.table.set_status(idx, ComponentStatus::Connecting);
                        any_progress = true;
                    }
                    ConnectStatus::ConnectingIdle => {
                        self.table.set_status(idx, ComponentStatus::ConnectingIdle);
                    }
                }
            }
            if !any_progress {
                let stalled = self.stall_report();
                warn!(count = stalled.len(), "connect fixpoint stalled");
                return Err(CompositionError::ConnectStalled { stalled });
            }
        }

        checks::check_links(&self.graph)?;
        self.deps = checks::dependency_edges(&self.graph, self.table.len());
        checks::detect_cycles(&self.deps, &self.table)?;

        for idx in 0..self.table.len() {
            self.table.call_validate(&mut self.graph, idx, start)?;
        }
        self.phase = Phase::Connected;
        self.time_frame = Some((start, start));
        info!(%start, "composition connected");
        Ok(())
    }

    fn stall_report(&self) -> Vec<StalledComponent> {
        let mut stalled = Vec::new();
        for idx in 0..self.table.len() {
            if self.table.status(idx) == ComponentStatus::Connected {
                continue;
            }
            let slots = self.table.slots(idx);
            let mut unresolved = Vec::new();
            for (name, &input) in &slots.inputs {
                if self.graph.input_info(input).is_none() {
                    unresolved.push(name.clone());
                }
            }
            for (name, &output) in &slots.outputs {
                if self.graph.output_info(output).is_none() {
                    unresolved.push(name.clone());
                }
            }
            stalled.push(StalledComponent {
                component: self.table.name(idx).to_string(),
                unresolved,
            });
        }
        stalled
    }

    /// Drive the scheduler until every time-stepping component reaches
    /// `end` (or a stop is requested), then finalize.
    ///
    /// On error, components that reached `Validated` are still
    /// finalized, and the original error is surfaced.
    pub fn run(&mut self, end: Time) -> Result<(), CompositionError> {
        if self.phase != Phase::Connected {
            return Err(SetupError::WrongPhase {
                expected: "connected",
            }
            .into());
        }
        if let Some((start, _)) = self.time_frame {
            self.time_frame = Some((start, end));
        }
        self.graph.begin_run();

        let outcome = self.run_loop(end);
        match outcome {
            Ok(()) => {
                self.finalize_all()?;
                self.phase = Phase::Finished;
                info!(%end, "composition finished");
                Ok(())
            }
            Err(error) => {
                // Teardown is best-effort; the original error wins.
                let _ = self.finalize_all();
                self.phase = Phase::Finished;
                Err(error)
            }
        }
    }

    fn run_loop(&mut self, end: Time) -> Result<(), CompositionError> {
        let n = self.table.len();
        loop {
            if self.stop.load(Ordering::Relaxed) {
                info!("cooperative stop requested");
                break;
            }
            let Some(mut active) = schedule::pick_candidate(&self.table, end) else {
                break;
            };

            // Chase lagging upstream components. Terminates because the
            // dependency graph is acyclic after delay cutting.
            let mut hops = 0usize;
            loop {
                let timing = self.timing_of(active)?;
                match schedule::upstream_behind(&self.table, &self.deps, active, timing.next_time)
                {
                    Some(up) => active = up,
                    None => break,
                }
                hops += 1;
                if hops > n + 1 {
                    return Err(CompositionError::Setup(SetupError::CycleWithoutDelay {
                        path: vec![self.table.name(active).to_string()],
                    }));
                }
            }

            let timing = self.timing_of(active)?;
            let declared = timing.next_time;
            if let Some(previous) = self.table.last_next_time(active) {
                if declared < previous {
                    return Err(self.component_failure(
                        active,
                        "update",
                        ComponentError::NonMonotoneNextTime {
                            previous,
                            current: declared,
                        },
                    ));
                }
            }
            self.table.record_next_time(active, declared);

            debug!(
                component = %self.table.name(active),
                time = %timing.time,
                next = %declared,
                "scheduler step"
            );
            self.table.call_update(&mut self.graph, active, declared)?;

            let after = self.timing_of(active)?;
            if after.time != declared {
                return Err(self.component_failure(
                    active,
                    "update",
                    ComponentError::TimeMismatch {
                        declared,
                        actual: after.time,
                    },
                ));
            }
            if after.next_time < after.time {
                return Err(self.component_failure(
                    active,
                    "update",
                    ComponentError::NonMonotoneNextTime {
                        previous: after.time,
                        current: after.next_time,
                    },
                ));
            }
        }
        Ok(())
    }

    fn timing_of(&self, idx: usize) -> Result<confluence_sdk::Timing, CompositionError> {
        self.table.timing(idx).ok_or_else(|| {
            CompositionError::Component {
                component: self.table.name(idx).to_string(),
                phase: "update",
                source: ComponentError::failed("time-stepping component stopped reporting timing"),
            }
        })
    }

    fn component_failure(
        &mut self,
        idx: usize,
        phase: &'static str,
        source: ComponentError,
    ) -> CompositionError {
        self.table.set_status(idx, ComponentStatus::Failed);
        CompositionError::Component {
            component: self.table.name(idx).to_string(),
            phase,
            source,
        }
    }

    fn finalize_all(&mut self) -> Result<(), CompositionError> {
        let mut first_error = None;
        for idx in 0..self.table.len() {
            match self.table.status(idx) {
                ComponentStatus::Validated | ComponentStatus::Updated => {
                    if let Err(e) = self.table.call_finalize(idx) {
                        first_error.get_or_insert(e);
                    }
                }
                _ => {}
            }
        }
        self.graph.finalize();
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Request a cooperative stop from inside the process.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// A cloneable stop handle for other threads or signal handlers.
    pub fn stop_signal(&self) -> StopSignal {
        StopSignal(Arc::clone(&self.stop))
    }

    /// The composition's logging name.
    pub fn logger_name(&self) -> &str {
        &self.options.logger_name
    }

    /// A component's lifecycle status.
    pub fn status(&self, key: ComponentKey) -> Option<ComponentStatus> {
        let idx = key.0 as usize;
        if idx < self.table.len() {
            Some(self.table.status(idx))
        } else {
            None
        }
    }

    /// A nested snapshot of the composition: time frame, components,
    /// adapters, and links.
    pub fn metadata(&self) -> Metadata {
        let mut meta = Metadata {
            time_frame: self.time_frame,
            ..Metadata::default()
        };

        for idx in 0..self.table.len() {
            let timing = self.table.timing(idx);
            let slots = self.table.slots(idx);
            meta.components.insert(
                self.table.name(idx).to_string(),
                ComponentMetadata {
                    status: self.table.status(idx),
                    time: timing.map(|t| t.time),
                    next_time: timing.map(|t| t.next_time),
                    inputs: slots.inputs.keys().cloned().collect(),
                    outputs: slots.outputs.keys().cloned().collect(),
                },
            );
        }

        for idx in 0..self.graph.adapter_count() {
            let id = confluence_sdk::AdapterId(idx as u32);
            let info = self.graph.adapter_info(id);
            meta.adapters.insert(
                self.graph.adapter_path(id).to_string(),
                AdapterMetadata {
                    kind: self.graph.adapter_kind(id),
                    is_delay: self.graph.adapter_is_delay(id),
                    units: info.and_then(|i| i.units.as_ref().map(ToString::to_string)),
                    grid: info.and_then(|i| i.grid.as_ref().map(ToString::to_string)),
                },
            );
        }

        for idx in 0..self.graph.input_count() {
            let input = InputId(idx as u32);
            let mut via = Vec::new();
            let mut cursor = self.graph.input_source(input);
            let from = loop {
                match cursor {
                    Some(SourceId::Adapter(a)) => {
                        via.push(self.graph.adapter_path(a).to_string());
                        cursor = self.graph.adapter_source(a);
                    }
                    Some(SourceId::Output(o)) => break Some(self.graph.output_path(o).to_string()),
                    None => break None,
                }
            };
            if let Some(from) = from {
                via.reverse();
                meta.links.push(LinkMetadata {
                    from,
                    to: self.graph.input_path(input).to_string(),
                    via,
                });
            }
        }

        meta
    }
}
