//! The [`Component`] trait, lifecycle status, and hook contexts.
//!
//! A component is a unit with named ports and a lifecycle. One trait
//! covers both variants: time-stepping components report
//! [`timing`](Component::timing) and implement
//! [`update`](Component::update); stateless components leave `timing` at
//! `None` and react through [`source_updated`](Component::source_updated)
//! (push-based) or [`generate`](Component::generate) (pull-based).
//!
//! Components never touch the link graph directly — every hook receives
//! a context scoped to the component's own slots.

use std::fmt;

use confluence_core::{ComponentError, Envelope, Info, PullError, SetupError, Time};
use indexmap::IndexMap;

use crate::connector::ConnectStatus;
use crate::graph::{InputId, InputKind, LinkGraph, OutputId, OutputKind};

// ── Identity and status ────────────────────────────────────────────

/// Index of a component within its composition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey(pub u32);

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a component.
///
/// `Created → Initialized → {Connecting, ConnectingIdle, Connected} →
/// Validated → Updated* → Finalized`, with `Failed` absorbing from any
/// non-terminal state. A component that never needs to update may end the
/// run in `Validated`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentStatus {
    /// Constructed, not yet initialized.
    Created,
    /// Slots are declared.
    Initialized,
    /// Made progress in the last connect pass.
    Connecting,
    /// Made no progress in the last connect pass.
    ConnectingIdle,
    /// All metadata and initial data exchanged.
    Connected,
    /// Ready to run.
    Validated,
    /// Updated at least once.
    Updated,
    /// Torn down.
    Finalized,
    /// A hook failed; absorbing.
    Failed,
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Connecting => "connecting",
            Self::ConnectingIdle => "connecting-idle",
            Self::Connected => "connected",
            Self::Validated => "validated",
            Self::Updated => "updated",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// The time axis of a time-stepping component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// The component's current simulated instant.
    pub time: Time,
    /// The instant at which the next update will complete. Must be
    /// `>= time` and monotone non-decreasing across calls.
    pub next_time: Time,
}

/// A component's slots, by local name in declaration order.
#[derive(Clone, Debug, Default)]
pub struct SlotTable {
    /// Input handles by local name.
    pub inputs: IndexMap<String, InputId>,
    /// Output handles by local name.
    pub outputs: IndexMap<String, OutputId>,
}

// ── Callback dispatch ──────────────────────────────────────────────

/// Dispatches graph-initiated callbacks to hosted components.
///
/// The graph cannot own components; during a push cascade or a pull
/// against a callback output it hands control back to the composition
/// through this trait. Implemented by the engine's component table.
pub trait CallbackHost {
    /// Deliver a notification to a push-based input's owning component.
    fn deliver_notification(
        &mut self,
        graph: &mut LinkGraph,
        owner: ComponentKey,
        input: &str,
        time: Time,
    ) -> Result<(), PullError>;

    /// Ask a pull-based output's owning component to generate data.
    fn generate(
        &mut self,
        graph: &mut LinkGraph,
        owner: ComponentKey,
        output: &str,
        time: Time,
    ) -> Result<Envelope, PullError>;
}

/// A host for graphs without callback slots; any dispatch is an error.
/// Useful in tests below the composition layer.
pub struct NoCallbacks;

impl CallbackHost for NoCallbacks {
    fn deliver_notification(
        &mut self,
        _graph: &mut LinkGraph,
        owner: ComponentKey,
        input: &str,
        _time: Time,
    ) -> Result<(), PullError> {
        Err(PullError::Component {
            component: owner.to_string(),
            reason: format!("no host to deliver notification for '{input}'"),
        })
    }

    fn generate(
        &mut self,
        _graph: &mut LinkGraph,
        owner: ComponentKey,
        output: &str,
        _time: Time,
    ) -> Result<Envelope, PullError> {
        Err(PullError::Component {
            component: owner.to_string(),
            reason: format!("no host to generate data for '{output}'"),
        })
    }
}

// ── Component trait ────────────────────────────────────────────────

/// A hosted simulation component.
///
/// Lifecycle hooks are framework-called in order: `initialize` (declare
/// slots), `connect` (repeatedly, until [`ConnectStatus::Connected`]),
/// `validate`, `update` (time-stepping components, scheduler-selected),
/// `finalize`. A failure in any hook moves the component to
/// [`ComponentStatus::Failed`] and aborts the composition.
pub trait Component: 'static {
    /// The component's unique name within the composition.
    fn name(&self) -> &str;

    /// Declare inputs and outputs.
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError>;

    /// Run one pass of the connect negotiation. Most implementations
    /// keep a [`Connector`](crate::Connector) and delegate to its
    /// [`try_connect`](crate::Connector::try_connect).
    fn connect(&mut self, ctx: &mut SlotContext<'_>) -> Result<ConnectStatus, ComponentError>;

    /// Check the component's own configuration after connect.
    fn validate(&mut self, ctx: &mut SlotContext<'_>) -> Result<(), ComponentError> {
        let _ = ctx;
        Ok(())
    }

    /// Advance the component by one step. Only called on components that
    /// report [`timing`](Component::timing). After the call returns, the
    /// component's time must equal the `next_time` it declared before
    /// the call.
    fn update(&mut self, ctx: &mut SlotContext<'_>) -> Result<(), ComponentError> {
        let _ = ctx;
        Ok(())
    }

    /// Tear the component down.
    fn finalize(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }

    /// The component's time axis; `None` for stateless components.
    fn timing(&self) -> Option<Timing> {
        None
    }

    /// Reaction hook for callback inputs; invoked synchronously while
    /// the triggering push is still in progress.
    fn source_updated(
        &mut self,
        ctx: &mut SlotContext<'_>,
        input: &str,
        time: Time,
    ) -> Result<(), ComponentError> {
        let _ = (ctx, input, time);
        Ok(())
    }

    /// Generation hook for callback outputs; invoked synchronously while
    /// the triggering pull is still in progress.
    fn generate(
        &mut self,
        ctx: &mut SlotContext<'_>,
        output: &str,
        time: Time,
    ) -> Result<Envelope, ComponentError> {
        let _ = (ctx, time);
        Err(ComponentError::failed(format!(
            "component '{}' has no generate hook for output '{output}'",
            self.name()
        )))
    }
}

// ── InitContext ────────────────────────────────────────────────────

/// Slot declaration surface handed to [`Component::initialize`].
pub struct InitContext<'a> {
    graph: &'a mut LinkGraph,
    key: ComponentKey,
    component: &'a str,
    slots: &'a mut SlotTable,
}

impl<'a> InitContext<'a> {
    /// Build a declaration context for one component. Engine-internal.
    pub fn new(
        graph: &'a mut LinkGraph,
        key: ComponentKey,
        component: &'a str,
        slots: &'a mut SlotTable,
    ) -> Self {
        Self {
            graph,
            key,
            component,
            slots,
        }
    }

    fn check_new_slot(&self, name: &str) -> Result<(), ComponentError> {
        if self.slots.inputs.contains_key(name) || self.slots.outputs.contains_key(name) {
            return Err(ComponentError::Pull(PullError::Setup(
                SetupError::DuplicateSlot {
                    component: self.component.to_string(),
                    slot: name.to_string(),
                },
            )));
        }
        Ok(())
    }

    fn register_input(&mut self, name: &str, kind: InputKind, info: Info) -> Result<InputId, ComponentError> {
        self.check_new_slot(name)?;
        let path = format!("{}.{name}", self.component);
        let id = self
            .graph
            .add_input(self.key, path, name.to_string(), kind, info)
            .map_err(|e| ComponentError::Pull(PullError::Setup(e)))?;
        self.slots.inputs.insert(name.to_string(), id);
        Ok(id)
    }

    fn register_output(
        &mut self,
        name: &str,
        kind: OutputKind,
        is_static: bool,
        info: Info,
    ) -> Result<OutputId, ComponentError> {
        self.check_new_slot(name)?;
        let path = format!("{}.{name}", self.component);
        let id = self
            .graph
            .add_output(Some(self.key), path, name.to_string(), kind, is_static, info)
            .map_err(|e| ComponentError::Pull(PullError::Setup(e)))?;
        self.slots.outputs.insert(name.to_string(), id);
        Ok(id)
    }

    /// Declare a pull-based input with its desired (possibly partial)
    /// metadata.
    pub fn add_input(&mut self, name: &str, info: Info) -> Result<InputId, ComponentError> {
        self.register_input(name, InputKind::Pull, info)
    }

    /// Declare a push-based input: notifications are delivered to the
    /// component's [`source_updated`](Component::source_updated) hook.
    pub fn add_callback_input(&mut self, name: &str, info: Info) -> Result<InputId, ComponentError> {
        self.register_input(name, InputKind::Callback(self.key), info)
    }

    /// Declare a push-based output with its declared metadata.
    pub fn add_output(&mut self, name: &str, info: Info) -> Result<OutputId, ComponentError> {
        self.register_output(name, OutputKind::Push, false, info)
    }

    /// Declare a static output: exactly one push, answers any pull time.
    pub fn add_static_output(&mut self, name: &str, info: Info) -> Result<OutputId, ComponentError> {
        self.register_output(name, OutputKind::Push, true, info)
    }

    /// Declare a pull-based output: pulls are answered by the
    /// component's [`generate`](Component::generate) hook.
    pub fn add_callback_output(&mut self, name: &str, info: Info) -> Result<OutputId, ComponentError> {
        self.register_output(name, OutputKind::Callback(self.key), false, info)
    }
}

// ── SlotContext ────────────────────────────────────────────────────

/// Slot access surface handed to the connect, validate, update, and
/// reaction hooks.
///
/// All operations address the component's own slots by local name; the
/// context resolves them to graph handles and mediates the call.
pub struct SlotContext<'a> {
    graph: &'a mut LinkGraph,
    host: &'a mut dyn CallbackHost,
    slots: SlotTable,
    component: String,
    time: Time,
}

impl<'a> SlotContext<'a> {
    /// Build a slot context for one component. Engine-internal.
    pub fn new(
        graph: &'a mut LinkGraph,
        host: &'a mut dyn CallbackHost,
        slots: SlotTable,
        component: String,
        time: Time,
    ) -> Self {
        Self {
            graph,
            host,
            slots,
            component,
            time,
        }
    }

    fn input_id(&self, name: &str) -> Result<InputId, PullError> {
        self.slots.inputs.get(name).copied().ok_or_else(|| {
            PullError::Setup(SetupError::UnknownSlot {
                component: self.component.clone(),
                slot: name.to_string(),
            })
        })
    }

    fn output_id(&self, name: &str) -> Result<OutputId, PullError> {
        self.slots.outputs.get(name).copied().ok_or_else(|| {
            PullError::Setup(SetupError::UnknownSlot {
                component: self.component.clone(),
                slot: name.to_string(),
            })
        })
    }

    /// The phase time: the composition start time during connect, the
    /// scheduler's selection time during updates.
    pub fn time(&self) -> Time {
        self.time
    }

    /// Pull data valid at `time` from an input.
    pub fn pull(&mut self, input: &str, time: Time) -> Result<Envelope, PullError> {
        let id = self.input_id(input)?;
        self.graph.pull(self.host, id, time)
    }

    /// Prepare and push raw values through an output, using the output's
    /// published metadata.
    ///
    /// [`PullError::InfoPending`] until the output's grid and units have
    /// resolved — expected during early connect passes.
    pub fn push(&mut self, output: &str, values: Vec<f64>, time: Time) -> Result<(), PullError> {
        let id = self.output_id(output)?;
        let info = match self.graph.output_info(id) {
            Some(info) if info.grid.is_some() && info.units.is_some() => info.clone(),
            _ => {
                return Err(PullError::InfoPending {
                    slot: self.graph.output_path(id).to_string(),
                })
            }
        };
        let env = Envelope::prepare(values, &info, time).map_err(PullError::Data)?;
        self.graph.push(self.host, id, env)
    }

    /// Push an already-prepared envelope through an output.
    pub fn push_envelope(&mut self, output: &str, env: Envelope) -> Result<(), PullError> {
        let id = self.output_id(output)?;
        self.graph.push(self.host, id, env)
    }

    /// Publish an output's metadata.
    pub fn push_info(&mut self, output: &str, info: Info) -> Result<(), PullError> {
        let id = self.output_id(output)?;
        self.graph.push_info(id, info).map_err(PullError::Metadata)
    }

    /// Run one info exchange for an input.
    pub fn exchange_info(&mut self, input: &str, desired: &Info) -> Result<Info, PullError> {
        let id = self.input_id(input)?;
        self.graph.exchange_info(id, desired)
    }

    /// An output's published metadata, if resolved.
    pub fn output_info(&self, output: &str) -> Option<Info> {
        let id = self.output_id(output).ok()?;
        self.graph.output_info(id).cloned()
    }

    /// The metadata an output was declared with.
    pub fn output_declared(&self, output: &str) -> Option<Info> {
        let id = self.output_id(output).ok()?;
        Some(self.graph.output_declared(id).clone())
    }

    /// An input's resolved metadata, if exchanged.
    pub fn input_info(&self, input: &str) -> Option<Info> {
        let id = self.input_id(input).ok()?;
        self.graph.input_info(id).cloned()
    }

    /// The metadata an input was declared with.
    pub fn input_declared(&self, input: &str) -> Option<Info> {
        let id = self.input_id(input).ok()?;
        Some(self.graph.input_declared(id).clone())
    }

    /// Input slot names in declaration order.
    pub fn input_names(&self) -> Vec<String> {
        self.slots.inputs.keys().cloned().collect()
    }

    /// Output slot names in declaration order.
    pub fn output_names(&self) -> Vec<String> {
        self.slots.outputs.keys().cloned().collect()
    }

    /// Prepare an envelope against an output's published metadata
    /// without pushing it. Used by `generate` hooks.
    pub fn prepare(
        &self,
        output: &str,
        values: Vec<f64>,
        time: Time,
    ) -> Result<Envelope, PullError> {
        let id = self.output_id(output)?;
        let info = match self.graph.output_info(id) {
            Some(info) => info.clone(),
            None => self.graph.output_declared(id).clone(),
        };
        Envelope::prepare(values, &info, time).map_err(PullError::Data)
    }
}
