//! Error types for the Confluence coupling framework.
//!
//! One enum per failure domain, organized by phase: setup (wiring and
//! structure), metadata (connect negotiation), data (push-time
//! validation), pull (run-time data retrieval), component (hosted code),
//! and the composition-level union surfaced to callers.

use std::error::Error;
use std::fmt;

use crate::time::Time;

// ── SetupError ─────────────────────────────────────────────────────

/// Structural errors in the composition, detected while wiring or during
/// the post-connect link checks. All of these abort before the run starts.
#[derive(Clone, Debug, PartialEq)]
pub enum SetupError {
    /// An input or adapter already has a source.
    AlreadyBound {
        /// The slot that was bound twice.
        slot: String,
    },
    /// Links were modified after the connect phase began.
    AlreadyConnecting {
        /// The slot whose link was modified.
        slot: String,
    },
    /// A no-branch adapter (or its downstream chain) has more than one
    /// target.
    Branching {
        /// The adapter that forbids branching.
        adapter: String,
    },
    /// An input has no source after wiring.
    UnconnectedInput {
        /// The dangling input.
        input: String,
    },
    /// A named component does not exist in the composition.
    UnknownComponent {
        /// The unknown name.
        name: String,
    },
    /// A named slot does not exist on its component.
    UnknownSlot {
        /// The owning component.
        component: String,
        /// The unknown slot name.
        slot: String,
    },
    /// Two slots with the same name were declared on one component.
    DuplicateSlot {
        /// The owning component.
        component: String,
        /// The duplicated name.
        slot: String,
    },
    /// Two components with the same name were registered.
    DuplicateComponent {
        /// The duplicated name.
        name: String,
    },
    /// The dependency graph contains a cycle with no delay adapter.
    CycleWithoutDelay {
        /// Component names along the cycle, in dependency order.
        path: Vec<String>,
    },
    /// A link can never exchange data: its upstream never pushes and its
    /// downstream never pulls.
    DeadLink {
        /// The upstream end of the dead edge.
        from: String,
        /// The downstream end of the dead edge.
        to: String,
    },
    /// A static output feeds a time-caching adapter, which would never
    /// receive the pushes it buffers.
    StaticIntoTimeCaching {
        /// The static output.
        output: String,
        /// The time-caching adapter.
        adapter: String,
    },
    /// A pull or notification re-entered a node already on the call
    /// stack: a true cycle reached at run time.
    ReentrantNode {
        /// The re-entered node.
        node: String,
    },
    /// An operation was called in the wrong composition phase.
    WrongPhase {
        /// The phase the operation requires.
        expected: &'static str,
    },
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyBound { slot } => {
                write!(f, "slot '{slot}' already has a source")
            }
            Self::AlreadyConnecting { slot } => {
                write!(f, "cannot modify link of '{slot}' after connect began")
            }
            Self::Branching { adapter } => {
                write!(f, "adapter '{adapter}' does not support branching")
            }
            Self::UnconnectedInput { input } => {
                write!(f, "input '{input}' is not connected")
            }
            Self::UnknownComponent { name } => {
                write!(f, "no component named '{name}'")
            }
            Self::UnknownSlot { component, slot } => {
                write!(f, "component '{component}' has no slot '{slot}'")
            }
            Self::DuplicateSlot { component, slot } => {
                write!(f, "component '{component}' declares slot '{slot}' twice")
            }
            Self::DuplicateComponent { name } => {
                write!(f, "component name '{name}' registered twice")
            }
            Self::CycleWithoutDelay { path } => {
                write!(f, "dependency cycle without a delay adapter: ")?;
                for (i, name) in path.iter().enumerate() {
                    if i > 0 {
                        write!(f, " -> ")?;
                    }
                    write!(f, "{name}")?;
                }
                Ok(())
            }
            Self::DeadLink { from, to } => {
                write!(
                    f,
                    "dead link: '{from}' never pushes and '{to}' never pulls"
                )
            }
            Self::StaticIntoTimeCaching { output, adapter } => {
                write!(
                    f,
                    "static output '{output}' cannot feed time-caching adapter '{adapter}'"
                )
            }
            Self::ReentrantNode { node } => {
                write!(f, "node '{node}' re-entered during its own call")
            }
            Self::WrongPhase { expected } => {
                write!(f, "operation requires the {expected} phase")
            }
        }
    }
}

impl Error for SetupError {}

// ── MetadataError ──────────────────────────────────────────────────

/// Metadata negotiation failures during the connect phase.
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataError {
    /// Grid specifications cannot be reconciled by an automatic axis
    /// transform.
    IncompatibleGrids {
        /// Our grid, rendered.
        ours: String,
        /// The peer's grid, rendered.
        theirs: String,
    },
    /// Units are not convertible.
    IncompatibleUnits {
        /// Our units, rendered.
        ours: String,
        /// The peer's units, rendered.
        theirs: String,
    },
    /// Mask policies cannot be reconciled.
    IncompatibleMasks,
    /// An output received conflicting metadata.
    Conflict {
        /// The output slot.
        output: String,
        /// What conflicted.
        detail: String,
    },
    /// A slot's metadata never resolved during the connect fixpoint.
    Unresolved {
        /// The unresolved slot.
        slot: String,
    },
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompatibleGrids { ours, theirs } => {
                write!(f, "incompatible grids: {ours} vs {theirs}")
            }
            Self::IncompatibleUnits { ours, theirs } => {
                write!(f, "incompatible units: {ours} vs {theirs}")
            }
            Self::IncompatibleMasks => write!(f, "incompatible mask policies"),
            Self::Conflict { output, detail } => {
                write!(f, "metadata conflict at output '{output}': {detail}")
            }
            Self::Unresolved { slot } => {
                write!(f, "metadata for slot '{slot}' never resolved")
            }
        }
    }
}

impl Error for MetadataError {}

// ── DataError ──────────────────────────────────────────────────────

/// Push-time data validation failures.
#[derive(Clone, Debug, PartialEq)]
pub enum DataError {
    /// Payload length does not match the grid's data shape.
    ShapeMismatch {
        /// Length the grid requires.
        expected: usize,
        /// Length the payload has.
        actual: usize,
    },
    /// Units cannot be converted.
    UnitsIncompatible {
        /// Source units, rendered.
        from: String,
        /// Target units, rendered.
        to: String,
    },
    /// A push's timestamp is not strictly later than the previous push.
    TimeRegress {
        /// The output slot.
        slot: String,
        /// Timestamp of the previous push.
        last: Time,
        /// Timestamp of the rejected push.
        pushed: Time,
    },
    /// A push's payload shares backing memory with the previous push.
    AliasedBuffer {
        /// The output slot.
        slot: String,
    },
    /// A static output received a second push.
    StaticRepush {
        /// The output slot.
        slot: String,
    },
    /// An envelope carries more than one time slice where a single one
    /// is required.
    MultipleTimeSlices {
        /// Number of slices present.
        count: usize,
    },
    /// A slot's metadata is not yet complete enough to prepare data.
    MissingInfo {
        /// The slot.
        slot: String,
    },
    /// The memory-limit spill could not be honored.
    Spill {
        /// Description of the spill failure.
        reason: String,
    },
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch { expected, actual } => {
                write!(f, "payload length {actual} does not match grid size {expected}")
            }
            Self::UnitsIncompatible { from, to } => {
                write!(f, "cannot convert units {from} to {to}")
            }
            Self::TimeRegress { slot, last, pushed } => {
                write!(
                    f,
                    "push to '{slot}' at {pushed} does not advance past {last}"
                )
            }
            Self::AliasedBuffer { slot } => {
                write!(
                    f,
                    "push to '{slot}' shares backing memory with the previous push"
                )
            }
            Self::StaticRepush { slot } => {
                write!(f, "static output '{slot}' accepts exactly one push")
            }
            Self::MultipleTimeSlices { count } => {
                write!(f, "envelope carries {count} time slices, expected one")
            }
            Self::MissingInfo { slot } => {
                write!(f, "metadata for '{slot}' is not complete")
            }
            Self::Spill { reason } => write!(f, "memory spill failed: {reason}"),
        }
    }
}

impl Error for DataError {}

// ── PullError ──────────────────────────────────────────────────────

/// Failures surfacing from a pull, a push cascade, or an info exchange.
///
/// [`PullError::NoData`] and [`PullError::InfoPending`] are *expected*
/// during the connect phase and absorbed by the connector; during the run
/// they are fatal.
#[derive(Clone, Debug, PartialEq)]
pub enum PullError {
    /// No entry with a timestamp at or before the requested time exists.
    NoData {
        /// The slot that had no data.
        slot: String,
        /// The requested time.
        time: Time,
    },
    /// The upstream output has not published its metadata yet.
    InfoPending {
        /// The slot still waiting.
        slot: String,
    },
    /// Data validation failed.
    Data(DataError),
    /// Metadata negotiation failed.
    Metadata(MetadataError),
    /// A structural error was reached at run time.
    Setup(SetupError),
    /// A hosted component's callback failed inside the cascade.
    Component {
        /// The failing component.
        component: String,
        /// Description of the failure.
        reason: String,
    },
}

impl fmt::Display for PullError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData { slot, time } => {
                write!(f, "no data at '{slot}' for time {time}")
            }
            Self::InfoPending { slot } => {
                write!(f, "metadata at '{slot}' not yet available")
            }
            Self::Data(e) => write!(f, "data: {e}"),
            Self::Metadata(e) => write!(f, "metadata: {e}"),
            Self::Setup(e) => write!(f, "setup: {e}"),
            Self::Component { component, reason } => {
                write!(f, "component '{component}' failed: {reason}")
            }
        }
    }
}

impl Error for PullError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Data(e) => Some(e),
            Self::Metadata(e) => Some(e),
            Self::Setup(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DataError> for PullError {
    fn from(e: DataError) -> Self {
        Self::Data(e)
    }
}

impl From<MetadataError> for PullError {
    fn from(e: MetadataError) -> Self {
        Self::Metadata(e)
    }
}

impl From<SetupError> for PullError {
    fn from(e: SetupError) -> Self {
        Self::Setup(e)
    }
}

impl PullError {
    /// Whether this error is expected (and absorbed) during the connect
    /// phase.
    pub fn recoverable_during_connect(&self) -> bool {
        matches!(self, Self::NoData { .. } | Self::InfoPending { .. })
    }
}

// ── ComponentError ─────────────────────────────────────────────────

/// Failures raised out of a hosted component's code or detected around
/// its lifecycle hooks.
#[derive(Clone, Debug, PartialEq)]
pub enum ComponentError {
    /// The component's own logic failed.
    ExecutionFailed {
        /// Description of the failure.
        reason: String,
    },
    /// A pull or push issued by the component failed.
    Pull(PullError),
    /// Data preparation inside the component failed.
    Data(DataError),
    /// After an update, the component's time did not equal its
    /// previously declared next time.
    TimeMismatch {
        /// The time the component declared before updating.
        declared: Time,
        /// The time the component actually reached.
        actual: Time,
    },
    /// The component's declared next time moved backwards.
    NonMonotoneNextTime {
        /// The earlier declaration.
        previous: Time,
        /// The regressed declaration.
        current: Time,
    },
}

impl ComponentError {
    /// Convenience constructor for a free-form component failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "{reason}"),
            Self::Pull(e) => write!(f, "{e}"),
            Self::Data(e) => write!(f, "{e}"),
            Self::TimeMismatch { declared, actual } => {
                write!(
                    f,
                    "update ended at {actual} but {declared} was declared as next time"
                )
            }
            Self::NonMonotoneNextTime { previous, current } => {
                write!(
                    f,
                    "next time moved backwards from {previous} to {current}"
                )
            }
        }
    }
}

impl Error for ComponentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Pull(e) => Some(e),
            Self::Data(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PullError> for ComponentError {
    fn from(e: PullError) -> Self {
        Self::Pull(e)
    }
}

impl From<DataError> for ComponentError {
    fn from(e: DataError) -> Self {
        Self::Data(e)
    }
}

// ── CompositionError ───────────────────────────────────────────────

/// A component that made no progress in a stalled connect fixpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct StalledComponent {
    /// The component's name.
    pub component: String,
    /// Slots whose metadata or data never settled.
    pub unresolved: Vec<String>,
}

/// The error surfaced by composition-level operations.
///
/// Carries the failing component, slot, and phase where applicable, so
/// the user-visible failure names the offending edge of the composition.
#[derive(Clone, Debug, PartialEq)]
pub enum CompositionError {
    /// Structural setup failure.
    Setup(SetupError),
    /// Metadata negotiation failure.
    Metadata(MetadataError),
    /// The connect fixpoint stalled: every unconnected component
    /// reported an idle pass.
    ConnectStalled {
        /// The components that stalled, with their unresolved slots.
        stalled: Vec<StalledComponent>,
    },
    /// Push-time data validation failure.
    Data(DataError),
    /// A pull found no data during the run.
    NoData {
        /// The slot that had no data.
        slot: String,
        /// The requested time.
        time: Time,
    },
    /// A hosted component failed.
    Component {
        /// The failing component.
        component: String,
        /// The lifecycle phase in which it failed.
        phase: &'static str,
        /// The underlying failure.
        source: ComponentError,
    },
}

impl fmt::Display for CompositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup(e) => write!(f, "setup: {e}"),
            Self::Metadata(e) => write!(f, "metadata: {e}"),
            Self::ConnectStalled { stalled } => {
                write!(f, "connect phase stalled: ")?;
                for (i, s) in stalled.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}' (unresolved: {})", s.component, s.unresolved.join(", "))?;
                }
                Ok(())
            }
            Self::Data(e) => write!(f, "data: {e}"),
            Self::NoData { slot, time } => {
                write!(f, "no data at '{slot}' for time {time}")
            }
            Self::Component {
                component,
                phase,
                source,
            } => {
                write!(f, "component '{component}' failed during {phase}: {source}")
            }
        }
    }
}

impl Error for CompositionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Setup(e) => Some(e),
            Self::Metadata(e) => Some(e),
            Self::Data(e) => Some(e),
            Self::Component { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<SetupError> for CompositionError {
    fn from(e: SetupError) -> Self {
        Self::Setup(e)
    }
}

impl From<MetadataError> for CompositionError {
    fn from(e: MetadataError) -> Self {
        Self::Metadata(e)
    }
}

impl From<DataError> for CompositionError {
    fn from(e: DataError) -> Self {
        Self::Data(e)
    }
}

impl CompositionError {
    /// Fold a pull error that escaped the connect phase's absorption into
    /// a composition error.
    pub fn from_pull(e: PullError) -> Self {
        match e {
            PullError::NoData { slot, time } => Self::NoData { slot, time },
            PullError::InfoPending { slot } => {
                Self::Metadata(MetadataError::Unresolved { slot })
            }
            PullError::Data(e) => Self::Data(e),
            PullError::Metadata(e) => Self::Metadata(e),
            PullError::Setup(e) => Self::Setup(e),
            PullError::Component { component, reason } => Self::Component {
                component,
                phase: "update",
                source: ComponentError::ExecutionFailed { reason },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> Time {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn dead_link_names_both_ends() {
        let err = SetupError::DeadLink {
            from: "noise.out".into(),
            to: "sink.in".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("noise.out"));
        assert!(msg.contains("sink.in"));
    }

    #[test]
    fn cycle_path_renders_in_order() {
        let err = SetupError::CycleWithoutDelay {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle without a delay adapter: a -> b -> a"
        );
    }

    #[test]
    fn no_data_is_recoverable_during_connect() {
        let err = PullError::NoData {
            slot: "x".into(),
            time: noon(),
        };
        assert!(err.recoverable_during_connect());
        assert!(!PullError::Data(DataError::AliasedBuffer { slot: "x".into() })
            .recoverable_during_connect());
    }

    #[test]
    fn component_error_chain_has_source() {
        let err = CompositionError::Component {
            component: "model".into(),
            phase: "update",
            source: ComponentError::failed("boom"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("update"));
    }

    #[test]
    fn stalled_report_lists_slots() {
        let err = CompositionError::ConnectStalled {
            stalled: vec![StalledComponent {
                component: "sink".into(),
                unresolved: vec!["in".into()],
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("sink"));
        assert!(msg.contains("in"));
    }
}
