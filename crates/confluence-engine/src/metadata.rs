//! Run metadata: a nested view of the composition for inspection,
//! reporting, and tests.

use confluence_core::Time;
use confluence_sdk::{AdapterKind, ComponentStatus};
use indexmap::IndexMap;

/// Snapshot of one component's state.
#[derive(Clone, Debug)]
pub struct ComponentMetadata {
    /// Lifecycle status.
    pub status: ComponentStatus,
    /// Current simulated time, for time-stepping components.
    pub time: Option<Time>,
    /// Declared next time, for time-stepping components.
    pub next_time: Option<Time>,
    /// Input slot names in declaration order.
    pub inputs: Vec<String>,
    /// Output slot names in declaration order.
    pub outputs: Vec<String>,
}

/// Snapshot of one adapter's negotiated state.
#[derive(Clone, Debug)]
pub struct AdapterMetadata {
    /// Protocol kind.
    pub kind: AdapterKind,
    /// Whether the adapter cuts dependency edges.
    pub is_delay: bool,
    /// Negotiated downstream units, rendered.
    pub units: Option<String>,
    /// Negotiated downstream grid, rendered.
    pub grid: Option<String>,
}

/// One wired link: output to input, through adapters.
#[derive(Clone, Debug)]
pub struct LinkMetadata {
    /// The upstream output's path.
    pub from: String,
    /// The downstream input's path.
    pub to: String,
    /// Adapter paths along the link, upstream to downstream.
    pub via: Vec<String>,
}

/// Nested metadata for a whole composition.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    /// The simulation time frame, once `connect` and `run` have fixed it.
    pub time_frame: Option<(Time, Time)>,
    /// Per-component state, keyed by component name.
    pub components: IndexMap<String, ComponentMetadata>,
    /// Per-adapter state, keyed by adapter path.
    pub adapters: IndexMap<String, AdapterMetadata>,
    /// Every wired link.
    pub links: Vec<LinkMetadata>,
}
