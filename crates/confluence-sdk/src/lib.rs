//! Dataflow machinery for the Confluence coupling framework.
//!
//! This crate owns the link graph — the slot table holding every output,
//! input, and adapter in a composition — together with the [`Adapter`]
//! and [`Component`] traits, their call contexts, and the [`Connector`]
//! that drives a component through the iterative connect fixpoint.
//!
//! Slots refer to each other by typed handles into the [`LinkGraph`];
//! nothing in the graph holds an owning pointer to a peer. Recursive
//! calls (pull chains, notification cascades) check a node's box out of
//! the table for the duration of the call, which doubles as re-entrancy
//! detection for true cycles.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod adapter;
pub mod component;
pub mod connector;
pub mod graph;
mod spill;

pub use adapter::{Adapter, AdapterContext, AdapterKind};
pub use component::{
    CallbackHost, Component, ComponentKey, ComponentStatus, InitContext, NoCallbacks,
    SlotContext, SlotTable, Timing,
};
pub use connector::{ConnectStatus, Connector};
pub use graph::{AdapterId, GraphPhase, InputId, InputKind, LinkGraph, OutputId, OutputKind, SourceId, TargetId};
