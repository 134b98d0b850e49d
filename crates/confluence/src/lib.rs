//! Confluence: a coupling framework for independently-authored
//! simulation models.
//!
//! Components — typically environmental models with their own time
//! stepping — expose named input and output ports; adapters transform
//! data along the links between them (unit conversion, regridding,
//! temporal interpolation and integration). A [`Composition`]
//! ([`engine::Composition`]) wires everything together, negotiates port
//! metadata in the iterative connect phase, and drives the components
//! forward in simulated time while guaranteeing that every pull returns
//! data valid at the requested instant.
//!
//! This is the top-level facade crate re-exporting the public API from
//! all Confluence sub-crates. For most users, adding `confluence` as a
//! single dependency is sufficient.
//!
//! # Quick start
//!
//! ```ignore
//! use confluence::prelude::*;
//! use confluence::adapters::LinearTime;
//!
//! let mut comp = Composition::with_defaults();
//! let a = comp.add_component(Box::new(source_model))?;
//! let b = comp.add_component(Box::new(sink_model))?;
//! comp.initialize()?;
//! comp.link(src(a, "out") >> LinearTime::new() >> dst(b, "in"))?;
//! comp.connect(start)?;
//! comp.run(start + TimeSpan::days(30))?;
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the
//! prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`core`] | `confluence-core` | Time, units, grids, masks, `Info`, `Envelope`, errors |
//! | [`sdk`] | `confluence-sdk` | Link graph, slots, `Adapter` and `Component` traits, `Connector` |
//! | [`adapters`] | `confluence-adapters` | Reference adapters (scaling, regridding, time, delays) |
//! | [`engine`] | `confluence-engine` | `Composition`, wiring, scheduler, metadata |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core value types and errors (`confluence-core`).
pub use confluence_core as core;

/// Dataflow machinery and extension traits (`confluence-sdk`).
pub use confluence_sdk as sdk;

/// Reference adapters (`confluence-adapters`).
pub use confluence_adapters as adapters;

/// Composition and scheduler (`confluence-engine`).
pub use confluence_engine as engine;

/// Common imports for typical Confluence usage.
pub mod prelude {
    // Data model
    pub use confluence_core::{
        Envelope, GridSpec, Info, Mask, Time, TimeSpan, UniformGrid, Units,
    };

    // Errors
    pub use confluence_core::{
        ComponentError, CompositionError, DataError, MetadataError, PullError, SetupError,
    };

    // Extension traits and contexts
    pub use confluence_sdk::{
        Adapter, AdapterContext, AdapterKind, Component, ComponentStatus, ConnectStatus,
        Connector, InitContext, SlotContext, Timing,
    };

    // Composition surface
    pub use confluence_engine::{
        dst, src, Composition, CompositionOptions, LogFile, Metadata, StopSignal,
    };
}
