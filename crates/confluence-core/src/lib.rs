//! Core types for the Confluence model-coupling framework.
//!
//! This is the leaf crate with zero internal Confluence dependencies. It
//! defines the value types that cross every link in a composition: calendar
//! [`Time`], [`Units`], [`GridSpec`] with automatic axis transforms,
//! [`Mask`] policies, the negotiated port metadata [`Info`], the immutable
//! data [`Envelope`], and the error taxonomy shared by all layers.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod envelope;
pub mod error;
pub mod grid;
pub mod info;
pub mod mask;
pub mod time;
pub mod units;

// Re-export core types at crate root for convenience.
pub use envelope::Envelope;
pub use error::{
    ComponentError, CompositionError, DataError, MetadataError, PullError, SetupError,
    StalledComponent,
};
pub use grid::{
    AxisOrder, AxisTransform, DataLocation, GridSpec, RectilinearGrid, UniformGrid,
    UnstructuredGrid, UnstructuredPoints,
};
pub use info::Info;
pub use mask::Mask;
pub use time::{span_seconds, Time, TimeSpan};
pub use units::Units;
