//! Composition container and scheduler for the Confluence coupling
//! framework.
//!
//! A [`Composition`] collects components, wires links (possibly through
//! adapter chains), runs the iterative connect fixpoint, validates the
//! link structure (cycles, dead links, branching), and then drives the
//! time-stepping components with the dependency-aware scheduler until
//! the configured end time.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod checks;
mod composition;
mod link;
mod logging;
mod metadata;
mod schedule;
mod table;

pub use composition::{Composition, CompositionOptions, LogFile, StopSignal};
pub use link::{dst, src, Link, LinkBuilder, LinkEnd};
pub use metadata::{AdapterMetadata, ComponentMetadata, LinkMetadata, Metadata};
