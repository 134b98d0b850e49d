//! Reference adapters for the Confluence coupling framework.
//!
//! Stateless transforms ([`Scale`], [`CallbackAdapter`],
//! [`GridCellCallback`], [`ValueToGrid`], [`GridToValue`], the
//! regridders), time-caching temporal adapters ([`StepTime`],
//! [`LinearTime`], [`IntegrateTime`]), and the delay adapters that break
//! dependency cycles ([`DelayFixed`], [`DelayToPull`], [`DelayToPush`]).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod base;
mod delay;
mod regrid;
mod time;

pub use base::{CallbackAdapter, GridCellCallback, GridToValue, Scale, ValueToGrid};
pub use delay::{DelayFixed, DelayToPull, DelayToPush};
pub use regrid::{RegridLinear, RegridNearest};
pub use time::{IntegrateTime, LinearTime, StepTime};
