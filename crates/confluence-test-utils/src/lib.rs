//! Reusable fixture components for composition tests.
//!
//! Standard components for scheduler and dataflow testing:
//!
//! - [`FnSource`] — time-stepping source emitting `f(t)` each step.
//! - [`RecordingSink`] — time-stepping sink recording every pull.
//! - [`PushSink`] — stateless push-based sink reacting to notifications.
//! - [`NoiseSource`] — stateless pull-based source generating on demand.
//! - [`StaticSource`] — pushes a single constant during connect.
//! - [`PingPong`] — coupled stepper with one input and one output, for
//!   cycle scenarios.
//! - [`FailingComponent`] — fails deterministically in a chosen phase.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod fixtures;

pub use fixtures::{
    date, FailingComponent, FnSource, NoiseSource, PingPong, PushSink, RecordingSink,
    StaticSource,
};
