//! The [`Adapter`] trait and its call context.
//!
//! An adapter is simultaneously an input (toward its upstream source) and
//! an output (toward its downstream targets). Two shapes exist:
//!
//! - **Stateless**: overrides only [`pull`](Adapter::pull), transforming
//!   data as the request passes through. `NoData` from upstream
//!   propagates.
//! - **Time-caching**: reacts to [`source_updated`](Adapter::source_updated)
//!   by pulling and buffering, and answers `pull` from its own buffer.
//!   Retention never needs more than the two samples bracketing the last
//!   pull (plus an accumulator for integrating adapters).
//!
//! Adapters may also intercept metadata on its way through the chain via
//! [`transform_request`](Adapter::transform_request) and
//! [`transform_info`](Adapter::transform_info).

use confluence_core::{Envelope, Info, MetadataError, PullError, SetupError, Time};

use crate::component::CallbackHost;
use crate::graph::{LinkGraph, SourceId, TargetId};

/// How an adapter participates in the push/pull protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterKind {
    /// Transforms data as pulls pass through; holds no history.
    Stateless,
    /// Buffers pushed data and answers pulls from its own buffer.
    TimeCaching,
}

/// A data transformation along a link.
///
/// # Contract
///
/// - `pull` must return data valid at the requested time or raise
///   [`PullError::NoData`].
/// - Time-caching adapters must keep their buffer to the two samples
///   bracketing the last pull; the scheduler guarantees no earlier
///   sample is ever requested again.
/// - `kind`, `is_delay`, and `no_branch` are inspected once at wiring
///   time and must be constant.
pub trait Adapter: 'static {
    /// Short name used in link paths and error reporting.
    fn name(&self) -> &str;

    /// Whether this adapter buffers data or passes pulls through.
    fn kind(&self) -> AdapterKind {
        AdapterKind::Stateless
    }

    /// Whether this adapter serves data from a strictly earlier instant,
    /// cutting its link out of the scheduler's dependency graph.
    fn is_delay(&self) -> bool {
        false
    }

    /// Whether this adapter requires a single downstream target.
    fn no_branch(&self) -> bool {
        false
    }

    /// Transform a downstream metadata request on its way upstream.
    fn transform_request(&self, desired: &Info) -> Info {
        desired.clone()
    }

    /// Transform the upstream's metadata on its way downstream.
    ///
    /// Unit-rewriting and regridding adapters override this to describe
    /// what they will actually deliver.
    fn transform_info(&self, upstream: &Info) -> Result<Info, MetadataError> {
        Ok(upstream.clone())
    }

    /// React to new data being available upstream.
    ///
    /// Default: no reaction. Time-caching adapters pull and buffer here.
    /// The framework propagates the notification to downstream targets
    /// after this returns.
    fn source_updated(
        &mut self,
        ctx: &mut AdapterContext<'_>,
        time: Time,
    ) -> Result<(), PullError> {
        let _ = (ctx, time);
        Ok(())
    }

    /// Serve a pull at the given time.
    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError>;
}

/// Access to an adapter's upstream link during a call.
///
/// The adapter itself is checked out of the slot table for the duration
/// of the call; the context carries everything it may need from its slot.
pub struct AdapterContext<'a> {
    graph: &'a mut LinkGraph,
    host: &'a mut dyn CallbackHost,
    source: Option<SourceId>,
    requester: TargetId,
    name: String,
    info: Option<Info>,
}

impl<'a> AdapterContext<'a> {
    pub(crate) fn new(
        graph: &'a mut LinkGraph,
        host: &'a mut dyn CallbackHost,
        source: Option<SourceId>,
        requester: TargetId,
        name: String,
        info: Option<Info>,
    ) -> Self {
        Self {
            graph,
            host,
            source,
            requester,
            name,
            info,
        }
    }

    /// Pull from the upstream source.
    pub fn pull(&mut self, time: Time) -> Result<Envelope, PullError> {
        let source = self.source.ok_or_else(|| {
            PullError::Setup(SetupError::UnconnectedInput {
                input: self.name.clone(),
            })
        })?;
        self.graph.get_data(self.host, source, time, self.requester)
    }

    /// The adapter's display name within the composition.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The adapter's negotiated downstream-facing metadata, if the
    /// connect phase has resolved it.
    pub fn info(&self) -> Option<&Info> {
        self.info.as_ref()
    }

    /// A `NoData` error naming this adapter.
    pub fn no_data(&self, time: Time) -> PullError {
        PullError::NoData {
            slot: self.name.clone(),
            time,
        }
    }
}
