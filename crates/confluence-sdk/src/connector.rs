//! The per-component connect-phase progress tracker.
//!
//! During the connect fixpoint a component must push its output
//! metadata, exchange metadata for its inputs, optionally push initial
//! data, and optionally pull initial data — in that order, across as
//! many passes as it takes for the peers to resolve. The [`Connector`]
//! tracks which of those items have settled and performs one pass per
//! [`try_connect`](Connector::try_connect) call.
//!
//! The tracker is monotone: once an item succeeds it never regresses,
//! and the returned [`ConnectStatus`] distinguishes a pass that made new
//! progress (`Connecting`) from one that did not (`ConnectingIdle`) so
//! the composition can detect a stalled fixpoint.

use indexmap::IndexMap;

use confluence_core::{ComponentError, Envelope, Info, Time};

use crate::component::SlotContext;

/// Result of one connect pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectStatus {
    /// At least one new item settled this pass.
    Connecting,
    /// Nothing new settled this pass.
    ConnectingIdle,
    /// Every required item has settled.
    Connected,
}

struct OutputProgress {
    info: Info,
    info_pushed: bool,
    push_data: bool,
    data: Option<Vec<f64>>,
    data_pushed: bool,
}

struct InputProgress {
    desired: Info,
    exchanged: Option<Info>,
    pull: bool,
    pulled: Option<Envelope>,
}

/// Tracks a component's connect-phase progress per slot.
#[derive(Default)]
pub struct Connector {
    outputs: IndexMap<String, OutputProgress>,
    inputs: IndexMap<String, InputProgress>,
}

impl Connector {
    /// An empty connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an output: push `info` during connect, and — when
    /// `push_initial` — push one envelope of initial data once values
    /// have been provided.
    pub fn add_output(&mut self, name: impl Into<String>, info: Info, push_initial: bool) {
        self.outputs.insert(
            name.into(),
            OutputProgress {
                info,
                info_pushed: false,
                push_data: push_initial,
                data: None,
                data_pushed: false,
            },
        );
    }

    /// Track an input: exchange `desired` metadata during connect, and —
    /// when `pull_initial` — pull one envelope of initial data.
    pub fn add_input(&mut self, name: impl Into<String>, desired: Info, pull_initial: bool) {
        self.inputs.insert(
            name.into(),
            InputProgress {
                desired,
                exchanged: None,
                pull: pull_initial,
                pulled: None,
            },
        );
    }

    /// Provide the initial values for a tracked output. May be called on
    /// every pass; the values are consumed by the first successful push.
    pub fn provide_data(&mut self, name: &str, values: Vec<f64>) {
        if let Some(progress) = self.outputs.get_mut(name) {
            if !progress.data_pushed {
                progress.data = Some(values);
            }
        }
    }

    /// The resolved metadata for a tracked input, once exchanged.
    pub fn exchanged(&self, name: &str) -> Option<&Info> {
        self.inputs.get(name).and_then(|p| p.exchanged.as_ref())
    }

    /// The initial envelope pulled for a tracked input, if any.
    pub fn pulled(&self, name: &str) -> Option<&Envelope> {
        self.inputs.get(name).and_then(|p| p.pulled.as_ref())
    }

    /// Take ownership of a pulled initial envelope.
    pub fn take_pulled(&mut self, name: &str) -> Option<Envelope> {
        self.inputs.get_mut(name).and_then(|p| p.pulled.take())
    }

    /// Names of items that have not settled yet.
    pub fn unresolved(&self) -> Vec<String> {
        let mut names = Vec::new();
        for (name, p) in &self.outputs {
            if !p.info_pushed || (p.push_data && !p.data_pushed) {
                names.push(name.clone());
            }
        }
        for (name, p) in &self.inputs {
            if p.exchanged.is_none() || (p.pull && p.pulled.is_none()) {
                names.push(name.clone());
            }
        }
        names
    }

    fn all_settled(&self) -> bool {
        self.outputs
            .values()
            .all(|p| p.info_pushed && (!p.push_data || p.data_pushed))
            && self
                .inputs
                .values()
                .all(|p| p.exchanged.is_some() && (!p.pull || p.pulled.is_some()))
    }

    /// Perform one connect pass.
    ///
    /// Order: output infos, input exchanges, initial data pushes,
    /// initial data pulls. `NoData` and pending-metadata failures are
    /// absorbed (the item stays unsettled for the next pass); everything
    /// else aborts the connect phase.
    pub fn try_connect(
        &mut self,
        ctx: &mut SlotContext<'_>,
        time: Time,
    ) -> Result<ConnectStatus, ComponentError> {
        let mut progress = false;

        // 1. Output metadata.
        for (name, p) in self.outputs.iter_mut() {
            if p.info_pushed {
                continue;
            }
            let mut info = p.info.clone();
            if info.time.is_none() {
                info.time = Some(time);
            }
            match ctx.push_info(name, info) {
                Ok(()) => {
                    p.info_pushed = true;
                    progress = true;
                }
                Err(e) if e.recoverable_during_connect() => {}
                Err(e) => return Err(e.into()),
            }
        }

        // 2. Input metadata exchange.
        for (name, p) in self.inputs.iter_mut() {
            if p.exchanged.is_some() {
                continue;
            }
            match ctx.exchange_info(name, &p.desired) {
                Ok(info) => {
                    p.exchanged = Some(info);
                    progress = true;
                }
                Err(e) if e.recoverable_during_connect() => {}
                Err(e) => return Err(e.into()),
            }
        }

        // 3. Initial data pushes.
        for (name, p) in self.outputs.iter_mut() {
            if !p.push_data || p.data_pushed || !p.info_pushed {
                continue;
            }
            let Some(values) = p.data.clone() else {
                continue;
            };
            match ctx.push(name, values, time) {
                Ok(()) => {
                    p.data_pushed = true;
                    p.data = None;
                    progress = true;
                }
                Err(e) if e.recoverable_during_connect() => {}
                Err(e) => return Err(e.into()),
            }
        }

        // 4. Initial data pulls.
        for (name, p) in self.inputs.iter_mut() {
            if !p.pull || p.pulled.is_some() || p.exchanged.is_none() {
                continue;
            }
            match ctx.pull(name, time) {
                Ok(env) => {
                    p.pulled = Some(env);
                    progress = true;
                }
                Err(e) if e.recoverable_during_connect() => {}
                Err(e) => return Err(e.into()),
            }
        }

        if self.all_settled() {
            Ok(ConnectStatus::Connected)
        } else if progress {
            Ok(ConnectStatus::Connecting)
        } else {
            Ok(ConnectStatus::ConnectingIdle)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentKey, NoCallbacks, SlotContext, SlotTable};
    use crate::graph::{InputKind, LinkGraph, OutputKind, SourceId, TargetId};
    use chrono::NaiveDate;
    use confluence_core::{GridSpec, Units};

    fn day(d: u32) -> Time {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn complete_info() -> Info {
        Info::new()
            .with_grid(GridSpec::scalar())
            .with_units(Units::dimensionless())
    }

    /// Two components: "src" with output `out`, "snk" with input `in`,
    /// linked directly. Returns the graph and both slot tables.
    fn two_sided() -> (LinkGraph, SlotTable, SlotTable) {
        let mut graph = LinkGraph::new();
        let out = graph
            .add_output(
                None,
                "src.out".into(),
                "out".into(),
                OutputKind::Push,
                false,
                complete_info(),
            )
            .unwrap();
        let inp = graph
            .add_input(
                ComponentKey(1),
                "snk.in".into(),
                "in".into(),
                InputKind::Pull,
                Info::new(),
            )
            .unwrap();
        graph
            .chain(SourceId::Output(out), TargetId::Input(inp))
            .unwrap();
        graph.seal();

        let mut src_slots = SlotTable::default();
        src_slots.outputs.insert("out".into(), out);
        let mut snk_slots = SlotTable::default();
        snk_slots.inputs.insert("in".into(), inp);
        (graph, src_slots, snk_slots)
    }

    #[test]
    fn source_connects_in_one_pass() {
        let (mut graph, src_slots, _) = two_sided();
        let mut connector = Connector::new();
        connector.add_output("out", complete_info(), true);
        connector.provide_data("out", vec![1.0]);

        let mut host = NoCallbacks;
        let mut ctx = SlotContext::new(&mut graph, &mut host, src_slots, "src".into(), day(1));
        let status = connector.try_connect(&mut ctx, day(1)).unwrap();
        assert_eq!(status, ConnectStatus::Connected);
        assert!(connector.unresolved().is_empty());
    }

    #[test]
    fn sink_waits_for_source_info_then_progresses() {
        let (mut graph, src_slots, snk_slots) = two_sided();
        let mut host = NoCallbacks;

        // Sink first: the source has not published, so the pass is idle.
        let mut sink = Connector::new();
        sink.add_input("in", Info::new(), true);
        let mut ctx = SlotContext::new(
            &mut graph,
            &mut host,
            snk_slots.clone(),
            "snk".into(),
            day(1),
        );
        assert_eq!(
            sink.try_connect(&mut ctx, day(1)).unwrap(),
            ConnectStatus::ConnectingIdle
        );
        drop(ctx);

        // Source settles completely.
        let mut source = Connector::new();
        source.add_output("out", complete_info(), true);
        source.provide_data("out", vec![2.5]);
        let mut ctx = SlotContext::new(&mut graph, &mut host, src_slots, "src".into(), day(1));
        assert_eq!(
            source.try_connect(&mut ctx, day(1)).unwrap(),
            ConnectStatus::Connected
        );
        drop(ctx);

        // Sink now resolves everything in one pass.
        let mut ctx = SlotContext::new(&mut graph, &mut host, snk_slots, "snk".into(), day(1));
        assert_eq!(
            sink.try_connect(&mut ctx, day(1)).unwrap(),
            ConnectStatus::Connected
        );
        assert_eq!(sink.pulled("in").unwrap().scalar().unwrap(), 2.5);
        assert!(sink.exchanged("in").is_some());
    }

    #[test]
    fn settled_items_never_regress() {
        let (mut graph, src_slots, snk_slots) = two_sided();
        let mut host = NoCallbacks;

        let mut source = Connector::new();
        source.add_output("out", complete_info(), true);
        source.provide_data("out", vec![1.0]);
        let mut ctx = SlotContext::new(&mut graph, &mut host, src_slots, "src".into(), day(1));
        source.try_connect(&mut ctx, day(1)).unwrap();
        drop(ctx);

        let mut sink = Connector::new();
        sink.add_input("in", Info::new(), true);
        let before;
        {
            let mut ctx =
                SlotContext::new(&mut graph, &mut host, snk_slots.clone(), "snk".into(), day(1));
            sink.try_connect(&mut ctx, day(1)).unwrap();
            before = sink.unresolved().len();
        }
        // Extra passes change nothing: the set of settled items is
        // non-decreasing and already maximal.
        for _ in 0..3 {
            let mut ctx =
                SlotContext::new(&mut graph, &mut host, snk_slots.clone(), "snk".into(), day(1));
            assert_eq!(
                sink.try_connect(&mut ctx, day(1)).unwrap(),
                ConnectStatus::Connected
            );
        }
        assert_eq!(before, 0);
        assert_eq!(sink.unresolved().len(), 0);
    }

    #[test]
    fn take_pulled_consumes_initial_data() {
        let (mut graph, src_slots, snk_slots) = two_sided();
        let mut host = NoCallbacks;

        let mut source = Connector::new();
        source.add_output("out", complete_info(), true);
        source.provide_data("out", vec![4.0]);
        let mut ctx = SlotContext::new(&mut graph, &mut host, src_slots, "src".into(), day(1));
        source.try_connect(&mut ctx, day(1)).unwrap();
        drop(ctx);

        let mut sink = Connector::new();
        sink.add_input("in", Info::new(), true);
        let mut ctx = SlotContext::new(&mut graph, &mut host, snk_slots, "snk".into(), day(1));
        sink.try_connect(&mut ctx, day(1)).unwrap();
        drop(ctx);

        assert!(sink.take_pulled("in").is_some());
        assert!(sink.take_pulled("in").is_none());
    }
}
