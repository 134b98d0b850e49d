//! Post-connect structural checks: dangling links, branching, dead
//! links, static/time-caching conflicts, dependency edges, and cycle
//! detection.
//!
//! All checks run once, between the connect fixpoint and the first
//! scheduler step. The link walks mirror the data paths: every output's
//! downstream tree and every input's upstream chain.

use confluence_core::SetupError;
use confluence_sdk::{
    AdapterId, AdapterKind, InputId, InputKind, LinkGraph, OutputId, OutputKind, SourceId,
    TargetId,
};

use crate::table::ComponentTable;

/// Validate every link of the sealed graph.
///
/// - every input and every in-use adapter has a source;
/// - no-branch adapters (and their downstream chains) have at most one
///   target;
/// - no dead links: a time-caching adapter, or a push-only (callback)
///   input, must have a push-capable origin upstream;
/// - no static output feeds a time-caching adapter.
pub(crate) fn check_links(graph: &LinkGraph) -> Result<(), SetupError> {
    for idx in 0..graph.input_count() {
        let input = InputId(idx as u32);
        if graph.input_source(input).is_none() {
            return Err(SetupError::UnconnectedInput {
                input: graph.input_path(input).to_string(),
            });
        }
    }
    for idx in 0..graph.adapter_count() {
        let adapter = AdapterId(idx as u32);
        if !graph.adapter_targets(adapter).is_empty() && graph.adapter_source(adapter).is_none() {
            return Err(SetupError::UnconnectedInput {
                input: graph.adapter_path(adapter).to_string(),
            });
        }
    }

    for idx in 0..graph.output_count() {
        let output = OutputId(idx as u32);
        let pushes = matches!(graph.output_kind(output), OutputKind::Push);
        let walk = Walk {
            origin: output,
            pushes,
            static_origin: graph.output_is_static(output),
            no_branch: false,
        };
        for &target in graph.output_targets(output) {
            check_downstream(graph, target, walk)?;
        }
    }
    Ok(())
}

/// Flags carried along a downstream walk.
#[derive(Clone, Copy)]
struct Walk {
    origin: OutputId,
    /// Whether pushes can reach the current position.
    pushes: bool,
    /// Whether the push origin is a static (single-push) output.
    static_origin: bool,
    /// Whether a no-branch adapter is upstream.
    no_branch: bool,
}

fn check_downstream(graph: &LinkGraph, target: TargetId, mut walk: Walk) -> Result<(), SetupError> {
    match target {
        TargetId::Input(input) => {
            if matches!(graph.input_kind(input), InputKind::Callback(_)) && !walk.pushes {
                return Err(SetupError::DeadLink {
                    from: graph.output_path(walk.origin).to_string(),
                    to: graph.input_path(input).to_string(),
                });
            }
            Ok(())
        }
        TargetId::Adapter(adapter) => {
            if graph.adapter_kind(adapter) == AdapterKind::TimeCaching {
                if walk.static_origin {
                    return Err(SetupError::StaticIntoTimeCaching {
                        output: graph.output_path(walk.origin).to_string(),
                        adapter: graph.adapter_path(adapter).to_string(),
                    });
                }
                if !walk.pushes {
                    return Err(SetupError::DeadLink {
                        from: graph.output_path(walk.origin).to_string(),
                        to: graph.adapter_path(adapter).to_string(),
                    });
                }
                // The adapter re-originates pushes by notifying its own
                // targets after caching.
                walk.pushes = true;
            }
            walk.no_branch = walk.no_branch || graph.adapter_no_branch(adapter);
            let targets = graph.adapter_targets(adapter);
            if walk.no_branch && targets.len() > 1 {
                return Err(SetupError::Branching {
                    adapter: graph.adapter_path(adapter).to_string(),
                });
            }
            for &next in targets {
                check_downstream(graph, next, walk)?;
            }
            Ok(())
        }
    }
}

/// Direct dependency edges: `deps[c]` lists the components upstream of
/// `c`'s inputs, with chains through a delay adapter cut.
pub(crate) fn dependency_edges(graph: &LinkGraph, n_components: usize) -> Vec<Vec<usize>> {
    let mut deps: Vec<Vec<usize>> = vec![Vec::new(); n_components];
    for idx in 0..graph.input_count() {
        let input = InputId(idx as u32);
        let downstream = graph.input_owner(input).0 as usize;
        let mut cursor = graph.input_source(input);
        let upstream = loop {
            match cursor {
                Some(SourceId::Adapter(a)) => {
                    if graph.adapter_is_delay(a) {
                        break None;
                    }
                    cursor = graph.adapter_source(a);
                }
                Some(SourceId::Output(o)) => break graph.output_owner(o),
                None => break None,
            }
        };
        if let Some(owner) = upstream {
            let owner = owner.0 as usize;
            if owner != downstream && !deps[downstream].contains(&owner) {
                deps[downstream].push(owner);
            }
        }
    }
    deps
}

/// Reject dependency cycles that survive delay cutting.
///
/// Returns the offending path (component names, dependency order) in the
/// error. Implemented as a three-color depth-first search over the
/// upstream edges.
pub(crate) fn detect_cycles(
    deps: &[Vec<usize>],
    table: &ComponentTable,
) -> Result<(), SetupError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Gray,
        Black,
    }

    fn visit(
        node: usize,
        deps: &[Vec<usize>],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        table: &ComponentTable,
    ) -> Result<(), SetupError> {
        marks[node] = Mark::Gray;
        stack.push(node);
        for &up in &deps[node] {
            match marks[up] {
                Mark::Gray => {
                    let start = stack.iter().position(|&n| n == up).unwrap_or(0);
                    let mut path: Vec<String> = stack[start..]
                        .iter()
                        .map(|&n| table.name(n).to_string())
                        .collect();
                    path.push(table.name(up).to_string());
                    return Err(SetupError::CycleWithoutDelay { path });
                }
                Mark::White => visit(up, deps, marks, stack, table)?,
                Mark::Black => {}
            }
        }
        stack.pop();
        marks[node] = Mark::Black;
        Ok(())
    }

    let mut marks = vec![Mark::White; deps.len()];
    let mut stack = Vec::new();
    for node in 0..deps.len() {
        if marks[node] == Mark::White {
            visit(node, deps, &mut marks, &mut stack, table)?;
        }
    }
    Ok(())
}

/// Components transitively upstream of `start` (excluding `start`),
/// following the cut dependency edges through stateless components.
pub(crate) fn transitive_upstream(deps: &[Vec<usize>], start: usize) -> Vec<usize> {
    let mut seen = vec![false; deps.len()];
    let mut stack = vec![start];
    let mut result = Vec::new();
    seen[start] = true;
    while let Some(node) = stack.pop() {
        for &up in &deps[node] {
            if !seen[up] {
                seen[up] = true;
                result.push(up);
                stack.push(up);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use confluence_core::{Envelope, Info, PullError, Time};
    use confluence_sdk::{Adapter, AdapterContext, ComponentKey};

    struct PassThrough;
    impl Adapter for PassThrough {
        fn name(&self) -> &str {
            "pass"
        }
        fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
            ctx.pull(time)
        }
    }

    struct Caching;
    impl Adapter for Caching {
        fn name(&self) -> &str {
            "caching"
        }
        fn kind(&self) -> AdapterKind {
            AdapterKind::TimeCaching
        }
        fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
            Err(ctx.no_data(time))
        }
    }

    struct NoBranch;
    impl Adapter for NoBranch {
        fn name(&self) -> &str {
            "no_branch"
        }
        fn no_branch(&self) -> bool {
            true
        }
        fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
            ctx.pull(time)
        }
    }

    fn graph() -> LinkGraph {
        LinkGraph::new()
    }

    fn output(g: &mut LinkGraph, name: &str, kind: OutputKind, is_static: bool) -> OutputId {
        g.add_output(
            None,
            format!("{name}.out"),
            "out".into(),
            kind,
            is_static,
            Info::new(),
        )
        .unwrap()
    }

    fn input(g: &mut LinkGraph, name: &str, kind: InputKind) -> InputId {
        g.add_input(
            ComponentKey(0),
            format!("{name}.in"),
            "in".into(),
            kind,
            Info::new(),
        )
        .unwrap()
    }

    #[test]
    fn no_branch_adapter_with_two_targets_rejected() {
        let mut g = graph();
        let out = output(&mut g, "src", OutputKind::Push, false);
        let nb = g.add_adapter(Box::new(NoBranch)).unwrap();
        let a = input(&mut g, "a", InputKind::Pull);
        let b = input(&mut g, "b", InputKind::Pull);
        g.chain(SourceId::Output(out), TargetId::Adapter(nb)).unwrap();
        g.chain(SourceId::Adapter(nb), TargetId::Input(a)).unwrap();
        g.chain(SourceId::Adapter(nb), TargetId::Input(b)).unwrap();

        match check_links(&g) {
            Err(SetupError::Branching { adapter }) => {
                assert!(adapter.starts_with("no_branch"));
            }
            other => panic!("expected Branching, got {other:?}"),
        }
    }

    #[test]
    fn no_branch_flag_propagates_downstream() {
        // no-branch adapter -> pass-through adapter with two targets.
        let mut g = graph();
        let out = output(&mut g, "src", OutputKind::Push, false);
        let nb = g.add_adapter(Box::new(NoBranch)).unwrap();
        let pass = g.add_adapter(Box::new(PassThrough)).unwrap();
        let a = input(&mut g, "a", InputKind::Pull);
        let b = input(&mut g, "b", InputKind::Pull);
        g.chain(SourceId::Output(out), TargetId::Adapter(nb)).unwrap();
        g.chain(SourceId::Adapter(nb), TargetId::Adapter(pass)).unwrap();
        g.chain(SourceId::Adapter(pass), TargetId::Input(a)).unwrap();
        g.chain(SourceId::Adapter(pass), TargetId::Input(b)).unwrap();

        assert!(matches!(
            check_links(&g),
            Err(SetupError::Branching { .. })
        ));
    }

    #[test]
    fn branching_allowed_without_marker() {
        let mut g = graph();
        let out = output(&mut g, "src", OutputKind::Push, false);
        let pass = g.add_adapter(Box::new(PassThrough)).unwrap();
        let a = input(&mut g, "a", InputKind::Pull);
        let b = input(&mut g, "b", InputKind::Pull);
        g.chain(SourceId::Output(out), TargetId::Adapter(pass)).unwrap();
        g.chain(SourceId::Adapter(pass), TargetId::Input(a)).unwrap();
        g.chain(SourceId::Adapter(pass), TargetId::Input(b)).unwrap();
        assert!(check_links(&g).is_ok());
    }

    #[test]
    fn callback_output_through_caching_adapter_is_dead() {
        let mut g = graph();
        let out = output(&mut g, "noise", OutputKind::Callback(ComponentKey(0)), false);
        let cache = g.add_adapter(Box::new(Caching)).unwrap();
        let a = input(&mut g, "a", InputKind::Pull);
        g.chain(SourceId::Output(out), TargetId::Adapter(cache)).unwrap();
        g.chain(SourceId::Adapter(cache), TargetId::Input(a)).unwrap();

        match check_links(&g) {
            Err(SetupError::DeadLink { from, to }) => {
                assert_eq!(from, "noise.out");
                assert!(to.starts_with("caching"));
            }
            other => panic!("expected DeadLink, got {other:?}"),
        }
    }

    #[test]
    fn caching_adapter_reoriginates_pushes() {
        // push output -> caching adapter -> callback input: alive, the
        // adapter forwards notifications after caching.
        let mut g = graph();
        let out = output(&mut g, "src", OutputKind::Push, false);
        let cache = g.add_adapter(Box::new(Caching)).unwrap();
        let a = input(&mut g, "a", InputKind::Callback(ComponentKey(0)));
        g.chain(SourceId::Output(out), TargetId::Adapter(cache)).unwrap();
        g.chain(SourceId::Adapter(cache), TargetId::Input(a)).unwrap();
        assert!(check_links(&g).is_ok());
    }

    #[test]
    fn static_output_into_caching_adapter_rejected() {
        let mut g = graph();
        let out = output(&mut g, "static", OutputKind::Push, true);
        let cache = g.add_adapter(Box::new(Caching)).unwrap();
        let a = input(&mut g, "a", InputKind::Pull);
        g.chain(SourceId::Output(out), TargetId::Adapter(cache)).unwrap();
        g.chain(SourceId::Adapter(cache), TargetId::Input(a)).unwrap();

        assert!(matches!(
            check_links(&g),
            Err(SetupError::StaticIntoTimeCaching { .. })
        ));
    }

    #[test]
    fn dangling_adapter_with_targets_rejected() {
        let mut g = graph();
        let pass = g.add_adapter(Box::new(PassThrough)).unwrap();
        let a = input(&mut g, "a", InputKind::Pull);
        g.chain(SourceId::Adapter(pass), TargetId::Input(a)).unwrap();

        assert!(matches!(
            check_links(&g),
            Err(SetupError::UnconnectedInput { .. })
        ));
    }

    #[test]
    fn transitive_upstream_walks_through_middles() {
        // 0 <- 1 <- 2 (deps[0] = [1], deps[1] = [2]).
        let deps = vec![vec![1], vec![2], vec![]];
        let mut up = transitive_upstream(&deps, 0);
        up.sort_unstable();
        assert_eq!(up, vec![1, 2]);
        assert!(transitive_upstream(&deps, 2).is_empty());
    }
}
