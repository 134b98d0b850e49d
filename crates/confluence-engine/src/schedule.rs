//! Scheduler step selection.
//!
//! The invariant the scheduler maintains: whenever a component updates,
//! every upstream output already holds entries bracketing any pull time
//! the update can request. It achieves this by never advancing a
//! component while a transitive upstream time-stepping component lags
//! behind the candidate's declared next time.

use confluence_core::Time;

use crate::checks::transitive_upstream;
use crate::table::ComponentTable;

/// The time-stepping component with the smallest current time below
/// `end`, ties broken by registration order. `None` when every
/// time-stepping component has reached the end time.
pub(crate) fn pick_candidate(table: &ComponentTable, end: Time) -> Option<usize> {
    let mut best: Option<(Time, usize)> = None;
    for idx in 0..table.len() {
        let Some(timing) = table.timing(idx) else {
            continue;
        };
        if timing.time >= end {
            continue;
        }
        match best {
            Some((t, _)) if timing.time >= t => {}
            _ => best = Some((timing.time, idx)),
        }
    }
    best.map(|(_, idx)| idx)
}

/// The transitive upstream component lagging behind `t_star`, if any:
/// the one with the smallest time, ties broken by registration order.
pub(crate) fn upstream_behind(
    table: &ComponentTable,
    deps: &[Vec<usize>],
    start: usize,
    t_star: Time,
) -> Option<usize> {
    let mut best: Option<(Time, usize)> = None;
    for up in transitive_upstream(deps, start) {
        let Some(timing) = table.timing(up) else {
            continue;
        };
        if timing.time >= t_star {
            continue;
        }
        match best {
            Some((t, i)) if (timing.time, up) >= (t, i) => {}
            _ => best = Some((timing.time, up)),
        }
    }
    best.map(|(_, idx)| idx)
}
