//! Delay adapters: answer pulls with data from an earlier instant.
//!
//! Delays decouple the time dimension along a link, which is what makes
//! a dependency cycle legal — the scheduler treats delay edges as cut.
//! All requests are clamped to the link's initial time (from the
//! negotiated metadata), so the very first pulls are served from the
//! initial data exchanged during connect.

use confluence_core::{Envelope, PullError, Time, TimeSpan};
use confluence_sdk::{Adapter, AdapterContext};

fn clamp_to_start(ctx: &AdapterContext<'_>, shifted: Time) -> Time {
    match ctx.info().and_then(|info| info.time) {
        Some(start) if shifted < start => start,
        _ => shifted,
    }
}

// ── DelayFixed ─────────────────────────────────────────────────────

/// Shifts every request back by a fixed span.
pub struct DelayFixed {
    delay: TimeSpan,
}

impl DelayFixed {
    /// A fixed delay of the given span.
    pub fn new(delay: TimeSpan) -> Self {
        Self { delay }
    }
}

impl Adapter for DelayFixed {
    fn name(&self) -> &str {
        "delay_fixed"
    }

    fn is_delay(&self) -> bool {
        true
    }

    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
        let shifted = clamp_to_start(ctx, time - self.delay);
        let env = ctx.pull(shifted)?;
        Ok(env.at_time(time))
    }
}

// ── DelayToPull ────────────────────────────────────────────────────

/// Serves each pull with data from a number of pulls earlier.
///
/// The request time becomes the instant of the pull `steps` back;
/// before enough pulls have happened, the link's initial time.
pub struct DelayToPull {
    steps: usize,
    pulls: Vec<Time>,
}

impl DelayToPull {
    /// A delay of the given number of pull steps (at least 1).
    pub fn new(steps: usize) -> Self {
        Self {
            steps: steps.max(1),
            pulls: Vec::new(),
        }
    }
}

impl Adapter for DelayToPull {
    fn name(&self) -> &str {
        "delay_to_pull"
    }

    fn is_delay(&self) -> bool {
        true
    }

    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
        let shifted = if self.pulls.len() >= self.steps {
            self.pulls[self.pulls.len() - self.steps]
        } else {
            clamp_to_start(ctx, time)
        };
        let shifted = clamp_to_start(ctx, shifted.min(time));
        self.pulls.push(time);
        if self.pulls.len() > self.steps {
            self.pulls.remove(0);
        }
        let env = ctx.pull(shifted)?;
        Ok(env.at_time(time))
    }
}

// ── DelayToPush ────────────────────────────────────────────────────

/// Serves each pull with the data of a push a number of pushes back.
///
/// Push times are recorded as notifications pass through; the request
/// time becomes the instant of the push `steps` back, or the link's
/// initial time before enough pushes have happened.
pub struct DelayToPush {
    steps: usize,
    pushes: Vec<Time>,
}

impl DelayToPush {
    /// A delay of the given number of push steps (at least 1).
    pub fn new(steps: usize) -> Self {
        Self {
            steps: steps.max(1),
            pushes: Vec::new(),
        }
    }
}

impl Adapter for DelayToPush {
    fn name(&self) -> &str {
        "delay_to_push"
    }

    fn is_delay(&self) -> bool {
        true
    }

    fn source_updated(
        &mut self,
        _ctx: &mut AdapterContext<'_>,
        time: Time,
    ) -> Result<(), PullError> {
        self.pushes.push(time);
        // Only the last `steps + 1` push times can ever be requested.
        if self.pushes.len() > self.steps + 1 {
            self.pushes.remove(0);
        }
        Ok(())
    }

    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
        let shifted = match self.pushes.len().checked_sub(self.steps + 1) {
            Some(idx) => self.pushes[idx],
            None => clamp_to_start(ctx, time),
        };
        let shifted = clamp_to_start(ctx, shifted.min(time));
        let env = ctx.pull(shifted)?;
        Ok(env.at_time(time))
    }
}
