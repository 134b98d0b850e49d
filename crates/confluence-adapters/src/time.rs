//! Temporal adapters: step selection, linear interpolation, and
//! time integration.
//!
//! All three are time-caching: they react to upstream pushes by pulling
//! and buffering, and answer downstream pulls from the buffer. The
//! scheduler guarantees no pull ever lands before the previous one, so
//! the buffer never needs more than the two samples bracketing the last
//! pull (plus, for integration, the accumulated window start).

use confluence_core::time::span_fraction;
use confluence_core::{
    span_seconds, Envelope, Info, MetadataError, PullError, Time, Units,
};
use confluence_sdk::{Adapter, AdapterContext, AdapterKind};

fn lerp(old: &Envelope, new: &Envelope, frac: f64) -> Vec<f64> {
    old.values()
        .iter()
        .zip(new.values())
        .map(|(o, n)| o + frac * (n - o))
        .collect()
}

// ── StepTime ───────────────────────────────────────────────────────

/// Step "interpolation": answers with one of the two samples bracketing
/// the request.
///
/// The step position `p ∈ [0, 1]` sets the switch-over point within the
/// bracket: `p = 1` holds the earlier sample until the newer one's
/// timestamp is reached, `p = 0` switches to the newer sample
/// immediately.
pub struct StepTime {
    position: f64,
    old: Option<(Time, Envelope)>,
    new: Option<(Time, Envelope)>,
}

impl StepTime {
    /// A step adapter switching at position `p ∈ [0, 1]`.
    pub fn at(position: f64) -> Self {
        Self {
            position: position.clamp(0.0, 1.0),
            old: None,
            new: None,
        }
    }

    /// Hold the earlier sample over the whole bracket (`p = 1`).
    pub fn previous() -> Self {
        Self::at(1.0)
    }

    /// Switch to the newer sample immediately (`p = 0`).
    pub fn next() -> Self {
        Self::at(0.0)
    }
}

impl Adapter for StepTime {
    fn name(&self) -> &str {
        "step_time"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::TimeCaching
    }

    fn source_updated(
        &mut self,
        ctx: &mut AdapterContext<'_>,
        time: Time,
    ) -> Result<(), PullError> {
        let env = ctx.pull(time)?;
        self.old = match self.new.take() {
            Some(previous) => Some(previous),
            None => Some((time, env.clone())),
        };
        self.new = Some((time, env));
        Ok(())
    }

    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
        let Some((t1, new)) = &self.new else {
            return Err(ctx.no_data(time));
        };
        let chosen = match &self.old {
            Some((t0, old)) => match span_fraction(time, *t0, *t1) {
                Some(frac) if frac < self.position => old,
                _ => new,
            },
            None => new,
        };
        Ok(chosen.at_time(time))
    }
}

// ── LinearTime ─────────────────────────────────────────────────────

/// Linear interpolation between the two samples bracketing the request.
pub struct LinearTime {
    old: Option<(Time, Envelope)>,
    new: Option<(Time, Envelope)>,
}

impl LinearTime {
    /// A linear time interpolation adapter.
    pub fn new() -> Self {
        Self {
            old: None,
            new: None,
        }
    }
}

impl Default for LinearTime {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for LinearTime {
    fn name(&self) -> &str {
        "linear_time"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::TimeCaching
    }

    fn source_updated(
        &mut self,
        ctx: &mut AdapterContext<'_>,
        time: Time,
    ) -> Result<(), PullError> {
        self.old = self.new.take();
        self.new = Some((time, ctx.pull(time)?));
        Ok(())
    }

    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
        let Some((t1, new)) = &self.new else {
            return Err(ctx.no_data(time));
        };
        let Some((t0, old)) = &self.old else {
            return Ok(new.at_time(time));
        };
        let Some(frac) = span_fraction(time, *t0, *t1) else {
            return Ok(new.at_time(time));
        };
        let values = lerp(old, new, frac);
        Ok(Envelope::from_parts(
            values.into(),
            new.grid().clone(),
            new.units().clone(),
            time,
        ))
    }
}

// ── IntegrateTime ──────────────────────────────────────────────────

/// Time integration over the requester's step: the trapezoidal area
/// under the piecewise-linear curve of upstream samples, covering
/// `[previous pull, current pull]`.
///
/// `mean()` normalizes by the window length (time-weighted mean; units
/// unchanged). `sum()` delivers the raw integral; the units gain a time
/// dimension, which the adapter rewrites during metadata negotiation
/// (e.g. `1/day` becomes dimensionless).
///
/// The accumulator's window start makes the buffered samples meaningful
/// only for a single downstream consumer, so branching is rejected.
pub struct IntegrateTime {
    normalize: bool,
    samples: Vec<(Time, Envelope)>,
    prev_pull: Option<Time>,
}

impl IntegrateTime {
    /// Integration delivering the sum over time (the integral).
    pub fn sum() -> Self {
        Self {
            normalize: false,
            samples: Vec::new(),
            prev_pull: None,
        }
    }

    /// Integration delivering the time-weighted mean.
    pub fn mean() -> Self {
        Self {
            normalize: true,
            samples: Vec::new(),
            prev_pull: None,
        }
    }
}

impl Adapter for IntegrateTime {
    fn name(&self) -> &str {
        if self.normalize {
            "integrate_mean"
        } else {
            "integrate_sum"
        }
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::TimeCaching
    }

    fn no_branch(&self) -> bool {
        true
    }

    fn transform_info(&self, upstream: &Info) -> Result<Info, MetadataError> {
        if self.normalize {
            return Ok(upstream.clone());
        }
        let mut info = upstream.clone();
        if let Some(units) = &info.units {
            info.units = Some(units.multiply(&Units::seconds()).canonical());
        }
        Ok(info)
    }

    fn source_updated(
        &mut self,
        ctx: &mut AdapterContext<'_>,
        time: Time,
    ) -> Result<(), PullError> {
        let env = ctx.pull(time)?;
        self.samples.push((time, env));
        Ok(())
    }

    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
        let Some((first_time, first)) = self.samples.first() else {
            return Err(ctx.no_data(time));
        };

        if self.samples.len() == 1 || time <= *first_time {
            // Degenerate window. The mean of an instant is the sample
            // itself; the integral over it is zero (in the rewritten
            // units, so downstream conversion stays consistent).
            if self.normalize {
                return Ok(first.at_time(time));
            }
            let zeros = vec![0.0; first.values().len()];
            let env = Envelope::from_parts(
                zeros.into(),
                first.grid().clone(),
                first.units().multiply(&Units::seconds()),
                time,
            );
            return env
                .convert_units(&env.units().canonical())
                .map_err(PullError::Data);
        }

        let prev = self.prev_pull.unwrap_or(*first_time);
        let len = self.samples[0].1.values().len();
        let mut acc = vec![0.0f64; len];

        for window in self.samples.windows(2) {
            let (t_old, v_old) = &window[0];
            let (t_new, v_new) = &window[1];
            if prev >= *t_new {
                continue;
            }
            if time <= *t_old {
                break;
            }
            let scale = span_seconds(*t_new - *t_old);
            if scale <= 0.0 {
                continue;
            }
            let f1 = (span_seconds(prev - *t_old) / scale).max(0.0);
            let f2 = (span_seconds(time - *t_old) / scale).min(1.0);
            let v1 = lerp(v_old, v_new, f1);
            let v2 = lerp(v_old, v_new, f2);
            let weight = (f2 - f1) * scale * 0.5;
            for ((a, x1), x2) in acc.iter_mut().zip(&v1).zip(&v2) {
                *a += weight * (x1 + x2);
            }
        }

        if self.normalize {
            let window = span_seconds(time - prev);
            if window > 0.0 {
                for a in &mut acc {
                    *a /= window;
                }
            }
        }

        let template = &self.samples[self.samples.len() - 1].1;
        let units = if self.normalize {
            template.units().clone()
        } else {
            template.units().multiply(&Units::seconds())
        };
        let mut env = Envelope::from_parts(
            acc.into(),
            template.grid().clone(),
            units,
            time,
        );
        if !self.normalize {
            // Deliver in the canonical-scale unit advertised downstream.
            env = env
                .convert_units(&env.units().canonical())
                .map_err(PullError::Data)?;
        }

        // Retention: future windows start at this pull, so everything
        // strictly before the sample bracketing it from the left can go.
        if let Some(idx) = self.samples.iter().rposition(|(t, _)| *t <= time) {
            self.samples.drain(..idx);
        }
        self.prev_pull = Some(time);

        Ok(env)
    }
}
