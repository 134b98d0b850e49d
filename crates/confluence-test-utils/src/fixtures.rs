//! Fixture component implementations.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use confluence_core::{ComponentError, Envelope, GridSpec, Info, Time, TimeSpan, Units};
use confluence_sdk::{
    Component, ConnectStatus, Connector, InitContext, SlotContext, Timing,
};

/// Midnight on the given calendar date. Panics on invalid dates; test
/// input only.
pub fn date(year: i32, month: u32, day: u32) -> Time {
    NaiveDate::from_ymd_opt(year, month, day)
        .expect("valid test date")
        .and_hms_opt(0, 0, 0)
        .expect("valid test time")
}

fn scalar_info(units: &str) -> Info {
    Info::new()
        .with_grid(GridSpec::scalar())
        .with_units(Units::parse(units).expect("valid test units"))
}

// ── FnSource ───────────────────────────────────────────────────────

/// Time-stepping source: pushes `f(time)` at its initial time during
/// connect and at each new time after an update.
pub struct FnSource {
    name: String,
    time: Time,
    step: TimeSpan,
    units: String,
    f: Box<dyn Fn(Time) -> f64 + 'static>,
    connector: Connector,
}

impl FnSource {
    /// A source emitting `f(time)` with the given step.
    pub fn new(
        name: impl Into<String>,
        start: Time,
        step: TimeSpan,
        units: &str,
        f: impl Fn(Time) -> f64 + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            time: start,
            step,
            units: units.to_string(),
            f: Box::new(f),
            connector: Connector::new(),
        }
    }

    /// A source emitting a constant value.
    pub fn constant(
        name: impl Into<String>,
        start: Time,
        step: TimeSpan,
        units: &str,
        value: f64,
    ) -> Self {
        Self::new(name, start, step, units, move |_| value)
    }
}

impl Component for FnSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        let info = scalar_info(&self.units).with_time(self.time);
        ctx.add_output("out", info.clone())?;
        self.connector.add_output("out", info, true);
        Ok(())
    }

    fn connect(&mut self, ctx: &mut SlotContext<'_>) -> Result<ConnectStatus, ComponentError> {
        self.connector.provide_data("out", vec![(self.f)(self.time)]);
        self.connector.try_connect(ctx, ctx.time())
    }

    fn update(&mut self, ctx: &mut SlotContext<'_>) -> Result<(), ComponentError> {
        self.time += self.step;
        let value = (self.f)(self.time);
        ctx.push("out", vec![value], self.time)?;
        Ok(())
    }

    fn timing(&self) -> Option<Timing> {
        Some(Timing {
            time: self.time,
            next_time: self.time + self.step,
        })
    }
}

// ── RecordingSink ──────────────────────────────────────────────────

/// Time-stepping sink: pulls at its current time on every update and
/// records the scalar it receives.
pub struct RecordingSink {
    name: String,
    time: Time,
    step: TimeSpan,
    desired: Info,
    connector: Connector,
    records: Rc<RefCell<Vec<(Time, f64)>>>,
}

impl RecordingSink {
    /// A sink pulling with the given step, absorbing the source's
    /// metadata.
    pub fn new(name: impl Into<String>, start: Time, step: TimeSpan) -> Self {
        Self {
            name: name.into(),
            time: start,
            step,
            desired: Info::new(),
            connector: Connector::new(),
            records: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// A shared handle to the recorded `(pull time, value)` pairs.
    /// Stays valid after the sink moves into a composition.
    pub fn records(&self) -> Rc<RefCell<Vec<(Time, f64)>>> {
        Rc::clone(&self.records)
    }

    /// Declare target units; pulls convert automatically.
    pub fn with_units(mut self, units: &str) -> Self {
        self.desired = self
            .desired
            .with_units(Units::parse(units).expect("valid test units"));
        self
    }
}

impl Component for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        ctx.add_input("in", self.desired.clone())?;
        self.connector.add_input("in", self.desired.clone(), false);
        Ok(())
    }

    fn connect(&mut self, ctx: &mut SlotContext<'_>) -> Result<ConnectStatus, ComponentError> {
        self.connector.try_connect(ctx, ctx.time())
    }

    fn update(&mut self, ctx: &mut SlotContext<'_>) -> Result<(), ComponentError> {
        let env = ctx.pull("in", self.time)?;
        self.records.borrow_mut().push((self.time, env.scalar()?));
        self.time += self.step;
        Ok(())
    }

    fn timing(&self) -> Option<Timing> {
        Some(Timing {
            time: self.time,
            next_time: self.time + self.step,
        })
    }
}

// ── PushSink ───────────────────────────────────────────────────────

/// Stateless push-based sink: a callback input that pulls and records
/// whenever the source notifies it.
pub struct PushSink {
    name: String,
    connector: Connector,
    records: Rc<RefCell<Vec<(Time, f64)>>>,
}

impl PushSink {
    /// A push-based sink absorbing the source's metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connector: Connector::new(),
            records: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// A shared handle to the recorded `(notification time, value)`
    /// pairs.
    pub fn records(&self) -> Rc<RefCell<Vec<(Time, f64)>>> {
        Rc::clone(&self.records)
    }
}

impl Component for PushSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        ctx.add_callback_input("in", Info::new())?;
        self.connector.add_input("in", Info::new(), false);
        Ok(())
    }

    fn connect(&mut self, ctx: &mut SlotContext<'_>) -> Result<ConnectStatus, ComponentError> {
        self.connector.try_connect(ctx, ctx.time())
    }

    fn source_updated(
        &mut self,
        ctx: &mut SlotContext<'_>,
        input: &str,
        time: Time,
    ) -> Result<(), ComponentError> {
        let env = ctx.pull(input, time)?;
        self.records.borrow_mut().push((time, env.scalar()?));
        Ok(())
    }
}

// ── NoiseSource ────────────────────────────────────────────────────

/// Stateless pull-based source: generates a seeded pseudo-random scalar
/// for every pull. Never pushes.
pub struct NoiseSource {
    name: String,
    units: String,
    rng: StdRng,
    connector: Connector,
}

impl NoiseSource {
    /// A deterministic noise source with the given seed.
    pub fn new(name: impl Into<String>, units: &str, seed: u64) -> Self {
        Self {
            name: name.into(),
            units: units.to_string(),
            rng: StdRng::seed_from_u64(seed),
            connector: Connector::new(),
        }
    }
}

impl Component for NoiseSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        let info = scalar_info(&self.units);
        ctx.add_callback_output("out", info.clone())?;
        self.connector.add_output("out", info, false);
        Ok(())
    }

    fn connect(&mut self, ctx: &mut SlotContext<'_>) -> Result<ConnectStatus, ComponentError> {
        self.connector.try_connect(ctx, ctx.time())
    }

    fn generate(
        &mut self,
        ctx: &mut SlotContext<'_>,
        output: &str,
        time: Time,
    ) -> Result<Envelope, ComponentError> {
        let value: f64 = self.rng.gen_range(0.0..1.0);
        Ok(ctx.prepare(output, vec![value], time)?)
    }
}

// ── StaticSource ───────────────────────────────────────────────────

/// Pushes a single constant through a static output during connect.
pub struct StaticSource {
    name: String,
    value: f64,
    units: String,
    connector: Connector,
}

impl StaticSource {
    /// A static source delivering `value` for any pull time.
    pub fn new(name: impl Into<String>, units: &str, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            units: units.to_string(),
            connector: Connector::new(),
        }
    }
}

impl Component for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        let info = scalar_info(&self.units);
        ctx.add_static_output("out", info.clone())?;
        self.connector.add_output("out", info, true);
        Ok(())
    }

    fn connect(&mut self, ctx: &mut SlotContext<'_>) -> Result<ConnectStatus, ComponentError> {
        self.connector.provide_data("out", vec![self.value]);
        self.connector.try_connect(ctx, ctx.time())
    }
}

// ── PingPong ───────────────────────────────────────────────────────

/// Coupled stepper for cycle scenarios: one input, one output. Each
/// update advances one step, pulls the partner's value at the new time,
/// and pushes `emit(time)`.
pub struct PingPong {
    name: String,
    time: Time,
    step: TimeSpan,
    emit: Box<dyn Fn(Time) -> f64 + 'static>,
    connector: Connector,
    received: Rc<RefCell<Vec<(Time, f64)>>>,
}

impl PingPong {
    /// A coupled stepper emitting `emit(time)` each step.
    pub fn new(
        name: impl Into<String>,
        start: Time,
        step: TimeSpan,
        emit: impl Fn(Time) -> f64 + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            time: start,
            step,
            emit: Box::new(emit),
            connector: Connector::new(),
            received: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// A shared handle to the recorded `(pull time, partner value)`
    /// pairs.
    pub fn received(&self) -> Rc<RefCell<Vec<(Time, f64)>>> {
        Rc::clone(&self.received)
    }
}

impl Component for PingPong {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        let info = scalar_info("1").with_time(self.time);
        ctx.add_output("out", info.clone())?;
        ctx.add_input("in", Info::new())?;
        self.connector.add_output("out", info, true);
        self.connector.add_input("in", Info::new(), false);
        Ok(())
    }

    fn connect(&mut self, ctx: &mut SlotContext<'_>) -> Result<ConnectStatus, ComponentError> {
        self.connector.provide_data("out", vec![(self.emit)(self.time)]);
        self.connector.try_connect(ctx, ctx.time())
    }

    fn update(&mut self, ctx: &mut SlotContext<'_>) -> Result<(), ComponentError> {
        self.time += self.step;
        let env = ctx.pull("in", self.time)?;
        self.received.borrow_mut().push((self.time, env.scalar()?));
        ctx.push("out", vec![(self.emit)(self.time)], self.time)?;
        Ok(())
    }

    fn timing(&self) -> Option<Timing> {
        Some(Timing {
            time: self.time,
            next_time: self.time + self.step,
        })
    }
}

// ── FailingComponent ───────────────────────────────────────────────

/// Fails deterministically in the named lifecycle phase.
pub struct FailingComponent {
    name: String,
    fail_in: &'static str,
    time: Time,
    step: TimeSpan,
    connector: Connector,
}

impl FailingComponent {
    /// A component that fails in `fail_in` ("initialize", "connect",
    /// "validate", "update", or "finalize").
    pub fn new(name: impl Into<String>, start: Time, step: TimeSpan, fail_in: &'static str) -> Self {
        Self {
            name: name.into(),
            fail_in,
            time: start,
            step,
            connector: Connector::new(),
        }
    }

    fn maybe_fail(&self, phase: &str) -> Result<(), ComponentError> {
        if self.fail_in == phase {
            Err(ComponentError::failed(format!("deliberate failure in {phase}")))
        } else {
            Ok(())
        }
    }
}

impl Component for FailingComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        self.maybe_fail("initialize")?;
        let info = scalar_info("1").with_time(self.time);
        ctx.add_output("out", info.clone())?;
        self.connector.add_output("out", info, true);
        Ok(())
    }

    fn connect(&mut self, ctx: &mut SlotContext<'_>) -> Result<ConnectStatus, ComponentError> {
        self.maybe_fail("connect")?;
        self.connector.provide_data("out", vec![0.0]);
        self.connector.try_connect(ctx, ctx.time())
    }

    fn validate(&mut self, _ctx: &mut SlotContext<'_>) -> Result<(), ComponentError> {
        self.maybe_fail("validate")
    }

    fn update(&mut self, ctx: &mut SlotContext<'_>) -> Result<(), ComponentError> {
        self.maybe_fail("update")?;
        self.time += self.step;
        ctx.push("out", vec![0.0], self.time)?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), ComponentError> {
        self.maybe_fail("finalize")
    }

    fn timing(&self) -> Option<Timing> {
        Some(Timing {
            time: self.time,
            next_time: self.time + self.step,
        })
    }
}
