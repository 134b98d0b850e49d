//! Integration tests driving adapters through a real link graph.

use chrono::NaiveDate;
use confluence_adapters::{
    DelayFixed, DelayToPush, GridToValue, IntegrateTime, LinearTime, RegridLinear,
    RegridNearest, Scale, StepTime, ValueToGrid,
};
use confluence_core::{
    Envelope, GridSpec, Info, PullError, Time, TimeSpan, UniformGrid, Units,
};
use confluence_sdk::{
    Adapter, ComponentKey, InputId, InputKind, LinkGraph, NoCallbacks, OutputId, OutputKind,
    SourceId, TargetId,
};

fn day(d: u32) -> Time {
    NaiveDate::from_ymd_opt(2024, 1, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn scalar_info(units: &str) -> Info {
    Info::new()
        .with_grid(GridSpec::scalar())
        .with_units(Units::parse(units).unwrap())
        .with_time(day(1))
}

/// Source output -> adapter -> sink input, sealed and exchanged.
struct Rig {
    graph: LinkGraph,
    out: OutputId,
    inp: InputId,
    info: Info,
}

impl Rig {
    fn new(source_info: Info, adapter: Box<dyn Adapter>, desired: Info) -> Self {
        let mut graph = LinkGraph::new();
        let out = graph
            .add_output(
                None,
                "src.out".into(),
                "out".into(),
                OutputKind::Push,
                false,
                source_info.clone(),
            )
            .unwrap();
        let ad = graph.add_adapter(adapter).unwrap();
        let inp = graph
            .add_input(
                ComponentKey(0),
                "sink.in".into(),
                "in".into(),
                InputKind::Pull,
                desired.clone(),
            )
            .unwrap();
        graph
            .chain(SourceId::Output(out), TargetId::Adapter(ad))
            .unwrap();
        graph
            .chain(SourceId::Adapter(ad), TargetId::Input(inp))
            .unwrap();
        graph.seal();
        graph.push_info(out, source_info.clone()).unwrap();
        graph.exchange_info(inp, &desired).unwrap();
        Self {
            graph,
            out,
            inp,
            info: source_info,
        }
    }

    fn push(&mut self, values: Vec<f64>, time: Time) {
        let env = Envelope::prepare(values, &self.info, time).unwrap();
        self.graph.push(&mut NoCallbacks, self.out, env).unwrap();
    }

    fn pull(&mut self, time: Time) -> Result<Envelope, PullError> {
        self.graph.pull(&mut NoCallbacks, self.inp, time)
    }

    fn pull_scalar(&mut self, time: Time) -> f64 {
        self.pull(time).unwrap().scalar().unwrap()
    }
}

// ── Base adapters ──────────────────────────────────────────────────

#[test]
fn scale_multiplies() {
    let mut rig = Rig::new(scalar_info("m"), Box::new(Scale::new(2.5)), Info::new());
    rig.push(vec![4.0], day(1));
    assert_eq!(rig.pull_scalar(day(1)), 10.0);
}

#[test]
fn value_to_grid_broadcasts() {
    let grid = GridSpec::Uniform(UniformGrid::new_2d(2, 3, 1.0));
    let mut rig = Rig::new(
        scalar_info("mm"),
        Box::new(ValueToGrid::new(grid.clone())),
        Info::new(),
    );
    rig.push(vec![1.5], day(1));
    let env = rig.pull(day(1)).unwrap();
    assert_eq!(env.grid(), &grid);
    assert_eq!(env.values(), &[1.5; 6]);
}

#[test]
fn value_to_grid_negotiates_grid_downstream() {
    let grid = GridSpec::Uniform(UniformGrid::new_2d(2, 2, 1.0));
    let rig = Rig::new(
        scalar_info("mm"),
        Box::new(ValueToGrid::new(grid.clone())),
        Info::new(),
    );
    let info = rig.graph.input_info(rig.inp).unwrap();
    assert_eq!(info.grid.as_ref(), Some(&grid));
}

#[test]
fn grid_to_value_aggregates() {
    let grid_info = Info::new()
        .with_grid(GridSpec::Uniform(UniformGrid::new_2d(2, 2, 1.0)))
        .with_units(Units::dimensionless())
        .with_time(day(1));
    let mut rig = Rig::new(grid_info, Box::new(GridToValue::mean()), Info::new());
    rig.push(vec![1.0, 2.0, 3.0, 4.0], day(1));
    assert_eq!(rig.pull_scalar(day(1)), 2.5);
}

// ── Regridding ─────────────────────────────────────────────────────

#[test]
fn regrid_nearest_identity_resolution() {
    let source = UniformGrid::new_2d(2, 2, 1.0);
    let info = Info::new()
        .with_grid(GridSpec::Uniform(source.clone()))
        .with_units(Units::dimensionless())
        .with_time(day(1));
    let mut rig = Rig::new(info, Box::new(RegridNearest::new(source)), Info::new());
    rig.push(vec![1.0, 2.0, 3.0, 4.0], day(1));
    let env = rig.pull(day(1)).unwrap();
    assert_eq!(env.values(), &[1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn regrid_nearest_downsamples() {
    // Source: 1-D, 4 cells of size 1 (centers 0.5, 1.5, 2.5, 3.5).
    // Target: 1-D, 2 cells of size 2 (centers 1.0, 3.0).
    let mut source = UniformGrid::new_2d(4, 1, 1.0);
    source.dims.truncate(1);
    source.spacing.truncate(1);
    source.origin.truncate(1);
    source.axes_increase.truncate(1);
    let mut target = source.clone();
    target.dims[0] = 2;
    target.spacing[0] = 2.0;

    let info = Info::new()
        .with_grid(GridSpec::Uniform(source))
        .with_units(Units::dimensionless())
        .with_time(day(1));
    let mut rig = Rig::new(info, Box::new(RegridNearest::new(target)), Info::new());
    rig.push(vec![10.0, 20.0, 30.0, 40.0], day(1));
    let env = rig.pull(day(1)).unwrap();
    // Center 1.0 sits between cells 0 and 1; position 0.5 rounds to 1.
    assert_eq!(env.values(), &[20.0, 40.0]);
}

#[test]
fn regrid_linear_interpolates_midpoints() {
    // Source: 1-D, 2 cells of size 2 (centers 1.0, 3.0), values 0 and 4.
    // Target: 1-D, 4 cells of size 1 (centers 0.5, 1.5, 2.5, 3.5).
    let mut source = UniformGrid::new_2d(2, 1, 2.0);
    source.dims.truncate(1);
    source.spacing.truncate(1);
    source.origin.truncate(1);
    source.axes_increase.truncate(1);
    let mut target = source.clone();
    target.dims[0] = 4;
    target.spacing[0] = 1.0;

    let info = Info::new()
        .with_grid(GridSpec::Uniform(source))
        .with_units(Units::dimensionless())
        .with_time(day(1));
    let mut rig = Rig::new(info, Box::new(RegridLinear::new(target)), Info::new());
    rig.push(vec![0.0, 4.0], day(1));
    let env = rig.pull(day(1)).unwrap();
    // Edges clamp, interior interpolates linearly.
    assert_eq!(env.values(), &[0.0, 1.0, 3.0, 4.0]);
}

// ── Time adapters ──────────────────────────────────────────────────

#[test]
fn step_previous_holds_until_next_sample() {
    let mut rig = Rig::new(scalar_info("1"), Box::new(StepTime::previous()), Info::new());
    rig.graph.begin_run();
    rig.push(vec![1.0], day(1));
    rig.push(vec![5.0], day(5));
    assert_eq!(rig.pull_scalar(day(2)), 1.0);
    assert_eq!(rig.pull_scalar(day(4)), 1.0);
    assert_eq!(rig.pull_scalar(day(5)), 5.0);
}

#[test]
fn step_next_switches_immediately() {
    let mut rig = Rig::new(scalar_info("1"), Box::new(StepTime::next()), Info::new());
    rig.graph.begin_run();
    rig.push(vec![1.0], day(1));
    rig.push(vec![5.0], day(5));
    assert_eq!(rig.pull_scalar(day(2)), 5.0);
}

#[test]
fn step_midpoint_position() {
    let mut rig = Rig::new(scalar_info("1"), Box::new(StepTime::at(0.5)), Info::new());
    rig.graph.begin_run();
    rig.push(vec![1.0], day(1));
    rig.push(vec![5.0], day(5));
    // Switch-over at day 3.
    assert_eq!(rig.pull_scalar(day(2)), 1.0);
    assert_eq!(rig.pull_scalar(day(3)), 5.0);
}

#[test]
fn linear_time_interpolates() {
    let mut rig = Rig::new(scalar_info("1"), Box::new(LinearTime::new()), Info::new());
    rig.graph.begin_run();
    rig.push(vec![1.0], day(1));
    rig.push(vec![31.0], day(31));
    assert!((rig.pull_scalar(day(16)) - 16.0).abs() < 1e-9);
    assert_eq!(rig.pull_scalar(day(31)), 31.0);
}

#[test]
fn linear_time_before_second_sample_is_flat() {
    let mut rig = Rig::new(scalar_info("1"), Box::new(LinearTime::new()), Info::new());
    rig.graph.begin_run();
    rig.push(vec![3.0], day(1));
    assert_eq!(rig.pull_scalar(day(1)), 3.0);
}

#[test]
fn linear_time_empty_cache_is_no_data() {
    let mut rig = Rig::new(scalar_info("1"), Box::new(LinearTime::new()), Info::new());
    match rig.pull(day(1)) {
        Err(PullError::NoData { .. }) => {}
        other => panic!("expected NoData, got {other:?}"),
    }
}

#[test]
fn integrate_sum_rewrites_units() {
    // Rate of 2.0/day for 10 days integrates to 20, dimensionless.
    let mut rig = Rig::new(scalar_info("1/day"), Box::new(IntegrateTime::sum()), Info::new());
    let resolved = rig.graph.input_info(rig.inp).unwrap();
    assert!(resolved.units.as_ref().unwrap().is_dimensionless());

    rig.graph.begin_run();
    for d in 1..=11 {
        rig.push(vec![2.0], day(d));
    }
    let total = rig.pull_scalar(day(11));
    assert!((total - 20.0).abs() < 1e-9, "total {total}");
}

#[test]
fn integrate_mean_is_time_weighted() {
    let mut rig = Rig::new(scalar_info("mm"), Box::new(IntegrateTime::mean()), Info::new());
    rig.graph.begin_run();
    rig.push(vec![0.0], day(1));
    rig.push(vec![4.0], day(5));
    // Linear ramp from 0 to 4 over the window: mean 2.
    let mean = rig.pull_scalar(day(5));
    assert!((mean - 2.0).abs() < 1e-9, "mean {mean}");
}

#[test]
fn integrate_windows_chain_without_overlap() {
    let mut rig = Rig::new(scalar_info("1/day"), Box::new(IntegrateTime::sum()), Info::new());
    rig.graph.begin_run();
    for d in 1..=5 {
        rig.push(vec![1.0], day(d));
    }
    let first = rig.pull_scalar(day(3));
    for d in 6..=9 {
        rig.push(vec![1.0], day(d));
    }
    let second = rig.pull_scalar(day(9));
    // Constant 1/day: [1,3] integrates to 2, (3,9] to 6.
    assert!((first - 2.0).abs() < 1e-9, "first {first}");
    assert!((second - 6.0).abs() < 1e-9, "second {second}");
}

// ── Delay adapters ─────────────────────────────────────────────────

#[test]
fn delay_fixed_shifts_requests() {
    let mut rig = Rig::new(
        scalar_info("1"),
        Box::new(DelayFixed::new(TimeSpan::days(1))),
        Info::new(),
    );
    rig.graph.begin_run();
    for d in 1..=4 {
        rig.push(vec![d as f64], day(d));
    }
    // Request at day 3 is served from day 2.
    assert_eq!(rig.pull_scalar(day(3)), 2.0);
    // The delivered envelope is stamped at the request time.
    assert_eq!(rig.pull(day(4)).unwrap().time(), day(4));
}

#[test]
fn delay_fixed_clamps_to_start() {
    let mut rig = Rig::new(
        scalar_info("1"),
        Box::new(DelayFixed::new(TimeSpan::days(10))),
        Info::new(),
    );
    rig.graph.begin_run();
    rig.push(vec![7.0], day(1));
    // day 2 - 10 days is before the initial time; clamps to day 1.
    assert_eq!(rig.pull_scalar(day(2)), 7.0);
}

#[test]
fn delay_to_push_serves_previous_push() {
    let mut rig = Rig::new(scalar_info("1"), Box::new(DelayToPush::new(1)), Info::new());
    rig.graph.begin_run();
    rig.push(vec![1.0], day(1));
    rig.push(vec![2.0], day(2));
    rig.push(vec![3.0], day(3));
    // One push back from day 3 is day 2.
    assert_eq!(rig.pull_scalar(day(3)), 2.0);
}

#[test]
fn delay_markers_are_set() {
    assert!(DelayFixed::new(TimeSpan::days(1)).is_delay());
    assert!(DelayToPush::new(1).is_delay());
    assert!(!Scale::new(1.0).is_delay());
    assert!(IntegrateTime::sum().no_branch());
}
