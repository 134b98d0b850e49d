//! Basic data transformation adapters.

use confluence_core::{
    DataError, Envelope, GridSpec, Info, MetadataError, PullError, Time,
};
use confluence_sdk::{Adapter, AdapterContext};

// ── Scale ──────────────────────────────────────────────────────────

/// Multiplies every value by a constant factor. Units pass through
/// unchanged.
pub struct Scale {
    factor: f64,
}

impl Scale {
    /// A scaling adapter with the given factor.
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }
}

impl Adapter for Scale {
    fn name(&self) -> &str {
        "scale"
    }

    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
        let env = ctx.pull(time)?;
        let scaled: Vec<f64> = env.values().iter().map(|v| v * self.factor).collect();
        Ok(Envelope::from_parts(
            scaled.into(),
            env.grid().clone(),
            env.units().clone(),
            env.time(),
        ))
    }
}

// ── CallbackAdapter ────────────────────────────────────────────────

/// Transforms each pulled envelope through a user closure.
pub struct CallbackAdapter {
    callback: Box<dyn FnMut(&Envelope, Time) -> Result<Envelope, DataError> + 'static>,
}

impl CallbackAdapter {
    /// A callback adapter wrapping the given closure.
    pub fn new(
        callback: impl FnMut(&Envelope, Time) -> Result<Envelope, DataError> + 'static,
    ) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl Adapter for CallbackAdapter {
    fn name(&self) -> &str {
        "callback"
    }

    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
        let env = ctx.pull(time)?;
        (self.callback)(&env, time).map_err(PullError::Data)
    }
}

// ── GridCellCallback ───────────────────────────────────────────────

/// Transforms 2-D uniform grid data through a per-cell closure
/// `(row, col, value, time) -> value`.
pub struct GridCellCallback {
    callback: Box<dyn FnMut(usize, usize, f64, Time) -> f64 + 'static>,
}

impl GridCellCallback {
    /// A per-cell callback adapter wrapping the given closure.
    pub fn new(callback: impl FnMut(usize, usize, f64, Time) -> f64 + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl Adapter for GridCellCallback {
    fn name(&self) -> &str {
        "grid_cell_callback"
    }

    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
        let env = ctx.pull(time)?;
        let shape = env.grid().data_shape().filter(|s| s.len() == 2).ok_or_else(|| {
            PullError::Metadata(MetadataError::IncompatibleGrids {
                ours: "uniform 2-d".to_string(),
                theirs: env.grid().to_string(),
            })
        })?;
        let (rows, cols) = (shape[0], shape[1]);
        let values = env.values();
        let mut out = Vec::with_capacity(values.len());
        for row in 0..rows {
            for col in 0..cols {
                let v = values[row * cols + col];
                out.push((self.callback)(row, col, v, time));
            }
        }
        Ok(Envelope::from_parts(
            out.into(),
            env.grid().clone(),
            env.units().clone(),
            env.time(),
        ))
    }
}

// ── ValueToGrid ────────────────────────────────────────────────────

/// Broadcasts an upstream scalar onto a grid.
///
/// Negotiates both ends: requests a scalar from upstream, advertises the
/// configured grid downstream.
pub struct ValueToGrid {
    grid: GridSpec,
}

impl ValueToGrid {
    /// A broadcast adapter producing data on the given grid.
    pub fn new(grid: GridSpec) -> Self {
        Self { grid }
    }
}

impl Adapter for ValueToGrid {
    fn name(&self) -> &str {
        "value_to_grid"
    }

    fn transform_request(&self, desired: &Info) -> Info {
        let mut request = desired.clone();
        request.grid = Some(GridSpec::scalar());
        request
    }

    fn transform_info(&self, upstream: &Info) -> Result<Info, MetadataError> {
        let mut info = upstream.clone();
        info.grid = Some(self.grid.clone());
        Ok(info)
    }

    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
        let env = ctx.pull(time)?;
        let value = env.scalar().map_err(PullError::Data)?;
        let len = self.grid.data_len().unwrap_or(1);
        Ok(Envelope::from_parts(
            vec![value; len].into(),
            self.grid.clone(),
            env.units().clone(),
            env.time(),
        ))
    }
}

// ── GridToValue ────────────────────────────────────────────────────

/// Aggregates grid data into a scalar through a closure such as a mean
/// or a maximum.
pub struct GridToValue {
    aggregate: Box<dyn Fn(&[f64]) -> f64 + 'static>,
}

impl GridToValue {
    /// An aggregation adapter wrapping the given closure.
    pub fn new(aggregate: impl Fn(&[f64]) -> f64 + 'static) -> Self {
        Self {
            aggregate: Box::new(aggregate),
        }
    }

    /// Aggregation by arithmetic mean.
    pub fn mean() -> Self {
        Self::new(|values| {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        })
    }
}

impl Adapter for GridToValue {
    fn name(&self) -> &str {
        "grid_to_value"
    }

    fn transform_request(&self, desired: &Info) -> Info {
        // The upstream keeps its own grid; only units and time flow up.
        let mut request = desired.clone();
        request.grid = None;
        request
    }

    fn transform_info(&self, upstream: &Info) -> Result<Info, MetadataError> {
        let mut info = upstream.clone();
        info.grid = Some(GridSpec::scalar());
        Ok(info)
    }

    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
        let env = ctx.pull(time)?;
        let value = (self.aggregate)(env.values());
        Ok(Envelope::from_parts(
            vec![value].into(),
            GridSpec::scalar(),
            env.units().clone(),
            env.time(),
        ))
    }
}
