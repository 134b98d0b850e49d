//! Regridding adapters between uniform grids.
//!
//! [`RegridNearest`] and [`RegridLinear`] map cell data between two
//! uniform grids of the same dimensionality (1-D or 2-D) by nearest
//! neighbour or (bi)linear interpolation of cell centers, with edge
//! clamping. These cover the explicit regridding a composition needs
//! when two models discretize the same domain differently; heavier
//! schemes (conservative remapping, CRS reprojection) belong to
//! dedicated components.

use confluence_core::{
    Envelope, GridSpec, Info, MetadataError, PullError, Time, UniformGrid,
};
use confluence_sdk::{Adapter, AdapterContext};

fn uniform(grid: &GridSpec) -> Result<&UniformGrid, MetadataError> {
    match grid {
        GridSpec::Uniform(g) => Ok(g),
        other => Err(MetadataError::IncompatibleGrids {
            ours: "uniform".to_string(),
            theirs: other.to_string(),
        }),
    }
}

/// Cell-center coordinate of index `i` along axis `a`.
fn center(grid: &UniformGrid, a: usize, i: usize) -> f64 {
    grid.origin[a] + grid.spacing[a] * (i as f64 + 0.5)
}

/// Fractional source position of a physical coordinate along axis `a`.
fn position(grid: &UniformGrid, a: usize, coord: f64) -> f64 {
    (coord - grid.origin[a]) / grid.spacing[a] - 0.5
}

// ── RegridNearest ──────────────────────────────────────────────────

/// Nearest-neighbour regridding onto a configured uniform target grid.
pub struct RegridNearest {
    target: GridSpec,
    mapping: Option<(GridSpec, Vec<usize>)>,
}

impl RegridNearest {
    /// A nearest-neighbour regridder producing data on `target`.
    pub fn new(target: UniformGrid) -> Self {
        Self {
            target: GridSpec::Uniform(target),
            mapping: None,
        }
    }

    fn build_mapping(&self, source: &UniformGrid) -> Result<Vec<usize>, MetadataError> {
        let target = uniform(&self.target)?;
        if source.dims.len() != target.dims.len() {
            return Err(MetadataError::IncompatibleGrids {
                ours: self.target.to_string(),
                theirs: format!("uniform{:?}", source.dims.as_slice()),
            });
        }
        let ndim = target.dims.len();
        let total: usize = target.dims.iter().product();

        // Row-major source strides.
        let mut strides = vec![1usize; ndim];
        for a in (0..ndim.saturating_sub(1)).rev() {
            strides[a] = strides[a + 1] * source.dims[a + 1];
        }

        let mut mapping = Vec::with_capacity(total);
        let mut index = vec![0usize; ndim];
        for _ in 0..total {
            let mut src = 0usize;
            for a in 0..ndim {
                let coord = center(target, a, index[a]);
                let p = position(source, a, coord).round();
                let i = (p.max(0.0) as usize).min(source.dims[a] - 1);
                src += i * strides[a];
            }
            mapping.push(src);

            for a in (0..ndim).rev() {
                index[a] += 1;
                if index[a] < target.dims[a] {
                    break;
                }
                index[a] = 0;
            }
        }
        Ok(mapping)
    }
}

impl Adapter for RegridNearest {
    fn name(&self) -> &str {
        "regrid_nearest"
    }

    fn transform_request(&self, desired: &Info) -> Info {
        let mut request = desired.clone();
        request.grid = None;
        request
    }

    fn transform_info(&self, upstream: &Info) -> Result<Info, MetadataError> {
        let mut info = upstream.clone();
        info.grid = Some(self.target.clone());
        Ok(info)
    }

    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
        let env = ctx.pull(time)?;
        if env.grid() == &self.target {
            return Ok(env);
        }
        let rebuild = match &self.mapping {
            Some((grid, _)) => grid != env.grid(),
            None => true,
        };
        if rebuild {
            let source = uniform(env.grid()).map_err(PullError::Metadata)?;
            let mapping = self.build_mapping(source).map_err(PullError::Metadata)?;
            self.mapping = Some((env.grid().clone(), mapping));
        }
        let (_, mapping) = self.mapping.as_ref().ok_or_else(|| {
            PullError::Metadata(MetadataError::Unresolved {
                slot: self.name().to_string(),
            })
        })?;
        let values = env.values();
        let out: Vec<f64> = mapping.iter().map(|&i| values[i]).collect();
        Ok(Envelope::from_parts(
            out.into(),
            self.target.clone(),
            env.units().clone(),
            env.time(),
        ))
    }
}

// ── RegridLinear ───────────────────────────────────────────────────

/// (Bi)linear regridding onto a configured uniform target grid, with
/// edge clamping.
pub struct RegridLinear {
    target: GridSpec,
    /// Per target cell: source indices with interpolation weights.
    weights: Option<(GridSpec, Vec<Vec<(usize, f64)>>)>,
}

impl RegridLinear {
    /// A linear regridder producing data on `target`.
    pub fn new(target: UniformGrid) -> Self {
        Self {
            target: GridSpec::Uniform(target),
            weights: None,
        }
    }

    fn axis_weights(source: &UniformGrid, a: usize, coord: f64) -> [(usize, f64); 2] {
        let n = source.dims[a];
        if n == 1 {
            return [(0, 1.0), (0, 0.0)];
        }
        let p = position(source, a, coord).clamp(0.0, (n - 1) as f64);
        let i0 = (p.floor() as usize).min(n - 2);
        let frac = p - i0 as f64;
        [(i0, 1.0 - frac), (i0 + 1, frac)]
    }

    fn build_weights(
        &self,
        source: &UniformGrid,
    ) -> Result<Vec<Vec<(usize, f64)>>, MetadataError> {
        let target = uniform(&self.target)?;
        let ndim = target.dims.len();
        if source.dims.len() != ndim || ndim == 0 || ndim > 2 {
            return Err(MetadataError::IncompatibleGrids {
                ours: self.target.to_string(),
                theirs: format!("uniform{:?}", source.dims.as_slice()),
            });
        }
        let total: usize = target.dims.iter().product();
        let mut weights = Vec::with_capacity(total);

        if ndim == 1 {
            for i in 0..target.dims[0] {
                let coord = center(target, 0, i);
                let pair = Self::axis_weights(source, 0, coord);
                weights.push(pair.iter().filter(|(_, w)| *w != 0.0).copied().collect());
            }
        } else {
            let cols = source.dims[1];
            for r in 0..target.dims[0] {
                let row_w = Self::axis_weights(source, 0, center(target, 0, r));
                for c in 0..target.dims[1] {
                    let col_w = Self::axis_weights(source, 1, center(target, 1, c));
                    let mut cell = Vec::with_capacity(4);
                    for (ri, rw) in row_w {
                        for (ci, cw) in col_w {
                            let w = rw * cw;
                            if w != 0.0 {
                                cell.push((ri * cols + ci, w));
                            }
                        }
                    }
                    weights.push(cell);
                }
            }
        }
        Ok(weights)
    }
}

impl Adapter for RegridLinear {
    fn name(&self) -> &str {
        "regrid_linear"
    }

    fn transform_request(&self, desired: &Info) -> Info {
        let mut request = desired.clone();
        request.grid = None;
        request
    }

    fn transform_info(&self, upstream: &Info) -> Result<Info, MetadataError> {
        let mut info = upstream.clone();
        info.grid = Some(self.target.clone());
        Ok(info)
    }

    fn pull(&mut self, ctx: &mut AdapterContext<'_>, time: Time) -> Result<Envelope, PullError> {
        let env = ctx.pull(time)?;
        if env.grid() == &self.target {
            return Ok(env);
        }
        let rebuild = match &self.weights {
            Some((grid, _)) => grid != env.grid(),
            None => true,
        };
        if rebuild {
            let source = uniform(env.grid()).map_err(PullError::Metadata)?;
            let weights = self.build_weights(source).map_err(PullError::Metadata)?;
            self.weights = Some((env.grid().clone(), weights));
        }
        let (_, weights) = self.weights.as_ref().ok_or_else(|| {
            PullError::Metadata(MetadataError::Unresolved {
                slot: self.name().to_string(),
            })
        })?;
        let values = env.values();
        let out: Vec<f64> = weights
            .iter()
            .map(|cell| cell.iter().map(|&(i, w)| values[i] * w).sum())
            .collect();
        Ok(Envelope::from_parts(
            out.into(),
            self.target.clone(),
            env.units().clone(),
            env.time(),
        ))
    }
}
