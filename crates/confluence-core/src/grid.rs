//! Grid specifications and automatic axis transforms.
//!
//! A [`GridSpec`] describes the geometry a payload is defined on. The
//! framework only needs enough geometry to validate payload shapes and to
//! detect *compatible-by-transform* pairs — grids equal up to per-axis
//! direction reversal and (for 2-D structured grids) axis-order swap. The
//! cheap [`AxisTransform`] covering those cases is applied automatically
//! on pull; anything more expensive (true regridding, CRS reprojection)
//! is an explicit adapter.

use smallvec::SmallVec;
use std::fmt;

/// Where data values live on a grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataLocation {
    /// One value per cell.
    Cells,
    /// One value per point (cell corner / mesh node).
    Points,
}

/// Axis ordering convention for structured grids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AxisOrder {
    /// Matrix order: row index first.
    Ij,
    /// Cartesian order: x axis first.
    Xy,
}

/// A regular grid with constant spacing per axis.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformGrid {
    /// Cell count per axis.
    pub dims: SmallVec<[usize; 3]>,
    /// Cell size per axis.
    pub spacing: SmallVec<[f64; 3]>,
    /// Coordinate of the lower grid corner per axis.
    pub origin: SmallVec<[f64; 3]>,
    /// Whether axis coordinates increase with the index, per axis.
    pub axes_increase: SmallVec<[bool; 3]>,
    /// Axis ordering convention.
    pub order: AxisOrder,
    /// Coordinate reference system identifier, if any.
    pub crs: Option<String>,
    /// Where data values live.
    pub data_location: DataLocation,
}

impl UniformGrid {
    /// A 2-D grid in matrix order with ascending axes and cell data.
    pub fn new_2d(nrows: usize, ncols: usize, spacing: f64) -> Self {
        Self {
            dims: SmallVec::from_slice(&[nrows, ncols]),
            spacing: SmallVec::from_slice(&[spacing, spacing]),
            origin: SmallVec::from_slice(&[0.0, 0.0]),
            axes_increase: SmallVec::from_slice(&[true, true]),
            order: AxisOrder::Ij,
            crs: None,
            data_location: DataLocation::Cells,
        }
    }

    /// An ESRI ASCII grid header: `ncols`/`nrows`/`cellsize` with the
    /// lower-left corner at `(xll, yll)`. Rows are stored north to south,
    /// so the row axis descends.
    pub fn esri(ncols: usize, nrows: usize, cell_size: f64, xll: f64, yll: f64) -> Self {
        Self {
            dims: SmallVec::from_slice(&[nrows, ncols]),
            spacing: SmallVec::from_slice(&[cell_size, cell_size]),
            origin: SmallVec::from_slice(&[yll, xll]),
            axes_increase: SmallVec::from_slice(&[false, true]),
            order: AxisOrder::Ij,
            crs: None,
            data_location: DataLocation::Cells,
        }
    }
}

/// A structured grid with explicit point coordinates per axis.
#[derive(Clone, Debug, PartialEq)]
pub struct RectilinearGrid {
    /// Point coordinates per axis, strictly monotone per axis.
    pub axes: Vec<Vec<f64>>,
    /// Coordinate reference system identifier, if any.
    pub crs: Option<String>,
    /// Where data values live.
    pub data_location: DataLocation,
}

/// An unstructured mesh: points plus cell connectivity.
#[derive(Clone, Debug, PartialEq)]
pub struct UnstructuredGrid {
    /// Mesh node coordinates.
    pub points: Vec<[f64; 3]>,
    /// Flat cell connectivity (indices into `points`).
    pub cells: Vec<u32>,
    /// Start offset of each cell in `cells`.
    pub cell_offsets: Vec<u32>,
    /// Coordinate reference system identifier, if any.
    pub crs: Option<String>,
    /// Where data values live.
    pub data_location: DataLocation,
}

/// A bare point cloud; data always lives on the points.
#[derive(Clone, Debug, PartialEq)]
pub struct UnstructuredPoints {
    /// Point coordinates.
    pub points: Vec<[f64; 3]>,
    /// Coordinate reference system identifier, if any.
    pub crs: Option<String>,
}

/// The geometry a payload is defined on.
#[derive(Clone, Debug, PartialEq)]
pub enum GridSpec {
    /// No geometry: a plain array of the given dimensionality.
    /// `ndims == 0` is a scalar.
    NoGrid {
        /// Number of array dimensions.
        ndims: usize,
    },
    /// A regular grid with constant spacing.
    Uniform(UniformGrid),
    /// A structured grid with explicit axes.
    Rectilinear(RectilinearGrid),
    /// An unstructured mesh.
    Unstructured(UnstructuredGrid),
    /// A bare point cloud.
    Points(UnstructuredPoints),
}

impl GridSpec {
    /// The scalar grid: `NoGrid` with zero dimensions.
    pub fn scalar() -> Self {
        Self::NoGrid { ndims: 0 }
    }

    /// Where data values live on this grid.
    pub fn data_location(&self) -> DataLocation {
        match self {
            Self::NoGrid { .. } => DataLocation::Cells,
            Self::Uniform(g) => g.data_location,
            Self::Rectilinear(g) => g.data_location,
            Self::Unstructured(g) => g.data_location,
            Self::Points(_) => DataLocation::Points,
        }
    }

    /// The data shape at the grid's data location, row-major.
    ///
    /// `None` for [`GridSpec::NoGrid`] with `ndims > 0`, whose shape is
    /// carried by the payload alone. A scalar `NoGrid` has shape `[]`.
    pub fn data_shape(&self) -> Option<SmallVec<[usize; 3]>> {
        match self {
            Self::NoGrid { ndims: 0 } => Some(SmallVec::new()),
            Self::NoGrid { .. } => None,
            Self::Uniform(g) => {
                let shape = g
                    .dims
                    .iter()
                    .map(|&n| match g.data_location {
                        DataLocation::Cells => n,
                        DataLocation::Points => n + 1,
                    })
                    .collect();
                Some(shape)
            }
            Self::Rectilinear(g) => {
                let shape = g
                    .axes
                    .iter()
                    .map(|axis| match g.data_location {
                        DataLocation::Cells => axis.len().saturating_sub(1),
                        DataLocation::Points => axis.len(),
                    })
                    .collect();
                Some(shape)
            }
            Self::Unstructured(g) => {
                let n = match g.data_location {
                    DataLocation::Cells => g.cell_offsets.len(),
                    DataLocation::Points => g.points.len(),
                };
                Some(SmallVec::from_slice(&[n]))
            }
            Self::Points(g) => Some(SmallVec::from_slice(&[g.points.len()])),
        }
    }

    /// The number of data values on this grid, if the grid determines it.
    pub fn data_len(&self) -> Option<usize> {
        self.data_shape().map(|shape| shape.iter().product())
    }

    /// Whether two grids can carry each other's data after an automatic
    /// axis transform (or none).
    pub fn compatible(&self, other: &Self) -> bool {
        self.transform_to(other).is_some()
    }

    /// The automatic transform mapping data on `self` to data on `other`.
    ///
    /// Covers per-axis direction reversal for structured grids and the
    /// 2-D axis-order swap for uniform grids. Grids that differ in any
    /// other respect are *not* compatible: regridding is an explicit
    /// adapter, never implicit.
    pub fn transform_to(&self, other: &Self) -> Option<AxisTransform> {
        match (self, other) {
            (Self::NoGrid { ndims: a }, Self::NoGrid { ndims: b }) if a == b => {
                Some(AxisTransform::identity())
            }
            (Self::Uniform(a), Self::Uniform(b)) => {
                if a.data_location != b.data_location || a.crs != b.crs {
                    return None;
                }
                let ndim = a.dims.len();
                if b.dims.len() != ndim {
                    return None;
                }
                let swap = a.order != b.order;
                if swap && ndim != 2 {
                    return None;
                }
                // Correlate source axis i with the matching target axis.
                let corr = |i: usize| if swap { 1 - i } else { i };
                for i in 0..ndim {
                    if a.dims[i] != b.dims[corr(i)]
                        || a.spacing[i] != b.spacing[corr(i)]
                        || a.origin[i] != b.origin[corr(i)]
                    {
                        return None;
                    }
                }
                let reverse = (0..ndim)
                    .map(|i| a.axes_increase[i] != b.axes_increase[corr(i)])
                    .collect();
                Some(AxisTransform {
                    shape: self.data_shape()?,
                    reverse,
                    swap,
                })
            }
            (Self::Rectilinear(a), Self::Rectilinear(b)) => {
                if a.data_location != b.data_location
                    || a.crs != b.crs
                    || a.axes.len() != b.axes.len()
                {
                    return None;
                }
                let mut reverse = SmallVec::new();
                for (ax_a, ax_b) in a.axes.iter().zip(&b.axes) {
                    if ax_a == ax_b {
                        reverse.push(false);
                    } else if ax_a.len() == ax_b.len()
                        && ax_a.iter().rev().zip(ax_b).all(|(x, y)| x == y)
                    {
                        reverse.push(true);
                    } else {
                        return None;
                    }
                }
                Some(AxisTransform {
                    shape: self.data_shape()?,
                    reverse,
                    swap: false,
                })
            }
            (Self::Unstructured(a), Self::Unstructured(b)) if a == b => {
                Some(AxisTransform::identity())
            }
            (Self::Points(a), Self::Points(b)) if a == b => Some(AxisTransform::identity()),
            _ => None,
        }
    }
}

impl fmt::Display for GridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoGrid { ndims: 0 } => write!(f, "scalar"),
            Self::NoGrid { ndims } => write!(f, "no-grid({ndims}d)"),
            Self::Uniform(g) => write!(f, "uniform{:?}", g.dims.as_slice()),
            Self::Rectilinear(g) => {
                let lens: Vec<usize> = g.axes.iter().map(Vec::len).collect();
                write!(f, "rectilinear{lens:?}")
            }
            Self::Unstructured(g) => write!(f, "unstructured({} cells)", g.cell_offsets.len()),
            Self::Points(g) => write!(f, "points({})", g.points.len()),
        }
    }
}

// ── AxisTransform ──────────────────────────────────────────────────

/// A cheap, invertible payload transform between compatible grids:
/// per-axis reversal followed by a 2-D axis swap.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisTransform {
    /// Source data shape, row-major.
    shape: SmallVec<[usize; 3]>,
    /// Per source axis: reverse the index direction.
    reverse: SmallVec<[bool; 3]>,
    /// Transpose the two axes (2-D only).
    swap: bool,
}

impl AxisTransform {
    /// The transform that changes nothing.
    pub fn identity() -> Self {
        Self {
            shape: SmallVec::new(),
            reverse: SmallVec::new(),
            swap: false,
        }
    }

    /// Whether applying this transform is a no-op.
    pub fn is_identity(&self) -> bool {
        !self.swap && self.reverse.iter().all(|&r| !r)
    }

    /// The transform mapping the target layout back to the source layout.
    pub fn inverse(&self) -> Self {
        if self.swap {
            Self {
                shape: SmallVec::from_slice(&[self.shape[1], self.shape[0]]),
                reverse: SmallVec::from_slice(&[self.reverse[1], self.reverse[0]]),
                swap: true,
            }
        } else {
            self.clone()
        }
    }

    /// Apply the transform to a row-major payload.
    ///
    /// Reversal happens in source axis indexing, then the swap. The
    /// payload length must match the source shape; mismatches return the
    /// data unchanged (shape validation happens at envelope preparation).
    pub fn apply(&self, data: &[f64]) -> Vec<f64> {
        if self.is_identity() {
            return data.to_vec();
        }
        let n = self.shape.len();
        let total: usize = self.shape.iter().product();
        if data.len() != total || n == 0 {
            return data.to_vec();
        }

        // Row-major strides of the source shape.
        let mut strides: SmallVec<[usize; 3]> = SmallVec::from_elem(1, n);
        for i in (0..n.saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.shape[i + 1];
        }

        let out_shape: SmallVec<[usize; 3]> = if self.swap {
            SmallVec::from_slice(&[self.shape[1], self.shape[0]])
        } else {
            self.shape.clone()
        };

        let mut out = Vec::with_capacity(total);
        let mut index: SmallVec<[usize; 3]> = SmallVec::from_elem(0, n);
        for _ in 0..total {
            // Map the output multi-index to a source multi-index.
            let mut src = 0usize;
            for axis in 0..n {
                let m = if self.swap { index[1 - axis] } else { index[axis] };
                let s = if self.reverse[axis] {
                    self.shape[axis] - 1 - m
                } else {
                    m
                };
                src += s * strides[axis];
            }
            out.push(data[src]);

            // Advance the row-major output index.
            for axis in (0..n).rev() {
                index[axis] += 1;
                if index[axis] < out_shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        out
    }
}
