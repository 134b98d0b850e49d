//! The immutable data envelope crossing every link.
//!
//! An [`Envelope`] bundles a payload with the grid it is defined on, its
//! units, and a single timestamp. Envelopes are immutable after emission;
//! the payload sits behind an `Arc` so conversion and history retention
//! never copy unless a value actually changes, and pointer identity
//! implements the aliased-push check.

use std::sync::Arc;

use crate::error::DataError;
use crate::grid::{AxisTransform, GridSpec};
use crate::info::Info;
use crate::time::Time;
use crate::units::Units;

/// An immutable, time-stamped, unit-bearing, grid-annotated array.
#[derive(Clone, Debug)]
pub struct Envelope {
    payload: Arc<[f64]>,
    grid: GridSpec,
    units: Units,
    time: Time,
}

impl Envelope {
    /// Wrap raw values in an envelope, validating against the port's
    /// metadata.
    ///
    /// The payload must match the grid's data shape. A payload holding a
    /// whole number `k ≥ 1` of slices is accepted (a stacked time axis);
    /// [`values`](Envelope::values) then yields all slices and
    /// [`single_slice`](Envelope::single_slice) enforces `k == 1`.
    ///
    /// # Errors
    ///
    /// [`DataError::MissingInfo`] if the info's grid or units are unset,
    /// [`DataError::ShapeMismatch`] if the payload does not fit the grid.
    pub fn prepare(values: Vec<f64>, info: &Info, time: Time) -> Result<Self, DataError> {
        let grid = info.grid.clone().ok_or(DataError::MissingInfo {
            slot: "grid".to_string(),
        })?;
        let units = info.units.clone().ok_or(DataError::MissingInfo {
            slot: "units".to_string(),
        })?;
        if let Some(expected) = grid.data_len() {
            let ok = expected > 0 && values.len() % expected == 0 && !values.is_empty();
            if !ok {
                return Err(DataError::ShapeMismatch {
                    expected,
                    actual: values.len(),
                });
            }
        }
        Ok(Self {
            payload: values.into(),
            grid,
            units,
            time,
        })
    }

    /// Build an envelope from already-validated parts. Used by adapters
    /// that derive a new payload from an existing envelope.
    pub fn from_parts(payload: Arc<[f64]>, grid: GridSpec, units: Units, time: Time) -> Self {
        Self {
            payload,
            grid,
            units,
            time,
        }
    }

    /// The payload values (all time slices, row-major).
    pub fn values(&self) -> &[f64] {
        &self.payload
    }

    /// The shared payload allocation.
    pub fn payload(&self) -> &Arc<[f64]> {
        &self.payload
    }

    /// The payload without a time axis.
    ///
    /// # Errors
    ///
    /// [`DataError::MultipleTimeSlices`] if the payload stacks more than
    /// one slice of the grid's data shape.
    pub fn single_slice(&self) -> Result<&[f64], DataError> {
        match self.grid.data_len() {
            Some(n) if n > 0 && self.payload.len() > n => Err(DataError::MultipleTimeSlices {
                count: self.payload.len() / n,
            }),
            _ => Ok(&self.payload),
        }
    }

    /// The single scalar value of a scalar envelope.
    ///
    /// # Errors
    ///
    /// [`DataError::ShapeMismatch`] if the payload holds more than one
    /// value.
    pub fn scalar(&self) -> Result<f64, DataError> {
        if self.payload.len() == 1 {
            Ok(self.payload[0])
        } else {
            Err(DataError::ShapeMismatch {
                expected: 1,
                actual: self.payload.len(),
            })
        }
    }

    /// The grid the payload is defined on.
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// The payload's units.
    pub fn units(&self) -> &Units {
        &self.units
    }

    /// The envelope's timestamp.
    pub fn time(&self) -> Time {
        self.time
    }

    /// Whether two envelopes share the same backing allocation.
    pub fn same_buffer(&self, other: &Envelope) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }

    /// Convert the payload to the target units.
    ///
    /// Pure: returns a new envelope. The identity conversion is detected
    /// and skipped — the returned envelope shares this one's payload, so
    /// the magnitudes are bit-identical.
    ///
    /// # Errors
    ///
    /// [`DataError::UnitsIncompatible`] if the dimensions differ.
    pub fn convert_units(&self, target: &Units) -> Result<Self, DataError> {
        if &self.units == target {
            return Ok(Self {
                payload: Arc::clone(&self.payload),
                grid: self.grid.clone(),
                units: target.clone(),
                time: self.time,
            });
        }
        let factor = self
            .units
            .factor_to(target)
            .ok_or_else(|| DataError::UnitsIncompatible {
                from: self.units.to_string(),
                to: target.to_string(),
            })?;
        let converted: Vec<f64> = self.payload.iter().map(|v| v * factor).collect();
        Ok(Self {
            payload: converted.into(),
            grid: self.grid.clone(),
            units: target.clone(),
            time: self.time,
        })
    }

    /// Re-lay the payload for a compatible peer grid.
    ///
    /// Identity transforms share the payload; otherwise the data is
    /// rewritten through the transform and annotated with the peer grid.
    pub fn apply_transform(&self, transform: &AxisTransform, target: &GridSpec) -> Self {
        if transform.is_identity() {
            return Self {
                payload: Arc::clone(&self.payload),
                grid: target.clone(),
                units: self.units.clone(),
                time: self.time,
            };
        }
        Self {
            payload: transform.apply(&self.payload).into(),
            grid: target.clone(),
            units: self.units.clone(),
            time: self.time,
        }
    }

    /// A copy of this envelope carrying a different timestamp.
    pub fn at_time(&self, time: Time) -> Self {
        Self {
            payload: Arc::clone(&self.payload),
            grid: self.grid.clone(),
            units: self.units.clone(),
            time,
        }
    }

    /// Payload size in bytes, for history budget accounting.
    pub fn payload_bytes(&self) -> usize {
        self.payload.len() * std::mem::size_of::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::UniformGrid;
    use chrono::NaiveDate;

    fn t0() -> Time {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn scalar_info(units: &str) -> Info {
        Info::new()
            .with_grid(GridSpec::scalar())
            .with_units(Units::parse(units).unwrap())
    }

    fn grid_info() -> Info {
        Info::new()
            .with_grid(GridSpec::Uniform(UniformGrid::new_2d(2, 3, 1.0)))
            .with_units(Units::dimensionless())
    }

    #[test]
    fn prepare_validates_shape() {
        let env = Envelope::prepare(vec![1.0; 6], &grid_info(), t0()).unwrap();
        assert_eq!(env.values().len(), 6);

        match Envelope::prepare(vec![1.0; 5], &grid_info(), t0()) {
            Err(DataError::ShapeMismatch {
                expected: 6,
                actual: 5,
            }) => {}
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn prepare_without_grid_fails() {
        let info = Info::new().with_units(Units::dimensionless());
        assert!(matches!(
            Envelope::prepare(vec![1.0], &info, t0()),
            Err(DataError::MissingInfo { .. })
        ));
    }

    #[test]
    fn stacked_slices_accepted_but_single_slice_rejects() {
        let env = Envelope::prepare(vec![1.0; 12], &grid_info(), t0()).unwrap();
        match env.single_slice() {
            Err(DataError::MultipleTimeSlices { count: 2 }) => {}
            other => panic!("expected MultipleTimeSlices, got {other:?}"),
        }
    }

    #[test]
    fn identity_conversion_shares_payload() {
        let env = Envelope::prepare(vec![2.0], &scalar_info("m/s"), t0()).unwrap();
        let same = env.convert_units(&Units::parse("m/s").unwrap()).unwrap();
        assert!(env.same_buffer(&same));
        assert_eq!(same.values(), env.values());
    }

    #[test]
    fn unit_conversion_scales_magnitudes() {
        let env = Envelope::prepare(vec![10.0], &scalar_info("m/s"), t0()).unwrap();
        let kmh = env.convert_units(&Units::parse("km/h").unwrap()).unwrap();
        assert!((kmh.scalar().unwrap() - 36.0).abs() < 1e-9);
        assert!(!env.same_buffer(&kmh));
    }

    #[test]
    fn incompatible_conversion_fails() {
        let env = Envelope::prepare(vec![1.0], &scalar_info("m"), t0()).unwrap();
        assert!(matches!(
            env.convert_units(&Units::parse("s").unwrap()),
            Err(DataError::UnitsIncompatible { .. })
        ));
    }

    #[test]
    fn transform_round_trip_is_identical() {
        let source = GridSpec::Uniform(UniformGrid::new_2d(2, 3, 1.0));
        let mut flipped = UniformGrid::new_2d(2, 3, 1.0);
        flipped.axes_increase[0] = false;
        let target = GridSpec::Uniform(flipped);

        let env = Envelope::prepare(
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            &grid_info(),
            t0(),
        )
        .unwrap();

        let there = source.transform_to(&target).unwrap();
        let back = target.transform_to(&source).unwrap();
        let transformed = env.apply_transform(&there, &target);
        let returned = transformed.apply_transform(&back, &source);
        assert_eq!(returned.values(), env.values());
    }

    #[test]
    fn scalar_accessor() {
        let env = Envelope::prepare(vec![7.5], &scalar_info("1"), t0()).unwrap();
        assert_eq!(env.scalar().unwrap(), 7.5);
    }
}
