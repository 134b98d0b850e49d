//! Port metadata and its bidirectional negotiation.
//!
//! An [`Info`] describes what a port delivers or expects: initial time,
//! grid, units, mask policy, and free-form extra entries. Fields start
//! unset and are absorbed from the peer during the connect fixpoint via
//! [`Info::merge`]; [`Info::accepts`] is the compatibility check run at
//! each exchange. Infos are values — a port never mutates one it has
//! already published.

use indexmap::IndexMap;

use crate::error::MetadataError;
use crate::grid::GridSpec;
use crate::mask::Mask;
use crate::time::Time;
use crate::units::Units;

/// Metadata descriptor for a port.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Info {
    /// The initial timestamp data will carry, once known.
    pub time: Option<Time>,
    /// The grid the data is defined on, once known.
    pub grid: Option<GridSpec>,
    /// The units of the data, once known.
    pub units: Option<Units>,
    /// Mask policy. Defaults to [`Mask::Flex`].
    pub mask: Mask,
    /// Free-form extra entries, preserved through negotiation.
    pub extra: IndexMap<String, String>,
}

impl Info {
    /// An Info with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the grid.
    pub fn with_grid(mut self, grid: GridSpec) -> Self {
        self.grid = Some(grid);
        self
    }

    /// Set the units.
    pub fn with_units(mut self, units: Units) -> Self {
        self.units = Some(units);
        self
    }

    /// Set the initial time.
    pub fn with_time(mut self, time: Time) -> Self {
        self.time = Some(time);
        self
    }

    /// Set the mask policy.
    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = mask;
        self
    }

    /// Add an extra entry.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Whether time, grid, and units are all resolved.
    pub fn is_complete(&self) -> bool {
        self.time.is_some() && self.grid.is_some() && self.units.is_some()
    }

    /// Absorb the peer's values into this Info's unset fields.
    ///
    /// Set fields win over the peer's; unset fields take the peer's
    /// value. A flex mask takes the peer's policy. Absorption is
    /// idempotent: `a.merge(b).merge(b) == a.merge(b)`.
    pub fn merge(&self, other: &Info) -> Info {
        let mut extra = self.extra.clone();
        for (k, v) in &other.extra {
            extra.entry(k.clone()).or_insert_with(|| v.clone());
        }
        Info {
            time: self.time.or(other.time),
            grid: self.grid.clone().or_else(|| other.grid.clone()),
            units: self.units.clone().or_else(|| other.units.clone()),
            mask: if self.mask.is_flex() {
                other.mask.clone()
            } else {
                self.mask.clone()
            },
            extra,
        }
    }

    /// Check that data described by `incoming` is acceptable here.
    ///
    /// Checks grid, mask, and units only; unset fields on either side
    /// pass (they will be absorbed). Grids must be equal up to an
    /// automatic axis transform and units must be convertible.
    /// `from_downstream` selects the direction for error wording only —
    /// the checks themselves are symmetric.
    pub fn accepts(&self, incoming: &Info, _from_downstream: bool) -> Result<(), MetadataError> {
        if let (Some(ours), Some(theirs)) = (&self.grid, &incoming.grid) {
            if !ours.compatible(theirs) {
                return Err(MetadataError::IncompatibleGrids {
                    ours: ours.to_string(),
                    theirs: theirs.to_string(),
                });
            }
        }
        if let (Some(ours), Some(theirs)) = (&self.units, &incoming.units) {
            if !ours.convertible(theirs) {
                return Err(MetadataError::IncompatibleUnits {
                    ours: ours.to_string(),
                    theirs: theirs.to_string(),
                });
            }
        }
        self.mask.accepts(&incoming.mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::UniformGrid;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn t0() -> Time {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn merge_absorbs_unset_fields() {
        let partial = Info::new().with_units(Units::parse("m").unwrap());
        let peer = Info::new()
            .with_grid(GridSpec::scalar())
            .with_units(Units::parse("km").unwrap())
            .with_time(t0());
        let merged = partial.merge(&peer);
        // Own units win; grid and time absorbed.
        assert_eq!(merged.units, Some(Units::parse("m").unwrap()));
        assert_eq!(merged.grid, Some(GridSpec::scalar()));
        assert_eq!(merged.time, Some(t0()));
    }

    #[test]
    fn merge_is_idempotent() {
        let a = Info::new().with_units(Units::parse("m/s").unwrap());
        let b = Info::new()
            .with_grid(GridSpec::scalar())
            .with_mask(Mask::NoMask);
        let once = a.merge(&b);
        assert_eq!(once.merge(&b), once);
    }

    #[test]
    fn accepts_passes_on_unset_fields() {
        let empty = Info::new();
        let full = Info::new()
            .with_grid(GridSpec::scalar())
            .with_units(Units::parse("m").unwrap());
        assert!(empty.accepts(&full, true).is_ok());
        assert!(full.accepts(&empty, false).is_ok());
    }

    #[test]
    fn accepts_rejects_unconvertible_units() {
        let a = Info::new().with_units(Units::parse("m").unwrap());
        let b = Info::new().with_units(Units::parse("s").unwrap());
        match a.accepts(&b, true) {
            Err(MetadataError::IncompatibleUnits { .. }) => {}
            other => panic!("expected IncompatibleUnits, got {other:?}"),
        }
    }

    #[test]
    fn accepts_rejects_incompatible_grids() {
        let a = Info::new().with_grid(GridSpec::Uniform(UniformGrid::new_2d(2, 3, 1.0)));
        let b = Info::new().with_grid(GridSpec::Uniform(UniformGrid::new_2d(4, 4, 1.0)));
        match a.accepts(&b, true) {
            Err(MetadataError::IncompatibleGrids { .. }) => {}
            other => panic!("expected IncompatibleGrids, got {other:?}"),
        }
    }

    #[test]
    fn accepts_allows_transformable_grids() {
        let mut flipped = UniformGrid::new_2d(2, 3, 1.0);
        flipped.axes_increase[0] = false;
        let a = Info::new().with_grid(GridSpec::Uniform(UniformGrid::new_2d(2, 3, 1.0)));
        let b = Info::new().with_grid(GridSpec::Uniform(flipped));
        assert!(a.accepts(&b, true).is_ok());
    }

    fn arb_info() -> impl Strategy<Value = Info> {
        (
            prop::option::of(Just(t0())),
            prop::option::of(prop_oneof![
                Just(GridSpec::scalar()),
                Just(GridSpec::NoGrid { ndims: 1 }),
            ]),
            prop::option::of(prop_oneof![
                Just(Units::parse("m").unwrap()),
                Just(Units::dimensionless()),
            ]),
        )
            .prop_map(|(time, grid, units)| Info {
                time,
                grid,
                units,
                mask: Mask::Flex,
                extra: IndexMap::new(),
            })
    }

    proptest! {
        #[test]
        fn merge_idempotent_prop(a in arb_info(), b in arb_info()) {
            let once = a.merge(&b);
            prop_assert_eq!(once.merge(&b), once);
        }

        #[test]
        fn merge_keeps_own_fields(a in arb_info(), b in arb_info()) {
            let merged = a.merge(&b);
            if a.time.is_some() {
                prop_assert_eq!(merged.time, a.time);
            }
            if a.units.is_some() {
                prop_assert_eq!(merged.units, a.units);
            }
        }

        #[test]
        fn merge_fills_unset_from_peer(a in arb_info(), b in arb_info()) {
            let merged = a.merge(&b);
            if a.grid.is_none() {
                prop_assert_eq!(merged.grid, b.grid);
            }
        }
    }
}
