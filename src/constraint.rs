//! [`ConstraintMapping`]: translates two-sided and equality nonlinear
//! constraints into the engine's canonical one-sided form.
//!
//! Every nonlinear constraint the engine hands an optimizer is
//! `g(x) <= 0`. The problem description may instead express a two-sided
//! inequality `lower <= g(x) <= upper` (with either bound possibly
//! infinite) or an equality `g(x) = target`; this module records, for each
//! original constraint, the multiplier and offset that turn its raw value
//! into that canonical form, and the mapping is invertible so a component
//! can always be reported back in the user's original terms.

use crate::error::{DakotaError, DakotaResult};
use crate::variables::Bound;

/// How one original constraint maps onto the canonical one-sided form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MappedConstraint {
  /// Already one-sided: canonical value is the raw value unchanged.
  OneSided,
  /// Two-sided `lower <= g(x) <= upper`. Produces one row per finite
  /// bound: `g(x) - upper <= 0` when `upper` is finite, and
  /// `lower - g(x) <= 0` when `lower` is finite. A bound of
  /// [`Bound::NegInfinity`]/[`Bound::PosInfinity`] drops its row
  /// entirely, so a one-sided inequality is just the degenerate case of
  /// this variant with one infinite bound.
  TwoSided { lower: Bound, upper: Bound },
  /// Equality `g(x) = target`, represented as two one-sided rows:
  /// `target - g(x) <= 0` and `g(x) - target <= 0`. Both are reported;
  /// the point is feasible only when both are satisfied, i.e. exactly at
  /// `g(x) = target`.
  Equality { target: f64 },
}

/// Records the multiplier and offset applied to one raw constraint value
/// to reach a canonical one-sided row: `canonical = multiplier * raw +
/// offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappingRecord {
  /// Index of the raw constraint this row was derived from.
  pub source_index: usize,
  /// Multiplier applied to the raw value.
  pub multiplier: f64,
  /// Offset applied after the multiplier.
  pub offset: f64,
}

impl MappingRecord {
  /// Applies the recorded mapping to a raw constraint value.
  pub fn apply(&self, raw: f64) -> f64 {
    self.multiplier * raw + self.offset
  }

  /// Applies the recorded mapping to a raw constraint gradient row
  /// (linear in the multiplier, offset-invariant).
  pub fn apply_gradient(&self, raw: &[f64]) -> Vec<f64> {
    raw.iter().map(|&g| self.multiplier * g).collect()
  }
}

/// The full set of mapping records for a problem's nonlinear constraints,
/// built once from the constraint descriptions and reused every
/// evaluation.
#[derive(Debug, Clone)]
pub struct ConstraintMapping {
  records: Vec<MappingRecord>,
}

impl ConstraintMapping {
  /// Builds the mapping from one [`MappedConstraint`] per original
  /// constraint, in order.
  pub fn new(constraints: &[MappedConstraint]) -> DakotaResult<Self> {
    let mut records = Vec::new();
    for (source_index, c) in constraints.iter().enumerate() {
      match *c {
        MappedConstraint::OneSided => {
          records.push(MappingRecord { source_index, multiplier: 1.0, offset: 0.0 });
        }
        MappedConstraint::TwoSided { lower, upper } => {
          if let (Bound::Finite(l), Bound::Finite(u)) = (lower, upper) {
            if l > u {
              return Err(DakotaError::InputError(format!(
                "two-sided constraint {source_index} has lower bound {l} greater than upper bound {u}"
              )));
            }
          }
          // g(x) - upper <= 0
          if let Bound::Finite(upper) = upper {
            records.push(MappingRecord { source_index, multiplier: 1.0, offset: -upper });
          }
          // lower - g(x) <= 0  <=>  -g(x) + lower <= 0
          if let Bound::Finite(lower) = lower {
            records.push(MappingRecord { source_index, multiplier: -1.0, offset: lower });
          }
        }
        MappedConstraint::Equality { target } => {
          // target - g(x) <= 0
          records.push(MappingRecord { source_index, multiplier: -1.0, offset: target });
          // g(x) - target <= 0
          records.push(MappingRecord { source_index, multiplier: 1.0, offset: -target });
        }
      }
    }
    Ok(ConstraintMapping { records })
  }

  /// Number of canonical one-sided rows this mapping produces (may exceed
  /// the number of original constraints, since two-sided and equality
  /// constraints can expand into two rows each).
  pub fn num_rows(&self) -> usize {
    self.records.len()
  }

  /// The mapping records, one per canonical row, in order.
  pub fn records(&self) -> &[MappingRecord] {
    &self.records
  }

  /// Maps a vector of raw constraint values (one per original constraint)
  /// into the canonical one-sided rows.
  pub fn map_values(&self, raw: &[f64]) -> Vec<f64> {
    self.records.iter().map(|r| r.apply(raw[r.source_index])).collect()
  }

  /// Maps a vector of raw constraint gradients (one row per original
  /// constraint) into the canonical one-sided rows.
  pub fn map_gradients(&self, raw: &[Vec<f64>]) -> Vec<Vec<f64>> {
    self.records.iter().map(|r| r.apply_gradient(&raw[r.source_index])).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_one_sided_passthrough() {
    let mapping = ConstraintMapping::new(&[MappedConstraint::OneSided]).unwrap();
    assert_eq!(mapping.num_rows(), 1);
    assert_eq!(mapping.map_values(&[3.0]), vec![3.0]);
  }

  #[test]
  fn test_two_sided_expands_to_two_rows() {
    let mapping = ConstraintMapping::new(&[MappedConstraint::TwoSided {
      lower: Bound::Finite(-1.0),
      upper: Bound::Finite(1.0),
    }])
    .unwrap();
    assert_eq!(mapping.num_rows(), 2);
    let mapped = mapping.map_values(&[0.5]);
    // g(x) - upper = 0.5 - 1.0 = -0.5 <= 0, feasible
    assert!((mapped[0] - (-0.5)).abs() < 1e-12);
    // lower - g(x) = -1.0 - 0.5 = -1.5 <= 0, feasible
    assert!((mapped[1] - (-1.5)).abs() < 1e-12);
  }

  #[test]
  fn test_two_sided_detects_infeasible_point() {
    let mapping = ConstraintMapping::new(&[MappedConstraint::TwoSided {
      lower: Bound::Finite(-1.0),
      upper: Bound::Finite(1.0),
    }])
    .unwrap();
    let mapped = mapping.map_values(&[5.0]);
    assert!(mapped[0] > 0.0, "point above upper bound must be infeasible in canonical form");
  }

  #[test]
  fn test_one_sided_bound_drops_row() {
    // lower-bounded-only inequality: g(x) >= lower, no upper limit.
    let mapping =
      ConstraintMapping::new(&[MappedConstraint::TwoSided { lower: Bound::Finite(0.0), upper: Bound::PosInfinity }])
        .unwrap();
    assert_eq!(mapping.num_rows(), 1);
    let mapped = mapping.map_values(&[-2.0]);
    // lower - g(x) = 0.0 - (-2.0) = 2.0 > 0, infeasible
    assert!(mapped[0] > 0.0);
  }

  #[test]
  fn test_equality_mapping_matches_scenario() {
    // c(x) = x, equality target 3, evaluated at x = 2.
    let mapping = ConstraintMapping::new(&[MappedConstraint::Equality { target: 3.0 }]).unwrap();
    assert_eq!(mapping.num_rows(), 2);
    let mapped = mapping.map_values(&[2.0]);
    assert!((mapped[0] - 1.0).abs() < 1e-12);
    assert!((mapped[1] - (-1.0)).abs() < 1e-12);
    // Feasibility is violated since r1 > 0.
    assert!(mapped[0] > 0.0);
  }

  #[test]
  fn test_equality_mapping_exact_hit_is_feasible() {
    let mapping = ConstraintMapping::new(&[MappedConstraint::Equality { target: 3.0 }]).unwrap();
    let mapped = mapping.map_values(&[3.0]);
    assert!(mapped.iter().all(|&v| v <= 1e-12));
  }

  #[test]
  fn test_inverted_bounds_rejected() {
    let err =
      ConstraintMapping::new(&[MappedConstraint::TwoSided { lower: Bound::Finite(1.0), upper: Bound::Finite(-1.0) }]);
    assert!(err.is_err());
  }

  #[test]
  fn test_gradient_mapping_applies_multiplier() {
    let mapping = ConstraintMapping::new(&[MappedConstraint::TwoSided {
      lower: Bound::Finite(-1.0),
      upper: Bound::Finite(1.0),
    }])
    .unwrap();
    let mapped = mapping.map_gradients(&[vec![2.0, -3.0]]);
    assert_eq!(mapped[0], vec![2.0, -3.0]);
    assert_eq!(mapped[1], vec![-2.0, 3.0]);
  }

  proptest::proptest! {
    /// Testable property: for any raw constraint value `c` and a produced
    /// one-sided row `r`, `r = multiplier * c + offset`, and feasibility of
    /// `c` against its `(l, u)` interval equals `r <= 0`.
    #[test]
    fn prop_round_trip_matches_feasibility(
      lower in -10.0f64..0.0,
      upper in 0.0f64..10.0,
      raw in -20.0f64..20.0,
    ) {
      let mapping = ConstraintMapping::new(&[MappedConstraint::TwoSided {
        lower: Bound::Finite(lower),
        upper: Bound::Finite(upper),
      }]).unwrap();
      let mapped = mapping.map_values(&[raw]);
      for (row, record) in mapped.iter().zip(mapping.records()) {
        prop_assert!((row - record.apply(raw)).abs() < 1e-9);
      }
      let feasible_raw = lower <= raw && raw <= upper;
      let feasible_mapped = mapped.iter().all(|&r| r <= 1e-9);
      prop_assert_eq!(feasible_raw, feasible_mapped);
    }

    /// Equality constraints are feasible (both rows <= 0) iff `c(x)` hits
    /// the target exactly.
    #[test]
    fn prop_equality_feasible_iff_exact(target in -10.0f64..10.0, raw in -20.0f64..20.0) {
      let mapping = ConstraintMapping::new(&[MappedConstraint::Equality { target }]).unwrap();
      let mapped = mapping.map_values(&[raw]);
      let feasible = mapped.iter().all(|&r| r <= 1e-9);
      prop_assert_eq!(feasible, (raw - target).abs() < 1e-9);
    }
  }
}
