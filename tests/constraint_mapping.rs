//! A simulator producing a raw two-sided and a raw equality nonlinear
//! constraint component is mapped to the engine's canonical one-sided form,
//! and feasibility in canonical terms matches feasibility in the user's
//! original terms.

use dakota_core::constraint::{ConstraintMapping, MappedConstraint};
use dakota_core::interface::ClosureInterface;
use dakota_core::response::{ActiveSet, AsvRequest, ComponentKind, Response};
use dakota_core::variables::{Bounds, Role, Value, Variable, VariableKind, VariableSpace};

fn space(x: f64) -> VariableSpace {
  let v = Variable::new("x", VariableKind::Real, Role::Design, Value::Real(x), Some(Bounds::finite(-20.0, 20.0)), None, None)
    .unwrap();
  VariableSpace::new(vec![v]).unwrap()
}

// One objective, then a two-sided inequality `-1 <= x <= 1` (raw value is
// just `x`), then an equality `x = 3`.
fn simulator() -> ClosureInterface<impl Fn(&VariableSpace, &ActiveSet) -> dakota_core::error::DakotaResult<Response>> {
  ClosureInterface::new("constrained", |vars: &VariableSpace, _asv: &ActiveSet| {
    let x = vars.continuous_values()[0];
    let mut resp = Response::empty(
      vec![ComponentKind::Objective, ComponentKind::NonlinearInequality, ComponentKind::NonlinearEquality],
      1,
    );
    resp.set_value(0, x * x);
    resp.set_value(1, x);
    resp.set_value(2, x);
    Ok(resp)
  })
}

fn mapping() -> ConstraintMapping {
  ConstraintMapping::new(&[MappedConstraint::TwoSided {
    lower: dakota_core::variables::Bound::Finite(-1.0),
    upper: dakota_core::variables::Bound::Finite(1.0),
  }])
  .unwrap()
}

#[test]
fn interior_point_is_feasible_in_canonical_form() {
  use dakota_core::interface::Interface;
  let iface = simulator();
  let asv = ActiveSet::new(vec![AsvRequest::value_only(); 3]);
  let resp = iface.evaluate(&space(0.5), &asv).unwrap();

  let ineq_mapping = mapping();
  let canonical = ineq_mapping.map_values(&[resp.value(1).unwrap()]);
  assert!(canonical.iter().all(|&r| r <= 1e-9), "x=0.5 is inside [-1, 1], so the canonical rows must be feasible");

  let eq_mapping = ConstraintMapping::new(&[MappedConstraint::Equality { target: 3.0 }]).unwrap();
  let eq_canonical = eq_mapping.map_values(&[resp.value(2).unwrap()]);
  assert!(eq_canonical.iter().any(|&r| r > 0.0), "x=0.5 does not hit the equality target 3.0, so it must be infeasible");
}

#[test]
fn boundary_and_target_points_are_exactly_feasible() {
  use dakota_core::interface::Interface;
  let iface = simulator();
  let asv = ActiveSet::new(vec![AsvRequest::value_only(); 3]);

  let resp_upper = iface.evaluate(&space(1.0), &asv).unwrap();
  let ineq_mapping = mapping();
  let canonical_upper = ineq_mapping.map_values(&[resp_upper.value(1).unwrap()]);
  assert!(canonical_upper.iter().all(|&r| r <= 1e-9), "x at the upper bound must be feasible");

  let resp_target = iface.evaluate(&space(3.0), &asv).unwrap();
  let eq_mapping = ConstraintMapping::new(&[MappedConstraint::Equality { target: 3.0 }]).unwrap();
  let canonical_eq = eq_mapping.map_values(&[resp_target.value(2).unwrap()]);
  assert!(canonical_eq.iter().all(|&r| r.abs() <= 1e-9), "x exactly at the equality target must be feasible");
}
