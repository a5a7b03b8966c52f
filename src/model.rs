//! [`Model`]: couples a [`VariableSpace`] to an [`Interface`], resolving
//! every evaluation through the [`EvaluationCache`] and decomposing
//! gradient requests the interface cannot answer analytically into
//! finite-difference perturbations.

use std::sync::Arc;

use crate::cache::EvaluationCache;
use crate::error::{DakotaError, DakotaResult};
use crate::interface::Interface;
use crate::pair::{PairOrigin, ParameterResponsePair, VariablesSnapshot};
use crate::response::{ActiveSet, AsvRequest, Response};
use crate::restart::RestartLog;
use crate::variables::VariableSpace;

/// Which finite-difference formula to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdMethod {
  /// `(f(x+h) - f(x)) / h`.
  Forward,
  /// `(f(x+h) - f(x-h)) / 2h`.
  Central,
  /// `(f(x) - f(x-h)) / h`.
  Backward,
}

/// How the perturbation step size is derived from the current value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FdStep {
  /// `h = step * max(|x|, 1.0)`.
  Relative(f64),
  /// `h = step`, independent of `x`.
  Absolute(f64),
}

impl FdStep {
  fn magnitude(&self, x: f64) -> f64 {
    match self {
      FdStep::Relative(r) => r * x.abs().max(1.0),
      FdStep::Absolute(a) => *a,
    }
  }
}

/// Finite-difference configuration applied uniformly to every continuous
/// variable whose gradient the interface does not supply directly.
#[derive(Debug, Clone, Copy)]
pub struct FdPolicy {
  /// Formula to use.
  pub method: FdMethod,
  /// Step size rule.
  pub step: FdStep,
}

/// One concrete perturbed evaluation point needed to estimate a partial
/// derivative with respect to one continuous variable.
#[derive(Debug, Clone)]
enum FdSubRequest {
  Forward { var_index: usize, perturbed: Vec<f64>, step: f64 },
  Backward { var_index: usize, perturbed: Vec<f64>, step: f64 },
  Central { var_index: usize, plus: Vec<f64>, minus: Vec<f64>, step: f64 },
}

/// Decomposes a gradient request into finite-difference sub-evaluations,
/// respecting bounds by flipping the step direction (or, if boxed in on
/// both sides, falling back to whichever one-sided formula fits).
pub struct DerivativeEstimator {
  policy: FdPolicy,
}

impl DerivativeEstimator {
  /// Builds an estimator for the given policy.
  pub fn new(policy: FdPolicy) -> Self {
    DerivativeEstimator { policy }
  }

  /// Produces one sub-request per continuous variable in `vars`.
  fn decompose(&self, vars: &VariableSpace) -> DakotaResult<Vec<FdSubRequest>> {
    let continuous = vars.continuous_values();
    let bounds: Vec<Option<_>> = vars
      .continuous_indices()
      .iter()
      .map(|&i| vars.variables()[i].bounds().copied())
      .collect();

    let mut requests = Vec::with_capacity(continuous.len());
    for (var_index, &x) in continuous.iter().enumerate() {
      let h = self.policy.step.magnitude(x);
      let bound = bounds[var_index];
      let plus_ok = bound.map_or(true, |b| b.contains(x + h));
      let minus_ok = bound.map_or(true, |b| b.contains(x - h));

      let req = match self.policy.method {
        FdMethod::Central if plus_ok && minus_ok => {
          let mut plus = continuous.clone();
          plus[var_index] = x + h;
          let mut minus = continuous.clone();
          minus[var_index] = x - h;
          FdSubRequest::Central { var_index, plus, minus, step: h }
        }
        FdMethod::Central if plus_ok => {
          let mut perturbed = continuous.clone();
          perturbed[var_index] = x + h;
          FdSubRequest::Forward { var_index, perturbed, step: h }
        }
        FdMethod::Central if minus_ok => {
          let mut perturbed = continuous.clone();
          perturbed[var_index] = x - h;
          FdSubRequest::Backward { var_index, perturbed, step: h }
        }
        FdMethod::Forward if plus_ok => {
          let mut perturbed = continuous.clone();
          perturbed[var_index] = x + h;
          FdSubRequest::Forward { var_index, perturbed, step: h }
        }
        FdMethod::Forward if minus_ok => {
          // bound-respecting step flip: the nominal forward step would
          // leave the feasible interval, so fall back to backward.
          let mut perturbed = continuous.clone();
          perturbed[var_index] = x - h;
          FdSubRequest::Backward { var_index, perturbed, step: h }
        }
        FdMethod::Backward if minus_ok => {
          let mut perturbed = continuous.clone();
          perturbed[var_index] = x - h;
          FdSubRequest::Backward { var_index, perturbed, step: h }
        }
        FdMethod::Backward if plus_ok => {
          let mut perturbed = continuous.clone();
          perturbed[var_index] = x + h;
          FdSubRequest::Forward { var_index, perturbed, step: h }
        }
        _ => {
          return Err(DakotaError::DerivativeUnavailable {
            component: var_index,
            reason: format!(
              "variable bounds too tight for a step of magnitude {h} in either direction"
            ),
          });
        }
      };
      requests.push(req);
    }
    Ok(requests)
  }
}

/// Couples a problem's [`VariableSpace`] to an [`Interface`], resolving
/// every request through the [`EvaluationCache`] (and, when configured, a
/// [`RestartLog`]) and filling in finite-difference gradients the
/// interface does not supply analytically.
pub struct Model {
  interface: Box<dyn Interface>,
  cache: Arc<EvaluationCache>,
  restart: Option<RestartLog>,
  fd: Option<DerivativeEstimator>,
}

impl Model {
  /// Builds a model around `interface`, sharing `cache` with any other
  /// models that evaluate the same interface (e.g. nested sub-iterators),
  /// and optionally persisting completed evaluations to `restart`.
  pub fn new(
    interface: Box<dyn Interface>,
    cache: Arc<EvaluationCache>,
    restart: Option<RestartLog>,
    fd: Option<DerivativeEstimator>,
  ) -> Self {
    Model { interface, cache, restart, fd }
  }

  /// Seeds the cache from a restart replay. Call before the first
  /// `evaluate`.
  pub fn seed_from_restart(&self, pairs: Vec<ParameterResponsePair>) {
    let count = pairs.len();
    for pair in pairs {
      self.cache.store(pair);
    }
    tracing::info!(target: "model", count, "seeded evaluation cache from restart log");
  }

  fn snapshot(vars: &VariableSpace) -> VariablesSnapshot {
    let values: Vec<_> = vars.variables().iter().map(|v| v.value().clone()).collect();
    VariablesSnapshot::from_values(&values)
  }

  fn persist(&self, pair: &ParameterResponsePair) {
    if let Some(log) = &self.restart {
      if let Err(e) = log.append(pair) {
        tracing::warn!(target: "restart", error = %e, "failed to append restart record, continuing without it");
      }
    }
  }

  /// Evaluates `vars` synchronously, honoring `active_set`. Reuses a
  /// cached response when one already covers the request; otherwise calls
  /// the interface directly, decomposing into finite-difference
  /// sub-evaluations for any gradient the interface did not supply.
  pub fn evaluate(&self, vars: &VariableSpace, active_set: &ActiveSet) -> DakotaResult<Response> {
    let snapshot = Self::snapshot(vars);

    if let Some(pair) = self.cache.lookup_pair(self.interface.id(), &snapshot) {
      if active_set.is_subset_of(&pair.active_set()) {
        tracing::debug!(target: "cache", "duplicate detected, reusing cached response");
        return Ok(pair.response());
      }
    }

    let mut response = self.interface.evaluate(vars, active_set)?;

    let wants_gradient = active_set.requests().iter().any(|r| r.wants_gradient());
    if wants_gradient {
      let missing: Vec<usize> = active_set
        .requests()
        .iter()
        .enumerate()
        .filter(|(i, r)| r.wants_gradient() && response.gradient(*i).is_none())
        .map(|(i, _)| i)
        .collect();
      if !missing.is_empty() {
        self.fill_gradients_by_fd(vars, &response.clone(), &missing, &mut response)?;
      }
    }

    response.honors(active_set)?;

    let pair =
      ParameterResponsePair::new(self.interface.id(), snapshot, active_set, &response, PairOrigin::Live);
    self.persist(&pair);
    self.cache.store(pair);

    Ok(response)
  }

  fn fill_gradients_by_fd(
    &self,
    vars: &VariableSpace,
    base: &Response,
    components: &[usize],
    out: &mut Response,
  ) -> DakotaResult<()> {
    let estimator = self.fd.as_ref().ok_or_else(|| DakotaError::DerivativeUnavailable {
      component: components[0],
      reason: "no finite-difference policy configured and interface did not supply a gradient".to_string(),
    })?;

    let num_vars = vars.continuous_indices().len();
    let mut rows: Vec<Vec<f64>> = components.iter().map(|_| vec![0.0; num_vars]).collect();

    let requests = estimator.decompose(vars)?;
    let values_only = ActiveSet::values_only(base.len());

    for req in requests {
      match req {
        FdSubRequest::Forward { var_index, perturbed, step } => {
          let resp = self.evaluate_at(vars, &perturbed, &values_only)?;
          for (row, &comp) in rows.iter_mut().zip(components) {
            let f0 = base.value(comp).ok_or_else(|| DakotaError::DerivativeUnavailable {
              component: comp,
              reason: "base value unavailable for forward-difference gradient".to_string(),
            })?;
            let f1 = resp.value(comp).ok_or_else(|| DakotaError::DerivativeUnavailable {
              component: comp,
              reason: "perturbed value unavailable for forward-difference gradient".to_string(),
            })?;
            row[var_index] = (f1 - f0) / step;
          }
        }
        FdSubRequest::Backward { var_index, perturbed, step } => {
          let resp = self.evaluate_at(vars, &perturbed, &values_only)?;
          for (row, &comp) in rows.iter_mut().zip(components) {
            let f0 = base.value(comp).ok_or_else(|| DakotaError::DerivativeUnavailable {
              component: comp,
              reason: "base value unavailable for backward-difference gradient".to_string(),
            })?;
            let f1 = resp.value(comp).ok_or_else(|| DakotaError::DerivativeUnavailable {
              component: comp,
              reason: "perturbed value unavailable for backward-difference gradient".to_string(),
            })?;
            row[var_index] = (f0 - f1) / step;
          }
        }
        FdSubRequest::Central { var_index, plus, minus, step } => {
          let resp_plus = self.evaluate_at(vars, &plus, &values_only)?;
          let resp_minus = self.evaluate_at(vars, &minus, &values_only)?;
          for (row, &comp) in rows.iter_mut().zip(components) {
            let f1 = resp_plus.value(comp).ok_or_else(|| DakotaError::DerivativeUnavailable {
              component: comp,
              reason: "plus-perturbed value unavailable for central-difference gradient".to_string(),
            })?;
            let f2 = resp_minus.value(comp).ok_or_else(|| DakotaError::DerivativeUnavailable {
              component: comp,
              reason: "minus-perturbed value unavailable for central-difference gradient".to_string(),
            })?;
            row[var_index] = (f1 - f2) / (2.0 * step);
          }
        }
      }
    }

    for (&comp, row) in components.iter().zip(rows) {
      out.set_gradient(comp, row);
    }
    Ok(())
  }

  /// Evaluates at a perturbed continuous-variable vector, going through
  /// the cache like any other point (so finite-difference recentering can
  /// reuse a point another part of the run already visited).
  fn evaluate_at(
    &self,
    vars: &VariableSpace,
    continuous_values: &[f64],
    active_set: &ActiveSet,
  ) -> DakotaResult<Response> {
    let mut perturbed = vars.clone();
    perturbed.set_continuous_values(continuous_values)?;
    let snapshot = Self::snapshot(&perturbed);

    if let Some(pair) = self.cache.lookup_pair(self.interface.id(), &snapshot) {
      if active_set.is_subset_of(&pair.active_set()) {
        return Ok(pair.response());
      }
    }

    let response = self.interface.evaluate(&perturbed, active_set)?;
    response.honors(active_set)?;
    let pair =
      ParameterResponsePair::new(self.interface.id(), snapshot, active_set, &response, PairOrigin::Live);
    self.persist(&pair);
    self.cache.store(pair);
    Ok(response)
  }
}
