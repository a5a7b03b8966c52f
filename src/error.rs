//! Error kinds shared across the evaluation core.

use thiserror::Error;

/// Errors produced by the evaluation and iterator coordination engine.
#[derive(Error, Debug)]
pub enum DakotaError {
  /// The problem description violated a schema or consistency rule. Fatal
  /// at startup.
  #[error("input error: {0}")]
  InputError(String),

  /// The evaluator received an out-of-domain input. Logged, the
  /// evaluation is marked failed, not fatal to the caller.
  #[error("domain error evaluating {interface_id}: {message}")]
  DomainError {
    /// Interface that rejected the input.
    interface_id: String,
    /// Human-readable explanation.
    message: String,
  },

  /// A requested derivative cannot be produced by the interface nor by
  /// finite differences (e.g. a Hessian with no FD policy configured).
  #[error("derivative unavailable for component {component}: {reason}")]
  DerivativeUnavailable {
    /// Index of the response component that could not be differentiated.
    component: usize,
    /// Why it could not be produced.
    reason: String,
  },

  /// A response is missing one or more components the active set
  /// requested. See Open Question (b): surfaced as an error carrying the
  /// missing indices rather than returned as a silently-partial response.
  #[error("partial response: missing components {missing:?}")]
  PartialResponse {
    /// Indices of response components the active set requested but the
    /// interface did not supply.
    missing: Vec<usize>,
  },

  /// The simulator returned an error for this evaluation. Recorded as a
  /// failure in the cache; the iterator decides whether to retry or abort.
  #[error("evaluation failure on {interface_id}: {message}")]
  EvaluationFailure {
    /// Interface that failed.
    interface_id: String,
    /// Failure message from the simulator.
    message: String,
  },

  /// The evaluation was cancelled via `Interface::abort`.
  #[error("evaluation {eval_id} cancelled")]
  Cancelled {
    /// Evaluation id that was cancelled.
    eval_id: u64,
  },

  /// The evaluation exceeded its configured timeout.
  #[error("evaluation {eval_id} timed out")]
  Timeout {
    /// Evaluation id that timed out.
    eval_id: u64,
  },

  /// An eval-id resolved to an interface different from the one it was
  /// registered with.
  #[error("interface mismatch for eval {eval_id}: expected {expected}, got {actual}")]
  InterfaceMismatch {
    /// Evaluation id in question.
    eval_id: u64,
    /// Interface id the evaluation was registered under.
    expected: String,
    /// Interface id the completion actually reported.
    actual: String,
  },

  /// Restart log I/O failed. Non-fatal: callers should log a warning and
  /// proceed without persistence.
  #[error("restart log I/O error: {0}")]
  RestartIo(#[from] std::io::Error),

  /// The evaluation cache is internally inconsistent. Fatal.
  #[error("cache corrupt: {0}")]
  CacheCorrupt(String),

  /// A problem description failed to deserialize.
  #[error("config error: {0}")]
  Config(#[from] toml::de::Error),

  /// JSON (de)serialization error on the simulator wire protocol.
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// Binary (de)serialization error on the restart log wire format.
  #[error("restart record error: {0}")]
  Bincode(#[from] bincode::Error),
}

/// Convenience alias used throughout the crate.
pub type DakotaResult<T> = Result<T, DakotaError>;
