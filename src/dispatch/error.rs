use thiserror::Error;

/// Dispatch-specific errors.
///
/// None of these escape a resolver's `resolve` call as a panic: action
/// failures are contained inside the resolution loop and convergence
/// exhaustion degrades to a partial result with a non-zero remainder.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed resource state (non-finite imbalance, zero-capacity
    /// resources misreported, ...). Tolerated by treating the resource as
    /// unavailable.
    #[error("invalid resource state: {0}")]
    Validation(String),

    /// A single resolver sub-action could not achieve its goal.
    #[error("action failed: {0}")]
    Action(String),

    /// The resolution loop hit its iteration cap with imbalance outstanding.
    #[error("no convergence after {iterations} iterations, {remaining_kw:.3} kW unresolved")]
    ConvergenceExhausted { iterations: u32, remaining_kw: f64 },
}
