//! Error type shared by all model operations.

use thiserror::Error;

/// Errors raised while building, transforming, checking or solving models.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),
    #[error("Invalid permutation: {0}")]
    InvalidPermutation(String),
    #[error("Invalid equivalence relation: {0}")]
    InvalidEquivalence(String),
    #[error("Invalid distribution: weight {weight} for target {target}")]
    InvalidDistribution { target: usize, weight: f64 },
    #[error("Operation `{operation}` is not supported: the model cannot be modified after construction")]
    Immutable { operation: &'static str },
    #[error("Deadlocks have already been fixed")]
    DeadlocksAlreadyFixed,
    #[error("State {state} is out of bounds (model has {num_states} states)")]
    StateOutOfBounds { state: usize, num_states: usize },
    #[error("Choice {choice} of state {state} is out of bounds (state has {num_choices} choices)")]
    ChoiceOutOfBounds { state: usize, choice: usize, num_choices: usize },
    #[error("{model_type} has a deadlock in state {state}")]
    Deadlock { model_type: String, state: usize },
    #[error("Choice {choice} of state {state} sums to {sum}, not 1")]
    NotStochastic { state: usize, choice: usize, sum: f64 },
    #[error("Iterative method did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },
    #[error("Singular matrix: no pivot in column {column}")]
    SingularMatrix { column: usize },
    #[error("Unsupported for {model_type}: {operation}")]
    Unsupported { model_type: String, operation: &'static str },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Formatting error")]
    Fmt(#[from] std::fmt::Error),
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;

/// Returns `Ok(())` if `state < num_states`.
pub(crate) fn check_state(state: usize, num_states: usize) -> Result<()> {
    if state >= num_states {
        return Err(ModelError::StateOutOfBounds { state, num_states });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_operation() {
        let err = ModelError::Immutable { operation: "fix deadlocks" };
        assert!(err.to_string().contains("fix deadlocks"));

        let err = ModelError::Deadlock {
            model_type: "DTMC".to_string(),
            state: 3,
        };
        assert_eq!(err.to_string(), "DTMC has a deadlock in state 3");
    }

    #[test]
    fn test_check_state() {
        assert!(check_state(2, 3).is_ok());
        assert!(matches!(
            check_state(3, 3),
            Err(ModelError::StateOutOfBounds { state: 3, num_states: 3 })
        ));
    }
}
