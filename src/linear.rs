//! Small dense linear algebra and the power method for stationary vectors.

use log::{debug, trace};

use crate::bitset::StateSet;
use crate::ctmc::{off_diagonal_rate, UNIFORMISATION_FACTOR};
use crate::error::{ModelError, Result};
use crate::kernels::{self, difference};
use crate::model::Model;

/// Pivots of smaller magnitude are treated as zero.
pub const PIVOT_TOLERANCE: f64 = 1e-14;

/// How successive iterates are compared.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum Termination {
    Absolute,
    #[default]
    Relative,
}

impl Termination {
    pub fn is_absolute(self) -> bool {
        self == Termination::Absolute
    }
}

/// Solves `a·x = b` by Gaussian elimination with partial pivoting.
pub fn solve_dense(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(ModelError::InvalidDimensions(format!(
            "system of {} rows for a right-hand side of length {}",
            a.len(),
            n
        )));
    }

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_TOLERANCE {
            return Err(ModelError::SingularMatrix { column: col });
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// The stationary vector `π·P = π`, `Σπ = 1` of a dense stochastic matrix,
/// which must be irreducible.
pub fn stationary_dense(p: &[Vec<f64>]) -> Result<Vec<f64>> {
    let n = p.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    // transpose of (P - I), with the last equation replaced by Σπ = 1
    let mut a = vec![vec![0.0; n]; n];
    for (i, row) in p.iter().enumerate() {
        if row.len() != n {
            return Err(ModelError::InvalidDimensions(format!(
                "row {} has length {}, expected {}",
                i,
                row.len(),
                n
            )));
        }
        for (j, &w) in row.iter().enumerate() {
            a[j][i] = w;
        }
        a[i][i] -= 1.0;
    }
    a[n - 1].iter_mut().for_each(|x| *x = 1.0);
    let mut b = vec![0.0; n];
    b[n - 1] = 1.0;
    solve_dense(a, b)
}

/// Power iteration for the stationary vector of the chain restricted to
/// `states`, which must be closed and strongly connected.
///
/// Iterates `π ← π·(I + Δt·Q)` with `Q` the generator (`P - I` for a DTMC)
/// and `Δt` below the inverse of the largest exit rate, so the iteration
/// matrix is aperiodic. Entries outside `states` are zero.
pub fn power_stationary<M: Model + ?Sized>(
    model: &M,
    states: &StateSet,
    termination: Termination,
    epsilon: f64,
    max_iterations: usize,
) -> Result<(Vec<f64>, usize)> {
    let n = model.num_states();
    let mut vect = vec![0.0; n];
    if states.len() == 1 {
        for s in states.iter() {
            vect[s] = 1.0;
        }
        return Ok((vect, 0));
    }

    let mut diags_q = vec![0.0; n];
    let mut max_rate = 0.0f64;
    for s in states.iter() {
        let rate = off_diagonal_rate(model, s);
        diags_q[s] = -rate;
        max_rate = max_rate.max(rate);
    }
    if max_rate == 0.0 {
        return Err(ModelError::InvalidDimensions(format!(
            "{} states without transitions are not strongly connected",
            states.len()
        )));
    }
    let delta_t = 1.0 / (UNIFORMISATION_FACTOR * max_rate);
    debug!(
        "power_stationary: {} states, delta_t = {}, epsilon = {}",
        states.len(),
        delta_t,
        epsilon
    );

    let initial = 1.0 / states.len() as f64;
    for s in states.iter() {
        vect[s] = initial;
    }
    let mut result = vec![0.0; n];
    for iteration in 1..=max_iterations {
        kernels::vm_mult_power_steady_state(model, &vect, &mut result, &diags_q, delta_t, states);
        let mut max_diff = 0.0;
        for s in states.iter() {
            let diff = difference(vect[s], result[s], termination.is_absolute());
            if diff > max_diff {
                max_diff = diff;
            }
        }
        std::mem::swap(&mut vect, &mut result);
        trace!("power iteration {}: max diff {}", iteration, max_diff);
        if max_diff < epsilon {
            let sum: f64 = states.iter().map(|s| vect[s]).sum();
            for s in states.iter() {
                vect[s] /= sum;
            }
            return Ok((vect, iteration));
        }
    }
    Err(ModelError::NotConverged {
        iterations: max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple::{MutableModel, SimpleModel};
    use crate::types::ModelType;
    use test_log::test;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_solve_dense() {
        let a = vec![vec![0.0, 2.0, 1.0], vec![1.0, 1.0, 0.0], vec![2.0, 0.0, 3.0]];
        let x = solve_dense(a, vec![7.0, 3.0, 11.0]).unwrap();
        for (got, want) in x.iter().zip([1.0, 2.0, 3.0]) {
            assert!(approx_eq(*got, want, 1e-12));
        }
    }

    #[test]
    fn test_singular() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(matches!(
            solve_dense(a, vec![1.0, 2.0]),
            Err(ModelError::SingularMatrix { column: 1 })
        ));
        assert!(matches!(
            solve_dense(vec![vec![1.0]], vec![1.0, 2.0]),
            Err(ModelError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn test_stationary_dense() {
        let p = vec![vec![0.5, 0.5], vec![0.25, 0.75]];
        let pi = stationary_dense(&p).unwrap();
        assert!(approx_eq(pi[0], 1.0 / 3.0, 1e-12));
        assert!(approx_eq(pi[1], 2.0 / 3.0, 1e-12));
    }

    #[test]
    fn test_power_on_periodic_chain() {
        // 0 <-> 1 is periodic; the lazy iteration still converges
        let mut m = SimpleModel::new(ModelType::Dtmc, 3);
        m.set_probability(0, 1, 1.0).unwrap();
        m.set_probability(1, 0, 1.0).unwrap();
        m.set_probability(2, 2, 1.0).unwrap();
        let states: StateSet = [0, 1].into_iter().collect();
        let (pi, iterations) = power_stationary(&m, &states, Termination::Absolute, 1e-10, 10_000).unwrap();
        assert!(iterations > 0);
        assert!(approx_eq(pi[0], 0.5, 1e-8));
        assert!(approx_eq(pi[1], 0.5, 1e-8));
        assert_eq!(pi[2], 0.0);
    }

    #[test]
    fn test_power_on_ctmc_matches_dense() {
        // rates 0 -> 1: 2, 1 -> 0: 1; stationary (1/3, 2/3)
        let mut m = SimpleModel::new(ModelType::Ctmc, 2);
        m.set_probability(0, 1, 2.0).unwrap();
        m.set_probability(1, 0, 1.0).unwrap();
        let (pi, _) = power_stationary(&m, &StateSet::full(2), Termination::Relative, 1e-12, 100_000).unwrap();
        assert!(approx_eq(pi[0], 1.0 / 3.0, 1e-8));
        assert!(approx_eq(pi[1], 2.0 / 3.0, 1e-8));
    }

    #[test]
    fn test_power_not_converged() {
        let mut m = SimpleModel::new(ModelType::Dtmc, 2);
        m.set_probability(0, 1, 1.0).unwrap();
        m.set_probability(1, 0, 0.5).unwrap();
        m.set_probability(1, 1, 0.5).unwrap();
        let result = power_stationary(&m, &StateSet::full(2), Termination::Absolute, 1e-300, 3);
        assert!(matches!(result, Err(ModelError::NotConverged { iterations: 3 })));
    }
}
