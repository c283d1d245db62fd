//! Long-run (steady-state) probabilities of Markov chains.
//!
//! The chain is decomposed into bottom SCCs. Each BSCC gets its own local
//! stationary vector, stored in [`SteadyStateProbs`]; the global vector
//! weights every local one by the probability of being absorbed into that
//! BSCC from the initial distribution.
//!
//! ```
//! use pmc_rs::simple::{MutableModel, SimpleModel};
//! use pmc_rs::steady::{SolverConfig, SteadyStateSolver};
//! use pmc_rs::types::ModelType;
//!
//! let mut m = SimpleModel::new(ModelType::Dtmc, 2);
//! m.add_initial_state(0).unwrap();
//! m.set_probability(0, 0, 0.5).unwrap();
//! m.set_probability(0, 1, 0.5).unwrap();
//! m.set_probability(1, 1, 1.0).unwrap();
//!
//! let solution = SteadyStateSolver::new(SolverConfig::default()).compute(&m).unwrap();
//! assert_eq!(solution.distribution(), &[0.0, 1.0]);
//! ```

use log::{debug, info, trace};

use crate::bitset::StateSet;
use crate::ctmc::{off_diagonal_rate, UNIFORMISATION_FACTOR};
use crate::error::{ModelError, Result};
use crate::kernels::difference;
use crate::linear::{power_stationary, stationary_dense, Termination};
use crate::model::Model;
use crate::reach::post_star;
use crate::scc::SccComputer;

/// Local stationary vectors of the BSCCs of one model.
///
/// BSCC members are stored back to back in one array, delimited by offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct SteadyStateProbs {
    num_states: usize,
    bscc_states: Vec<usize>,
    bscc_offsets: Vec<usize>,
    probabilities: Vec<f64>,
}

impl SteadyStateProbs {
    pub fn new(num_states: usize) -> Self {
        Self {
            num_states,
            bscc_states: Vec::new(),
            bscc_offsets: vec![0],
            probabilities: vec![0.0; num_states],
        }
    }

    /// Records the BSCC with the given ascending `members` and its local
    /// stationary vector, in the same order. Returns the index of the BSCC.
    pub fn add_bscc(&mut self, members: &[usize], local: &[f64]) -> Result<usize> {
        if local.len() != members.len() {
            return Err(ModelError::InvalidDimensions(format!(
                "{} probabilities for a BSCC of {} states",
                local.len(),
                members.len()
            )));
        }
        if let Some(&state) = members.iter().find(|&&s| s >= self.num_states) {
            return Err(ModelError::StateOutOfBounds {
                state,
                num_states: self.num_states,
            });
        }
        for (&state, &p) in members.iter().zip(local) {
            self.bscc_states.push(state);
            self.probabilities[state] = p;
        }
        self.bscc_offsets.push(self.bscc_states.len());
        Ok(self.num_bsccs() - 1)
    }

    pub fn num_bsccs(&self) -> usize {
        self.bscc_offsets.len() - 1
    }

    /// Members of BSCC `index`, ascending.
    pub fn bscc_members(&self, index: usize) -> &[usize] {
        &self.bscc_states[self.bscc_offsets[index]..self.bscc_offsets[index + 1]]
    }

    pub fn bscc(&self, index: usize) -> StateSet {
        self.bscc_members(index).iter().copied().collect()
    }

    pub fn bsccs(&self) -> impl Iterator<Item = StateSet> + '_ {
        (0..self.num_bsccs()).map(|i| self.bscc(i))
    }

    /// All states in some BSCC.
    pub fn bscc_states(&self) -> StateSet {
        let mut states = StateSet::new(self.num_states);
        states.extend(self.bscc_states.iter().copied());
        states
    }

    pub fn non_bscc_states(&self) -> StateSet {
        self.bscc_states().complement(self.num_states)
    }

    /// Per state, its probability in the local vector of its BSCC; zero
    /// outside BSCCs.
    pub fn steady_state_probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn trim_to_size(&mut self) {
        self.bscc_states.shrink_to_fit();
        self.bscc_offsets.shrink_to_fit();
    }

    pub fn clear(&mut self) {
        self.num_states = 0;
        self.bscc_states = Vec::new();
        self.bscc_offsets = vec![0];
        self.probabilities = Vec::new();
    }
}

/// How the local system of a BSCC is solved.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum LocalMethod {
    /// Gaussian elimination up to [`SolverConfig::gauss_threshold`] states,
    /// power iteration above.
    #[default]
    Auto,
    Gauss,
    Power,
}

#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub method: LocalMethod,
    pub termination: Termination,
    pub epsilon: f64,
    pub max_iterations: usize,
    pub gauss_threshold: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: LocalMethod::Auto,
            termination: Termination::Relative,
            epsilon: 1e-6,
            max_iterations: 10_000,
            gauss_threshold: 500,
        }
    }
}

impl SolverConfig {
    pub fn with_method(mut self, method: LocalMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_gauss_threshold(mut self, gauss_threshold: usize) -> Self {
        self.gauss_threshold = gauss_threshold;
        self
    }

    fn use_gauss(&self, size: usize) -> bool {
        match self.method {
            LocalMethod::Auto => size <= self.gauss_threshold,
            LocalMethod::Gauss => true,
            LocalMethod::Power => false,
        }
    }
}

/// Progress of one [`SteadyStateSolver::compute`] run.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Phase {
    NotStarted,
    ScanningSccs,
    LocalSolve(usize),
    Combine,
    Done,
}

/// Result of a steady-state computation.
#[derive(Debug, Clone)]
pub struct SteadyStateSolution {
    probs: SteadyStateProbs,
    bscc_weights: Vec<f64>,
    distribution: Vec<f64>,
    iterations: usize,
}

impl SteadyStateSolution {
    pub fn probs(&self) -> &SteadyStateProbs {
        &self.probs
    }

    /// Probability of ending up in each BSCC, indexed like
    /// [`SteadyStateProbs::bscc`].
    pub fn bscc_weights(&self) -> &[f64] {
        &self.bscc_weights
    }

    /// The long-run probability of every state.
    pub fn distribution(&self) -> &[f64] {
        &self.distribution
    }

    /// Iterations spent in power iteration and absorption sweeps.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn into_distribution(self) -> Vec<f64> {
        self.distribution
    }
}

pub struct SteadyStateSolver {
    config: SolverConfig,
    phase: Phase,
}

impl SteadyStateSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            phase: Phase::NotStarted,
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Phase reached by the last run.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, next: Phase) {
        debug!("steady state: {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Steady state from the uniform distribution over the initial states.
    pub fn compute<M: Model + ?Sized>(&mut self, model: &M) -> Result<SteadyStateSolution> {
        let initial = model.initial_states();
        if initial.is_empty() {
            return Err(ModelError::InvalidDimensions("model has no initial states".to_string()));
        }
        let mass = 1.0 / initial.len() as f64;
        let mut distribution = vec![0.0; model.num_states()];
        for s in initial.iter() {
            distribution[s] = mass;
        }
        self.compute_from(model, &distribution)
    }

    /// Steady state from the given initial distribution.
    pub fn compute_from<M: Model + ?Sized>(&mut self, model: &M, initial: &[f64]) -> Result<SteadyStateSolution> {
        self.phase = Phase::NotStarted;
        if model.model_type().is_nondeterministic() {
            return Err(ModelError::Unsupported {
                model_type: model.model_type().to_string(),
                operation: "steady-state probabilities",
            });
        }
        let n = model.num_states();
        if initial.len() != n {
            return Err(ModelError::InvalidDimensions(format!(
                "initial distribution of length {} for {} states",
                initial.len(),
                n
            )));
        }

        self.enter(Phase::ScanningSccs);
        let support: StateSet = (0..n).filter(|&s| initial[s] > 0.0).collect();
        let reach = post_star(model, &support);
        let mut probs = SteadyStateProbs::new(n);
        let mut iterations = 0;
        SccComputer::over(model, reach.clone()).for_each_bscc(|members| {
            self.enter(Phase::LocalSolve(probs.num_bsccs()));
            let (local, used) = self.local_solve(model, members)?;
            iterations += used;
            probs.add_bscc(members, &local)?;
            Ok(())
        })?;

        self.enter(Phase::Combine);
        let bscc_weights = if probs.num_bsccs() == 1 {
            vec![initial.iter().sum::<f64>()]
        } else {
            let (weights, used) = self.absorption(model, &probs, &reach, initial)?;
            iterations += used;
            weights
        };
        let mut distribution = vec![0.0; n];
        let local = probs.steady_state_probabilities();
        for (index, &weight) in bscc_weights.iter().enumerate() {
            for &s in probs.bscc_members(index) {
                distribution[s] = weight * local[s];
            }
        }

        self.enter(Phase::Done);
        info!(
            "steady state: {} BSCCs, {} iterations",
            probs.num_bsccs(),
            iterations
        );
        Ok(SteadyStateSolution {
            probs,
            bscc_weights,
            distribution,
            iterations,
        })
    }

    /// Local stationary vector of the BSCC with ascending `members`, in the
    /// same order.
    fn local_solve<M: Model + ?Sized>(&self, model: &M, members: &[usize]) -> Result<(Vec<f64>, usize)> {
        if members.len() == 1 {
            return Ok((vec![1.0], 0));
        }
        if !self.config.use_gauss(members.len()) {
            let bscc: StateSet = members.iter().copied().collect();
            let (full, used) = power_stationary(
                model,
                &bscc,
                self.config.termination,
                self.config.epsilon,
                self.config.max_iterations,
            )?;
            return Ok((members.iter().map(|&s| full[s]).collect(), used));
        }

        // rates are uniformised; a DTMC is used as is
        let q = if model.model_type().is_continuous_time() {
            let max_rate = members
                .iter()
                .map(|&s| off_diagonal_rate(model, s))
                .fold(0.0, f64::max);
            UNIFORMISATION_FACTOR * max_rate
        } else {
            1.0
        };
        let k = members.len();
        let mut p = vec![vec![0.0; k]; k];
        for (i, &s) in members.iter().enumerate() {
            let mut off_diagonal = 0.0;
            for (t, w) in model.transitions(s, 0) {
                if t == s {
                    continue;
                }
                if let Ok(j) = members.binary_search(&t) {
                    p[i][j] += w / q;
                    off_diagonal += w / q;
                }
            }
            p[i][i] = 1.0 - off_diagonal;
        }
        trace!("dense local system of {} states", k);
        Ok((stationary_dense(&p)?, 0))
    }

    /// Probability of ending up in each BSCC of `probs`, starting from
    /// `initial`.
    ///
    /// Solves for the expected number of visits to the transient states of
    /// `reach` in the embedded jump chain (self loops removed), then sums
    /// the flow from those states into every BSCC. One pass covers all
    /// BSCCs at once.
    fn absorption<M: Model + ?Sized>(
        &self,
        model: &M,
        probs: &SteadyStateProbs,
        reach: &StateSet,
        initial: &[f64],
    ) -> Result<(Vec<f64>, usize)> {
        let n = model.num_states();
        let mut bscc_of = vec![usize::MAX; n];
        let mut weights = vec![0.0; probs.num_bsccs()];
        for (index, weight) in weights.iter_mut().enumerate() {
            for &s in probs.bscc_members(index) {
                bscc_of[s] = index;
                *weight += initial[s];
            }
        }
        let transient: Vec<usize> = reach.iter().filter(|&s| bscc_of[s] == usize::MAX).collect();
        debug!(
            "absorption: {} transient states, {} BSCCs",
            transient.len(),
            weights.len()
        );
        if transient.is_empty() {
            return Ok((weights, 0));
        }

        let rates: Vec<f64> = transient.iter().map(|&s| off_diagonal_rate(model, s)).collect();
        let absolute = self.config.termination.is_absolute();
        let mut visits = vec![0.0; n];
        let mut next = vec![0.0; n];
        let mut converged = 0;
        for iteration in 1..=self.config.max_iterations {
            for &s in &transient {
                next[s] = initial[s];
            }
            for (&s, &rate) in transient.iter().zip(&rates) {
                if visits[s] == 0.0 || rate == 0.0 {
                    continue;
                }
                for (t, w) in model.transitions(s, 0) {
                    if t != s && bscc_of[t] == usize::MAX {
                        next[t] += visits[s] * w / rate;
                    }
                }
            }
            let mut max_diff = 0.0;
            for &s in &transient {
                let diff = difference(visits[s], next[s], absolute);
                if diff > max_diff {
                    max_diff = diff;
                }
            }
            std::mem::swap(&mut visits, &mut next);
            trace!("absorption sweep {}: max diff {}", iteration, max_diff);
            if max_diff < self.config.epsilon {
                converged = iteration;
                break;
            }
        }
        if converged == 0 {
            return Err(ModelError::NotConverged {
                iterations: self.config.max_iterations,
            });
        }

        for (&s, &rate) in transient.iter().zip(&rates) {
            if rate == 0.0 {
                continue;
            }
            for (t, w) in model.transitions(s, 0) {
                if t != s && bscc_of[t] != usize::MAX {
                    weights[bscc_of[t]] += visits[s] * w / rate;
                }
            }
        }
        Ok((weights, converged))
    }
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

    fn set(states: &[usize]) -> StateSet {
        states.iter().copied().collect()
    }

    #[test]
    fn test_probs_storage() {
        let mut probs = SteadyStateProbs::new(5);
        assert_eq!(probs.add_bscc(&[1, 3], &[0.25, 0.75]).unwrap(), 0);
        assert_eq!(probs.add_bscc(&[4], &[1.0]).unwrap(), 1);
        assert!(probs.add_bscc(&[0], &[0.5, 0.5]).is_err());
        assert!(matches!(
            probs.add_bscc(&[7], &[1.0]),
            Err(ModelError::StateOutOfBounds { state: 7, .. })
        ));
        assert_eq!(probs.num_bsccs(), 2);
        assert_eq!(probs.bscc(0), set(&[1, 3]));
        assert_eq!(probs.bscc_members(1), &[4]);
        assert_eq!(probs.bsccs().collect::<Vec<_>>(), vec![set(&[1, 3]), set(&[4])]);
        assert_eq!(probs.bscc_states(), set(&[1, 3, 4]));
        assert_eq!(probs.non_bscc_states(), set(&[0, 2]));
        assert_eq!(probs.steady_state_probabilities(), &[0.0, 0.25, 0.0, 0.75, 1.0]);
        probs.trim_to_size();
        assert_eq!(probs.num_bsccs(), 2);
        probs.clear();
        assert_eq!(probs.num_bsccs(), 0);
        assert!(probs.steady_state_probabilities().is_empty());
    }

    #[test]
    fn test_absorbing_chain() {
        // 0 -> 1 -> 2, 2 absorbing
        let mut m = SimpleModel::new(ModelType::Dtmc, 3);
        m.add_initial_state(0).unwrap();
        m.set_probability(0, 1, 1.0).unwrap();
        m.set_probability(1, 2, 1.0).unwrap();
        m.set_probability(2, 2, 1.0).unwrap();
        let mut solver = SteadyStateSolver::new(SolverConfig::default());
        let solution = solver.compute(&m).unwrap();
        assert_eq!(solution.distribution(), &[0.0, 0.0, 1.0]);
        assert_eq!(solver.phase(), Phase::Done);
    }

    /// 0 -> {1: 0.3, 3: 0.7}; {1, 2} cycle with 1 -> {1: 0.5, 2: 0.5}, 2 -> 1;
    /// 3 absorbing.
    fn two_bsccs() -> SimpleModel {
        let mut m = SimpleModel::new(ModelType::Dtmc, 4);
        m.add_initial_state(0).unwrap();
        m.set_probability(0, 1, 0.3).unwrap();
        m.set_probability(0, 3, 0.7).unwrap();
        m.set_probability(1, 1, 0.5).unwrap();
        m.set_probability(1, 2, 0.5).unwrap();
        m.set_probability(2, 1, 1.0).unwrap();
        m.set_probability(3, 3, 1.0).unwrap();
        m
    }

    #[test]
    fn test_weighted_bsccs() {
        for method in [LocalMethod::Gauss, LocalMethod::Power] {
            let config = SolverConfig::default().with_method(method).with_epsilon(1e-12);
            let solution = SteadyStateSolver::new(config).compute(&two_bsccs()).unwrap();
            let pi = solution.distribution();
            assert!(approx_eq(pi[0], 0.0, 1e-9));
            assert!(approx_eq(pi[1], 0.3 * 2.0 / 3.0, 1e-9));
            assert!(approx_eq(pi[2], 0.3 / 3.0, 1e-9));
            assert!(approx_eq(pi[3], 0.7, 1e-9));
            assert!(approx_eq(pi.iter().sum::<f64>(), 1.0, 1e-9));
            assert_eq!(solution.probs().num_bsccs(), 2);
        }
    }

    #[test]
    fn test_initial_distribution() {
        let mut solver = SteadyStateSolver::new(SolverConfig::default());
        let solution = solver.compute_from(&two_bsccs(), &[0.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(solution.distribution(), &[0.0, 0.0, 0.0, 1.0]);
        assert!(solver.compute_from(&two_bsccs(), &[1.0]).is_err());
    }

    #[test]
    fn test_ctmc() {
        // 0 -> 1 at rate 2, 1 -> 0 at rate 1
        let mut m = SimpleModel::new(ModelType::Ctmc, 2);
        m.add_initial_state(0).unwrap();
        m.set_probability(0, 1, 2.0).unwrap();
        m.set_probability(1, 0, 1.0).unwrap();
        let solution = SteadyStateSolver::new(SolverConfig::default()).compute(&m).unwrap();
        assert!(approx_eq(solution.distribution()[0], 1.0 / 3.0, 1e-9));
        assert!(approx_eq(solution.distribution()[1], 2.0 / 3.0, 1e-9));
    }

    #[test]
    fn test_fan_out_to_many_absorbing_states() {
        let n = 4_000;
        let total = (n * (n - 1) / 2) as f64;
        let mut m = SimpleModel::new(ModelType::Dtmc, n);
        m.add_initial_state(0).unwrap();
        for s in 1..n {
            m.set_probability(0, s, s as f64 / total).unwrap();
            m.set_probability(s, s, 1.0).unwrap();
        }
        let mut solver = SteadyStateSolver::new(SolverConfig::default());
        let solution = solver.compute(&m).unwrap();
        assert_eq!(solution.probs().num_bsccs(), n - 1);
        assert_eq!(solution.bscc_weights().len(), n - 1);
        let pi = solution.distribution();
        assert_eq!(pi[0], 0.0);
        for s in [1, 2, n / 2, n - 1] {
            assert!(approx_eq(pi[s], s as f64 / total, 1e-12));
        }
        assert!(approx_eq(pi.iter().sum::<f64>(), 1.0, 1e-9));
        assert!(solution.iterations() <= 2);
    }

    #[test]
    fn test_absorption_through_transient_cycle() {
        // 0 -> {1: 0.5, 2: 0.5}; 1 -> {0: 0.25, 1: 0.5, 3: 0.25}; 2, 3 absorbing
        let mut m = SimpleModel::new(ModelType::Dtmc, 4);
        m.add_initial_state(0).unwrap();
        m.set_probability(0, 1, 0.5).unwrap();
        m.set_probability(0, 2, 0.5).unwrap();
        m.set_probability(1, 0, 0.25).unwrap();
        m.set_probability(1, 1, 0.5).unwrap();
        m.set_probability(1, 3, 0.25).unwrap();
        m.set_probability(2, 2, 1.0).unwrap();
        m.set_probability(3, 3, 1.0).unwrap();
        let config = SolverConfig::default().with_epsilon(1e-12);
        let solution = SteadyStateSolver::new(config).compute(&m).unwrap();
        // x = 1/2 + 1/4 x
        let pi = solution.distribution();
        assert!(approx_eq(pi[2], 2.0 / 3.0, 1e-9));
        assert!(approx_eq(pi[3], 1.0 / 3.0, 1e-9));
        assert_eq!(solution.bscc_weights().len(), 2);
    }

    #[test]
    fn test_local_failure_is_fatal() {
        // stationary vector (5/6, 1/6) is not reached from the uniform start in one step
        let mut m = SimpleModel::new(ModelType::Dtmc, 2);
        m.add_initial_state(0).unwrap();
        m.set_probability(0, 0, 0.9).unwrap();
        m.set_probability(0, 1, 0.1).unwrap();
        m.set_probability(1, 0, 0.5).unwrap();
        m.set_probability(1, 1, 0.5).unwrap();
        let config = SolverConfig::default()
            .with_method(LocalMethod::Power)
            .with_max_iterations(1);
        let mut solver = SteadyStateSolver::new(config);
        assert!(matches!(
            solver.compute(&m),
            Err(ModelError::NotConverged { iterations: 1 })
        ));
        assert_eq!(solver.phase(), Phase::LocalSolve(0));

        // the same chain solves with room to iterate
        let config = SolverConfig::default().with_method(LocalMethod::Power).with_epsilon(1e-12);
        let solution = SteadyStateSolver::new(config.with_max_iterations(100_000)).compute(&m).unwrap();
        assert!(approx_eq(solution.distribution()[0], 5.0 / 6.0, 1e-9));
    }

    #[test]
    fn test_mdp_unsupported() {
        let mut m = SimpleModel::new(ModelType::Mdp, 1);
        m.add_initial_state(0).unwrap();
        let mut solver = SteadyStateSolver::new(SolverConfig::default());
        assert!(matches!(solver.compute(&m), Err(ModelError::Unsupported { .. })));
        assert_eq!(solver.phase(), Phase::NotStarted);
    }
}
