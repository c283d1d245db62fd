//! Matrix-vector kernels and fixpoint steps.
//!
//! The functions here are the generic implementations behind the provided
//! kernel methods of [`Model`]; they walk [`Model::transitions`] and work for
//! every representation. The MDP kernels (min/max over choices) are free
//! functions only.
//!
//! No tolerance is applied anywhere in this module: comparisons against a
//! convergence threshold belong to the caller.

use crate::bitset::StateSet;
use crate::model::Model;

/// Per-state rewards for the reward variants of the kernels.
pub trait StateRewards {
    fn state_reward(&self, state: usize) -> f64;
}

impl StateRewards for Vec<f64> {
    fn state_reward(&self, state: usize) -> f64 {
        self[state]
    }
}

/// The same reward in every state.
impl StateRewards for f64 {
    fn state_reward(&self, _state: usize) -> f64 {
        *self
    }
}

/// States of `0..num_states` selected by `subset` (all if `None`), or the
/// ones not in `subset` when `complement` is set. Increasing order.
pub fn selected_states(
    num_states: usize,
    subset: Option<&StateSet>,
    complement: bool,
) -> impl Iterator<Item = usize> + '_ {
    (0..num_states).filter(move |&s| match subset {
        None => true,
        Some(set) => set.contains(s) != complement,
    })
}

/// Change between two iterates, `|new - old|` or `|new - old| / new`.
#[inline]
pub fn difference(old: f64, new: f64, absolute: bool) -> f64 {
    if absolute {
        (new - old).abs()
    } else {
        (new - old).abs() / new
    }
}

/// `Σ w·vect[t]` over the transitions of `choice`.
pub fn mv_mult_single<M: Model + ?Sized>(model: &M, state: usize, choice: usize, vect: &[f64]) -> f64 {
    model.transitions(state, choice).map(|(t, w)| w * vect[t]).sum()
}

fn jacobi<M: Model + ?Sized>(model: &M, state: usize, choice: usize, vect: &[f64], init: f64) -> f64 {
    let mut diag = 1.0;
    let mut d = init;
    let mut count = 0;
    let mut only_self_loop = true;
    for (target, weight) in model.transitions(state, choice) {
        count += 1;
        if target != state {
            only_self_loop = false;
            d += weight * vect[target];
        } else {
            diag -= weight;
        }
    }
    // a deterministic self loop never reaches anything else
    if count == 1 && only_self_loop && diag == 0.0 {
        return f64::INFINITY;
    }
    if diag > 0.0 {
        d /= diag;
    }
    d
}

/// Jacobi step: the self-loop weight is moved to `diag = 1 - p(s,s)` and the
/// weighted sum over the other targets is divided by it.
///
/// A non-positive `diag` leaves the sum unnormalized. A state whose only
/// transition is a self loop yields `+∞`.
pub fn mv_mult_jac_single<M: Model + ?Sized>(model: &M, state: usize, choice: usize, vect: &[f64]) -> f64 {
    jacobi(model, state, choice, vect, 0.0)
}

/// Reward analogue of [`mv_mult_jac_single`]; the state reward is added
/// before dividing by the diagonal.
pub fn mv_mult_rew_jac_single<M: Model + ?Sized>(
    model: &M,
    state: usize,
    choice: usize,
    vect: &[f64],
    rewards: &dyn StateRewards,
) -> f64 {
    jacobi(model, state, choice, vect, rewards.state_reward(state))
}

/// `result = vect · P`, reading choice 0 of every state.
pub fn vm_mult<M: Model + ?Sized>(model: &M, vect: &[f64], result: &mut [f64]) {
    result.iter_mut().for_each(|r| *r = 0.0);
    for state in 0..model.num_states() {
        for (target, weight) in model.transitions(state, 0) {
            result[target] += weight * vect[state];
        }
    }
}

/// One step of power iteration for the steady state of a CTMC-like matrix
/// restricted to `states`: `result = vect · (I + Δt·Q)`, where `diags_q[s]`
/// holds `Q(s,s)` and the off-diagonal entries are the transitions.
pub fn vm_mult_power_steady_state<M: Model + ?Sized>(
    model: &M,
    vect: &[f64],
    result: &mut [f64],
    diags_q: &[f64],
    delta_t: f64,
    states: &StateSet,
) {
    for state in states.iter() {
        result[state] = vect[state] * (delta_t * diags_q[state] + 1.0);
    }
    for state in states.iter() {
        for (target, weight) in model.transitions(state, 0) {
            if target != state {
                result[target] += delta_t * weight * vect[state];
            }
        }
    }
}

// MDP kernels.

fn better(min: bool, candidate: f64, current: f64) -> bool {
    if min {
        candidate < current
    } else {
        candidate > current
    }
}

/// Min (or max) over the choices of `state` of `Σ w·vect[t]`, with the
/// first choice attaining it. A state without choices yields `(0.0, None)`.
pub fn mv_mult_min_max_single<M: Model + ?Sized>(
    model: &M,
    state: usize,
    vect: &[f64],
    min: bool,
) -> (f64, Option<usize>) {
    let mut best: Option<(f64, usize)> = None;
    for choice in 0..model.num_choices(state) {
        let d = mv_mult_single(model, state, choice, vect);
        match best {
            Some((value, _)) if !better(min, d, value) => {}
            _ => best = Some((d, choice)),
        }
    }
    match best {
        Some((value, choice)) => (value, Some(choice)),
        None => (0.0, None),
    }
}

/// Applies [`mv_mult_min_max_single`] to the selected states, recording the
/// optimal choices in `strategy` if given.
pub fn mv_mult_min_max<M: Model + ?Sized>(
    model: &M,
    vect: &[f64],
    min: bool,
    result: &mut [f64],
    subset: Option<&StateSet>,
    complement: bool,
    mut strategy: Option<&mut [Option<usize>]>,
) {
    for state in selected_states(model.num_states(), subset, complement) {
        let (value, choice) = mv_mult_min_max_single(model, state, vect, min);
        result[state] = value;
        if let Some(strategy) = strategy.as_deref_mut() {
            strategy[state] = choice;
        }
    }
}

/// Min (or max) over the choices of `state` of the Jacobi step.
pub fn mv_mult_jac_min_max_single<M: Model + ?Sized>(model: &M, state: usize, vect: &[f64], min: bool) -> f64 {
    let mut best: Option<f64> = None;
    for choice in 0..model.num_choices(state) {
        let d = mv_mult_jac_single(model, state, choice, vect);
        match best {
            Some(value) if !better(min, d, value) => {}
            _ => best = Some(d),
        }
    }
    best.unwrap_or(0.0)
}

/// In-place Gauss-Seidel sweep with min (or max) over choices. Returns the
/// largest change.
pub fn mv_mult_gs_min_max<M: Model + ?Sized>(
    model: &M,
    vect: &mut [f64],
    min: bool,
    subset: Option<&StateSet>,
    complement: bool,
    absolute: bool,
) -> f64 {
    let mut max_diff = 0.0;
    for state in selected_states(model.num_states(), subset, complement) {
        let d = mv_mult_jac_min_max_single(model, state, vect, min);
        let diff = difference(vect[state], d, absolute);
        if diff > max_diff {
            max_diff = diff;
        }
        vect[state] = d;
    }
    max_diff
}

fn quantify(forall: bool, mut values: impl Iterator<Item = bool>) -> bool {
    if forall {
        values.all(|b| b)
    } else {
        values.any(|b| b)
    }
}

/// Marks `s ∈ subset` in `result` iff some successor is in `u` for all
/// choices (`forall`) or for some choice.
pub fn prob0step_mdp<M: Model + ?Sized>(model: &M, subset: &StateSet, u: &StateSet, forall: bool, result: &mut StateSet) {
    for state in subset.iter() {
        let value = quantify(
            forall,
            (0..model.num_choices(state)).map(|c| model.some_successors_in_set(state, c, u)),
        );
        result.set(state, value);
    }
}

/// Marks `s ∈ subset` in `result` iff, for all choices (`forall`) or for
/// some choice, all successors are in `u` and some successor is in `v`.
pub fn prob1step_mdp<M: Model + ?Sized>(
    model: &M,
    subset: &StateSet,
    u: &StateSet,
    v: &StateSet,
    forall: bool,
    result: &mut StateSet,
) {
    for state in subset.iter() {
        let value = quantify(
            forall,
            (0..model.num_choices(state))
                .map(|c| model.all_successors_in_set(state, c, u) && model.some_successors_in_set(state, c, v)),
        );
        result.set(state, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple::{MutableModel, SimpleModel};
    use crate::types::ModelType;
    use test_log::test;

    fn chain() -> SimpleModel {
        // 0 -> {1: 0.5, 2: 0.5}, 1 -> {1: 0.5, 2: 0.5}, 2 -> {2: 1}
        let mut m = SimpleModel::new(ModelType::Dtmc, 3);
        m.set_probability(0, 1, 0.5).unwrap();
        m.set_probability(0, 2, 0.5).unwrap();
        m.set_probability(1, 1, 0.5).unwrap();
        m.set_probability(1, 2, 0.5).unwrap();
        m.set_probability(2, 2, 1.0).unwrap();
        m
    }

    fn mdp() -> SimpleModel {
        // state 0: a -> {1}, b -> {0: 0.5, 2: 0.5}; states 1, 2 absorbing
        let mut m = SimpleModel::new(ModelType::Mdp, 3);
        m.add_choice(0, [(1, 1.0)].into_iter().collect()).unwrap();
        m.add_choice(0, [(0, 0.5), (2, 0.5)].into_iter().collect()).unwrap();
        m.add_choice(1, [(1, 1.0)].into_iter().collect()).unwrap();
        m.add_choice(2, [(2, 1.0)].into_iter().collect()).unwrap();
        m
    }

    #[test]
    fn test_mv_mult_single() {
        let m = chain();
        let vect = [0.0, 2.0, 4.0];
        assert_eq!(m.mv_mult_single(0, &vect), 3.0);
        assert_eq!(m.mv_mult_single(2, &vect), 4.0);
    }

    #[test]
    fn test_jacobi_divides_by_diagonal() {
        let m = chain();
        let vect = [0.0, 0.0, 1.0];
        // (0.5 * 1) / (1 - 0.5)
        assert_eq!(m.mv_mult_jac_single(1, &vect), 1.0);
        // no self loop: plain sum
        assert_eq!(m.mv_mult_jac_single(0, &vect), 0.5);
    }

    #[test]
    fn test_jacobi_single_self_loop_is_infinite() {
        let m = chain();
        assert_eq!(m.mv_mult_jac_single(2, &[0.0, 0.0, 1.0]), f64::INFINITY);
        assert_eq!(m.mv_mult_rew_jac_single(2, &[0.0; 3], &1.0), f64::INFINITY);
    }

    #[test]
    fn test_jacobi_substochastic_self_loop_is_finite() {
        // a lone self loop that lost mass, as in a restricted view
        let mut m = SimpleModel::new(ModelType::Dtmc, 2);
        m.set_probability(0, 0, 0.5).unwrap();
        assert_eq!(m.mv_mult_jac_single(0, &[3.0, 1.0]), 0.0);
        assert_eq!(m.mv_mult_rew_jac_single(0, &[3.0, 1.0], &vec![1.0, 0.0]), 2.0);
    }

    #[test]
    fn test_jacobi_zero_diagonal_left_unnormalized() {
        // self loop of weight 1 plus another entry: diag is 0
        let mut m = SimpleModel::new(ModelType::Dtmc, 2);
        m.set_probability(0, 0, 1.0).unwrap();
        m.set_probability(0, 1, 0.25).unwrap();
        assert_eq!(m.mv_mult_jac_single(0, &[0.0, 2.0]), 0.5);
    }

    #[test]
    fn test_rewards() {
        let m = chain();
        let rewards = vec![1.0, 2.0, 0.0];
        assert_eq!(m.mv_mult_rew_single(0, &[0.0, 2.0, 4.0], &rewards), 4.0);
        // (2 + 0.5 * 4) / 0.5
        assert_eq!(m.mv_mult_rew_jac_single(1, &[0.0, 0.0, 4.0], &rewards), 8.0);
    }

    #[test]
    fn test_gauss_seidel_in_increasing_order() {
        let m = chain();
        let target: StateSet = [2].into_iter().collect();
        let mut vect = vec![0.0, 0.0, 1.0];
        let diff = m.mv_mult_gs(&mut vect, Some(&target), true, true);
        // state 0 is swept before state 1, so it still sees vect[1] = 0
        assert_eq!(vect, vec![0.5, 1.0, 1.0]);
        assert_eq!(diff, 1.0);
        let diff = m.mv_mult_gs(&mut vect, Some(&target), true, true);
        assert_eq!(vect, vec![1.0, 1.0, 1.0]);
        assert_eq!(diff, 0.5);
        let diff = m.mv_mult_gs(&mut vect, Some(&target), true, true);
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_gauss_seidel_relative_difference() {
        let m = chain();
        let target: StateSet = [2].into_iter().collect();
        let mut vect = vec![0.5, 0.5, 1.0];
        // state 0: 0.5*0.5 + 0.5 = 0.75; state 1: 0.5 / 0.5 = 1.0
        let diff = m.mv_mult_gs(&mut vect, Some(&target), true, false);
        assert_eq!(vect[0], 0.75);
        assert_eq!(vect[1], 1.0);
        assert_eq!(diff, 0.5);
    }

    #[test]
    fn test_mv_mult_subset() {
        let m = chain();
        let only0: StateSet = [0].into_iter().collect();
        let mut result = vec![-1.0; 3];
        m.mv_mult(&[1.0, 1.0, 1.0], &mut result, Some(&only0), false);
        assert_eq!(result, vec![1.0, -1.0, -1.0]);
        m.mv_mult(&[1.0, 1.0, 1.0], &mut result, Some(&only0), true);
        assert_eq!(result, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_vm_mult() {
        let m = chain();
        let mut result = vec![9.0; 3];
        m.vm_mult(&[1.0, 0.0, 0.0], &mut result);
        assert_eq!(result, vec![0.0, 0.5, 0.5]);
    }

    #[test]
    fn test_prob_steps() {
        let m = chain();
        let all = StateSet::full(3);
        let u: StateSet = [2].into_iter().collect();
        let mut result = StateSet::empty();
        m.prob0step(&all, &u, &mut result);
        assert_eq!(result, all);

        let only1: StateSet = [1].into_iter().collect();
        m.prob1step(&all, &u, &u, &mut result);
        // state 2 only; states 0, 1 have successors outside u
        assert_eq!(result, [2].into_iter().collect());
        let u12: StateSet = [1, 2].into_iter().collect();
        m.prob1step(&all, &u12, &only1, &mut result);
        assert_eq!(result, [0, 1].into_iter().collect());
    }

    #[test]
    fn test_min_max() {
        let m = mdp();
        let vect = [0.0, 1.0, 0.0];
        assert_eq!(mv_mult_min_max_single(&m, 0, &vect, false), (1.0, Some(0)));
        assert_eq!(mv_mult_min_max_single(&m, 0, &vect, true), (0.0, Some(1)));

        let mut result = vec![0.0; 3];
        let mut strategy = vec![None; 3];
        mv_mult_min_max(&m, &vect, true, &mut result, None, false, Some(&mut strategy));
        assert_eq!(strategy, vec![Some(1), Some(0), Some(0)]);
    }

    #[test]
    fn test_gs_min_max() {
        let m = mdp();
        let target: StateSet = [1, 2].into_iter().collect();
        let mut vect = vec![0.0, 0.0, 1.0];
        // reach 2: max is choice b, jacobi (0.5 * 1) / 0.5 = 1
        mv_mult_gs_min_max(&m, &mut vect, false, Some(&target), true, true);
        assert_eq!(vect[0], 1.0);
        let mut vect = vec![0.0, 0.0, 1.0];
        mv_mult_gs_min_max(&m, &mut vect, true, Some(&target), true, true);
        assert_eq!(vect[0], 0.0);
    }

    #[test]
    fn test_mdp_prob_steps() {
        let m = mdp();
        let subset: StateSet = [0].into_iter().collect();
        let u: StateSet = [2].into_iter().collect();
        let mut result = StateSet::empty();
        prob0step_mdp(&m, &subset, &u, false, &mut result);
        assert!(result.contains(0));
        prob0step_mdp(&m, &subset, &u, true, &mut result);
        assert!(!result.contains(0));

        let u02: StateSet = [0, 2].into_iter().collect();
        prob1step_mdp(&m, &subset, &u02, &u, false, &mut result);
        assert!(result.contains(0));
        prob1step_mdp(&m, &subset, &u02, &u, true, &mut result);
        assert!(!result.contains(0));
    }
}
