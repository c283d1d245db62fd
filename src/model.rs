//! The read-only model contract shared by every representation.
//!
//! A [`Model`] is a finite transition system over dense state indices
//! `0..num_states()`. Markov chains (DTMC, CTMC) have exactly one choice per
//! state, choice `0`, whose distribution is empty for a deadlock. MDP states
//! have any number of choices; a deadlock has none, or only empty ones.
//!
//! The numeric kernels are provided methods: the defaults in [`kernels`]
//! walk [`Model::transitions`], and representations with direct access to
//! their arrays (see [`SparseModel`][crate::sparse::SparseModel]) override
//! them.
//!
//! [`kernels`]: crate::kernels

use std::collections::BTreeSet;

use crate::bitset::StateSet;
use crate::distribution::Distribution;
use crate::error::{ModelError, Result};
use crate::kernels::{self, StateRewards};
use crate::types::{ModelType, Valuation, VarList};

/// Iterator over the `(target, weight)` pairs of one choice.
pub type Transitions<'a> = Box<dyn Iterator<Item = (usize, f64)> + 'a>;

/// Tolerance used by [`Model::check_stochastic`] when none is given.
pub const DEFAULT_STOCHASTIC_TOLERANCE: f64 = 1e-12;

pub trait Model {
    fn model_type(&self) -> ModelType;

    fn num_states(&self) -> usize;

    fn initial_states(&self) -> StateSet;

    fn is_initial_state(&self, state: usize) -> bool {
        self.initial_states().contains(state)
    }

    fn num_initial_states(&self) -> usize {
        self.initial_states().len()
    }

    fn first_initial_state(&self) -> Option<usize> {
        self.initial_states().first()
    }

    /// States without any outgoing transition, together with the deadlocks
    /// recorded (and possibly fixed) by [`find_deadlocks`](Model::find_deadlocks).
    fn deadlock_states(&self) -> StateSet {
        structural_deadlocks(self)
    }

    fn is_deadlock_state(&self, state: usize) -> bool {
        self.deadlock_states().contains(state)
    }

    /// Names of all labels.
    fn labels(&self) -> BTreeSet<String>;

    /// States carrying label `name`, or `None` for an unknown label.
    fn label_states(&self, name: &str) -> Option<StateSet>;

    fn has_label(&self, name: &str) -> bool {
        self.labels().contains(name)
    }

    fn num_choices(&self, state: usize) -> usize;

    /// Iterates the transitions of `choice` in `state`.
    ///
    /// # Panics
    ///
    /// Implementations panic on a state or choice out of bounds.
    fn transitions(&self, state: usize, choice: usize) -> Transitions<'_>;

    fn num_transitions(&self, state: usize, choice: usize) -> usize {
        self.transitions(state, choice).count()
    }

    /// The distribution of `choice` in `state`, with bounds checking.
    fn distribution(&self, state: usize, choice: usize) -> Result<Distribution> {
        crate::error::check_state(state, self.num_states())?;
        let num_choices = self.num_choices(state);
        if choice >= num_choices {
            return Err(ModelError::ChoiceOutOfBounds {
                state,
                choice,
                num_choices,
            });
        }
        Ok(Distribution::from_transitions(self.transitions(state, choice)))
    }

    fn total_num_choices(&self) -> usize {
        (0..self.num_states()).map(|s| self.num_choices(s)).sum()
    }

    fn total_num_transitions(&self) -> usize {
        (0..self.num_states())
            .map(|s| (0..self.num_choices(s)).map(|c| self.num_transitions(s, c)).sum::<usize>())
            .sum()
    }

    fn max_num_choices(&self) -> usize {
        (0..self.num_states()).map(|s| self.num_choices(s)).max().unwrap_or(0)
    }

    /// Successors of `state` over all of its choices, ascending and without
    /// duplicates.
    fn successors(&self, state: usize) -> Vec<usize> {
        let mut result: Vec<usize> = (0..self.num_choices(state))
            .flat_map(|choice| self.transitions(state, choice).map(|(t, _)| t))
            .collect();
        result.sort_unstable();
        result.dedup();
        result
    }

    fn is_successor(&self, state: usize, target: usize) -> bool {
        (0..self.num_choices(state)).any(|c| self.transitions(state, c).any(|(t, _)| t == target))
    }

    fn some_successors_in_set(&self, state: usize, choice: usize, set: &StateSet) -> bool {
        self.transitions(state, choice).any(|(t, _)| set.contains(t))
    }

    fn all_successors_in_set(&self, state: usize, choice: usize, set: &StateSet) -> bool {
        self.transitions(state, choice).all(|(t, _)| set.contains(t))
    }

    fn action(&self, _state: usize, _choice: usize) -> Option<String> {
        None
    }

    fn var_list(&self) -> Option<&VarList> {
        None
    }

    fn state_valuation(&self, _state: usize) -> Option<Valuation> {
        None
    }

    /// Records the deadlock states; with `fix`, adds a self loop to each.
    ///
    /// Fixing is the one sanctioned mutation of a model and can happen at
    /// most once.
    fn find_deadlocks(&mut self, fix: bool) -> Result<StateSet>;

    /// Fails with [`ModelError::Deadlock`] on the first state without any
    /// outgoing transition that is not in `except`.
    fn check_for_deadlocks(&self, except: Option<&StateSet>) -> Result<()> {
        for state in 0..self.num_states() {
            if except.is_some_and(|e| e.contains(state)) {
                continue;
            }
            if is_structural_deadlock(self, state) {
                return Err(ModelError::Deadlock {
                    model_type: self.model_type().to_string(),
                    state,
                });
            }
        }
        Ok(())
    }

    /// Checks that every non-empty choice of a DTMC or MDP sums to one
    /// within `tolerance`. Rates of a CTMC are not checked.
    fn check_stochastic(&self, tolerance: f64) -> Result<()> {
        if self.model_type().is_continuous_time() {
            return Ok(());
        }
        for state in 0..self.num_states() {
            for choice in 0..self.num_choices(state) {
                let mut nonempty = false;
                let mut sum = 0.0;
                for (_, w) in self.transitions(state, choice) {
                    nonempty = true;
                    sum += w;
                }
                if nonempty && (sum - 1.0).abs() > tolerance {
                    return Err(ModelError::NotStochastic { state, choice, sum });
                }
            }
        }
        Ok(())
    }

    /// One-line summary: `"<n> states (<k> initial), <t> transitions"`.
    fn info_string(&self) -> String {
        let mut s = format!(
            "{} states ({} initial), {} transitions",
            self.num_states(),
            self.num_initial_states(),
            self.total_num_transitions()
        );
        if self.model_type().is_nondeterministic() {
            s.push_str(&format!(", {} choices", self.total_num_choices()));
        }
        s
    }

    // Markov chain kernels. All of them read choice 0.

    fn mv_mult_single(&self, state: usize, vect: &[f64]) -> f64 {
        kernels::mv_mult_single(self, state, 0, vect)
    }

    fn mv_mult_jac_single(&self, state: usize, vect: &[f64]) -> f64 {
        kernels::mv_mult_jac_single(self, state, 0, vect)
    }

    fn mv_mult_rew_single(&self, state: usize, vect: &[f64], rewards: &dyn StateRewards) -> f64 {
        rewards.state_reward(state) + self.mv_mult_single(state, vect)
    }

    fn mv_mult_rew_jac_single(&self, state: usize, vect: &[f64], rewards: &dyn StateRewards) -> f64 {
        kernels::mv_mult_rew_jac_single(self, state, 0, vect, rewards)
    }

    /// `result[s] = Σ P(s,t)·vect[t]` for the selected states.
    fn mv_mult(&self, vect: &[f64], result: &mut [f64], subset: Option<&StateSet>, complement: bool) {
        for state in kernels::selected_states(self.num_states(), subset, complement) {
            result[state] = self.mv_mult_single(state, vect);
        }
    }

    fn mv_mult_rew(
        &self,
        vect: &[f64],
        rewards: &dyn StateRewards,
        result: &mut [f64],
        subset: Option<&StateSet>,
        complement: bool,
    ) {
        for state in kernels::selected_states(self.num_states(), subset, complement) {
            result[state] = self.mv_mult_rew_single(state, vect, rewards);
        }
    }

    /// One in-place Gauss-Seidel sweep in increasing state order.
    /// Returns the largest (absolute or relative) change.
    fn mv_mult_gs(&self, vect: &mut [f64], subset: Option<&StateSet>, complement: bool, absolute: bool) -> f64 {
        let mut max_diff = 0.0;
        for state in kernels::selected_states(self.num_states(), subset, complement) {
            let d = self.mv_mult_jac_single(state, vect);
            let diff = kernels::difference(vect[state], d, absolute);
            if diff > max_diff {
                max_diff = diff;
            }
            vect[state] = d;
        }
        max_diff
    }

    fn mv_mult_rew_gs(
        &self,
        vect: &mut [f64],
        rewards: &dyn StateRewards,
        subset: Option<&StateSet>,
        complement: bool,
        absolute: bool,
    ) -> f64 {
        let mut max_diff = 0.0;
        for state in kernels::selected_states(self.num_states(), subset, complement) {
            let d = self.mv_mult_rew_jac_single(state, vect, rewards);
            let diff = kernels::difference(vect[state], d, absolute);
            if diff > max_diff {
                max_diff = diff;
            }
            vect[state] = d;
        }
        max_diff
    }

    /// `result = vect · P`.
    fn vm_mult(&self, vect: &[f64], result: &mut [f64]) {
        kernels::vm_mult(self, vect, result)
    }

    /// Marks `s ∈ subset` in `result` iff some successor of `s` is in `u`.
    fn prob0step(&self, subset: &StateSet, u: &StateSet, result: &mut StateSet) {
        for state in subset.iter() {
            result.set(state, self.some_successors_in_set(state, 0, u));
        }
    }

    /// Marks `s ∈ subset` in `result` iff all successors of `s` are in `u`
    /// and at least one is in `v`.
    fn prob1step(&self, subset: &StateSet, u: &StateSet, v: &StateSet, result: &mut StateSet) {
        for state in subset.iter() {
            let value = self.all_successors_in_set(state, 0, u) && self.some_successors_in_set(state, 0, v);
            result.set(state, value);
        }
    }
}

/// Writes `trans: [ 0: {1: 0.1, 2: 0.9}, 1: ... ]`; MDP states list their
/// choices in brackets.
pub fn fmt_transitions<M: Model + ?Sized>(model: &M, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let nondet = model.model_type().is_nondeterministic();
    write!(f, "trans: [ ")?;
    for state in 0..model.num_states() {
        if state > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: ", state)?;
        if nondet {
            write!(f, "[")?;
        }
        for choice in 0..model.num_choices(state) {
            if choice > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", Distribution::from_transitions(model.transitions(state, choice)))?;
        }
        if nondet {
            write!(f, "]")?;
        }
    }
    write!(f, " ]")
}

/// Returns true if no choice of `state` has a transition.
pub fn is_structural_deadlock<M: Model + ?Sized>(model: &M, state: usize) -> bool {
    (0..model.num_choices(state)).all(|c| model.num_transitions(state, c) == 0)
}

/// States without any outgoing transition.
pub fn structural_deadlocks<M: Model + ?Sized>(model: &M) -> StateSet {
    let mut result = StateSet::new(model.num_states());
    for state in 0..model.num_states() {
        if is_structural_deadlock(model, state) {
            result.insert(state);
        }
    }
    result
}
