//! Immutable compressed-sparse-row encoding of a model.
//!
//! Transitions of all choices are stored in two parallel arrays, `columns`
//! (targets) and `values` (weights). Choice `c` occupies
//! `rows[c]..rows[c + 1]`, and the choices of state `s` are
//! `choice_starts[s]..choice_starts[s + 1]`. For a Markov chain every state
//! has exactly one choice, so `choice_starts` is the identity and `rows`
//! indexes states directly.
//!
//! A sparse model is built once from any other [`Model`] and never changes:
//! all editor operations fail with [`ModelError::Immutable`], and so does
//! fixing deadlocks. Fix them on the source model (or through a view) before
//! freezing.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;

use log::debug;

use crate::bitset::StateSet;
use crate::distribution::Distribution;
use crate::error::{ModelError, Result};
use crate::kernels::StateRewards;
use crate::model::{fmt_transitions, structural_deadlocks, Model, Transitions};
use crate::simple::MutableModel;
use crate::types::{ModelType, Valuation, VarList};

#[derive(Debug, Clone)]
pub struct SparseModel {
    model_type: ModelType,
    num_states: usize,
    choice_starts: Vec<usize>,
    rows: Vec<usize>,
    columns: Vec<usize>,
    values: Vec<f64>,
    actions: Option<Vec<Option<String>>>,
    initial: StateSet,
    deadlocks: StateSet,
    labels: BTreeMap<String, StateSet>,
    var_list: Option<VarList>,
    valuations: Option<Vec<Valuation>>,
}

impl SparseModel {
    /// Copies `model`, keeping only entries with a positive weight.
    pub fn from_model(model: &dyn Model) -> Self {
        let n = model.num_states();
        debug!("SparseModel::from_model({} states)", n);
        let mut result = Self::empty_like(model, n);
        result.initial = model.initial_states();
        result.deadlocks = model.deadlock_states();
        for name in model.labels() {
            if let Some(states) = model.label_states(&name) {
                result.labels.insert(name, states);
            }
        }
        let mut actions = Vec::new();
        for state in 0..n {
            for choice in 0..model.num_choices(state) {
                for (target, weight) in model.transitions(state, choice) {
                    if weight > 0.0 {
                        result.columns.push(target);
                        result.values.push(weight);
                    }
                }
                result.rows.push(result.columns.len());
                actions.push(model.action(state, choice));
            }
            result.choice_starts.push(result.rows.len() - 1);
        }
        result.set_actions(actions);
        result.valuations = collect_valuations(model, |s| s);
        result
    }

    /// Copies `model` renaming state `s` to `permutation[s]`.
    ///
    /// The permutation must be a bijection on `0..num_states`. Initial and
    /// deadlock states, labels and valuations are permuted too. Within a
    /// choice, transitions are ordered by their new target.
    pub fn from_model_permuted(model: &dyn Model, permutation: &[usize]) -> Result<Self> {
        let n = model.num_states();
        debug!("SparseModel::from_model_permuted({} states)", n);
        let inverse = invert_permutation(permutation, n)?;
        let permute = |set: StateSet| set.iter().map(|s| permutation[s]).collect::<StateSet>();

        let mut result = Self::empty_like(model, n);
        result.initial = permute(model.initial_states());
        result.deadlocks = permute(model.deadlock_states());
        for name in model.labels() {
            if let Some(states) = model.label_states(&name) {
                result.labels.insert(name, permute(states));
            }
        }
        let mut actions = Vec::new();
        for &source in &inverse {
            for choice in 0..model.num_choices(source) {
                let distribution = Distribution::from_transitions(
                    model
                        .transitions(source, choice)
                        .filter(|&(_, w)| w > 0.0)
                        .map(|(t, w)| (permutation[t], w)),
                );
                for (target, weight) in distribution {
                    result.columns.push(target);
                    result.values.push(weight);
                }
                result.rows.push(result.columns.len());
                actions.push(model.action(source, choice));
            }
            result.choice_starts.push(result.rows.len() - 1);
        }
        result.set_actions(actions);
        result.valuations = collect_valuations(model, |s| inverse[s]);
        Ok(result)
    }

    /// Builds a Markov chain from a square row-major matrix. State 0 is
    /// the initial state.
    pub fn from_dense(model_type: ModelType, matrix: &[Vec<f64>]) -> Result<Self> {
        if model_type.is_nondeterministic() {
            return Err(ModelError::Unsupported {
                model_type: model_type.to_string(),
                operation: "build from a dense matrix",
            });
        }
        let n = matrix.len();
        if let Some((row, r)) = matrix.iter().enumerate().find(|(_, r)| r.len() != n) {
            return Err(ModelError::InvalidDimensions(format!(
                "row {} has {} columns, expected {}",
                row,
                r.len(),
                n
            )));
        }
        let mut rows = vec![0];
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for row in matrix {
            for (target, &weight) in row.iter().enumerate() {
                if weight.is_nan() || weight < 0.0 {
                    return Err(ModelError::InvalidDistribution { target, weight });
                }
                if weight > 0.0 {
                    columns.push(target);
                    values.push(weight);
                }
            }
            rows.push(columns.len());
        }
        let mut model = Self {
            model_type,
            num_states: n,
            choice_starts: (0..=n).collect(),
            rows,
            columns,
            values,
            actions: None,
            initial: if n > 0 { StateSet::singleton(0) } else { StateSet::empty() },
            deadlocks: StateSet::empty(),
            labels: BTreeMap::new(),
            var_list: None,
            valuations: None,
        };
        model.deadlocks = structural_deadlocks(&model);
        Ok(model)
    }

    fn empty_like(model: &dyn Model, n: usize) -> Self {
        Self {
            model_type: model.model_type(),
            num_states: n,
            choice_starts: vec![0],
            rows: vec![0],
            columns: Vec::new(),
            values: Vec::new(),
            actions: None,
            initial: StateSet::empty(),
            deadlocks: StateSet::empty(),
            labels: BTreeMap::new(),
            var_list: model.var_list().cloned(),
            valuations: None,
        }
    }

    fn set_actions(&mut self, actions: Vec<Option<String>>) {
        if actions.iter().any(Option::is_some) {
            self.actions = Some(actions);
        }
    }

    /// Index range of `choice` of `state` in `columns`/`values`.
    #[inline]
    fn row(&self, state: usize, choice: usize) -> Range<usize> {
        let first = self.choice_starts[state];
        assert!(
            first + choice < self.choice_starts[state + 1],
            "choice {} of state {} out of bounds",
            choice,
            state
        );
        self.rows[first + choice]..self.rows[first + choice + 1]
    }

    pub fn choice_starts(&self) -> &[usize] {
        &self.choice_starts
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn jacobi(&self, state: usize, vect: &[f64], init: f64) -> f64 {
        let range = self.row(state, 0);
        if range.len() == 1 && self.columns[range.start] == state && self.values[range.start] == 1.0 {
            return f64::INFINITY;
        }
        let mut diag = 1.0;
        let mut d = init;
        for i in range {
            let target = self.columns[i];
            if target != state {
                d += self.values[i] * vect[target];
            } else {
                diag -= self.values[i];
            }
        }
        if diag > 0.0 {
            d /= diag;
        }
        d
    }
}

fn invert_permutation(permutation: &[usize], n: usize) -> Result<Vec<usize>> {
    if permutation.len() != n {
        return Err(ModelError::InvalidPermutation(format!(
            "length {} for {} states",
            permutation.len(),
            n
        )));
    }
    let mut inverse = vec![usize::MAX; n];
    for (s, &p) in permutation.iter().enumerate() {
        if p >= n {
            return Err(ModelError::InvalidPermutation(format!("state {} mapped to {}", s, p)));
        }
        if inverse[p] != usize::MAX {
            return Err(ModelError::InvalidPermutation(format!(
                "states {} and {} both mapped to {}",
                inverse[p], s, p
            )));
        }
        inverse[p] = s;
    }
    Ok(inverse)
}

fn collect_valuations(model: &dyn Model, source_of: impl Fn(usize) -> usize) -> Option<Vec<Valuation>> {
    (0..model.num_states())
        .map(|s| model.state_valuation(source_of(s)))
        .collect::<Option<Vec<_>>>()
        .filter(|v| !v.is_empty())
}

impl PartialEq for SparseModel {
    fn eq(&self, other: &Self) -> bool {
        self.model_type == other.model_type
            && self.num_states == other.num_states
            && self.initial == other.initial
            && self.choice_starts == other.choice_starts
            && self.rows == other.rows
            && self.columns == other.columns
            && self.values == other.values
    }
}

impl MutableModel for SparseModel {
    fn add_initial_state(&mut self, _state: usize) -> Result<()> {
        Err(ModelError::Immutable {
            operation: "add initial state",
        })
    }

    fn set_transition(&mut self, _state: usize, _choice: usize, _target: usize, _weight: f64) -> Result<()> {
        Err(ModelError::Immutable {
            operation: "set transition",
        })
    }

    fn add_choice(&mut self, _state: usize, _distribution: Distribution) -> Result<usize> {
        Err(ModelError::Immutable { operation: "add choice" })
    }

    fn add_label(&mut self, _name: &str, _states: StateSet) -> Result<()> {
        Err(ModelError::Immutable { operation: "add label" })
    }
}

impl Model for SparseModel {
    fn model_type(&self) -> ModelType {
        self.model_type
    }

    fn num_states(&self) -> usize {
        self.num_states
    }

    fn initial_states(&self) -> StateSet {
        self.initial.clone()
    }

    fn is_initial_state(&self, state: usize) -> bool {
        self.initial.contains(state)
    }

    fn deadlock_states(&self) -> StateSet {
        self.deadlocks.clone()
    }

    fn is_deadlock_state(&self, state: usize) -> bool {
        self.deadlocks.contains(state)
    }

    fn labels(&self) -> BTreeSet<String> {
        self.labels.keys().cloned().collect()
    }

    fn label_states(&self, name: &str) -> Option<StateSet> {
        self.labels.get(name).cloned()
    }

    fn num_choices(&self, state: usize) -> usize {
        self.choice_starts[state + 1] - self.choice_starts[state]
    }

    fn transitions(&self, state: usize, choice: usize) -> Transitions<'_> {
        let range = self.row(state, choice);
        Box::new(
            self.columns[range.clone()]
                .iter()
                .copied()
                .zip(self.values[range].iter().copied()),
        )
    }

    fn num_transitions(&self, state: usize, choice: usize) -> usize {
        self.row(state, choice).len()
    }

    fn total_num_choices(&self) -> usize {
        self.rows.len() - 1
    }

    fn total_num_transitions(&self) -> usize {
        self.columns.len()
    }

    fn some_successors_in_set(&self, state: usize, choice: usize, set: &StateSet) -> bool {
        self.columns[self.row(state, choice)].iter().any(|&t| set.contains(t))
    }

    fn all_successors_in_set(&self, state: usize, choice: usize, set: &StateSet) -> bool {
        self.columns[self.row(state, choice)].iter().all(|&t| set.contains(t))
    }

    fn action(&self, state: usize, choice: usize) -> Option<String> {
        let index = self.choice_starts[state] + choice;
        self.actions.as_ref().and_then(|a| a[index].clone())
    }

    fn var_list(&self) -> Option<&VarList> {
        self.var_list.as_ref()
    }

    fn state_valuation(&self, state: usize) -> Option<Valuation> {
        self.valuations.as_ref().map(|v| v[state].clone())
    }

    fn find_deadlocks(&mut self, fix: bool) -> Result<StateSet> {
        let found = structural_deadlocks(self);
        if fix && !found.is_empty() {
            return Err(ModelError::Immutable {
                operation: "fix deadlocks",
            });
        }
        self.deadlocks.union_with(&found);
        Ok(self.deadlocks.clone())
    }

    fn mv_mult_single(&self, state: usize, vect: &[f64]) -> f64 {
        self.row(state, 0).map(|i| self.values[i] * vect[self.columns[i]]).sum()
    }

    fn mv_mult_jac_single(&self, state: usize, vect: &[f64]) -> f64 {
        self.jacobi(state, vect, 0.0)
    }

    fn mv_mult_rew_single(&self, state: usize, vect: &[f64], rewards: &dyn StateRewards) -> f64 {
        let mut d = rewards.state_reward(state);
        for i in self.row(state, 0) {
            d += self.values[i] * vect[self.columns[i]];
        }
        d
    }

    fn mv_mult_rew_jac_single(&self, state: usize, vect: &[f64], rewards: &dyn StateRewards) -> f64 {
        self.jacobi(state, vect, rewards.state_reward(state))
    }

    fn vm_mult(&self, vect: &[f64], result: &mut [f64]) {
        result.iter_mut().for_each(|r| *r = 0.0);
        for state in 0..self.num_states {
            for i in self.row(state, 0) {
                result[self.columns[i]] += self.values[i] * vect[state];
            }
        }
    }

    fn prob0step(&self, subset: &StateSet, u: &StateSet, result: &mut StateSet) {
        for state in subset.iter() {
            let has_transition_to_u = self.columns[self.row(state, 0)].iter().any(|&t| u.contains(t));
            result.set(state, has_transition_to_u);
        }
    }

    fn prob1step(&self, subset: &StateSet, u: &StateSet, v: &StateSet, result: &mut StateSet) {
        for state in subset.iter() {
            let mut all_transitions_to_u = true;
            let mut has_transition_to_v = false;
            for &successor in &self.columns[self.row(state, 0)] {
                if !u.contains(successor) {
                    all_transitions_to_u = false;
                    break;
                }
                has_transition_to_v = has_transition_to_v || v.contains(successor);
            }
            result.set(state, all_transitions_to_u && has_transition_to_v);
        }
    }
}

impl fmt::Display for SparseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_transitions(self, f)
    }
}
