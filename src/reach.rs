//! Graph reachability and the Prob0/Prob1 precomputations.
//!
//! The qualitative algorithms iterate the one-step kernels
//! ([`Model::prob0step`], [`Model::prob1step`] and their MDP counterparts in
//! [`kernels`]) to a fixpoint.
//!
//! [`kernels`]: crate::kernels

use log::debug;

use crate::bitset::StateSet;
use crate::kernels;
use crate::model::Model;

/// The reversed transition relation of a model, over all choices.
#[derive(Debug, Clone)]
pub struct PredecessorRelation {
    offsets: Vec<usize>,
    predecessors: Vec<usize>,
}

impl PredecessorRelation {
    pub fn new<M: Model + ?Sized>(model: &M) -> Self {
        let n = model.num_states();
        let mut lists: Vec<Vec<usize>> = vec![Vec::new(); n];
        for state in 0..n {
            for choice in 0..model.num_choices(state) {
                for (successor, _) in model.transitions(state, choice) {
                    // states come in increasing order, so a repeat is always last
                    if lists[successor].last() != Some(&state) {
                        lists[successor].push(state);
                    }
                }
            }
        }
        let mut offsets = Vec::with_capacity(n + 1);
        let mut predecessors = Vec::new();
        offsets.push(0);
        for list in lists {
            predecessors.extend(list);
            offsets.push(predecessors.len());
        }
        Self { offsets, predecessors }
    }

    pub fn num_states(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Predecessors of `state`, ascending and without duplicates.
    pub fn predecessors(&self, state: usize) -> &[usize] {
        &self.predecessors[self.offsets[state]..self.offsets[state + 1]]
    }

    /// States with a transition into `target`.
    pub fn pre(&self, target: &StateSet) -> StateSet {
        let mut result = StateSet::new(self.num_states());
        for state in target.iter() {
            result.extend(self.predecessors(state).iter().copied());
        }
        result
    }

    /// States that can reach `target` (including `target`).
    pub fn pre_star(&self, target: &StateSet) -> StateSet {
        let mut result = target.clone();
        let mut stack: Vec<usize> = target.iter().collect();
        while let Some(state) = stack.pop() {
            for &p in self.predecessors(state) {
                if result.insert(p) {
                    stack.push(p);
                }
            }
        }
        result
    }
}

/// One-step successors of `states`.
pub fn post<M: Model + ?Sized>(model: &M, states: &StateSet) -> StateSet {
    let mut result = StateSet::new(model.num_states());
    for state in states.iter() {
        for choice in 0..model.num_choices(state) {
            result.extend(model.transitions(state, choice).map(|(t, _)| t));
        }
    }
    result
}

/// States reachable from `states` (including `states`).
pub fn post_star<M: Model + ?Sized>(model: &M, states: &StateSet) -> StateSet {
    let mut result = StateSet::new(model.num_states());
    result.union_with(states);
    let mut stack: Vec<usize> = states.iter().collect();
    while let Some(state) = stack.pop() {
        for choice in 0..model.num_choices(state) {
            for (successor, _) in model.transitions(state, choice) {
                if result.insert(successor) {
                    stack.push(successor);
                }
            }
        }
    }
    result
}

/// States reachable from the initial states.
pub fn reachable_states<M: Model + ?Sized>(model: &M) -> StateSet {
    post_star(model, &model.initial_states())
}

fn unknown_states(num_states: usize, remain: Option<&StateSet>, target: &StateSet) -> StateSet {
    match remain {
        Some(remain) => remain.difference(target),
        None => target.complement(num_states),
    }
}

/// States of a Markov chain that reach `target` with probability 0 while
/// staying in `remain` (all states if `None`).
pub fn prob0<M: Model + ?Sized>(model: &M, remain: Option<&StateSet>, target: &StateSet) -> StateSet {
    let n = model.num_states();
    let unknown = unknown_states(n, remain, target);
    let mut u = target.clone();
    let mut iterations = 0;
    loop {
        iterations += 1;
        let mut next = u.clone();
        model.prob0step(&unknown, &u, &mut next);
        if next == u {
            break;
        }
        u = next;
    }
    debug!("prob0 took {} iterations", iterations);
    u.complement(n)
}

/// States of a Markov chain that reach `target` with probability 1 while
/// staying in `remain` (all states if `None`).
pub fn prob1<M: Model + ?Sized>(model: &M, remain: Option<&StateSet>, target: &StateSet) -> StateSet {
    let n = model.num_states();
    let unknown = unknown_states(n, remain, target);
    let mut u = StateSet::full(n);
    let mut iterations = 0;
    loop {
        let mut v = target.clone();
        loop {
            iterations += 1;
            let mut next = v.clone();
            model.prob1step(&unknown, &u, &v, &mut next);
            if next == v {
                break;
            }
            v = next;
        }
        if v == u {
            break;
        }
        u = v;
    }
    debug!("prob1 took {} iterations", iterations);
    u
}

/// MDP states whose minimal (`min`) or maximal probability of reaching
/// `target` within `remain` is 0.
pub fn prob0_mdp<M: Model + ?Sized>(model: &M, remain: Option<&StateSet>, target: &StateSet, min: bool) -> StateSet {
    let n = model.num_states();
    let unknown = unknown_states(n, remain, target);
    let mut u = target.clone();
    loop {
        let mut next = u.clone();
        kernels::prob0step_mdp(model, &unknown, &u, min, &mut next);
        if next == u {
            break;
        }
        u = next;
    }
    u.complement(n)
}

/// MDP states whose minimal (`min`) or maximal probability of reaching
/// `target` within `remain` is 1.
pub fn prob1_mdp<M: Model + ?Sized>(model: &M, remain: Option<&StateSet>, target: &StateSet, min: bool) -> StateSet {
    let n = model.num_states();
    let unknown = unknown_states(n, remain, target);
    let mut u = StateSet::full(n);
    loop {
        let mut v = target.clone();
        loop {
            let mut next = v.clone();
            kernels::prob1step_mdp(model, &unknown, &u, &v, min, &mut next);
            if next == v {
                break;
            }
            v = next;
        }
        if v == u {
            break;
        }
        u = v;
    }
    u
}
