//! The mutable model a parser or a test fills in before freezing it into a
//! [`SparseModel`][crate::sparse::SparseModel] or wrapping it in views.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::debug;

use crate::bitset::StateSet;
use crate::distribution::Distribution;
use crate::error::{check_state, ModelError, Result};
use crate::model::{fmt_transitions, structural_deadlocks, Model, Transitions};
use crate::types::{ModelType, Valuation, VarList};

/// Structural editing of a model.
///
/// [`SimpleModel`] supports every operation; the immutable representations
/// reject all of them with [`ModelError::Immutable`].
pub trait MutableModel: Model {
    fn add_initial_state(&mut self, state: usize) -> Result<()>;

    /// Sets the weight of `state -> target` in `choice`; zero removes it.
    fn set_transition(&mut self, state: usize, choice: usize, target: usize, weight: f64) -> Result<()>;

    /// Appends a choice to an MDP state and returns its index.
    fn add_choice(&mut self, state: usize, distribution: Distribution) -> Result<usize>;

    fn add_label(&mut self, name: &str, states: StateSet) -> Result<()>;
}

/// Explicit model stored as one list of distributions per state.
#[derive(Debug, Clone)]
pub struct SimpleModel {
    model_type: ModelType,
    choices: Vec<Vec<Distribution>>,
    actions: Vec<Vec<Option<String>>>,
    initial: StateSet,
    deadlocks: StateSet,
    fixed_deadlocks: bool,
    labels: BTreeMap<String, StateSet>,
    var_list: Option<VarList>,
    valuations: Option<Vec<Valuation>>,
}

impl SimpleModel {
    /// Creates a model with `num_states` states and no transitions.
    pub fn new(model_type: ModelType, num_states: usize) -> Self {
        let mut model = Self {
            model_type,
            choices: Vec::with_capacity(num_states),
            actions: Vec::with_capacity(num_states),
            initial: StateSet::new(num_states),
            deadlocks: StateSet::new(num_states),
            fixed_deadlocks: false,
            labels: BTreeMap::new(),
            var_list: None,
            valuations: None,
        };
        for _ in 0..num_states {
            model.add_state();
        }
        model
    }

    /// Copies any model.
    pub fn from_model(model: &dyn Model) -> Self {
        let n = model.num_states();
        let mut result = Self {
            model_type: model.model_type(),
            choices: Vec::with_capacity(n),
            actions: Vec::with_capacity(n),
            initial: model.initial_states(),
            deadlocks: model.deadlock_states(),
            fixed_deadlocks: false,
            labels: BTreeMap::new(),
            var_list: model.var_list().cloned(),
            valuations: None,
        };
        for state in 0..n {
            let k = model.num_choices(state);
            result
                .choices
                .push((0..k).map(|c| Distribution::from_transitions(model.transitions(state, c))).collect());
            result.actions.push((0..k).map(|c| model.action(state, c)).collect());
        }
        for name in model.labels() {
            if let Some(states) = model.label_states(&name) {
                result.labels.insert(name, states);
            }
        }
        if (0..n).all(|s| model.state_valuation(s).is_some()) && n > 0 {
            result.valuations = Some((0..n).filter_map(|s| model.state_valuation(s)).collect());
        }
        result
    }

    /// Adds a fresh state without transitions and returns its index.
    pub fn add_state(&mut self) -> usize {
        let state = self.choices.len();
        if self.model_type.is_nondeterministic() {
            self.choices.push(Vec::new());
            self.actions.push(Vec::new());
        } else {
            self.choices.push(vec![Distribution::new()]);
            self.actions.push(vec![None]);
        }
        state
    }

    /// Sets `state -> target` in the single choice of a Markov chain.
    pub fn set_probability(&mut self, state: usize, target: usize, weight: f64) -> Result<()> {
        self.set_transition(state, 0, target, weight)
    }

    /// Appends a choice labelled with `action`.
    pub fn add_choice_with_action(
        &mut self,
        state: usize,
        distribution: Distribution,
        action: impl Into<String>,
    ) -> Result<usize> {
        let choice = self.add_choice(state, distribution)?;
        self.actions[state][choice] = Some(action.into());
        Ok(choice)
    }

    pub fn set_var_list(&mut self, var_list: VarList) {
        self.var_list = Some(var_list);
    }

    /// Sets one valuation per state.
    pub fn set_valuations(&mut self, valuations: Vec<Valuation>) -> Result<()> {
        if valuations.len() != self.num_states() {
            return Err(ModelError::InvalidDimensions(format!(
                "{} valuations for {} states",
                valuations.len(),
                self.num_states()
            )));
        }
        self.valuations = Some(valuations);
        Ok(())
    }

    fn check_choice(&self, state: usize, choice: usize) -> Result<()> {
        check_state(state, self.num_states())?;
        let num_choices = self.choices[state].len();
        if choice >= num_choices {
            return Err(ModelError::ChoiceOutOfBounds {
                state,
                choice,
                num_choices,
            });
        }
        Ok(())
    }
}

impl MutableModel for SimpleModel {
    fn add_initial_state(&mut self, state: usize) -> Result<()> {
        check_state(state, self.num_states())?;
        self.initial.insert(state);
        Ok(())
    }

    fn set_transition(&mut self, state: usize, choice: usize, target: usize, weight: f64) -> Result<()> {
        self.check_choice(state, choice)?;
        check_state(target, self.num_states())?;
        self.choices[state][choice].set(target, weight)
    }

    fn add_choice(&mut self, state: usize, distribution: Distribution) -> Result<usize> {
        check_state(state, self.num_states())?;
        if !self.model_type.is_nondeterministic() {
            return Err(ModelError::Unsupported {
                model_type: self.model_type.to_string(),
                operation: "add choice",
            });
        }
        if let Some(target) = distribution.support().find(|&t| t >= self.num_states()) {
            return Err(ModelError::StateOutOfBounds {
                state: target,
                num_states: self.num_states(),
            });
        }
        self.choices[state].push(distribution);
        self.actions[state].push(None);
        Ok(self.choices[state].len() - 1)
    }

    fn add_label(&mut self, name: &str, states: StateSet) -> Result<()> {
        if states.length() > self.num_states() {
            return Err(ModelError::StateOutOfBounds {
                state: states.length() - 1,
                num_states: self.num_states(),
            });
        }
        self.labels.insert(name.to_string(), states);
        Ok(())
    }
}

impl Model for SimpleModel {
    fn model_type(&self) -> ModelType {
        self.model_type
    }

    fn num_states(&self) -> usize {
        self.choices.len()
    }

    fn initial_states(&self) -> StateSet {
        self.initial.clone()
    }

    fn is_initial_state(&self, state: usize) -> bool {
        self.initial.contains(state)
    }

    fn deadlock_states(&self) -> StateSet {
        self.deadlocks.union(&structural_deadlocks(self))
    }

    fn labels(&self) -> BTreeSet<String> {
        self.labels.keys().cloned().collect()
    }

    fn label_states(&self, name: &str) -> Option<StateSet> {
        self.labels.get(name).cloned()
    }

    fn num_choices(&self, state: usize) -> usize {
        self.choices[state].len()
    }

    fn transitions(&self, state: usize, choice: usize) -> Transitions<'_> {
        Box::new(self.choices[state][choice].iter())
    }

    fn num_transitions(&self, state: usize, choice: usize) -> usize {
        self.choices[state][choice].len()
    }

    fn action(&self, state: usize, choice: usize) -> Option<String> {
        self.actions[state][choice].clone()
    }

    fn var_list(&self) -> Option<&VarList> {
        self.var_list.as_ref()
    }

    fn state_valuation(&self, state: usize) -> Option<Valuation> {
        self.valuations.as_ref().map(|v| v[state].clone())
    }

    fn find_deadlocks(&mut self, fix: bool) -> Result<StateSet> {
        let found = structural_deadlocks(self);
        debug!("find_deadlocks(fix = {}): {} deadlock states", fix, found.len());
        if fix {
            if self.fixed_deadlocks {
                return Err(ModelError::DeadlocksAlreadyFixed);
            }
            for state in found.iter() {
                if self.model_type.is_nondeterministic() {
                    self.choices[state].push(Distribution::dirac(state));
                    self.actions[state].push(None);
                } else {
                    self.choices[state][0] = Distribution::dirac(state);
                }
            }
            self.fixed_deadlocks = true;
        }
        self.deadlocks.union_with(&found);
        Ok(self.deadlocks.clone())
    }
}

impl fmt::Display for SimpleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_transitions(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_markov_chain_has_one_choice_per_state() {
        let mut m = SimpleModel::new(ModelType::Dtmc, 2);
        assert_eq!(m.num_choices(0), 1);
        assert_eq!(m.num_transitions(0, 0), 0);
        m.set_probability(0, 1, 1.0).unwrap();
        assert_eq!(m.transitions(0, 0).collect::<Vec<_>>(), vec![(1, 1.0)]);
        assert!(matches!(
            m.add_choice(0, Distribution::dirac(1)),
            Err(ModelError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_index_errors() {
        let mut m = SimpleModel::new(ModelType::Dtmc, 2);
        assert!(matches!(
            m.set_probability(0, 2, 0.5),
            Err(ModelError::StateOutOfBounds { state: 2, num_states: 2 })
        ));
        assert!(matches!(
            m.set_transition(0, 1, 1, 0.5),
            Err(ModelError::ChoiceOutOfBounds { choice: 1, .. })
        ));
        assert!(m.add_initial_state(5).is_err());
        assert!(m.add_label("bad", StateSet::singleton(2)).is_err());
    }

    #[test]
    fn test_fix_deadlocks_once() {
        let mut m = SimpleModel::new(ModelType::Dtmc, 2);
        m.set_probability(0, 1, 1.0).unwrap();
        assert!(m.check_for_deadlocks(None).is_err());
        let deadlocks = m.find_deadlocks(true).unwrap();
        assert_eq!(deadlocks, StateSet::singleton(1));
        assert_eq!(m.transitions(1, 0).collect::<Vec<_>>(), vec![(1, 1.0)]);
        assert!(m.check_for_deadlocks(None).is_ok());
        // the fixed state is still reported as a deadlock
        assert!(m.is_deadlock_state(1));
        assert!(m.find_deadlocks(false).is_ok());
        assert!(matches!(m.find_deadlocks(true), Err(ModelError::DeadlocksAlreadyFixed)));
    }

    #[test]
    fn test_fix_deadlocks_twice_fails() {
        let mut m = SimpleModel::new(ModelType::Mdp, 2);
        m.find_deadlocks(true).unwrap();
        assert_eq!(m.num_choices(0), 1);
        m.add_state();
        assert!(matches!(m.find_deadlocks(true), Err(ModelError::DeadlocksAlreadyFixed)));
    }

    #[test]
    fn test_check_for_deadlocks_except() {
        let mut m = SimpleModel::new(ModelType::Dtmc, 3);
        m.set_probability(0, 1, 1.0).unwrap();
        m.set_probability(1, 0, 1.0).unwrap();
        let err = m.check_for_deadlocks(None).unwrap_err();
        assert_eq!(err.to_string(), "DTMC has a deadlock in state 2");
        assert!(m.check_for_deadlocks(Some(&StateSet::singleton(2))).is_ok());
    }

    #[test]
    fn test_check_stochastic() {
        let mut m = SimpleModel::new(ModelType::Dtmc, 2);
        m.set_probability(0, 0, 0.5).unwrap();
        m.set_probability(0, 1, 0.4).unwrap();
        assert!(matches!(
            m.check_stochastic(1e-9),
            Err(ModelError::NotStochastic { state: 0, choice: 0, .. })
        ));
        m.set_probability(0, 1, 0.5).unwrap();
        assert!(m.check_stochastic(1e-9).is_ok());
    }

    #[test]
    fn test_display_and_info() {
        let mut m = SimpleModel::new(ModelType::Mdp, 2);
        m.add_initial_state(0).unwrap();
        m.add_choice_with_action(0, [(0, 0.5), (1, 0.5)].into_iter().collect(), "go")
            .unwrap();
        m.add_choice(0, Distribution::dirac(1)).unwrap();
        assert_eq!(m.to_string(), "trans: [ 0: [{0: 0.5, 1: 0.5}, {1: 1}], 1: [] ]");
        assert_eq!(m.info_string(), "2 states (1 initial), 3 transitions, 2 choices");
        assert_eq!(m.action(0, 0).as_deref(), Some("go"));
        assert_eq!(m.action(0, 1), None);
    }

    #[test]
    fn test_valuations() {
        let mut m = SimpleModel::new(ModelType::Dtmc, 2);
        assert!(m.set_valuations(vec![Valuation(vec![0])]).is_err());
        m.set_valuations(vec![Valuation(vec![0]), Valuation(vec![1])]).unwrap();
        assert_eq!(m.state_valuation(1), Some(Valuation(vec![1])));
        let copy = SimpleModel::from_model(&m);
        assert_eq!(copy.state_valuation(1), Some(Valuation(vec![1])));
    }
}
