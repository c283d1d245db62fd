use std::collections::BTreeSet;
use std::ops::Range;
use std::rc::Rc;

use log::debug;

use crate::bitset::StateSet;
use crate::error::Result;
use crate::model::{Model, Transitions};
use crate::types::{ModelType, Valuation, VarList};

use super::{View, ViewCore};

/// A model with `k` fresh states appended after the existing ones.
///
/// The new states have no transitions. With `fill`, they take the valuation
/// of state `0`; otherwise they have none.
#[derive(Clone)]
pub struct AdditionalStates {
    core: ViewCore,
    model: Rc<dyn Model>,
    additional: usize,
    fill: bool,
}

impl AdditionalStates {
    pub fn new(model: Rc<dyn Model>, additional: usize, fill: bool) -> Self {
        debug!(
            "AdditionalStates::new({} + {} states, fill = {})",
            model.num_states(),
            additional,
            fill
        );
        Self {
            core: ViewCore::default(),
            model,
            additional,
            fill,
        }
    }

    /// Indices of the appended states.
    pub fn additional_state_indices(&self) -> Range<usize> {
        let n = self.model.num_states();
        n..n + self.additional
    }

    fn is_additional(&self, state: usize) -> bool {
        state >= self.model.num_states()
    }

    fn check_bounds(&self, state: usize) {
        assert!(
            state < self.num_states(),
            "state {} out of bounds ({} states)",
            state,
            self.num_states()
        );
    }
}

impl View for AdditionalStates {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn apply_deadlock_fix(&mut self) {
        self.model = super::fixed_copy(self);
        self.additional = 0;
    }
}

impl Model for AdditionalStates {
    fn model_type(&self) -> ModelType {
        self.model.model_type()
    }

    fn num_states(&self) -> usize {
        self.model.num_states() + self.additional
    }

    fn initial_states(&self) -> StateSet {
        self.model.initial_states()
    }

    fn is_initial_state(&self, state: usize) -> bool {
        !self.is_additional(state) && self.model.is_initial_state(state)
    }

    fn deadlock_states(&self) -> StateSet {
        super::deadlock_states(self)
    }

    fn labels(&self) -> BTreeSet<String> {
        self.core.labels(self.model.labels())
    }

    fn label_states(&self, name: &str) -> Option<StateSet> {
        self.core.label_states(name, || self.model.label_states(name))
    }

    fn num_choices(&self, state: usize) -> usize {
        self.check_bounds(state);
        if !self.is_additional(state) {
            self.model.num_choices(state)
        } else if self.model_type().is_nondeterministic() {
            0
        } else {
            1
        }
    }

    fn transitions(&self, state: usize, choice: usize) -> Transitions<'_> {
        self.check_bounds(state);
        if self.is_additional(state) {
            Box::new(std::iter::empty())
        } else {
            self.model.transitions(state, choice)
        }
    }

    fn action(&self, state: usize, choice: usize) -> Option<String> {
        if self.is_additional(state) {
            None
        } else {
            self.model.action(state, choice)
        }
    }

    fn var_list(&self) -> Option<&VarList> {
        self.model.var_list()
    }

    fn state_valuation(&self, state: usize) -> Option<Valuation> {
        if !self.is_additional(state) {
            self.model.state_valuation(state)
        } else if self.fill {
            self.model.state_valuation(0)
        } else {
            None
        }
    }

    fn find_deadlocks(&mut self, fix: bool) -> Result<StateSet> {
        super::find_deadlocks(self, fix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple::{MutableModel, SimpleModel};
    use test_log::test;

    fn model(model_type: ModelType) -> Rc<dyn Model> {
        let mut m = SimpleModel::new(model_type, 2);
        m.add_initial_state(0).unwrap();
        if model_type.is_nondeterministic() {
            m.add_choice(0, crate::distribution::Distribution::dirac(1)).unwrap();
            m.add_choice(1, crate::distribution::Distribution::dirac(1)).unwrap();
        } else {
            m.set_probability(0, 1, 1.0).unwrap();
            m.set_probability(1, 1, 1.0).unwrap();
        }
        m.set_valuations(vec![vec![0, 7].into(), vec![1, 7].into()]).unwrap();
        Rc::new(m)
    }

    #[test]
    fn test_appended_states() {
        let view = AdditionalStates::new(model(ModelType::Dtmc), 3, false);
        assert_eq!(view.num_states(), 5);
        assert_eq!(view.additional_state_indices(), 2..5);
        assert_eq!(view.num_choices(3), 1);
        assert_eq!(view.transitions(3, 0).count(), 0);
        assert_eq!(view.deadlock_states(), [2, 3, 4].into_iter().collect());
        assert_eq!(view.state_valuation(4), None);
        assert_eq!(view.state_valuation(1), Some(vec![1, 7].into()));
        assert_eq!(view.total_num_transitions(), 2);
    }

    #[test]
    #[should_panic(expected = "state 5 out of bounds (5 states)")]
    fn test_state_past_the_appended_ones() {
        let view = AdditionalStates::new(model(ModelType::Dtmc), 3, false);
        view.transitions(5, 0).count();
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_choices_past_the_appended_ones() {
        let view = AdditionalStates::new(model(ModelType::Mdp), 1, false);
        view.num_choices(3);
    }

    #[test]
    fn test_fill_copies_first_valuation() {
        let view = AdditionalStates::new(model(ModelType::Mdp), 1, true);
        assert_eq!(view.num_choices(2), 0);
        assert_eq!(view.state_valuation(2), Some(vec![0, 7].into()));
    }

    #[test]
    fn test_fix_deadlocks() {
        let mut view = AdditionalStates::new(model(ModelType::Mdp), 2, false);
        let before = view.clone();
        assert_eq!(view.find_deadlocks(true).unwrap(), [2, 3].into_iter().collect());
        assert_eq!(view.num_states(), 4);
        assert_eq!(view.num_choices(2), 1);
        assert_eq!(view.transitions(3, 0).collect::<Vec<_>>(), vec![(3, 1.0)]);
        assert!(view.check_for_deadlocks(None).is_ok());
        assert_eq!(before.num_choices(2), 0);
    }
}
