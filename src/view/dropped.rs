use std::collections::BTreeSet;
use std::rc::Rc;

use log::debug;

use crate::bitset::StateSet;
use crate::error::Result;
use crate::model::{Model, Transitions};
use crate::types::{ModelType, Valuation, VarList};

use super::{View, ViewCore};

/// A model with some choices hidden.
///
/// MDP choices are renumbered densely per state. A Markov chain whose only
/// choice is dropped keeps it, empty.
#[derive(Clone)]
pub struct DroppedChoices {
    core: ViewCore,
    model: Rc<dyn Model>,
    /// Original choices kept per state.
    kept: Rc<[Vec<usize>]>,
}

impl DroppedChoices {
    /// Hides every `(state, choice)` for which `dropped` holds.
    pub fn new(model: Rc<dyn Model>, dropped: impl Fn(usize, usize) -> bool) -> Self {
        let kept: Rc<[Vec<usize>]> = (0..model.num_states())
            .map(|s| (0..model.num_choices(s)).filter(|&c| !dropped(s, c)).collect::<Vec<_>>())
            .collect();
        debug!(
            "DroppedChoices::new: kept {} of {} choices",
            kept.iter().map(Vec::len).sum::<usize>(),
            model.total_num_choices()
        );
        Self {
            core: ViewCore::default(),
            model,
            kept,
        }
    }

    /// Hides the choices whose weights sum to less than one.
    pub fn drop_denormalized_distributions(model: Rc<dyn Model>) -> Self {
        let inner = Rc::clone(&model);
        Self::new(model, move |s, c| inner.transitions(s, c).map(|(_, w)| w).sum::<f64>() < 1.0)
    }

    /// The original index of `choice` of `state`.
    pub fn map_choice_to_original(&self, state: usize, choice: usize) -> Option<usize> {
        self.kept.get(state).and_then(|k| k.get(choice)).copied()
    }
}

impl View for DroppedChoices {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn apply_deadlock_fix(&mut self) {
        self.model = super::fixed_copy(self);
        self.kept = (0..self.model.num_states())
            .map(|s| (0..self.model.num_choices(s)).collect::<Vec<_>>())
            .collect();
    }
}

impl Model for DroppedChoices {
    fn model_type(&self) -> ModelType {
        self.model.model_type()
    }

    fn num_states(&self) -> usize {
        self.model.num_states()
    }

    fn initial_states(&self) -> StateSet {
        self.model.initial_states()
    }

    fn is_initial_state(&self, state: usize) -> bool {
        self.model.is_initial_state(state)
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
        if self.model_type().is_nondeterministic() {
            self.kept[state].len()
        } else {
            1
        }
    }

    fn transitions(&self, state: usize, choice: usize) -> Transitions<'_> {
        match self.map_choice_to_original(state, choice) {
            Some(original) => self.model.transitions(state, original),
            None if self.model_type().is_nondeterministic() => {
                panic!("choice {} of state {} out of bounds", choice, state)
            }
            None => Box::new(std::iter::empty()),
        }
    }

    fn action(&self, state: usize, choice: usize) -> Option<String> {
        let original = self.map_choice_to_original(state, choice)?;
        self.model.action(state, original)
    }

    fn var_list(&self) -> Option<&VarList> {
        self.model.var_list()
    }

    fn state_valuation(&self, state: usize) -> Option<Valuation> {
        self.model.state_valuation(state)
    }

    fn find_deadlocks(&mut self, fix: bool) -> Result<StateSet> {
        super::find_deadlocks(self, fix)
    }
}
