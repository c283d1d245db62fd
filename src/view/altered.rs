use std::collections::BTreeSet;
use std::rc::Rc;

use log::debug;

use crate::bitset::StateSet;
use crate::distribution::Distribution;
use crate::error::Result;
use crate::model::{structural_deadlocks, Model, Transitions};
use crate::types::{ModelType, Valuation, VarList};

use super::{View, ViewCore};

/// Replacement distribution for `(state, choice)`, or `None` to keep the
/// original one.
pub type Alteration = Rc<dyn Fn(usize, usize) -> Option<Distribution>>;

/// Altered number of choices of a state, or `None` to keep the original.
pub type ChoiceCount = Rc<dyn Fn(usize) -> Option<usize>>;

/// A model whose distributions are replaced where a function says so.
///
/// Markov chains are queried with choice `0`. Zero-weight entries of a
/// replacement are skipped. A replaced choice loses its action unless the
/// view is built [`with_actions`](Self::with_actions).
#[derive(Clone)]
pub struct AlteredDistributions {
    core: ViewCore,
    model: Rc<dyn Model>,
    alteration: Option<Alteration>,
    choice_count: Option<ChoiceCount>,
    keep_actions: bool,
}

impl AlteredDistributions {
    pub fn new(model: Rc<dyn Model>, alteration: impl Fn(usize, usize) -> Option<Distribution> + 'static) -> Self {
        Self {
            core: ViewCore::default(),
            model,
            alteration: Some(Rc::new(alteration)),
            choice_count: None,
            keep_actions: false,
        }
    }

    /// Keeps the actions of the underlying choices, replaced or not.
    pub fn with_actions(mut self) -> Self {
        self.keep_actions = true;
        self
    }

    /// Overrides the number of choices of MDP states. Choices past the
    /// original count must be supplied by the alteration.
    pub fn with_num_choices(mut self, choice_count: impl Fn(usize) -> Option<usize> + 'static) -> Self {
        self.choice_count = Some(Rc::new(choice_count));
        self
    }

    /// Makes every state of `states` absorbing: a single choice with a self
    /// loop of weight 1.
    pub fn trap_states(model: Rc<dyn Model>, states: &StateSet) -> Self {
        debug!("trap_states({} states)", states.len());
        let trapped = Rc::new(states.clone());
        let counted = Rc::clone(&trapped);
        Self::new(model, move |state, _| trapped.contains(state).then(|| Distribution::dirac(state)))
            .with_num_choices(move |state| counted.contains(state).then_some(1))
    }

    /// Same as [`trap_states`](Self::trap_states).
    pub fn add_self_loops(model: Rc<dyn Model>, states: &StateSet) -> Self {
        Self::trap_states(model, states)
    }

    /// Scales every non-empty choice whose weights do not sum to one so
    /// that they do. Actions are kept.
    pub fn normalize_distributions(model: Rc<dyn Model>) -> Self {
        let inner = Rc::clone(&model);
        Self::new(model, move |state, choice| {
            if choice >= inner.num_choices(state) {
                return None;
            }
            let mut distribution = Distribution::from_transitions(inner.transitions(state, choice));
            let sum = distribution.sum();
            if sum == 0.0 || sum == 1.0 {
                return None;
            }
            distribution.scale(sum);
            Some(distribution)
        })
        .with_actions()
    }

    /// Turns every state of `states` into a deadlock: a Markov chain keeps
    /// one empty choice, an MDP state loses all choices.
    pub fn make_deadlocks(model: Rc<dyn Model>, states: &StateSet) -> Self {
        let nondet = model.model_type().is_nondeterministic();
        let cut = Rc::new(states.clone());
        let counted = Rc::clone(&cut);
        Self::new(model, move |state, _| cut.contains(state).then(Distribution::new))
            .with_num_choices(move |state| (nondet && counted.contains(state)).then_some(0))
    }

    /// Adds a self loop to every state without outgoing transitions.
    pub fn fix_deadlocks(model: Rc<dyn Model>) -> Self {
        let deadlocks = structural_deadlocks(model.as_ref());
        let mut fixed = Self::trap_states(model, &deadlocks);
        fixed.core.deadlocks = deadlocks;
        fixed.core.fixed_deadlocks = true;
        fixed
    }

    fn altered(&self, state: usize, choice: usize) -> Option<Distribution> {
        self.alteration.as_ref().and_then(|f| f(state, choice))
    }
}

impl View for AlteredDistributions {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn apply_deadlock_fix(&mut self) {
        self.model = super::fixed_copy(self);
        self.alteration = None;
        self.choice_count = None;
    }
}

impl Model for AlteredDistributions {
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
        if !self.model_type().is_nondeterministic() {
            return 1;
        }
        self.choice_count
            .as_ref()
            .and_then(|f| f(state))
            .unwrap_or_else(|| self.model.num_choices(state))
    }

    fn transitions(&self, state: usize, choice: usize) -> Transitions<'_> {
        match self.altered(state, choice) {
            Some(distribution) => Box::new(distribution.into_iter().filter(|&(_, w)| w > 0.0)),
            None => self.model.transitions(state, choice),
        }
    }

    fn action(&self, state: usize, choice: usize) -> Option<String> {
        if choice >= self.model.num_choices(state) {
            return None;
        }
        if !self.keep_actions && self.altered(state, choice).is_some() {
            return None;
        }
        self.model.action(state, choice)
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
