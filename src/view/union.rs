use std::collections::BTreeSet;
use std::rc::Rc;

use log::debug;

use crate::bitset::StateSet;
use crate::equivalence::EquivalenceRelation;
use crate::error::{ModelError, Result};
use crate::model::{Model, Transitions};
use crate::transformation::{ModelTransformation, StateMapping};
use crate::types::{ModelType, Valuation, VarList};

use super::{AlteredDistributions, Quotient, View, ViewCore};

/// Two models side by side: states of the second are shifted up by the
/// number of states of the first.
#[derive(Clone)]
pub struct DisjointUnion {
    core: ViewCore,
    first: Rc<dyn Model>,
    second: Rc<dyn Model>,
    offset: usize,
}

impl DisjointUnion {
    /// Fails if the two models are of different types.
    pub fn new(first: Rc<dyn Model>, second: Rc<dyn Model>) -> Result<Self> {
        if first.model_type() != second.model_type() {
            return Err(ModelError::Unsupported {
                model_type: format!("{} and {}", first.model_type(), second.model_type()),
                operation: "disjoint union of different model types",
            });
        }
        let offset = first.num_states();
        debug!(
            "DisjointUnion::new({} + {} states)",
            offset,
            second.num_states()
        );
        Ok(Self {
            core: ViewCore::default(),
            first,
            second,
            offset,
        })
    }

    /// Left fold of [`DisjointUnion::new`]. A single model is returned as is.
    pub fn union(models: impl IntoIterator<Item = Rc<dyn Model>>) -> Result<Rc<dyn Model>> {
        let mut models = models.into_iter();
        let mut union = models
            .next()
            .ok_or_else(|| ModelError::InvalidDimensions("union of no models".to_string()))?;
        for model in models {
            union = Rc::new(DisjointUnion::new(union, model)?);
        }
        Ok(union)
    }

    /// Union in which each pair `(s1, s2)` of `identify` is merged into one
    /// state (`s1`), with merged distributions renormalized.
    pub fn union_identified(
        first: Rc<dyn Model>,
        second: Rc<dyn Model>,
        identify: &[(usize, usize)],
    ) -> Result<Rc<dyn Model>> {
        let union = DisjointUnion::new(first, second)?;
        let offset = union.offset;
        let classes = identify.iter().map(|&(s1, s2)| [s1, s2 + offset].into_iter().collect::<StateSet>());
        let relation = EquivalenceRelation::new(classes, union.num_states())?;
        let transformation = Quotient::transform(Rc::new(union), &relation, true, false)?;
        Ok(Rc::clone(transformation.transformed()))
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn first(&self) -> &Rc<dyn Model> {
        &self.first
    }

    pub fn second(&self) -> &Rc<dyn Model> {
        &self.second
    }

    /// The embedding of the first operand.
    pub fn transform_first(first: Rc<dyn Model>, second: Rc<dyn Model>) -> Result<ModelTransformation> {
        let union: Rc<dyn Model> = Rc::new(DisjointUnion::new(Rc::clone(&first), second)?);
        let of_interest = first.initial_states();
        Ok(ModelTransformation::new(first, union, StateMapping::Identity).with_states_of_interest_unchecked(of_interest))
    }

    /// The embedding of the second operand.
    pub fn transform_second(first: Rc<dyn Model>, second: Rc<dyn Model>) -> Result<ModelTransformation> {
        let union = DisjointUnion::new(first, Rc::clone(&second))?;
        let offset = union.offset;
        let of_interest = second.initial_states().shift_up(offset);
        Ok(
            ModelTransformation::new(second, Rc::new(union), StateMapping::Shift(offset))
                .with_states_of_interest_unchecked(of_interest),
        )
    }
}

impl View for DisjointUnion {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn apply_deadlock_fix(&mut self) {
        self.first = Rc::new(AlteredDistributions::fix_deadlocks(Rc::clone(&self.first)));
        self.second = Rc::new(AlteredDistributions::fix_deadlocks(Rc::clone(&self.second)));
    }
}

impl Model for DisjointUnion {
    fn model_type(&self) -> ModelType {
        self.first.model_type()
    }

    fn num_states(&self) -> usize {
        self.offset + self.second.num_states()
    }

    fn initial_states(&self) -> StateSet {
        self.first
            .initial_states()
            .union(&self.second.initial_states().shift_up(self.offset))
    }

    fn is_initial_state(&self, state: usize) -> bool {
        if state < self.offset {
            self.first.is_initial_state(state)
        } else {
            self.second.is_initial_state(state - self.offset)
        }
    }

    fn deadlock_states(&self) -> StateSet {
        super::deadlock_states(self)
    }

    fn labels(&self) -> BTreeSet<String> {
        let mut labels = self.first.labels();
        labels.extend(self.second.labels());
        self.core.labels(labels)
    }

    fn label_states(&self, name: &str) -> Option<StateSet> {
        self.core.label_states(name, || {
            let first = self.first.label_states(name);
            let second = self.second.label_states(name).map(|s| s.shift_up(self.offset));
            match (first, second) {
                (None, None) => None,
                (first, second) => Some(first.unwrap_or_default().union(&second.unwrap_or_default())),
            }
        })
    }

    fn num_choices(&self, state: usize) -> usize {
        if state < self.offset {
            self.first.num_choices(state)
        } else {
            self.second.num_choices(state - self.offset)
        }
    }

    fn transitions(&self, state: usize, choice: usize) -> Transitions<'_> {
        if state < self.offset {
            self.first.transitions(state, choice)
        } else {
            let offset = self.offset;
            Box::new(
                self.second
                    .transitions(state - offset, choice)
                    .map(move |(t, w)| (t + offset, w)),
            )
        }
    }

    fn action(&self, state: usize, choice: usize) -> Option<String> {
        if state < self.offset {
            self.first.action(state, choice)
        } else {
            self.second.action(state - self.offset, choice)
        }
    }

    fn var_list(&self) -> Option<&VarList> {
        self.first.var_list()
    }

    fn state_valuation(&self, state: usize) -> Option<Valuation> {
        if state < self.offset {
            self.first.state_valuation(state)
        } else {
            self.second.state_valuation(state - self.offset)
        }
    }

    fn find_deadlocks(&mut self, fix: bool) -> Result<StateSet> {
        super::find_deadlocks(self, fix)
    }
}
