//! Bookkeeping of state indices between an original model and a model
//! derived from it.
//!
//! A [`ModelTransformation`] records which state of the transformed model
//! each original state became (if any). Transformations chain through
//! [`compose`](ModelTransformation::compose) without materializing the
//! combined mapping, and results computed on the transformed model are
//! carried back with [`project_to_original`](ModelTransformation::project_to_original).

use std::fmt;
use std::rc::Rc;

use crate::bitset::StateSet;
use crate::error::{check_state, ModelError, Result};
use crate::model::Model;

/// A pure map from original states to transformed states.
#[derive(Debug, Clone, PartialEq)]
pub enum StateMapping {
    Identity,
    /// `s -> s + offset`.
    Shift(usize),
    /// Lookup table; `None` (or an index past the end) means "no image".
    Table(Rc<[Option<usize>]>),
    /// Apply the first mapping, then the second.
    Composed(Rc<StateMapping>, Rc<StateMapping>),
}

impl StateMapping {
    pub fn apply(&self, state: usize) -> Option<usize> {
        match self {
            StateMapping::Identity => Some(state),
            StateMapping::Shift(offset) => Some(state + offset),
            StateMapping::Table(table) => table.get(state).copied().flatten(),
            StateMapping::Composed(first, second) => first.apply(state).and_then(|s| second.apply(s)),
        }
    }

    /// The mapping `self` followed by `next`.
    ///
    /// Identities vanish and shifts add up, so the common chains need no
    /// allocation.
    pub fn then(self, next: StateMapping) -> StateMapping {
        match (self, next) {
            (StateMapping::Identity, m) | (m, StateMapping::Identity) => m,
            (StateMapping::Shift(a), StateMapping::Shift(b)) => StateMapping::Shift(a + b),
            (a, b) => StateMapping::Composed(Rc::new(a), Rc::new(b)),
        }
    }
}

impl From<Vec<Option<usize>>> for StateMapping {
    fn from(table: Vec<Option<usize>>) -> Self {
        StateMapping::Table(table.into())
    }
}

/// Value used for original states without an image when projecting.
pub trait Undefined: Clone {
    fn undefined() -> Self;
}

impl Undefined for bool {
    fn undefined() -> Self {
        false
    }
}

impl Undefined for f64 {
    fn undefined() -> Self {
        f64::NAN
    }
}

impl Undefined for f32 {
    fn undefined() -> Self {
        f32::NAN
    }
}

impl Undefined for i32 {
    fn undefined() -> Self {
        -1
    }
}

impl Undefined for i64 {
    fn undefined() -> Self {
        -1
    }
}

impl Undefined for isize {
    fn undefined() -> Self {
        -1
    }
}

/// `(original, transformed, states of interest, mapping)`.
#[derive(Clone)]
pub struct ModelTransformation {
    original: Rc<dyn Model>,
    transformed: Rc<dyn Model>,
    states_of_interest: Option<StateSet>,
    mapping: StateMapping,
}

impl ModelTransformation {
    pub fn new(original: Rc<dyn Model>, transformed: Rc<dyn Model>, mapping: StateMapping) -> Self {
        Self {
            original,
            transformed,
            states_of_interest: None,
            mapping,
        }
    }

    /// Same state space on both sides.
    pub fn identity(original: Rc<dyn Model>, transformed: Rc<dyn Model>) -> Self {
        Self::new(original, transformed, StateMapping::Identity)
    }

    /// Sets the states of the transformed model the caller cares about.
    pub fn with_states_of_interest(mut self, states: StateSet) -> Result<Self> {
        let n = self.transformed.num_states();
        if states.length() > n {
            return Err(ModelError::StateOutOfBounds {
                state: states.length() - 1,
                num_states: n,
            });
        }
        self.states_of_interest = Some(states);
        Ok(self)
    }

    /// For sets computed as images of the mapping, which are in bounds.
    pub(crate) fn with_states_of_interest_unchecked(mut self, states: StateSet) -> Self {
        self.states_of_interest = Some(states);
        self
    }

    pub fn original(&self) -> &Rc<dyn Model> {
        &self.original
    }

    pub fn transformed(&self) -> &Rc<dyn Model> {
        &self.transformed
    }

    pub fn states_of_interest(&self) -> Option<&StateSet> {
        self.states_of_interest.as_ref()
    }

    pub fn mapping(&self) -> &StateMapping {
        &self.mapping
    }

    pub fn map_to_transformed(&self, state: usize) -> Result<Option<usize>> {
        check_state(state, self.original.num_states())?;
        Ok(self.mapping.apply(state))
    }

    /// Image of `states`; members without an image are dropped.
    pub fn map_states_to_transformed(&self, states: &StateSet) -> Result<StateSet> {
        let mut result = StateSet::new(self.transformed.num_states());
        for state in states.iter() {
            if let Some(mapped) = self.map_to_transformed(state)? {
                result.insert(mapped);
            }
        }
        Ok(result)
    }

    /// `self ∘ inner`: maps the original of `inner` to the transformed model
    /// of `self`. `inner`'s transformed model should be `self`'s original.
    pub fn compose(&self, inner: &ModelTransformation) -> ModelTransformation {
        ModelTransformation {
            original: Rc::clone(&inner.original),
            transformed: Rc::clone(&self.transformed),
            states_of_interest: self.states_of_interest.clone(),
            mapping: inner.mapping.clone().then(self.mapping.clone()),
        }
    }

    /// Carries a per-state vector of the transformed model back to the
    /// original model; states without an image get [`Undefined::undefined`].
    pub fn project_to_original<T: Undefined>(&self, values: &[T]) -> Result<Vec<T>> {
        let n = self.transformed.num_states();
        if values.len() != n {
            return Err(ModelError::InvalidDimensions(format!(
                "vector of length {} for a model with {} states",
                values.len(),
                n
            )));
        }
        (0..self.original.num_states())
            .map(|state| match self.mapping.apply(state) {
                None => Ok(T::undefined()),
                Some(mapped) => values.get(mapped).cloned().ok_or(ModelError::StateOutOfBounds {
                    state: mapped,
                    num_states: n,
                }),
            })
            .collect()
    }

    /// Original states whose image lies in `states`.
    pub fn project_states_to_original(&self, states: &StateSet) -> StateSet {
        (0..self.original.num_states())
            .filter(|&s| self.mapping.apply(s).is_some_and(|t| states.contains(t)))
            .collect()
    }
}

impl fmt::Debug for ModelTransformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelTransformation")
            .field("original_states", &self.original.num_states())
            .field("transformed_states", &self.transformed.num_states())
            .field("states_of_interest", &self.states_of_interest)
            .field("mapping", &self.mapping)
            .finish()
    }
}
