//! Partitions of the state space into equivalence classes.
//!
//! Only non-trivial classes are stored; every state outside of them forms a
//! class of its own. The representative of a class is its lowest member.

use std::collections::BTreeMap;

use crate::bitset::StateSet;
use crate::error::{ModelError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EquivalenceRelation {
    num_states: usize,
    classes: Vec<StateSet>,
    class_of: BTreeMap<usize, usize>,
    non_representatives: StateSet,
}

impl EquivalenceRelation {
    /// The relation in which every state is only equivalent to itself.
    pub fn identity(num_states: usize) -> Self {
        Self {
            num_states,
            ..Self::default()
        }
    }

    /// Builds the relation from (possibly singleton) classes over
    /// `0..num_states`. Classes must be disjoint.
    pub fn new(classes: impl IntoIterator<Item = StateSet>, num_states: usize) -> Result<Self> {
        let mut relation = Self::identity(num_states);
        for class in classes {
            if class.len() < 2 {
                continue;
            }
            if class.length() > num_states {
                return Err(ModelError::InvalidEquivalence(format!(
                    "state {} exceeds {} states",
                    class.length() - 1,
                    num_states
                )));
            }
            let index = relation.classes.len();
            for state in class.iter() {
                if relation.class_of.insert(state, index).is_some() {
                    return Err(ModelError::InvalidEquivalence(format!(
                        "state {} is in two classes",
                        state
                    )));
                }
            }
            let mut rest = class.clone();
            rest.pop_first();
            relation.non_representatives.union_with(&rest);
            relation.classes.push(class);
        }
        Ok(relation)
    }

    /// Groups states with equal keys: `keys[s]` is the key of state `s`.
    pub fn from_keys<K: Ord>(keys: &[K]) -> Self {
        let mut groups: BTreeMap<&K, StateSet> = BTreeMap::new();
        for (state, key) in keys.iter().enumerate() {
            groups.entry(key).or_default().insert(state);
        }
        // classes are disjoint and in bounds by construction
        let mut relation = Self::identity(keys.len());
        for class in groups.into_values().filter(|c| c.len() > 1) {
            let index = relation.classes.len();
            for state in class.iter() {
                relation.class_of.insert(state, index);
            }
            let mut rest = class.clone();
            rest.pop_first();
            relation.non_representatives.union_with(&rest);
            relation.classes.push(class);
        }
        relation
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    /// Returns true if all classes are singletons.
    pub fn is_identity(&self) -> bool {
        self.classes.is_empty()
    }

    /// The non-trivial class containing `state`, if any.
    pub fn class(&self, state: usize) -> Option<&StateSet> {
        self.class_of.get(&state).map(|&i| &self.classes[i])
    }

    /// The class of `state`, including singleton ones.
    pub fn class_or_singleton(&self, state: usize) -> StateSet {
        self.class(state).cloned().unwrap_or_else(|| StateSet::singleton(state))
    }

    pub fn non_trivial_classes(&self) -> impl Iterator<Item = &StateSet> {
        self.classes.iter()
    }

    pub fn num_classes(&self) -> usize {
        self.num_states - self.non_representatives.len()
    }

    pub fn representative(&self, state: usize) -> usize {
        self.class(state).and_then(StateSet::first).unwrap_or(state)
    }

    pub fn is_representative(&self, state: usize) -> bool {
        !self.non_representatives.contains(state)
    }

    pub fn non_representatives(&self) -> &StateSet {
        &self.non_representatives
    }

    pub fn representatives(&self) -> StateSet {
        self.non_representatives.complement(self.num_states)
    }

    pub fn are_equivalent(&self, a: usize, b: usize) -> bool {
        self.representative(a) == self.representative(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn set(states: &[usize]) -> StateSet {
        states.iter().copied().collect()
    }

    #[test]
    fn test_representatives() {
        let relation = EquivalenceRelation::new([set(&[4, 1, 2]), set(&[3])], 6).unwrap();
        assert_eq!(relation.representative(4), 1);
        assert_eq!(relation.representative(3), 3);
        assert!(relation.is_representative(1));
        assert!(!relation.is_representative(2));
        assert_eq!(relation.non_representatives(), &set(&[2, 4]));
        assert_eq!(relation.representatives(), set(&[0, 1, 3, 5]));
        assert_eq!(relation.num_classes(), 4);
        assert_eq!(relation.class_or_singleton(5), set(&[5]));
        assert!(relation.are_equivalent(2, 4));
    }

    #[test]
    fn test_invalid_classes() {
        assert!(matches!(
            EquivalenceRelation::new([set(&[0, 1]), set(&[1, 2])], 3),
            Err(ModelError::InvalidEquivalence(_))
        ));
        assert!(EquivalenceRelation::new([set(&[0, 7])], 3).is_err());
    }

    #[test]
    fn test_from_keys() {
        let relation = EquivalenceRelation::from_keys(&["a", "b", "a", "c", "b"]);
        assert_eq!(relation.class(2), Some(&set(&[0, 2])));
        assert_eq!(relation.representative(4), 1);
        assert_eq!(relation.class(3), None);
        assert!(EquivalenceRelation::from_keys(&[1, 2, 3]).is_identity());
    }
}
