//! Sparse probability (or rate) distributions over target states.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ModelError, Result};

/// A sparse map `target -> weight`.
///
/// Keys are unique: [`add`](Distribution::add) accumulates into an existing
/// entry, which is what makes merging several distributions (e.g. all
/// members of an equivalence class) deduplicate targets. Iteration is in
/// increasing target order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Distribution {
    map: BTreeMap<usize, f64>,
}

fn check_weight(target: usize, weight: f64) -> Result<()> {
    if weight.is_nan() || weight < 0.0 {
        return Err(ModelError::InvalidDistribution { target, weight });
    }
    Ok(())
}

impl Distribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// The distribution putting weight 1 on `state`.
    pub fn dirac(state: usize) -> Self {
        let mut d = Self::new();
        d.map.insert(state, 1.0);
        d
    }

    /// Builds a distribution from `(target, weight)` pairs, summing the
    /// weights of repeated targets.
    pub fn from_transitions(transitions: impl IntoIterator<Item = (usize, f64)>) -> Self {
        let mut d = Self::new();
        for (target, weight) in transitions {
            *d.map.entry(target).or_insert(0.0) += weight;
        }
        d
    }

    /// Adds `weight` to the entry of `target`.
    pub fn add(&mut self, target: usize, weight: f64) -> Result<()> {
        check_weight(target, weight)?;
        *self.map.entry(target).or_insert(0.0) += weight;
        Ok(())
    }

    /// Overwrites the entry of `target`. A zero weight removes it.
    pub fn set(&mut self, target: usize, weight: f64) -> Result<()> {
        check_weight(target, weight)?;
        if weight == 0.0 {
            self.map.remove(&target);
        } else {
            self.map.insert(target, weight);
        }
        Ok(())
    }

    pub fn get(&self, target: usize) -> f64 {
        self.map.get(&target).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, target: usize) -> bool {
        self.map.contains_key(&target)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sum of all weights.
    pub fn sum(&self) -> f64 {
        self.map.values().sum()
    }

    /// Sum of all weights except the one of `target`.
    pub fn sum_all_but(&self, target: usize) -> f64 {
        self.map.iter().filter(|(&t, _)| t != target).map(|(_, w)| w).sum()
    }

    /// Target states with an entry.
    pub fn support(&self) -> impl Iterator<Item = usize> + '_ {
        self.map.keys().copied()
    }

    /// Returns true if every target lies in `set`.
    pub fn is_subset_of(&self, set: &crate::bitset::StateSet) -> bool {
        self.map.keys().all(|&t| set.contains(t))
    }

    /// Returns true if some target lies in `set`.
    pub fn contains_one_of(&self, set: &crate::bitset::StateSet) -> bool {
        self.map.keys().any(|&t| set.contains(t))
    }

    /// Iterates `(target, weight)` in increasing target order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.map.iter().map(|(&t, &w)| (t, w))
    }

    /// Renames targets through `f`, merging entries that collide.
    pub fn map_targets(&self, mut f: impl FnMut(usize) -> usize) -> Distribution {
        Distribution::from_transitions(self.iter().map(|(t, w)| (f(t), w)))
    }

    /// Divides every weight by `divisor`.
    pub fn scale(&mut self, divisor: f64) {
        for w in self.map.values_mut() {
            *w /= divisor;
        }
    }
}

impl IntoIterator for Distribution {
    type Item = (usize, f64);
    type IntoIter = std::collections::btree_map::IntoIter<usize, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.into_iter()
    }
}

impl FromIterator<(usize, f64)> for Distribution {
    fn from_iter<I: IntoIterator<Item = (usize, f64)>>(iter: I) -> Self {
        Distribution::from_transitions(iter)
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (t, w)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", t, w)?;
        }
        write!(f, "}}")
    }
}
