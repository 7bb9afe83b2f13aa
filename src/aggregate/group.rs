// src/aggregate/group.rs

use std::{collections::HashMap, hash::Hash};

use super::Reduction;

/// Running total for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    pub sum: f64,
    pub count: usize,
}

impl Accumulator {
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Only called on groups that received at least one value.
    pub fn reduce(&self, reduction: Reduction) -> f64 {
        match reduction {
            Reduction::Sum => self.sum,
            Reduction::Mean => self.sum / self.count as f64,
        }
    }
}

/// Ordered group-by: keys come out in the order they were first pushed.
#[derive(Debug, Clone)]
pub struct GroupBy<K> {
    index: HashMap<K, usize>,
    groups: Vec<(K, Accumulator)>,
}

impl<K> Default for GroupBy<K> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> GroupBy<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: K, value: f64) {
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = self.groups.len();
                self.index.insert(key.clone(), slot);
                self.groups.push((key, Accumulator::default()));
                slot
            }
        };
        self.groups[slot].1.push(value);
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Reduce every group, in first-seen order.
    pub fn finish(self, reduction: Reduction) -> Vec<(K, f64)> {
        self.groups
            .into_iter()
            .map(|(key, acc)| (key, acc.reduce(reduction)))
            .collect()
    }
}
