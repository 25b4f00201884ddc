//! The label registry module
//! Maps user-facing labels to class slots

use crate::error::{ClassifierError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// One-to-one binding between labels and slot indices.
///
/// Unbound slots live in a sorted free pool, so the smallest free slot is
/// always handed out first. Bound slots plus free slots always equal the
/// fixed capacity.
#[derive(Debug, Clone)]
pub struct LabelRegistry {
    by_label: BTreeMap<String, usize>,
    by_slot: Vec<Option<String>>,
    free: BTreeSet<usize>,
}

impl LabelRegistry {
    pub fn new(num_classes: usize) -> LabelRegistry {
        LabelRegistry {
            by_label: BTreeMap::new(),
            by_slot: vec![None; num_classes],
            free: (0..num_classes).collect(),
        }
    }

    /// Returns the slot of `label`, binding it to the smallest free slot if
    /// it is new.
    ///
    /// # Examples
    ///
    /// ```
    /// use knnclass::LabelRegistry;
    ///
    /// let mut labels = LabelRegistry::new(2);
    /// assert_eq!(labels.bind("cat").unwrap(), 0);
    /// assert_eq!(labels.bind("dog").unwrap(), 1);
    /// assert_eq!(labels.bind("cat").unwrap(), 0);
    ///
    /// // No slot left for a third label
    /// assert!(labels.bind("bird").is_err());
    /// ```
    pub fn bind(&mut self, label: &str) -> Result<usize> {
        if let Some(&slot) = self.by_label.get(label) {
            return Ok(slot);
        }

        let slot = self.free
            .pop_first()
            .ok_or_else(|| ClassifierError::CapacityExceeded(label.to_string()))?;
        self.by_label.insert(label.to_string(), slot);
        self.by_slot[slot] = Some(label.to_string());
        Ok(slot)
    }

    /// Removes the binding of `label` and returns its slot to the pool.
    pub fn unbind(&mut self, label: &str) -> Result<usize> {
        let slot = self.by_label
            .remove(label)
            .ok_or_else(|| ClassifierError::UnknownLabel(label.to_string()))?;
        self.by_slot[slot] = None;
        self.free.insert(slot);
        Ok(slot)
    }

    pub fn label_for(&self, slot: usize) -> Option<&str> {
        self.by_slot.get(slot).and_then(|l| l.as_deref())
    }

    pub fn slot_for(&self, label: &str) -> Option<usize> {
        self.by_label.get(label).copied()
    }

    /// Bound `(slot, label)` pairs in ascending slot order.
    pub fn bound(&self) -> impl Iterator<Item = (usize, &str)> {
        self.by_slot.iter()
            .enumerate()
            .filter_map(|(slot, label)| label.as_deref().map(|l| (slot, l)))
    }

    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.by_slot.len()
    }

    /// Unbinds every label.
    pub fn clear_all(&mut self) {
        self.by_label.clear();
        self.by_slot.iter_mut().for_each(|l| *l = None);
        self.free = (0..self.by_slot.len()).collect();
    }
}
