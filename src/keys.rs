use std::{collections::HashSet, hash::Hash, rc::Rc};

use derive_ex::derive_ex;
use serde::{Deserialize, Serialize};


/// An ordered sequence of unique keys, replaced wholesale and never mutated.
///
/// Two sequences compare equal iff they have the same keys at the same
/// positions. [`KeyTracker`] guarantees that equal content shares one
/// allocation, so downstream code may compare sequences with
/// [`ptr_eq`](Self::ptr_eq).
#[derive_ex(Clone, bound())]
pub struct KeySequence<K>(Rc<[K]>);

impl<K> KeySequence<K> {
    pub fn empty() -> Self {
        Self(Vec::new().into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&K> {
        self.0.get(index)
    }
    pub fn iter(&self) -> std::slice::Iter<'_, K> {
        self.0.iter()
    }
    pub fn as_slice(&self) -> &[K] {
        &self.0
    }

    /// Returns `true` if both sequences share the same allocation.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.0, &other.0)
    }
}

impl<K: Eq + Hash> KeySequence<K> {
    /// Builds a sequence from `keys`.
    ///
    /// # Panics
    ///
    /// Panics if `keys` contains the same key twice.
    pub fn new(keys: Vec<K>) -> Self {
        match Self::try_new(keys) {
            Ok(this) => this,
            Err(index) => panic!("duplicate key at index {index}"),
        }
    }

    fn try_new(keys: Vec<K>) -> Result<Self, usize> {
        let mut seen = HashSet::with_capacity(keys.len());
        for (index, key) in keys.iter().enumerate() {
            if !seen.insert(key) {
                return Err(index);
            }
        }
        Ok(Self(keys.into()))
    }
}

impl<K: PartialEq> PartialEq for KeySequence<K> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}
impl<K: Eq> Eq for KeySequence<K> {}

impl<K: std::fmt::Debug> std::fmt::Debug for KeySequence<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<'a, K> IntoIterator for &'a KeySequence<K> {
    type Item = &'a K;
    type IntoIter = std::slice::Iter<'a, K>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Serialize> Serialize for KeySequence<K> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.collect_seq(self.0.iter())
    }
}
impl<'de, K> Deserialize<'de> for KeySequence<K>
where
    K: Deserialize<'de> + Eq + Hash,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let keys = Vec::<K>::deserialize(deserializer)?;
        Self::try_new(keys)
            .map_err(|index| serde::de::Error::custom(format!("duplicate key at index {index}")))
    }
}

/// Holds the current [`KeySequence`] and re-emits the stored allocation when
/// an update carries no change.
///
/// This is the first stability boundary: every downstream recomputation is
/// gated on this reference, so it must not change unless the content does.
pub struct KeyTracker<K> {
    current: KeySequence<K>,
}

impl<K: Eq + Hash> KeyTracker<K> {
    pub fn new() -> Self {
        Self {
            current: KeySequence::empty(),
        }
    }

    /// Replaces the tracked sequence.
    ///
    /// Returns the previously stored sequence unchanged if `keys` is
    /// structurally equal to it; otherwise stores and returns a new sequence.
    pub fn set(&mut self, keys: Vec<K>) -> KeySequence<K> {
        if self.current.as_slice() != keys.as_slice() {
            self.current = KeySequence::new(keys);
        }
        self.current.clone()
    }

    pub fn get(&self) -> &KeySequence<K> {
        &self.current
    }
}

impl<K: Eq + Hash> Default for KeyTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}
