use std::rc::Rc;

use derive_ex::derive_ex;
use parse_display::Display;
use serde::Serialize;

use crate::{
    pool::{FetchSlot, SlotState},
    stable::Stable,
};


/// Shared, immutable sequence of fetched records, in key order.
///
/// Equality is element-wise by value with a pointer fast path, so rebuilding
/// the sequence from unchanged slots still compares equal (and cheaply).
#[derive_ex(Clone, bound())]
pub struct Records<T>(Rc<[Rc<T>]>);

impl<T> Records<T> {
    pub(crate) fn from_values(values: Vec<Rc<T>>) -> Self {
        Self(values.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&T> {
        self.0.get(index).map(Rc::as_ref)
    }
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.0.iter().map(Rc::as_ref)
    }

    /// Returns `true` if both sequences share the same allocation.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.0, &other.0)
    }
}

impl<T> std::ops::Index<usize> for Records<T> {
    type Output = T;
    fn index(&self, index: usize) -> &T {
        &*self.0[index]
    }
}

impl<T: PartialEq> PartialEq for Records<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
            || self.0.len() == other.0.len()
                && self
                    .0
                    .iter()
                    .zip(other.0.iter())
                    .all(|(a, b)| Rc::ptr_eq(a, b) || a == b)
    }
}
impl<T: Eq> Eq for Records<T> {}

impl<T: std::fmt::Debug> std::fmt::Debug for Records<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Serialize> Serialize for Records<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.collect_seq(self.iter())
    }
}

/// Combined state of all slots for the current key sequence.
#[derive(Debug)]
#[derive_ex(Clone, bound())]
pub enum Aggregate<T> {
    /// At least one slot is still fetching and none has failed.
    Loading,
    /// Every slot settled successfully.
    Ready(Records<T>),
    /// At least one slot failed.
    Errored,
}

impl<T> Aggregate<T> {
    pub fn status(&self) -> AggregateStatus {
        match self {
            Aggregate::Loading => AggregateStatus::Loading,
            Aggregate::Ready(_) => AggregateStatus::Ready,
            Aggregate::Errored => AggregateStatus::Errored,
        }
    }

    pub fn records(&self) -> Option<&Records<T>> {
        match self {
            Aggregate::Ready(records) => Some(records),
            _ => None,
        }
    }
}

impl<T: PartialEq> PartialEq for Aggregate<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Aggregate::Loading, Aggregate::Loading) => true,
            (Aggregate::Errored, Aggregate::Errored) => true,
            (Aggregate::Ready(a), Aggregate::Ready(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display)]
#[display(style = "snake_case")]
pub enum AggregateStatus {
    Loading,
    Ready,
    Errored,
}

/// Combines slot states into an [`Aggregate`].
///
/// The only state it holds is the last emitted aggregate, used for the
/// memoization rule: when a freshly computed aggregate is structurally equal
/// to the previous one, the previous allocation is returned unchanged. A
/// scheduler comparing by reference therefore sees a change exactly when the
/// content changed.
pub struct Aggregator<T> {
    last: Stable<Rc<Aggregate<T>>>,
}

impl<T: PartialEq> Aggregator<T> {
    pub fn new() -> Self {
        Self { last: Stable::new() }
    }

    /// Aggregates `slots` in iteration order.
    ///
    /// Any errored slot makes the whole aggregate [`Errored`](Aggregate::Errored)
    /// immediately, without waiting for pending slots.
    pub fn aggregate<'a, K: 'a>(
        &mut self,
        slots: impl IntoIterator<Item = &'a FetchSlot<K, T>>,
    ) -> Rc<Aggregate<T>>
    where
        T: 'a,
    {
        let mut values = Vec::new();
        let mut pending = false;
        for slot in slots {
            match slot.state() {
                SlotState::Error(_) => return self.last.apply(Rc::new(Aggregate::Errored)),
                SlotState::Pending => pending = true,
                SlotState::Success(value) => values.push(value.clone()),
            }
        }
        let fresh = if pending {
            Aggregate::Loading
        } else {
            Aggregate::Ready(Records::from_values(values))
        };
        self.last.apply(Rc::new(fresh))
    }

    pub fn reset(&mut self) {
        self.last.clear();
    }
}

impl<T: PartialEq> Default for Aggregator<T> {
    fn default() -> Self {
        Self::new()
    }
}
