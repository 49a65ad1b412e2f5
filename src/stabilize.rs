use derive_ex::derive_ex;
use serde::Serialize;

use crate::aggregate::{Aggregate, Records};

#[cfg(test)]
mod tests;

/// What consumers of the cache observe.
///
/// Once `records` has been populated by a successful aggregate it is never
/// reset to `None` while a refresh is merely in flight; it is replaced by the
/// next successful aggregate, or cleared when the owner replaces the key
/// sequence wholesale or disposes the set.
#[derive(Debug)]
#[derive_ex(Clone, bound())]
pub struct View<T> {
    records: Option<Records<T>>,
    is_error: bool,
    is_refreshing: bool,
}

impl<T> View<T> {
    pub(crate) fn detached() -> Self {
        Self {
            records: None,
            is_error: false,
            is_refreshing: false,
        }
    }

    pub(crate) fn new(records: Option<Records<T>>, is_error: bool, is_refreshing: bool) -> Self {
        Self {
            records,
            is_error,
            is_refreshing,
        }
    }

    /// The last complete set of records, in key order.
    pub fn records(&self) -> Option<&Records<T>> {
        self.records.as_ref()
    }

    /// The sole externally observable error signal. Sticky until the key
    /// sequence changes or a refresh succeeds.
    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// A fetch is in flight while the previous records (if any) are served.
    pub fn is_refreshing(&self) -> bool {
        self.is_refreshing
    }

    /// True on the initial load, before any records exist. Render a loading
    /// state for this, an error state for [`is_error`](Self::is_error), and
    /// the records otherwise.
    pub fn is_loading(&self) -> bool {
        self.is_refreshing && self.records.is_none()
    }
}

impl<T: PartialEq> PartialEq for View<T> {
    fn eq(&self, other: &Self) -> bool {
        self.is_error == other.is_error
            && self.is_refreshing == other.is_refreshing
            && self.records == other.records
    }
}

impl<T: Serialize> Serialize for View<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("View", 3)?;
        s.serialize_field("records", &self.records)?;
        s.serialize_field("is_error", &self.is_error)?;
        s.serialize_field("is_refreshing", &self.is_refreshing)?;
        s.end()
    }
}

/// Retains the last complete set of records and serves it while a refresh is
/// in flight, so consumers never fall back to "no data" after the first
/// successful load.
pub struct ViewCache<T> {
    cached: Option<Records<T>>,
}

impl<T: PartialEq> ViewCache<T> {
    pub fn new() -> Self {
        Self { cached: None }
    }

    /// Maps `aggregate` to the consumer-facing view.
    ///
    /// On `Ready` the records are stored as the new cache; if they are
    /// value-equal to the cached ones the cached allocation is kept, so the
    /// served reference does not change without a content change. On
    /// `Loading` and `Errored` the cached records are served verbatim.
    pub fn stabilize(&mut self, aggregate: &Aggregate<T>) -> View<T> {
        match aggregate {
            Aggregate::Ready(records) => {
                if self.cached.as_ref() != Some(records) {
                    self.cached = Some(records.clone());
                }
                View::new(self.cached.clone(), false, false)
            }
            Aggregate::Loading => View::new(self.cached.clone(), false, true),
            Aggregate::Errored => View::new(self.cached.clone(), true, false),
        }
    }

    /// Forgets the cached records. Called only when the owner replaces the
    /// key sequence wholesale or disposes the set, never on a mere refresh.
    pub fn clear(&mut self) {
        self.cached = None;
    }
}

impl<T: PartialEq> Default for ViewCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
