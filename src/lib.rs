//! A stable aggregation cache for keyed asynchronous fetches.
//!
//! A [`QuerySet`] fetches the record behind each key of a changing key
//! sequence, aggregates the results in key order, and exposes a [`View`] to
//! a reactive scheduler. The point of the crate is what it does *not* do:
//! it never re-emits a value under a new reference when the content is
//! unchanged. A derived container that is rebuilt on every pass makes any
//! effect depending on its identity fire on every pass, and if that effect
//! in turn triggers another pass, the cycle never terminates. Every boundary
//! here crosses a memoize-by-previous-value step ([`Stable`]) instead, and
//! subscribers are notified only on content change.
//!
//! ```
//! use queryset::{fetch_fn, FetchError, QuerySet};
//!
//! let mut set: QuerySet<String, usize> =
//!     QuerySet::new(fetch_fn(|key: String| async move { Ok::<_, FetchError>(key.len()) }));
//! set.set_keys(["a".to_string(), "bbb".to_string()]);
//! set.run_fetches();
//!
//! let view = set.view();
//! assert!(!view.is_error());
//! let lens: Vec<usize> = view.records().unwrap().iter().copied().collect();
//! assert_eq!(lens, [1, 3]);
//! ```

mod aggregate;
mod error;
mod fetch;
mod keys;
mod pool;
mod query_set;
mod stabilize;
mod stable;
mod subscription;

#[cfg(test)]
mod test_utils;

pub use aggregate::*;
pub use error::*;
pub use fetch::*;
pub use keys::*;
pub use pool::*;
pub use query_set::*;
pub use stabilize::*;
pub use stable::*;
pub use subscription::*;
