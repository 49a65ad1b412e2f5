use std::{cell::RefCell, hash::Hash, rc::Rc, task::Waker};

use slabmap::SlabMap;

use crate::{
    aggregate::{Aggregate, Aggregator},
    fetch::{Fetcher, RetryPolicy},
    keys::{KeySequence, KeyTracker},
    pool::{FetchPool, SlotStatus},
    stabilize::{View, ViewCache},
    stable::Stable,
    subscription::Subscription,
};


type Subscriber<T> = Rc<RefCell<dyn FnMut(&View<T>)>>;

/// A keyed fetch-aggregation cache with identity-stable outputs.
///
/// Give it a set of keys and a [`Fetcher`]; it fetches each key's record
/// independently, aggregates the results in key order, and exposes a
/// [`View`] that a reactive scheduler can watch without ever being driven
/// into an unbounded recomputation loop: every exposed value keeps its
/// previous reference when its content is unchanged, and subscribers are
/// notified at most once per settlement batch, only when the view's content
/// actually changed.
///
/// Consumers that feed derived state back into the set (for example setting
/// the same keys again from inside a notification) terminate for the same
/// reason: an update without a content change notifies nobody.
pub struct QuerySet<K: 'static, T: 'static> {
    tracker: KeyTracker<K>,
    pool: FetchPool<K, T>,
    aggregator: Aggregator<T>,
    cache: ViewCache<T>,
    last_view: Stable<View<T>>,
    subscribers: Rc<RefCell<SlabMap<Subscriber<T>>>>,
}

impl<K, T> QuerySet<K, T>
where
    K: Clone + Eq + Hash + 'static,
    T: PartialEq + 'static,
{
    pub fn new(fetcher: impl Fetcher<K, T> + 'static) -> Self {
        Self::builder(fetcher).build()
    }

    pub fn builder(fetcher: impl Fetcher<K, T> + 'static) -> QuerySetBuilder<K, T> {
        QuerySetBuilder {
            fetcher: Rc::new(fetcher),
            policy: RetryPolicy::default(),
        }
    }

    /// The currently tracked key sequence.
    pub fn keys(&self) -> &KeySequence<K> {
        self.tracker.get()
    }

    /// Replaces the set of keys of interest.
    ///
    /// If `keys` is structurally equal to the current sequence this is a
    /// no-op and the stored sequence is returned unchanged. Otherwise slots
    /// for new keys start fetching, slots for dropped keys are retired (their
    /// in-flight fetches cancelled), and the stabilization cache is cleared:
    /// the old records describe the old keys.
    pub fn set_keys(&mut self, keys: impl IntoIterator<Item = K>) -> KeySequence<K> {
        let prev = self.tracker.get().clone();
        let seq = self.tracker.set(keys.into_iter().collect());
        if !KeySequence::ptr_eq(&prev, &seq) {
            self.pool.sync(&seq);
            self.cache.clear();
            self.recompute_and_notify();
        }
        seq
    }

    /// Drives the in-flight fetches, applying every settlement that has
    /// arrived since the last call.
    ///
    /// All settlements of one call coalesce into a single recomputation, and
    /// subscribers are notified at most once. Returns `true` if any slot
    /// settled.
    pub fn run_fetches(&mut self) -> bool {
        let settled = self.pool.run_fetches();
        if settled > 0 {
            self.recompute_and_notify();
        }
        settled > 0
    }

    /// Re-fetches a settled slot while the view keeps serving the previous
    /// records. Returns `false` if the key is unknown or still fetching.
    pub fn refresh(&mut self, key: &K) -> bool {
        if self.pool.refresh(key) {
            self.recompute_and_notify();
            true
        } else {
            false
        }
    }

    /// Re-fetches every settled slot.
    pub fn refresh_all(&mut self) {
        if self.pool.refresh_all() > 0 {
            self.recompute_and_notify();
        }
    }

    /// The consumer-facing read surface.
    pub fn view(&mut self) -> View<T> {
        match self.last_view.get() {
            Some(view) => view.clone(),
            None => self.recompute().0,
        }
    }

    /// The current aggregate. Two calls without an intervening content change
    /// return the identical allocation.
    pub fn aggregate(&mut self) -> Rc<Aggregate<T>> {
        let keys = self.tracker.get().clone();
        self.aggregator.aggregate(self.pool.slots(&keys))
    }

    /// Registers `f` to be called with the view after every content change.
    ///
    /// `f` is called once immediately with the current view. Dropping the
    /// returned [`Subscription`] unsubscribes.
    pub fn subscribe(&mut self, f: impl FnMut(&View<T>) + 'static) -> Subscription {
        let sub: Subscriber<T> = Rc::new(RefCell::new(f));
        let id = self.subscribers.borrow_mut().insert(sub.clone());
        let view = self.view();
        (&mut *sub.borrow_mut())(&view);
        let subscribers = Rc::downgrade(&self.subscribers);
        Subscription::from_fn(move || {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.borrow_mut().remove(id);
            }
        })
    }

    pub fn status(&self, key: &K) -> Option<SlotStatus> {
        self.pool.status(key)
    }

    /// Number of slots whose fetch has not settled yet.
    pub fn pending_fetches(&self) -> usize {
        self.pool.pending_fetches()
    }

    /// Registers a waker to be woken when a fetch settles, so an embedding
    /// executor knows to call [`run_fetches`](Self::run_fetches) again.
    pub fn attach_waker(&self, waker: &Waker) {
        self.pool.attach_waker(waker);
    }

    /// Cancels all in-flight fetches, clears the cache and the key sequence,
    /// and drops every subscriber. The set is inert until keys are set again.
    pub fn dispose(&mut self) {
        self.pool.clear();
        self.tracker = KeyTracker::new();
        self.cache.clear();
        self.aggregator.reset();
        self.last_view.clear();
        self.last_view.apply(View::detached());
        *self.subscribers.borrow_mut() = SlabMap::new();
    }

    fn recompute(&mut self) -> (View<T>, bool) {
        let keys = self.tracker.get().clone();
        let aggregate = self.aggregator.aggregate(self.pool.slots(&keys));
        let fresh = self.cache.stabilize(&aggregate);
        let prev = self.last_view.get().cloned();
        let view = self.last_view.apply(fresh);
        let changed = match prev {
            Some(prev) => prev != view,
            None => true,
        };
        (view, changed)
    }

    fn recompute_and_notify(&mut self) {
        let (view, changed) = self.recompute();
        if changed {
            let subs: Vec<Subscriber<T>> = self.subscribers.borrow().values().cloned().collect();
            for sub in subs {
                (&mut *sub.borrow_mut())(&view);
            }
        }
    }
}

/// Builder for [`QuerySet`].
pub struct QuerySetBuilder<K: 'static, T: 'static> {
    fetcher: Rc<dyn Fetcher<K, T>>,
    policy: RetryPolicy,
}

impl<K, T> QuerySetBuilder<K, T>
where
    K: Clone + Eq + Hash + 'static,
    T: PartialEq + 'static,
{
    /// Retry policy for transient fetch failures.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> QuerySet<K, T> {
        QuerySet {
            tracker: KeyTracker::new(),
            pool: FetchPool::new(self.fetcher, self.policy),
            aggregator: Aggregator::new(),
            cache: ViewCache::new(),
            last_view: Stable::new(),
            subscribers: Rc::new(RefCell::new(SlabMap::new())),
        }
    }
}
