use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
    mem::take,
    rc::Rc,
    sync::{Arc, Mutex},
    task::{Context, Poll, Wake, Waker},
};

use futures::task::noop_waker;
use parse_display::Display;
use slabmap::SlabMap;

use crate::{
    error::FetchError,
    fetch::{FetchFuture, Fetcher, RetryPolicy},
    keys::KeySequence,
};


/// Settlement state of a [`FetchSlot`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Display)]
#[display(style = "snake_case")]
pub enum SlotStatus {
    Pending,
    Success,
    Error,
}

pub(crate) enum SlotState<T> {
    Pending,
    Success(Rc<T>),
    Error(FetchError),
}

/// Per-key unit of asynchronous fetch state.
///
/// A slot is created when its key first appears in the key sequence, settles
/// at most once per fetch attempt, and is dropped when its key disappears.
/// Slots are owned exclusively by the [`FetchPool`]; everything else reads
/// them through these accessors.
pub struct FetchSlot<K, T> {
    key: K,
    state: SlotState<T>,
}

impl<K, T> FetchSlot<K, T> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn status(&self) -> SlotStatus {
        match self.state {
            SlotState::Pending => SlotStatus::Pending,
            SlotState::Success(_) => SlotStatus::Success,
            SlotState::Error(_) => SlotStatus::Error,
        }
    }

    /// The fetched record, once the slot settled successfully.
    pub fn value(&self) -> Option<&T> {
        match &self.state {
            SlotState::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match &self.state {
            SlotState::Error(e) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn state(&self) -> &SlotState<T> {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn with_state(key: K, state: SlotState<T>) -> Self {
        Self { key, state }
    }
}

struct SlotEntry<K, T> {
    slot: FetchSlot<K, T>,
    fut: Option<FetchFuture<T>>,
    waker: Waker,
    wake_key: usize,
}

/// Owns the set of fetch slots keyed by key.
///
/// Creates a slot (and starts its fetch) the first time a key appears,
/// returns existing slots untouched for keys already seen, and retires a
/// slot when its key drops out of the sequence, cancelling the in-flight
/// fetch by dropping its future. Fetches for distinct keys proceed
/// independently; [`run_fetches`](Self::run_fetches) applies whatever has
/// completed and reports how many slots settled so the caller can schedule
/// exactly one downstream recomputation per batch.
pub struct FetchPool<K: 'static, T: 'static> {
    fetcher: Rc<dyn Fetcher<K, T>>,
    policy: RetryPolicy,
    slots: SlabMap<SlotEntry<K, T>>,
    lookup: HashMap<K, usize>,
    wakes: WakeTable,
}

impl<K, T> FetchPool<K, T>
where
    K: Clone + Eq + Hash + 'static,
    T: 'static,
{
    pub fn new(fetcher: Rc<dyn Fetcher<K, T>>, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            policy,
            slots: SlabMap::new(),
            lookup: HashMap::new(),
            wakes: WakeTable::new(),
        }
    }

    /// Brings the slot table in line with `keys`.
    pub fn sync(&mut self, keys: &KeySequence<K>) {
        let keep: HashSet<&K> = keys.iter().collect();
        let mut retired = Vec::new();
        self.lookup.retain(|key, id| {
            if keep.contains(key) {
                true
            } else {
                retired.push(*id);
                false
            }
        });
        for id in retired {
            self.slots.remove(id);
        }
        for key in keys {
            if !self.lookup.contains_key(key) {
                self.spawn(key.clone());
            }
        }
    }

    fn spawn(&mut self, key: K) {
        let fut = retry_fetch(&self.fetcher, &key, self.policy);
        let id = self.slots.insert(SlotEntry {
            slot: FetchSlot {
                key: key.clone(),
                state: SlotState::Pending,
            },
            fut: Some(fut),
            waker: noop_waker(),
            wake_key: usize::MAX,
        });
        let (waker, wake_key) = self.wakes.register(id);
        let entry = &mut self.slots[id];
        entry.waker = waker;
        entry.wake_key = wake_key;
        self.lookup.insert(key, id);
        self.wakes.raise(wake_key);
    }

    /// Re-arms a settled slot with a fresh fetch.
    ///
    /// Returns `false` if the key is not tracked or its fetch is still in
    /// flight. Errored slots may be re-armed this way; the slot goes back to
    /// pending while the cached aggregate keeps serving downstream.
    pub fn refresh(&mut self, key: &K) -> bool {
        let Some(&id) = self.lookup.get(key) else {
            return false;
        };
        let entry = &mut self.slots[id];
        if entry.fut.is_some() {
            return false;
        }
        entry.slot.state = SlotState::Pending;
        entry.fut = Some(retry_fetch(&self.fetcher, key, self.policy));
        self.wakes.raise(entry.wake_key);
        true
    }

    /// Re-arms every settled slot. Returns the number of slots re-armed.
    pub fn refresh_all(&mut self) -> usize {
        let mut count = 0;
        for entry in self.slots.values_mut() {
            if entry.fut.is_some() {
                continue;
            }
            entry.slot.state = SlotState::Pending;
            entry.fut = Some(retry_fetch(&self.fetcher, &entry.slot.key, self.policy));
            self.wakes.raise(entry.wake_key);
            count += 1;
        }
        count
    }

    /// The slots for `keys`, in key order.
    pub fn slots<'a>(
        &'a self,
        keys: &'a KeySequence<K>,
    ) -> impl Iterator<Item = &'a FetchSlot<K, T>> + 'a {
        keys.iter()
            .filter_map(move |key| Some(&self.slots.get(*self.lookup.get(key)?)?.slot))
    }

    pub fn status(&self, key: &K) -> Option<SlotStatus> {
        let id = self.lookup.get(key)?;
        Some(self.slots.get(*id)?.slot.status())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots whose fetch has not settled yet.
    pub fn pending_fetches(&self) -> usize {
        self.slots
            .values()
            .filter(|e| e.slot.status() == SlotStatus::Pending)
            .count()
    }

    /// Polls every fetch that has been woken since the last call and applies
    /// the settlements. Returns the number of slots that settled.
    ///
    /// A wake for a slot that has since been retired is discarded here; its
    /// result never reaches the slot table.
    pub fn run_fetches(&mut self) -> usize {
        let mut settled = 0;
        loop {
            let woken = self.wakes.take_woken();
            if woken.is_empty() {
                break;
            }
            for id in woken {
                let Some(entry) = self.slots.get_mut(id) else {
                    continue;
                };
                let Some(fut) = entry.fut.as_mut() else {
                    continue;
                };
                let mut cx = Context::from_waker(&entry.waker);
                if let Poll::Ready(result) = fut.as_mut().poll(&mut cx) {
                    entry.fut = None;
                    entry.slot.state = match result {
                        Ok(value) => SlotState::Success(Rc::new(value)),
                        Err(e) => SlotState::Error(e),
                    };
                    settled += 1;
                }
            }
        }
        settled
    }

    /// Registers a waker to be woken when any fetch settles, so an embedding
    /// executor knows to call [`run_fetches`](Self::run_fetches) again.
    pub fn attach_waker(&self, waker: &Waker) {
        self.wakes.set_host_waker(waker);
    }

    /// Drops every slot, cancelling all in-flight fetches.
    pub fn clear(&mut self) {
        self.lookup.clear();
        self.slots = SlabMap::new();
    }
}

fn retry_fetch<K, T>(fetcher: &Rc<dyn Fetcher<K, T>>, key: &K, policy: RetryPolicy) -> FetchFuture<T>
where
    K: Clone + 'static,
    T: 'static,
{
    let fetcher = fetcher.clone();
    let key = key.clone();
    Box::pin(async move {
        let mut attempt = 0;
        loop {
            match fetcher.fetch(&key).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts() => {
                    fetcher.delay(policy.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    })
}

/// Routes fetch wakes back to slot ids.
///
/// The request queue lives behind `Arc<Mutex<_>>` because wakers must be
/// `Send + Sync`; everything else stays on the owning thread.
struct WakeTable {
    entries: SlabMap<usize>,
    requests: WakeRequests,
}

impl WakeTable {
    fn new() -> Self {
        Self {
            entries: SlabMap::new(),
            requests: WakeRequests::default(),
        }
    }

    fn register(&mut self, slot_id: usize) -> (Waker, usize) {
        let key = self.entries.insert(slot_id);
        let waker = Arc::new(SlotWake {
            requests: self.requests.clone(),
            key,
        })
        .into();
        (waker, key)
    }

    fn raise(&self, wake_key: usize) {
        let host = {
            let mut r = self.requests.0.lock().unwrap();
            r.wakes.push(wake_key);
            r.host.take()
        };
        if let Some(host) = host {
            host.wake();
        }
    }

    fn set_host_waker(&self, waker: &Waker) {
        self.requests.0.lock().unwrap().host = Some(waker.clone());
    }

    fn take_woken(&mut self) -> Vec<usize> {
        let (wakes, drops) = {
            let mut r = self.requests.0.lock().unwrap();
            (take(&mut r.wakes), take(&mut r.drops))
        };
        for key in drops {
            self.entries.remove(key);
        }
        wakes
            .into_iter()
            .filter_map(|key| self.entries.get(key).copied())
            .collect()
    }
}

#[derive(Clone, Default)]
struct WakeRequests(Arc<Mutex<RawWakeRequests>>);

#[derive(Default)]
struct RawWakeRequests {
    wakes: Vec<usize>,
    drops: Vec<usize>,
    host: Option<Waker>,
}

struct SlotWake {
    requests: WakeRequests,
    key: usize,
}

impl Wake for SlotWake {
    fn wake(self: Arc<Self>) {
        let host = {
            let mut r = self.requests.0.lock().unwrap();
            r.wakes.push(self.key);
            r.host.take()
        };
        if let Some(host) = host {
            host.wake();
        }
    }
}

impl Drop for SlotWake {
    fn drop(&mut self) {
        if let Ok(mut r) = self.requests.0.lock() {
            r.drops.push(self.key);
        }
    }
}
