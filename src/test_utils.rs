use std::{
    cell::RefCell,
    collections::HashMap,
    future::poll_fn,
    rc::Rc,
    task::{Poll, Waker},
    time::Duration,
};

use futures::future::LocalBoxFuture;

use crate::{FetchError, FetchFuture, Fetcher};

/// Fetcher whose results are settled by hand from the test body.
///
/// Results can be scripted ahead of time (`script`), in which case the fetch
/// resolves on its first poll, or left in flight and settled later
/// (`settle`). Every call is appended to a log: `fetch:{key}`,
/// `delay:{ms}ms` for retry backoff, and `cancel:{key}` when an in-flight
/// fetch future is dropped.
pub struct TestFetcher<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

struct Shared<T> {
    pending: HashMap<String, Vec<Rc<RefCell<FetchCell<T>>>>>,
    scripted: HashMap<String, Vec<Result<T, FetchError>>>,
    log: Vec<String>,
}

struct FetchCell<T> {
    result: Option<Result<T, FetchError>>,
    waker: Option<Waker>,
}

impl<T: 'static> TestFetcher<T> {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                pending: HashMap::new(),
                scripted: HashMap::new(),
                log: Vec::new(),
            })),
        }
    }

    /// Queues results to be returned immediately, in order, for `key`.
    pub fn script(&self, key: &str, results: impl IntoIterator<Item = Result<T, FetchError>>) {
        self.shared
            .borrow_mut()
            .scripted
            .entry(key.to_string())
            .or_default()
            .extend(results);
    }

    /// Settles the oldest in-flight fetch for `key`.
    ///
    /// # Panics
    ///
    /// Panics if no fetch for `key` is in flight.
    pub fn settle(&self, key: &str, result: Result<T, FetchError>) {
        let cell = {
            let mut s = self.shared.borrow_mut();
            let queue = s.pending.get_mut(key).expect("no in-flight fetch for key");
            assert!(!queue.is_empty(), "no in-flight fetch for key");
            queue.remove(0)
        };
        let waker = {
            let mut c = cell.borrow_mut();
            c.result = Some(result);
            c.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Number of fetches for `key` that have been started and not settled.
    pub fn in_flight(&self, key: &str) -> usize {
        self.shared
            .borrow()
            .pending
            .get(key)
            .map_or(0, |queue| queue.len())
    }

    pub fn fetch_count(&self, key: &str) -> usize {
        let needle = format!("fetch:{key}");
        self.shared
            .borrow()
            .log
            .iter()
            .filter(|entry| **entry == needle)
            .count()
    }

    pub fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut self.shared.borrow_mut().log)
    }
}

impl<T> Clone for TestFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: 'static> Fetcher<String, T> for TestFetcher<T> {
    fn fetch(&self, key: &String) -> FetchFuture<T> {
        let mut s = self.shared.borrow_mut();
        s.log.push(format!("fetch:{key}"));
        if let Some(queue) = s.scripted.get_mut(key) {
            if !queue.is_empty() {
                let result = queue.remove(0);
                return Box::pin(std::future::ready(result));
            }
        }
        let cell = Rc::new(RefCell::new(FetchCell {
            result: None,
            waker: None,
        }));
        s.pending.entry(key.clone()).or_default().push(cell.clone());
        drop(s);

        let shared = self.shared.clone();
        let key = key.clone();
        Box::pin(async move {
            let mut guard = CancelGuard {
                shared,
                key,
                armed: true,
            };
            let result = poll_fn(|cx| {
                let mut c = cell.borrow_mut();
                if let Some(result) = c.result.take() {
                    Poll::Ready(result)
                } else {
                    c.waker = Some(cx.waker().clone());
                    Poll::Pending
                }
            })
            .await;
            guard.armed = false;
            result
        })
    }

    fn delay(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        self.shared
            .borrow_mut()
            .log
            .push(format!("delay:{}ms", duration.as_millis()));
        Box::pin(std::future::ready(()))
    }
}

struct CancelGuard<T> {
    shared: Rc<RefCell<Shared<T>>>,
    key: String,
    armed: bool,
}

impl<T> Drop for CancelGuard<T> {
    fn drop(&mut self) {
        if self.armed {
            self.shared
                .borrow_mut()
                .log
                .push(format!("cancel:{}", self.key));
        }
    }
}
