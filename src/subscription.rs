use std::mem::take;

/// Handle that keeps a [`QuerySet`](crate::QuerySet) subscription alive.
///
/// Dropping the subscription removes the callback; it is never called again.
#[derive(Default)]
#[must_use]
pub struct Subscription(RawSubscription);

impl Subscription {
    /// A subscription not connected to anything.
    pub fn empty() -> Self {
        Subscription(RawSubscription::Empty)
    }

    /// Runs `f` when the subscription is dropped.
    pub fn from_fn(f: impl FnOnce() + 'static) -> Self {
        Subscription(RawSubscription::Fn(Box::new(f)))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        match take(&mut self.0) {
            RawSubscription::Empty => {}
            RawSubscription::Fn(f) => f(),
        }
    }
}

#[derive(Default)]
enum RawSubscription {
    #[default]
    Empty,
    Fn(Box<dyn FnOnce() + 'static>),
}
