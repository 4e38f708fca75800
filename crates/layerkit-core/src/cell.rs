//! Observable cells.
//!
//! An [`ObservableCell`] holds one value and notifies its subscribers
//! synchronously, on the writer's thread, every time the value is set.
//! Writes are never deduplicated and subscribing never replays the current
//! value.
//!
//! The component that declares a cell owns it and is its only writer.
//! Everyone else gets a read-only [`CellView`], which can read the value and
//! manage subscriptions but cannot write.

use parking_lot::{ReentrantMutex, RwLock};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{HandlerError, HandlerResult};

/// Registration token returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(Uuid);

impl SubscriptionToken {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

type Subscriber<T> = Arc<dyn Fn(&T) -> HandlerResult + Send + Sync>;

struct Slot<T> {
    value: T,
    version: u64,
}

/// Single-value container with synchronous change notification
pub struct ObservableCell<T> {
    name: &'static str,
    slot: RwLock<Slot<T>>,
    subscribers: RwLock<Vec<(SubscriptionToken, Subscriber<T>)>>,
    /// Serializes `set` across threads; re-entrant so a subscriber may write
    /// the same cell again.
    write_guard: ReentrantMutex<()>,
}

impl<T> ObservableCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cell holding `initial`, at version 0
    pub fn new(name: &'static str, initial: T) -> Self {
        Self {
            name,
            slot: RwLock::new(Slot {
                value: initial,
                version: 0,
            }),
            subscribers: RwLock::new(Vec::new()),
            write_guard: ReentrantMutex::new(()),
        }
    }

    /// Name used in log output
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Snapshot of the current value
    pub fn get(&self) -> T {
        self.slot.read().value.clone()
    }

    /// Number of writes so far
    pub fn version(&self) -> u64 {
        self.slot.read().version
    }

    /// Store `value`, bump the version and notify every subscriber in
    /// registration order.
    ///
    /// A failing or panicking subscriber is logged and skipped; neither its
    /// error nor its panic reaches the caller.
    pub fn set(&self, value: T) {
        let _guard = self.write_guard.lock();
        {
            let mut slot = self.slot.write();
            slot.value = value.clone();
            slot.version += 1;
        }

        // Snapshot so subscribers can (un)subscribe while being notified
        let subscribers: Vec<(SubscriptionToken, Subscriber<T>)> =
            self.subscribers.read().iter().cloned().collect();

        for (token, subscriber) in subscribers {
            if let Err(e) = HandlerError::catch(|| subscriber(&value)) {
                tracing::warn!("Subscriber {} of cell '{}' failed: {}", token, self.name, e);
            }
        }
    }

    /// Register a subscriber. The current value is not replayed.
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionToken
    where
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        let token = SubscriptionToken::new();
        self.subscribers.write().push((token, Arc::new(subscriber)));
        tracing::debug!("Subscription {} added to cell '{}'", token, self.name);
        token
    }

    /// Remove a subscriber.
    ///
    /// Returns true if the token was registered on this cell.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(t, _)| *t != token);
        let removed = subscribers.len() != before;
        if removed {
            tracing::debug!("Subscription {} removed from cell '{}'", token, self.name);
        }
        removed
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Read-only handle for code that must not write this cell
    pub fn view(&self) -> CellView<'_, T> {
        CellView { cell: self }
    }
}

impl<T> ObservableCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Set only when `value` differs from the current one.
    ///
    /// Returns true if a write (and therefore a notification) happened.
    pub fn set_if_changed(&self, value: T) -> bool {
        if self.slot.read().value == value {
            return false;
        }
        self.set(value);
        true
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ObservableCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.read();
        f.debug_struct("ObservableCell")
            .field("name", &self.name)
            .field("value", &slot.value)
            .field("version", &slot.version)
            .field("subscribers", &self.subscribers.read().len())
            .finish()
    }
}

/// Read-only view of an [`ObservableCell`]
pub struct CellView<'a, T> {
    cell: &'a ObservableCell<T>,
}

impl<'a, T> CellView<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Snapshot of the current value
    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// Number of writes so far
    pub fn version(&self) -> u64 {
        self.cell.version()
    }

    /// Name of the underlying cell
    pub fn name(&self) -> &'static str {
        self.cell.name()
    }

    /// See [`ObservableCell::subscribe`]
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionToken
    where
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        self.cell.subscribe(subscriber)
    }

    /// See [`ObservableCell::unsubscribe`]
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.cell.unsubscribe(token)
    }
}
