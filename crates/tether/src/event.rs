#![forbid(unsafe_code)]

//! Ordered listener registry shared by values and their observables.
//!
//! An [`Event<A>`] owns a registry and fires it synchronously with
//! [`Event::run`]. Code that should only register callbacks gets an
//! [`Observer<A>`] handle onto the same registry.
//!
//! The registry keeps four kinds of entries in one list:
//!
//! - strong listeners (`Fn()`) and consumers (`Fn(&A)`), owned by the registry;
//! - weak listeners and consumers, holding only a [`Weak`] to a callback the
//!   caller keeps alive. Dead weak entries are pruned lazily.
//!
//! [`Observer::subscribe`] combines the two: the registry keeps a weak entry
//! and the returned [`Subscription`] owns the callback, so dropping the
//! subscription deregisters it.
//!
//! # Invariants
//!
//! 1. Callbacks run in registration order, across all four kinds.
//! 2. Registering the same callback twice under the same kind is a no-op and
//!    reports `false`.
//! 3. No lock is held while callbacks run; a callback may add or remove
//!    entries, which takes effect from the next `run`. A run already in
//!    progress still invokes a callback removed after it started.
//! 4. Registration and removal are safe from any thread.
//! 5. A weak entry never keeps its callback alive.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::lock;

/// A callback taking no arguments.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// A callback receiving the event argument.
pub type Consumer<A> = Arc<dyn Fn(&A) + Send + Sync>;

type WeakListener = Weak<dyn Fn() + Send + Sync>;
type WeakConsumer<A> = Weak<dyn Fn(&A) + Send + Sync>;

enum Entry<A> {
    Listener(Listener),
    Consumer(Consumer<A>),
    WeakListener(WeakListener),
    WeakConsumer(WeakConsumer<A>),
}

enum Callback<A> {
    Listener(Listener),
    Consumer(Consumer<A>),
}

impl<A> Entry<A> {
    fn is_alive(&self) -> bool {
        match self {
            Self::WeakListener(weak) => weak.strong_count() > 0,
            Self::WeakConsumer(weak) => weak.strong_count() > 0,
            Self::Listener(_) | Self::Consumer(_) => true,
        }
    }

    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Listener(a), Self::Listener(b)) => Arc::ptr_eq(a, b),
            (Self::Consumer(a), Self::Consumer(b)) => Arc::ptr_eq(a, b),
            (Self::WeakListener(a), Self::WeakListener(b)) => a.ptr_eq(b),
            (Self::WeakConsumer(a), Self::WeakConsumer(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    fn callback(&self) -> Option<Callback<A>> {
        match self {
            Self::Listener(listener) => Some(Callback::Listener(Arc::clone(listener))),
            Self::Consumer(consumer) => Some(Callback::Consumer(Arc::clone(consumer))),
            Self::WeakListener(weak) => weak.upgrade().map(Callback::Listener),
            Self::WeakConsumer(weak) => weak.upgrade().map(Callback::Consumer),
        }
    }
}

struct Registry<A> {
    entries: Mutex<Vec<Entry<A>>>,
}

impl<A> Registry<A> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn add(&self, entry: Entry<A>) -> bool {
        let mut entries = lock(&self.entries);
        entries.retain(Entry::is_alive);
        if entries.iter().any(|existing| existing.same(&entry)) {
            return false;
        }
        entries.push(entry);
        true
    }

    fn remove(&self, entry: &Entry<A>) -> bool {
        let mut entries = lock(&self.entries);
        let position = entries.iter().position(|existing| existing.same(entry));
        if let Some(index) = position {
            entries.remove(index);
        }
        entries.retain(Entry::is_alive);
        position.is_some()
    }

    fn len(&self) -> usize {
        lock(&self.entries).iter().filter(|e| e.is_alive()).count()
    }
}

/// Drops dead weak entries; lets [`Subscription`] reach a registry without
/// knowing its argument type.
trait Prune {
    fn prune(&self);
}

impl<A> Prune for Registry<A> {
    fn prune(&self) {
        lock(&self.entries).retain(Entry::is_alive);
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// An event source: fires every registered callback on [`run`](Self::run).
pub struct Event<A> {
    registry: Arc<Registry<A>>,
}

impl<A: 'static> Event<A> {
    /// Create an event with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new()),
        }
    }

    /// Invoke all live callbacks in registration order.
    ///
    /// The registry is snapshotted first: callbacks registered while this
    /// call is running are not invoked until the next one, and callbacks
    /// removed while it is running are still invoked this once.
    pub fn run(&self, argument: &A) {
        let callbacks: Vec<Callback<A>> = {
            let mut entries = lock(&self.registry.entries);
            entries.retain(Entry::is_alive);
            entries.iter().filter_map(Entry::callback).collect()
        };
        for callback in callbacks {
            match callback {
                Callback::Listener(listener) => listener(),
                Callback::Consumer(consumer) => consumer(argument),
            }
        }
    }

    /// A registration-only handle onto this event's registry.
    #[must_use]
    pub fn observer(&self) -> Observer<A> {
        Observer {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<A: 'static> Default for Event<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("callbacks", &self.registry.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Registers and removes callbacks on an [`Event`]'s registry.
///
/// Every `add_*`/`remove_*` method reports whether the registry changed.
/// Callbacks are identified by their `Arc` allocation, so keep the `Arc`
/// around to remove it later.
pub struct Observer<A> {
    registry: Arc<Registry<A>>,
}

impl<A> Clone for Observer<A> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<A: 'static> Observer<A> {
    pub fn add_listener(&self, listener: &Listener) -> bool {
        self.registry.add(Entry::Listener(Arc::clone(listener)))
    }

    pub fn remove_listener(&self, listener: &Listener) -> bool {
        self.registry.remove(&Entry::Listener(Arc::clone(listener)))
    }

    pub fn add_consumer(&self, consumer: &Consumer<A>) -> bool {
        self.registry.add(Entry::Consumer(Arc::clone(consumer)))
    }

    pub fn remove_consumer(&self, consumer: &Consumer<A>) -> bool {
        self.registry.remove(&Entry::Consumer(Arc::clone(consumer)))
    }

    /// Register `listener` without owning it; it stops firing once the
    /// caller drops the last `Arc`.
    pub fn add_weak_listener(&self, listener: &Listener) -> bool {
        self.registry
            .add(Entry::WeakListener(Arc::downgrade(listener)))
    }

    pub fn remove_weak_listener(&self, listener: &Listener) -> bool {
        self.registry
            .remove(&Entry::WeakListener(Arc::downgrade(listener)))
    }

    /// Register `consumer` without owning it; it stops firing once the
    /// caller drops the last `Arc`.
    pub fn add_weak_consumer(&self, consumer: &Consumer<A>) -> bool {
        self.registry
            .add(Entry::WeakConsumer(Arc::downgrade(consumer)))
    }

    pub fn remove_weak_consumer(&self, consumer: &Consumer<A>) -> bool {
        self.registry
            .remove(&Entry::WeakConsumer(Arc::downgrade(consumer)))
    }

    /// Register `callback` for as long as the returned guard lives.
    pub fn subscribe(&self, callback: impl Fn(&A) + Send + Sync + 'static) -> Subscription {
        let callback: Consumer<A> = Arc::new(callback);
        self.registry
            .add(Entry::WeakConsumer(Arc::downgrade(&callback)));
        Subscription::new(self.prune_handle(), Box::new(callback))
    }

    /// Like [`subscribe`](Self::subscribe), for a callback without arguments.
    pub fn subscribe_listener(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        let callback: Listener = Arc::new(callback);
        self.registry
            .add(Entry::WeakListener(Arc::downgrade(&callback)));
        Subscription::new(self.prune_handle(), Box::new(callback))
    }

    /// Number of live callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune_handle(&self) -> Weak<dyn Prune + Send + Sync> {
        let registry: Arc<dyn Prune + Send + Sync> = self.registry.clone();
        Arc::downgrade(&registry)
    }
}

impl<A> fmt::Debug for Observer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("callbacks", &self.registry.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// RAII guard owning a subscribed callback.
///
/// The registry only holds a weak reference, so dropping the guard stops the
/// callback immediately; the stale entry is pruned on drop.
#[must_use = "dropping the subscription deregisters the callback"]
pub struct Subscription {
    registry: Weak<dyn Prune + Send + Sync>,
    callback: Option<Box<dyn Send + Sync>>,
}

impl Subscription {
    fn new(registry: Weak<dyn Prune + Send + Sync>, callback: Box<dyn Send + Sync>) -> Self {
        Self {
            registry,
            callback: Some(callback),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        drop(self.callback.take());
        if let Some(registry) = self.registry.upgrade() {
            registry.prune();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &(self.registry.strong_count() > 0))
            .finish()
    }
}
