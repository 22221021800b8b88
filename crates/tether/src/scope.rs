#![forbid(unsafe_code)]

//! Lifecycle management for groups of subscriptions and links.

use std::fmt;

use crate::error::ValueError;
use crate::event::Subscription;
use crate::observable::Observable;
use crate::value::{Value, ValueType};

type Release = Box<dyn FnOnce() + Send + Sync>;

enum Held {
    Subscription(Subscription),
    Release(Release),
}

impl Held {
    fn release(self) {
        match self {
            Self::Subscription(subscription) => drop(subscription),
            Self::Release(release) => release(),
        }
    }
}

/// Collects subscriptions and links for a logical scope (e.g., a form).
///
/// When the scope is dropped, everything it holds is released: subscriptions
/// are deregistered and links are unlinked.
///
/// # Invariants
///
/// 1. Entries are released in reverse registration order.
/// 2. After drop or `clear()`, no callback held by this scope fires and no
///    link made through it propagates.
/// 3. `clear()` leaves the scope empty and reusable.
/// 4. The scope never keeps a linked cell alive.
#[derive(Default)]
pub struct ListenerScope {
    held: Vec<Held>,
}

impl ListenerScope {
    #[must_use]
    pub fn new() -> Self {
        Self { held: Vec::new() }
    }

    /// Keep `subscription` alive until the scope is released.
    pub fn hold(&mut self, subscription: Subscription) -> &mut Self {
        self.held.push(Held::Subscription(subscription));
        self
    }

    /// Subscribe to `source` within this scope.
    pub fn subscribe<T: ValueType>(
        &mut self,
        source: &Observable<T>,
        callback: impl Fn(&Option<T>) + Send + Sync + 'static,
    ) -> &mut Self {
        self.hold(source.subscribe(callback))
    }

    /// Subscribe a callback without arguments to `source` within this scope.
    pub fn subscribe_listener<T: ValueType>(
        &mut self,
        source: &Observable<T>,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> &mut Self {
        self.hold(source.observer().subscribe_listener(callback))
    }

    /// Link `linked` to `original` until the scope is released.
    ///
    /// # Errors
    ///
    /// As [`Value::link`]; nothing is held on failure.
    pub fn link<T: ValueType>(&mut self, linked: &Value<T>, original: &Value<T>) -> Result<&mut Self, ValueError> {
        linked.link(original)?;
        let (linked, original) = (linked.downgrade(), original.downgrade());
        self.held.push(Held::Release(Box::new(move || {
            if let (Some(linked), Some(original)) = (linked.upgrade(), original.upgrade()) {
                // Already unlinked by hand; nothing left to release.
                let _ = linked.unlink(&original);
            }
        })));
        Ok(self)
    }

    /// Make `follower` follow `source` until the scope is released.
    ///
    /// # Errors
    ///
    /// As [`Value::link_observable`]; nothing is held on failure.
    pub fn link_observable<T: ValueType>(
        &mut self,
        follower: &Value<T>,
        source: &Observable<T>,
    ) -> Result<&mut Self, ValueError> {
        follower.link_observable(source)?;
        let (follower, source) = (follower.downgrade(), source.clone());
        self.held.push(Held::Release(Box::new(move || {
            if let Some(follower) = follower.upgrade() {
                let _ = follower.unlink_observable(&source);
            }
        })));
        Ok(self)
    }

    /// Number of held entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Release everything now; the scope stays usable.
    pub fn clear(&mut self) {
        while let Some(held) = self.held.pop() {
            held.release();
        }
    }
}

impl Drop for ListenerScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for ListenerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerScope")
            .field("held", &self.held.len())
            .finish()
    }
}
