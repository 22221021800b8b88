#![forbid(unsafe_code)]

//! Read-only facade over a [`Value`](crate::Value).
//!
//! An [`Observable<T>`] exposes a cell's current value and its listener
//! registry, and nothing that mutates the value. It holds the cell weakly:
//! once every `Value` handle is gone, [`get`](Observable::get) reads `None`
//! and [`is_alive`](Observable::is_alive) is false, while registrations stay
//! harmless.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::ValueError;
use crate::event::{Consumer, Listener, Observer, Subscription};
use crate::value::{CellId, ValueInner, ValueType};

/// A read-only view of a cell.
///
/// Obtained from [`Value::observable`](crate::Value::observable); every call
/// returns a clone of the same facade.
pub struct Observable<T> {
    owner: Weak<ValueInner<T>>,
    owner_id: CellId,
    nullable: bool,
    observer: Observer<Option<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            owner: Weak::clone(&self.owner),
            owner_id: self.owner_id,
            nullable: self.nullable,
            observer: self.observer.clone(),
        }
    }
}

impl<T: ValueType> Observable<T> {
    pub(crate) fn new(owner: &Arc<ValueInner<T>>) -> Self {
        Self {
            owner: Arc::downgrade(owner),
            owner_id: owner.id,
            nullable: owner.is_nullable(),
            observer: owner.event().observer(),
        }
    }

    /// The cell's current value; `None` once the cell is gone.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.owner.upgrade().and_then(|owner| owner.get())
    }

    /// The current value.
    ///
    /// # Errors
    ///
    /// [`ValueError::NoValue`] if the cell is null or gone.
    pub fn get_or_err(&self) -> Result<T, ValueError> {
        self.get().ok_or(ValueError::NoValue)
    }

    #[must_use]
    pub fn is(&self, value: impl Into<Option<T>>) -> bool {
        self.get() == value.into()
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.get().is_none()
    }

    #[must_use]
    pub fn is_not_null(&self) -> bool {
        !self.is_null()
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether the underlying cell still exists.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }

    /// Whether both facades watch the same cell.
    #[must_use]
    pub fn same_owner(&self, other: &Self) -> bool {
        self.owner_id == other.owner_id
    }

    /// The cell's listener registry.
    #[must_use]
    pub fn observer(&self) -> Observer<Option<T>> {
        self.observer.clone()
    }

    pub fn add_listener(&self, listener: &Listener) -> bool {
        self.observer.add_listener(listener)
    }

    pub fn remove_listener(&self, listener: &Listener) -> bool {
        self.observer.remove_listener(listener)
    }

    pub fn add_consumer(&self, consumer: &Consumer<Option<T>>) -> bool {
        self.observer.add_consumer(consumer)
    }

    pub fn remove_consumer(&self, consumer: &Consumer<Option<T>>) -> bool {
        self.observer.remove_consumer(consumer)
    }

    pub fn add_weak_listener(&self, listener: &Listener) -> bool {
        self.observer.add_weak_listener(listener)
    }

    pub fn remove_weak_listener(&self, listener: &Listener) -> bool {
        self.observer.remove_weak_listener(listener)
    }

    pub fn add_weak_consumer(&self, consumer: &Consumer<Option<T>>) -> bool {
        self.observer.add_weak_consumer(consumer)
    }

    pub fn remove_weak_consumer(&self, consumer: &Consumer<Option<T>>) -> bool {
        self.observer.remove_weak_consumer(consumer)
    }

    /// Call `callback` with each notified value while the guard lives.
    pub fn subscribe(&self, callback: impl Fn(&Option<T>) + Send + Sync + 'static) -> Subscription {
        self.observer.subscribe(callback)
    }

    pub(crate) fn owner_id(&self) -> CellId {
        self.owner_id
    }

    pub(crate) fn owner(&self) -> Option<Arc<ValueInner<T>>> {
        self.owner.upgrade()
    }
}

impl<T: ValueType + fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.get())
            .field("alive", &self.is_alive())
            .finish()
    }
}
