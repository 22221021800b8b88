#![forbid(unsafe_code)]

//! The reactive value cell.
//!
//! A [`Value<T>`] holds an `Option<T>` and guards every mutation:
//!
//! 1. `None` is rewritten to the null-substitute, if the cell has one.
//! 2. A locked cell refuses any value different from its current one.
//! 3. The validator chain runs in registration order; the first rejection
//!    aborts the call.
//! 4. The value is committed.
//! 5. Listeners are notified according to the cell's [`Notify`] policy, and
//!    the change registry reports `(previous, current)` if the value changed.
//!
//! Links are listeners too, so a committed value flows on to linked partners
//! from step 5.
//!
//! # Thread Safety
//!
//! Registration (listeners, validators, links, lazy observable and observer
//! construction) is internally synchronized. Mutation expects a single
//! logical writer: concurrent `set` calls from different threads are not
//! ordered with respect to each other.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use arc_swap::ArcSwapOption;

use crate::error::ValueError;
use crate::event::{Event, Listener, Observer, Subscription};
use crate::link::{self, LinkId, LinkRecord};
use crate::lock;
use crate::observable::Observable;
use crate::validator::{ChainEntry, Validator};

/// Bounds every value type satisfies.
pub trait ValueType: Clone + PartialEq + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Send + Sync + 'static> ValueType for T {}

/// When a cell notifies its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Notify {
    /// On every `set`, even if the value did not change.
    Set,
    /// Only when the new value differs from the previous one.
    #[default]
    Changed,
    /// Never automatically; the owner calls [`Value::notify`].
    Manual,
}

/// A committed change, as delivered by [`Value::changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueChange<T> {
    previous: Option<T>,
    current: Option<T>,
}

impl<T> ValueChange<T> {
    #[must_use]
    pub fn new(previous: Option<T>, current: Option<T>) -> Self {
        Self { previous, current }
    }

    #[must_use]
    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref()
    }

    #[must_use]
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CellId(u64);

impl CellId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Raw storage behind a cell. Never sees validation or notification.
pub(crate) trait Store<T>: Send + Sync {
    fn load(&self) -> Option<T>;
    fn store(&self, value: Option<T>);
}

/// An owned slot; reads never wait on a concurrent store.
struct Slot<T> {
    value: ArcSwapOption<T>,
}

impl<T: ValueType> Store<T> for Slot<T> {
    fn load(&self) -> Option<T> {
        self.value.load_full().map(|value| T::clone(&value))
    }

    fn store(&self, value: Option<T>) {
        self.value.store(value.map(Arc::new));
    }
}

type Getter<T> = Box<dyn Fn() -> Option<T> + Send + Sync>;
type Setter<T> = Box<dyn Fn(Option<T>) + Send + Sync>;

/// Storage owned by someone else, reached through a getter/setter pair.
struct Derived<T> {
    getter: Getter<T>,
    setter: Setter<T>,
}

impl<T: ValueType> Store<T> for Derived<T> {
    fn load(&self) -> Option<T> {
        (self.getter)()
    }

    fn store(&self, value: Option<T>) {
        (self.setter)(value);
    }
}

// ---------------------------------------------------------------------------
// Shared cell state
// ---------------------------------------------------------------------------

pub(crate) struct ValueInner<T> {
    pub(crate) id: CellId,
    store: Box<dyn Store<T>>,
    null_value: Option<T>,
    notify: Notify,
    locked: AtomicBool,
    validators: Mutex<Vec<ChainEntry<T>>>,
    event: OnceLock<Event<Option<T>>>,
    changed: OnceLock<Event<ValueChange<T>>>,
    pub(crate) links: Mutex<Vec<LinkRecord<T>>>,
    observable: OnceLock<Observable<T>>,
}

/// A value that passed validation and was stored, awaiting notification.
pub(crate) struct Commit<T> {
    previous: Option<T>,
    current: Option<T>,
}

impl<T: PartialEq> Commit<T> {
    pub(crate) fn changed(&self) -> bool {
        self.previous != self.current
    }
}

impl<T: ValueType> ValueInner<T> {
    fn new(store: Box<dyn Store<T>>, null_value: Option<T>, notify: Notify) -> Self {
        Self {
            id: CellId::next(),
            store,
            null_value,
            notify,
            locked: AtomicBool::new(false),
            validators: Mutex::new(Vec::new()),
            event: OnceLock::new(),
            changed: OnceLock::new(),
            links: Mutex::new(Vec::new()),
            observable: OnceLock::new(),
        }
    }

    pub(crate) fn get(&self) -> Option<T> {
        self.store.load().or_else(|| self.null_value.clone())
    }

    pub(crate) fn is_nullable(&self) -> bool {
        self.null_value.is_none()
    }

    /// Run the chain against `candidate`, skipping entries installed by
    /// `exclude`.
    fn run_validators(&self, candidate: Option<&T>, exclude: Option<LinkId>) -> Result<(), ValueError> {
        let chain: Vec<ChainEntry<T>> = lock(&self.validators).clone();
        chain
            .iter()
            .filter(|entry| exclude.is_none() || entry.origin() != exclude)
            .try_for_each(|entry| entry.validate(candidate))
    }

    /// Everything `set` checks before committing: substitution, lock, chain.
    pub(crate) fn check(&self, candidate: Option<&T>, exclude: Option<LinkId>) -> Result<(), ValueError> {
        let candidate = candidate.or(self.null_value.as_ref());
        if self.locked.load(Ordering::Acquire) && self.get().as_ref() != candidate {
            return Err(ValueError::Locked);
        }
        self.run_validators(candidate, exclude)
    }

    pub(crate) fn commit(&self, value: Option<T>) -> Result<Commit<T>, ValueError> {
        link::prune(self);
        let value = value.or_else(|| self.null_value.clone());
        self.check(value.as_ref(), None)?;
        let previous = self.get();
        self.store.store(value);
        Ok(Commit {
            previous,
            current: self.get(),
        })
    }

    pub(crate) fn publish(&self, commit: Commit<T>) {
        let Commit { previous, current } = commit;
        let changed = previous != current;
        let fire = match self.notify {
            Notify::Set => true,
            Notify::Changed => changed,
            Notify::Manual => false,
        };
        if fire {
            if let Some(event) = self.event.get() {
                event.run(&current);
            }
        }
        if changed {
            if let Some(event) = self.changed.get() {
                event.run(&ValueChange { previous, current });
            }
        }
    }

    pub(crate) fn set(&self, value: Option<T>) -> Result<(), ValueError> {
        let commit = self.commit(value)?;
        self.publish(commit);
        Ok(())
    }

    pub(crate) fn event(&self) -> &Event<Option<T>> {
        self.event.get_or_init(Event::new)
    }

    pub(crate) fn push_validator(&self, entry: ChainEntry<T>) {
        lock(&self.validators).push(entry);
    }

    pub(crate) fn remove_link_validators(&self, origin: LinkId) {
        lock(&self.validators).retain(|entry| entry.origin() != Some(origin));
    }

    #[cfg(test)]
    pub(crate) fn chain_len(&self) -> usize {
        lock(&self.validators).len()
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A mutable, observable, validated cell.
///
/// Cloning a `Value` creates a new handle to the **same** cell.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use tether::Value;
///
/// let value = Value::non_null(0);
/// let fired = Arc::new(AtomicUsize::new(0));
/// let f = Arc::clone(&fired);
/// let _sub = value.subscribe(move |_| {
///     f.fetch_add(1, Ordering::SeqCst);
/// });
///
/// value.set(5).unwrap();
/// value.set(5).unwrap(); // unchanged, no notification
/// value.clear().unwrap(); // back to the null-substitute
///
/// assert_eq!(value.get(), Some(0));
/// assert_eq!(fired.load(Ordering::SeqCst), 2);
/// ```
pub struct Value<T> {
    inner: Arc<ValueInner<T>>,
}

impl<T> Clone for Value<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ValueType> Value<T> {
    pub(crate) fn from_store(store: Box<dyn Store<T>>, null_value: Option<T>, notify: Notify) -> Self {
        Self {
            inner: Arc::new(ValueInner::new(store, null_value, notify)),
        }
    }

    /// A cell owning its value, starting at `initial` (or the substitute).
    ///
    /// The initial value is not validated; the cell has no validators yet.
    pub(crate) fn with_initial(initial: Option<T>, null_value: Option<T>, notify: Notify) -> Self {
        let initial = initial.or_else(|| null_value.clone());
        let slot = Slot {
            value: ArcSwapOption::new(initial.map(Arc::new)),
        };
        Self::from_store(Box::new(slot), null_value, notify)
    }

    /// A non-null cell using `null_value` in place of null, starting there.
    #[must_use]
    pub fn non_null(null_value: T) -> Self {
        Self::with_initial(None, Some(null_value), Notify::Changed)
    }

    /// A nullable cell, initially null.
    #[must_use]
    pub fn nullable() -> Self {
        Self::with_initial(None, None, Notify::Changed)
    }

    /// A nullable cell, initially `value`.
    #[must_use]
    pub fn nullable_with(value: T) -> Self {
        Self::with_initial(Some(value), None, Notify::Changed)
    }

    /// A nullable cell reading and writing through `getter`/`setter`.
    pub fn derived(
        getter: impl Fn() -> Option<T> + Send + Sync + 'static,
        setter: impl Fn(Option<T>) + Send + Sync + 'static,
    ) -> Self {
        Self::derived_with(None, Notify::Changed, getter, setter)
    }

    /// A derived cell with an explicit null-substitute and notify policy.
    pub fn derived_with(
        null_value: Option<T>,
        notify: Notify,
        getter: impl Fn() -> Option<T> + Send + Sync + 'static,
        setter: impl Fn(Option<T>) + Send + Sync + 'static,
    ) -> Self {
        let store = Derived {
            getter: Box::new(getter),
            setter: Box::new(setter),
        };
        Self::from_store(Box::new(store), null_value, notify)
    }

    /// The current value, or the null-substitute if the slot is empty.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.inner.get()
    }

    /// The current value.
    ///
    /// # Errors
    ///
    /// [`ValueError::NoValue`] if the cell is null.
    pub fn get_or_err(&self) -> Result<T, ValueError> {
        self.get().ok_or(ValueError::NoValue)
    }

    /// The current value, or `default` if the cell is null.
    #[must_use]
    pub fn get_or(&self, default: T) -> T {
        self.get().unwrap_or(default)
    }

    /// Whether the current value equals `value`.
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

    /// True iff no null-substitute was configured.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.inner.is_nullable()
    }

    /// Validate, commit, and notify.
    ///
    /// # Errors
    ///
    /// [`ValueError::Locked`] or [`ValueError::Invalid`] (from this cell or any
    /// linked partner); the cell is unchanged.
    pub fn set(&self, value: impl Into<Option<T>>) -> Result<(), ValueError> {
        self.inner.set(value.into())
    }

    /// Set to null (the null-substitute for non-null cells).
    ///
    /// # Errors
    ///
    /// As [`set`](Self::set).
    pub fn clear(&self) -> Result<(), ValueError> {
        self.set(None)
    }

    /// Set to `f(current)`.
    ///
    /// # Errors
    ///
    /// As [`set`](Self::set).
    pub fn map(&self, f: impl FnOnce(Option<T>) -> Option<T>) -> Result<(), ValueError> {
        self.set(f(self.get()))
    }

    /// Run the validator chain against `value` without setting it.
    ///
    /// # Errors
    ///
    /// The first rejection in the chain.
    pub fn validate(&self, value: Option<&T>) -> Result<(), ValueError> {
        self.inner
            .run_validators(value.or(self.inner.null_value.as_ref()), None)
    }

    /// Add `validator` to the chain, after checking the current value.
    ///
    /// Returns `Ok(false)` if the validator is already in the chain.
    ///
    /// # Errors
    ///
    /// The validator's rejection of the current value; it is not added.
    pub fn add_validator(&self, validator: Validator<T>) -> Result<bool, ValueError> {
        validator.validate(self.get().as_ref())?;
        let mut chain = lock(&self.inner.validators);
        if chain.iter().any(|entry| entry.is(&validator)) {
            return Ok(false);
        }
        chain.push(ChainEntry::User(validator));
        Ok(true)
    }

    /// Remove `validator`, reporting whether it was in the chain.
    pub fn remove_validator(&self, validator: &Validator<T>) -> bool {
        let mut chain = lock(&self.inner.validators);
        let before = chain.len();
        chain.retain(|entry| !entry.is(validator));
        chain.len() != before
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::Acquire)
    }

    /// Lock or unlock the cell. A locked cell only accepts its current value.
    pub fn set_locked(&self, locked: bool) {
        self.inner.locked.store(locked, Ordering::Release);
    }

    /// Fire the listeners with the current value, regardless of policy.
    pub fn notify(&self) {
        if let Some(event) = self.inner.event.get() {
            event.run(&self.get());
        }
    }

    /// The cell's listener registry.
    #[must_use]
    pub fn observer(&self) -> Observer<Option<T>> {
        self.inner.event().observer()
    }

    /// A registry receiving `(previous, current)` on every actual change,
    /// whatever the notify policy.
    #[must_use]
    pub fn changed(&self) -> Observer<ValueChange<T>> {
        self.inner.changed.get_or_init(Event::new).observer()
    }

    /// The read-only facade, built once and shared by all callers.
    #[must_use]
    pub fn observable(&self) -> Observable<T> {
        self.inner
            .observable
            .get_or_init(|| Observable::new(&self.inner))
            .clone()
    }

    /// Call `callback` with each notified value while the guard lives.
    pub fn subscribe(&self, callback: impl Fn(&Option<T>) + Send + Sync + 'static) -> Subscription {
        self.observer().subscribe(callback)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakValue<T> {
        WeakValue {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn inner(&self) -> &Arc<ValueInner<T>> {
        &self.inner
    }

    /// Notify this cell whenever `source` fires. Used by views whose
    /// storage belongs to another cell.
    pub(crate) fn relay_from<A: 'static>(&self, source: &Observer<A>) {
        let view = self.downgrade();
        let relay: Listener = Arc::new(move || {
            if let Some(view) = view.upgrade() {
                view.notify();
            }
        });
        source.add_listener(&relay);
    }
}

impl<T: ValueType> Default for Value<T> {
    fn default() -> Self {
        Self::nullable()
    }
}

impl<T: ValueType + fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("value", &self.get())
            .field("nullable", &self.is_nullable())
            .field("notify", &self.inner.notify)
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// A non-owning handle to a [`Value`].
pub struct WeakValue<T> {
    inner: Weak<ValueInner<T>>,
}

impl<T> Clone for WeakValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> WeakValue<T> {
    /// The cell, if it still exists.
    #[must_use]
    pub fn upgrade(&self) -> Option<Value<T>> {
        self.inner.upgrade().map(|inner| Value { inner })
    }
}

impl<T> fmt::Debug for WeakValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakValue")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
