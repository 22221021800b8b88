#![forbid(unsafe_code)]

//! Cells holding an immutable snapshot collection.
//!
//! A [`ValueCollection<C>`] stores a persistent collection (`im::HashSet` or
//! `im::Vector`) in an ordinary [`Value<C>`]. Every mutation clones the
//! current snapshot (cheap, structurally shared), applies the delta, and
//! commits the result through the cell's usual validate-commit-notify path.
//! Readers always see a whole snapshot, never a half-applied change.
//!
//! [`ValueCollection::value`] offers a derived single-item view: it reads the
//! first element and writes by replacing the whole collection.
//!
//! # Invariants
//!
//! 1. Mutators report whether the snapshot's contents changed.
//! 2. Mutations of one collection are serialized; notification runs after
//!    the internal lock is released.
//! 3. The collection is never null: clearing stores an empty snapshot.

use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::error::ValueError;
use crate::event::Observer;
use crate::lock;
use crate::observable::Observable;
use crate::validator::{ChainEntry, Validator};
use crate::value::{Notify, Value, ValueType};

/// An immutable collection usable as a [`ValueCollection`] snapshot.
pub trait Snapshot: ValueType + Default {
    type Item: ValueType;

    /// Add `item`, reporting whether the contents changed.
    fn insert(&mut self, item: Self::Item) -> bool;

    /// Remove one occurrence of `item`, reporting whether it was present.
    fn remove(&mut self, item: &Self::Item) -> bool;

    fn contains(&self, item: &Self::Item) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element the single-item view exposes.
    fn first(&self) -> Option<Self::Item>;

    fn from_items(items: impl IntoIterator<Item = Self::Item>) -> Self;
}

/// Unordered; `first` is an arbitrary element.
impl<E: ValueType + Hash + Eq> Snapshot for im::HashSet<E> {
    type Item = E;

    fn insert(&mut self, item: E) -> bool {
        im::HashSet::insert(self, item).is_none()
    }

    fn remove(&mut self, item: &E) -> bool {
        im::HashSet::remove(self, item).is_some()
    }

    fn contains(&self, item: &E) -> bool {
        im::HashSet::contains(self, item)
    }

    fn len(&self) -> usize {
        im::HashSet::len(self)
    }

    fn first(&self) -> Option<E> {
        self.iter().next().cloned()
    }

    fn from_items(items: impl IntoIterator<Item = E>) -> Self {
        items.into_iter().collect()
    }
}

/// Ordered, duplicates allowed; `insert` appends.
impl<E: ValueType> Snapshot for im::Vector<E> {
    type Item = E;

    fn insert(&mut self, item: E) -> bool {
        self.push_back(item);
        true
    }

    fn remove(&mut self, item: &E) -> bool {
        match self.index_of(item) {
            Some(index) => {
                im::Vector::remove(self, index);
                true
            }
            None => false,
        }
    }

    fn contains(&self, item: &E) -> bool {
        im::Vector::contains(self, item)
    }

    fn len(&self) -> usize {
        im::Vector::len(self)
    }

    fn first(&self) -> Option<E> {
        self.front().cloned()
    }

    fn from_items(items: impl IntoIterator<Item = E>) -> Self {
        items.into_iter().collect()
    }
}

/// A set-backed collection cell.
pub type ValueSet<E> = ValueCollection<im::HashSet<E>>;

/// A list-backed collection cell.
pub type ValueList<E> = ValueCollection<im::Vector<E>>;

struct CollectionInner<C: Snapshot> {
    value: Value<C>,
    /// Serializes read-modify-write cycles.
    lock: Mutex<()>,
    single: OnceLock<Value<C::Item>>,
}

impl<C: Snapshot> CollectionInner<C> {
    fn snapshot(&self) -> C {
        self.value.get().unwrap_or_default()
    }

    /// Apply `delta` to a copy of the snapshot and commit it if `delta`
    /// reports a change. Returns whether the stored snapshot changed.
    fn modify(&self, delta: impl FnOnce(&mut C) -> bool) -> Result<bool, ValueError> {
        let commit = {
            let _guard = lock(&self.lock);
            let mut working = self.snapshot();
            if !delta(&mut working) {
                return Ok(false);
            }
            self.value.inner().commit(Some(working))?
        };
        let changed = commit.changed();
        self.value.inner().publish(commit);
        Ok(changed)
    }

    fn replace(&self, snapshot: C) -> Result<bool, ValueError> {
        self.modify(move |working| {
            *working = snapshot;
            true
        })
    }
}

/// A cell whose value is an immutable collection snapshot.
///
/// Cloning shares the same collection.
///
/// # Examples
///
/// ```
/// use tether::ValueSet;
///
/// let tags: ValueSet<&str> = ValueSet::from_items(["x"]);
/// assert!(!tags.add("x").unwrap());
/// assert!(tags.add("y").unwrap());
/// assert_eq!(tags.len(), 2);
/// ```
pub struct ValueCollection<C: Snapshot> {
    inner: Arc<CollectionInner<C>>,
}

impl<C: Snapshot> Clone for ValueCollection<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Snapshot> ValueCollection<C> {
    /// An empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::with_notify(C::default(), Notify::Changed)
    }

    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = C::Item>) -> Self {
        Self::with_notify(C::from_items(items), Notify::Changed)
    }

    /// A collection starting at `initial`, notifying per `notify`.
    #[must_use]
    pub fn with_notify(initial: C, notify: Notify) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                value: Value::with_initial(Some(initial), Some(C::default()), notify),
                lock: Mutex::new(()),
                single: OnceLock::new(),
            }),
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn get(&self) -> C {
        self.inner.snapshot()
    }

    /// Replace the contents with `items`.
    ///
    /// # Errors
    ///
    /// The cell's rejection of the new snapshot; nothing changes.
    pub fn set(&self, items: impl IntoIterator<Item = C::Item>) -> Result<bool, ValueError> {
        self.inner.replace(C::from_items(items))
    }

    /// Add `item`; `Ok(false)` if a set already holds it.
    ///
    /// # Errors
    ///
    /// The cell's rejection of the new snapshot; nothing changes.
    pub fn add(&self, item: C::Item) -> Result<bool, ValueError> {
        self.inner.modify(|working| working.insert(item))
    }

    /// Add every item in one snapshot replacement.
    ///
    /// # Errors
    ///
    /// The cell's rejection of the new snapshot; nothing changes.
    pub fn add_all(&self, items: impl IntoIterator<Item = C::Item>) -> Result<bool, ValueError> {
        self.inner.modify(|working| {
            items
                .into_iter()
                .fold(false, |changed, item| working.insert(item) | changed)
        })
    }

    /// Remove one occurrence of `item`.
    ///
    /// # Errors
    ///
    /// The cell's rejection of the new snapshot; nothing changes.
    pub fn remove(&self, item: &C::Item) -> Result<bool, ValueError> {
        self.inner.modify(|working| working.remove(item))
    }

    /// Remove every item in one snapshot replacement.
    ///
    /// # Errors
    ///
    /// The cell's rejection of the new snapshot; nothing changes.
    pub fn remove_all(&self, items: impl IntoIterator<Item = C::Item>) -> Result<bool, ValueError> {
        self.inner.modify(|working| {
            items
                .into_iter()
                .fold(false, |changed, item| working.remove(&item) | changed)
        })
    }

    /// Remove everything.
    ///
    /// # Errors
    ///
    /// The cell's rejection of the empty snapshot; nothing changes.
    pub fn clear(&self) -> Result<bool, ValueError> {
        self.inner.modify(|working| {
            let changed = !working.is_empty();
            *working = C::default();
            changed
        })
    }

    #[must_use]
    pub fn contains(&self, item: &C::Item) -> bool {
        self.get().contains(item)
    }

    #[must_use]
    pub fn contains_all<'a>(&self, items: impl IntoIterator<Item = &'a C::Item>) -> bool
    where
        C::Item: 'a,
    {
        let snapshot = self.get();
        items.into_iter().all(|item| snapshot.contains(item))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.get().is_empty()
    }

    #[must_use]
    pub fn is_not_empty(&self) -> bool {
        !self.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.get().len()
    }

    /// The underlying cell, for validators, links, and the lock.
    #[must_use]
    pub fn cell(&self) -> &Value<C> {
        &self.inner.value
    }

    #[must_use]
    pub fn observable(&self) -> Observable<C> {
        self.inner.value.observable()
    }

    #[must_use]
    pub fn observer(&self) -> Observer<Option<C>> {
        self.inner.value.observer()
    }

    /// A nullable view of the first element.
    ///
    /// Reading returns the first element, or `None` when empty. Setting an
    /// item replaces the whole collection with just that item; setting `None`
    /// empties it. The view is notified whenever the collection is.
    #[must_use]
    pub fn value(&self) -> Value<C::Item> {
        self.inner
            .single
            .get_or_init(|| single_view(&self.inner))
            .clone()
    }
}

impl<C: Snapshot> Default for ValueCollection<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Snapshot + fmt::Debug> fmt::Debug for ValueCollection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCollection")
            .field("snapshot", &self.get())
            .finish()
    }
}

fn single_view<C: Snapshot>(inner: &Arc<CollectionInner<C>>) -> Value<C::Item> {
    let reader = Arc::downgrade(inner);
    let writer = Weak::clone(&reader);
    let checker = Weak::clone(&reader);
    let view = Value::derived_with(
        None,
        Notify::Manual,
        move || reader.upgrade().and_then(|inner| inner.snapshot().first()),
        move |item: Option<C::Item>| {
            let Some(inner) = writer.upgrade() else {
                return;
            };
            // The view's guard already ran the collection's checks.
            let _ = inner.replace(C::from_items(item));
        },
    );
    let guard = Validator::guard(move |item: Option<&C::Item>| match checker.upgrade() {
        Some(inner) => inner
            .value
            .inner()
            .check(Some(&C::from_items(item.cloned())), None),
        None => Ok(()),
    });
    view.inner().push_validator(ChainEntry::User(guard));
    view.relay_from(&inner.value.observer());
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn set_add_reports_membership_change() {
        let set: ValueSet<&str> = ValueSet::from_items(["x"]);
        assert!(!set.add("x").unwrap());
        assert_eq!(set.len(), 1);
        assert!(set.add("y").unwrap());
        assert_eq!(set.get(), im::hashset!["x", "y"]);
        assert!(set.contains_all(&["x", "y"]));
    }

    #[test]
    fn list_allows_duplicates_and_keeps_order() {
        let list: ValueList<i32> = ValueList::new();
        assert!(list.is_empty());
        assert!(list.add(1).unwrap());
        assert!(list.add(1).unwrap());
        assert!(list.add_all([2, 3]).unwrap());
        assert_eq!(list.get(), im::vector![1, 1, 2, 3]);

        assert!(list.remove(&1).unwrap());
        assert_eq!(list.get(), im::vector![1, 2, 3]);
        assert!(!list.remove(&9).unwrap());
        assert!(list.remove_all([1, 3]).unwrap());
        assert_eq!(list.get(), im::vector![2]);
    }

    #[test]
    fn unchanged_mutations_do_not_notify() {
        let set: ValueSet<i32> = ValueSet::from_items([1, 2]);
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = set.observer().subscribe_listener(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!set.add(1).unwrap());
        assert!(!set.remove(&3).unwrap());
        assert!(!set.add_all([1, 2]).unwrap());
        assert!(!set.set([2, 1]).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert!(set.add_all([2, 3]).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(set.clear().unwrap());
        assert!(!set.clear().unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(set.is_empty());
    }

    #[test]
    fn validator_rejection_leaves_snapshot() {
        let set: ValueSet<i32> = ValueSet::new();
        set.cell()
            .add_validator(Validator::predicate("at most two", |s: Option<&im::HashSet<i32>>| {
                s.is_none_or(|s| s.len() <= 2)
            }))
            .unwrap();
        set.add_all([1, 2]).unwrap();
        assert!(matches!(set.add(3), Err(ValueError::Invalid(_))));
        assert_eq!(set.len(), 2);
        assert!(!set.contains(&3));
    }

    #[test]
    fn single_item_view_reads_first_and_replaces_all() {
        let list: ValueList<char> = ValueList::from_items(['a', 'b']);
        let single = list.value();
        assert!(single.is_nullable());
        assert_eq!(single.get(), Some('a'));

        single.set('c').unwrap();
        assert_eq!(list.get(), im::vector!['c']);

        single.clear().unwrap();
        assert!(list.is_empty());
        assert!(single.is_null());

        list.add('d').unwrap();
        assert_eq!(single.get(), Some('d'));
    }

    #[test]
    fn single_item_view_is_notified_by_collection() {
        let list: ValueList<i32> = ValueList::new();
        let single = list.value();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = single.subscribe(move |v: &Option<i32>| s.lock().unwrap().push(*v));

        list.add(1).unwrap();
        list.add(2).unwrap();
        single.set(5).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Some(1), Some(1), Some(5)]);
    }

    #[test]
    fn single_item_view_respects_collection_validators() {
        let list: ValueList<i32> = ValueList::from_items([1]);
        list.cell()
            .add_validator(Validator::predicate("no negatives", |l: Option<&im::Vector<i32>>| {
                l.is_none_or(|l| l.iter().all(|v| *v >= 0))
            }))
            .unwrap();
        let single = list.value();
        assert!(matches!(single.set(-1), Err(ValueError::Invalid(_))));
        assert_eq!(list.get(), im::vector![1]);
    }

    #[test]
    fn concurrent_adds_are_not_lost() {
        let set: ValueSet<u32> = ValueSet::new();
        let list: ValueList<u32> = ValueList::new();
        let notified = Arc::new(AtomicUsize::new(0));
        let n = Arc::clone(&notified);
        let _sub = set.observer().subscribe_listener(move || {
            n.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::scope(|scope| {
            for thread in 0..8u32 {
                let (set, list) = (set.clone(), list.clone());
                scope.spawn(move || {
                    for i in 0..500 {
                        assert!(set.add(thread * 500 + i).unwrap());
                        assert!(list.add(i).unwrap());
                    }
                });
            }
        });

        assert_eq!(set.len(), 4000);
        assert_eq!(list.len(), 4000);
        assert_eq!(notified.load(Ordering::SeqCst), 4000);
        assert!((0..4000).all(|item| set.contains(&item)));
    }

    #[test]
    fn concurrent_add_and_remove_settle() {
        let set: ValueSet<u32> = ValueSet::from_items(0..1000);
        std::thread::scope(|scope| {
            for thread in 0..4u32 {
                let set = set.clone();
                scope.spawn(move || {
                    for i in (thread..1000).step_by(4) {
                        assert!(set.remove(&i).unwrap());
                        assert!(set.add(i + 1000).unwrap());
                    }
                });
            }
        });
        assert_eq!(set.get(), (1000u32..2000).collect::<im::HashSet<u32>>());
    }

    #[test]
    fn view_is_cached_and_does_not_keep_collection_alive() {
        let list: ValueList<i32> = ValueList::from_items([1]);
        assert!(list.value().ptr_eq(&list.value()));
        let single = list.value();
        drop(list);
        assert!(single.is_null());
    }
}
