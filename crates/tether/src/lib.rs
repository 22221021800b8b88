#![forbid(unsafe_code)]

//! Reactive value cells with validation, notification policies, and links.
//!
//! This crate provides the binding core that models and UI layers sit on:
//!
//! - [`Value`]: a mutable, observable cell. Every `set` runs a validator chain
//!   before committing, and listeners fire according to a [`Notify`] policy.
//! - [`Observable`]: a read-only facade over a cell's value and listeners.
//! - [`Event`] / [`Observer`]: the ordered listener registry behind both, with
//!   strong, weak, and [`Subscription`]-scoped callbacks.
//! - Links: [`Value::link`] keeps two cells in sync in both directions,
//!   [`Value::link_observable`] makes a cell follow an observable.
//! - [`ValueBuilder`]: assembles a configured cell in one expression.
//! - [`ValueCollection`] ([`ValueSet`], [`ValueList`]): cells holding an
//!   immutable snapshot collection, replaced wholesale on every mutation.
//! - [`State`]: a boolean cell, plus a nullable [`Value<bool>`] backed by it.
//! - [`ListenerScope`]: releases a group of subscriptions and links on drop.
//!
//! # Architecture
//!
//! A `Value<T>` is a handle onto shared `Arc` state; clones refer to the same
//! cell. Storage is pluggable: a lock-free `arc-swap` slot for ordinary cells,
//! or a getter/setter pair for derived cells and views.
//!
//! Links form an undirected graph. Each cell keeps its own edge list, and a
//! new link is refused when the partner is already reachable, so the graph is
//! always a forest and propagation always terminates.
//!
//! # Invariants
//!
//! 1. A rejected `set` (invalid, locked) leaves the cell and its partners
//!    untouched.
//! 2. A non-null cell never reads as `None`.
//! 3. Listeners run in registration order, synchronously, with no internal
//!    lock held.
//! 4. One external `set` notifies each cell in a linked group at most once.
//! 5. Links, observables, and weak listeners never keep a cell alive.
//!
//! # Example
//!
//! ```
//! use tether::{Validator, Value};
//!
//! let model = Value::nullable_with(42);
//! let field = Value::nullable();
//! field.link(&model).unwrap();
//! assert_eq!(field.get(), Some(42));
//!
//! model
//!     .add_validator(Validator::predicate("at most 100", |v: Option<&i32>| {
//!         v.is_none_or(|v| *v <= 100)
//!     }))
//!     .unwrap();
//!
//! field.set(7).unwrap();
//! assert_eq!(model.get(), Some(7));
//! assert!(field.set(500).is_err());
//! assert_eq!(model.get(), Some(7));
//! ```

pub mod builder;
pub mod collection;
pub mod error;
pub mod event;
mod link;
pub mod observable;
pub mod scope;
pub mod state;
pub mod validator;
pub mod value;

pub use builder::ValueBuilder;
pub use collection::{Snapshot, ValueCollection, ValueList, ValueSet};
pub use error::{InvalidValue, LinkError, ValueError};
pub use event::{Consumer, Event, Listener, Observer, Subscription};
pub use observable::Observable;
pub use scope::ListenerScope;
pub use state::State;
pub use validator::Validator;
pub use value::{Notify, Value, ValueChange, ValueType, WeakValue};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock `mutex`, recovering the guard if a panicking callback poisoned it.
///
/// No guarded structure is left half-updated by a panic (callbacks never run
/// under these locks), so the data is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
