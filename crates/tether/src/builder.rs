#![forbid(unsafe_code)]

//! One-expression construction of configured cells.
//!
//! ```
//! use tether::{Notify, Validator, ValueBuilder};
//!
//! let model = ValueBuilder::non_null(0).value(3).build().unwrap();
//! let field = ValueBuilder::non_null(0)
//!     .notify(Notify::Set)
//!     .validator(Validator::predicate("positive", |v: Option<&i32>| {
//!         v.is_some_and(|v| *v >= 0)
//!     }))
//!     .link(&model)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(field.get(), Some(3));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::ValueError;
use crate::event::{Consumer, Listener};
use crate::observable::Observable;
use crate::validator::Validator;
use crate::value::{Notify, Value, ValueType};

enum Linkage<T> {
    Value(Value<T>),
    Observable(Observable<T>),
}

enum Registration<T> {
    Listener(Listener),
    Consumer(Consumer<Option<T>>),
    WeakListener(Listener),
    WeakConsumer(Consumer<Option<T>>),
}

/// Collects a cell's configuration, then builds it with
/// [`build`](Self::build).
///
/// Validators, links, and listeners are applied in the order they were
/// given; listeners of all kinds fire in that order too.
#[must_use = "a builder does nothing until `build` is called"]
pub struct ValueBuilder<T> {
    null_value: Option<T>,
    initial: Option<T>,
    notify: Notify,
    locked: bool,
    validators: Vec<Validator<T>>,
    links: Vec<Linkage<T>>,
    registrations: Vec<Registration<T>>,
}

impl<T: ValueType> ValueBuilder<T> {
    fn new(null_value: Option<T>) -> Self {
        Self {
            null_value,
            initial: None,
            notify: Notify::default(),
            locked: false,
            validators: Vec::new(),
            links: Vec::new(),
            registrations: Vec::new(),
        }
    }

    /// A non-null cell substituting `null_value` for null.
    pub fn non_null(null_value: T) -> Self {
        Self::new(Some(null_value))
    }

    /// A nullable cell.
    pub fn nullable() -> Self {
        Self::new(None)
    }

    /// The initial value. Defaults to null (the substitute, if any).
    pub fn value(mut self, value: impl Into<Option<T>>) -> Self {
        self.initial = value.into();
        self
    }

    pub fn notify(mut self, notify: Notify) -> Self {
        self.notify = notify;
        self
    }

    /// Lock the cell once everything else is applied.
    pub fn locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn validator(mut self, validator: Validator<T>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Link the built cell to `original`, as [`Value::link`].
    pub fn link(mut self, original: &Value<T>) -> Self {
        self.links.push(Linkage::Value(original.clone()));
        self
    }

    /// Make the built cell follow `source`, as [`Value::link_observable`].
    pub fn link_observable(mut self, source: &Observable<T>) -> Self {
        self.links.push(Linkage::Observable(source.clone()));
        self
    }

    pub fn listener(mut self, listener: impl Fn() + Send + Sync + 'static) -> Self {
        self.registrations
            .push(Registration::Listener(Arc::new(listener)));
        self
    }

    pub fn consumer(mut self, consumer: impl Fn(&Option<T>) + Send + Sync + 'static) -> Self {
        self.registrations
            .push(Registration::Consumer(Arc::new(consumer)));
        self
    }

    /// Register `listener` weakly; the caller keeps it alive.
    pub fn weak_listener(mut self, listener: &Listener) -> Self {
        self.registrations
            .push(Registration::WeakListener(Arc::clone(listener)));
        self
    }

    /// Register `consumer` weakly; the caller keeps it alive.
    pub fn weak_consumer(mut self, consumer: &Consumer<Option<T>>) -> Self {
        self.registrations
            .push(Registration::WeakConsumer(Arc::clone(consumer)));
        self
    }

    /// Run `listener` whenever the cell is notified with `value`.
    pub fn when(mut self, value: impl Into<Option<T>>, listener: impl Fn() + Send + Sync + 'static) -> Self {
        let value = value.into();
        self.registrations
            .push(Registration::Consumer(Arc::new(move |current: &Option<T>| {
                if *current == value {
                    listener();
                }
            })));
        self
    }

    /// Run `consumer` whenever the cell is notified with `value`.
    pub fn when_consumer(
        mut self,
        value: impl Into<Option<T>>,
        consumer: impl Fn(&Option<T>) + Send + Sync + 'static,
    ) -> Self {
        let value = value.into();
        self.registrations
            .push(Registration::Consumer(Arc::new(move |current: &Option<T>| {
                if *current == value {
                    consumer(current);
                }
            })));
        self
    }

    /// Build the cell.
    ///
    /// Steps run in order: initial value, validators (each checked against
    /// the initial value), links, listeners, lock.
    ///
    /// # Errors
    ///
    /// The first validator rejecting the initial value, or the first link
    /// that fails. Links made before the failure are undone.
    pub fn build(self) -> Result<Value<T>, ValueError> {
        let value = Value::with_initial(self.initial, self.null_value, self.notify);
        for validator in self.validators {
            value.add_validator(validator)?;
        }
        for (index, linkage) in self.links.iter().enumerate() {
            let linked = match linkage {
                Linkage::Value(original) => value.link(original),
                Linkage::Observable(source) => value.link_observable(source),
            };
            if let Err(err) = linked {
                for made in &self.links[..index] {
                    // Undoing a link made moments ago cannot fail.
                    let _ = match made {
                        Linkage::Value(original) => value.unlink(original),
                        Linkage::Observable(source) => value.unlink_observable(source),
                    };
                }
                return Err(err);
            }
        }
        let observer = value.observer();
        for registration in &self.registrations {
            match registration {
                Registration::Listener(listener) => observer.add_listener(listener),
                Registration::Consumer(consumer) => observer.add_consumer(consumer),
                Registration::WeakListener(listener) => observer.add_weak_listener(listener),
                Registration::WeakConsumer(consumer) => observer.add_weak_consumer(consumer),
            };
        }
        value.set_locked(self.locked);
        Ok(value)
    }
}

impl<T: ValueType + fmt::Debug> fmt::Debug for ValueBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueBuilder")
            .field("null_value", &self.null_value)
            .field("initial", &self.initial)
            .field("notify", &self.notify)
            .field("locked", &self.locked)
            .field("validators", &self.validators.len())
            .field("links", &self.links.len())
            .field("listeners", &self.registrations.len())
            .finish()
    }
}
