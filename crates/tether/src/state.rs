#![forbid(unsafe_code)]

//! Boolean cells.
//!
//! A [`State`] is a non-null `bool` cell, false unless told otherwise, with
//! a `toggle`. Its [`value`](State::value) view is a nullable
//! `Value<bool>` backed by the same storage, where `None` means false, for
//! code that binds to nullable values.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::ValueError;
use crate::event::{Observer, Subscription};
use crate::observable::Observable;
use crate::validator::{ChainEntry, Validator};
use crate::value::{Notify, Value};

struct StateInner {
    value: Value<bool>,
    view: OnceLock<Value<bool>>,
}

/// A boolean cell. Cloning shares the same state.
#[derive(Clone)]
pub struct State {
    inner: Arc<StateInner>,
}

impl State {
    #[must_use]
    pub fn new(initial: bool) -> Self {
        Self {
            inner: Arc::new(StateInner {
                value: Value::with_initial(Some(initial), Some(false), Notify::Changed),
                view: OnceLock::new(),
            }),
        }
    }

    #[must_use]
    pub fn get(&self) -> bool {
        self.inner.value.get().unwrap_or(false)
    }

    /// # Errors
    ///
    /// A validator's rejection or [`ValueError::Locked`].
    pub fn set(&self, state: bool) -> Result<(), ValueError> {
        self.inner.value.set(state)
    }

    /// Flip the state.
    ///
    /// # Errors
    ///
    /// As [`set`](Self::set).
    pub fn toggle(&self) -> Result<(), ValueError> {
        self.set(!self.get())
    }

    /// # Errors
    ///
    /// The validator's rejection of the current state; it is not added.
    pub fn add_validator(&self, validator: Validator<bool>) -> Result<bool, ValueError> {
        self.inner.value.add_validator(validator)
    }

    /// Link to `original` as [`Value::link`] does.
    ///
    /// # Errors
    ///
    /// As [`Value::link`].
    pub fn link(&self, original: &State) -> Result<(), ValueError> {
        self.inner.value.link(&original.inner.value)
    }

    /// # Errors
    ///
    /// As [`Value::unlink`].
    pub fn unlink(&self, original: &State) -> Result<(), ValueError> {
        self.inner.value.unlink(&original.inner.value)
    }

    #[must_use]
    pub fn observable(&self) -> Observable<bool> {
        self.inner.value.observable()
    }

    #[must_use]
    pub fn observer(&self) -> Observer<Option<bool>> {
        self.inner.value.observer()
    }

    pub fn subscribe(&self, callback: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        self.inner
            .value
            .subscribe(move |state: &Option<bool>| callback(state.unwrap_or(false)))
    }

    /// A nullable view of this state; setting `None` stores false.
    #[must_use]
    pub fn value(&self) -> Value<bool> {
        self.inner
            .view
            .get_or_init(|| nullable_view(&self.inner))
            .clone()
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new(false)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State").field("state", &self.get()).finish()
    }
}

fn nullable_view(inner: &Arc<StateInner>) -> Value<bool> {
    let reader = Arc::downgrade(inner);
    let writer = Arc::downgrade(inner);
    let checker = Arc::downgrade(inner);
    let view = Value::derived_with(
        None,
        Notify::Manual,
        move || reader.upgrade().and_then(|inner| inner.value.get()),
        move |state: Option<bool>| {
            let Some(inner) = writer.upgrade() else {
                return;
            };
            // The view's guard already ran the state's checks.
            let _ = inner.value.set(state.unwrap_or(false));
        },
    );
    let guard = Validator::guard(move |state: Option<&bool>| match checker.upgrade() {
        Some(inner) => inner
            .value
            .inner()
            .check(Some(&state.copied().unwrap_or(false)), None),
        None => Ok(()),
    });
    view.inner().push_validator(ChainEntry::User(guard));
    view.relay_from(&inner.value.observer());
    view
}
