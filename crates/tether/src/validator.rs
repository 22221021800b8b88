#![forbid(unsafe_code)]

//! Validators guarding value mutation.
//!
//! A cell's chain holds two kinds of entries: user [`Validator`]s, and the
//! cross-validators installed by [`Value::link`](crate::Value::link). A
//! cross-validator is tagged with the id of the link that created it; when it
//! asks the partner to validate, the partner skips its own entry with the same
//! tag, so two linked cells never re-validate each other in a loop.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{InvalidValue, ValueError};
use crate::link::LinkId;
use crate::value::{ValueInner, ValueType};

type Check<T> = dyn Fn(Option<&T>) -> Result<(), ValueError> + Send + Sync;

/// An acceptance test run against every candidate value before it is set.
///
/// Validators are compared by identity: clones of one validator are equal,
/// two validators built from identical closures are not.
pub struct Validator<T> {
    check: Arc<Check<T>>,
}

impl<T> Clone for Validator<T> {
    fn clone(&self) -> Self {
        Self {
            check: Arc::clone(&self.check),
        }
    }
}

impl<T> PartialEq for Validator<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.check, &other.check)
    }
}

impl<T> Eq for Validator<T> {}

impl<T> fmt::Debug for Validator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").finish_non_exhaustive()
    }
}

impl<T: 'static> Validator<T> {
    /// Create a validator from a check returning the rejection reason.
    pub fn new(
        check: impl Fn(Option<&T>) -> Result<(), InvalidValue> + Send + Sync + 'static,
    ) -> Self {
        Self {
            check: Arc::new(move |value: Option<&T>| check(value).map_err(ValueError::from)),
        }
    }

    /// Create a validator that rejects with `message` whenever `accept` is false.
    pub fn predicate(
        message: impl Into<String>,
        accept: impl Fn(Option<&T>) -> bool + Send + Sync + 'static,
    ) -> Self {
        let message = message.into();
        Self::new(move |value: Option<&T>| {
            if accept(value) {
                Ok(())
            } else {
                Err(InvalidValue::new(message.clone()))
            }
        })
    }

    /// A validator rejecting null.
    pub fn non_null(message: impl Into<String>) -> Self {
        Self::predicate(message, |value: Option<&T>| value.is_some())
    }

    /// A validator delegating to a check that may fail with any [`ValueError`].
    pub(crate) fn guard(
        check: impl Fn(Option<&T>) -> Result<(), ValueError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            check: Arc::new(check),
        }
    }

    /// Run the check against `value`.
    ///
    /// # Errors
    ///
    /// Returns the rejection, normally [`ValueError::Invalid`].
    pub fn validate(&self, value: Option<&T>) -> Result<(), ValueError> {
        (self.check)(value)
    }
}

/// One entry in a cell's validator chain.
pub(crate) enum ChainEntry<T> {
    User(Validator<T>),
    Link {
        origin: LinkId,
        partner: Weak<ValueInner<T>>,
    },
}

impl<T> Clone for ChainEntry<T> {
    fn clone(&self) -> Self {
        match self {
            Self::User(validator) => Self::User(validator.clone()),
            Self::Link { origin, partner } => Self::Link {
                origin: *origin,
                partner: Weak::clone(partner),
            },
        }
    }
}

impl<T: ValueType> ChainEntry<T> {
    pub(crate) fn origin(&self) -> Option<LinkId> {
        match self {
            Self::User(_) => None,
            Self::Link { origin, .. } => Some(*origin),
        }
    }

    pub(crate) fn is(&self, validator: &Validator<T>) -> bool {
        matches!(self, Self::User(existing) if existing == validator)
    }

    pub(crate) fn validate(&self, value: Option<&T>) -> Result<(), ValueError> {
        match self {
            Self::User(validator) => validator.validate(value),
            // A dropped partner no longer constrains this cell.
            Self::Link { origin, partner } => partner
                .upgrade()
                .map_or(Ok(()), |partner| partner.check(value, Some(*origin))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_rejects_with_message() {
        let validator = Validator::predicate("at most 10", |v: Option<&i32>| v.is_none_or(|v| *v <= 10));
        assert!(validator.validate(Some(&10)).is_ok());
        assert!(validator.validate(None).is_ok());
        assert_eq!(
            validator.validate(Some(&11)),
            Err(ValueError::Invalid(InvalidValue::new("at most 10")))
        );
    }

    #[test]
    fn non_null_rejects_none() {
        let validator = Validator::<String>::non_null("required");
        assert!(validator.validate(Some(&"x".to_string())).is_ok());
        assert!(validator.validate(None).is_err());
    }

    #[test]
    fn equality_is_identity() {
        let a = Validator::predicate("a", |_: Option<&u8>| true);
        let b = Validator::predicate("a", |_: Option<&u8>| true);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn chain_entry_matches_only_user_validators() {
        let validator = Validator::predicate("x", |_: Option<&u8>| true);
        let entry = ChainEntry::User(validator.clone());
        assert!(entry.is(&validator));
        assert_eq!(entry.origin(), None);
    }
}
