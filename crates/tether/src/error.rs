#![forbid(unsafe_code)]

//! Errors returned by value mutation, validation, and linking.
//!
//! Every error is synchronous and leaves the cells involved exactly as they
//! were before the call.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | [`ValueError::Invalid`] | A validator rejected the candidate | Value unchanged |
//! | [`ValueError::Locked`] | `set` of a different value on a locked cell | Value unchanged |
//! | [`ValueError::Link`] | Self-link, duplicate, cycle, unknown pair | Link graph unchanged |
//! | [`ValueError::NoValue`] | `get_or_err` on a null cell | Nothing mutated |

use std::fmt;

/// A validator rejected a candidate value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidValue {
    message: String,
}

impl InvalidValue {
    /// Create a rejection carrying `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The validator's explanation.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value: {}", self.message)
    }
}

impl std::error::Error for InvalidValue {}

/// An illegal linking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// A value was linked to itself or to its own observable.
    SelfLink,
    /// The pair is already linked.
    AlreadyLinked,
    /// The link would close a cycle in the link graph.
    Cycle,
    /// The pair was never linked (or has been unlinked already).
    NotLinked,
    /// The observable's owning value no longer exists.
    Detached,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfLink => write!(f, "a value cannot be linked to itself"),
            Self::AlreadyLinked => write!(f, "values are already linked"),
            Self::Cycle => write!(f, "link would create a cycle"),
            Self::NotLinked => write!(f, "values are not linked"),
            Self::Detached => write!(f, "observable has outlived its value"),
        }
    }
}

impl std::error::Error for LinkError {}

/// Errors from [`Value`](crate::Value) operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A validator rejected the value.
    Invalid(InvalidValue),
    /// The link operation was illegal.
    Link(LinkError),
    /// The value is locked and the candidate differs from the current value.
    Locked,
    /// A value was required but the cell is null.
    NoValue,
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(err) => err.fmt(f),
            Self::Link(err) => err.fmt(f),
            Self::Locked => write!(f, "value is locked"),
            Self::NoValue => write!(f, "no value present"),
        }
    }
}

impl std::error::Error for ValueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Invalid(err) => Some(err),
            Self::Link(err) => Some(err),
            Self::Locked | Self::NoValue => None,
        }
    }
}

impl From<InvalidValue> for ValueError {
    fn from(err: InvalidValue) -> Self {
        Self::Invalid(err)
    }
}

impl From<LinkError> for ValueError {
    fn from(err: LinkError) -> Self {
        Self::Link(err)
    }
}
