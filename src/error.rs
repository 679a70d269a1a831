//! Crate-wide error types.
//!
//! Two distinct failure channels exist in this runtime and they must not be
//! conflated:
//!
//! - [`CogError`] is raised synchronously, by `Result`/panic, for programmer
//!   faults detected at construction time (a null transition, for example).
//!   These are not recoverable and are never placed on a channel.
//! - [`ErrorEnvelope`] is data. A transition fault never propagates as a Rust
//!   `Err` out of the runtime; it is converted into an envelope and emitted
//!   on the cog's output stream like any other value, so a failing cog stays
//!   alive and keeps accepting input.

use std::fmt;

/// Programmer faults signaled synchronously at construction. Not recoverable.
#[derive(thiserror::Error, Debug)]
pub enum CogError {
    #[error("cog constructed without a transition function")]
    NullTransition,
    #[error("fork requested ForkTransition::Inherit but there is no transition to inherit (a passive fork has no worker, and a context-mapping fork cannot reuse the parent's transition)")]
    NoTransitionToInherit,
}

/// The discriminant consumers match on to distinguish an [`ErrorEnvelope`]
/// from an ordinary output value. `#[non_exhaustive]` to leave room for
/// future envelope kinds without breaking existing `match` arms downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    Error,
}

/// The wire-level contract for a transition fault: `{kind, cause, input}`.
///
/// `cause` is the `Display` of the fault that the transition raised. `input`
/// is the `Debug` rendering of the message that triggered it — messages are
/// opaque to the runtime, so a debug rendering is the only representation
/// guaranteed to exist for any `Msg` type a caller supplies.
#[derive(Debug, Clone)]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub cause: String,
    pub input: String,
}

impl ErrorEnvelope {
    pub fn new(cause: impl fmt::Display, input: impl fmt::Debug) -> Self {
        Self {
            kind: ErrorKind::Error,
            cause: cause.to_string(),
            input: format!("{input:?}"),
        }
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error on input {}: {}", self.input, self.cause)
    }
}

/// Every value that flows through a cog's output/broadcast is either the
/// transition's normal output or an [`ErrorEnvelope`] recording a fault on
/// that cog. Matching on the variant is how a downstream consumer
/// distinguishes errors from ordinary values without an exception crossing
/// a channel boundary.
#[derive(Debug, Clone)]
pub enum CogOutput<Out> {
    Value(Out),
    Error(ErrorEnvelope),
}

impl<Out> CogOutput<Out> {
    pub fn value(self) -> Option<Out> {
        match self {
            CogOutput::Value(v) => Some(v),
            CogOutput::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CogOutput::Error(_))
    }
}

/// A transition or transform fault. Transitions and transforms may perform
/// arbitrary side effects, so their failure mode is an opaque `anyhow::Error`
/// rather than a crate-specific enum — the runtime never inspects it beyond
/// formatting it into an [`ErrorEnvelope`].
pub type Fault = anyhow::Error;
