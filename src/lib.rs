//! A channel-oriented runtime for composing stateful concurrent agents
//! ("cogs") into dataflow graphs.
//!
//! A [`cog::Cog`] owns private context and advances it on a dedicated
//! worker by applying a transition function to each input message,
//! publishing every transition's output to a [`broadcast::Broadcast`] that
//! any number of subscribers can read from. Cogs present themselves as a
//! single bidirectional [`io_endpoint::IoEndpoint`] — from the outside, a
//! cog is just a channel — and compose through the combinators in
//! [`combinators`]: `flow` chains cogs in series, `fanout` broadcasts one
//! input to several cogs and gathers their outputs, `gate` filters and
//! reshapes a stream, and `dialogue` wires two cogs' outputs back into each
//! other's inputs.

pub mod broadcast;
pub mod channel;
pub mod combinators;
pub mod config;
pub mod cog;
pub mod error;
pub mod io_endpoint;

pub use broadcast::{Broadcast, SubscriptionId};
pub use channel::{Capacity, Chan, ChanBuilder, Poll};
pub use cog::{Cog, CogBuilder, ForkTransition};
pub use config::RuntimeConfig;
pub use error::{CogError, CogOutput, ErrorEnvelope, ErrorKind, Fault};
pub use io_endpoint::IoEndpoint;
