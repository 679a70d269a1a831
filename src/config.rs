//! Runtime-wide defaults applied when a cog, channel, or combinator is built
//! without an explicit override.

use std::env;

use serde::{Deserialize, Serialize};

use crate::channel::Capacity;

fn default_channel_capacity() -> Capacity {
    Capacity::Bounded(64)
}

fn default_fanout_gather_capacity() -> usize {
    1
}

fn default_dialogue_output_capacity() -> usize {
    1
}

/// Crate-wide defaults consulted by every builder in this crate unless a
/// caller overrides them directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity applied to a cog's input and output channels when a
    /// [`crate::cog::CogBuilder`] caller does not set one explicitly.
    #[serde(default = "default_channel_capacity")]
    pub default_channel_capacity: Capacity,
    /// Per-arm gather-channel capacity for [`crate::combinators::fanout::fanout`].
    #[serde(default = "default_fanout_gather_capacity")]
    pub fanout_gather_capacity: usize,
    /// Output-channel capacity for [`crate::combinators::dialogue::dialogue`].
    #[serde(default = "default_dialogue_output_capacity")]
    pub dialogue_output_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_channel_capacity: default_channel_capacity(),
            fanout_gather_capacity: default_fanout_gather_capacity(),
            dialogue_output_capacity: default_dialogue_output_capacity(),
        }
    }
}

impl RuntimeConfig {
    /// Builds a config from `COG_*` environment variables, falling back to
    /// [`RuntimeConfig::default`] for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_channel_capacity: env::var("COG_DEFAULT_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| parse_capacity(&v))
                .unwrap_or(defaults.default_channel_capacity),
            fanout_gather_capacity: env::var("COG_FANOUT_GATHER_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fanout_gather_capacity),
            dialogue_output_capacity: env::var("COG_DIALOGUE_OUTPUT_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.dialogue_output_capacity),
        }
    }
}

/// Accepts `"rendezvous"`, `"sliding-one"`, or a bare integer for a bounded
/// capacity of that size.
fn parse_capacity(raw: &str) -> Option<Capacity> {
    match raw.trim().to_lowercase().as_str() {
        "rendezvous" => Some(Capacity::Rendezvous),
        "sliding-one" | "sliding_one" => Some(Capacity::SlidingOne),
        n => n.parse::<usize>().ok().map(Capacity::Bounded),
    }
}
