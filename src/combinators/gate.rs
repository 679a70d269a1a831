//! Gate: pairs each input value with the next available value from a
//! latched channel, emitting `(input, latch)` tuples.

use tracing::debug;

use crate::channel::{Capacity, Chan};
use crate::io_endpoint::IoEndpoint;

/// Pairs each value arriving on the gate's input with the next value taken
/// from `latch`, emitting `(v, latch_value)`. If `latch` closes, the gate
/// closes; closing the gate's own input also closes it.
pub fn gate<V, L>(latch: Chan<L>, capacity: Capacity) -> IoEndpoint<V, (V, L)>
where
    V: Send + 'static,
    L: Send + 'static,
{
    let input: Chan<V> = Chan::new(capacity);
    let output: Chan<(V, L)> = Chan::new(capacity);

    {
        let input = input.clone();
        let output = output.clone();
        tokio::spawn(async move {
            loop {
                let Some(value) = input.recv().await else {
                    debug!("gate closed: input ended");
                    output.close().await;
                    return;
                };
                let Some(latched) = latch.recv().await else {
                    debug!("gate closed: latch ended");
                    output.close().await;
                    return;
                };
                if !output.send((value, latched)).await {
                    debug!("gate closed: downstream rejected the paired value");
                    return;
                }
            }
        });
    }

    IoEndpoint::new(input, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pairs_each_input_with_the_next_latch_value() {
        let latch: Chan<&'static str> = Chan::new(Capacity::Bounded(4));
        let gated = gate(latch.clone(), Capacity::Bounded(4));

        latch.send("x").await;
        latch.send("y").await;
        gated.send(1).await;
        gated.send(2).await;

        assert_eq!(gated.receive().await, Some((1, "x")));
        assert_eq!(gated.receive().await, Some((2, "y")));
    }

    #[tokio::test]
    async fn latch_closing_closes_the_gate() {
        let latch: Chan<&'static str> = Chan::new(Capacity::Bounded(4));
        let gated = gate(latch.clone(), Capacity::Bounded(4));

        gated.send(1).await;
        latch.close().await;

        assert_eq!(gated.receive().await, None);
    }
}
