//! Scatter-gather: broadcasts each input value to every arm concurrently,
//! then gathers exactly one reply per arm, in arm order, before the next
//! input is broadcast.

use tracing::debug;

use crate::channel::{Capacity, Chan};
use crate::io_endpoint::IoEndpoint;

/// Fans `arms` out and gathers their replies into a `Vec<R>` preserving arm
/// order regardless of reply-arrival order. Gathering is strictly
/// sequential: the next input value is not broadcast until every reply for
/// the previous one has arrived, so arms never interleave two in-flight
/// requests. If any arm's output ends mid-gather, the fanout closes without
/// completing that gather.
///
/// Each arm's own reply channel only ever needs to hold one in-flight
/// value at a time given this sequencing — size arm output channels with
/// [`crate::config::RuntimeConfig::fanout_gather_capacity`] (`Bounded(1)`
/// by default) unless an arm is also read by another subscriber.
pub fn fanout<T, R>(arms: Vec<IoEndpoint<T, R>>, capacity: Capacity) -> IoEndpoint<T, Vec<R>>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
{
    let input: Chan<T> = Chan::new(capacity);
    let output: Chan<Vec<R>> = Chan::new(capacity);

    {
        let input = input.clone();
        let output = output.clone();
        tokio::spawn(async move {
            loop {
                let Some(value) = input.recv().await else {
                    debug!("fanout closed: input ended");
                    for arm in &arms {
                        arm.input().close().await;
                    }
                    output.close().await;
                    return;
                };

                for arm in &arms {
                    if !arm.send(value.clone()).await {
                        debug!("fanout closed: an arm rejected the scattered value");
                        output.close().await;
                        return;
                    }
                }

                let mut replies = Vec::with_capacity(arms.len());
                for arm in &arms {
                    match arm.receive().await {
                        Some(reply) => replies.push(reply),
                        None => {
                            debug!("fanout closed: an arm ended mid-gather");
                            output.close().await;
                            return;
                        }
                    }
                }

                if !output.send(replies).await {
                    debug!("fanout closed: downstream rejected the gathered tuple");
                    return;
                }
            }
        });
    }

    IoEndpoint::new(input, output)
}
