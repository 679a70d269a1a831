//! Sequential pipeline: chains a sequence of same-typed channels so a value
//! put on the flow's input travels stage by stage, with the final stage's
//! output emitted as the flow's own output.

use tracing::debug;

use crate::channel::{Capacity, Chan};
use crate::io_endpoint::IoEndpoint;

async fn forward<T>(from: Chan<T>, to: Chan<T>)
where
    T: Send + 'static,
{
    loop {
        match from.recv().await {
            Some(v) => {
                if !to.send(v).await {
                    debug!("flow stage closed: downstream stage rejected a send");
                    return;
                }
            }
            None => {
                debug!("flow stage closed: upstream ended");
                to.close().await;
                return;
            }
        }
    }
}

/// Chains `stages` in order: the flow's input feeds `stages[0]`'s input,
/// each stage's output feeds the next stage's input, and the last stage's
/// output is emitted on the flow's own output. Closing the flow's input
/// drains the pipeline and closes every internal link in turn; closing any
/// internal channel directly tears down the rest of the chain.
pub fn flow<T>(stages: Vec<IoEndpoint<T, T>>, capacity: Capacity) -> IoEndpoint<T, T>
where
    T: Send + 'static,
{
    let input = Chan::new(capacity);
    let output = Chan::new(capacity);

    if stages.is_empty() {
        tokio::spawn(forward(input.clone(), output.clone()));
        return IoEndpoint::new(input, output);
    }

    tokio::spawn(forward(input.clone(), stages[0].input().clone()));
    for pair in stages.windows(2) {
        tokio::spawn(forward(pair[0].output().clone(), pair[1].input().clone()));
    }
    let last = stages.last().expect("checked non-empty above");
    tokio::spawn(forward(last.output().clone(), output.clone()));

    IoEndpoint::new(input, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shout_stage() -> IoEndpoint<String, String> {
        let input: Chan<String> = Chan::new(Capacity::Bounded(4));
        let output: Chan<String> = Chan::new(Capacity::Bounded(4));
        let io = IoEndpoint::new(input.clone(), output.clone());
        tokio::spawn(async move {
            loop {
                match input.recv().await {
                    Some(msg) => {
                        if !output.send(msg.to_uppercase()).await {
                            return;
                        }
                    }
                    None => {
                        output.close().await;
                        return;
                    }
                }
            }
        });
        io
    }

    #[tokio::test]
    async fn three_stage_flow_applies_every_stage_in_order() {
        let stages = vec![shout_stage(), shout_stage(), shout_stage()];
        let pipeline = flow(stages, Capacity::Bounded(4));

        assert!(pipeline.send("hi".into()).await);
        assert_eq!(pipeline.receive().await, Some("HI".to_string()));
    }

    #[tokio::test]
    async fn empty_flow_passes_values_through_unchanged() {
        let pipeline: IoEndpoint<i32, i32> = flow(vec![], Capacity::Bounded(4));
        assert!(pipeline.send(7).await);
        assert_eq!(pipeline.receive().await, Some(7));
    }

    #[tokio::test]
    async fn closing_flow_input_drains_and_closes_output() {
        let stages = vec![shout_stage()];
        let pipeline = flow(stages, Capacity::Bounded(4));
        pipeline.send("last".into()).await;
        pipeline.input().close().await;

        assert_eq!(pipeline.receive().await, Some("LAST".to_string()));
        assert_eq!(pipeline.receive().await, None);
    }
}
