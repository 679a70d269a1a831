//! Dialogue: wires two parties' outputs back into each other's inputs,
//! alternating forever from an initial seed, publishing every turn on the
//! dialogue's own output.

use tracing::debug;

use crate::channel::{Capacity, Chan};
use crate::io_endpoint::IoEndpoint;

/// Starts an alternating exchange between `a` and `b`. A seed value sent on
/// the returned endpoint's input goes to `a`; from then on, each value `a`
/// produces is published and forwarded to `b`, each value `b` produces is
/// published and forwarded to `a`, and so on. If either participant's
/// output ends, the dialogue closes — `a` and `b` themselves are left
/// running, since the dialogue does not own them.
pub fn dialogue<T>(a: IoEndpoint<T, T>, b: IoEndpoint<T, T>, capacity: Capacity) -> IoEndpoint<T, T>
where
    T: Clone + Send + 'static,
{
    let input: Chan<T> = Chan::new(capacity);
    let output: Chan<T> = Chan::new(capacity);

    {
        let input = input.clone();
        let seed_target = a.clone();
        tokio::spawn(async move {
            loop {
                match input.recv().await {
                    Some(v) => {
                        if !seed_target.send(v).await {
                            debug!("dialogue closed: participant A rejected the seed");
                            return;
                        }
                    }
                    None => {
                        debug!("dialogue closed: seed input ended");
                        return;
                    }
                }
            }
        });
    }

    spawn_relay(a.clone(), b.clone(), output.clone());
    spawn_relay(b, a, output.clone());

    IoEndpoint::new(input, output)
}

/// Relays every value `from` produces to `to` and onto `output`, until
/// either `from` ends or `to` has closed.
fn spawn_relay<T>(from: IoEndpoint<T, T>, to: IoEndpoint<T, T>, output: Chan<T>)
where
    T: Clone + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match from.receive().await {
                Some(v) => {
                    if !output.send(v.clone()).await {
                        debug!("dialogue closed: downstream rejected a turn");
                        return;
                    }
                    if !to.send(v).await {
                        debug!("dialogue closed: the other participant rejected a turn");
                        output.close().await;
                        return;
                    }
                }
                None => {
                    debug!("dialogue closed: a participant's output ended");
                    output.close().await;
                    return;
                }
            }
        }
    });
}
