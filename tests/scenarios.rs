//! End-to-end scenarios exercising a cog and every combinator together,
//! mirroring the behaviors a downstream caller actually relies on.

use std::sync::Arc;

use cog_rt::channel::Chan;
use cog_rt::combinators::{dialogue, fanout, flow, gate};
use cog_rt::{Capacity, CogBuilder, IoEndpoint};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Installs a `tracing` subscriber so a failing scenario prints the
/// crate's own `debug!`/`warn!`/`trace!` output instead of nothing;
/// `try_init` so running more than one test in-process is harmless.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("debug"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

fn echo_cog() -> cog_rt::Cog<Vec<String>, String, String> {
    CogBuilder::new(Vec::<String>::new())
        .transition(|ctx: Arc<Vec<String>>, msg: String| {
            let mut next = (*ctx).clone();
            next.push(msg.clone());
            Ok((next, format!("echo:{msg}")))
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn echo_cog_scenario() {
    init_tracing();
    let cog = echo_cog();
    cog.send("a".into()).await;
    cog.send("b".into()).await;

    assert_eq!(cog.receive().await.unwrap().value(), Some("echo:a".into()));
    assert_eq!(cog.receive().await.unwrap().value(), Some("echo:b".into()));

    cog.close().await;
    assert_eq!(*cog.snapshot(), vec!["a".to_string(), "b".to_string()]);
}

/// `flow` over arbitrary channels (here plain relabeling stages rather than
/// cogs, since a cog's output is wrapped in `CogOutput` and flow links
/// same-typed stages directly) — an "echo" stage followed by a "shout"
/// stage that uppercases.
fn relabel_stage(f: impl Fn(&str) -> String + Send + 'static) -> IoEndpoint<String, String> {
    let input: Chan<String> = Chan::new(Capacity::Bounded(4));
    let output: Chan<String> = Chan::new(Capacity::Bounded(4));
    let io = IoEndpoint::new(input.clone(), output.clone());
    tokio::spawn(async move {
        loop {
            match input.recv().await {
                Some(msg) => {
                    if !output.send(f(&msg)).await {
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
async fn shout_flow_scenario() {
    init_tracing();
    let echo = relabel_stage(|m| format!("echo:{m}"));
    let shout = relabel_stage(|m| m.to_uppercase());
    let pipeline = flow(vec![echo, shout], Capacity::Bounded(4));

    pipeline.send("hello".into()).await;
    assert_eq!(pipeline.receive().await, Some("ECHO:HELLO".to_string()));
}

fn arithmetic_arm(f: impl Fn(i64) -> i64 + Send + 'static) -> IoEndpoint<i64, i64> {
    let input: Chan<i64> = Chan::new(Capacity::Bounded(1));
    let output: Chan<i64> = Chan::new(Capacity::Bounded(1));
    let io = IoEndpoint::new(input.clone(), output.clone());
    tokio::spawn(async move {
        loop {
            match input.recv().await {
                Some(v) => {
                    if !output.send(f(v)).await {
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
async fn fanout_tuple_scenario() {
    init_tracing();
    let arms = vec![
        arithmetic_arm(|x| x + 1),
        arithmetic_arm(|x| x * 2),
        arithmetic_arm(|x| x - 1),
    ];
    let fan = fanout(arms, Capacity::Bounded(4));

    fan.send(10).await;
    assert_eq!(fan.receive().await, Some(vec![11, 20, 9]));
}

#[tokio::test]
async fn gate_pair_scenario() {
    init_tracing();
    let latch: Chan<&'static str> = Chan::new(Capacity::Bounded(4));
    let gated = gate(latch.clone(), Capacity::Bounded(4));

    latch.send("L").await;
    latch.send("M").await;
    gated.send(1).await;
    gated.send(2).await;

    assert_eq!(gated.receive().await, Some((1, "L")));
    assert_eq!(gated.receive().await, Some((2, "M")));
}

#[tokio::test]
async fn dialogue_ping_pong_scenario() {
    init_tracing();
    let a = relabel_stage(|m| format!("A:{m}"));
    let b = relabel_stage(|m| format!("B:{m}"));
    let d = dialogue(a, b, Capacity::Bounded(4));

    d.send("hi".into()).await;
    assert_eq!(d.receive().await, Some("A:hi".to_string()));
    assert_eq!(d.receive().await, Some("B:A:hi".to_string()));
    assert_eq!(d.receive().await, Some("A:B:A:hi".to_string()));
    assert_eq!(d.receive().await, Some("B:A:B:A:hi".to_string()));
}

#[tokio::test]
async fn error_recovery_scenario() {
    init_tracing();
    let cog: cog_rt::Cog<Vec<String>, String, String> = CogBuilder::new(Vec::<String>::new())
        .transition(|ctx: Arc<Vec<String>>, msg: String| {
            if msg.contains("fail") {
                anyhow::bail!("forced failure");
            }
            let mut next = (*ctx).clone();
            next.push(msg.clone());
            Ok((next, msg))
        })
        .build()
        .unwrap();

    cog.send("ok1".into()).await;
    cog.send("fail".into()).await;
    cog.send("ok2".into()).await;

    let first = cog.receive().await.unwrap();
    assert_eq!(first.value(), Some("ok1".to_string()));

    let errored = cog.receive().await.unwrap();
    assert!(errored.is_error());

    let third = cog.receive().await.unwrap();
    assert_eq!(third.value(), Some("ok2".to_string()));

    cog.close().await;
    assert_eq!(*cog.snapshot(), vec!["ok1".to_string(), "ok2".to_string()]);
}
