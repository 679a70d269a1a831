//! Cog: the stateful agent at the center of this crate. Owns private
//! context, advances it on a dedicated worker by applying a transition to
//! each input message, and publishes every transition's output through a
//! broadcast while exposing its own primary read endpoint as one of that
//! broadcast's subscribers.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::broadcast::{Broadcast, SubscriptionId};
use crate::channel::{Capacity, Chan, ChanBuilder};
use crate::error::{CogError, CogOutput, ErrorEnvelope, ErrorKind, Fault};
use crate::io_endpoint::IoEndpoint;

/// A transition: `(context, message) -> (context', output)`. May perform
/// arbitrary side effects and may block; the worker runs it via
/// `spawn_blocking` so a slow transition never stalls the async runtime.
pub type TransitionFn<Ctx, Msg, Out> = dyn Fn(Arc<Ctx>, Msg) -> Result<(Ctx, Out), Fault> + Send + Sync;

/// Converts a transition fault (plus a debug rendering of the message that
/// triggered it) into the envelope placed on the output stream.
pub type CogFaultHandler<Msg> = dyn Fn(Fault, &str) -> ErrorEnvelope + Send + Sync;

type OutputTransform<Out> = dyn Fn(CogOutput<Out>) -> Result<Vec<CogOutput<Out>>, Fault> + Send + Sync;
type OutputFaultHandler<Out> = dyn Fn(Fault) -> Option<CogOutput<Out>> + Send + Sync;

fn default_fault_handler<Msg>() -> Arc<CogFaultHandler<Msg>> {
    Arc::new(|fault, input_debug| ErrorEnvelope {
        kind: ErrorKind::Error,
        cause: fault.to_string(),
        input: input_debug.to_string(),
    })
}

/// The three states a fork's transition parameter can take. Rust has no
/// sentinel "explicit null" distinct from "omitted", so the distinction is
/// an explicit three-way enum instead of an `Option<Option<_>>`.
pub enum ForkTransition<Ctx, Msg, Out> {
    /// Inherit the parent's transition and fault handler.
    Inherit,
    /// No worker at all: a passive fork that re-exposes the parent
    /// broadcast through a new `IoEndpoint`.
    Passive,
    /// Spawn a fresh worker bound to the given transition.
    Replace(Arc<TransitionFn<Ctx, Msg, Out>>),
}

/// A stateful concurrent agent: private context, a transition applied on a
/// dedicated worker, and a single bidirectional [`IoEndpoint`] fed by a
/// [`Broadcast`].
pub struct Cog<Ctx, Msg, Out> {
    context: Arc<RwLock<Arc<Ctx>>>,
    io: IoEndpoint<Msg, CogOutput<Out>>,
    broadcast: Arc<Broadcast<CogOutput<Out>>>,
    subscription_id: SubscriptionId,
    worker: AsyncMutex<Option<JoinHandle<()>>>,
    transition: Option<Arc<TransitionFn<Ctx, Msg, Out>>>,
    fault_handler: Arc<CogFaultHandler<Msg>>,
    input_capacity: Capacity,
    output_capacity: Capacity,
    output_transform: Option<Arc<OutputTransform<Out>>>,
    output_fault_handler: Option<Arc<OutputFaultHandler<Out>>>,
}

impl<Ctx, Msg, Out> fmt::Debug for Cog<Ctx, Msg, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cog")
            .field("has_worker", &self.transition.is_some())
            .field("subscribers", &self.broadcast.subscriber_count())
            .finish()
    }
}

/// Builds a [`Cog`]. `context` and `transition` are required; everything
/// else has a crate default (see [`crate::config::RuntimeConfig`]).
pub struct CogBuilder<Ctx, Msg, Out> {
    context: Option<Ctx>,
    transition: Option<Arc<TransitionFn<Ctx, Msg, Out>>>,
    fault_handler: Option<Arc<CogFaultHandler<Msg>>>,
    input_capacity: Capacity,
    output_capacity: Capacity,
    output_transform: Option<Arc<OutputTransform<Out>>>,
    output_fault_handler: Option<Arc<OutputFaultHandler<Out>>>,
}

impl<Ctx, Msg, Out> CogBuilder<Ctx, Msg, Out>
where
    Ctx: Send + Sync + 'static,
    Msg: Send + fmt::Debug + 'static,
    Out: Send + Clone + 'static,
{
    pub fn new(context: Ctx) -> Self {
        let defaults = crate::config::RuntimeConfig::default();
        Self {
            context: Some(context),
            transition: None,
            fault_handler: None,
            input_capacity: defaults.default_channel_capacity,
            output_capacity: defaults.default_channel_capacity,
            output_transform: None,
            output_fault_handler: None,
        }
    }

    pub fn transition<F>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Ctx>, Msg) -> Result<(Ctx, Out), Fault> + Send + Sync + 'static,
    {
        self.transition = Some(Arc::new(f));
        self
    }

    pub fn fault_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(Fault, &str) -> ErrorEnvelope + Send + Sync + 'static,
    {
        self.fault_handler = Some(Arc::new(f));
        self
    }

    pub fn input_capacity(mut self, capacity: Capacity) -> Self {
        self.input_capacity = capacity;
        self
    }

    pub fn output_capacity(mut self, capacity: Capacity) -> Self {
        self.output_capacity = capacity;
        self
    }

    pub fn output_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(CogOutput<Out>) -> Result<Vec<CogOutput<Out>>, Fault> + Send + Sync + 'static,
    {
        self.output_transform = Some(Arc::new(f));
        self
    }

    pub fn output_fault_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(Fault) -> Option<CogOutput<Out>> + Send + Sync + 'static,
    {
        self.output_fault_handler = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Result<Cog<Ctx, Msg, Out>, CogError> {
        let transition = self.transition.ok_or(CogError::NullTransition)?;
        let context = Arc::new(RwLock::new(Arc::new(
            self.context.expect("context always set by CogBuilder::new"),
        )));
        let fault_handler = self.fault_handler.unwrap_or_else(default_fault_handler);
        Ok(Cog::spawn_active(
            context,
            self.input_capacity,
            self.output_capacity,
            self.output_transform,
            self.output_fault_handler,
            Some(transition),
            fault_handler,
        ))
    }
}

async fn run_worker<Ctx, Msg, Out>(
    context: Arc<RwLock<Arc<Ctx>>>,
    input: Chan<Msg>,
    output: Chan<CogOutput<Out>>,
    transition: Arc<TransitionFn<Ctx, Msg, Out>>,
    fault_handler: Arc<CogFaultHandler<Msg>>,
) where
    Ctx: Send + Sync + 'static,
    Msg: Send + fmt::Debug + 'static,
    Out: Send + 'static,
{
    loop {
        trace!("worker loop iteration: awaiting next input");
        let Some(msg) = input.recv().await else {
            output.close().await;
            return;
        };
        let input_debug = format!("{msg:?}");
        let ctx_snapshot = context.read().clone();
        let step = transition.clone();
        let result = tokio::task::spawn_blocking(move || step(ctx_snapshot, msg)).await;

        match result {
            Ok(Ok((new_ctx, out))) => {
                *context.write() = Arc::new(new_ctx);
                output.send(CogOutput::Value(out)).await;
            }
            Ok(Err(fault)) => {
                warn!(cause = %fault, input = %input_debug, "transition fault");
                let envelope = fault_handler(fault, &input_debug);
                output.send(CogOutput::Error(envelope)).await;
            }
            Err(join_err) => {
                let fault = anyhow::anyhow!("transition panicked: {join_err}");
                warn!(cause = %fault, input = %input_debug, "transition fault");
                let envelope = fault_handler(fault, &input_debug);
                output.send(CogOutput::Error(envelope)).await;
            }
        }
    }
}

impl<Ctx, Msg, Out> Cog<Ctx, Msg, Out>
where
    Ctx: Send + Sync + 'static,
    Msg: Send + fmt::Debug + 'static,
    Out: Send + Clone + 'static,
{
    #[allow(clippy::too_many_arguments)]
    fn spawn_active(
        context: Arc<RwLock<Arc<Ctx>>>,
        input_capacity: Capacity,
        output_capacity: Capacity,
        output_transform: Option<Arc<OutputTransform<Out>>>,
        output_fault_handler: Option<Arc<OutputFaultHandler<Out>>>,
        transition: Option<Arc<TransitionFn<Ctx, Msg, Out>>>,
        fault_handler: Arc<CogFaultHandler<Msg>>,
    ) -> Self {
        let input = Chan::new(input_capacity);
        let mut worker_output_builder = ChanBuilder::new(output_capacity);
        if let Some(t) = output_transform.clone() {
            worker_output_builder = worker_output_builder.transform(move |v| t(v));
        }
        if let Some(f) = output_fault_handler.clone() {
            worker_output_builder = worker_output_builder.fault_handler(move |fault| f(fault));
        }
        let worker_output = worker_output_builder.build();

        let broadcast = Broadcast::spawn(worker_output.clone());
        let primary_read: Chan<CogOutput<Out>> = Chan::new(output_capacity);
        let subscription_id = broadcast.subscribe(primary_read.clone(), true);

        let worker_handle = transition.clone().map(|t| {
            tokio::spawn(run_worker(
                context.clone(),
                input.clone(),
                worker_output,
                t,
                fault_handler.clone(),
            ))
        });
        Cog {
            context,
            io: IoEndpoint::new(input, primary_read),
            broadcast,
            subscription_id,
            worker: AsyncMutex::new(worker_handle),
            transition,
            fault_handler,
            input_capacity,
            output_capacity,
            output_transform,
            output_fault_handler,
        }
    }

    /// Current context, reflecting the last completed transition. Lock-free
    /// in the sense that it never waits on the worker — a brief
    /// `parking_lot::RwLock` read of an `Arc` pointer, never held across an
    /// await point.
    pub fn snapshot(&self) -> Arc<Ctx> {
        self.context.read().clone()
    }

    pub fn io(&self) -> &IoEndpoint<Msg, CogOutput<Out>> {
        &self.io
    }

    pub async fn send(&self, msg: Msg) -> bool {
        self.io.send(msg).await
    }

    pub async fn receive(&self) -> Option<CogOutput<Out>> {
        self.io.receive().await
    }

    pub fn subscribe(&self, chan: Chan<CogOutput<Out>>, close_on_end: bool) -> SubscriptionId {
        self.broadcast.subscribe(chan, close_on_end)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.broadcast.unsubscribe(id);
    }

    /// Idempotent. Closes input (the worker, if any, drains any in-flight
    /// transition and closes its output in response), then tears down this
    /// handle's own subscription and read side.
    pub async fn close(&self) {
        debug!("cog close: closing input, draining worker");
        self.io.input().close().await;
        let handle = { self.worker.lock().await.take() };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.broadcast.unsubscribe(self.subscription_id);
        self.io.output().close().await;
        debug!("cog close: complete");
    }

    /// `Inherit` only type-checks when the derived cog keeps the parent's
    /// `Ctx`, so it is resolved here rather than inside [`derive`], which is
    /// shared with the context-mapping path where a parent transition
    /// (`TransitionFn<Ctx, ..>`) could never apply to a `Ctx2` cell.
    fn resolve(
        &self,
        transition: ForkTransition<Ctx, Msg, Out>,
    ) -> Result<ForkTransition<Ctx, Msg, Out>, CogError> {
        match transition {
            ForkTransition::Inherit => {
                let t = self.transition.clone().ok_or(CogError::NoTransitionToInherit)?;
                Ok(ForkTransition::Replace(t))
            }
            other => Ok(other),
        }
    }

    /// The top-level fork operation: same context cell, shared by reference.
    pub fn fork(
        &self,
        io: Option<IoEndpoint<Msg, CogOutput<Out>>>,
        transition: ForkTransition<Ctx, Msg, Out>,
    ) -> Result<Cog<Ctx, Msg, Out>, CogError> {
        let resolved = self.resolve(transition)?;
        Ok(derive(
            self.context.clone(),
            io,
            resolved,
            self.broadcast.clone(),
            self.input_capacity,
            self.output_capacity,
            self.output_transform.clone(),
            self.output_fault_handler.clone(),
            self.fault_handler.clone(),
        ))
    }

    /// Alias kept for call sites that read more naturally as
    /// "fork, sharing context" next to [`Cog::fork_mapping_context`].
    pub fn fork_sharing_context(
        &self,
        io: Option<IoEndpoint<Msg, CogOutput<Out>>>,
        transition: ForkTransition<Ctx, Msg, Out>,
    ) -> Result<Cog<Ctx, Msg, Out>, CogError> {
        self.fork(io, transition)
    }

    /// Derives a new cog whose context is computed from a snapshot of this
    /// cog's context via `map`, in a fresh, independent cell. `Inherit` is
    /// not a valid `transition` here — the parent's transition operates on
    /// `Ctx`, not the mapped `Ctx2`, so there is nothing to inherit.
    pub fn fork_mapping_context<Ctx2>(
        &self,
        map: impl FnOnce(&Ctx) -> Ctx2,
        io: Option<IoEndpoint<Msg, CogOutput<Out>>>,
        transition: ForkTransition<Ctx2, Msg, Out>,
    ) -> Result<Cog<Ctx2, Msg, Out>, CogError>
    where
        Ctx2: Send + Sync + 'static,
    {
        if matches!(transition, ForkTransition::Inherit) {
            return Err(CogError::NoTransitionToInherit);
        }
        let mapped = map(&self.snapshot());
        let context = Arc::new(RwLock::new(Arc::new(mapped)));
        Ok(derive(
            context,
            io,
            transition,
            self.broadcast.clone(),
            self.input_capacity,
            self.output_capacity,
            None,
            None,
            default_fault_handler(),
        ))
    }

    /// Sugar for [`Cog::fork`] with no context transformation and a given
    /// `IoEndpoint` — used to splice input- or output-side adapters onto an
    /// existing cog's logic.
    pub fn extend(
        &self,
        io: IoEndpoint<Msg, CogOutput<Out>>,
        transition: ForkTransition<Ctx, Msg, Out>,
    ) -> Result<Cog<Ctx, Msg, Out>, CogError> {
        self.fork(Some(io), transition)
    }
}

/// Shared construction path for every fork variant except `Inherit` (which
/// callers resolve to `Replace` beforehand — see [`Cog::resolve`]).
///
/// - `Passive` re-subscribes a (possibly fresh) output channel to
///   `parent_broadcast` directly and spawns no worker.
/// - `Replace` spawns a fresh worker, output queue, and broadcast — an
///   active fork never shares the parent's worker, queues, or broadcast,
///   even though it may share the
///   parent's context cell.
#[allow(clippy::too_many_arguments)]
fn derive<Ctx2, Msg, Out>(
    context: Arc<RwLock<Arc<Ctx2>>>,
    io: Option<IoEndpoint<Msg, CogOutput<Out>>>,
    transition: ForkTransition<Ctx2, Msg, Out>,
    parent_broadcast: Arc<Broadcast<CogOutput<Out>>>,
    input_capacity: Capacity,
    output_capacity: Capacity,
    output_transform: Option<Arc<OutputTransform<Out>>>,
    output_fault_handler: Option<Arc<OutputFaultHandler<Out>>>,
    fault_handler: Arc<CogFaultHandler<Msg>>,
) -> Cog<Ctx2, Msg, Out>
where
    Ctx2: Send + Sync + 'static,
    Msg: Send + fmt::Debug + 'static,
    Out: Send + Clone + 'static,
{
    let (input, output) = match io {
        Some(io) => (io.input().clone(), io.output().clone()),
        None => (Chan::new(input_capacity), Chan::new(output_capacity)),
    };

    match transition {
        ForkTransition::Passive => {
            let subscription_id = parent_broadcast.subscribe(output.clone(), true);
            Cog {
                context,
                io: IoEndpoint::new(input, output),
                broadcast: parent_broadcast,
                subscription_id,
                worker: AsyncMutex::new(None),
                transition: None,
                fault_handler,
                input_capacity,
                output_capacity,
                output_transform,
                output_fault_handler,
            }
        }
        ForkTransition::Replace(t) => {
            let mut worker_output_builder = ChanBuilder::new(output_capacity);
            if let Some(tr) = output_transform.clone() {
                worker_output_builder = worker_output_builder.transform(move |v| tr(v));
            }
            if let Some(f) = output_fault_handler.clone() {
                worker_output_builder = worker_output_builder.fault_handler(move |fault| f(fault));
            }
            let worker_output = worker_output_builder.build();
            let broadcast = Broadcast::spawn(worker_output.clone());
            let subscription_id = broadcast.subscribe(output.clone(), true);
            let worker_handle = tokio::spawn(run_worker(
                context.clone(),
                input.clone(),
                worker_output,
                t.clone(),
                fault_handler.clone(),
            ));
            Cog {
                context,
                io: IoEndpoint::new(input, output),
                broadcast,
                subscription_id,
                worker: AsyncMutex::new(Some(worker_handle)),
                transition: Some(t),
                fault_handler,
                input_capacity,
                output_capacity,
                output_transform,
                output_fault_handler,
            }
        }
        ForkTransition::Inherit => {
            unreachable!("callers resolve Inherit to Replace before calling derive")
        }
    }
}
