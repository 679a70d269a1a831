//! [`IoEndpoint`] pairs an input channel (writes go here) with an output
//! channel (reads come from here) and presents them as one handle — a cog
//! is, from the outside, just a channel.

use crate::channel::{Chan, Poll};

/// A bidirectional handle built from two independently-typed channels.
/// Every cog and combinator in this crate returns one of these.
pub struct IoEndpoint<In, Out> {
    input: Chan<In>,
    output: Chan<Out>,
}

impl<In, Out> Clone for IoEndpoint<In, Out> {
    fn clone(&self) -> Self {
        Self {
            input: self.input.clone(),
            output: self.output.clone(),
        }
    }
}

impl<In, Out> IoEndpoint<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    pub fn new(input: Chan<In>, output: Chan<Out>) -> Self {
        Self { input, output }
    }

    pub fn input(&self) -> &Chan<In> {
        &self.input
    }

    pub fn output(&self) -> &Chan<Out> {
        &self.output
    }

    /// Sends route to the input side. Returns `false` if input is closed.
    pub async fn send(&self, value: In) -> bool {
        self.input.send(value).await
    }

    /// Non-blocking variant of [`IoEndpoint::send`].
    pub async fn offer(&self, value: In) -> bool {
        self.input.offer(value).await
    }

    /// Receives pull from the output side.
    pub async fn receive(&self) -> Option<Out> {
        self.output.recv().await
    }

    /// Non-blocking variant of [`IoEndpoint::receive`].
    pub async fn poll(&self) -> Poll<Out> {
        self.output.poll().await
    }

    /// Idempotent. Closes both the input and the output side.
    pub async fn close(&self) {
        self.input.close().await;
        self.output.close().await;
    }

    /// Reports whether the input side is closed.
    pub async fn is_closed(&self) -> bool {
        self.input.is_closed().await
    }
}
