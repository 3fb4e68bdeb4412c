//! Background generation handles.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::FutureExt;
use tokio::sync::oneshot;

use crate::{HuginnError, Result};

/// A generation running on the tokio runtime.
///
/// Await it for the result. [`abandon`](Self::abandon) drops interest
/// without aborting the in-flight call: the work still finishes and a
/// successful result still lands in the response cache, so asking again
/// later is cheap.
#[must_use = "a task does nothing useful unless awaited or explicitly abandoned"]
pub struct GenerationTask<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> GenerationTask<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self { rx }
    }

    /// Stop waiting for the result.
    pub fn abandon(self) {
        drop(self.rx);
    }

    /// The result if it is already available, without waiting.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(HuginnError::Cancelled)),
        }
    }
}

impl<T> Future for GenerationTask<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.rx
            .poll_unpin(cx)
            .map(|received| received.unwrap_or(Err(HuginnError::Cancelled)))
    }
}
