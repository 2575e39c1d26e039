//! The consumer side of a stream variable.

use super::{Event, SVar};
use crate::error::Result;
use futures::stream::FusedStream;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::trace;

/// The single consumer of an [`SVar`].
///
/// Each poll drains buffered events in arrival order; on an empty buffer it
/// re-dispatches one parked continuation, parks its waker as the doorbell
/// and suspends. The stream ends once the variable is sealed with nothing
/// buffered, running or parked. Dropping the consumer aborts the variable
/// and every live worker.
#[must_use = "streams do nothing unless polled"]
pub struct DrainSVar<T: Send + 'static> {
    svar: SVar<T>,
    done: bool,
}

impl<T: Send + 'static> Unpin for DrainSVar<T> {}

impl<T: Send + 'static> DrainSVar<T> {
    pub(super) fn new(svar: SVar<T>) -> Self {
        Self { svar, done: false }
    }

    /// The variable this consumer drains.
    pub fn svar(&self) -> &SVar<T> {
        &self.svar
    }
}

impl<T: Send + 'static> Stream for DrainSVar<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        let mut inner = this.svar.inner.lock();
        loop {
            match inner.output.pop_front() {
                Some(Event::Value(x)) => {
                    inner.buffered -= 1;
                    return Poll::Ready(Some(Ok(x)));
                }
                Some(Event::ChildStop(id)) => {
                    trace!(svar = this.svar.account(), worker = id, "consumed child stop");
                }
                Some(Event::Error(e)) => {
                    // deliver in FIFO position, then abort: values behind
                    // the error and all sibling workers are discarded
                    this.done = true;
                    this.svar.close_locked(&mut inner);
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    let finished = inner.sealed
                        && inner.active_workers == 0
                        && inner.work.is_empty();
                    if inner.closed || finished {
                        this.done = true;
                        this.svar.close_locked(&mut inner);
                        return Poll::Ready(None);
                    }
                    // this is where demand-driven styles grow their pool:
                    // an idle consumer asks for one more producer
                    this.svar.dispatch_one(&mut inner);
                    inner.doorbell = Some(cx.waker().clone());
                    return Poll::Pending;
                }
            }
        }
    }
}

impl<T: Send + 'static> FusedStream for DrainSVar<T> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<T: Send + 'static> Drop for DrainSVar<T> {
    fn drop(&mut self) {
        if !self.done {
            trace!(svar = self.svar.account(), "consumer dropped, aborting");
            self.svar.close();
        }
    }
}
