use super::{DirectStream, Step};
use crate::error::Result;
use crate::kstream::{KStep, KStream};
use futures::future::BoxFuture;
use futures::{FutureExt, Stream};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Run a continuation-form stream as a direct stream.
///
/// The inverse bridge is [`into_kstream`](super::DirectStreamExt::into_kstream);
/// composing the two in either order leaves the element sequence untouched.
pub fn from_kstream<T: Send + 'static>(stream: KStream<T>) -> FromKStream<T> {
    FromKStream {
        next: Some(stream),
        pending: None,
    }
}

pub struct FromKStream<T: Send + 'static> {
    next: Option<KStream<T>>,
    pending: Option<BoxFuture<'static, Result<KStep<T>>>>,
}

impl<T: Send + 'static> DirectStream for FromKStream<T> {
    type Item = T;

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Result<Step<T>>> {
        if self.pending.is_none() {
            match self.next.take() {
                Some(s) => self.pending = Some(s.into_step(None)),
                None => return Poll::Ready(Ok(Step::Stop)),
            }
        }
        let fut = self.pending.as_mut().expect("just stored");
        let step = futures::ready!(fut.poll_unpin(cx));
        self.pending = None;
        Poll::Ready(match step {
            Ok(KStep::Stop) => Ok(Step::Stop),
            Ok(KStep::Single(x)) => Ok(Step::Yield(x)),
            Ok(KStep::Yield(x, tail)) => {
                self.next = Some(tail);
                Ok(Step::Yield(x))
            }
            Err(e) => Err(e),
        })
    }
}

/// Adapter exposing a direct stream as a [`futures::Stream`].
#[must_use = "streams do nothing unless polled"]
pub struct Streamed<D> {
    stream: D,
    done: bool,
}

impl<D> Unpin for Streamed<D> {}

impl<D> Streamed<D> {
    pub(crate) fn new(stream: D) -> Self {
        Self {
            stream,
            done: false,
        }
    }
}

impl<D: DirectStream> Stream for Streamed<D> {
    type Item = Result<D::Item>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        loop {
            match futures::ready!(this.stream.poll_step(cx)) {
                Ok(Step::Yield(x)) => return Poll::Ready(Some(Ok(x))),
                Ok(Step::Skip) => {}
                Ok(Step::Stop) => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Err(e) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
    }
}
