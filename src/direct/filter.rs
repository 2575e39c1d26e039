use super::{DirectStream, Step};
use crate::error::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::task::{Context, Poll};

pub struct Filter<D, F> {
    stream: D,
    f: F,
}

impl<D, F> Filter<D, F> {
    pub(crate) fn new(stream: D, f: F) -> Self {
        Self { stream, f }
    }
}

impl<D, F> DirectStream for Filter<D, F>
where
    D: DirectStream,
    F: FnMut(&D::Item) -> bool,
{
    type Item = D::Item;

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Result<Step<D::Item>>> {
        let step = futures::ready!(self.stream.poll_step(cx))?;
        Poll::Ready(Ok(match step {
            Step::Yield(x) if (self.f)(&x) => Step::Yield(x),
            Step::Yield(_) | Step::Skip => Step::Skip,
            Step::Stop => Step::Stop,
        }))
    }
}

pub struct FilterAsync<D, F>
where
    D: DirectStream,
{
    stream: D,
    f: F,
    // the element under test rides along with its predicate future
    pending: Option<(BoxFuture<'static, Result<bool>>, Option<D::Item>)>,
}

impl<D: DirectStream, F> FilterAsync<D, F> {
    pub(crate) fn new(stream: D, f: F) -> Self {
        Self {
            stream,
            f,
            pending: None,
        }
    }
}

impl<D, F, Fut> DirectStream for FilterAsync<D, F>
where
    D: DirectStream,
    F: FnMut(&D::Item) -> Fut,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    type Item = D::Item;

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Result<Step<D::Item>>> {
        if self.pending.is_none() {
            match futures::ready!(self.stream.poll_step(cx))? {
                Step::Yield(x) => {
                    let fut = (self.f)(&x).boxed();
                    self.pending = Some((fut, Some(x)));
                }
                Step::Skip => return Poll::Ready(Ok(Step::Skip)),
                Step::Stop => return Poll::Ready(Ok(Step::Stop)),
            }
        }
        let (fut, item) = self.pending.as_mut().expect("just stored");
        let keep = futures::ready!(fut.poll_unpin(cx));
        let item = item.take().expect("tested item present");
        self.pending = None;
        Poll::Ready(match keep {
            Ok(true) => Ok(Step::Yield(item)),
            Ok(false) => Ok(Step::Skip),
            Err(e) => Err(e),
        })
    }
}
