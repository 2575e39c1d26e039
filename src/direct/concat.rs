use super::{DirectStream, Step};
use crate::error::Result;
use std::task::{Context, Poll};

/// Serial nested loop: each outer element is expanded into a stream which
/// runs to completion before the outer stream is advanced again.
pub struct ConcatMap<D, D2, F> {
    outer: D,
    f: F,
    inner: Option<D2>,
}

impl<D, D2, F> ConcatMap<D, D2, F> {
    pub(crate) fn new(outer: D, f: F) -> Self {
        Self {
            outer,
            f,
            inner: None,
        }
    }
}

impl<D, D2, F> DirectStream for ConcatMap<D, D2, F>
where
    D: DirectStream,
    D2: DirectStream,
    F: FnMut(D::Item) -> D2,
{
    type Item = D2::Item;

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Result<Step<D2::Item>>> {
        if let Some(inner) = &mut self.inner {
            return Poll::Ready(Ok(match futures::ready!(inner.poll_step(cx))? {
                Step::Yield(x) => Step::Yield(x),
                Step::Skip => Step::Skip,
                Step::Stop => {
                    self.inner = None;
                    Step::Skip
                }
            }));
        }
        Poll::Ready(Ok(match futures::ready!(self.outer.poll_step(cx))? {
            Step::Yield(x) => {
                self.inner = Some((self.f)(x));
                Step::Skip
            }
            Step::Skip => Step::Skip,
            Step::Stop => Step::Stop,
        }))
    }
}
