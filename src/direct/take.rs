use super::{DirectStream, Step};
use crate::error::Result;
use std::task::{Context, Poll};

pub struct Take<D> {
    stream: D,
    remaining: u64,
}

impl<D> Take<D> {
    pub(crate) fn new(stream: D, n: u64) -> Self {
        Self { stream, remaining: n }
    }
}

impl<D: DirectStream> DirectStream for Take<D> {
    type Item = D::Item;

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Result<Step<D::Item>>> {
        if self.remaining == 0 {
            return Poll::Ready(Ok(Step::Stop));
        }
        let step = futures::ready!(self.stream.poll_step(cx))?;
        if let Step::Yield(_) = step {
            self.remaining -= 1;
        }
        Poll::Ready(Ok(step))
    }
}

pub struct TakeWhile<D, F> {
    stream: D,
    f: F,
    done: bool,
}

impl<D, F> TakeWhile<D, F> {
    pub(crate) fn new(stream: D, f: F) -> Self {
        Self {
            stream,
            f,
            done: false,
        }
    }
}

impl<D, F> DirectStream for TakeWhile<D, F>
where
    D: DirectStream,
    F: FnMut(&D::Item) -> bool,
{
    type Item = D::Item;

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Result<Step<D::Item>>> {
        if self.done {
            return Poll::Ready(Ok(Step::Stop));
        }
        let step = futures::ready!(self.stream.poll_step(cx))?;
        Poll::Ready(Ok(match step {
            Step::Yield(x) if (self.f)(&x) => Step::Yield(x),
            Step::Yield(_) => {
                self.done = true;
                Step::Stop
            }
            other => other,
        }))
    }
}
