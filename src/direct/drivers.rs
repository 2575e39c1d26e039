//! Driver futures that run a direct stream to completion. They do the
//! looping over `Skip` outcomes so the combinators never have to.

use super::{DirectStream, Step};
use crate::error::Result;
use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

#[must_use = "futures do nothing unless polled"]
pub struct FoldDriver<D, B, F> {
    stream: D,
    acc: Option<B>,
    f: F,
}

// drivers never project into their stream, so they can always be moved
impl<D, B, F> Unpin for FoldDriver<D, B, F> {}

impl<D, B, F> FoldDriver<D, B, F> {
    pub(crate) fn new(stream: D, init: B, f: F) -> Self {
        Self {
            stream,
            acc: Some(init),
            f,
        }
    }
}

impl<D, B, F> Future for FoldDriver<D, B, F>
where
    D: DirectStream,
    F: FnMut(B, D::Item) -> B,
{
    type Output = Result<B>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<B>> {
        let this = self.get_mut();
        loop {
            match futures::ready!(this.stream.poll_step(cx))? {
                Step::Yield(x) => {
                    let acc = this.acc.take().expect("polled after completion");
                    this.acc = Some((this.f)(acc, x));
                }
                Step::Skip => {}
                Step::Stop => {
                    return Poll::Ready(Ok(this.acc.take().expect("polled after completion")))
                }
            }
        }
    }
}

#[must_use = "futures do nothing unless polled"]
pub struct TryFoldDriver<D, B, F> {
    stream: D,
    acc: Option<B>,
    f: F,
}

impl<D, B, F> Unpin for TryFoldDriver<D, B, F> {}

impl<D, B, F> TryFoldDriver<D, B, F> {
    pub(crate) fn new(stream: D, init: B, f: F) -> Self {
        Self {
            stream,
            acc: Some(init),
            f,
        }
    }
}

impl<D, B, F> Future for TryFoldDriver<D, B, F>
where
    D: DirectStream,
    F: FnMut(B, D::Item) -> Result<B>,
{
    type Output = Result<B>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<B>> {
        let this = self.get_mut();
        loop {
            match futures::ready!(this.stream.poll_step(cx))? {
                Step::Yield(x) => {
                    let acc = this.acc.take().expect("polled after completion");
                    this.acc = Some((this.f)(acc, x)?);
                }
                Step::Skip => {}
                Step::Stop => {
                    return Poll::Ready(Ok(this.acc.take().expect("polled after completion")))
                }
            }
        }
    }
}

/// Buffers the whole stream, then folds back to front.
#[must_use = "futures do nothing unless polled"]
pub struct FoldRight<D, B, F>
where
    D: DirectStream,
{
    stream: D,
    buf: Vec<D::Item>,
    init: Option<B>,
    f: F,
}

impl<D: DirectStream, B, F> Unpin for FoldRight<D, B, F> {}

impl<D: DirectStream, B, F> FoldRight<D, B, F> {
    pub(crate) fn new(stream: D, init: B, f: F) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            init: Some(init),
            f,
        }
    }
}

impl<D, B, F> Future for FoldRight<D, B, F>
where
    D: DirectStream,
    F: FnMut(D::Item, B) -> B,
{
    type Output = Result<B>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<B>> {
        let this = self.get_mut();
        loop {
            match futures::ready!(this.stream.poll_step(cx))? {
                Step::Yield(x) => this.buf.push(x),
                Step::Skip => {}
                Step::Stop => {
                    let mut acc = this.init.take().expect("polled after completion");
                    while let Some(x) = this.buf.pop() {
                        acc = (this.f)(x, acc);
                    }
                    return Poll::Ready(Ok(acc));
                }
            }
        }
    }
}

#[must_use = "futures do nothing unless polled"]
pub struct ToVec<D>
where
    D: DirectStream,
{
    stream: D,
    buf: Vec<D::Item>,
}

impl<D: DirectStream> Unpin for ToVec<D> {}

impl<D: DirectStream> ToVec<D> {
    pub(crate) fn new(stream: D) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }
}

impl<D: DirectStream> Future for ToVec<D> {
    type Output = Result<Vec<D::Item>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<Vec<D::Item>>> {
        let this = self.get_mut();
        loop {
            match futures::ready!(this.stream.poll_step(cx))? {
                Step::Yield(x) => this.buf.push(x),
                Step::Skip => {}
                Step::Stop => return Poll::Ready(Ok(std::mem::take(&mut this.buf))),
            }
        }
    }
}

/// Feed all values into a supermassive black hole and complete when done.
#[must_use = "futures do nothing unless polled"]
pub struct Drain<D> {
    stream: D,
}

impl<D> Unpin for Drain<D> {}

impl<D> Drain<D> {
    pub(crate) fn new(stream: D) -> Self {
        Self { stream }
    }
}

impl<D: DirectStream> Future for Drain<D> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.get_mut();
        loop {
            match futures::ready!(this.stream.poll_step(cx))? {
                Step::Yield(_) | Step::Skip => {}
                Step::Stop => return Poll::Ready(Ok(())),
            }
        }
    }
}

#[must_use = "futures do nothing unless polled"]
pub struct EqBy<A, B, F>
where
    A: DirectStream,
{
    a: A,
    b: B,
    f: F,
    left: Option<A::Item>,
    a_done: bool,
}

impl<A: DirectStream, B, F> Unpin for EqBy<A, B, F> {}

impl<A: DirectStream, B, F> EqBy<A, B, F> {
    pub(crate) fn new(a: A, b: B, f: F) -> Self {
        Self {
            a,
            b,
            f,
            left: None,
            a_done: false,
        }
    }
}

impl<A, B, F> Future for EqBy<A, B, F>
where
    A: DirectStream,
    B: DirectStream,
    F: FnMut(&A::Item, &B::Item) -> bool,
{
    type Output = Result<bool>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<bool>> {
        let this = self.get_mut();
        loop {
            if !this.a_done && this.left.is_none() {
                match futures::ready!(this.a.poll_step(cx))? {
                    Step::Yield(x) => this.left = Some(x),
                    Step::Skip => continue,
                    Step::Stop => this.a_done = true,
                }
            }
            match futures::ready!(this.b.poll_step(cx))? {
                Step::Yield(y) => match this.left.take() {
                    Some(x) if (this.f)(&x, &y) => {}
                    _ => return Poll::Ready(Ok(false)),
                },
                Step::Skip => continue,
                Step::Stop => return Poll::Ready(Ok(this.a_done && this.left.is_none())),
            }
        }
    }
}

#[must_use = "futures do nothing unless polled"]
pub struct CmpBy<A, B, F>
where
    A: DirectStream,
{
    a: A,
    b: B,
    f: F,
    left: Option<A::Item>,
    a_done: bool,
}

impl<A: DirectStream, B, F> Unpin for CmpBy<A, B, F> {}

impl<A: DirectStream, B, F> CmpBy<A, B, F> {
    pub(crate) fn new(a: A, b: B, f: F) -> Self {
        Self {
            a,
            b,
            f,
            left: None,
            a_done: false,
        }
    }
}

impl<A, B, F> Future for CmpBy<A, B, F>
where
    A: DirectStream,
    B: DirectStream,
    F: FnMut(&A::Item, &B::Item) -> Ordering,
{
    type Output = Result<Ordering>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<Ordering>> {
        let this = self.get_mut();
        loop {
            if !this.a_done && this.left.is_none() {
                match futures::ready!(this.a.poll_step(cx))? {
                    Step::Yield(x) => this.left = Some(x),
                    Step::Skip => continue,
                    Step::Stop => this.a_done = true,
                }
            }
            match futures::ready!(this.b.poll_step(cx))? {
                Step::Yield(y) => match this.left.take() {
                    Some(x) => match (this.f)(&x, &y) {
                        Ordering::Equal => {}
                        other => return Poll::Ready(Ok(other)),
                    },
                    None => return Poll::Ready(Ok(Ordering::Less)),
                },
                Step::Skip => continue,
                Step::Stop => {
                    return Poll::Ready(Ok(if this.a_done && this.left.is_none() {
                        Ordering::Equal
                    } else {
                        Ordering::Greater
                    }))
                }
            }
        }
    }
}
