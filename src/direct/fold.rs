use super::{DirectStream, Step};
use crate::error::Result;
use std::task::{Context, Poll};

/// A reusable left-fold specification: an initial accumulator, a step and a
/// final extraction. Used by grouping operators that run many folds over one
/// stream.
pub struct Fold<T, S, B> {
    init: Box<dyn FnMut() -> S + Send>,
    step: Box<dyn FnMut(S, T) -> S + Send>,
    extract: Box<dyn FnMut(S) -> B + Send>,
}

impl<T, S, B> Fold<T, S, B> {
    pub fn new(
        init: impl FnMut() -> S + Send + 'static,
        step: impl FnMut(S, T) -> S + Send + 'static,
        extract: impl FnMut(S) -> B + Send + 'static,
    ) -> Self {
        Self {
            init: Box::new(init),
            step: Box::new(step),
            extract: Box::new(extract),
        }
    }
}

impl<T: Send + 'static> Fold<T, Vec<T>, Vec<T>> {
    /// Collect each group into a `Vec`.
    pub fn collect() -> Self {
        Fold::new(Vec::new, |mut acc, x| {
            acc.push(x);
            acc
        }, |acc| acc)
    }
}

impl<T> Fold<T, usize, usize> {
    pub fn count() -> Self {
        Fold::new(|| 0, |acc, _| acc + 1, |acc| acc)
    }
}

impl<T> Fold<T, T, T>
where
    T: Default + std::ops::Add<Output = T> + Send + 'static,
{
    pub fn sum() -> Self {
        Fold::new(T::default, |acc, x| acc + x, |acc| acc)
    }
}

/// Runs the fold specification over consecutive chunks of `n` elements; the
/// trailing partial chunk is folded too.
pub struct GroupsOf<D, S, B>
where
    D: DirectStream,
{
    stream: D,
    size: usize,
    fold: Fold<D::Item, S, B>,
    acc: Option<(S, usize)>,
    done: bool,
}

impl<D: DirectStream, S, B> GroupsOf<D, S, B> {
    pub(crate) fn new(stream: D, size: usize, fold: Fold<D::Item, S, B>) -> Self {
        Self {
            stream,
            size: size.max(1),
            fold,
            acc: None,
            done: false,
        }
    }
}

impl<D, S, B> DirectStream for GroupsOf<D, S, B>
where
    D: DirectStream,
{
    type Item = B;

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Result<Step<B>>> {
        if self.done {
            return Poll::Ready(Ok(Step::Stop));
        }
        Poll::Ready(Ok(match futures::ready!(self.stream.poll_step(cx))? {
            Step::Yield(x) => {
                let (acc, seen) = self.acc.take().unwrap_or_else(|| ((self.fold.init)(), 0));
                let acc = (self.fold.step)(acc, x);
                let seen = seen + 1;
                if seen == self.size {
                    Step::Yield((self.fold.extract)(acc))
                } else {
                    self.acc = Some((acc, seen));
                    Step::Skip
                }
            }
            Step::Skip => Step::Skip,
            Step::Stop => {
                self.done = true;
                match self.acc.take() {
                    Some((acc, _)) => Step::Yield((self.fold.extract)(acc)),
                    None => Step::Stop,
                }
            }
        }))
    }
}
