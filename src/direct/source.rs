use super::{DirectStream, Step};
use crate::error::Result;
use std::ops::Add;
use std::task::{Context, Poll};

/// Stream over any iterator.
#[derive(Debug)]
pub struct FromIter<I> {
    iter: I,
}

pub fn from_iter<I: IntoIterator>(it: I) -> FromIter<I::IntoIter> {
    FromIter { iter: it.into_iter() }
}

pub fn from_vec<T>(v: Vec<T>) -> FromIter<std::vec::IntoIter<T>> {
    from_iter(v)
}

pub fn empty<T>() -> FromIter<std::iter::Empty<T>> {
    from_iter(std::iter::empty())
}

impl<I: Iterator> DirectStream for FromIter<I> {
    type Item = I::Item;

    fn poll_step(&mut self, _cx: &mut Context<'_>) -> Poll<Result<Step<Self::Item>>> {
        Poll::Ready(Ok(match self.iter.next() {
            Some(x) => Step::Yield(x),
            None => Step::Stop,
        }))
    }
}

/// The unbounded arithmetic progression `from, from + stride, ...`.
///
/// Bound it with [`take`](super::DirectStreamExt::take).
#[derive(Debug)]
pub struct EnumerateFromStep<T> {
    current: T,
    stride: T,
}

pub fn enumerate_from_step<T>(from: T, stride: T) -> EnumerateFromStep<T>
where
    T: Add<Output = T> + Copy,
{
    EnumerateFromStep { current: from, stride }
}

impl<T> DirectStream for EnumerateFromStep<T>
where
    T: Add<Output = T> + Copy,
{
    type Item = T;

    fn poll_step(&mut self, _cx: &mut Context<'_>) -> Poll<Result<Step<T>>> {
        let x = self.current;
        self.current = x + self.stride;
        Poll::Ready(Ok(Step::Yield(x)))
    }
}
