//! Direct-form streams: the fusion-friendly inner-loop layer.
//!
//! A direct stream is a state machine advanced one [`Step`] at a time. The
//! state is the combinator struct itself, the step function is
//! [`DirectStream::poll_step`]; chains of combinators monomorphize into one
//! flat loop. `Skip` lets `filter`, `concat_map` and friends report "no
//! element this step" without looping inside their own step; the drivers
//! do the looping.

mod bridge;
mod concat;
mod drivers;
mod filter;
mod fold;
mod map;
mod source;
mod take;
mod zip;

pub use bridge::{from_kstream, FromKStream, Streamed};
pub use concat::ConcatMap;
pub use drivers::{CmpBy, Drain, EqBy, FoldDriver, FoldRight, ToVec, TryFoldDriver};
pub use filter::{Filter, FilterAsync};
pub use fold::{Fold, GroupsOf};
pub use map::{Map, MapAsync};
pub use source::{empty, enumerate_from_step, from_iter, from_vec, EnumerateFromStep, FromIter};
pub use take::{Take, TakeWhile};
pub use zip::ZipWith;

use crate::error::Result;
use crate::kstream::KStream;
use std::cmp::Ordering;
use std::future::Future;
use std::task::{Context, Poll};

/// Outcome of advancing a direct-form stream by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<T> {
    /// One element was produced.
    Yield(T),
    /// The stream advanced without producing an element.
    Skip,
    /// The stream is exhausted; further polls keep returning `Stop`.
    Stop,
}

pub trait DirectStream {
    type Item;

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Result<Step<Self::Item>>>;
}

impl<D: DirectStream + ?Sized> DirectStream for &mut D {
    type Item = D::Item;

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Result<Step<Self::Item>>> {
        (**self).poll_step(cx)
    }
}

impl<D: DirectStream + ?Sized> DirectStream for Box<D> {
    type Item = D::Item;

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Result<Step<Self::Item>>> {
        (**self).poll_step(cx)
    }
}

pub trait DirectStreamExt: DirectStream + Sized {
    fn map<U, F>(self, f: F) -> Map<Self, F>
    where
        F: FnMut(Self::Item) -> U,
    {
        Map::new(self, f)
    }

    /// Effectful map: at most one mapping future is in flight at a time.
    fn map_async<U, F, Fut>(self, f: F) -> MapAsync<Self, F, U>
    where
        F: FnMut(Self::Item) -> Fut,
        Fut: Future<Output = Result<U>> + Send + 'static,
    {
        MapAsync::new(self, f)
    }

    fn filter<F>(self, f: F) -> Filter<Self, F>
    where
        F: FnMut(&Self::Item) -> bool,
    {
        Filter::new(self, f)
    }

    /// Effectful filter. The predicate receives the element by reference and
    /// must return an owned future; clone what you need into it.
    fn filter_async<F, Fut>(self, f: F) -> FilterAsync<Self, F>
    where
        F: FnMut(&Self::Item) -> Fut,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        FilterAsync::new(self, f)
    }

    fn take(self, n: u64) -> Take<Self> {
        Take::new(self, n)
    }

    fn take_while<F>(self, f: F) -> TakeWhile<Self, F>
    where
        F: FnMut(&Self::Item) -> bool,
    {
        TakeWhile::new(self, f)
    }

    /// Pair up elements with `other`; the result ends at the shorter input.
    fn zip_with<B, U, F>(self, other: B, f: F) -> ZipWith<Self, B, F>
    where
        B: DirectStream,
        F: FnMut(Self::Item, B::Item) -> U,
    {
        ZipWith::new(self, other, f)
    }

    /// Substitute a whole stream per element and run the substitutes to
    /// completion in order.
    fn concat_map<D2, F>(self, f: F) -> ConcatMap<Self, D2, F>
    where
        D2: DirectStream,
        F: FnMut(Self::Item) -> D2,
    {
        ConcatMap::new(self, f)
    }

    /// Chop the stream into groups of `n` and run each group through the
    /// fold specification. The final group may be shorter than `n`.
    fn groups_of<S, B>(self, n: usize, fold: Fold<Self::Item, S, B>) -> GroupsOf<Self, S, B> {
        GroupsOf::new(self, n, fold)
    }

    fn fold<B, F>(self, init: B, f: F) -> FoldDriver<Self, B, F>
    where
        F: FnMut(B, Self::Item) -> B,
    {
        FoldDriver::new(self, init, f)
    }

    fn try_fold<B, F>(self, init: B, f: F) -> TryFoldDriver<Self, B, F>
    where
        F: FnMut(B, Self::Item) -> Result<B>,
    {
        TryFoldDriver::new(self, init, f)
    }

    /// Right fold. This materializes the stream before folding back to
    /// front, so it must not be used on unbounded streams.
    fn fold_right<B, F>(self, init: B, f: F) -> FoldRight<Self, B, F>
    where
        F: FnMut(Self::Item, B) -> B,
    {
        FoldRight::new(self, init, f)
    }

    fn to_vec(self) -> ToVec<Self> {
        ToVec::new(self)
    }

    fn drain(self) -> Drain<Self> {
        Drain::new(self)
    }

    fn eq_by<B, F>(self, other: B, f: F) -> EqBy<Self, B, F>
    where
        B: DirectStream,
        F: FnMut(&Self::Item, &B::Item) -> bool,
    {
        EqBy::new(self, other, f)
    }

    fn cmp_by<B, F>(self, other: B, f: F) -> CmpBy<Self, B, F>
    where
        B: DirectStream,
        F: FnMut(&Self::Item, &B::Item) -> Ordering,
    {
        CmpBy::new(self, other, f)
    }

    /// Lift into the continuation form. Round-tripping through
    /// [`from_kstream`] in either order preserves observable behavior.
    fn into_kstream(self) -> KStream<Self::Item>
    where
        Self: Send + 'static,
        Self::Item: Send + 'static,
    {
        KStream::from_direct(self)
    }

    /// Adapt to a [`futures::Stream`] of `Result` items.
    fn into_stream(self) -> Streamed<Self> {
        Streamed::new(self)
    }
}

impl<D: DirectStream + Sized> DirectStreamExt for D {}
