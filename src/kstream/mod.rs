//! Continuation-form streams: the outer composition layer.
//!
//! A [`KStream`] is a one-shot step producing a [`KStep`]: stop, a single
//! final element, or an element plus a first-class tail. The optional
//! [`SVar`] argument to the step is how merge nodes discover an enclosing
//! stream variable of their own style and flatten into it instead of
//! nesting engines.
//!
//! Tails are ordinary owned values, which is what lets the stream variable
//! park a producer mid-stream: the tail goes into the work queue, the task
//! goes away, and a later dispatch resumes it on a fresh task.

use crate::direct::{DirectStream, Step};
use crate::error::{Result, StreamError};
use crate::svar::{DrainSVar, SVar};
use crate::unfold::Unfold;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::fmt;
use std::future::Future;

/// Result of one continuation-form step. Exactly one variant per step.
pub enum KStep<T: Send + 'static> {
    Stop,
    Single(T),
    Yield(T, KStream<T>),
}

type StepFn<T> = Box<dyn FnOnce(Option<SVar<T>>) -> BoxFuture<'static, Result<KStep<T>>> + Send>;

pub struct KStream<T: Send + 'static> {
    step: StepFn<T>,
}

impl<T: Send + 'static> fmt::Debug for KStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KStream").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Default for KStream<T> {
    fn default() -> Self {
        Self::nil()
    }
}

impl<T: Send + 'static> KStream<T> {
    pub(crate) fn new<F, Fut>(step: F) -> Self
    where
        F: FnOnce(Option<SVar<T>>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<KStep<T>>> + Send + 'static,
    {
        Self {
            step: Box::new(move |ctx| step(ctx).boxed()),
        }
    }

    /// Advance by one step under the given SVar context.
    pub(crate) fn into_step(self, ctx: Option<SVar<T>>) -> BoxFuture<'static, Result<KStep<T>>> {
        (self.step)(ctx)
    }

    /// The empty stream.
    pub fn nil() -> Self {
        Self::new(|_| async { Ok(KStep::Stop) })
    }

    /// The one-element stream.
    pub fn single(x: T) -> Self {
        Self::new(move |_| async move { Ok(KStep::Single(x)) })
    }

    pub fn cons(x: T, tail: KStream<T>) -> Self {
        Self::new(move |_| async move { Ok(KStep::Yield(x, tail)) })
    }

    pub fn from_iter<I>(it: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        fn go<T: Send + 'static, I: Iterator<Item = T> + Send + 'static>(mut iter: I) -> KStream<T> {
            KStream::new(move |_| async move {
                Ok(match iter.next() {
                    Some(x) => KStep::Yield(x, go(iter)),
                    None => KStep::Stop,
                })
            })
        }
        go(it.into_iter())
    }

    /// Build a stream from a pull function; the stream ends at the first
    /// `None`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut() -> Option<T> + Send + 'static,
    {
        fn go<T, F>(mut f: F) -> KStream<T>
        where
            T: Send + 'static,
            F: FnMut() -> Option<T> + Send + 'static,
        {
            KStream::new(move |_| async move {
                Ok(match f() {
                    Some(x) => KStep::Yield(x, go(f)),
                    None => KStep::Stop,
                })
            })
        }
        go(f)
    }

    /// A stream that fails on its first step.
    pub fn raise(err: StreamError) -> Self {
        Self::new(move |_| async move { Err(err) })
    }

    pub fn from_direct<D>(stream: D) -> Self
    where
        D: DirectStream<Item = T> + Send + 'static,
    {
        Self::new(move |_| async move {
            let mut stream = stream;
            loop {
                let step = futures::future::poll_fn(|cx| stream.poll_step(cx)).await?;
                match step {
                    Step::Yield(x) => return Ok(KStep::Yield(x, KStream::from_direct(stream))),
                    Step::Skip => continue,
                    Step::Stop => return Ok(KStep::Stop),
                }
            }
        })
    }

    pub fn from_unfold<C, S>(unfold: Unfold<C, S, T>, seed: C) -> Self
    where
        C: Send + 'static,
        S: Send + 'static,
    {
        Self::from_direct(unfold.into_direct(seed))
    }

    /// Consume a stream variable. The drain handle travels with the tail, so
    /// dropping the stream mid-flight aborts the SVar and its workers.
    pub fn from_svar(svar: SVar<T>) -> Self {
        Self::from_drain(svar.drain())
    }

    pub(crate) fn from_drain(drain: DrainSVar<T>) -> Self {
        Self::new(move |_| async move {
            let mut drain = drain;
            Ok(match drain.next().await {
                None => KStep::Stop,
                Some(Ok(x)) => KStep::Yield(x, KStream::from_drain(drain)),
                Some(Err(e)) => return Err(e),
            })
        })
    }

    /// Serial concatenation: all of `self`, then all of `other`.
    pub fn append(self, other: KStream<T>) -> Self {
        Self::new(move |ctx| async move {
            match self.into_step(ctx.clone()).await? {
                KStep::Stop => other.into_step(ctx).await,
                KStep::Single(x) => Ok(KStep::Yield(x, other)),
                KStep::Yield(x, tail) => Ok(KStep::Yield(x, tail.append(other))),
            }
        })
    }

    /// Step the stream with `svar` installed as its context.
    pub fn with_context(self, svar: SVar<T>) -> Self {
        Self::new(move |_| self.into_step(Some(svar)))
    }

    pub fn map<U, F>(self, mut f: F) -> KStream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        KStream::new(move |_| async move {
            Ok(match self.into_step(None).await? {
                KStep::Stop => KStep::Stop,
                KStep::Single(x) => KStep::Single(f(x)),
                KStep::Yield(x, tail) => {
                    let y = f(x);
                    KStep::Yield(y, tail.map(f))
                }
            })
        })
    }

    pub fn filter<F>(self, mut f: F) -> KStream<T>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        KStream::new(move |ctx| async move {
            let mut cur = self;
            loop {
                match cur.into_step(ctx.clone()).await? {
                    KStep::Stop => return Ok(KStep::Stop),
                    KStep::Single(x) => {
                        return Ok(if f(&x) { KStep::Single(x) } else { KStep::Stop })
                    }
                    KStep::Yield(x, tail) => {
                        if f(&x) {
                            return Ok(KStep::Yield(x, tail.filter(f)));
                        }
                        cur = tail;
                    }
                }
            }
        })
    }

    pub fn take(self, n: u64) -> KStream<T> {
        KStream::new(move |ctx| async move {
            if n == 0 {
                return Ok(KStep::Stop);
            }
            Ok(match self.into_step(ctx).await? {
                KStep::Stop => KStep::Stop,
                KStep::Single(x) => KStep::Single(x),
                KStep::Yield(x, tail) => {
                    if n == 1 {
                        KStep::Single(x)
                    } else {
                        KStep::Yield(x, tail.take(n - 1))
                    }
                }
            })
        })
    }

    /// Nested-loop expansion with serial ordering: each element's substream
    /// runs to completion before the outer stream advances.
    pub fn concat_map<U, F>(self, f: F) -> KStream<U>
    where
        U: Send + 'static,
        F: Fn(T) -> KStream<U> + Clone + Send + 'static,
    {
        self.bind(f, |a, b| a.append(b))
    }

    /// Nested-loop expansion where sibling substreams are combined by
    /// `join`. This is the hook the style adapters use: the join decides
    /// whether siblings run serially, interleaved, or on a stream variable.
    pub fn bind<U, F, J>(self, f: F, join: J) -> KStream<U>
    where
        U: Send + 'static,
        F: Fn(T) -> KStream<U> + Clone + Send + 'static,
        J: Fn(KStream<U>, KStream<U>) -> KStream<U> + Clone + Send + 'static,
    {
        KStream::new(move |ctx| async move {
            match self.into_step(None).await? {
                KStep::Stop => Ok(KStep::Stop),
                KStep::Single(x) => f(x).into_step(ctx).await,
                KStep::Yield(x, tail) => {
                    let inner = f(x);
                    let rest = tail.bind(f.clone(), join.clone());
                    join(inner, rest).into_step(ctx).await
                }
            }
        })
    }

    /// Convert a failure into a replacement stream; values before the
    /// failure are passed through untouched.
    pub fn handle<F>(self, f: F) -> KStream<T>
    where
        F: FnOnce(StreamError) -> KStream<T> + Send + 'static,
    {
        KStream::new(move |ctx| async move {
            match self.into_step(ctx).await {
                Err(e) => f(e).into_step(None).await,
                Ok(KStep::Yield(x, tail)) => Ok(KStep::Yield(x, tail.handle(f))),
                Ok(done) => Ok(done),
            }
        })
    }

    /// Step the whole stream, discarding values.
    pub async fn run_drain(self) -> Result<()> {
        let mut cur = self;
        loop {
            match cur.into_step(None).await? {
                KStep::Stop | KStep::Single(_) => return Ok(()),
                KStep::Yield(_, tail) => cur = tail,
            }
        }
    }

    pub async fn fold<B, F>(self, init: B, mut f: F) -> Result<B>
    where
        F: FnMut(B, T) -> B + Send,
    {
        let mut acc = init;
        let mut cur = self;
        loop {
            match cur.into_step(None).await? {
                KStep::Stop => return Ok(acc),
                KStep::Single(x) => return Ok(f(acc, x)),
                KStep::Yield(x, tail) => {
                    acc = f(acc, x);
                    cur = tail;
                }
            }
        }
    }

    pub async fn try_fold<B, F>(self, init: B, mut f: F) -> Result<B>
    where
        F: FnMut(B, T) -> Result<B> + Send,
    {
        let mut acc = init;
        let mut cur = self;
        loop {
            match cur.into_step(None).await? {
                KStep::Stop => return Ok(acc),
                KStep::Single(x) => return f(acc, x),
                KStep::Yield(x, tail) => {
                    acc = f(acc, x)?;
                    cur = tail;
                }
            }
        }
    }

    pub async fn to_vec(self) -> Result<Vec<T>> {
        self.fold(Vec::new(), |mut acc, x| {
            acc.push(x);
            acc
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn construction_and_elimination() {
        assert_eq!(KStream::<u32>::nil().to_vec().await.unwrap(), vec![]);
        assert_eq!(KStream::single(7).to_vec().await.unwrap(), vec![7]);
        let s = KStream::cons(1, KStream::cons(2, KStream::single(3)));
        assert_eq!(s.to_vec().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn from_fn_pulls_until_none() {
        let mut n = 0;
        let s = KStream::from_fn(move || {
            n += 1;
            if n <= 3 {
                Some(n * 2)
            } else {
                None
            }
        });
        assert_eq!(s.to_vec().await.unwrap(), vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn append_is_concatenation() {
        let a = KStream::from_iter(vec![1, 2, 3]);
        let b = KStream::from_iter(vec![4, 5]);
        assert_eq!(a.append(b).to_vec().await.unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn append_with_empty_sides() {
        let a = KStream::from_iter(Vec::<u8>::new());
        let b = KStream::from_iter(vec![9]);
        assert_eq!(a.append(b).to_vec().await.unwrap(), vec![9]);
        let a = KStream::from_iter(vec![9]);
        let b = KStream::from_iter(Vec::<u8>::new());
        assert_eq!(a.append(b).to_vec().await.unwrap(), vec![9]);
    }

    #[tokio::test]
    async fn serial_bind_is_nested_loops() {
        let s = KStream::from_iter(vec![1, 2]);
        let out = s
            .concat_map(|x| KStream::from_iter(vec![10, 20]).map(move |y| x + y))
            .to_vec()
            .await
            .unwrap();
        assert_eq!(out, vec![11, 21, 12, 22]);
    }

    #[tokio::test]
    async fn map_filter_take() {
        let s = KStream::from_iter(0..100)
            .map(|x| x * 2)
            .filter(|x| x % 3 == 0)
            .take(4);
        assert_eq!(s.to_vec().await.unwrap(), vec![0, 6, 12, 18]);
    }

    #[tokio::test]
    async fn take_zero_never_steps() {
        // stepping this stream would fail, but take(0) stops first
        let s = KStream::<u32>::raise(StreamError::user(anyhow::anyhow!("stepped"))).take(0);
        assert_eq!(s.to_vec().await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn errors_surface_through_folds() {
        let s = KStream::from_iter(vec![1, 2]).append(KStream::raise(StreamError::user(
            anyhow::anyhow!("downstream failure"),
        )));
        let res = s.to_vec().await;
        assert!(matches!(res, Err(StreamError::User(_))));
    }

    #[tokio::test]
    async fn handle_substitutes_a_stream() {
        let s = KStream::from_iter(vec![1, 2])
            .append(KStream::raise(StreamError::user(anyhow::anyhow!("oops"))))
            .handle(|_| KStream::from_iter(vec![8, 9]));
        assert_eq!(s.to_vec().await.unwrap(), vec![1, 2, 8, 9]);
    }

    #[tokio::test]
    async fn fold_drives_the_stream() {
        let sum = KStream::from_iter(1..=10u64).fold(0, |a, b| a + b).await.unwrap();
        assert_eq!(sum, 55);
    }
}
