//! First-class producers.
//!
//! An [`Unfold`] separates the seed from the running state: `inject` turns a
//! seed into a state, `step` advances it. Unfolds compose on the element side
//! ([`map`](Unfold::map)) and on the seed side ([`lmap`](Unfold::lmap)), and
//! carry the resource-safe [`bracket`]/[`finally`] scoping used by streams
//! that own files, sockets or other cleanup-bearing state.

use crate::direct::{DirectStream, Step};
use crate::error::{Result, StreamError};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::warn;

/// Outcome of one unfold step, carrying the successor state.
pub enum UnfoldStep<S, T> {
    Yield(T, S),
    Skip(S),
    Stop,
}

pub struct Unfold<C, S, T> {
    inject: Box<dyn FnMut(C) -> Result<S> + Send>,
    step: Box<dyn FnMut(S) -> Result<UnfoldStep<S, T>> + Send>,
}

impl<C, S, T> Unfold<C, S, T>
where
    C: Send + 'static,
    S: Send + 'static,
    T: Send + 'static,
{
    pub fn new(
        inject: impl FnMut(C) -> Result<S> + Send + 'static,
        step: impl FnMut(S) -> Result<UnfoldStep<S, T>> + Send + 'static,
    ) -> Self {
        Self {
            inject: Box::new(inject),
            step: Box::new(step),
        }
    }

    /// Transform the produced elements.
    pub fn map<U: Send + 'static>(
        self,
        mut f: impl FnMut(T) -> U + Send + 'static,
    ) -> Unfold<C, S, U> {
        let mut step = self.step;
        Unfold {
            inject: self.inject,
            step: Box::new(move |s| {
                Ok(match step(s)? {
                    UnfoldStep::Yield(t, s2) => UnfoldStep::Yield(f(t), s2),
                    UnfoldStep::Skip(s2) => UnfoldStep::Skip(s2),
                    UnfoldStep::Stop => UnfoldStep::Stop,
                })
            }),
        }
    }

    /// Transform the seed before injection (contravariant composition).
    pub fn lmap<C2: Send + 'static>(
        self,
        mut f: impl FnMut(C2) -> C + Send + 'static,
    ) -> Unfold<C2, S, T> {
        let mut inject = self.inject;
        Unfold {
            inject: Box::new(move |c2| inject(f(c2))),
            step: self.step,
        }
    }

    /// Run the unfold as a direct stream starting from `seed`. Injection is
    /// deferred to the first step, so acquisition happens only once the
    /// stream is actually driven.
    pub fn into_direct(self, seed: C) -> UnfoldStream<C, S, T> {
        UnfoldStream {
            unfold: self,
            state: UnfoldState::Start(seed),
        }
    }
}

impl<C, T> Unfold<C, Option<T>, T>
where
    C: Send + 'static,
    T: Send + 'static,
{
    /// The one-element unfold of a function.
    pub fn function(mut f: impl FnMut(C) -> T + Send + 'static) -> Self {
        Unfold::new(
            move |c| Ok(Some(f(c))),
            |s| {
                Ok(match s {
                    Some(x) => UnfoldStep::Yield(x, None),
                    None => UnfoldStep::Stop,
                })
            },
        )
    }
}

impl<T> Unfold<T, T, T>
where
    T: std::ops::Add<Output = T> + Copy + Send + 'static,
{
    /// Unbounded arithmetic progression; the seed is the first element.
    pub fn enumerate(stride: T) -> Self {
        Unfold::new(Ok, move |s| Ok(UnfoldStep::Yield(s, s + stride)))
    }
}

type Release<R> = Arc<dyn Fn(R) -> anyhow::Result<()> + Send + Sync>;

/// Owns a resource until the release hook has run. Exactly one of the
/// explicit release paths or `Drop` fires the hook.
pub struct ReleaseGuard<R> {
    resource: Option<R>,
    release: Release<R>,
}

impl<R> ReleaseGuard<R> {
    fn new(resource: R, release: Release<R>) -> Self {
        Self {
            resource: Some(resource),
            release,
        }
    }

    fn release(&mut self) -> Result<()> {
        match self.resource.take() {
            Some(r) => (self.release)(r).map_err(StreamError::Resource),
            None => Ok(()),
        }
    }
}

impl<R> Drop for ReleaseGuard<R> {
    fn drop(&mut self) {
        if let Some(r) = self.resource.take() {
            if let Err(error) = (self.release)(r) {
                // nobody left to receive the failure
                warn!(%error, "release hook failed while dropping a bracketed stream");
            }
        }
    }
}

/// Scope a resource around an unfold.
///
/// `before` runs once, before the first element; its result seeds `body` and
/// is handed to `after`. `after` runs at most once, on the first of normal
/// stop, step error, or drop of the stream state (consumer abandonment).
/// Errors from the body re-raise only after `after` has completed.
pub fn bracket<C, R, S, T>(
    mut before: impl FnMut(C) -> anyhow::Result<R> + Send + 'static,
    after: impl Fn(R) -> anyhow::Result<()> + Send + Sync + 'static,
    body: Unfold<R, S, T>,
) -> Unfold<C, (S, ReleaseGuard<R>), T>
where
    C: Send + 'static,
    R: Clone + Send + 'static,
    S: Send + 'static,
    T: Send + 'static,
{
    let after: Release<R> = Arc::new(after);
    let mut inject = body.inject;
    let mut step = body.step;
    Unfold {
        inject: Box::new(move |c| {
            let r = before(c).map_err(StreamError::Resource)?;
            let s = inject(r.clone())?;
            Ok((s, ReleaseGuard::new(r, after.clone())))
        }),
        step: Box::new(move |(s, mut guard)| match step(s) {
            Ok(UnfoldStep::Yield(t, s2)) => Ok(UnfoldStep::Yield(t, (s2, guard))),
            Ok(UnfoldStep::Skip(s2)) => Ok(UnfoldStep::Skip((s2, guard))),
            Ok(UnfoldStep::Stop) => {
                guard.release()?;
                Ok(UnfoldStep::Stop)
            }
            Err(e) => {
                if let Err(error) = guard.release() {
                    warn!(%error, "release hook failed while unwinding a failed step");
                }
                Err(e)
            }
        }),
    }
}

/// Run `after` when the unfold stops, fails or is dropped; no resource.
pub fn finally<C, S, T>(
    after: impl Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    body: Unfold<C, S, T>,
) -> Unfold<C, (S, ReleaseGuard<()>), T>
where
    C: Send + 'static,
    S: Send + 'static,
    T: Send + 'static,
{
    let after: Release<()> = Arc::new(move |()| after());
    let mut inject = body.inject;
    let mut step = body.step;
    Unfold {
        inject: Box::new(move |c| {
            let s = inject(c)?;
            Ok((s, ReleaseGuard::new((), after.clone())))
        }),
        step: Box::new(move |(s, mut guard)| match step(s) {
            Ok(UnfoldStep::Yield(t, s2)) => Ok(UnfoldStep::Yield(t, (s2, guard))),
            Ok(UnfoldStep::Skip(s2)) => Ok(UnfoldStep::Skip((s2, guard))),
            Ok(UnfoldStep::Stop) => {
                guard.release()?;
                Ok(UnfoldStep::Stop)
            }
            Err(e) => {
                if let Err(error) = guard.release() {
                    warn!(%error, "release hook failed while unwinding a failed step");
                }
                Err(e)
            }
        }),
    }
}

enum UnfoldState<C, S> {
    Start(C),
    Running(S),
    Done,
}

/// A running unfold, usable wherever a direct stream is.
pub struct UnfoldStream<C, S, T> {
    unfold: Unfold<C, S, T>,
    state: UnfoldState<C, S>,
}

impl<C, S, T> DirectStream for UnfoldStream<C, S, T> {
    type Item = T;

    fn poll_step(&mut self, _cx: &mut Context<'_>) -> Poll<Result<Step<T>>> {
        Poll::Ready(match std::mem::replace(&mut self.state, UnfoldState::Done) {
            UnfoldState::Start(seed) => match (self.unfold.inject)(seed) {
                Ok(s) => {
                    self.state = UnfoldState::Running(s);
                    Ok(Step::Skip)
                }
                Err(e) => Err(e),
            },
            UnfoldState::Running(s) => match (self.unfold.step)(s) {
                Ok(UnfoldStep::Yield(t, s2)) => {
                    self.state = UnfoldState::Running(s2);
                    Ok(Step::Yield(t))
                }
                Ok(UnfoldStep::Skip(s2)) => {
                    self.state = UnfoldState::Running(s2);
                    Ok(Step::Skip)
                }
                Ok(UnfoldStep::Stop) => Ok(Step::Stop),
                Err(e) => Err(e),
            },
            UnfoldState::Done => Ok(Step::Stop),
        })
    }
}
