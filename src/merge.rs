//! The public merge operators.
//!
//! All four disciplines return a plain [`KStream`], so expressions stay
//! composable regardless of how much concurrency hides inside. Serial and
//! interleaved merges never touch a stream variable; the two parallel
//! merges build one (or flatten into an enclosing one of the same style).

use crate::direct::{from_kstream, DirectStreamExt};
use crate::kstream::{KStep, KStream};
use crate::svar::{SVar, Style, DEFAULT_OUTPUT_BOUND};
use std::collections::VecDeque;

/// All of `a`, then all of `b`.
pub fn serial<T: Send + 'static>(a: KStream<T>, b: KStream<T>) -> KStream<T> {
    a.append(b)
}

/// Alternate elements of `a` and `b`; when one side runs out, the rest of
/// the other follows.
pub fn interleave<T: Send + 'static>(a: KStream<T>, b: KStream<T>) -> KStream<T> {
    KStream::new(move |ctx| async move {
        match a.into_step(ctx.clone()).await? {
            KStep::Stop => b.into_step(ctx).await,
            KStep::Single(x) => Ok(KStep::Yield(x, b)),
            KStep::Yield(x, tail) => Ok(KStep::Yield(x, interleave(b, tail))),
        }
    })
}

/// Round-robin over a finite collection of streams.
///
/// Interleaving keeps per-branch state, so the fan-in must be finite; this
/// is enforced by taking a `Vec` rather than a stream of streams.
pub fn interleave_all<T: Send + 'static>(streams: Vec<KStream<T>>) -> KStream<T> {
    fn go<T: Send + 'static>(mut queue: VecDeque<KStream<T>>) -> KStream<T> {
        KStream::new(move |ctx| async move {
            loop {
                let s = match queue.pop_front() {
                    Some(s) => s,
                    None => return Ok(KStep::Stop),
                };
                match s.into_step(ctx.clone()).await? {
                    KStep::Stop => continue,
                    KStep::Single(x) => return Ok(KStep::Yield(x, go(queue))),
                    KStep::Yield(x, tail) => {
                        queue.push_back(tail);
                        return Ok(KStep::Yield(x, go(queue)));
                    }
                }
            }
        })
    }
    go(streams.into())
}

/// Demand-driven parallel merge.
///
/// Builds a `Parallel_LIFO` stream variable: the left branch is dispatched
/// immediately, the right one waits in the work queue until the consumer
/// drains faster than the running workers fill the buffer. A slow consumer
/// therefore sees mostly left-hand elements and a single producer; a fast
/// one gets both branches running concurrently.
pub fn coparallel<T: Send + 'static>(a: KStream<T>, b: KStream<T>) -> KStream<T> {
    merge_svar(Style::PARALLEL_LIFO, DEFAULT_OUTPUT_BOUND, vec![a, b])
}

/// Demand-driven parallel merge over a finite collection.
pub fn coparallel_all<T: Send + 'static>(streams: Vec<KStream<T>>) -> KStream<T> {
    merge_svar(Style::PARALLEL_LIFO, DEFAULT_OUTPUT_BOUND, streams)
}

/// Fair parallel merge: both branches run from the start, elements arrive
/// in completion order with round-robin resumption of parked producers.
pub fn parallel<T: Send + 'static>(a: KStream<T>, b: KStream<T>) -> KStream<T> {
    merge_svar(Style::PARALLEL_FIFO, DEFAULT_OUTPUT_BOUND, vec![a, b])
}

/// Fair parallel merge over a finite collection; every branch is dispatched
/// at construction.
pub fn parallel_all<T: Send + 'static>(streams: Vec<KStream<T>>) -> KStream<T> {
    merge_svar(Style::PARALLEL_FIFO, DEFAULT_OUTPUT_BOUND, streams)
}

fn merge_svar<T: Send + 'static>(
    style: Style,
    bound: usize,
    streams: Vec<KStream<T>>,
) -> KStream<T> {
    KStream::new(move |ctx| async move {
        // when stepped under a matching engine, contribute the branches to
        // it instead of nesting a second one
        if let Some(enclosing) = ctx.filter(|sv| sv.style() == style) {
            for s in streams {
                enclosing.push(s)?;
            }
            return Ok(KStep::Stop);
        }
        let sv = SVar::new(style, bound, None);
        for s in streams {
            sv.push(s).ok();
        }
        sv.seal();
        KStream::from_svar(sv).into_step(None).await
    })
}

/// Buffer a stream through its own demand-driven stream variable, so that
/// production runs ahead of (and concurrently with) consumption.
pub fn mk_async<T: Send + 'static>(bound: usize, s: KStream<T>) -> KStream<T> {
    KStream::from_svar(to_svar(bound, s))
}

/// Run a stream into a fresh stream variable with a single seed worker.
pub fn to_svar<T: Send + 'static>(bound: usize, s: KStream<T>) -> SVar<T> {
    let sv = SVar::new(Style::PARALLEL_LIFO, bound, None);
    sv.push(s).ok();
    sv.seal();
    sv
}

/// Serial lockstep zip; ends at the shorter input.
pub fn zip_with<A, B, C, F>(f: F, a: KStream<A>, b: KStream<B>) -> KStream<C>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
    F: FnMut(A, B) -> C + Send + 'static,
{
    from_kstream(a).zip_with(from_kstream(b), f).into_kstream()
}

/// Zip where both sides produce concurrently through their own buffers.
pub fn zip_with_parallel<A, B, C, F>(f: F, a: KStream<A>, b: KStream<B>) -> KStream<C>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
    F: FnMut(A, B) -> C + Send + 'static,
{
    KStream::new(move |_| async move {
        // the buffers must not exist until the zip itself is stepped
        let a = mk_async(DEFAULT_OUTPUT_BOUND, a);
        let b = mk_async(DEFAULT_OUTPUT_BOUND, b);
        zip_with(f, a, b).into_step(None).await
    })
}
