use super::{DirectStream, Step};
use crate::error::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::task::{Context, Poll};

pub struct Map<D, F> {
    stream: D,
    f: F,
}

impl<D, F> Map<D, F> {
    pub(crate) fn new(stream: D, f: F) -> Self {
        Self { stream, f }
    }
}

impl<D, U, F> DirectStream for Map<D, F>
where
    D: DirectStream,
    F: FnMut(D::Item) -> U,
{
    type Item = U;

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Result<Step<U>>> {
        let step = futures::ready!(self.stream.poll_step(cx))?;
        Poll::Ready(Ok(match step {
            Step::Yield(x) => Step::Yield((self.f)(x)),
            Step::Skip => Step::Skip,
            Step::Stop => Step::Stop,
        }))
    }
}

/// Effectful map; the pending future counts as a `Skip`-free suspension, so
/// element order is preserved and at most one mapping runs at a time.
pub struct MapAsync<D, F, U> {
    stream: D,
    f: F,
    pending: Option<BoxFuture<'static, Result<U>>>,
}

impl<D, F, U> MapAsync<D, F, U> {
    pub(crate) fn new(stream: D, f: F) -> Self {
        Self {
            stream,
            f,
            pending: None,
        }
    }
}

impl<D, F, U, Fut> DirectStream for MapAsync<D, F, U>
where
    D: DirectStream,
    F: FnMut(D::Item) -> Fut,
    Fut: Future<Output = Result<U>> + Send + 'static,
{
    type Item = U;

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Result<Step<U>>> {
        if self.pending.is_none() {
            match futures::ready!(self.stream.poll_step(cx))? {
                Step::Yield(x) => self.pending = Some((self.f)(x).boxed()),
                Step::Skip => return Poll::Ready(Ok(Step::Skip)),
                Step::Stop => return Poll::Ready(Ok(Step::Stop)),
            }
        }
        let fut = self.pending.as_mut().expect("just stored");
        let mapped = futures::ready!(fut.poll_unpin(cx));
        self.pending = None;
        Poll::Ready(mapped.map(Step::Yield))
    }
}

#[cfg(test)]
mod tests {
    use crate::direct::{from_iter, DirectStreamExt};
    use crate::error::StreamError;

    #[tokio::test]
    async fn maps_in_order() {
        let v = from_iter(1..=4).map(|x| x * 10).to_vec().await.unwrap();
        assert_eq!(v, vec![10, 20, 30, 40]);
    }

    #[tokio::test]
    async fn async_map_awaits_each_element() {
        let v = from_iter(1..=3u64)
            .map_async(|x| async move {
                tokio::task::yield_now().await;
                Ok(x + 100)
            })
            .to_vec()
            .await
            .unwrap();
        assert_eq!(v, vec![101, 102, 103]);
    }

    #[tokio::test]
    async fn async_map_propagates_errors() {
        let res = from_iter(1..=3u64)
            .map_async(|x| async move {
                if x == 2 {
                    Err(StreamError::user(anyhow::anyhow!("boom")))
                } else {
                    Ok(x)
                }
            })
            .to_vec()
            .await;
        assert!(matches!(res, Err(StreamError::User(_))));
    }
}
