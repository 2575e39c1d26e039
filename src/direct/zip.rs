use super::{DirectStream, Step};
use crate::error::Result;
use std::task::{Context, Poll};

/// Lockstep pairing of two streams; stops with the shorter side.
pub struct ZipWith<A, B, F>
where
    A: DirectStream,
{
    a: A,
    b: B,
    f: F,
    // element from `a` waiting for its partner
    left: Option<A::Item>,
}

impl<A: DirectStream, B, F> ZipWith<A, B, F> {
    pub(crate) fn new(a: A, b: B, f: F) -> Self {
        Self {
            a,
            b,
            f,
            left: None,
        }
    }
}

impl<A, B, U, F> DirectStream for ZipWith<A, B, F>
where
    A: DirectStream,
    B: DirectStream,
    F: FnMut(A::Item, B::Item) -> U,
{
    type Item = U;

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Result<Step<U>>> {
        if self.left.is_none() {
            match futures::ready!(self.a.poll_step(cx))? {
                Step::Yield(x) => self.left = Some(x),
                Step::Skip => return Poll::Ready(Ok(Step::Skip)),
                Step::Stop => return Poll::Ready(Ok(Step::Stop)),
            }
        }
        match futures::ready!(self.b.poll_step(cx))? {
            Step::Yield(y) => {
                let x = self.left.take().expect("left element present");
                Poll::Ready(Ok(Step::Yield((self.f)(x, y))))
            }
            Step::Skip => Poll::Ready(Ok(Step::Skip)),
            Step::Stop => Poll::Ready(Ok(Step::Stop)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::direct::{from_iter, DirectStreamExt};

    #[tokio::test]
    async fn zip_ends_at_shorter_side() {
        let v = from_iter(vec![1, 2, 3])
            .zip_with(from_iter(vec![10, 20]), |a, b| a + b)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(v, vec![11, 22]);
    }

    #[tokio::test]
    async fn zip_skips_filtered_elements() {
        let v = from_iter(0..10)
            .filter(|x| x % 2 == 0)
            .zip_with(from_iter(0..3), |a, b| (a, b))
            .to_vec()
            .await
            .unwrap();
        assert_eq!(v, vec![(0, 0), (2, 1), (4, 2)]);
    }
}
