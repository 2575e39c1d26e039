//! Style adapters: retype a stream expression under one of the four merge
//! disciplines so that its `append` and `bind` resolve accordingly.
//!
//! Each adapter is a zero-cost newtype over [`KStream`]; `into_inner` gets
//! the plain stream back at any point, so pipelines can switch disciplines
//! mid-expression.

use crate::kstream::KStream;
use crate::merge;

macro_rules! style_adapter {
    ($(#[$doc:meta])* $name:ident, $join:path) => {
        $(#[$doc])*
        pub struct $name<T: Send + 'static>(KStream<T>);

        impl<T: Send + 'static> $name<T> {
            pub fn new(stream: KStream<T>) -> Self {
                Self(stream)
            }

            pub fn from_iter<I>(it: I) -> Self
            where
                I: IntoIterator<Item = T>,
                I::IntoIter: Send + 'static,
            {
                Self(KStream::from_iter(it))
            }

            pub fn into_inner(self) -> KStream<T> {
                self.0
            }

            /// The discipline's semigroup operation.
            pub fn append(self, other: Self) -> Self {
                Self($join(self.0, other.0))
            }

            /// Nested-loop bind; sibling substreams combine per the
            /// discipline.
            pub fn bind<U, F>(self, f: F) -> $name<U>
            where
                U: Send + 'static,
                F: Fn(T) -> KStream<U> + Clone + Send + 'static,
            {
                $name(self.0.bind(f, $join))
            }

            /// Expand each element into a substream, joined per the
            /// discipline.
            pub fn concat_map<U, F>(self, f: F) -> $name<U>
            where
                U: Send + 'static,
                F: Fn(T) -> KStream<U> + Clone + Send + 'static,
            {
                self.bind(f)
            }

            pub async fn to_vec(self) -> crate::error::Result<Vec<T>> {
                self.0.to_vec().await
            }
        }
    };
}

style_adapter!(
    /// Depth-first merging: exhaust each substream before the next starts.
    /// Deterministic, and fine with infinite streams.
    Serial,
    serial_join
);
style_adapter!(
    /// Round-robin merging across finitely many substreams.
    Interleave,
    merge::interleave
);
style_adapter!(
    /// Demand-driven parallel merging (`Parallel_LIFO`): prefers the left
    /// branch, grows workers only when the consumer outpaces them. Fine
    /// with infinite streams.
    Demand,
    merge::coparallel
);
style_adapter!(
    /// Fair parallel merging (`Parallel_FIFO`): all substreams run from the
    /// start, so the fan-in must be finite.
    Fair,
    merge::parallel
);

fn serial_join<T: Send + 'static>(a: KStream<T>, b: KStream<T>) -> KStream<T> {
    a.append(b)
}
