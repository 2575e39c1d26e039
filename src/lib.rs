//! Composable, concurrent data-flow pipelines.
//!
//! Pipelines are described declaratively and run lazily. Three layers stack
//! bottom up:
//!
//! - [`direct`]: fusion-friendly state-machine streams for tight inner
//!   loops (`map`, `filter`, `take`, `zip_with`, folds);
//! - [`kstream`]: continuation-form streams with first-class tails, used
//!   for outer composition (`append`, `bind`, merge operators);
//! - [`svar`]: the stream variable, a bounded buffer plus worker
//!   scheduler that executes parallel merges with backpressure-driven
//!   dispatch and deterministic shutdown.
//!
//! The four merge disciplines of [`merge`] (serial, interleave,
//! demand-driven parallel, fair parallel) all return ordinary
//! [`KStream`](kstream::KStream)s, so concurrency is an implementation
//! detail of the expression, not of its type. The [`style`] adapters
//! retype a generic pipeline so its `bind`/`append` follow a chosen
//! discipline.
//!
//! ```no_run
//! use streamvar::prelude::*;
//!
//! # async fn demo() -> streamvar::error::Result<()> {
//! let fast = KStream::from_iter(0..100);
//! let slow = KStream::from_iter(100..200);
//! // both producers run concurrently, the consumer sees every element
//! let merged = parallel(fast, slow).to_vec().await?;
//! assert_eq!(merged.len(), 200);
//! # Ok(())
//! # }
//! ```

pub mod direct;
pub mod error;
pub mod kstream;
pub mod merge;
pub mod style;
pub mod svar;
pub mod unfold;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use crate::direct::DirectStreamExt;
    pub use crate::error::{Result, StreamError};
    pub use crate::kstream::{KStep, KStream};
    pub use crate::merge::{
        coparallel, coparallel_all, interleave, interleave_all, mk_async, parallel, parallel_all,
        serial, zip_with, zip_with_parallel,
    };
    pub use crate::svar::{SVar, Style};
}
