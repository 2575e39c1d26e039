//! The worker task: one producer continuation driven against its SVar.

use super::SVar;
use crate::kstream::{KStep, KStream};
use tokio::task::JoinHandle;
use tracing::trace;

pub(super) fn spawn<T: Send + 'static>(svar: SVar<T>, id: u64, stream: KStream<T>) -> JoinHandle<()> {
    tokio::spawn(run(svar, id, stream))
}

async fn run<T: Send + 'static>(svar: SVar<T>, id: u64, stream: KStream<T>) {
    let mut guard = StopGuard {
        svar: svar.clone(),
        id,
        armed: true,
    };
    let mut cur = stream;
    loop {
        // the SVar rides along as context so that nested merge nodes of the
        // same style can flatten their branches into it
        let step = cur.into_step(Some(svar.clone())).await;
        match step {
            Ok(KStep::Yield(x, tail)) => match svar.offer(id, x, tail) {
                Some(next) => cur = next,
                // parked or closed; accounting is already settled
                None => return guard.disarm(),
            },
            // a single final element is a yield with an empty tail
            Ok(KStep::Single(x)) => match svar.offer(id, x, KStream::nil()) {
                Some(next) => cur = next,
                None => return guard.disarm(),
            },
            Ok(KStep::Stop) => {
                guard.disarm();
                return svar.child_stop(id);
            }
            Err(e) => {
                guard.disarm();
                return svar.post_error(id, e);
            }
        }
    }
}

/// Posts the missing stop accounting if the task dies without reaching a
/// normal exit path (panic in user code, or abort racing the close).
struct StopGuard<T: Send + 'static> {
    svar: SVar<T>,
    id: u64,
    armed: bool,
}

impl<T: Send + 'static> StopGuard<T> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<T: Send + 'static> Drop for StopGuard<T> {
    fn drop(&mut self) {
        if self.armed {
            trace!(worker = self.id, "worker terminated abnormally");
            self.svar.child_stop(self.id);
        }
    }
}
