//! Deadline-raced read.
//!
//! The read runs on its own task while the caller waits for whichever comes
//! first: the read finishing or the deadline. When the deadline wins the read
//! task is aborted and its result discarded; the caller drops the connection
//! on its normal cleanup path.

use std::future::Future;

use tokio::time::Instant;
use tracing::trace;

/// Run `read` on a background task, returning its output if it finishes
/// before `deadline`. Returns `None` on deadline or if the task panicked.
pub async fn race<F>(read: F, deadline: Instant) -> Option<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut task = tokio::spawn(read);
    tokio::select! {
        joined = &mut task => joined.ok(),
        _ = tokio::time::sleep_until(deadline) => {
            trace!("deadline elapsed before read completed");
            task.abort();
            None
        }
    }
}
