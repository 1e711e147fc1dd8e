//! Cooperative cancellation for build runs.
//!
//! A [`CancelToken`] is shared by the engine, every in-flight resolution and
//! the deadline timer. Cancelling is idempotent and wakes every waiter.
//! Blocking code (git transfers) polls the underlying flag directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  flag: Arc<AtomicBool>,
  notify: Arc<Notify>,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  /// Request cancellation. Safe to call more than once.
  pub fn cancel(&self) {
    if !self.flag.swap(true, Ordering::SeqCst) {
      self.notify.notify_waiters();
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self.flag.load(Ordering::SeqCst)
  }

  /// Wait until cancellation is requested.
  pub async fn cancelled(&self) {
    loop {
      let notified = self.notify.notified();
      tokio::pin!(notified);
      // Register before checking the flag so a concurrent cancel is not missed.
      notified.as_mut().enable();
      if self.is_cancelled() {
        return;
      }
      notified.await;
    }
  }

  /// The raw interrupt flag, for blocking code that polls.
  pub fn flag(&self) -> &AtomicBool {
    &self.flag
  }

  /// Cancel this token once `deadline` elapses.
  ///
  /// The returned handle should be aborted when the run finishes first.
  pub fn cancel_after(&self, deadline: Duration) -> JoinHandle<()> {
    let token = self.clone();
    tokio::spawn(async move {
      tokio::time::sleep(deadline).await;
      if !token.is_cancelled() {
        warn!(deadline = ?deadline, "build deadline reached, cancelling");
        token.cancel();
      }
    })
  }
}
