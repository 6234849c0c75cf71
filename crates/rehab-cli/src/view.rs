//! View-scoped fetches.

use std::{
  future::Future,
  pin::Pin,
  task::{Context, Poll},
};

use tokio::task::JoinHandle;

/// A fetch owned by a view. Dropping the task aborts the fetch, so a result
/// can never land after its view is gone.
pub struct ViewTask<T> {
  handle: JoinHandle<T>,
}

impl<T: Send + 'static> ViewTask<T> {
  pub fn spawn<F>(fetch: F) -> Self
  where
    F: Future<Output = T> + Send + 'static,
  {
    Self { handle: tokio::spawn(fetch) }
  }
}

impl<T> ViewTask<T> {
  pub fn is_finished(&self) -> bool { self.handle.is_finished() }
}

/// Resolves to `None` if the fetch panicked or was aborted.
impl<T> Future for ViewTask<T> {
  type Output = Option<T>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    Pin::new(&mut self.handle).poll(cx).map(Result::ok)
  }
}

impl<T> Drop for ViewTask<T> {
  fn drop(&mut self) { self.handle.abort(); }
}
