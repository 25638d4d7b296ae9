use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{runtime::Handle, sync::oneshot};

use crate::{StoreError, StoreResult};

/// Handle to the single result of a store operation.
///
/// The work runs on its own task as soon as the operation is issued; awaiting
/// the handle only collects the outcome. Dropping the handle does not cancel
/// the work.
pub struct StoreChannel<T> {
    operation: &'static str,
    receiver: oneshot::Receiver<StoreResult<T>>,
}

impl<T: Send + 'static> StoreChannel<T> {
    /// Runs `work` on the given runtime, or on the ambient one when `runtime`
    /// is `None`. Without either, the handle resolves to an error at once.
    pub fn spawn<F>(runtime: Option<&Handle>, operation: &'static str, work: F) -> Self
    where
        F: Future<Output = StoreResult<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let runtime = match runtime.cloned().or_else(|| Handle::try_current().ok()) {
            Some(runtime) => runtime,
            None => {
                let _ = sender.send(Err(StoreError::Persistence {
                    operation,
                    correlation: String::new(),
                    detail: "no tokio runtime available to run the operation".to_string(),
                }));
                return Self {
                    operation,
                    receiver,
                };
            }
        };
        runtime.spawn(async move {
            let result = work.await;
            // The caller may have stopped listening, the write still happened.
            let _ = sender.send(result);
        });
        Self {
            operation,
            receiver,
        }
    }

    /// Blocks the current thread until the result arrives. Must not be called
    /// from inside an async context.
    pub fn blocking_recv(self) -> StoreResult<T> {
        let operation = self.operation;
        self.receiver
            .blocking_recv()
            .unwrap_or_else(|_| Err(closed_error(operation)))
    }
}

impl<T> StoreChannel<T> {
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

fn closed_error(operation: &'static str) -> StoreError {
    StoreError::Persistence {
        operation,
        correlation: String::new(),
        detail: "result channel closed before a result was sent".to_string(),
    }
}

impl<T> Future for StoreChannel<T> {
    type Output = StoreResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let operation = self.operation;
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(closed_error(operation))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivers_single_result() {
        let channel = StoreChannel::spawn(None, "test", async { Ok(5) });
        assert_eq!(channel.operation(), "test");
        assert_eq!(channel.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_panicking_work_resolves_to_error() {
        let channel: StoreChannel<u32> =
            StoreChannel::spawn(None, "test", async { panic!("work failed") });
        let err = channel.await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Persistence {
                operation: "test",
                ..
            }
        ));
    }

    #[test]
    fn test_blocking_recv_outside_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let channel = runtime.block_on(async {
            StoreChannel::spawn(None, "test", async {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                Ok("done")
            })
        });
        assert_eq!(channel.blocking_recv().unwrap(), "done");
    }

    #[test]
    fn test_spawn_on_explicit_runtime_from_plain_thread() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let handle = runtime.handle().clone();
        let result = std::thread::spawn(move || {
            StoreChannel::spawn(Some(&handle), "test", async { Ok(3) }).blocking_recv()
        })
        .join()
        .unwrap();
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_spawn_without_runtime_resolves_to_error() {
        let channel: StoreChannel<u32> = StoreChannel::spawn(None, "test", async { Ok(1) });
        let err = channel.blocking_recv().unwrap_err();
        assert!(matches!(
            err,
            StoreError::Persistence {
                operation: "test",
                ..
            }
        ));
    }
}
