use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

enum Command<T> {
    Call(T),
    Flush,
}

/// Coalescing single-timer writer.
///
/// Each `call` replaces the pending value and restarts the quiescence
/// window; the callback runs once with the latest value after `window`
/// passes with no new call. Dropping or cancelling the debouncer discards
/// whatever is pending.
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F, Fut>(window: Duration, mut callback: F) -> Self
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command<T>>();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            loop {
                let mut pending = tokio::select! {
                    _ = token.cancelled() => return,
                    cmd = rx.recv() => match cmd {
                        Some(Command::Call(value)) => value,
                        Some(Command::Flush) => continue,
                        None => return,
                    },
                };

                let timer = sleep(window);
                tokio::pin!(timer);
                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        cmd = rx.recv() => match cmd {
                            Some(Command::Call(value)) => {
                                pending = value;
                                timer.as_mut().reset(Instant::now() + window);
                            }
                            Some(Command::Flush) => break,
                            None => return,
                        },
                        _ = &mut timer => break,
                    }
                }

                if token.is_cancelled() {
                    return;
                }
                callback(pending).await;
            }
        });

        Self { tx, cancel }
    }

    /// Queue `value`, replacing anything pending, and restart the window.
    pub fn call(&self, value: T) {
        let _ = self.tx.send(Command::Call(value));
    }

    /// Run the callback for the pending value now instead of waiting.
    pub fn flush(&self) {
        let _ = self.tx.send(Command::Flush);
    }

    /// Discard the pending value; no callback runs after this returns.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
