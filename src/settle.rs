//! Single-fire completion of a connect attempt.
//!
//! Three sources race to finish an attempt: the handshake completing, the
//! handshake failing, and the connect timer. Whichever reaches [`Settle`]
//! first decides the outcome; the rest are discarded.

use std::{
    fmt,
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use pin_project_lite::pin_project;
use tokio::sync::oneshot;

use crate::{
    error::{Error, Result},
    socket::Socket,
    sync::Mutex,
};

/// Completion callback of a connect attempt.
///
/// Receives the connected [`Socket`] or the reason the attempt failed, and
/// runs exactly once per attempt.
pub type Callback = Box<dyn FnOnce(Result<Socket>) + Send + 'static>;

pub(crate) struct Settle {
    target: Box<str>,
    state: Mutex<Pending>,
}

struct Pending {
    settled: bool,
    callback: Option<Callback>,
}

impl Settle {
    pub(crate) fn new(target: &str, callback: Option<Callback>) -> Settle {
        Settle {
            target: target.into(),
            state: Mutex::new(Pending {
                settled: false,
                callback,
            }),
        }
    }

    /// Settles the attempt with `outcome`.
    ///
    /// Returns false, dropping `outcome`, if an earlier call already settled
    /// it. The callback runs on the calling thread, outside the lock.
    pub(crate) fn fire(&self, outcome: Result<Socket>) -> bool {
        let callback = {
            let mut state = self.state.lock();
            if state.settled {
                trace!(
                    "connect to {} already settled, discarding {}",
                    self.target,
                    describe(&outcome)
                );
                return false;
            }
            state.settled = true;
            state.callback.take()
        };

        trace!("connect to {} settled: {}", self.target, describe(&outcome));

        if let Some(callback) = callback {
            callback(outcome);
        }
        true
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.state.lock().settled
    }
}

impl Drop for Settle {
    fn drop(&mut self) {
        if !self.is_settled() {
            self.fire(Err(abandoned()));
        }
    }
}

fn describe(outcome: &Result<Socket>) -> String {
    match outcome {
        Ok(_) => "connected".to_owned(),
        Err(e) => format!("error: {e}"),
    }
}

fn abandoned() -> Error {
    Error::transport(io::Error::new(
        io::ErrorKind::Interrupted,
        "connect attempt abandoned",
    ))
}

pin_project! {
    /// A future resolving to the single outcome of a connect attempt.
    ///
    /// Returned by [`Connector::connecting`](crate::Connector::connecting).
    /// The attempt runs on its own task whether or not this future is
    /// polled; dropping it only discards the outcome.
    #[must_use = "futures do nothing unless polled"]
    pub struct Connecting {
        #[pin]
        rx: oneshot::Receiver<Result<Socket>>,
    }
}

impl Connecting {
    pub(crate) fn channel() -> (Callback, Connecting) {
        let (tx, rx) = oneshot::channel();
        let callback: Callback = Box::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        (callback, Connecting { rx })
    }
}

impl Future for Connecting {
    type Output = Result<Socket>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project()
            .rx
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(abandoned())))
    }
}

impl fmt::Debug for Connecting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connecting").finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use super::*;

    fn counting() -> (Arc<AtomicUsize>, Arc<Mutex<Option<bool>>>, Callback) {
        let calls = Arc::new(AtomicUsize::new(0));
        let first = Arc::new(Mutex::new(None));
        let callback: Callback = {
            let calls = calls.clone();
            let first = first.clone();
            Box::new(move |outcome: Result<Socket>| {
                calls.fetch_add(1, Ordering::SeqCst);
                *first.lock() = Some(outcome.is_ok());
            })
        };
        (calls, first, callback)
    }

    fn timeout_err() -> Error {
        Error::timed_out(Duration::from_millis(10), "localhost:1".to_owned())
    }

    #[test]
    fn first_trigger_wins() {
        let (calls, first, callback) = counting();
        let settle = Settle::new("localhost:1", Some(callback));

        assert!(settle.fire(Ok(Socket::new("localhost:1".to_owned()))));
        assert!(!settle.fire(Err(timeout_err())));
        assert!(!settle.fire(Err(Error::transport(io::Error::from(
            io::ErrorKind::ConnectionRefused
        )))));

        assert!(settle.is_settled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*first.lock(), Some(true));
    }

    #[test]
    fn error_before_success() {
        let (calls, first, callback) = counting();
        let settle = Settle::new("localhost:1", Some(callback));

        assert!(settle.fire(Err(timeout_err())));
        assert!(!settle.fire(Ok(Socket::new("localhost:1".to_owned()))));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*first.lock(), Some(false));
    }

    #[test]
    fn racing_threads_fire_once() {
        let (calls, _first, callback) = counting();
        let settle = Arc::new(Settle::new("localhost:1", Some(callback)));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let settle = settle.clone();
                thread::spawn(move || {
                    if i % 2 == 0 {
                        settle.fire(Ok(Socket::new("localhost:1".to_owned())))
                    } else {
                        settle.fire(Err(timeout_err()))
                    }
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_callback() {
        let settle = Settle::new("localhost:1", None);
        assert!(settle.fire(Err(timeout_err())));
        assert!(!settle.fire(Err(timeout_err())));
    }

    #[test]
    fn drop_unsettled_reports_abandoned() {
        let (calls, first, callback) = counting();
        drop(Settle::new("localhost:1", Some(callback)));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*first.lock(), Some(false));
    }

    #[test]
    fn drop_settled_is_silent() {
        let (calls, _first, callback) = counting();
        let settle = Settle::new("localhost:1", Some(callback));
        settle.fire(Err(timeout_err()));
        drop(settle);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connecting_resolves_once() {
        let (callback, connecting) = Connecting::channel();
        let settle = Settle::new("localhost:1", Some(callback));
        settle.fire(Err(timeout_err()));
        settle.fire(Ok(Socket::new("localhost:1".to_owned())));

        let err = connecting.await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn connecting_abandoned() {
        let (callback, connecting) = Connecting::channel();
        drop(callback);

        let err = connecting.await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(err.to_string(), "connect attempt abandoned");
    }
}
