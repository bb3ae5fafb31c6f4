#![allow(unused)]

pub mod server;

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use sockconnect::{
    dns::{Addrs, Name, Resolve, Resolving},
    BoxError, Callback, Socket,
};
use tokio::sync::oneshot;

/// Records the outcomes a connect callback receives.
pub struct Outcomes {
    calls: Arc<AtomicUsize>,
    rx: Option<oneshot::Receiver<sockconnect::Result<Socket>>>,
}

impl Outcomes {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn first(&mut self) -> sockconnect::Result<Socket> {
        let rx = self.rx.take().expect("first outcome already taken");
        tokio::time::timeout(Duration::from_secs(10), rx)
            .await
            .expect("callback was never invoked")
            .expect("callback dropped without an outcome")
    }
}

pub fn recorder() -> (Callback, Outcomes) {
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel();
    let seen = calls.clone();
    let callback: Callback = Box::new(move |outcome| {
        seen.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send(outcome);
    });
    (
        callback,
        Outcomes {
            calls,
            rx: Some(rx),
        },
    )
}

/// A resolver that never answers.
pub struct Stalled;

impl Resolve for Stalled {
    fn resolve(&self, _name: Name) -> Resolving {
        Box::pin(std::future::pending::<Result<Addrs, BoxError>>())
    }
}

/// A resolver that fails every lookup.
pub struct Unresolvable;

impl Resolve for Unresolvable {
    fn resolve(&self, name: Name) -> Resolving {
        let err = std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("failed to lookup address information: {name}"),
        );
        let res: Result<Addrs, BoxError> = Err(err.into());
        Box::pin(std::future::ready(res))
    }
}

/// A resolver that answers with `addr` after `delay`.
pub struct Delayed {
    pub delay: Duration,
    pub addr: SocketAddr,
}

impl Resolve for Delayed {
    fn resolve(&self, _name: Name) -> Resolving {
        let delay = self.delay;
        let addr = self.addr;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok::<_, BoxError>(Box::new(vec![addr].into_iter()) as Addrs)
        })
    }
}
