#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(test, deny(warnings))]

//! # sockconnect
//!
//! The `sockconnect` crate opens one outbound TCP connection with a bounded
//! timeout and reports the outcome exactly once. It is meant for proxy
//! backends, where the cost of setting up an upstream connection sits on the
//! request path.
//!
//! - A [`Socket`] handle is returned synchronously from every call
//! - The outcome is delivered once, through a callback or a [`Connecting`]
//!   future, whichever of handshake success, handshake error and timeout
//!   happens first
//! - A timed out attempt destroys its socket
//! - Invalid ports are reported through the same channel, never by panicking
//!
//! ## Connecting with a callback
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let socket = sockconnect::connect_timeout(
//!     "9999",
//!     Some("10.255.255.1"),
//!     Some(Box::new(|outcome: sockconnect::Result<sockconnect::Socket>| {
//!         if let Err(err) = outcome {
//!             // ETIMEDOUT (200ms) - 10.255.255.1:9999
//!             eprintln!("{err}");
//!         }
//!     })),
//!     Duration::from_millis(200),
//! );
//! # let _ = socket;
//! # }
//! ```
//!
//! **NOTE**: the returned handle exists even when the attempt fails. Check
//! the outcome, not the handle.
//!
//! ## Awaiting the outcome
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), sockconnect::Error> {
//! let connector = sockconnect::Connector::new();
//! let (_socket, connecting) = connector.connecting(80, Some("example.com"));
//! let socket = connecting.await?;
//! let upstream = socket.take_stream();
//! # let _ = upstream;
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Failures display with a short code first:
//!
//! - `EPARAM - Invalid port number provided - host:port`
//! - `ETIMEDOUT (<ms>ms) - host:port`
//! - anything else is the network error, unchanged; [`Error::code`] maps it
//!   to an errno-style name such as `ECONNREFUSED`.

#[macro_use]
extern crate log;

mod connect;
pub mod dns;
mod error;
mod port;
mod request;
mod settle;
mod socket;
mod sync;

pub use self::connect::{
    connect, connect_timeout, Connector, ConnectorBuilder, DEFAULT_HOST, DEFAULT_TIMEOUT,
};
pub use self::error::{BoxError, Error, Result};
pub use self::port::RemotePort;
pub use self::request::ConnectRequest;
pub use self::settle::{Callback, Connecting};
pub use self::socket::Socket;

fn _assert_impls() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    fn assert_clone<T: Clone>() {}

    assert_send::<Connector>();
    assert_sync::<Connector>();
    assert_clone::<Connector>();

    assert_send::<Socket>();
    assert_sync::<Socket>();
    assert_clone::<Socket>();

    assert_send::<Connecting>();

    assert_send::<Error>();
    assert_sync::<Error>();
}
