use std::{
    fmt, io,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpStream,
};

use crate::sync::Mutex;

/// Handle to one outbound connection attempt.
///
/// A `Socket` is handed back by every `connect` call before any network I/O
/// has completed, including calls whose port failed validation. The handle
/// alone says nothing about the outcome: inspect the result delivered to the
/// completion callback (or the [`Connecting`](crate::Connecting) future).
///
/// Clones share the same underlying stream. Once connected, the socket can
/// be used directly through [`AsyncRead`]/[`AsyncWrite`], or the stream can
/// be moved out with [`Socket::take_stream`] for splicing.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<Inner>,
}

struct Inner {
    target: Box<str>,
    state: Mutex<State>,
}

enum State {
    /// No attempt was started.
    Idle,
    Connecting,
    Connected(TcpStream),
    /// The stream was moved out by `take_stream`.
    Detached,
    Destroyed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Connecting => "connecting",
            State::Connected(_) => "connected",
            State::Detached => "detached",
            State::Destroyed => "destroyed",
        }
    }
}

impl Socket {
    pub(crate) fn new(target: String) -> Socket {
        Socket {
            inner: Arc::new(Inner {
                target: target.into_boxed_str(),
                state: Mutex::new(State::Idle),
            }),
        }
    }

    /// Marks the start of an attempt. Returns false if the socket was
    /// destroyed before the attempt could begin.
    pub(crate) fn begin(&self) -> bool {
        let mut state = self.inner.state.lock();
        if !matches!(*state, State::Idle) {
            return false;
        }
        *state = State::Connecting;
        true
    }

    /// Installs the connected stream, handing it back if the socket is no
    /// longer waiting for one.
    pub(crate) fn attach(&self, stream: TcpStream) -> Result<(), TcpStream> {
        let mut state = self.inner.state.lock();
        if !matches!(*state, State::Connecting) {
            return Err(stream);
        }
        *state = State::Connected(stream);
        Ok(())
    }

    /// The `host:port` this socket was asked to connect to.
    pub fn target(&self) -> &str {
        &self.inner.target
    }

    /// Closes the socket and releases the underlying stream.
    ///
    /// Any later I/O on this socket or its clones fails with
    /// [`io::ErrorKind::BrokenPipe`]. Destroying a socket that is still
    /// connecting abandons the attempt: a handshake that completes afterwards
    /// is closed right away and reported as `ECONNABORTED`.
    pub fn destroy(&self) {
        let prev = std::mem::replace(&mut *self.inner.state.lock(), State::Destroyed);
        if !matches!(prev, State::Destroyed) {
            debug!("destroying socket to {} ({})", self.inner.target, prev.name());
        }
        drop(prev);
    }

    /// Returns true once [`Socket::destroy`] has run, either from the caller
    /// or from the connector after a failed or timed out attempt.
    pub fn is_destroyed(&self) -> bool {
        matches!(*self.inner.state.lock(), State::Destroyed)
    }

    /// Returns true while the socket holds a connected stream.
    pub fn is_connected(&self) -> bool {
        matches!(*self.inner.state.lock(), State::Connected(_))
    }

    /// Remote address of the connected stream.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.with_stream(|stream| stream.peer_addr())
    }

    /// Local address of the connected stream.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.with_stream(|stream| stream.local_addr())
    }

    /// Moves the connected stream out of the handle.
    ///
    /// Returns `None` unless the socket is connected. Afterwards every clone
    /// of this handle reports [`io::ErrorKind::NotConnected`] on I/O.
    pub fn take_stream(&self) -> Option<TcpStream> {
        let mut state = self.inner.state.lock();
        match std::mem::replace(&mut *state, State::Detached) {
            State::Connected(stream) => Some(stream),
            other => {
                *state = other;
                None
            }
        }
    }

    fn with_stream<T>(&self, f: impl FnOnce(&mut TcpStream) -> io::Result<T>) -> io::Result<T> {
        let mut state = self.inner.state.lock();
        match &mut *state {
            State::Connected(stream) => f(stream),
            other => Err(unusable(other)),
        }
    }
}

fn unusable(state: &State) -> io::Error {
    match state {
        State::Destroyed => io::Error::new(io::ErrorKind::BrokenPipe, "socket destroyed"),
        other => io::Error::new(
            io::ErrorKind::NotConnected,
            format!("socket is {}", other.name()),
        ),
    }
}

fn poll_stream<T>(
    socket: &Socket,
    f: impl FnOnce(Pin<&mut TcpStream>) -> Poll<io::Result<T>>,
) -> Poll<io::Result<T>> {
    let mut state = socket.inner.state.lock();
    match &mut *state {
        State::Connected(stream) => f(Pin::new(stream)),
        other => Poll::Ready(Err(unusable(other))),
    }
}

impl AsyncRead for Socket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        poll_stream(&*self, |stream| stream.poll_read(cx, buf))
    }
}

impl AsyncWrite for Socket {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        poll_stream(&*self, |stream| stream.poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        poll_stream(&*self, |stream| stream.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        poll_stream(&*self, |stream| stream.poll_shutdown(cx))
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("target", &self.inner.target)
            .field("state", &self.inner.state.lock().name())
            .finish()
    }
}
