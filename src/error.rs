use std::{error::Error as StdError, fmt, io, time::Duration};

/// A `Result` alias where the `Err` case is `sockconnect::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// A boxed error type that can be used for dynamic error handling.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The Errors that may occur while opening an outbound connection.
///
/// Every failure of a connect attempt is delivered through the completion
/// callback as one of these. The `Display` output starts with a short code
/// (`EPARAM`, `ETIMEDOUT`) for errors raised by the connector itself, while
/// transport errors display the underlying error unchanged.
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
    target: Option<Box<str>>,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
                target: None,
            }),
        }
    }

    pub(crate) fn param(target: String) -> Error {
        Error::new(Kind::Param, None::<Error>).with_target(target)
    }

    pub(crate) fn timed_out(after: Duration, target: String) -> Error {
        Error::new(Kind::TimedOut(after), Some(TimedOut)).with_target(target)
    }

    pub(crate) fn resolve<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Resolve, Some(e))
    }

    pub(crate) fn transport<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Transport, Some(e))
    }

    pub(crate) fn with_target(mut self, target: String) -> Error {
        self.inner.target = Some(target.into_boxed_str());
        self
    }
}

impl Error {
    /// Returns the `host:port` the failed attempt was aimed at, if known.
    pub fn target(&self) -> Option<&str> {
        self.inner.target.as_deref()
    }

    /// Returns true if the remote port failed validation.
    ///
    /// No network activity takes place for these errors.
    pub fn is_param(&self) -> bool {
        matches!(self.inner.kind, Kind::Param)
    }

    /// Returns true if the attempt was abandoned because the connect timeout
    /// elapsed first.
    pub fn is_timeout(&self) -> bool {
        matches!(self.inner.kind, Kind::TimedOut(_))
    }

    /// Returns true if the error came from the network stack, including
    /// host resolution.
    pub fn is_transport(&self) -> bool {
        matches!(self.inner.kind, Kind::Transport | Kind::Resolve)
    }

    /// Returns true if the remote host could not be resolved.
    pub fn is_resolve(&self) -> bool {
        matches!(self.inner.kind, Kind::Resolve)
    }

    /// Returns the connect timeout that elapsed, for timeout errors.
    pub fn elapsed(&self) -> Option<Duration> {
        match self.inner.kind {
            Kind::TimedOut(after) => Some(after),
            _ => None,
        }
    }

    /// Returns a short, errno-style code for this error.
    ///
    /// `EPARAM` and `ETIMEDOUT` are produced by the connector itself.
    /// Transport errors are mapped from the innermost [`io::Error`] found in
    /// the source chain; `None` is returned when no mapping is known.
    pub fn code(&self) -> Option<&'static str> {
        match self.inner.kind {
            Kind::Param => Some("EPARAM"),
            Kind::TimedOut(_) => Some("ETIMEDOUT"),
            Kind::Resolve => Some("ENOTFOUND"),
            Kind::Transport => self.io_kind().and_then(io_code),
        }
    }

    fn io_kind(&self) -> Option<io::ErrorKind> {
        let mut source = self.source();

        while let Some(err) = source {
            if let Some(io) = err.downcast_ref::<io::Error>() {
                return Some(io.kind());
            }
            source = err.source();
        }

        None
    }
}

fn io_code(kind: io::ErrorKind) -> Option<&'static str> {
    let code = match kind {
        io::ErrorKind::ConnectionRefused => "ECONNREFUSED",
        io::ErrorKind::ConnectionReset => "ECONNRESET",
        io::ErrorKind::ConnectionAborted => "ECONNABORTED",
        io::ErrorKind::NetworkUnreachable => "ENETUNREACH",
        io::ErrorKind::HostUnreachable => "EHOSTUNREACH",
        io::ErrorKind::AddrInUse => "EADDRINUSE",
        io::ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        io::ErrorKind::NotConnected => "ENOTCONN",
        io::ErrorKind::BrokenPipe => "EPIPE",
        io::ErrorKind::PermissionDenied => "EACCES",
        io::ErrorKind::TimedOut => "ETIMEDOUT",
        _ => return None,
    };
    Some(code)
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("sockconnect::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(ref target) = self.inner.target {
            builder.field("target", target);
        }

        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let target = self.inner.target.as_deref().unwrap_or("");
        match self.inner.kind {
            Kind::Param => write!(f, "EPARAM - Invalid port number provided - {target}"),
            Kind::TimedOut(after) => {
                write!(f, "ETIMEDOUT ({}ms) - {target}", after.as_millis())
            }
            Kind::Resolve | Kind::Transport => match self.inner.source {
                Some(ref e) => fmt::Display::fmt(e, f),
                None => f.write_str("ERROR"),
            },
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        let kind = match err.inner.kind {
            Kind::Param => io::ErrorKind::InvalidInput,
            Kind::TimedOut(_) => io::ErrorKind::TimedOut,
            Kind::Resolve | Kind::Transport => err.io_kind().unwrap_or(io::ErrorKind::Other),
        };
        io::Error::new(kind, err)
    }
}

#[derive(Debug)]
pub(crate) enum Kind {
    Param,
    TimedOut(Duration),
    Resolve,
    Transport,
}

#[derive(Debug)]
pub(crate) struct TimedOut;

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("connect timed out")
    }
}

impl StdError for TimedOut {}
