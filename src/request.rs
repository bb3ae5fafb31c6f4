use std::time::Duration;

use crate::port::RemotePort;

/// One outbound connection request.
///
/// Fields left unset fall back to the [`Connector`](crate::Connector)
/// configuration: the default host (`localhost`) and the connect timeout
/// (5 seconds).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sockconnect::ConnectRequest;
///
/// let req = ConnectRequest::new("8080")
///     .host("backend.internal")
///     .timeout(Duration::from_millis(250));
/// assert_eq!(req.port().validate(), Some(8080));
/// ```
#[derive(Clone, Debug)]
pub struct ConnectRequest {
    port: RemotePort,
    host: Option<Box<str>>,
    timeout: Option<Duration>,
}

impl ConnectRequest {
    /// Creates a request for `port` on the default host.
    pub fn new<P: Into<RemotePort>>(port: P) -> ConnectRequest {
        ConnectRequest {
            port: port.into(),
            host: None,
            timeout: None,
        }
    }

    /// Sets the remote host, a name or an IP literal.
    pub fn host<H: Into<String>>(mut self, host: H) -> ConnectRequest {
        self.host = Some(host.into().into_boxed_str());
        self
    }

    /// Sets the remote host if `host` is `Some`.
    pub fn host_opt(mut self, host: Option<&str>) -> ConnectRequest {
        self.host = host.map(Into::into);
        self
    }

    /// Overrides the connect timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> ConnectRequest {
        self.timeout = Some(timeout);
        self
    }

    /// The remote port, as supplied.
    pub fn port(&self) -> &RemotePort {
        &self.port
    }

    /// The remote host, if one was set.
    pub fn remote_host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The per-request timeout, if one was set.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
