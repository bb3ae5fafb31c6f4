use std::{
    borrow::Cow,
    collections::HashMap,
    fmt, io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use futures_util::future::{self, Either};
use once_cell::sync::Lazy;
use socket2::{Domain, Protocol, Socket as RawSocket, TcpKeepalive, Type};
use tokio::net::{TcpSocket, TcpStream};

use crate::{
    dns::{self, DnsResolverWithOverrides, GaiResolver, IntoResolve, Resolve},
    error::{Error, Result},
    port::RemotePort,
    request::ConnectRequest,
    settle::{Callback, Connecting, Settle},
    socket::Socket,
};

/// The connect timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// The host connected to when a request names none.
pub const DEFAULT_HOST: &str = "localhost";

static DEFAULT_CONNECTOR: Lazy<Connector> = Lazy::new(Connector::new);

/// Opens a TCP connection to `host:port`, giving up after 5 seconds.
///
/// The returned [`Socket`] is a handle to the attempt, not proof of a
/// connection. `callback` runs exactly once with the connected socket or the
/// reason the attempt failed. See [`connect_timeout`] for details.
///
/// # Example
///
/// ```no_run
/// # #[tokio::main]
/// # async fn main() {
/// let _socket = sockconnect::connect(
///     80,
///     Some("example.com"),
///     Some(Box::new(|outcome: sockconnect::Result<sockconnect::Socket>| match outcome {
///         Ok(socket) => println!("connected: {:?}", socket.peer_addr()),
///         Err(err) => eprintln!("{err}"),
///     })),
/// );
/// # }
/// ```
pub fn connect<P>(port: P, host: Option<&str>, callback: Option<Callback>) -> Socket
where
    P: Into<RemotePort>,
{
    connect_timeout(port, host, callback, DEFAULT_TIMEOUT)
}

/// Opens a TCP connection to `host:port` with a bounded timeout.
///
/// - `port` may be a number or numeric text; it must name a port in
///   `1..=65535`, otherwise `callback` receives an `EPARAM` error before this
///   function returns and no connection is attempted.
/// - `host` of `None` connects to `localhost`.
/// - `callback` may be `None`; the attempt still runs and a timed out socket
///   is still destroyed.
/// - if neither the handshake nor a network error completes within
///   `timeout`, `callback` receives `ETIMEDOUT (<ms>ms) - host:port` and the
///   socket is destroyed.
/// - a resolution or network error also destroys the socket before
///   `callback` runs.
///
/// Must be called from within a Tokio runtime; otherwise `callback` receives
/// a transport error.
pub fn connect_timeout<P>(
    port: P,
    host: Option<&str>,
    callback: Option<Callback>,
    timeout: Duration,
) -> Socket
where
    P: Into<RemotePort>,
{
    let request = ConnectRequest::new(port).host_opt(host).timeout(timeout);
    DEFAULT_CONNECTOR.dispatch(request, callback)
}

/// Opens single-fire outbound TCP connections.
///
/// A `Connector` holds the configuration shared by its attempts. Cloning is
/// cheap; changing the configuration of a clone never affects the others.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), sockconnect::Error> {
/// let connector = sockconnect::Connector::builder()
///     .timeout(Duration::from_millis(500))
///     .tcp_nodelay(true)
///     .build();
///
/// let (_socket, connecting) = connector.connecting(6379, Some("10.0.0.7"));
/// let socket = connecting.await?;
/// println!("connected to {:?}", socket.peer_addr());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connector {
    config: Arc<Config>,
}

#[derive(Clone)]
struct Config {
    timeout: Duration,
    default_host: Cow<'static, str>,
    nodelay: bool,
    tcp_keepalive: Option<Duration>,
    local_ipv4: Option<Ipv4Addr>,
    local_ipv6: Option<Ipv6Addr>,
    resolver: Arc<dyn Resolve>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            timeout: DEFAULT_TIMEOUT,
            default_host: Cow::Borrowed(DEFAULT_HOST),
            nodelay: false,
            tcp_keepalive: None,
            local_ipv4: None,
            local_ipv6: None,
            resolver: Arc::new(GaiResolver::new()),
        }
    }
}

/// A `ConnectorBuilder` can be used to create a [`Connector`] with custom
/// configuration.
#[must_use]
pub struct ConnectorBuilder {
    config: Config,
    dns_overrides: HashMap<Cow<'static, str>, Vec<SocketAddr>>,
}

// ===== impl Connector =====

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector {
    /// Constructs a new `Connector` with the default configuration.
    pub fn new() -> Connector {
        Connector {
            config: Arc::new(Config::default()),
        }
    }

    /// Creates a `ConnectorBuilder` to configure a `Connector`.
    pub fn builder() -> ConnectorBuilder {
        ConnectorBuilder::new()
    }

    /// The timeout applied to requests that do not set their own.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Changes the connect timeout of this connector only.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config_mut().timeout = timeout;
    }

    /// Starts an attempt and reports its outcome to `callback`.
    ///
    /// `callback` runs exactly once: with `Ok(socket)` on a completed
    /// handshake, or with the first error among port validation, resolution,
    /// the handshake itself and the timeout. A socket whose attempt failed
    /// after validation is destroyed before `callback` runs.
    pub fn connect_with<P, F>(&self, port: P, host: Option<&str>, callback: F) -> Socket
    where
        P: Into<RemotePort>,
        F: FnOnce(Result<Socket>) + Send + 'static,
    {
        let request = ConnectRequest::new(port).host_opt(host);
        self.dispatch(request, Some(Box::new(callback)))
    }

    /// Starts an attempt without observing its outcome.
    ///
    /// The timeout still runs and destroys the socket if the handshake has
    /// not completed in time.
    pub fn connect<P>(&self, port: P, host: Option<&str>) -> Socket
    where
        P: Into<RemotePort>,
    {
        let request = ConnectRequest::new(port).host_opt(host);
        self.dispatch(request, None)
    }

    /// Starts an attempt and returns a future for its outcome.
    ///
    /// The socket is handed back immediately as with the other forms; the
    /// [`Connecting`] future resolves to the same single outcome a callback
    /// would receive.
    pub fn connecting<P>(&self, port: P, host: Option<&str>) -> (Socket, Connecting)
    where
        P: Into<RemotePort>,
    {
        let (callback, connecting) = Connecting::channel();
        let request = ConnectRequest::new(port).host_opt(host);
        (self.dispatch(request, Some(callback)), connecting)
    }

    /// Starts the attempt described by `request`.
    ///
    /// This is the general form behind every other `connect` method.
    pub fn dispatch(&self, request: ConnectRequest, callback: Option<Callback>) -> Socket {
        let host = request
            .remote_host()
            .unwrap_or(self.config.default_host.as_ref())
            .to_owned();
        let timeout = request.connect_timeout().unwrap_or(self.config.timeout);

        let Some(port) = request.port().validate() else {
            let target = format!("{host}:{}", request.port());
            debug!("refusing to connect to {target}: invalid port");
            let socket = Socket::new(target.clone());
            Settle::new(&target, callback).fire(Err(Error::param(target)));
            return socket;
        };

        let target = format!("{host}:{port}");
        let socket = Socket::new(target.clone());
        let settle = Settle::new(&target, callback);

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                socket.destroy();
                settle.fire(Err(Error::transport(io::Error::other(e)).with_target(target)));
                return socket;
            }
        };

        socket.begin();
        runtime.spawn(attempt(
            self.config.clone(),
            Remote {
                host,
                port,
                target,
                timeout,
            },
            socket.clone(),
            settle,
        ));

        socket
    }

    fn config_mut(&mut self) -> &mut Config {
        Arc::make_mut(&mut self.config)
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("timeout", &self.config.timeout)
            .field("default_host", &self.config.default_host)
            .field("nodelay", &self.config.nodelay)
            .finish()
    }
}

// ===== impl ConnectorBuilder =====

impl Default for ConnectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorBuilder {
    /// Constructs a new `ConnectorBuilder`.
    ///
    /// This is the same as `Connector::builder()`.
    pub fn new() -> ConnectorBuilder {
        ConnectorBuilder {
            config: Config::default(),
            dns_overrides: HashMap::new(),
        }
    }

    /// Returns a `Connector` that uses this `ConnectorBuilder` configuration.
    pub fn build(self) -> Connector {
        let mut config = self.config;

        if !self.dns_overrides.is_empty() {
            config.resolver = Arc::new(DnsResolverWithOverrides::new(
                config.resolver,
                self.dns_overrides,
            ));
        }

        Connector {
            config: Arc::new(config),
        }
    }

    /// Set the connect timeout.
    ///
    /// The timeout covers host resolution and the TCP handshake together,
    /// across every address the host resolves to.
    ///
    /// Default is 5 seconds.
    pub fn timeout(mut self, timeout: Duration) -> ConnectorBuilder {
        self.config.timeout = timeout;
        self
    }

    /// Set the host used by requests that do not name one.
    ///
    /// Default is `localhost`.
    pub fn default_host<H>(mut self, host: H) -> ConnectorBuilder
    where
        H: Into<Cow<'static, str>>,
    {
        self.config.default_host = host.into();
        self
    }

    /// Set whether sockets have `TCP_NODELAY` enabled.
    ///
    /// Default is `false`.
    pub fn tcp_nodelay(mut self, enabled: bool) -> ConnectorBuilder {
        self.config.nodelay = enabled;
        self
    }

    /// Set that all sockets have `SO_KEEPALIVE` set with the supplied duration.
    ///
    /// If `None`, the option will not be set.
    pub fn tcp_keepalive<D>(mut self, val: D) -> ConnectorBuilder
    where
        D: Into<Option<Duration>>,
    {
        self.config.tcp_keepalive = val.into();
        self
    }

    /// Bind to a local IP Address before connecting.
    pub fn local_address<T>(mut self, addr: T) -> ConnectorBuilder
    where
        T: Into<Option<IpAddr>>,
    {
        match addr.into() {
            Some(IpAddr::V4(addr)) => self.config.local_ipv4 = Some(addr),
            Some(IpAddr::V6(addr)) => self.config.local_ipv6 = Some(addr),
            _ => {}
        }
        self
    }

    /// Set the local IPv4 and IPv6 addresses to bind, depending on the
    /// family of the remote address.
    pub fn local_addresses<V4, V6>(mut self, ipv4: V4, ipv6: V6) -> ConnectorBuilder
    where
        V4: Into<Option<Ipv4Addr>>,
        V6: Into<Option<Ipv6Addr>>,
    {
        self.config.local_ipv4 = ipv4.into();
        self.config.local_ipv6 = ipv6.into();
        self
    }

    /// Override DNS resolution for a specific host to a particular address.
    ///
    /// The port of `addr` is ignored; the requested remote port is used.
    pub fn resolve(self, host: &str, addr: SocketAddr) -> ConnectorBuilder {
        self.resolve_to_addrs(host, &[addr])
    }

    /// Override DNS resolution for a specific host to several addresses,
    /// tried in order.
    pub fn resolve_to_addrs(mut self, host: &str, addrs: &[SocketAddr]) -> ConnectorBuilder {
        self.dns_overrides
            .insert(Cow::Owned(host.to_owned()), addrs.to_vec());
        self
    }

    /// Override the DNS resolver implementation.
    ///
    /// Overrides passed to `resolve` and `resolve_to_addrs` still apply on
    /// top of this resolver.
    pub fn dns_resolver<R: IntoResolve>(mut self, resolver: R) -> ConnectorBuilder {
        self.config.resolver = resolver.into_resolve();
        self
    }
}

impl fmt::Debug for ConnectorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorBuilder")
            .field("timeout", &self.config.timeout)
            .field("default_host", &self.config.default_host)
            .field("dns_overrides", &self.dns_overrides)
            .finish()
    }
}

// ===== attempt =====

struct Remote {
    host: String,
    port: u16,
    target: String,
    timeout: Duration,
}

async fn attempt(config: Arc<Config>, remote: Remote, socket: Socket, settle: Settle) {
    let establish = Box::pin(establish(&config, &remote.host, remote.port));
    let delay = Box::pin(tokio::time::sleep(remote.timeout));

    match future::select(establish, delay).await {
        Either::Left((Ok(stream), _delay)) => {
            if let Err(stream) = socket.attach(stream) {
                drop(stream);
                let aborted = io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "socket destroyed while connecting",
                );
                settle.fire(Err(Error::transport(aborted).with_target(remote.target)));
                return;
            }
            settle.fire(Ok(socket));
        }
        Either::Left((Err(err), _delay)) => {
            socket.destroy();
            settle.fire(Err(err.with_target(remote.target)));
        }
        Either::Right(((), establish)) => {
            // Closes the half-open socket, if any.
            drop(establish);

            if !settle.is_settled() {
                debug!("connect to {} timed out after {:?}", remote.target, remote.timeout);
                socket.destroy();
                settle.fire(Err(Error::timed_out(remote.timeout, remote.target)));
            }
        }
    }
}

async fn establish(config: &Config, host: &str, port: u16) -> Result<TcpStream> {
    let addrs = dns::lookup(&*config.resolver, host, port)
        .await
        .map_err(Error::resolve)?;

    if addrs.is_empty() {
        return Err(Error::resolve(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses found for {host}"),
        )));
    }

    trace!("{host}: {} address(es) to try", addrs.len());

    let mut err = None;
    for addr in addrs {
        debug!("connecting to {}", addr);
        match connect_addr(&addr, config).await {
            Ok(tcp) => {
                debug!("connected to {}", addr);
                return Ok(tcp);
            }
            Err(e) => {
                debug!("connect to {} failed: {}", addr, e);
                // Only return the first error; assume it's the most relevant.
                if err.is_none() {
                    err = Some(e);
                }
            }
        }
    }

    Err(Error::transport(err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotConnected, "Network unreachable")
    })))
}

async fn connect_addr(addr: &SocketAddr, config: &Config) -> io::Result<TcpStream> {
    let socket = RawSocket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;

    // When constructing a Tokio `TcpSocket` from a raw fd/socket, the user is
    // responsible for ensuring O_NONBLOCK is set.
    socket.set_nonblocking(true)?;

    if let Some(time) = config.tcp_keepalive {
        if let Err(_e) = socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(time)) {
            warn!("tcp set_keepalive error: {_e}");
        }
    }

    bind_local_address(&socket, addr, &config.local_ipv4, &config.local_ipv6)?;

    let socket = TcpSocket::from_std_stream(socket.into());
    let stream = socket.connect(*addr).await?;

    if let Err(_e) = stream.set_nodelay(config.nodelay) {
        warn!("tcp set_nodelay error: {_e}");
    }

    Ok(stream)
}

fn bind_local_address(
    socket: &RawSocket,
    dst_addr: &SocketAddr,
    local_addr_ipv4: &Option<Ipv4Addr>,
    local_addr_ipv6: &Option<Ipv6Addr>,
) -> io::Result<()> {
    match (*dst_addr, local_addr_ipv4, local_addr_ipv6) {
        (SocketAddr::V4(_), Some(addr), _) => {
            socket.bind(&SocketAddr::new((*addr).into(), 0).into())?;
        }
        (SocketAddr::V6(_), _, Some(addr)) => {
            socket.bind(&SocketAddr::new((*addr).into(), 0).into())?;
        }
        _ => {
            if cfg!(windows) {
                // Windows requires a socket be bound before calling connect
                let any: SocketAddr = match *dst_addr {
                    SocketAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
                    SocketAddr::V6(_) => ([0, 0, 0, 0, 0, 0, 0, 0], 0).into(),
                };
                socket.bind(&any.into())?;
            }
        }
    }

    Ok(())
}
