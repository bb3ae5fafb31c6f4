//! DNS resolution

pub(crate) mod gai;
pub(crate) mod resolve;

pub use gai::{GaiAddrs, GaiFuture, GaiResolver};
pub(crate) use gai::SocketAddrs;
pub(crate) use resolve::DnsResolverWithOverrides;
pub use resolve::{Addrs, IntoResolve, Name, Resolve, Resolving};

use crate::error::BoxError;

/// Resolves `host` to the addresses a connect attempt should try, with
/// `port` applied to each.
pub(crate) async fn lookup(
    resolver: &dyn Resolve,
    host: &str,
    port: u16,
) -> Result<SocketAddrs, BoxError> {
    if let Some(addrs) = SocketAddrs::try_parse(host, port) {
        return Ok(addrs);
    }

    let addrs = resolver
        .resolve(Name::from(host))
        .await?
        .map(|mut addr| {
            addr.set_port(port);
            addr
        })
        .collect();

    Ok(SocketAddrs::new(addrs))
}
