//! Client address resolution behind trusted reverse proxies.
//!
//! `X-Forwarded-For` is honoured only when the direct peer sits inside one of
//! the configured ranges; anyone else could forge it.

use ipnetwork::IpNetwork;
use std::net::IpAddr;
use tracing::{debug, warn};

pub const DEFAULT_TRUSTED_PROXY_CIDRS: &str =
    "127.0.0.1/32,10.0.0.0/8,172.16.0.0/12,192.168.0.0/16,::1/128";

#[derive(Clone, Debug, Default)]
pub struct ClientIpResolver {
    trusted: Vec<IpNetwork>,
}

impl ClientIpResolver {
    /// Parse a comma-separated CIDR list. Invalid entries are skipped.
    #[must_use]
    pub fn from_cidrs(raw: &str) -> Self {
        let trusted = raw
            .split(',')
            .map(str::trim)
            .filter(|cidr| !cidr.is_empty())
            .filter_map(|cidr| match cidr.parse::<IpNetwork>() {
                Ok(network) => Some(network),
                Err(err) => {
                    warn!("Ignoring invalid trusted proxy CIDR {cidr}: {err}");
                    None
                }
            })
            .collect();
        Self { trusted }
    }

    #[must_use]
    pub fn trusted_ranges(&self) -> &[IpNetwork] {
        &self.trusted
    }

    #[must_use]
    pub fn is_trusted_proxy(&self, peer: IpAddr) -> bool {
        let peer = peer.to_canonical();
        self.trusted.iter().any(|network| network.contains(peer))
    }

    /// Resolve the caller address from the peer and its forwarded header.
    #[must_use]
    pub fn resolve(&self, peer: IpAddr, forwarded_for: Option<&str>) -> IpAddr {
        let peer = peer.to_canonical();
        if !self.is_trusted_proxy(peer) {
            return peer;
        }

        let Some(first) = forwarded_for
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            return peer;
        };

        match first.parse::<IpAddr>() {
            Ok(client) => client.to_canonical(),
            Err(_) => {
                debug!("Ignoring unparsable forwarded address: {first}");
                peer
            }
        }
    }
}
