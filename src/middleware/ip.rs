//! Client identifier extraction for rate limiting.
//!
//! The identifier is a best-effort source address, not an authenticated
//! identity. It keys rate-limit counters and appears in rejection logs.
//!
//! # Resolution Order
//!
//! 1. `X-Forwarded-For` (first non-empty entry of the comma-separated list)
//! 2. `X-Real-IP`
//! 3. The socket peer address (`ConnectInfo<SocketAddr>`)
//! 4. [`UNKNOWN_IP`]
//!
//! # Trusted Proxies
//!
//! Forwarded headers are set by whoever sends the request, so a client that
//! reaches the service directly can pick any identifier it likes. When
//! `TRUSTED_PROXIES` is configured and the peer address is known, forwarded
//! headers are only honoured if the peer lies inside one of the configured
//! CIDR ranges; otherwise the peer address itself is used.
//!
//! With no trusted proxies configured every forwarded header is believed.
//! That is acceptable behind a reverse proxy that overwrites these headers,
//! and wrong anywhere else.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

/// Fallback identifier when no client address can be determined.
///
/// All such requests share one rate-limit bucket.
pub const UNKNOWN_IP: &str = "unknown";

/// Header set by most reverse proxies.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Single-address alternative used by nginx and some load balancers.
pub const REAL_IP_HEADER: &str = "x-real-ip";

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse CIDR notation (`10.0.0.0/8`, `::1/128`) or a bare address.
    ///
    /// Returns `None` if the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();

        let Some((addr, prefix)) = cidr.split_once('/') else {
            // Bare address: implicit /32 or /128
            let network: IpAddr = cidr.parse().ok()?;
            return Some(Self {
                prefix_len: max_prefix(&network),
                network,
            });
        };

        let network: IpAddr = addr.parse().ok()?;
        let prefix_len: u8 = prefix.parse().ok()?;
        if prefix_len > max_prefix(&network) {
            return None;
        }

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Check if an address falls inside this range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Set of reverse-proxy networks whose forwarded headers are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Build from CIDR strings. Invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy validation enabled");
        }

        Self { ranges }
    }

    /// Whether any ranges are configured.
    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Whether forwarded headers from `peer` should be believed.
    ///
    /// Always true when no ranges are configured.
    pub fn is_trusted(&self, peer: &IpAddr) -> bool {
        !self.is_enabled() || self.ranges.iter().any(|range| range.contains(peer))
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Address claimed by forwarding headers, borrowed from the request.
fn forwarded_address<B>(req: &Request<B>) -> Option<&str> {
    let from_xff = req
        .headers()
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').map(str::trim).find(|ip| !ip.is_empty()));

    from_xff.or_else(|| {
        req.headers()
            .get(REAL_IP_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    })
}

/// Socket peer address, present when the server was started with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
fn peer_address<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Resolve the client identifier for a request.
///
/// # Returns
///
/// `Cow<'static, str>`: borrowed for the [`UNKNOWN_IP`] fallback, owned
/// otherwise. Call `.into_owned()` to move it into an async block.
pub fn client_identifier<B>(req: &Request<B>, trusted: &TrustedProxyConfig) -> Cow<'static, str> {
    let peer = peer_address(req);

    if let Some(peer) = peer
        && !trusted.is_trusted(&peer)
    {
        if forwarded_address(req).is_some() {
            debug!(
                peer = %peer,
                "Ignoring forwarded headers from untrusted peer"
            );
        }
        return Cow::Owned(peer.to_string());
    }

    match (forwarded_address(req), peer) {
        (Some(forwarded), _) => Cow::Owned(forwarded.to_string()),
        (None, Some(peer)) => Cow::Owned(peer.to_string()),
        (None, None) => Cow::Borrowed(UNKNOWN_IP),
    }
}
