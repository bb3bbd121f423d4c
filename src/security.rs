use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;
use url::{Host, Url};

/// Why a URL was refused. The string form is the stable error code
/// surfaced in logs and tool results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlBlockReason {
    InvalidUrl,
    InvalidProtocol,
    LocalhostBlocked,
    PrivateIpBlocked,
    DnsLookupFailed,
}

impl UrlBlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlBlockReason::InvalidUrl => "invalid_url",
            UrlBlockReason::InvalidProtocol => "invalid_protocol",
            UrlBlockReason::LocalhostBlocked => "localhost_blocked",
            UrlBlockReason::PrivateIpBlocked => "private_ip_blocked",
            UrlBlockReason::DnsLookupFailed => "dns_lookup_failed",
        }
    }
}

impl fmt::Display for UrlBlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves a hostname to the full set of addresses the OS would use.
/// Injectable so validation is testable without real DNS.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, hostname: &str) -> anyhow::Result<Vec<IpAddr>>;
}

pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, hostname: &str) -> anyhow::Result<Vec<IpAddr>> {
        // Port is required by lookup_host but irrelevant to the answer.
        let addrs = tokio::net::lookup_host((hostname, 0))
            .await?
            .map(|sa| sa.ip())
            .collect();
        Ok(addrs)
    }
}

fn is_blocked_ipv4(addr: Ipv4Addr) -> bool {
    let [a, b, _, _] = addr.octets();
    if a == 0 {
        return true;
    }
    if a == 10 {
        return true;
    }
    if a == 127 {
        return true;
    }
    if a == 169 && b == 254 {
        return true;
    }
    if a == 172 && (16..=31).contains(&b) {
        return true;
    }
    if a == 192 && b == 168 {
        return true;
    }
    if a >= 224 {
        return true;
    }
    false
}

fn is_blocked_ipv6(addr: Ipv6Addr) -> bool {
    if addr == Ipv6Addr::LOCALHOST {
        return true;
    }
    let seg0 = addr.segments()[0];
    // fe80::/10 link-local
    if seg0 & 0xffc0 == 0xfe80 {
        return true;
    }
    // fc00::/7 unique-local
    if seg0 & 0xfe00 == 0xfc00 {
        return true;
    }
    // IPv4-mapped addresses answer for the embedded IPv4 range.
    if let Some(mapped) = addr.to_ipv4_mapped() {
        return is_blocked_ipv4(mapped);
    }
    false
}

/// True when the address must never be fetched on behalf of a user query.
pub fn is_blocked_ip(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

/// Validate that a URL points at a public HTTP(S) destination.
///
/// Hostnames are resolved through `resolver` and the URL is refused if
/// any address in the resolved set is blocked. Resolution failures and
/// empty answers also refuse the URL.
pub async fn validate_public_http_url(
    raw_url: &str,
    resolver: &dyn HostResolver,
) -> Result<Url, UrlBlockReason> {
    let parsed = Url::parse(raw_url).map_err(|_| UrlBlockReason::InvalidUrl)?;

    match parsed.scheme() {
        "http" | "https" => {}
        _ => return Err(UrlBlockReason::InvalidProtocol),
    }

    let host = match parsed.host() {
        Some(host) => host,
        None => return Err(UrlBlockReason::LocalhostBlocked),
    };

    match host {
        Host::Ipv4(addr) => {
            if is_blocked_ipv4(addr) {
                return Err(UrlBlockReason::PrivateIpBlocked);
            }
        }
        Host::Ipv6(addr) => {
            if is_blocked_ipv6(addr) {
                return Err(UrlBlockReason::PrivateIpBlocked);
            }
        }
        Host::Domain(domain) => {
            let hostname = domain.to_ascii_lowercase();
            if hostname.is_empty() || hostname == "localhost" || hostname.ends_with(".local") {
                return Err(UrlBlockReason::LocalhostBlocked);
            }

            let addresses = resolver
                .resolve(&hostname)
                .await
                .map_err(|_| UrlBlockReason::DnsLookupFailed)?;
            if addresses.is_empty() {
                return Err(UrlBlockReason::DnsLookupFailed);
            }
            if addresses.iter().any(|addr| is_blocked_ip(*addr)) {
                return Err(UrlBlockReason::PrivateIpBlocked);
            }
        }
    }

    Ok(parsed)
}
