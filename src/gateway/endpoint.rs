//! Peer endpoint resolution from the connection profile
//!
//! URLs keep the host named by the profile so TLS is verified against the
//! name the peer certificate was issued for. Redirecting traffic (`as_localhost`,
//! `ssl-target-name-override`) is done by pinning that host to an address in
//! the HTTP client's resolver.

use crate::config::{ConnectionProfile, PeerConfig};
use crate::error::{WithdrawError, WithdrawResult};

use reqwest::Url;
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::debug;

/// `grpcOptions` key naming the host the peer's TLS certificate is issued for
pub const SSL_TARGET_NAME_OVERRIDE: &str = "ssl-target-name-override";

/// Resolved HTTP endpoint of a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub name: String,
    pub url: Url,
    /// Address the URL host resolves to, bypassing DNS
    pub pinned: Option<IpAddr>,
}

impl PeerEndpoint {
    /// Build the endpoint for a peer URL
    ///
    /// With `as_localhost` the URL host is pinned to the loopback address. A
    /// TLS name override different from the URL host replaces it in the URL,
    /// pinned to the address the profile URL pointed at; that needs an IP or
    /// `localhost` (or `as_localhost`) to know the address.
    pub fn new(
        name: impl Into<String>,
        raw: &str,
        name_override: Option<&str>,
        as_localhost: bool,
    ) -> WithdrawResult<Self> {
        let name = name.into();
        let mut url = to_http_url(raw)?;
        let host = url.host_str().unwrap_or_default().to_string();

        let mut pinned = if as_localhost {
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
        } else {
            None
        };

        if let Some(target) = name_override.filter(|n| !n.is_empty() && *n != host) {
            match pinned.or_else(|| host_address(&host)) {
                Some(addr) => {
                    url.set_host(Some(target)).map_err(|e| {
                        WithdrawError::Profile(format!(
                            "Invalid {} {:?} for peer {}: {}",
                            SSL_TARGET_NAME_OVERRIDE, target, name, e
                        ))
                    })?;
                    pinned = Some(addr);
                }
                None => debug!(
                    "Ignoring {} for peer {}: {} is not an address",
                    SSL_TARGET_NAME_OVERRIDE, name, host
                ),
            }
        }

        // IP literal hosts never go through the resolver
        if url.host_str().and_then(host_address).is_some()
            && url.host_str() != Some("localhost")
        {
            pinned = None;
        }

        Ok(Self { name, url, pinned })
    }

    fn from_profile(name: String, peer: &PeerConfig, as_localhost: bool) -> WithdrawResult<Self> {
        let name_override = peer
            .grpc_options
            .get(SSL_TARGET_NAME_OVERRIDE)
            .and_then(Value::as_str);
        Self::new(name, &peer.url, name_override, as_localhost)
    }
}

fn host_address(host: &str) -> Option<IpAddr> {
    if host.eq_ignore_ascii_case("localhost") {
        return Some(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .ok()
}

/// Map a profile peer URL to an HTTP base URL
///
/// `grpcs://` becomes `https://`, `grpc://` becomes `http://`.
pub fn to_http_url(raw: &str) -> WithdrawResult<Url> {
    let raw = raw.trim();
    let mapped = if let Some(rest) = raw.strip_prefix("grpcs://") {
        format!("https://{}", rest)
    } else if let Some(rest) = raw.strip_prefix("grpc://") {
        format!("http://{}", rest)
    } else if raw.starts_with("https://") || raw.starts_with("http://") {
        raw.to_string()
    } else {
        return Err(WithdrawError::Profile(format!(
            "Unsupported peer URL: {:?}",
            raw
        )));
    };

    Url::parse(&mapped)
        .map_err(|e| WithdrawError::Profile(format!("Invalid peer URL {:?}: {}", raw, e)))
}

/// Host to address pins for an HTTP client, one per host
pub fn pinned_hosts(endpoints: &[PeerEndpoint]) -> Vec<(String, SocketAddr)> {
    let mut pins: Vec<(String, SocketAddr)> = Vec::new();

    for endpoint in endpoints {
        let (Some(addr), Some(host)) = (endpoint.pinned, endpoint.url.host_str()) else {
            continue;
        };
        if pins.iter().any(|(h, _)| h == host) {
            continue;
        }
        let port = endpoint.url.port_or_known_default().unwrap_or_default();
        pins.push((host.to_string(), SocketAddr::new(addr, port)));
    }

    pins
}

/// Endpoint for a peer URL returned by discovery
///
/// A profile peer with the same URL contributes its name and TLS options.
pub fn discovered_endpoint(
    profile: &ConnectionProfile,
    raw: &str,
    as_localhost: bool,
) -> WithdrawResult<PeerEndpoint> {
    let known = profile
        .peers
        .iter()
        .filter(|(_, peer)| peer.url.trim() == raw.trim())
        .min_by(|a, b| a.0.cmp(b.0));

    match known {
        Some((name, peer)) => PeerEndpoint::from_profile(name.clone(), peer, as_localhost),
        None => PeerEndpoint::new(raw, raw, None, as_localhost),
    }
}

/// Endpoints for the client organization, or every peer if the profile names
/// no organization. Peers are ordered as listed by the organization, otherwise
/// by name.
pub fn profile_endpoints(
    profile: &ConnectionProfile,
    as_localhost: bool,
) -> WithdrawResult<Vec<PeerEndpoint>> {
    let names: Vec<String> = match profile
        .client_organization()
        .and_then(|org| profile.organizations.get(org))
    {
        Some(org) if !org.peers.is_empty() => org.peers.clone(),
        _ => {
            let mut names: Vec<String> = profile.peers.keys().cloned().collect();
            names.sort();
            names
        }
    };

    resolve(profile, names, as_localhost)
}

/// Endpoints listed for a channel in the profile
pub fn channel_endpoints(
    profile: &ConnectionProfile,
    channel: &str,
    as_localhost: bool,
) -> WithdrawResult<Vec<PeerEndpoint>> {
    let config = profile
        .channels
        .get(channel)
        .ok_or_else(|| WithdrawError::ChannelNotFound {
            channel: channel.to_string(),
        })?;

    let mut names: Vec<String> = config.peers.keys().cloned().collect();
    names.sort();
    resolve(profile, names, as_localhost)
}

fn resolve(
    profile: &ConnectionProfile,
    names: Vec<String>,
    as_localhost: bool,
) -> WithdrawResult<Vec<PeerEndpoint>> {
    let mut endpoints = Vec::with_capacity(names.len());

    for name in names {
        let peer = profile.peers.get(&name).ok_or_else(|| {
            WithdrawError::Profile(format!("Peer {} is referenced but not defined", name))
        })?;
        let endpoint = PeerEndpoint::from_profile(name, peer, as_localhost)?;
        debug!(
            "Resolved peer {} to {} (pinned {:?})",
            endpoint.name, endpoint.url, endpoint.pinned
        );
        endpoints.push(endpoint);
    }

    Ok(endpoints)
}

/// PEM encoded TLS roots declared for peers, inline or by path
pub fn tls_roots(profile: &ConnectionProfile) -> WithdrawResult<Vec<String>> {
    let mut names: Vec<&String> = profile.peers.keys().collect();
    names.sort();

    let mut roots = Vec::new();
    for name in names {
        let Some(certs) = &profile.peers[name].tls_ca_certs else {
            continue;
        };

        if let Some(pem) = &certs.pem {
            roots.push(pem.clone());
        } else if let Some(path) = &certs.path {
            let path = profile.resolve_path(path);
            let pem = std::fs::read_to_string(&path).map_err(|e| {
                WithdrawError::Profile(format!(
                    "Failed to read TLS CA for peer {} at {:?}: {}",
                    name, path, e
                ))
            })?;
            roots.push(pem);
        }
    }

    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(json: &str) -> ConnectionProfile {
        ConnectionProfile::from_json(json).unwrap()
    }

    fn loopback() -> Option<IpAddr> {
        Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    #[test]
    fn test_scheme_mapping() {
        let url = to_http_url("grpcs://peer0.org1.example.com:7051").unwrap();
        assert_eq!(url.as_str(), "https://peer0.org1.example.com:7051/");

        let url = to_http_url("grpc://peer0.org1.example.com:7051").unwrap();
        assert_eq!(url.scheme(), "http");

        let url = to_http_url("https://gateway.example.com/base").unwrap();
        assert_eq!(url.path(), "/base");
    }

    #[test]
    fn test_as_localhost_keeps_tls_host() {
        let endpoint =
            PeerEndpoint::new("peer0", "grpcs://peer0.org1.example.com:7051", None, true).unwrap();
        // Certificate verification still sees the peer's own name
        assert_eq!(endpoint.url.host_str(), Some("peer0.org1.example.com"));
        assert_eq!(endpoint.url.port(), Some(7051));
        assert_eq!(endpoint.pinned, loopback());

        let endpoint =
            PeerEndpoint::new("peer0", "grpcs://peer0.org1.example.com:7051", None, false).unwrap();
        assert_eq!(endpoint.pinned, None);
    }

    #[test]
    fn test_ssl_target_name_override() {
        let endpoint = PeerEndpoint::new(
            "peer0",
            "grpcs://localhost:7051",
            Some("peer0.org1.example.com"),
            false,
        )
        .unwrap();
        assert_eq!(endpoint.url.as_str(), "https://peer0.org1.example.com:7051/");
        assert_eq!(endpoint.pinned, loopback());

        let endpoint = PeerEndpoint::new(
            "peer0",
            "grpcs://10.0.0.5:7051",
            Some("peer0.org1.example.com"),
            false,
        )
        .unwrap();
        assert_eq!(endpoint.url.host_str(), Some("peer0.org1.example.com"));
        assert_eq!(endpoint.pinned, "10.0.0.5".parse().ok());

        // A DNS name gives no address to pin the override to
        let endpoint = PeerEndpoint::new(
            "peer0",
            "grpcs://peers.internal:7051",
            Some("peer0.org1.example.com"),
            false,
        )
        .unwrap();
        assert_eq!(endpoint.url.host_str(), Some("peers.internal"));
        assert_eq!(endpoint.pinned, None);

        // IP hosts are connected to directly
        let endpoint = PeerEndpoint::new("peer0", "grpc://127.0.0.1:7051", None, true).unwrap();
        assert_eq!(endpoint.pinned, None);
    }

    #[test]
    fn test_profile_grpc_options_override() {
        let profile = profile(
            r#"{
                "peers": {
                    "peer0": {
                        "url": "grpcs://localhost:7051",
                        "grpcOptions": { "ssl-target-name-override": "peer0.org1.example.com" }
                    }
                }
            }"#,
        );
        let endpoints = profile_endpoints(&profile, false).unwrap();
        assert_eq!(endpoints[0].url.as_str(), "https://peer0.org1.example.com:7051/");

        let pins = pinned_hosts(&endpoints);
        assert_eq!(
            pins,
            vec![(
                "peer0.org1.example.com".to_string(),
                "127.0.0.1:7051".parse().unwrap()
            )]
        );
    }

    #[test]
    fn test_pinned_hosts() {
        let endpoints = vec![
            PeerEndpoint::new("a", "grpcs://peer0.org1.example.com:7051", None, true).unwrap(),
            PeerEndpoint::new("b", "grpcs://peer0.org1.example.com:7051", None, true).unwrap(),
            PeerEndpoint::new("c", "https://peer0.org2.example.com", None, true).unwrap(),
            PeerEndpoint::new("d", "grpcs://peer0.org3.example.com:11051", None, false).unwrap(),
        ];
        let pins = pinned_hosts(&endpoints);
        assert_eq!(
            pins,
            vec![
                (
                    "peer0.org1.example.com".to_string(),
                    "127.0.0.1:7051".parse().unwrap()
                ),
                (
                    "peer0.org2.example.com".to_string(),
                    "127.0.0.1:443".parse().unwrap()
                ),
            ]
        );
    }

    #[test]
    fn test_discovered_endpoint_uses_profile_options() {
        let profile = profile(
            r#"{
                "peers": {
                    "peer0": {
                        "url": "grpcs://localhost:7051",
                        "grpcOptions": { "ssl-target-name-override": "peer0.org1.example.com" }
                    }
                }
            }"#,
        );
        let endpoint = discovered_endpoint(&profile, "grpcs://localhost:7051", false).unwrap();
        assert_eq!(endpoint.name, "peer0");
        assert_eq!(endpoint.url.host_str(), Some("peer0.org1.example.com"));

        let endpoint =
            discovered_endpoint(&profile, "grpcs://peer0.org2.example.com:9051", true).unwrap();
        assert_eq!(endpoint.name, "grpcs://peer0.org2.example.com:9051");
        assert_eq!(endpoint.pinned, loopback());
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(matches!(
            to_http_url("tcp://peer0:7051"),
            Err(WithdrawError::Profile(_))
        ));
        assert!(to_http_url("").is_err());
    }

    #[test]
    fn test_client_org_peers_first() {
        let profile = profile(
            r#"{
                "client": { "organization": "Org1" },
                "organizations": { "Org1": { "mspid": "Org1MSP", "peers": ["peer1", "peer0"] } },
                "peers": {
                    "peer0": { "url": "grpcs://peer0:7051" },
                    "peer1": { "url": "grpcs://peer1:8051" },
                    "peer9": { "url": "grpcs://peer9:9051" }
                }
            }"#,
        );
        let endpoints = profile_endpoints(&profile, false).unwrap();
        let names: Vec<_> = endpoints.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["peer1", "peer0"]);
    }

    #[test]
    fn test_all_peers_without_client_org() {
        let profile = profile(
            r#"{
                "peers": {
                    "peer1": { "url": "grpcs://peer1:8051" },
                    "peer0": { "url": "grpcs://peer0:7051" }
                }
            }"#,
        );
        let endpoints = profile_endpoints(&profile, false).unwrap();
        assert_eq!(endpoints[0].name, "peer0");
        assert_eq!(endpoints[1].url.port(), Some(8051));
    }

    #[test]
    fn test_undefined_peer_reference() {
        let profile = profile(
            r#"{
                "client": { "organization": "Org1" },
                "organizations": { "Org1": { "peers": ["ghost"] } }
            }"#,
        );
        assert!(matches!(
            profile_endpoints(&profile, false),
            Err(WithdrawError::Profile(_))
        ));
    }

    #[test]
    fn test_channel_endpoints() {
        let profile = profile(
            r#"{
                "peers": { "peer0": { "url": "grpc://peer0:7051" } },
                "channels": { "general": { "peers": { "peer0": { "endorsingPeer": true } } } }
            }"#,
        );
        let endpoints = channel_endpoints(&profile, "general", true).unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].url.as_str(), "http://peer0:7051/");
        assert_eq!(endpoints[0].pinned, loopback());

        assert!(matches!(
            channel_endpoints(&profile, "other", false),
            Err(WithdrawError::ChannelNotFound { .. })
        ));
    }

    #[test]
    fn test_tls_roots_inline_and_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ca.pem"), "PATH-PEM").unwrap();
        let path = dir.path().join("connection.json");
        std::fs::write(
            &path,
            r#"{
                "peers": {
                    "peer0": { "url": "grpcs://peer0:7051", "tlsCACerts": { "pem": "INLINE-PEM" } },
                    "peer1": { "url": "grpcs://peer1:7051", "tlsCACerts": { "path": "ca.pem" } },
                    "peer2": { "url": "grpc://peer2:7051" }
                }
            }"#,
        )
        .unwrap();

        let profile = ConnectionProfile::load(&path).unwrap();
        let roots = tls_roots(&profile).unwrap();
        assert_eq!(roots, vec!["INLINE-PEM".to_string(), "PATH-PEM".to_string()]);
    }

    #[test]
    fn test_tls_root_missing_file() {
        let profile = profile(
            r#"{ "peers": { "peer0": { "url": "grpcs://peer0:7051", "tlsCACerts": { "path": "/nonexistent/ca.pem" } } } }"#,
        );
        assert!(matches!(tls_roots(&profile), Err(WithdrawError::Profile(_))));
    }
}
