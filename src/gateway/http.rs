//! HTTP/JSON gateway
//!
//! Talks to a gateway front end exposed by the network's peers:
//! - `GET  {peer}/api/v1/channels/{channel}/discovery`
//! - `POST {peer}/api/v1/channels/{channel}/contracts/{contract}/submit`
//!
//! Submissions carry a signed proposal envelope. Each submission goes to the
//! first resolved peer exactly once; retries and ordering are left to the
//! network.

use super::endpoint::{self, PeerEndpoint};
use super::signer::Signer;
use super::{ChannelInfo, ConnectOptions, Contract, Gateway, Network, SubmitResult};
use crate::config::{ConnectionProfile, DiscoveryOptions};
use crate::error::{WithdrawError, WithdrawResult};
use crate::wallet::Identity;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Header carrying the submitter's MSP id
pub const MSP_ID_HEADER: &str = "X-Fabric-MspId";
/// Header carrying the hex encoded proposal signature
pub const SIGNATURE_HEADER: &str = "X-Fabric-Signature";

/// State of an open connection
struct Session {
    /// Client pinned for the profile peers, used for discovery
    client: Client,
    /// PEM roots, reused for network scoped clients
    tls_roots: Vec<String>,
    identity: Identity,
    signer: Signer,
    profile: ConnectionProfile,
    endpoints: Vec<PeerEndpoint>,
    discovery: DiscoveryOptions,
}

/// Gateway speaking JSON over HTTP
#[derive(Default)]
pub struct HttpGateway {
    session: Option<Arc<Session>>,
}

impl HttpGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn build_client(tls_roots: &[String], peers: &[PeerEndpoint]) -> WithdrawResult<Client> {
        let mut builder = Client::builder();
        for pem in tls_roots {
            let cert = reqwest::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| WithdrawError::Profile(format!("Invalid TLS CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
        for (host, addr) in endpoint::pinned_hosts(peers) {
            debug!("Pinning {} to {}", host, addr.ip());
            builder = builder.resolve(&host, addr);
        }

        builder
            .build()
            .map_err(|e| WithdrawError::Internal(format!("Failed to build HTTP client: {}", e)))
    }

    async fn discover(session: &Session, channel: &str) -> WithdrawResult<Vec<PeerEndpoint>> {
        let peer = session.endpoints.first().ok_or_else(|| {
            WithdrawError::Profile("No peers available for discovery".to_string())
        })?;
        let url = api_url(&peer.url, &["channels", channel, "discovery"])?;
        debug!("Discovering channel {} via {}", channel, url);

        let response = session
            .client
            .get(url.clone())
            .header(MSP_ID_HEADER, &session.identity.msp_id)
            .send()
            .await
            .map_err(|e| WithdrawError::Connection {
                endpoint: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| WithdrawError::Connection {
            endpoint: url.to_string(),
            message: e.to_string(),
        })?;

        match status {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(WithdrawError::ChannelNotFound {
                    channel: channel.to_string(),
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(WithdrawError::Authentication {
                    identity: session.identity.label.clone(),
                    message: error_message(status, &body),
                })
            }
            _ => {
                return Err(WithdrawError::Connection {
                    endpoint: url.to_string(),
                    message: error_message(status, &body),
                })
            }
        }

        let discovered: DiscoveryResponse = serde_json::from_str(&body).map_err(|e| {
            WithdrawError::Connection {
                endpoint: url.to_string(),
                message: format!("Malformed discovery response: {}", e),
            }
        })?;

        let as_localhost = session.discovery.as_localhost;
        let mut peers = Vec::with_capacity(discovered.peers.len());
        for raw in discovered.peers {
            peers.push(endpoint::discovered_endpoint(
                &session.profile,
                &raw,
                as_localhost,
            )?);
        }

        if !peers.is_empty() {
            return Ok(peers);
        }

        match endpoint::channel_endpoints(&session.profile, channel, as_localhost) {
            Ok(peers) if !peers.is_empty() => {
                warn!(
                    "Discovery returned no peers for channel {}, using its profile peers",
                    channel
                );
                Ok(peers)
            }
            Ok(_) | Err(WithdrawError::ChannelNotFound { .. }) => {
                warn!(
                    "Discovery returned no peers for channel {}, using client organization peers",
                    channel
                );
                Ok(session.endpoints.clone())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn connect(
        &mut self,
        profile: &ConnectionProfile,
        options: ConnectOptions,
    ) -> WithdrawResult<()> {
        if self.is_connected() {
            return Err(WithdrawError::Internal("Gateway is already connected".to_string()));
        }

        let identity = options
            .wallet
            .get(&options.identity)
            .await?
            .ok_or_else(|| WithdrawError::Identity {
                label: options.identity.clone(),
                message: format!("not found in wallet {}", options.wallet.location()),
            })?;
        let signer = Signer::from_pem(&identity.private_key)?;

        if let Some(mspid) = profile.client_mspid() {
            if mspid != identity.msp_id {
                warn!(
                    "Identity {} belongs to {} but the profile client organization is {}",
                    identity.label, identity.msp_id, mspid
                );
            }
        }

        let endpoints = endpoint::profile_endpoints(profile, options.discovery.as_localhost)?;
        if endpoints.is_empty() {
            return Err(WithdrawError::Profile(
                "Connection profile defines no peers".to_string(),
            ));
        }

        let tls_roots = endpoint::tls_roots(profile)?;
        let client = Self::build_client(&tls_roots, &endpoints)?;

        info!(
            "Gateway connected as {} ({}) with {} peer(s)",
            identity.label,
            identity.msp_id,
            endpoints.len()
        );

        self.session = Some(Arc::new(Session {
            client,
            tls_roots,
            identity,
            signer,
            profile: profile.clone(),
            endpoints,
            discovery: options.discovery,
        }));

        Ok(())
    }

    async fn get_network(&self, name: &str) -> WithdrawResult<Box<dyn Network>> {
        let session = self.session.clone().ok_or(WithdrawError::NotConnected)?;

        let peers = if session.discovery.enabled {
            Self::discover(&session, name).await?
        } else {
            endpoint::channel_endpoints(&session.profile, name, session.discovery.as_localhost)?
        };

        debug!("Network {} resolved with {} peer(s)", name, peers.len());
        let client = Self::build_client(&session.tls_roots, &peers)?;

        Ok(Box::new(HttpNetwork {
            name: name.to_string(),
            session,
            client,
            peers,
        }))
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Gateway disconnected ({})", session.identity.label);
        }
    }
}

/// Network view backed by an HTTP session
pub struct HttpNetwork {
    name: String,
    session: Arc<Session>,
    /// Client pinned for this network's peers
    client: Client,
    peers: Vec<PeerEndpoint>,
}

#[async_trait]
impl Network for HttpNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_channel(&self, name: &str) -> WithdrawResult<ChannelInfo> {
        if name != self.name {
            return Err(WithdrawError::ChannelNotFound {
                channel: name.to_string(),
            });
        }

        Ok(ChannelInfo {
            name: self.name.clone(),
            peers: self.peers.iter().map(|p| p.url.to_string()).collect(),
        })
    }

    fn get_contract(&self, name: &str) -> Box<dyn Contract> {
        Box::new(HttpContract {
            channel: self.name.clone(),
            name: name.to_string(),
            session: self.session.clone(),
            client: self.client.clone(),
            peers: self.peers.clone(),
        })
    }
}

/// Contract handle backed by an HTTP session
pub struct HttpContract {
    channel: String,
    name: String,
    session: Arc<Session>,
    client: Client,
    peers: Vec<PeerEndpoint>,
}

#[async_trait]
impl Contract for HttpContract {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit_transaction(
        &self,
        name: &str,
        args: &[Option<String>],
    ) -> WithdrawResult<SubmitResult> {
        let peer = self.peers.first().ok_or_else(|| WithdrawError::Connection {
            endpoint: self.channel.clone(),
            message: "No peers available for channel".to_string(),
        })?;
        let url = api_url(
            &peer.url,
            &["channels", &self.channel, "contracts", &self.name, "submit"],
        )?;

        let proposal = Proposal::new(
            &self.session.identity,
            &self.channel,
            &self.name,
            name,
            args,
            Uuid::new_v4(),
            Utc::now(),
        );
        let body = serde_json::to_vec(&proposal)
            .map_err(|e| WithdrawError::Internal(format!("Failed to encode proposal: {}", e)))?;
        let signature = self.session.signer.sign(&body);

        info!(
            "Submitting {} to {}/{} via {} (tx {})",
            name, self.channel, self.name, peer.name, proposal.tx_id
        );

        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(MSP_ID_HEADER, &self.session.identity.msp_id)
            .header(SIGNATURE_HEADER, hex::encode(signature))
            .body(body)
            .send()
            .await
            .map_err(|e| WithdrawError::Connection {
                endpoint: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| WithdrawError::Connection {
            endpoint: url.to_string(),
            message: e.to_string(),
        })?;

        interpret_response(
            status,
            &text,
            &SubmitContext {
                identity: &self.session.identity.label,
                channel: &self.channel,
                contract: &self.name,
                transaction: name,
                tx_id: &proposal.tx_id,
            },
        )
    }
}

/// Signed transaction proposal body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub tx_id: String,
    pub nonce: Uuid,
    pub timestamp: DateTime<Utc>,
    pub channel: String,
    pub contract: String,
    pub function: String,
    pub args: Vec<Option<String>>,
    pub msp_id: String,
    /// Certificate of the submitting identity
    pub creator: String,
}

impl Proposal {
    pub fn new(
        identity: &Identity,
        channel: &str,
        contract: &str,
        function: &str,
        args: &[Option<String>],
        nonce: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tx_id: transaction_id(&nonce, &identity.certificate),
            nonce,
            timestamp,
            channel: channel.to_string(),
            contract: contract.to_string(),
            function: function.to_string(),
            args: args.to_vec(),
            msp_id: identity.msp_id.clone(),
            creator: identity.certificate.clone(),
        }
    }
}

/// Transaction id: hex(sha256(nonce || creator))
pub fn transaction_id(nonce: &Uuid, creator: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(creator.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(default)]
    peers: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default)]
    tx_id: Option<String>,
    #[serde(default)]
    payload: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// What a response belongs to, for error reporting
pub struct SubmitContext<'a> {
    pub identity: &'a str,
    pub channel: &'a str,
    pub contract: &'a str,
    pub transaction: &'a str,
    pub tx_id: &'a str,
}

/// Map a submit response to a result or a categorized error
pub fn interpret_response(
    status: StatusCode,
    body: &str,
    ctx: &SubmitContext<'_>,
) -> WithdrawResult<SubmitResult> {
    if status.is_success() {
        let parsed: SubmitResponse = if body.trim().is_empty() {
            SubmitResponse {
                tx_id: None,
                payload: None,
            }
        } else {
            serde_json::from_str(body).map_err(|e| {
                WithdrawError::Internal(format!("Malformed submit response: {}", e))
            })?
        };

        return Ok(SubmitResult {
            tx_id: parsed.tx_id.unwrap_or_else(|| ctx.tx_id.to_string()),
            payload: parsed.payload.unwrap_or_default().into_bytes(),
        });
    }

    let message = error_message(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(WithdrawError::Authentication {
            identity: ctx.identity.to_string(),
            message,
        }),
        StatusCode::NOT_FOUND => Err(WithdrawError::ContractNotFound {
            channel: ctx.channel.to_string(),
            contract: ctx.contract.to_string(),
        }),
        _ => Err(WithdrawError::Endorsement {
            transaction: ctx.transaction.to_string(),
            message,
        }),
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.to_string()
            } else {
                format!("{}: {}", status, trimmed)
            }
        })
}

fn api_url(base: &Url, segments: &[&str]) -> WithdrawResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| WithdrawError::Profile(format!("Peer URL cannot be a base: {}", base)))?
        .pop_if_empty()
        .extend(["api", "v1"])
        .extend(segments);
    Ok(url)
}
