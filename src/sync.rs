//! Peer registry and chain fetching for AgriChain
//!
//! This module provides:
//! - The set of known peer addresses
//! - The [`ChainSource`] seam through which peer chains are fetched
//! - An HTTP implementation that reads a peer's `/chain` endpoint

use crate::blockchain::Block;
use crate::error::{ChainError, Result};
use async_trait::async_trait;
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::{header, Body, Client, StatusCode, Uri};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Largest `/chain` response body accepted from a peer.
pub const MAX_CHAIN_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

/// A peer's answer to "what is your chain": the blocks and the length it
/// claims for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub length: usize,
}

impl ChainResponse {
    pub fn new(chain: Vec<Block>) -> Self {
        let length = chain.len();
        Self { chain, length }
    }
}

/// Where peer chains come from.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse>;
}

/// Fetches `GET http://{peer}/chain` over plain HTTP/1.
pub struct HttpChainSource {
    client: Client<HttpConnector>,
}

impl HttpChainSource {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpChainSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainSource for HttpChainSource {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse> {
        let uri: Uri = format!("http://{}/chain", peer)
            .parse()
            .map_err(|e| ChainError::InvalidPeerAddress(format!("{}: {}", peer, e)))?;

        let unreachable = |reason: String| ChainError::PeerUnreachable {
            peer: peer.to_string(),
            reason,
        };

        let response = self
            .client
            .get(uri)
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(unreachable(format!("HTTP {}", status)));
        }

        let declared = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(len) = declared.filter(|len| *len > MAX_CHAIN_RESPONSE_BYTES) {
            return Err(oversized(peer, len));
        }

        let body = read_body_limited(response.into_body(), MAX_CHAIN_RESPONSE_BYTES)
            .await
            .map_err(|e| match e {
                BodyError::TooLarge(len) => oversized(peer, len),
                BodyError::Transport(reason) => unreachable(reason),
            })?;
        debug!(peer, bytes = body.len(), "peer chain received");

        serde_json::from_slice(&body).map_err(|e| ChainError::InvalidPeerChain {
            peer: peer.to_string(),
            reason: format!("malformed response: {}", e),
        })
    }
}

#[derive(Debug, PartialEq)]
enum BodyError {
    TooLarge(usize),
    Transport(String),
}

fn oversized(peer: &str, len: usize) -> ChainError {
    ChainError::InvalidPeerChain {
        peer: peer.to_string(),
        reason: format!(
            "response of {} bytes exceeds the {} byte limit",
            len, MAX_CHAIN_RESPONSE_BYTES
        ),
    }
}

/// Collect `body`, giving up as soon as more than `limit` bytes arrive.
async fn read_body_limited(mut body: Body, limit: usize) -> std::result::Result<Vec<u8>, BodyError> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|e| BodyError::Transport(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge(buf.len() + chunk.len()));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Normalize a peer address to `host:port`.
///
/// Accepts full URLs (`http://192.168.0.5:5000/`) as well as bare
/// authorities (`192.168.0.5:5000`).
pub fn normalize_peer_address(address: &str) -> Result<String> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(ChainError::InvalidPeerAddress("empty address".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    let uri: Uri = with_scheme
        .parse()
        .map_err(|e| ChainError::InvalidPeerAddress(format!("{}: {}", trimmed, e)))?;

    match uri.authority() {
        Some(authority) if !authority.host().is_empty() => Ok(authority.as_str().to_string()),
        _ => Err(ChainError::InvalidPeerAddress(trimmed.to_string())),
    }
}

/// Known peers. Written by registration, read by consensus.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<BTreeSet<String>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer, returning its normalized address. Registering the
    /// same peer twice is harmless.
    pub fn register_peer(&self, address: &str) -> Result<String> {
        let normalized = normalize_peer_address(address)?;
        if self.peers.write().insert(normalized.clone()) {
            debug!(peer = %normalized, "peer registered");
        }
        Ok(normalized)
    }

    pub fn remove_peer(&self, address: &str) -> bool {
        normalize_peer_address(address)
            .map(|normalized| self.peers.write().remove(&normalized))
            .unwrap_or(false)
    }

    pub fn contains(&self, address: &str) -> bool {
        normalize_peer_address(address)
            .map(|normalized| self.peers.read().contains(&normalized))
            .unwrap_or(false)
    }

    /// Sorted snapshot of every registered peer.
    pub fn peers(&self) -> Vec<String> {
        self.peers.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}
