//! Client context resolution.
//!
//! Derives the effective client address, host, method and path of the request
//! the ingress is asking about. The decision request itself is a subrequest,
//! so most of this comes from headers set by the proxy chain.
//!
//! # IP precedence
//! ```text
//! X-Original-Forwarded-For (last entry)
//!     → X-Real-IP
//!     → X-Forwarded-For (first hop)
//!     → socket peer address
//! ```
//! The nginx ingress controller moves the genuine client chain into
//! `X-Original-Forwarded-For`; its last entry is the client.

use axum::http::{header, HeaderMap, Method, Uri};
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

pub const X_ORIGINAL_FORWARDED_FOR: &str = "x-original-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_ORIGINAL_URL: &str = "x-original-url";

/// Errors while resolving the client context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The proxy sent an original URL we cannot interpret.
    #[error("invalid X-Original-URL {url:?}: {reason}")]
    InvalidOriginalUrl { url: String, reason: String },
}

/// Who is asking for what. Built once per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientContext {
    pub host: String,
    pub ip: String,
    pub method: String,
    pub path: String,
}

impl ClientContext {
    pub fn new(
        host: impl Into<String>,
        ip: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            ip: ip.into(),
            method: method.into(),
            path: path.into(),
        }
    }

    /// Resolve the context from the parts of a decision request.
    pub fn resolve(
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Result<Self, ContextError> {
        let ip = resolve_ip(headers, peer);
        let (host, path) = resolve_target(uri, headers)?;

        Ok(Self {
            host,
            ip,
            method: method.as_str().to_string(),
            path,
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Best-effort true client address.
pub fn resolve_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(chain) = header_str(headers, X_ORIGINAL_FORWARDED_FOR) {
        if let Some(last) = chain.rsplit(',').map(str::trim).find(|s| !s.is_empty()) {
            return last.to_string();
        }
    }

    if let Some(real_ip) = header_str(headers, X_REAL_IP) {
        return real_ip.to_string();
    }

    if let Some(chain) = header_str(headers, X_FORWARDED_FOR) {
        if let Some(first) = chain.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

/// Host and path of the original request.
fn resolve_target(uri: &Uri, headers: &HeaderMap) -> Result<(String, String), ContextError> {
    if let Some(original) = header_str(headers, X_ORIGINAL_URL) {
        let invalid = |reason: String| ContextError::InvalidOriginalUrl {
            url: original.to_string(),
            reason,
        };

        let url = Url::parse(original).map_err(|e| invalid(e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?
            .to_ascii_lowercase();
        return Ok((host, url.path().to_string()));
    }

    let host = uri
        .host()
        .map(str::to_string)
        .or_else(|| header_str(headers, header::HOST.as_str()).map(strip_port))
        .unwrap_or_default()
        .to_ascii_lowercase();

    Ok((host, uri.path().to_string()))
}

fn strip_port(host: &str) -> String {
    // Bracketed IPv6 literal: keep the brackets' content only
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest).to_string();
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name.to_string(),
        _ => host.to_string(),
    }
}
