//! RFC 6455 opening handshake (server role)
//!
//! Extracts and checks the `Sec-WebSocket-Key` from an upgrade request and
//! derives `Sec-WebSocket-Accept` as `base64(sha1(key ++ GUID))`.

use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::error::HandshakeError;

/// Fixed GUID appended to the client key (RFC 6455 §1.3)
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Decoded length of a well-formed `Sec-WebSocket-Key`
const NONCE_LEN: usize = 16;

/// Request line and headers of an HTTP upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Case-insensitive header lookup; first occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True when the `Upgrade` header names the websocket protocol.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("Upgrade")
            .map(|v| {
                v.split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("websocket"))
            })
            .unwrap_or(false)
    }

    /// The client nonce, checked to be Base64 of 16 bytes.
    pub fn websocket_key(&self) -> Result<&str, HandshakeError> {
        let key = self
            .header("Sec-WebSocket-Key")
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(HandshakeError::MissingKey)?;

        validate_key(key)?;
        Ok(key)
    }
}

impl<B> From<&Request<B>> for UpgradeRequest {
    fn from(request: &Request<B>) -> Self {
        let headers = request
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).trim().to_string(),
                )
            })
            .collect();

        Self {
            method: request.method().as_str().to_string(),
            path: request.uri().path().to_string(),
            headers,
        }
    }
}

/// Reject keys that are not the Base64 encoding of a 16-byte nonce.
pub fn validate_key(key: &str) -> Result<(), HandshakeError> {
    match STANDARD.decode(key) {
        Ok(nonce) if nonce.len() == NONCE_LEN => Ok(()),
        Ok(nonce) => Err(HandshakeError::InvalidKey(format!(
            "decoded to {} bytes, expected {}",
            nonce.len(),
            NONCE_LEN
        ))),
        Err(e) => Err(HandshakeError::InvalidKey(e.to_string())),
    }
}

/// Compute `Sec-WebSocket-Accept` for a client key.
pub fn derive_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// `101 Switching Protocols` for the HTTP service to send before the upgrade.
pub fn switching_protocols<B: Default>(accept_key: &str) -> Result<Response<B>, HandshakeError> {
    let accept = HeaderValue::from_str(accept_key)
        .map_err(|e| HandshakeError::InvalidKey(e.to_string()))?;

    let mut response = Response::new(B::default());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    Ok(response)
}

/// The literal `101 Switching Protocols` response, blank line included.
pub fn switching_protocols_response(accept_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_key
    )
}
