//! Signed transport envelope.
//!
//! Every delivery attempt carries a fresh envelope: a unix timestamp, a
//! single-use nonce and an HMAC-SHA256 signature over
//!
//! ```text
//! timestamp "\n" nonce "\n" raw_body
//! ```
//!
//! hex encoded in lowercase. The receiver recomputes the signature over the
//! exact bytes it received and compares in constant time.
//!
//! ```rust
//! use protocol::envelope::{sign, verify};
//!
//! let sig = sign(b"s3cret", 1_700_000_000, "abc", b"{}");
//! assert!(verify(b"s3cret", 1_700_000_000, "abc", b"{}", &sig));
//! assert!(!verify(b"s3cret", 1_700_000_001, "abc", b"{}", &sig));
//! ```

use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Request header carrying the unix timestamp (seconds).
pub const HEADER_TIMESTAMP: &str = "x-timestamp";
/// Request header carrying the single-use nonce.
pub const HEADER_NONCE: &str = "x-nonce";
/// Request header carrying the hex HMAC signature.
pub const HEADER_SIGNATURE: &str = "x-signature";
/// Request header naming the sending site's host. Used only as a loop guard.
pub const HEADER_ORIGIN_HOST: &str = "x-origin-host";

/// Length of generated nonces.
pub const NONCE_LEN: usize = 24;

/// Compute the hex signature for one body.
pub fn sign(secret: &[u8], timestamp: i64, nonce: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b"\n");
    mac.update(nonce.as_bytes());
    mac.update(b"\n");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a signature in constant time.
///
/// A zero timestamp, an empty nonce or an empty signature never verify.
pub fn verify(secret: &[u8], timestamp: i64, nonce: &str, body: &[u8], signature: &str) -> bool {
    if timestamp == 0 || nonce.is_empty() || signature.is_empty() {
        return false;
    }
    let expected = sign(secret, timestamp, nonce, body);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// Draw a fresh alphanumeric nonce from the thread-local CSPRNG.
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// Authentication material for exactly one raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEnvelope {
    pub timestamp: i64,
    pub nonce: String,
    pub signature: String,
    pub origin_host: Option<String>,
}

impl TransportEnvelope {
    /// Sign `body` with a freshly generated nonce at `timestamp`.
    pub fn seal(secret: &[u8], body: &[u8], origin_host: Option<&str>, timestamp: i64) -> Self {
        let nonce = generate_nonce();
        let signature = sign(secret, timestamp, &nonce, body);
        Self {
            timestamp,
            nonce,
            signature,
            origin_host: origin_host
                .filter(|h| !h.is_empty())
                .map(str::to_string),
        }
    }

    /// Rebuild an envelope from request headers.
    ///
    /// Missing headers become empty values (timestamp 0) so that verification
    /// rejects them without a separate code path.
    pub fn from_headers<'a, F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let timestamp = lookup(HEADER_TIMESTAMP)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(0);
        let text = |name: &str| lookup(name).map(|v| v.trim().to_string()).unwrap_or_default();
        let origin_host = text(HEADER_ORIGIN_HOST);
        Self {
            timestamp,
            nonce: text(HEADER_NONCE),
            signature: text(HEADER_SIGNATURE),
            origin_host: (!origin_host.is_empty()).then_some(origin_host),
        }
    }

    /// Header pairs to attach to the outbound request.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (HEADER_TIMESTAMP, self.timestamp.to_string()),
            (HEADER_NONCE, self.nonce.clone()),
            (HEADER_SIGNATURE, self.signature.clone()),
        ];
        if let Some(host) = &self.origin_host {
            headers.push((HEADER_ORIGIN_HOST, host.clone()));
        }
        headers
    }

    pub fn verify(&self, secret: &[u8], body: &[u8]) -> bool {
        verify(secret, self.timestamp, &self.nonce, body, &self.signature)
    }
}
