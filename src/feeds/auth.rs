//! Upstream Request Signing
//!
//! The exchange authenticates WebSocket upgrades by an RSA-PSS SHA-256
//! signature over `timestamp || method || path`, delivered in three
//! headers. Credentials are loaded once at session start; nothing here is
//! mutated at runtime.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::Pss;
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};

pub const ACCESS_KEY_HEADER: &str = "KALSHI-ACCESS-KEY";
pub const ACCESS_SIGNATURE_HEADER: &str = "KALSHI-ACCESS-SIGNATURE";
pub const ACCESS_TIMESTAMP_HEADER: &str = "KALSHI-ACCESS-TIMESTAMP";

pub struct RequestSigner {
    key_id: String,
    key: RsaPrivateKey,
}

impl RequestSigner {
    pub fn new(key_id: String, private_key_pem: &str) -> Result<Self> {
        // Keys in the wild come in both PKCS#8 and PKCS#1 wrapping.
        let key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_key_pem))
            .context("Failed to parse RSA private key PEM")?;

        Ok(Self { key_id, key })
    }

    /// Load credentials from the environment; `None` when unconfigured
    /// (public feeds work unauthenticated).
    pub fn from_env() -> Result<Option<Self>> {
        let key_id = match std::env::var("FEED_API_KEY_ID") {
            Ok(v) if !v.trim().is_empty() => v,
            _ => return Ok(None),
        };
        let pem_path = std::env::var("FEED_PRIVATE_KEY_PATH")
            .context("FEED_API_KEY_ID set but FEED_PRIVATE_KEY_PATH missing")?;
        let pem = std::fs::read_to_string(&pem_path)
            .with_context(|| format!("Failed to read private key at {}", pem_path))?;

        Ok(Some(Self::new(key_id, &pem)?))
    }

    /// Base64 RSA-PSS SHA-256 signature over `timestamp || method || path`.
    pub fn sign(&self, timestamp_ms: i64, method: &str, path: &str) -> Result<String> {
        let message = format!("{}{}{}", timestamp_ms, method, path);
        let digest = Sha256::digest(message.as_bytes());

        let signature = self
            .key
            .sign_with_rng(&mut rand::thread_rng(), Pss::new::<Sha256>(), &digest)
            .context("RSA-PSS signing failed")?;

        Ok(BASE64.encode(signature))
    }

    /// The three auth headers for one request.
    pub fn headers(
        &self,
        timestamp_ms: i64,
        method: &str,
        path: &str,
    ) -> Result<[(&'static str, String); 3]> {
        let signature = self.sign(timestamp_ms, method, path)?;
        Ok([
            (ACCESS_KEY_HEADER, self.key_id.clone()),
            (ACCESS_SIGNATURE_HEADER, signature),
            (ACCESS_TIMESTAMP_HEADER, timestamp_ms.to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_verifies_against_public_key() {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let public = key.to_public_key();
        let signer = RequestSigner {
            key_id: "key-1".to_string(),
            key,
        };

        let ts = 1_700_000_000_000i64;
        let sig_b64 = signer.sign(ts, "GET", "/trade-api/ws/v2").unwrap();
        let sig = BASE64.decode(sig_b64).unwrap();

        let message = format!("{}GET{}", ts, "/trade-api/ws/v2");
        let digest = Sha256::digest(message.as_bytes());
        public
            .verify(Pss::new::<Sha256>(), &digest, &sig)
            .expect("signature must verify");
    }

    #[test]
    fn headers_carry_key_signature_timestamp() {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let signer = RequestSigner {
            key_id: "key-1".to_string(),
            key,
        };

        let headers = signer.headers(42, "GET", "/trade-api/ws/v2").unwrap();
        assert_eq!(headers[0], (ACCESS_KEY_HEADER, "key-1".to_string()));
        assert_eq!(headers[2].1, "42");
        assert!(!headers[1].1.is_empty());
    }
}
