//! Device identity for handshake signing
//!
//! An Ed25519 keypair proving client identity independent of the bearer
//! token. The signature covers a canonical pipe-delimited payload so the
//! gateway can re-derive and verify it byte for byte; when a challenge
//! nonce is present the signature is bound to that one session.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{Signer, SigningKey};

use crate::protocol::DeviceAuth;

/// Version tag of the canonical signing payload
pub const SIGNING_VERSION: &str = "v1";

/// Ed25519 device identity
#[derive(Clone)]
pub struct DeviceIdentity {
    signing_key: SigningKey,
}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never prints key material
        f.debug_struct("DeviceIdentity")
            .field("device_id", &self.device_id())
            .finish()
    }
}

impl DeviceIdentity {
    /// Generate a fresh identity
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        DeviceIdentity { signing_key }
    }

    /// Restore an identity from its 32 secret-key bytes
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        DeviceIdentity {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// Export the 32 secret-key bytes for persistence by the caller
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Device id: lowercase hex of the public key
    pub fn device_id(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Base64-encoded public key, as the gateway expects it
    pub fn public_key_b64(&self) -> String {
        BASE64.encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Build a signed [`DeviceAuth`] block for the `connect` request
    ///
    /// `token` signs as the empty string when no bearer token is
    /// configured, keeping field positions stable. `nonce` is included
    /// only when the gateway issued a challenge for this session.
    #[allow(clippy::too_many_arguments)]
    pub fn authorize(
        &self,
        client_id: &str,
        client_mode: &str,
        role: &str,
        scopes: &[String],
        token: Option<&str>,
        nonce: Option<&str>,
        signed_at: i64,
    ) -> DeviceAuth {
        let payload = canonical_payload(
            &self.device_id(),
            client_id,
            client_mode,
            role,
            scopes,
            token.unwrap_or(""),
            signed_at,
            nonce,
        );
        let signature = self.signing_key.sign(payload.as_bytes());

        DeviceAuth {
            id: self.device_id(),
            public_key: self.public_key_b64(),
            signature: BASE64.encode(signature.to_bytes()),
            signed_at,
            nonce: nonce.map(str::to_string),
        }
    }
}

/// Canonical pipe-delimited payload covered by the device signature
#[allow(clippy::too_many_arguments)]
fn canonical_payload(
    device_id: &str,
    client_id: &str,
    client_mode: &str,
    role: &str,
    scopes: &[String],
    token: &str,
    signed_at: i64,
    nonce: Option<&str>,
) -> String {
    let mut parts = vec![
        SIGNING_VERSION.to_string(),
        device_id.to_string(),
        client_id.to_string(),
        client_mode.to_string(),
        role.to_string(),
        scopes.join(","),
        signed_at.to_string(),
        token.to_string(),
    ];
    if let Some(nonce) = nonce {
        parts.push(nonce.to_string());
    }
    parts.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    fn scopes() -> Vec<String> {
        vec!["chat".to_string(), "admin".to_string()]
    }

    #[test]
    fn test_identity_roundtrip() {
        let identity = DeviceIdentity::generate();
        let restored = DeviceIdentity::from_secret_bytes(&identity.secret_bytes());
        assert_eq!(identity.device_id(), restored.device_id());
        assert_eq!(identity.public_key_b64(), restored.public_key_b64());
    }

    #[test]
    fn test_canonical_payload_layout() {
        let payload = canonical_payload(
            "dev", "paw", "ui", "operator", &scopes(), "tok", 1234, Some("n0"),
        );
        assert_eq!(payload, "v1|dev|paw|ui|operator|chat,admin|1234|tok|n0");

        let without_nonce =
            canonical_payload("dev", "paw", "ui", "operator", &scopes(), "", 1234, None);
        assert_eq!(without_nonce, "v1|dev|paw|ui|operator|chat,admin|1234|");
    }

    #[test]
    fn test_signature_verifies() {
        let identity = DeviceIdentity::generate();
        let auth = identity.authorize(
            "paw",
            "ui",
            "operator",
            &scopes(),
            Some("tok"),
            Some("nonce-1"),
            1_700_000_000_000,
        );

        assert_eq!(auth.id, identity.device_id());
        assert_eq!(auth.nonce.as_deref(), Some("nonce-1"));

        let key_bytes: [u8; 32] = BASE64
            .decode(&auth.public_key)
            .unwrap()
            .try_into()
            .unwrap();
        let key = VerifyingKey::from_bytes(&key_bytes).unwrap();
        let sig_bytes: [u8; 64] = BASE64
            .decode(&auth.signature)
            .unwrap()
            .try_into()
            .unwrap();
        let signature = Signature::from_bytes(&sig_bytes);

        let payload = canonical_payload(
            &auth.id,
            "paw",
            "ui",
            "operator",
            &scopes(),
            "tok",
            auth.signed_at,
            auth.nonce.as_deref(),
        );
        assert!(key.verify(payload.as_bytes(), &signature).is_ok());
    }

    #[test]
    fn test_distinct_nonces_yield_distinct_signatures() {
        let identity = DeviceIdentity::generate();
        let first = identity.authorize("paw", "ui", "operator", &scopes(), None, Some("a"), 1);
        let second = identity.authorize("paw", "ui", "operator", &scopes(), None, Some("b"), 1);
        assert_ne!(first.signature, second.signature);
    }
}
