//! Signature verification boundary for override requests.
//!
//! The engine only consumes the pass/fail verdict; key management and the
//! verify call itself live behind this trait so tests can substitute a
//! double and deployments can swap the scheme.

use ed25519_dalek::{Signature, VerifyingKey};
use std::collections::HashMap;
use std::sync::RwLock;
use tessera_types::UserId;

/// Verifies that an authenticated human authored a state-changing request.
pub trait SignatureVerifier: Send + Sync {
    /// True iff `signature` is a valid detached signature over the exact
    /// serialized request `body` for the acting user's stored key.
    fn verify(&self, user_id: &UserId, body: &[u8], signature: &[u8]) -> bool;
}

/// Default verifier backed by a registry of per-user Ed25519 keys.
#[derive(Default)]
pub struct Ed25519Verifier {
    keys: RwLock<HashMap<UserId, VerifyingKey>>,
}

impl Ed25519Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a user's verifying key.
    pub fn register_key(&self, user_id: UserId, key: VerifyingKey) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(user_id, key);
        }
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, user_id: &UserId, body: &[u8], signature: &[u8]) -> bool {
        let keys = match self.keys.read() {
            Ok(keys) => keys,
            Err(_) => return false,
        };
        let key = match keys.get(user_id) {
            Some(key) => key,
            None => return false,
        };
        let signature = match Signature::from_slice(signature) {
            Ok(signature) => signature,
            Err(_) => return false,
        };
        key.verify_strict(body, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    #[test]
    fn test_round_trip_accepts_and_tamper_rejects() {
        let signing = SigningKey::generate(&mut OsRng);
        let verifier = Ed25519Verifier::new();
        let user = UserId::new("u-1");
        verifier.register_key(user.clone(), signing.verifying_key());

        let body = br#"{"proposal_id":"p-1","reason":"overreach"}"#;
        let signature = signing.sign(body);

        assert!(verifier.verify(&user, body, &signature.to_bytes()));
        assert!(!verifier.verify(&user, b"different body", &signature.to_bytes()));
        assert!(!verifier.verify(&UserId::new("u-2"), body, &signature.to_bytes()));
    }

    #[test]
    fn test_garbage_signature_rejects() {
        let verifier = Ed25519Verifier::new();
        let user = UserId::new("u-1");
        let signing = SigningKey::generate(&mut OsRng);
        verifier.register_key(user.clone(), signing.verifying_key());
        assert!(!verifier.verify(&user, b"body", &[0u8; 7]));
    }
}
