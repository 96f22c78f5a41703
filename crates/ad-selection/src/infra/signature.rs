//! Verification of contextual ad bundles signed by their buyer.

use {
    crate::domain::{audience::AdTechIdentifier, contextual::ContextualAdBundle},
    ed25519_dalek::{Signature, Verifier, VerifyingKey},
    std::collections::HashMap,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BuyerKeyFetcher: Send + Sync {
    /// The public keys a buyer currently signs with.
    async fn keys(&self, buyer: &AdTechIdentifier) -> anyhow::Result<Vec<Vec<u8>>>;
}

#[cfg_attr(test, mockall::automock)]
pub trait SignatureVerifier: Send + Sync {
    /// Whether the bundle was signed by any of the keys.
    fn verify(&self, bundle: &ContextualAdBundle, keys: &[Vec<u8>]) -> bool;
}

/// Ed25519 signatures over [`ContextualAdBundle::signed_payload`].
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, bundle: &ContextualAdBundle, keys: &[Vec<u8>]) -> bool {
        let Ok(signature) = Signature::from_slice(&bundle.signature) else {
            return false;
        };
        let Ok(payload) = bundle.signed_payload() else {
            return false;
        };
        keys.iter()
            .filter_map(|key| VerifyingKey::try_from(key.as_slice()).ok())
            .any(|key| key.verify(&payload, &signature).is_ok())
    }
}

/// Keys known up front, typically from enrollment data.
#[derive(Debug, Default)]
pub struct StaticKeys(pub HashMap<AdTechIdentifier, Vec<Vec<u8>>>);

#[async_trait::async_trait]
impl BuyerKeyFetcher for StaticKeys {
    async fn keys(&self, buyer: &AdTechIdentifier) -> anyhow::Result<Vec<Vec<u8>>> {
        self.0
            .get(buyer)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no signing keys for buyer {buyer}"))
    }
}
