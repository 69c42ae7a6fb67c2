//! ECDSA P-256 signing with the wallet identity's key

use crate::error::{WithdrawError, WithdrawResult};

use p256::ecdsa::signature::Signer as _;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::DecodePrivateKey;

/// Signs proposal bytes with a PKCS#8 private key
#[derive(Clone)]
pub struct Signer {
    key: SigningKey,
}

impl Signer {
    /// Parse a PEM encoded PKCS#8 key
    pub fn from_pem(pem: &str) -> WithdrawResult<Self> {
        let key = SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| WithdrawError::Signing(format!("Invalid private key: {}", e)))?;
        Ok(Self { key })
    }

    /// SHA-256 / ECDSA signature in DER form. The network only accepts the
    /// low-S form, so high-S signatures are normalized.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.key.sign(message);
        let signature = signature.normalize_s().unwrap_or(signature);
        signature.to_der().as_bytes().to_vec()
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.key.verifying_key()
    }
}
