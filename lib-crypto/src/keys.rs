//! Key pairs and recoverable signatures.
//!
//! Claim proofs are 65-byte recoverable ECDSA signatures over a 32-byte
//! digest: 64 compact bytes followed by one recovery-id byte. Recovery of the
//! signing public key from (digest, signature) is what lets the ledger verify
//! a claim without the spender shipping their public key.

use std::fmt;

use rand::rngs::OsRng;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CryptoError, CryptoResult};

/// Length of a serialized recoverable signature
pub const SIGNATURE_LEN: usize = 65;

/// 65-byte recoverable ECDSA signature
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_LEN]);

impl Signature {
    /// Wrap raw signature bytes
    pub const fn new(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a byte slice, checking length
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; SIGNATURE_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self(arr))
    }

    /// Get the underlying bytes
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    fn to_recoverable(self) -> CryptoResult<RecoverableSignature> {
        let recid = RecoveryId::from_i32(i32::from(self.0[64]))?;
        Ok(RecoverableSignature::from_compact(&self.0[..64], recid)?)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0[..8]))
    }
}

// 65-byte arrays fall outside serde's derived-array support, so the signature
// serializes as a length-checked byte sequence.
impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SigVisitor;

        impl<'de> Visitor<'de> for SigVisitor {
            type Value = Signature;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a {SIGNATURE_LEN}-byte signature")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Signature, E> {
                Signature::from_slice(v)
                    .map_err(|_| E::invalid_length(v.len(), &self))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Signature, A::Error> {
                let mut bytes = [0u8; SIGNATURE_LEN];
                for (i, slot) in bytes.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(Signature(bytes))
            }
        }

        deserializer.deserialize_bytes(SigVisitor)
    }
}

/// A secp256k1 key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS entropy source
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut OsRng);
        Self { secret, public }
    }

    /// Reconstruct a key pair from raw private-key bytes
    pub fn from_private_bytes(bytes: &[u8; 32]) -> CryptoResult<Self> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self { secret, public })
    }

    /// The public half
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Raw private-key bytes
    pub fn private_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    /// Address derived from this key pair's public key
    pub fn address(&self) -> lib_types::Address {
        crate::address::address_from_public_key(&self.public)
    }
}

/// Sign a 32-byte digest, producing a recoverable signature
pub fn sign(digest: &[u8; 32], keypair: &KeyPair) -> Signature {
    let secp = Secp256k1::new();
    let msg = Message::from_digest(*digest);
    let sig = secp.sign_ecdsa_recoverable(&msg, &keypair.secret);
    let (recid, compact) = sig.serialize_compact();
    let mut bytes = [0u8; SIGNATURE_LEN];
    bytes[..64].copy_from_slice(&compact);
    bytes[64] = recid.to_i32() as u8;
    Signature(bytes)
}

/// Recover the signing public key from (digest, signature)
pub fn recover_public_key(digest: &[u8; 32], signature: &Signature) -> CryptoResult<PublicKey> {
    let secp = Secp256k1::new();
    let msg = Message::from_digest(*digest);
    let sig = signature.to_recoverable()?;
    secp.recover_ecdsa(&msg, &sig)
        .map_err(|_| CryptoError::RecoveryFailed)
}

/// Verify that `signature` over `digest` was produced by `public_key`
pub fn verify(digest: &[u8; 32], signature: &Signature, public_key: &PublicKey) -> bool {
    matches!(recover_public_key(digest, signature), Ok(recovered) if recovered == *public_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_recover() {
        let keypair = KeyPair::generate();
        let digest = [7u8; 32];

        let sig = sign(&digest, &keypair);
        let recovered = recover_public_key(&digest, &sig).unwrap();
        assert_eq!(recovered, *keypair.public_key());
    }

    #[test]
    fn test_verify_rejects_other_key() {
        let keypair = KeyPair::generate();
        let other = KeyPair::generate();
        let digest = [9u8; 32];

        let sig = sign(&digest, &keypair);
        assert!(verify(&digest, &sig, keypair.public_key()));
        assert!(!verify(&digest, &sig, other.public_key()));
    }

    #[test]
    fn test_recovery_changes_with_digest() {
        let keypair = KeyPair::generate();
        let sig = sign(&[1u8; 32], &keypair);

        // Recovery over a different digest yields a different (or no) key.
        match recover_public_key(&[2u8; 32], &sig) {
            Ok(recovered) => assert_ne!(recovered, *keypair.public_key()),
            Err(e) => assert_eq!(e, CryptoError::RecoveryFailed),
        }
    }

    #[test]
    fn test_from_private_bytes_roundtrip() {
        let keypair = KeyPair::generate();
        let rebuilt = KeyPair::from_private_bytes(&keypair.private_bytes()).unwrap();
        assert_eq!(rebuilt.public_key(), keypair.public_key());
        assert_eq!(rebuilt.address(), keypair.address());
    }

    #[test]
    fn test_invalid_private_bytes_rejected() {
        // All-zero bytes are outside the valid secret key range
        let result = KeyPair::from_private_bytes(&[0u8; 32]);
        assert_eq!(result.unwrap_err(), CryptoError::InvalidPrivateKey);
    }

    #[test]
    fn test_signature_serde_roundtrip() {
        let keypair = KeyPair::generate();
        let sig = sign(&[3u8; 32], &keypair);

        let encoded = bincode::serialize(&sig).unwrap();
        let decoded: Signature = bincode::deserialize(&encoded).unwrap();
        assert_eq!(sig, decoded);
    }

    #[test]
    fn test_signature_from_slice_length_checked() {
        assert!(Signature::from_slice(&[0u8; 64]).is_err());
        assert!(Signature::from_slice(&[0u8; 65]).is_ok());
    }
}
