//! Crypto facade errors

use thiserror::Error;

/// Error during a cryptographic operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid private key bytes")]
    InvalidPrivateKey,

    #[error("Invalid signature encoding")]
    InvalidSignature,

    #[error("Public key recovery failed")]
    RecoveryFailed,
}

impl From<secp256k1::Error> for CryptoError {
    fn from(e: secp256k1::Error) -> Self {
        match e {
            secp256k1::Error::InvalidSecretKey => CryptoError::InvalidPrivateKey,
            secp256k1::Error::InvalidSignature | secp256k1::Error::InvalidRecoveryId => {
                CryptoError::InvalidSignature
            }
            _ => CryptoError::RecoveryFailed,
        }
    }
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;
