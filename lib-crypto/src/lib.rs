//! Crypto facade for the concilium ledger core.
//!
//! The ledger consumes exactly this surface: recoverable ECDSA claim
//! signatures, public-key recovery, and BLAKE3-based address derivation.
//! Everything else about key custody lives outside the core.

pub mod address;
pub mod error;
pub mod keys;

pub use address::{address_from_public_key, get_address};
pub use error::{CryptoError, CryptoResult};
pub use keys::{recover_public_key, sign, verify, KeyPair, Signature, SIGNATURE_LEN};

pub use secp256k1::PublicKey;
