//! Address derivation.
//!
//! BLAKE3 is the canonical hash for everything address-shaped: an address is
//! the first 20 bytes of BLAKE3 over the hashed material. Applied to a
//! serialized public key this yields an account address; applied to a
//! transaction hash it yields the address of the contract that transaction
//! deploys.

use lib_types::Address;
use secp256k1::PublicKey;

/// Derive an address from arbitrary material
pub fn get_address(data: &[u8]) -> Address {
    let digest: [u8; 32] = blake3::hash(data).into();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[..20]);
    Address::new(bytes)
}

/// Derive an address from a public key (compressed serialization)
pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    get_address(&public_key.serialize())
}
