//! Withdraw authorisations signed with the validator key.

use super::{Result, ValidatorError};
use ethers::types::Address;
use num_bigint::BigUint;
use secp256k1::{ecdsa::RecoverableSignature, Message, PublicKey, Secp256k1, SecretKey, Signing};
use sha3::{Digest, Keccak256};

pub const SIGNATURE_LENGTH: usize = 65;

/// keccak256(address || amount || nonce), amount as minimal big-endian
/// bytes (empty for zero), nonce as 8 big-endian bytes
pub fn withdraw_digest(address: &Address, amount: &BigUint, nonce: u64) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(address.as_bytes());
    if *amount != BigUint::from(0u8) {
        hasher.update(amount.to_bytes_be());
    }
    hasher.update(nonce.to_be_bytes());
    hasher.finalize().into()
}

/// Recoverable signature as `r || s || v`, `v` in {0, 1}
pub fn sign_digest<C: Signing>(
    secp: &Secp256k1<C>,
    secret_key: &SecretKey,
    digest: [u8; 32],
) -> Result<[u8; SIGNATURE_LENGTH]> {
    let message = Message::from_digest(digest);
    let signature: RecoverableSignature = secp.sign_ecdsa_recoverable(&message, secret_key);
    let (recovery_id, compact) = signature.serialize_compact();

    let v = u8::try_from(recovery_id.to_i32())
        .map_err(|_| ValidatorError::Signing(format!("bad recovery id {:?}", recovery_id)))?;

    let mut out = [0u8; SIGNATURE_LENGTH];
    out[..64].copy_from_slice(&compact);
    out[64] = v;
    Ok(out)
}

/// Ethereum address of a secp256k1 key
pub fn address_of<C: Signing>(secp: &Secp256k1<C>, secret_key: &SecretKey) -> Address {
    let public = PublicKey::from_secret_key(secp, secret_key).serialize_uncompressed();
    let hash = Keccak256::digest(&public[1..]);
    Address::from_slice(&hash[12..])
}
