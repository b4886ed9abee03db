//! EIP-191 `personal_sign` signature recovery.

use std::sync::OnceLock;

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use lockgate_core::{Address, keccak256, keccak256_concat};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature is not hex: {0}")]
    NotHex(String),
    #[error("signature must be 65 bytes, got {0}")]
    BadLength(usize),
    #[error("invalid recovery id {0}")]
    BadRecoveryId(u8),
    #[error("public key recovery failed: {0}")]
    Recovery(String),
}

fn context() -> &'static Secp256k1<All> {
    static CTX: OnceLock<Secp256k1<All>> = OnceLock::new();
    CTX.get_or_init(Secp256k1::new)
}

/// keccak256("\x19Ethereum Signed Message:\n" || len(message) || message)
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    keccak256_concat(&[prefix.as_bytes(), message])
}

pub fn address_of(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    Address::from_word(&keccak256(&uncompressed[1..]))
}

/// Recover the address that produced `signature` (hex `r || s || v`) over `message`.
pub fn recover_personal_signer(message: &[u8], signature: &str) -> Result<Address, SignatureError> {
    let raw = signature.trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(raw).map_err(|e| SignatureError::NotHex(e.to_string()))?;
    if bytes.len() != 65 {
        return Err(SignatureError::BadLength(bytes.len()));
    }

    let v = bytes[64];
    let recovery = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => return Err(SignatureError::BadRecoveryId(other)),
    };
    let recovery_id = RecoveryId::from_i32(i32::from(recovery))
        .map_err(|_| SignatureError::BadRecoveryId(v))?;
    let sig = RecoverableSignature::from_compact(&bytes[..64], recovery_id)
        .map_err(|e| SignatureError::Recovery(e.to_string()))?;

    let digest = Message::from_digest(personal_message_hash(message));
    let public_key = context()
        .recover_ecdsa(&digest, &sig)
        .map_err(|e| SignatureError::Recovery(e.to_string()))?;

    Ok(address_of(&public_key))
}

/// Produce a `personal_sign` signature (hex, `v` in {27, 28}).
///
/// The server never signs on a user's behalf; this exists for client tooling
/// and tests.
pub fn sign_personal_message(secret_key: &SecretKey, message: &[u8]) -> String {
    let digest = Message::from_digest(personal_message_hash(message));
    let (recovery_id, compact) = context()
        .sign_ecdsa_recoverable(&digest, secret_key)
        .serialize_compact();

    let mut bytes = Vec::with_capacity(65);
    bytes.extend_from_slice(&compact);
    bytes.push(27 + recovery_id.to_i32() as u8);
    format!("0x{}", hex::encode(bytes))
}

pub fn address_of_secret(secret_key: &SecretKey) -> Address {
    address_of(&PublicKey::from_secret_key(context(), secret_key))
}
