//! Deposit-metadata signature scheme.
//!
//! A participant authorizes a deposit by signing the packed encoding of
//! `(sender, amount, enc_recipient, pub_key)` with the ledger account key
//! of `sender`. The operator recovers the signer from the 65-byte
//! signature and rejects the submission when it does not match `sender`.
//!
//! # Message encoding
//!
//! ```text
//! sender (20 bytes)
//! || amount (u128, big-endian, 16 bytes)
//! || len(enc_recipient) (u32, big-endian) || enc_recipient
//! || len(pub_key) (u32, big-endian) || pub_key
//! ```
//!
//! # Digest
//!
//! `keccak256("\x19Ethereum Signed Message:\n32" || keccak256(message))`,
//! the prefix wallet software applies when signing a 32-byte hash, so
//! signatures produced by standard ledger wallets verify here.
//!
//! # Signature format
//!
//! 65 bytes `r || s || v`. Recovery accepts `v` in {0, 1, 27, 28}.

use crate::objects::Address;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use sha3::{Digest, Keccak256};

pub use k256::ecdsa::SigningKey;

/// Prefix applied to the message hash before the final digest.
const SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Length of a recoverable signature on the wire.
pub const SIGNATURE_LEN: usize = 65;

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("expected {SIGNATURE_LEN}-byte signature, got {0}")]
    InvalidLength(usize),
    #[error("invalid recovery id {0}")]
    InvalidRecoveryId(u8),
    #[error("malformed signature")]
    Malformed,
    #[error("signer recovery failed")]
    Recovery,
    #[error("signing failed")]
    Signing,
}

/// Build the packed deposit message.
pub fn build_deposit_message(
    sender: &Address,
    amount: u128,
    enc_recipient: &[u8],
    pub_key: &[u8],
) -> Vec<u8> {
    let mut message =
        Vec::with_capacity(20 + 16 + 4 + enc_recipient.len() + 4 + pub_key.len());
    message.extend_from_slice(sender.as_bytes());
    message.extend_from_slice(&amount.to_be_bytes());
    message.extend_from_slice(&(enc_recipient.len() as u32).to_be_bytes());
    message.extend_from_slice(enc_recipient);
    message.extend_from_slice(&(pub_key.len() as u32).to_be_bytes());
    message.extend_from_slice(pub_key);
    message
}

/// Compute the prefixed digest a wallet signs for the given message.
pub fn deposit_digest(message: &[u8]) -> [u8; 32] {
    let inner: [u8; 32] = Keccak256::digest(message).into();
    let mut hasher = Keccak256::new();
    hasher.update(SIGNED_MESSAGE_PREFIX);
    hasher.update(inner);
    hasher.finalize().into()
}

/// Sign deposit metadata, returning the 65-byte `r || s || v` signature
/// with `v` in {27, 28}.
pub fn sign_deposit(
    signing_key: &SigningKey,
    sender: &Address,
    amount: u128,
    enc_recipient: &[u8],
    pub_key: &[u8],
) -> Result<Vec<u8>, SignatureError> {
    let digest = deposit_digest(&build_deposit_message(sender, amount, enc_recipient, pub_key));
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(&digest)
        .map_err(|_| SignatureError::Signing)?;
    let mut out = Vec::with_capacity(SIGNATURE_LEN);
    out.extend_from_slice(&signature.to_bytes());
    out.push(recovery_id.to_byte() + 27);
    Ok(out)
}

/// Recover the signer address of a deposit-metadata signature.
///
/// The caller compares the result against the claimed `sender`; a mismatch
/// means the submission is not authentic.
pub fn recover_deposit_signer(
    signature: &[u8],
    sender: &Address,
    amount: u128,
    enc_recipient: &[u8],
    pub_key: &[u8],
) -> Result<Address, SignatureError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(SignatureError::InvalidLength(signature.len()));
    }
    let v = signature[64];
    let recovery_byte = match v {
        27 | 28 => v - 27,
        0 | 1 => v,
        other => return Err(SignatureError::InvalidRecoveryId(other)),
    };
    let recovery_id =
        RecoveryId::from_byte(recovery_byte).ok_or(SignatureError::InvalidRecoveryId(v))?;
    let ecdsa_sig =
        EcdsaSignature::from_slice(&signature[..64]).map_err(|_| SignatureError::Malformed)?;

    let digest = deposit_digest(&build_deposit_message(sender, amount, enc_recipient, pub_key));
    let verifying_key = VerifyingKey::recover_from_prehash(&digest, &ecdsa_sig, recovery_id)
        .map_err(|_| SignatureError::Recovery)?;
    Ok(verifying_key_to_address(&verifying_key))
}

/// Derive the ledger address of a verifying key: the last 20 bytes of the
/// keccak256 of the uncompressed point (without the 0x04 tag).
pub fn verifying_key_to_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash: [u8; 32] = Keccak256::digest(&point.as_bytes()[1..]).into();
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(seed: u8) -> SigningKey {
        let mut bytes = [seed; 32];
        // Keep the scalar inside the curve order.
        bytes[0] = 0x01;
        SigningKey::from_slice(&bytes).unwrap()
    }

    fn address_of(key: &SigningKey) -> Address {
        verifying_key_to_address(key.verifying_key())
    }

    #[test]
    fn sign_then_recover() {
        let key = test_key(0x11);
        let sender = address_of(&key);
        let enc_recipient = vec![0xaa; 70];
        let pub_key = vec![0x02; 33];

        let sig = sign_deposit(&key, &sender, 10, &enc_recipient, &pub_key).unwrap();
        assert_eq!(sig.len(), SIGNATURE_LEN);
        assert!(sig[64] == 27 || sig[64] == 28);

        let recovered =
            recover_deposit_signer(&sig, &sender, 10, &enc_recipient, &pub_key).unwrap();
        assert_eq!(recovered, sender);
    }

    #[test]
    fn recovery_accepts_both_v_conventions() {
        let key = test_key(0x22);
        let sender = address_of(&key);
        let mut sig = sign_deposit(&key, &sender, 42, b"r", b"k").unwrap();

        let recovered = recover_deposit_signer(&sig, &sender, 42, b"r", b"k").unwrap();
        assert_eq!(recovered, sender);

        // Same signature with v expressed as 0/1.
        sig[64] -= 27;
        let recovered = recover_deposit_signer(&sig, &sender, 42, b"r", b"k").unwrap();
        assert_eq!(recovered, sender);
    }

    #[test]
    fn tampered_message_recovers_different_signer() {
        let key = test_key(0x33);
        let sender = address_of(&key);
        let sig = sign_deposit(&key, &sender, 10, b"recipient", b"key").unwrap();

        // A different amount yields a different digest, so recovery either
        // fails or produces an address that is not the sender.
        match recover_deposit_signer(&sig, &sender, 11, b"recipient", b"key") {
            Ok(recovered) => assert_ne!(recovered, sender),
            Err(SignatureError::Recovery) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_malformed_signatures() {
        let sender = Address([0x01; 20]);
        assert!(matches!(
            recover_deposit_signer(&[0u8; 64], &sender, 1, b"", b""),
            Err(SignatureError::InvalidLength(64))
        ));

        let mut sig = vec![0u8; 65];
        sig[64] = 29;
        assert!(matches!(
            recover_deposit_signer(&sig, &sender, 1, b"", b""),
            Err(SignatureError::InvalidRecoveryId(29))
        ));
    }

    #[test]
    fn message_encoding_is_unambiguous() {
        // Moving a byte across the length-prefixed field boundary must
        // change the encoding.
        let sender = Address([0u8; 20]);
        let a = build_deposit_message(&sender, 1, b"ab", b"c");
        let b = build_deposit_message(&sender, 1, b"a", b"bc");
        assert_ne!(a, b);
    }
}
