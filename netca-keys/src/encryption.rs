//! ECIES over P-256 for HD keys.
//!
//! Envelope layout: `ephemeral public key (65, SEC1 uncompressed) || nonce (12) ||
//! AES-256-GCM ciphertext with tag`. The AES key is HKDF-SHA-256 over the ECDH
//! shared secret.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use hkdf::Hkdf;
use p256::ecdh::{diffie_hellman, EphemeralSecret};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{KeyError, Result};
use crate::hd::{derive_node_key, HdPrivateKey, HdPublicKey};

pub const SYMMETRIC_KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
const EPHEMERAL_KEY_LEN: usize = 65;
const TAG_LEN: usize = 16;
pub const ENVELOPE_OVERHEAD: usize = EPHEMERAL_KEY_LEN + NONCE_LEN + TAG_LEN;

const ECIES_INFO: &[u8] = b"netca-hd-encryption";

/// Encrypt `plaintext` to the holder of the private key behind `recipient`.
pub fn encrypt_for_public_key(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let ephemeral_secret = EphemeralSecret::random(&mut OsRng);
    let ephemeral_public = ephemeral_secret.public_key();

    let shared_secret = ephemeral_secret.diffie_hellman(recipient);
    let key = expand_key(shared_secret.raw_secret_bytes().as_slice())?;

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| KeyError::EncryptionError(format!("AES init failed: {e}")))?;
    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| KeyError::EncryptionError(format!("nonce generation failed: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| KeyError::EncryptionError(format!("AES-GCM encryption failed: {e}")))?;

    let mut out = Vec::with_capacity(ENVELOPE_OVERHEAD + plaintext.len());
    out.extend_from_slice(ephemeral_public.to_encoded_point(false).as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Encrypt to an HD public key (typically a node's derived key).
pub fn encrypt_for_hd_public_key(recipient: &HdPublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    encrypt_for_public_key(recipient.point(), plaintext)
}

/// Decrypt an envelope with a P-256 private key.
pub fn decrypt_with_secret_key(secret: &SecretKey, envelope: &[u8]) -> Result<Vec<u8>> {
    if envelope.len() < ENVELOPE_OVERHEAD {
        return Err(KeyError::MalformedCiphertext(format!(
            "envelope is {} bytes, minimum is {ENVELOPE_OVERHEAD}",
            envelope.len()
        )));
    }

    let (ephemeral_bytes, rest) = envelope.split_at(EPHEMERAL_KEY_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let ephemeral_public = PublicKey::from_sec1_bytes(ephemeral_bytes).map_err(|e| {
        KeyError::MalformedCiphertext(format!("invalid ephemeral public key: {e}"))
    })?;

    let shared_secret = diffie_hellman(secret.to_nonzero_scalar(), ephemeral_public.as_affine());
    let key = expand_key(shared_secret.raw_secret_bytes().as_slice())?;

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| KeyError::DecryptionError(format!("AES init failed: {e}")))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| KeyError::DecryptionError(format!("AES-GCM decryption failed: {e}")))
}

/// Find the private key under `root` that matches `counterparty` and decrypt with it.
///
/// Depth 0 public keys must be the root itself; depth 1 public keys are
/// re-derived at their index. Deeper paths are not issued by this CA.
pub fn decrypt_with_derived_key(
    root: &HdPrivateKey,
    counterparty: &HdPublicKey,
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let candidate = match counterparty.depth() {
        0 => root.clone(),
        1 => derive_node_key(root, counterparty.index())?,
        depth => {
            return Err(KeyError::DecryptionError(format!(
                "no derivation path for public key at depth {depth}"
            )))
        }
    };

    if candidate.public_key().point() != counterparty.point() {
        return Err(KeyError::DecryptionError(format!(
            "public key at index {} is not derived from this root",
            counterparty.index()
        )));
    }

    decrypt_with_secret_key(candidate.secret_key(), ciphertext)
}

fn expand_key(shared_secret: &[u8]) -> Result<[u8; SYMMETRIC_KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = [0u8; SYMMETRIC_KEY_LEN];
    hk.expand(ECIES_INFO, &mut key)?;
    Ok(key)
}
