use crate::error::KeyError;
use hkdf::Hkdf;
use p256::SecretKey as P256SecretKey;
use sha2::Sha256;

/// Default salt used when the caller has no chain code to key HKDF with.
pub const DEFAULT_DERIVATION_SALT: &[u8] = b"NetCaKeyDerivationSalt/v1";

/// Derive a P-256 private key from input key material using HKDF-SHA-256.
/// - salt: chain code of the parent key (or [`DEFAULT_DERIVATION_SALT`])
/// - ikm: raw 32-byte scalar of the parent key
/// - label: info label base, counter will be appended if retries are needed
pub fn derive_scalar(salt: &[u8], ikm: &[u8], label: &[u8]) -> Result<P256SecretKey, KeyError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut counter: u32 = 0;
    loop {
        let mut info = label.to_vec();
        if counter != 0 {
            info.extend_from_slice(b":");
            info.extend_from_slice(counter.to_string().as_bytes());
        }
        let mut candidate = [0u8; 32];
        hk.expand(&info, &mut candidate)
            .map_err(|e| KeyError::KeyDerivationError(format!("HKDF expansion failed: {e}")))?;
        match P256SecretKey::from_slice(&candidate) {
            Ok(sk) => return Ok(sk),
            Err(_) => {
                // zero or >= curve order; astronomically rare
                counter = counter.checked_add(1).ok_or_else(|| {
                    KeyError::KeyDerivationError("exhausted scalar candidates".to_string())
                })?;
                continue;
            }
        }
    }
}

/// Expand `N` bytes of auxiliary material (chain codes) under a label.
pub fn derive_bytes<const N: usize>(
    salt: &[u8],
    ikm: &[u8],
    label: &[u8],
) -> Result<[u8; N], KeyError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; N];
    hk.expand(label, &mut okm)?;
    Ok(okm)
}
