//! Hierarchical-deterministic keys for networks and nodes.
//!
//! A network admin owns one HD root (depth 0). Every node registered under
//! that admin gets the child at depth 1 whose index is the node's ordinal:
//!
//! ```text
//! root (depth 0, random)
//!   ├── child 0  -> first node
//!   ├── child 1  -> second node
//!   └── ...
//! ```
//!
//! Children are derived with HKDF-SHA-256 keyed by the parent chain code, so
//! any child can be regenerated from the root and the index alone.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey as P256PublicKey, SecretKey as P256SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::derivation::{derive_bytes, derive_scalar, DEFAULT_DERIVATION_SALT};
use crate::error::{KeyError, Result};

pub const HD_CHAIN_CODE_LEN: usize = 32;
const SCALAR_LEN: usize = 32;
const SEC1_UNCOMPRESSED_LEN: usize = 65;
const PRIVATE_ENCODED_LEN: usize = 1 + 4 + HD_CHAIN_CODE_LEN + SCALAR_LEN;
const PUBLIC_ENCODED_LEN: usize = 1 + 4 + SEC1_UNCOMPRESSED_LEN;

const ROOT_KEY_LABEL: &[u8] = b"netca/hd/root";
const ROOT_CHAIN_LABEL: &[u8] = b"netca/hd/root-chain";

/// HD private key: P-256 scalar plus chain code, tagged with its position.
#[derive(Clone)]
pub struct HdPrivateKey {
    secret: P256SecretKey,
    chain_code: [u8; HD_CHAIN_CODE_LEN],
    depth: u8,
    index: u32,
}

impl HdPrivateKey {
    /// Generate a fresh random root key (depth 0).
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; 64];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| KeyError::KeyGenerationError(format!("entropy source failed: {e}")))?;

        let secret = derive_scalar(DEFAULT_DERIVATION_SALT, &seed, ROOT_KEY_LABEL)
            .map_err(|e| KeyError::KeyGenerationError(e.to_string()))?;
        let chain_code = derive_bytes::<HD_CHAIN_CODE_LEN>(
            DEFAULT_DERIVATION_SALT,
            &seed,
            ROOT_CHAIN_LABEL,
        )
        .map_err(|e| KeyError::KeyGenerationError(e.to_string()))?;

        Ok(Self {
            secret,
            chain_code,
            depth: 0,
            index: 0,
        })
    }

    /// Derive the child at `index`. Deterministic in (self, index).
    pub fn derive_child(&self, index: u32) -> Result<Self> {
        let depth = self.depth.checked_add(1).ok_or_else(|| {
            KeyError::KeyDerivationError("maximum derivation depth reached".to_string())
        })?;
        let ikm = self.secret.to_bytes();
        let key_label = format!("netca/hd/child/{index}");
        let chain_label = format!("netca/hd/chain/{index}");

        let secret = derive_scalar(&self.chain_code, &ikm, key_label.as_bytes())?;
        let chain_code =
            derive_bytes::<HD_CHAIN_CODE_LEN>(&self.chain_code, &ikm, chain_label.as_bytes())?;

        Ok(Self {
            secret,
            chain_code,
            depth,
            index,
        })
    }

    pub fn public_key(&self) -> HdPublicKey {
        HdPublicKey {
            point: self.secret.public_key(),
            depth: self.depth,
            index: self.index,
        }
    }

    pub fn secret_key(&self) -> &P256SecretKey {
        &self.secret
    }

    pub fn chain_code(&self) -> &[u8; HD_CHAIN_CODE_LEN] {
        &self.chain_code
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// `depth || index (BE) || chain code || scalar`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PRIVATE_ENCODED_LEN);
        out.push(self.depth);
        out.extend_from_slice(&self.index.to_be_bytes());
        out.extend_from_slice(&self.chain_code);
        out.extend_from_slice(&self.secret.to_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_ENCODED_LEN {
            return Err(KeyError::InvalidKeyFormat(format!(
                "HD private key must be {PRIVATE_ENCODED_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let depth = bytes[0];
        let index = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let mut chain_code = [0u8; HD_CHAIN_CODE_LEN];
        chain_code.copy_from_slice(&bytes[5..5 + HD_CHAIN_CODE_LEN]);
        let secret = P256SecretKey::from_slice(&bytes[5 + HD_CHAIN_CODE_LEN..])
            .map_err(|e| KeyError::InvalidKeyFormat(format!("invalid HD scalar: {e}")))?;

        Ok(Self {
            secret,
            chain_code,
            depth,
            index,
        })
    }

    /// Base64 URL-safe (no padding) form used for persistence.
    pub fn to_encoded(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_bytes())
    }

    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|e| KeyError::InvalidKeyFormat(format!("invalid HD key encoding: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl PartialEq for HdPrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for HdPrivateKey {}

impl fmt::Debug for HdPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdPrivateKey")
            .field("depth", &self.depth)
            .field("index", &self.index)
            .field("public", &self.public_key().to_encoded())
            .finish_non_exhaustive()
    }
}

/// Public half of an [`HdPrivateKey`], carrying the derivation position so
/// the holder of the root can find the matching private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdPublicKey {
    point: P256PublicKey,
    depth: u8,
    index: u32,
}

impl HdPublicKey {
    pub fn point(&self) -> &P256PublicKey {
        &self.point
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Uncompressed SEC1 point
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        self.point.to_encoded_point(false).as_bytes().to_vec()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PUBLIC_ENCODED_LEN);
        out.push(self.depth);
        out.extend_from_slice(&self.index.to_be_bytes());
        out.extend_from_slice(&self.to_sec1_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_ENCODED_LEN {
            return Err(KeyError::InvalidKeyFormat(format!(
                "HD public key must be {PUBLIC_ENCODED_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let depth = bytes[0];
        let index = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let point = P256PublicKey::from_sec1_bytes(&bytes[5..])
            .map_err(|e| KeyError::InvalidKeyFormat(format!("invalid HD public point: {e}")))?;
        Ok(Self {
            point,
            depth,
            index,
        })
    }

    pub fn to_encoded(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_bytes())
    }

    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded.trim()).map_err(|e| {
            KeyError::InvalidKeyFormat(format!("invalid HD public key encoding: {e}"))
        })?;
        Self::from_bytes(&bytes)
    }
}

/// Generate a fresh HD root for a network admin.
pub fn derive_network_root_key() -> Result<HdPrivateKey> {
    HdPrivateKey::generate()
}

/// Derive the HD key of the node registered at `index` under `parent`.
pub fn derive_node_key(parent: &HdPrivateKey, index: u32) -> Result<HdPrivateKey> {
    parent.derive_child(index)
}

/// Same as [`derive_node_key`] for a parent in its persisted encoding.
pub fn derive_node_key_encoded(parent: &str, index: u32) -> Result<HdPrivateKey> {
    let parent = HdPrivateKey::from_encoded(parent)
        .map_err(|e| KeyError::KeyDerivationError(format!("malformed parent HD key: {e}")))?;
    derive_node_key(&parent, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_node_key_deterministic() {
        let root = derive_network_root_key().unwrap();
        let a = derive_node_key(&root, 0).unwrap();
        let b = derive_node_key(&root, 0).unwrap();
        assert_eq!(a.to_bytes(), b.to_bytes());
        assert_eq!(a.depth(), 1);
        assert_eq!(a.index(), 0);

        let c = derive_node_key(&root, 1).unwrap();
        assert_ne!(a.secret_key().to_bytes(), c.secret_key().to_bytes());
        assert_ne!(a.chain_code(), c.chain_code());
    }

    #[test]
    fn test_different_roots_give_different_children() {
        let root1 = derive_network_root_key().unwrap();
        let root2 = derive_network_root_key().unwrap();
        assert_ne!(root1, root2);
        assert_ne!(
            derive_node_key(&root1, 3).unwrap().public_key(),
            derive_node_key(&root2, 3).unwrap().public_key()
        );
    }

    #[test]
    fn test_private_encoding_roundtrip_preserves_derivation() {
        let root = derive_network_root_key().unwrap();
        let decoded = HdPrivateKey::from_encoded(&root.to_encoded()).unwrap();
        assert_eq!(root, decoded);
        assert_eq!(
            derive_node_key(&root, 7).unwrap(),
            derive_node_key_encoded(&root.to_encoded(), 7).unwrap()
        );
    }

    #[test]
    fn test_public_key_carries_position() {
        let root = derive_network_root_key().unwrap();
        let child = derive_node_key(&root, 42).unwrap();
        let public = HdPublicKey::from_encoded(&child.public_key().to_encoded()).unwrap();
        assert_eq!(public.depth(), 1);
        assert_eq!(public.index(), 42);
        assert_eq!(public.point(), &child.secret_key().public_key());
    }

    #[test]
    fn test_malformed_parent_is_derivation_error() {
        let err = derive_node_key_encoded("not-a-key", 0).unwrap_err();
        assert!(matches!(err, KeyError::KeyDerivationError(_)));

        let short = URL_SAFE_NO_PAD.encode([0u8; 10]);
        let err = derive_node_key_encoded(&short, 0).unwrap_err();
        assert!(matches!(err, KeyError::KeyDerivationError(_)));
    }

    #[test]
    fn test_debug_does_not_print_scalar() {
        let root = derive_network_root_key().unwrap();
        let rendered = format!("{root:?}");
        assert!(!rendered.contains(&hex::encode(root.secret_key().to_bytes())));
    }
}
