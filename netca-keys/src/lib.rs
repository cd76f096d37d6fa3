//! NetCA Keys – certificate issuance, HD key derivation and HD decryption

pub mod certificate;
pub mod derivation;
pub mod encryption;
pub mod error;
pub mod hd;

pub use error::{KeyError, Result};

pub use certificate::{
    unix_now, CertificateAuthority, CertificateIssuer, CertificateRole, EcdsaKeyPair,
    IssuedCertificate, ValidityPolicy, ValidityWindow, X509Certificate,
};

pub use hd::{
    derive_network_root_key, derive_node_key, derive_node_key_encoded, HdPrivateKey, HdPublicKey,
};

pub use encryption::{
    decrypt_with_derived_key, decrypt_with_secret_key, encrypt_for_hd_public_key,
    encrypt_for_public_key,
};
