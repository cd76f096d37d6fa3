//! Records kept by the registries and the values handed back to callers.

use netca_keys::{
    CertificateAuthority, EcdsaKeyPair, HdPrivateKey, ValidityWindow, X509Certificate,
};
use serde::{Deserialize, Serialize};

use crate::error::{CaError, Result};

/// Administrator of one network. At most one valid record per (network, address).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetAdmin {
    pub network: String,
    pub address: String,
    pub serial_number: String,
    pub cert_pem: String,
    pub private_key_pem: String,
    pub is_valid: bool,
    pub validity: ValidityWindow,
    /// Encoded [`HdPrivateKey`] root of the network; empty if never configured.
    pub hd_private_key: String,
}

impl NetAdmin {
    /// Signing material for node certificates issued by this admin.
    pub fn authority(&self) -> Result<CertificateAuthority> {
        CertificateAuthority::from_pem(&self.cert_pem, &self.private_key_pem).map_err(|e| {
            CaError::Parse(format!(
                "stored credentials of admin {}/{}: {e}",
                self.network, self.address
            ))
        })
    }
}

/// Member node issued by an admin. At most one valid record per (network, address).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub network: String,
    /// Address of the issuing admin (not owned)
    pub admin_address: String,
    pub address: String,
    pub serial_number: String,
    pub cert_pem: String,
    pub private_key_pem: String,
    pub is_valid: bool,
    pub validity: ValidityWindow,
    /// Encoded [`HdPrivateKey`] derived from the admin root at `hd_index`
    pub hd_private_key: String,
    /// Ordinal of the node under its admin; the HD derivation index
    pub hd_index: u32,
}

impl Node {
    /// Encoded HD public key other parties encrypt to.
    pub fn hd_public_key(&self) -> Result<String> {
        let key = HdPrivateKey::from_encoded(&self.hd_private_key).map_err(|e| {
            CaError::Parse(format!(
                "stored HD key of node {}/{}: {e}",
                self.network, self.address
            ))
        })?;
        Ok(key.public_key().to_encoded())
    }
}

/// One entry of the revocation log. `id` is the cursor order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revoke {
    pub id: u64,
    pub network: String,
    pub serial_number: String,
    pub revoked_at: i64,
}

/// Result of an atomic insert at the storage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Record stored under the returned id.
    Inserted { id: u64 },
    /// A valid record already exists for (network, address). Not an error.
    AlreadyExists,
    /// Another node under the same admin already holds this HD index.
    OrdinalTaken,
}

/// Parsed admin credentials.
#[derive(Debug, Clone)]
pub struct OriginalCert {
    pub certificate: X509Certificate,
    pub private_key: EcdsaKeyPair,
}

/// Node certificate bundle together with the issuing admin's certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cert {
    pub address: String,
    pub serial_number: String,
    pub cert_pem: String,
    pub private_key_pem: String,
    pub validity: ValidityWindow,
    /// Admin certificate, for chain verification
    pub ca_cert_pem: String,
}

impl Cert {
    /// Check that the node certificate was signed by the bundled admin certificate.
    pub fn verify_chain(&self) -> Result<()> {
        let node = X509Certificate::from_pem(&self.cert_pem)?;
        let ca = X509Certificate::from_pem(&self.ca_cert_pem)?;
        node.validate_issued_by(&ca)?;
        Ok(())
    }
}

/// Reject empty identifiers before touching storage.
pub(crate) fn require_param(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CaError::InvalidParameter(format!("{name} must not be empty")));
    }
    Ok(())
}
