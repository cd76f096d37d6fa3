//! Network admin registry.
//!
//! An admin certificate is signed by the root authority and carries
//! `CA:TRUE, pathlen:0`; the admin signs every node of its network. Each admin
//! also owns the HD root its nodes' keys are derived from.

use std::sync::Arc;

use netca_common::logging::{Component, Logger};
use netca_keys::{
    derive_network_root_key, CertificateIssuer, CertificateRole, EcdsaKeyPair, X509Certificate,
};

use crate::error::{CaError, Result};
use crate::store::CaStore;
use crate::types::{require_param, InsertOutcome, NetAdmin, OriginalCert};

pub struct AdminRegistry {
    store: Arc<dyn CaStore>,
    issuer: Arc<CertificateIssuer>,
    logger: Arc<Logger>,
}

impl AdminRegistry {
    pub fn new(store: Arc<dyn CaStore>, issuer: Arc<CertificateIssuer>, logger: Arc<Logger>) -> Self {
        Self {
            store,
            issuer,
            logger: Arc::new(logger.with_component(Component::Registry)),
        }
    }

    /// Register an admin for `network`. A second call for the same
    /// (network, address) succeeds without changing anything.
    pub fn add_network_admin(&self, network: &str, address: &str) -> Result<()> {
        require_param("network", network)?;
        require_param("address", address)?;
        let log = self.logger.with_network(network);
        log.info(format!("Adding network admin {address}"));

        if self.store.get_admin(network, address)?.is_some() {
            log.warn(format!("Network admin {address} already exists"));
            return Ok(());
        }

        let issued = self.issuer.issue_unique(
            self.issuer.root_authority(),
            network,
            CertificateRole::Admin,
            |serial| Ok::<_, CaError>(self.store.serial_in_use(network, serial)?),
        )?;
        let hd_root = derive_network_root_key()?;

        let admin = NetAdmin {
            network: network.to_string(),
            address: address.to_string(),
            serial_number: issued.serial_number,
            cert_pem: issued.cert_pem,
            private_key_pem: issued.key_pem,
            is_valid: true,
            validity: issued.validity,
            hd_private_key: hd_root.to_encoded(),
        };

        match self.store.insert_admin(&admin)? {
            InsertOutcome::Inserted { id } => {
                log.info(format!(
                    "Network admin {address} created (id={id}, serial={})",
                    admin.serial_number
                ));
                Ok(())
            }
            InsertOutcome::AlreadyExists => {
                log.warn(format!(
                    "Network admin {address} was created concurrently, keeping existing record"
                ));
                Ok(())
            }
            InsertOutcome::OrdinalTaken => Err(CaError::Persistence(format!(
                "unexpected ordinal conflict inserting admin {network}/{address}"
            ))),
        }
    }

    /// Parsed certificate and key of the admin, plus its address. The HD root
    /// never leaves the registry.
    pub fn get_admin_credentials(
        &self,
        network: &str,
        address: &str,
    ) -> Result<(OriginalCert, String)> {
        require_param("network", network)?;
        require_param("address", address)?;
        let log = self.logger.with_network(network);
        log.debug(format!("Loading credentials of network admin {address}"));

        let admin = self.store.get_admin(network, address)?.ok_or_else(|| {
            log.warn(format!("Network admin {address} not found"));
            CaError::NotFound(format!("network admin {network}/{address}"))
        })?;

        let certificate = X509Certificate::from_pem(&admin.cert_pem).map_err(|e| {
            CaError::Parse(format!("certificate of admin {network}/{address}: {e}"))
        })?;
        let private_key = EcdsaKeyPair::from_pkcs8_pem(&admin.private_key_pem).map_err(|e| {
            CaError::Parse(format!("private key of admin {network}/{address}: {e}"))
        })?;

        Ok((
            OriginalCert {
                certificate,
                private_key,
            },
            admin.address,
        ))
    }

    pub fn get_admin(&self, network: &str, address: &str) -> Result<Option<NetAdmin>> {
        Ok(self.store.get_admin(network, address)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AdminStore, MemoryStore};
    use netca_keys::{CertificateAuthority, ValidityPolicy};

    fn registry() -> (AdminRegistry, Arc<MemoryStore>) {
        let logger = Arc::new(Logger::new_root(Component::Service, "admin-test"));
        let root = CertificateAuthority::self_signed("Admin Test Root").unwrap();
        let issuer =
            Arc::new(CertificateIssuer::new(root, ValidityPolicy::default(), logger.clone()).unwrap());
        let store = Arc::new(MemoryStore::new());
        (AdminRegistry::new(store.clone(), issuer, logger), store)
    }

    #[test]
    fn test_add_admin_is_idempotent() {
        let (registry, store) = registry();
        registry.add_network_admin("netA", "admin1").unwrap();
        let first = store.get_admin("netA", "admin1").unwrap().unwrap();

        registry.add_network_admin("netA", "admin1").unwrap();
        let second = store.get_admin("netA", "admin1").unwrap().unwrap();
        assert_eq!(first, second);
        assert!(!first.hd_private_key.is_empty());
    }

    #[test]
    fn test_admin_cert_is_signed_by_root() {
        let (registry, _) = registry();
        registry.add_network_admin("netA", "admin1").unwrap();
        let (cert, address) = registry.get_admin_credentials("netA", "admin1").unwrap();
        assert_eq!(address, "admin1");

        let root = registry.issuer.root_authority().certificate();
        cert.certificate.validate_issued_by(root).unwrap();
        assert_eq!(
            CertificateRole::of(&cert.certificate).unwrap(),
            CertificateRole::Admin
        );
        let stored = registry.get_admin("netA", "admin1").unwrap().unwrap();
        assert!(netca_keys::HdPrivateKey::from_encoded(&stored.hd_private_key).is_ok());
        assert_ne!(address, stored.hd_private_key);
    }

    #[test]
    fn test_empty_parameters_are_rejected() {
        let (registry, store) = registry();
        assert!(matches!(
            registry.add_network_admin("", "admin1"),
            Err(CaError::InvalidParameter(_))
        ));
        assert!(matches!(
            registry.add_network_admin("netA", "  "),
            Err(CaError::InvalidParameter(_))
        ));
        assert!(store.get_admin("netA", "  ").unwrap().is_none());
    }

    #[test]
    fn test_missing_admin_is_not_found() {
        let (registry, _) = registry();
        let err = registry.get_admin_credentials("netA", "ghost").unwrap_err();
        assert!(matches!(err, CaError::NotFound(_)));
    }

    #[test]
    fn test_corrupt_stored_pem_is_parse_error() {
        let (registry, store) = registry();
        let mut admin = NetAdmin {
            network: "netA".to_string(),
            address: "broken".to_string(),
            serial_number: "1".to_string(),
            cert_pem: "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n".to_string(),
            private_key_pem: String::new(),
            is_valid: true,
            validity: netca_keys::ValidityWindow {
                not_before: 0,
                not_after: 0,
            },
            hd_private_key: String::new(),
        };
        store.insert_admin(&admin).unwrap();
        let err = registry.get_admin_credentials("netA", "broken").unwrap_err();
        assert!(matches!(err, CaError::Parse(_)));

        // Valid certificate, broken key
        registry.add_network_admin("netA", "admin2").unwrap();
        let good = store.get_admin("netA", "admin2").unwrap().unwrap();
        admin.address = "broken-key".to_string();
        admin.cert_pem = good.cert_pem;
        admin.private_key_pem = "not a key".to_string();
        store.insert_admin(&admin).unwrap();
        let err = registry.get_admin_credentials("netA", "broken-key").unwrap_err();
        assert!(matches!(err, CaError::Parse(_)));
    }
}
