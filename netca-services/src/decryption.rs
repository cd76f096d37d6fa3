use std::sync::Arc;

use netca_common::logging::{Component, Logger};
use netca_keys::{decrypt_with_derived_key, HdPrivateKey, HdPublicKey};

use crate::error::{CaError, Result};
use crate::store::CaStore;
use crate::types::require_param;

/// Decrypts data addressed to keys under a network admin's HD root.
pub struct DecryptionService {
    store: Arc<dyn CaStore>,
    logger: Arc<Logger>,
}

impl DecryptionService {
    pub fn new(store: Arc<dyn CaStore>, logger: Arc<Logger>) -> Self {
        Self {
            store,
            logger: Arc::new(logger.with_component(Component::Decryption)),
        }
    }

    /// Decrypt `ciphertext` that was encrypted to `counterparty_public_key`,
    /// a key derived from the HD root of (network, admin_address).
    pub fn decrypt(
        &self,
        network: &str,
        admin_address: &str,
        counterparty_public_key: &str,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        require_param("network", network)?;
        require_param("admin address", admin_address)?;
        let log = self.logger.with_network(network);
        log.info(format!(
            "Decrypting {} bytes with HD root of admin {admin_address}",
            ciphertext.len()
        ));

        let admin = self.store.get_admin(network, admin_address)?.ok_or_else(|| {
            log.warn(format!("Network admin {admin_address} not found"));
            CaError::InvalidParameter(format!("network admin {network}/{admin_address} not found"))
        })?;
        if admin.hd_private_key.is_empty() {
            log.warn(format!("Network admin {admin_address} has no HD root key"));
            return Err(CaError::InvalidParameter(format!(
                "network admin {network}/{admin_address} has no HD root key"
            )));
        }

        let root = HdPrivateKey::from_encoded(&admin.hd_private_key).map_err(|e| {
            CaError::DataIntegrity(format!(
                "stored HD root of admin {network}/{admin_address}: {e}"
            ))
        })?;
        let counterparty = HdPublicKey::from_encoded(counterparty_public_key)
            .map_err(|e| CaError::InvalidParameter(format!("counterparty public key: {e}")))?;

        let plaintext = decrypt_with_derived_key(&root, &counterparty, ciphertext).map_err(|e| {
            log.warn(format!(
                "Decryption for public key at index {} failed: {e}",
                counterparty.index()
            ));
            CaError::from(e)
        })?;
        log.debug(format!(
            "Decrypted {} bytes for public key at index {}",
            plaintext.len(),
            counterparty.index()
        ));
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AdminStore, MemoryStore};
    use crate::types::NetAdmin;
    use netca_keys::{derive_network_root_key, derive_node_key, encrypt_for_hd_public_key};

    fn admin_with_root(hd_private_key: String) -> NetAdmin {
        NetAdmin {
            network: "netA".to_string(),
            address: "admin1".to_string(),
            serial_number: "1".to_string(),
            cert_pem: String::new(),
            private_key_pem: String::new(),
            is_valid: true,
            validity: netca_keys::ValidityWindow {
                not_before: 0,
                not_after: 0,
            },
            hd_private_key,
        }
    }

    fn service(admin: Option<NetAdmin>) -> DecryptionService {
        let store = Arc::new(MemoryStore::new());
        if let Some(admin) = admin {
            store.insert_admin(&admin).unwrap();
        }
        let logger = Arc::new(Logger::new_root(Component::Service, "decrypt-test"));
        DecryptionService::new(store, logger)
    }

    #[test]
    fn test_decrypt_for_node_key() {
        let root = derive_network_root_key().unwrap();
        let service = service(Some(admin_with_root(root.to_encoded())));
        let node_public = derive_node_key(&root, 2).unwrap().public_key();
        let envelope = encrypt_for_hd_public_key(&node_public, b"hello node").unwrap();

        let plain = service
            .decrypt("netA", "admin1", &node_public.to_encoded(), &envelope)
            .unwrap();
        assert_eq!(plain, b"hello node");
    }

    #[test]
    fn test_missing_admin_or_root_is_invalid_parameter() {
        let err = service(None)
            .decrypt("netA", "admin1", "pk", b"ct")
            .unwrap_err();
        assert!(matches!(err, CaError::InvalidParameter(_)));

        let err = service(Some(admin_with_root(String::new())))
            .decrypt("netA", "admin1", "pk", b"ct")
            .unwrap_err();
        assert!(matches!(err, CaError::InvalidParameter(_)));
    }

    #[test]
    fn test_malformed_public_key_is_invalid_parameter() {
        let root = derive_network_root_key().unwrap();
        let service = service(Some(admin_with_root(root.to_encoded())));
        let err = service
            .decrypt("netA", "admin1", "%%%", b"ciphertext")
            .unwrap_err();
        assert!(matches!(err, CaError::InvalidParameter(_)));
    }

    #[test]
    fn test_short_ciphertext_is_malformed() {
        let root = derive_network_root_key().unwrap();
        let service = service(Some(admin_with_root(root.to_encoded())));
        let public = derive_node_key(&root, 0).unwrap().public_key().to_encoded();
        let err = service.decrypt("netA", "admin1", &public, b"short").unwrap_err();
        assert!(matches!(err, CaError::MalformedCiphertext(_)));
    }
}
