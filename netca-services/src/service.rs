//! `CaService`: the operation surface of the CA.
//!
//! Built once from a [`CaConfig`] and a store. Construction loads and checks
//! the root authority and fails fast if it is unusable; afterwards the root is
//! read-only for the life of the service.

use std::sync::Arc;

use netca_common::logging::{Component, Logger};
use netca_keys::{CertificateIssuer, X509Certificate};

use crate::admin::AdminRegistry;
use crate::config::CaConfig;
use crate::decryption::DecryptionService;
use crate::error::{CaError, Result};
use crate::node::NodeRegistry;
use crate::revocation::{RevocationRegistry, RevokeIter};
use crate::store::{CaStore, MemoryStore};
use crate::types::{Cert, OriginalCert, Revoke};

pub struct CaService {
    config: CaConfig,
    issuer: Arc<CertificateIssuer>,
    admins: AdminRegistry,
    nodes: NodeRegistry,
    revocations: RevocationRegistry,
    decryption: DecryptionService,
    logger: Arc<Logger>,
}

impl CaService {
    pub fn new(config: CaConfig, store: Arc<dyn CaStore>) -> Result<Self> {
        config.validate()?;
        if let Some(logging) = &config.logging_config {
            logging.apply();
        }

        let logger = Arc::new(Logger::new_root(Component::Service, &config.instance_id));
        logger.info(format!("Starting CA service with {config}"));

        let root = config.root_authority.load()?;
        let issuer = CertificateIssuer::new(
            root,
            config.validity_policy(),
            Arc::new(logger.with_component(Component::Keys)),
        )
        .map_err(|e| CaError::Configuration(format!("root authority is not usable: {e}")))?;
        let issuer = Arc::new(issuer);

        Ok(Self {
            admins: AdminRegistry::new(store.clone(), issuer.clone(), logger.clone()),
            nodes: NodeRegistry::new(
                store.clone(),
                issuer.clone(),
                config.ordinal_failure_policy,
                logger.clone(),
            ),
            revocations: RevocationRegistry::new(
                store.clone(),
                config.revoke_page_size,
                logger.clone(),
            ),
            decryption: DecryptionService::new(store, logger.clone()),
            issuer,
            config,
            logger,
        })
    }

    /// Service backed by a fresh [`MemoryStore`]
    pub fn in_memory(config: CaConfig) -> Result<Self> {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    pub fn config(&self) -> &CaConfig {
        &self.config
    }

    pub fn root_certificate(&self) -> &X509Certificate {
        self.issuer.root_authority().certificate()
    }

    pub fn add_net_admin(&self, network: &str, address: &str) -> Result<()> {
        self.admins.add_network_admin(network, address)
    }

    pub fn add_node(&self, network: &str, admin_address: &str, address: &str) -> Result<()> {
        self.nodes.add_node(network, admin_address, address)
    }

    /// Admin certificate and private key, plus the admin address.
    pub fn get_admin_cert(&self, network: &str, address: &str) -> Result<(OriginalCert, String)> {
        self.admins.get_admin_credentials(network, address)
    }

    /// Node certificate bundle and the node's encoded HD private key.
    pub fn get_node(&self, network: &str, address: &str) -> Result<(Cert, String)> {
        self.nodes.get_node(network, address)
    }

    /// Encoded HD public key of a valid node, the key peers encrypt to.
    pub fn get_node_public_key(&self, network: &str, address: &str) -> Result<String> {
        let node = self.nodes.get_valid_node(network, address)?.ok_or_else(|| {
            CaError::CertificateNotFound(format!("node {network}/{address}"))
        })?;
        node.hd_public_key()
    }

    /// Revocations in `network` after `cursor_serial`; empty cursor for all.
    pub fn get_revoke_list(&self, network: &str, cursor_serial: &str) -> Result<RevokeIter> {
        self.revocations.list_since(network, cursor_serial)
    }

    pub fn collect_revoke_list(&self, network: &str, cursor_serial: &str) -> Result<Vec<Revoke>> {
        self.revocations.collect_since(network, cursor_serial)
    }

    /// Revoke an arbitrary serial, e.g. one issued before this store existed.
    pub fn revoke_serial(&self, network: &str, serial_number: &str) -> Result<Revoke> {
        self.revocations.append_revocation(network, serial_number)
    }

    pub fn revoke_node(&self, network: &str, address: &str) -> Result<bool> {
        self.nodes.revoke_node(network, address)
    }

    pub fn decrypt_by_hd_key(
        &self,
        network: &str,
        admin_address: &str,
        counterparty_public_key: &str,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        self.decryption
            .decrypt(network, admin_address, counterparty_public_key, ciphertext)
    }
}

impl Drop for CaService {
    fn drop(&mut self) {
        self.logger.debug("CA service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RootAuthoritySource;

    #[test]
    fn test_unloadable_root_fails_fast() {
        let config = CaConfig::new(RootAuthoritySource::Pem {
            cert_pem: "garbage".to_string(),
            key_pem: "garbage".to_string(),
        });
        let err = CaService::in_memory(config).err().unwrap();
        assert!(matches!(err, CaError::Configuration(_)));
    }

    #[test]
    fn test_mismatched_root_key_fails_fast() {
        let a = netca_keys::CertificateAuthority::self_signed("Root A").unwrap();
        let b = netca_keys::CertificateAuthority::self_signed("Root B").unwrap();
        let config = CaConfig::new(RootAuthoritySource::Pem {
            cert_pem: a.certificate().to_pem().unwrap(),
            key_pem: b.key_pair().private_key_pem().unwrap(),
        });
        let err = CaService::in_memory(config).err().unwrap();
        assert!(matches!(err, CaError::Configuration(_)));
    }

    #[test]
    fn test_root_from_inline_pem() {
        let root = netca_keys::CertificateAuthority::self_signed("Inline Root").unwrap();
        let config = CaConfig::new(RootAuthoritySource::Pem {
            cert_pem: root.certificate().to_pem().unwrap(),
            key_pem: root.key_pair().private_key_pem().unwrap(),
        });
        let service = CaService::in_memory(config).unwrap();
        assert_eq!(service.root_certificate().subject(), root.certificate().subject());

        service.add_net_admin("netA", "admin1").unwrap();
        let (admin, _) = service.get_admin_cert("netA", "admin1").unwrap();
        admin.certificate.validate_issued_by(root.certificate()).unwrap();
    }

    #[test]
    fn test_node_public_key_matches_private_key() {
        let service = CaService::in_memory(CaConfig::self_signed("Svc Root")).unwrap();
        service.add_net_admin("netA", "admin1").unwrap();
        service.add_node("netA", "admin1", "node1").unwrap();

        let (_, hd_key) = service.get_node("netA", "node1").unwrap();
        let public = service.get_node_public_key("netA", "node1").unwrap();
        let private = netca_keys::HdPrivateKey::from_encoded(&hd_key).unwrap();
        assert_eq!(private.public_key().to_encoded(), public);
    }
}
