//! Node registry.
//!
//! A node's certificate is signed by its admin and its HD key is the child of
//! the admin's HD root at the node's ordinal: the number of nodes registered
//! under that admin before it, revoked ones included. Ordinals are assigned
//! while holding a per-admin creation lock and are never reused.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use netca_common::logging::{Component, Logger};
use netca_keys::{derive_node_key_encoded, unix_now, CertificateIssuer, CertificateRole};

use crate::config::OrdinalFailurePolicy;
use crate::error::{CaError, Result};
use crate::store::CaStore;
use crate::types::{require_param, Cert, InsertOutcome, Node};

type AdminKey = (String, String);

pub struct NodeRegistry {
    store: Arc<dyn CaStore>,
    issuer: Arc<CertificateIssuer>,
    ordinal_policy: OrdinalFailurePolicy,
    /// (network, admin address) -> creation lock
    creation_locks: DashMap<AdminKey, Arc<Mutex<()>>>,
    logger: Arc<Logger>,
}

impl NodeRegistry {
    pub fn new(
        store: Arc<dyn CaStore>,
        issuer: Arc<CertificateIssuer>,
        ordinal_policy: OrdinalFailurePolicy,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            store,
            issuer,
            ordinal_policy,
            creation_locks: DashMap::new(),
            logger: Arc::new(logger.with_component(Component::Registry)),
        }
    }

    fn creation_lock(&self, network: &str, admin_address: &str) -> Arc<Mutex<()>> {
        self.creation_locks
            .entry((network.to_string(), admin_address.to_string()))
            .or_default()
            .clone()
    }

    /// Register `address` in `network` under `admin_address`. A second call for
    /// the same (network, address) succeeds without changing anything.
    pub fn add_node(&self, network: &str, admin_address: &str, address: &str) -> Result<()> {
        require_param("network", network)?;
        require_param("admin address", admin_address)?;
        require_param("address", address)?;
        let log = self.logger.with_network(network);
        log.info(format!("Adding node {address} under admin {admin_address}"));

        if self.store.get_valid_node(network, address)?.is_some() {
            log.warn(format!("Node {address} already exists"));
            return Ok(());
        }

        let admin = self.store.get_admin(network, admin_address)?.ok_or_else(|| {
            log.warn(format!(
                "Cannot add node {address}: network admin {admin_address} not found"
            ));
            CaError::UnknownAuthority(format!("network admin {network}/{admin_address}"))
        })?;
        let admin_authority = admin.authority()?;

        let issued = self.issuer.issue_unique(
            &admin_authority,
            network,
            CertificateRole::Node,
            |serial| Ok::<_, CaError>(self.store.serial_in_use(network, serial)?),
        )?;

        let lock = self.creation_lock(network, admin_address);
        // Guards no data
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let count = match self.store.count_nodes_under_admin(network, admin_address) {
            Ok(count) => count,
            Err(e) => {
                return match self.ordinal_policy {
                    OrdinalFailurePolicy::SoftSucceed => {
                        log.warn(format!(
                            "Failed to count nodes under admin {admin_address}, node {address} not registered: {e}"
                        ));
                        Ok(())
                    }
                    OrdinalFailurePolicy::Propagate => {
                        log.error(format!(
                            "Failed to count nodes under admin {admin_address}: {e}"
                        ));
                        Err(CaError::Persistence(format!(
                            "counting nodes under {network}/{admin_address}: {e}"
                        )))
                    }
                };
            }
        };
        let ordinal = u32::try_from(count).map_err(|_| {
            CaError::Persistence(format!(
                "admin {network}/{admin_address} has exhausted its node ordinals"
            ))
        })?;

        let hd_key = derive_node_key_encoded(&admin.hd_private_key, ordinal)?;

        let node = Node {
            network: network.to_string(),
            admin_address: admin_address.to_string(),
            address: address.to_string(),
            serial_number: issued.serial_number,
            cert_pem: issued.cert_pem,
            private_key_pem: issued.key_pem,
            is_valid: true,
            validity: issued.validity,
            hd_private_key: hd_key.to_encoded(),
            hd_index: ordinal,
        };

        match self.store.insert_node(&node)? {
            InsertOutcome::Inserted { id } => {
                log.info(format!(
                    "Node {address} created (id={id}, ordinal={ordinal}, serial={})",
                    node.serial_number
                ));
                Ok(())
            }
            InsertOutcome::AlreadyExists => {
                log.warn(format!(
                    "Node {address} was created concurrently, keeping existing record"
                ));
                Ok(())
            }
            InsertOutcome::OrdinalTaken => {
                log.error(format!(
                    "Ordinal {ordinal} under admin {admin_address} is already taken"
                ));
                Err(CaError::Persistence(format!(
                    "ordinal {ordinal} under {network}/{admin_address} already assigned"
                )))
            }
        }
    }

    /// Certificate bundle of a valid node and its encoded HD private key.
    pub fn get_node(&self, network: &str, address: &str) -> Result<(Cert, String)> {
        require_param("network", network)?;
        require_param("address", address)?;
        let log = self.logger.with_network(network);
        log.debug(format!("Loading node {address}"));

        let node = self.store.get_valid_node(network, address)?.ok_or_else(|| {
            log.warn(format!("Node {address} not found"));
            CaError::CertificateNotFound(format!("node {network}/{address}"))
        })?;

        let admin = self
            .store
            .get_admin(network, &node.admin_address)?
            .ok_or_else(|| {
                log.error(format!(
                    "Issuing admin {} of node {address} is missing",
                    node.admin_address
                ));
                CaError::DataIntegrity(format!(
                    "node {network}/{address} references missing admin {}",
                    node.admin_address
                ))
            })?;

        Ok((
            Cert {
                address: node.address,
                serial_number: node.serial_number,
                cert_pem: node.cert_pem,
                private_key_pem: node.private_key_pem,
                validity: node.validity,
                ca_cert_pem: admin.cert_pem,
            },
            node.hd_private_key,
        ))
    }

    /// Invalidate the node and log its serial as revoked. `false` if there is
    /// no valid node at (network, address).
    pub fn revoke_node(&self, network: &str, address: &str) -> Result<bool> {
        require_param("network", network)?;
        require_param("address", address)?;
        let log = self.logger.with_network(network);
        log.info(format!("Revoking node {address}"));

        match self.store.revoke_node(network, address, unix_now())? {
            Some(revoke) => {
                log.info(format!(
                    "Node {address} revoked (serial={}, position={})",
                    revoke.serial_number, revoke.id
                ));
                Ok(true)
            }
            None => {
                log.warn(format!("Node {address} not found, nothing to revoke"));
                Ok(false)
            }
        }
    }

    pub fn get_valid_node(&self, network: &str, address: &str) -> Result<Option<Node>> {
        Ok(self.store.get_valid_node(network, address)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::AdminRegistry;
    use crate::store::{MemoryStore, NodeStore};
    use netca_keys::{CertificateAuthority, HdPrivateKey, ValidityPolicy, X509Certificate};

    struct Fixture {
        admins: AdminRegistry,
        nodes: NodeRegistry,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let logger = Arc::new(Logger::new_root(Component::Service, "node-test"));
        let root = CertificateAuthority::self_signed("Node Test Root").unwrap();
        let issuer =
            Arc::new(CertificateIssuer::new(root, ValidityPolicy::default(), logger.clone()).unwrap());
        let store = Arc::new(MemoryStore::new());
        Fixture {
            admins: AdminRegistry::new(store.clone(), issuer.clone(), logger.clone()),
            nodes: NodeRegistry::new(
                store.clone(),
                issuer,
                OrdinalFailurePolicy::SoftSucceed,
                logger,
            ),
            store,
        }
    }

    #[test]
    fn test_ordinals_follow_registration_order() {
        let f = fixture();
        f.admins.add_network_admin("netA", "admin1").unwrap();
        f.nodes.add_node("netA", "admin1", "node1").unwrap();
        f.nodes.add_node("netA", "admin1", "node2").unwrap();

        let n1 = f.store.get_valid_node("netA", "node1").unwrap().unwrap();
        let n2 = f.store.get_valid_node("netA", "node2").unwrap().unwrap();
        assert_eq!(n1.hd_index, 0);
        assert_eq!(n2.hd_index, 1);
        assert_ne!(n1.hd_private_key, n2.hd_private_key);

        // The stored key is the admin root's child at the ordinal
        let admin = f.admins.get_admin("netA", "admin1").unwrap().unwrap();
        let expected = derive_node_key_encoded(&admin.hd_private_key, 1).unwrap();
        assert_eq!(HdPrivateKey::from_encoded(&n2.hd_private_key).unwrap(), expected);
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let f = fixture();
        f.admins.add_network_admin("netA", "admin1").unwrap();
        f.nodes.add_node("netA", "admin1", "node1").unwrap();
        let before = f.store.get_valid_node("netA", "node1").unwrap();
        f.nodes.add_node("netA", "admin1", "node1").unwrap();
        assert_eq!(f.store.get_valid_node("netA", "node1").unwrap(), before);
        assert_eq!(f.store.count_nodes_under_admin("netA", "admin1").unwrap(), 1);
    }

    #[test]
    fn test_unknown_admin_persists_nothing() {
        let f = fixture();
        let err = f.nodes.add_node("netA", "ghost", "node1").unwrap_err();
        assert!(matches!(err, CaError::UnknownAuthority(_)));
        assert!(f.store.get_valid_node("netA", "node1").unwrap().is_none());
        assert_eq!(f.store.count_nodes_under_admin("netA", "ghost").unwrap(), 0);
    }

    #[test]
    fn test_node_certificate_is_signed_by_admin() {
        let f = fixture();
        f.admins.add_network_admin("netA", "admin1").unwrap();
        f.nodes.add_node("netA", "admin1", "node1").unwrap();

        let (cert, hd_key) = f.nodes.get_node("netA", "node1").unwrap();
        cert.verify_chain().unwrap();
        let parsed = X509Certificate::from_pem(&cert.cert_pem).unwrap();
        assert_eq!(CertificateRole::of(&parsed).unwrap(), CertificateRole::Node);
        assert!(cert.validity.is_current());
        assert!(!hd_key.is_empty());
    }

    #[test]
    fn test_revoked_ordinal_is_not_reused() {
        let f = fixture();
        f.admins.add_network_admin("netA", "admin1").unwrap();
        f.nodes.add_node("netA", "admin1", "node1").unwrap();
        assert!(f.nodes.revoke_node("netA", "node1").unwrap());
        assert!(!f.nodes.revoke_node("netA", "node1").unwrap());

        f.nodes.add_node("netA", "admin1", "node1").unwrap();
        let again = f.store.get_valid_node("netA", "node1").unwrap().unwrap();
        assert_eq!(again.hd_index, 1);
    }

    #[test]
    fn test_get_node_without_admin_is_data_integrity() {
        let f = fixture();
        let orphan = Node {
            network: "netA".to_string(),
            admin_address: "gone".to_string(),
            address: "orphan".to_string(),
            serial_number: "7".to_string(),
            cert_pem: String::new(),
            private_key_pem: String::new(),
            is_valid: true,
            validity: netca_keys::ValidityWindow {
                not_before: 0,
                not_after: 0,
            },
            hd_private_key: String::new(),
            hd_index: 0,
        };
        f.store.insert_node(&orphan).unwrap();

        let err = f.nodes.get_node("netA", "orphan").unwrap_err();
        assert!(matches!(err, CaError::DataIntegrity(_)));
        let err = f.nodes.get_node("netA", "nobody").unwrap_err();
        assert!(matches!(err, CaError::CertificateNotFound(_)));
        assert!(err.is_not_found());
    }
}
