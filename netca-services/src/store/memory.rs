//! In-memory implementation of the store traits.
//!
//! Same semantics as SQLite with no persistence. Every mutation happens
//! under one write guard, so check-and-insert is atomic.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{AdminStore, NodeStore, Result, RevokeStore, SerialIndex, StoreError};
use crate::types::{InsertOutcome, NetAdmin, Node, Revoke};

type AddressKey = (String, String);

/// In-memory store. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// All admins ever inserted, row id = position + 1.
    admins: Vec<NetAdmin>,
    /// (network, address) -> row index of the valid admin.
    valid_admins: HashMap<AddressKey, usize>,

    nodes: Vec<Node>,
    valid_nodes: HashMap<AddressKey, usize>,
    /// (network, admin address, hd index) of every node ever inserted.
    ordinals: HashSet<(String, String, u32)>,

    revocations: Vec<Revoke>,
    /// (network, serial) of every issued certificate.
    serials: HashSet<AddressKey>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn key(network: &str, address: &str) -> AddressKey {
    (network.to_string(), address.to_string())
}

impl MemoryStoreInner {
    fn push_revocation(&mut self, network: &str, serial_number: &str, revoked_at: i64) -> Revoke {
        let revoke = Revoke {
            id: self.revocations.len() as u64 + 1,
            network: network.to_string(),
            serial_number: serial_number.to_string(),
            revoked_at,
        };
        self.revocations.push(revoke.clone());
        revoke
    }
}

impl AdminStore for MemoryStore {
    fn get_admin(&self, network: &str, address: &str) -> Result<Option<NetAdmin>> {
        let inner = self.read()?;
        Ok(inner
            .valid_admins
            .get(&key(network, address))
            .and_then(|&idx| inner.admins.get(idx))
            .cloned())
    }

    fn insert_admin(&self, admin: &NetAdmin) -> Result<InsertOutcome> {
        let mut inner = self.write()?;
        let k = key(&admin.network, &admin.address);
        if admin.is_valid && inner.valid_admins.contains_key(&k) {
            return Ok(InsertOutcome::AlreadyExists);
        }

        let idx = inner.admins.len();
        inner.admins.push(admin.clone());
        if admin.is_valid {
            inner.valid_admins.insert(k, idx);
        }
        inner
            .serials
            .insert(key(&admin.network, &admin.serial_number));
        Ok(InsertOutcome::Inserted { id: idx as u64 + 1 })
    }
}

impl NodeStore for MemoryStore {
    fn get_valid_node(&self, network: &str, address: &str) -> Result<Option<Node>> {
        let inner = self.read()?;
        Ok(inner
            .valid_nodes
            .get(&key(network, address))
            .and_then(|&idx| inner.nodes.get(idx))
            .cloned())
    }

    fn insert_node(&self, node: &Node) -> Result<InsertOutcome> {
        let mut inner = self.write()?;
        let k = key(&node.network, &node.address);
        if node.is_valid && inner.valid_nodes.contains_key(&k) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        let ordinal = (
            node.network.clone(),
            node.admin_address.clone(),
            node.hd_index,
        );
        if inner.ordinals.contains(&ordinal) {
            return Ok(InsertOutcome::OrdinalTaken);
        }

        let idx = inner.nodes.len();
        inner.nodes.push(node.clone());
        if node.is_valid {
            inner.valid_nodes.insert(k, idx);
        }
        inner.ordinals.insert(ordinal);
        inner.serials.insert(key(&node.network, &node.serial_number));
        Ok(InsertOutcome::Inserted { id: idx as u64 + 1 })
    }

    fn count_nodes_under_admin(&self, network: &str, admin_address: &str) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner
            .nodes
            .iter()
            .filter(|n| n.network == network && n.admin_address == admin_address)
            .count() as u64)
    }

    fn revoke_node(&self, network: &str, address: &str, revoked_at: i64) -> Result<Option<Revoke>> {
        let mut inner = self.write()?;
        let node_key = key(network, address);
        let Some(&idx) = inner.valid_nodes.get(&node_key) else {
            return Ok(None);
        };
        let Some(node) = inner.nodes.get_mut(idx) else {
            return Err(StoreError::InvalidData(format!(
                "valid node index {idx} for {network}/{address} has no row"
            )));
        };
        node.is_valid = false;
        let serial_number = node.serial_number.clone();
        inner.valid_nodes.remove(&node_key);
        Ok(Some(inner.push_revocation(network, &serial_number, revoked_at)))
    }
}

impl RevokeStore for MemoryStore {
    fn append_revocation(
        &self,
        network: &str,
        serial_number: &str,
        revoked_at: i64,
    ) -> Result<Revoke> {
        let mut inner = self.write()?;
        Ok(inner.push_revocation(network, serial_number, revoked_at))
    }

    fn revocation_position(&self, network: &str, serial_number: &str) -> Result<Option<u64>> {
        let inner = self.read()?;
        Ok(inner
            .revocations
            .iter()
            .rev()
            .find(|r| r.network == network && r.serial_number == serial_number)
            .map(|r| r.id))
    }

    fn revocations_after(
        &self,
        network: &str,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<Revoke>> {
        let inner = self.read()?;
        // Ids are 1-based positions in the log
        let start = after.unwrap_or(0) as usize;
        Ok(inner
            .revocations
            .iter()
            .skip(start)
            .filter(|r| r.network == network)
            .take(limit)
            .cloned()
            .collect())
    }
}

impl SerialIndex for MemoryStore {
    fn serial_in_use(&self, network: &str, serial_number: &str) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner.serials.contains(&key(network, serial_number)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netca_keys::ValidityWindow;

    fn admin(network: &str, address: &str) -> NetAdmin {
        NetAdmin {
            network: network.to_string(),
            address: address.to_string(),
            serial_number: format!("{address}-serial"),
            cert_pem: String::new(),
            private_key_pem: String::new(),
            is_valid: true,
            validity: ValidityWindow {
                not_before: 0,
                not_after: 1,
            },
            hd_private_key: String::new(),
        }
    }

    fn node(network: &str, admin: &str, address: &str, hd_index: u32) -> Node {
        Node {
            network: network.to_string(),
            admin_address: admin.to_string(),
            address: address.to_string(),
            serial_number: format!("{address}-serial"),
            cert_pem: String::new(),
            private_key_pem: String::new(),
            is_valid: true,
            validity: ValidityWindow {
                not_before: 0,
                not_after: 1,
            },
            hd_private_key: String::new(),
            hd_index,
        }
    }

    #[test]
    fn test_duplicate_admin_reports_already_exists() {
        let store = MemoryStore::new();
        assert_eq!(
            store.insert_admin(&admin("netA", "admin1")).unwrap(),
            InsertOutcome::Inserted { id: 1 }
        );
        assert_eq!(
            store.insert_admin(&admin("netA", "admin1")).unwrap(),
            InsertOutcome::AlreadyExists
        );
        // Same address in another network is a different admin
        assert!(matches!(
            store.insert_admin(&admin("netB", "admin1")).unwrap(),
            InsertOutcome::Inserted { .. }
        ));
        assert!(store.serial_in_use("netA", "admin1-serial").unwrap());
        assert!(!store.serial_in_use("netC", "admin1-serial").unwrap());
    }

    #[test]
    fn test_duplicate_ordinal_is_rejected() {
        let store = MemoryStore::new();
        store.insert_node(&node("netA", "admin1", "node1", 0)).unwrap();
        assert_eq!(
            store.insert_node(&node("netA", "admin1", "node2", 0)).unwrap(),
            InsertOutcome::OrdinalTaken
        );
        // Ordinals are per admin
        assert!(matches!(
            store.insert_node(&node("netA", "admin2", "node2", 0)).unwrap(),
            InsertOutcome::Inserted { .. }
        ));
    }

    #[test]
    fn test_revoke_keeps_node_counted() {
        let store = MemoryStore::new();
        store.insert_node(&node("netA", "admin1", "node1", 0)).unwrap();
        store.insert_node(&node("netA", "admin1", "node2", 1)).unwrap();

        let revoke = store.revoke_node("netA", "node1", 100).unwrap().unwrap();
        assert_eq!(revoke.serial_number, "node1-serial");
        assert!(store.get_valid_node("netA", "node1").unwrap().is_none());
        assert_eq!(store.count_nodes_under_admin("netA", "admin1").unwrap(), 2);
        assert!(store.revoke_node("netA", "node1", 101).unwrap().is_none());

        // The address can be registered again, at a fresh ordinal
        assert!(matches!(
            store.insert_node(&node("netA", "admin1", "node1", 2)).unwrap(),
            InsertOutcome::Inserted { .. }
        ));
    }

    #[test]
    fn test_revoke_with_dangling_index_changes_nothing() {
        let store = MemoryStore::new();
        store
            .write()
            .unwrap()
            .valid_nodes
            .insert(key("netA", "node1"), 5);

        let err = store.revoke_node("netA", "node1", 100).unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));

        let inner = store.read().unwrap();
        assert_eq!(inner.valid_nodes.get(&key("netA", "node1")), Some(&5));
        assert!(inner.revocations.is_empty());
    }

    #[test]
    fn test_revocations_after_filters_network() {
        let store = MemoryStore::new();
        store.append_revocation("netA", "s1", 1).unwrap();
        store.append_revocation("netB", "s2", 2).unwrap();
        store.append_revocation("netA", "s3", 3).unwrap();

        let all: Vec<_> = store
            .revocations_after("netA", None, 10)
            .unwrap()
            .into_iter()
            .map(|r| r.serial_number)
            .collect();
        assert_eq!(all, vec!["s1", "s3"]);

        let cursor = store.revocation_position("netA", "s1").unwrap();
        assert_eq!(cursor, Some(1));
        let rest = store.revocations_after("netA", cursor, 10).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].serial_number, "s3");
        assert_eq!(store.revocation_position("netB", "s1").unwrap(), None);
    }
}
