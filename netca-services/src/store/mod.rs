//! Storage abstraction for the CA registries.
//!
//! The registries only talk to storage through the traits below, so the CA
//! core stays storage-agnostic. [`SqliteStore`] is the persistent backend and
//! [`MemoryStore`] keeps the same semantics in memory.
//!
//! ## Design Notes
//!
//! - **Atomic inserts**: uniqueness of valid records per (network, address) is
//!   checked inside the store's write section; losing a race reports
//!   [`InsertOutcome::AlreadyExists`] instead of creating a duplicate.
//! - **Ordinals**: a node's `hd_index` is unique per (network, admin); a
//!   duplicate reports [`InsertOutcome::OrdinalTaken`].
//! - **Revocation**: invalidating a node and appending its serial to the
//!   revocation log happen in one write.

pub mod memory;
pub mod migration;
pub mod sqlite;

use thiserror::Error;

use crate::types::{InsertOutcome, NetAdmin, Node, Revoke};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A lock guarding the store was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// NetAdmin persistence.
pub trait AdminStore: Send + Sync {
    /// The valid admin for (network, address), if any.
    fn get_admin(&self, network: &str, address: &str) -> Result<Option<NetAdmin>>;

    /// Insert unless a valid admin already exists for (network, address).
    fn insert_admin(&self, admin: &NetAdmin) -> Result<InsertOutcome>;
}

/// Node persistence.
pub trait NodeStore: Send + Sync {
    /// The valid node for (network, address), if any.
    fn get_valid_node(&self, network: &str, address: &str) -> Result<Option<Node>>;

    /// Insert unless a valid node already exists for (network, address) or the
    /// node's `hd_index` is already used under its admin.
    fn insert_node(&self, node: &Node) -> Result<InsertOutcome>;

    /// Number of nodes ever registered under the admin, revoked ones included.
    fn count_nodes_under_admin(&self, network: &str, admin_address: &str) -> Result<u64>;

    /// Invalidate the valid node and append its serial to the revocation log in
    /// one write. `None` if there is no valid node.
    fn revoke_node(&self, network: &str, address: &str, revoked_at: i64) -> Result<Option<Revoke>>;
}

/// Append-only revocation log.
pub trait RevokeStore: Send + Sync {
    fn append_revocation(&self, network: &str, serial_number: &str, revoked_at: i64)
        -> Result<Revoke>;

    /// Id of the latest log entry for `serial_number` in `network`.
    fn revocation_position(&self, network: &str, serial_number: &str) -> Result<Option<u64>>;

    /// Up to `limit` entries of `network` with id greater than `after`, in id order.
    /// `after == None` starts at the beginning of the log.
    fn revocations_after(
        &self,
        network: &str,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<Revoke>>;
}

/// Serial number lookups across admins and nodes.
pub trait SerialIndex: Send + Sync {
    fn serial_in_use(&self, network: &str, serial_number: &str) -> Result<bool>;
}

/// Everything the CA needs from its backing store.
pub trait CaStore: AdminStore + NodeStore + RevokeStore + SerialIndex {}

impl<T> CaStore for T where T: AdminStore + NodeStore + RevokeStore + SerialIndex {}
