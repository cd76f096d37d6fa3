//! # NetCA Services
//!
//! Registries of a network certificate authority: network admins, member
//! nodes, the revocation log and decryption with admin HD roots, exposed
//! together through [`CaService`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use netca_services::{CaConfig, CaService, SqliteStore};
//!
//! let store = Arc::new(SqliteStore::open("netca.db").unwrap());
//! let service = CaService::new(CaConfig::self_signed("NetCA Root"), store).unwrap();
//! service.add_net_admin("netA", "admin1").unwrap();
//! service.add_node("netA", "admin1", "node1").unwrap();
//! let (bundle, _hd_key) = service.get_node("netA", "node1").unwrap();
//! bundle.verify_chain().unwrap();
//! ```

pub mod admin;
pub mod config;
pub mod decryption;
pub mod error;
pub mod node;
pub mod revocation;
pub mod service;
pub mod store;
pub mod types;

pub use admin::AdminRegistry;
pub use config::{CaConfig, OrdinalFailurePolicy, RootAuthoritySource};
pub use decryption::DecryptionService;
pub use error::{CaError, ErrorCode, Result};
pub use node::NodeRegistry;
pub use revocation::{RevocationRegistry, RevokeIter};
pub use service::CaService;
pub use store::{
    AdminStore, CaStore, MemoryStore, NodeStore, RevokeStore, SerialIndex, SqliteStore,
    StoreError,
};
pub use types::{Cert, InsertOutcome, NetAdmin, Node, OriginalCert, Revoke};
