//! SQLite implementation of the store traits.
//!
//! Uses rusqlite with bundled SQLite. The connection sits behind a mutex;
//! multi-statement writes run in one transaction and the partial unique
//! indexes from the v1 migration back every uniqueness rule.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};

use super::migration;
use super::{AdminStore, NodeStore, Result, RevokeStore, SerialIndex, StoreError};
use crate::types::{InsertOutcome, NetAdmin, Node, Revoke};
use netca_keys::ValidityWindow;

const ADMIN_COLUMNS: &str = "network, address, serial_number, cert_pem, private_key_pem, \
     is_valid, not_before, not_after, hd_private_key";

const NODE_COLUMNS: &str = "network, admin_address, address, serial_number, cert_pem, \
     private_key_pem, is_valid, not_before, not_after, hd_private_key, hd_index";

/// SQLite-based store implementation.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path, creating and migrating it as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut conn)
    }
}

fn row_to_admin(row: &rusqlite::Row<'_>) -> rusqlite::Result<NetAdmin> {
    Ok(NetAdmin {
        network: row.get("network")?,
        address: row.get("address")?,
        serial_number: row.get("serial_number")?,
        cert_pem: row.get("cert_pem")?,
        private_key_pem: row.get("private_key_pem")?,
        is_valid: row.get("is_valid")?,
        validity: ValidityWindow {
            not_before: row.get("not_before")?,
            not_after: row.get("not_after")?,
        },
        hd_private_key: row.get("hd_private_key")?,
    })
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        network: row.get("network")?,
        admin_address: row.get("admin_address")?,
        address: row.get("address")?,
        serial_number: row.get("serial_number")?,
        cert_pem: row.get("cert_pem")?,
        private_key_pem: row.get("private_key_pem")?,
        is_valid: row.get("is_valid")?,
        validity: ValidityWindow {
            not_before: row.get("not_before")?,
            not_after: row.get("not_after")?,
        },
        hd_private_key: row.get("hd_private_key")?,
        hd_index: row.get("hd_index")?,
    })
}

fn row_to_revoke(row: &rusqlite::Row<'_>) -> rusqlite::Result<Revoke> {
    Ok(Revoke {
        id: row.get::<_, i64>("id")? as u64,
        network: row.get("network")?,
        serial_number: row.get("serial_number")?,
        revoked_at: row.get("revoked_at")?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn id_to_u64(id: i64) -> Result<u64> {
    u64::try_from(id).map_err(|_| StoreError::InvalidData(format!("negative row id {id}")))
}

fn valid_node_exists(tx: &Transaction<'_>, network: &str, address: &str) -> Result<bool> {
    Ok(tx
        .query_row(
            "SELECT 1 FROM nodes WHERE network = ?1 AND address = ?2 AND is_valid = 1",
            params![network, address],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn append_revocation_tx(
    tx: &Transaction<'_>,
    network: &str,
    serial_number: &str,
    revoked_at: i64,
) -> Result<Revoke> {
    tx.execute(
        "INSERT INTO revocations (network, serial_number, revoked_at) VALUES (?1, ?2, ?3)",
        params![network, serial_number, revoked_at],
    )?;
    Ok(Revoke {
        id: id_to_u64(tx.last_insert_rowid())?,
        network: network.to_string(),
        serial_number: serial_number.to_string(),
        revoked_at,
    })
}

impl AdminStore for SqliteStore {
    fn get_admin(&self, network: &str, address: &str) -> Result<Option<NetAdmin>> {
        self.with_conn(|conn| {
            let admin = conn
                .query_row(
                    &format!(
                        "SELECT {ADMIN_COLUMNS} FROM net_admins
                         WHERE network = ?1 AND address = ?2 AND is_valid = 1"
                    ),
                    params![network, address],
                    row_to_admin,
                )
                .optional()?;
            Ok(admin)
        })
    }

    fn insert_admin(&self, admin: &NetAdmin) -> Result<InsertOutcome> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO net_admins ({ADMIN_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    admin.network,
                    admin.address,
                    admin.serial_number,
                    admin.cert_pem,
                    admin.private_key_pem,
                    admin.is_valid,
                    admin.validity.not_before,
                    admin.validity.not_after,
                    admin.hd_private_key,
                ],
            );
            match inserted {
                Ok(_) => Ok(InsertOutcome::Inserted {
                    id: id_to_u64(conn.last_insert_rowid())?,
                }),
                Err(e) if is_constraint_violation(&e) => Ok(InsertOutcome::AlreadyExists),
                Err(e) => Err(e.into()),
            }
        })
    }
}

impl NodeStore for SqliteStore {
    fn get_valid_node(&self, network: &str, address: &str) -> Result<Option<Node>> {
        self.with_conn(|conn| {
            let node = conn
                .query_row(
                    &format!(
                        "SELECT {NODE_COLUMNS} FROM nodes
                         WHERE network = ?1 AND address = ?2 AND is_valid = 1"
                    ),
                    params![network, address],
                    row_to_node,
                )
                .optional()?;
            Ok(node)
        })
    }

    fn insert_node(&self, node: &Node) -> Result<InsertOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                &format!(
                    "INSERT INTO nodes ({NODE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    node.network,
                    node.admin_address,
                    node.address,
                    node.serial_number,
                    node.cert_pem,
                    node.private_key_pem,
                    node.is_valid,
                    node.validity.not_before,
                    node.validity.not_after,
                    node.hd_private_key,
                    node.hd_index,
                ],
            );
            let outcome = match inserted {
                Ok(_) => InsertOutcome::Inserted {
                    id: id_to_u64(tx.last_insert_rowid())?,
                },
                // Either index may have fired; the address one wins
                Err(e) if is_constraint_violation(&e) => {
                    if node.is_valid && valid_node_exists(&tx, &node.network, &node.address)? {
                        InsertOutcome::AlreadyExists
                    } else {
                        InsertOutcome::OrdinalTaken
                    }
                }
                Err(e) => return Err(e.into()),
            };
            tx.commit()?;
            Ok(outcome)
        })
    }

    fn count_nodes_under_admin(&self, network: &str, admin_address: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE network = ?1 AND admin_address = ?2",
                params![network, admin_address],
                |row| row.get(0),
            )?;
            id_to_u64(count)
        })
    }

    fn revoke_node(&self, network: &str, address: &str, revoked_at: i64) -> Result<Option<Revoke>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let found: Option<(i64, String)> = tx
                .query_row(
                    "SELECT id, serial_number FROM nodes
                     WHERE network = ?1 AND address = ?2 AND is_valid = 1",
                    params![network, address],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((row_id, serial_number)) = found else {
                return Ok(None);
            };

            tx.execute("UPDATE nodes SET is_valid = 0 WHERE id = ?1", params![row_id])?;
            let revoke = append_revocation_tx(&tx, network, &serial_number, revoked_at)?;
            tx.commit()?;
            Ok(Some(revoke))
        })
    }
}

impl RevokeStore for SqliteStore {
    fn append_revocation(
        &self,
        network: &str,
        serial_number: &str,
        revoked_at: i64,
    ) -> Result<Revoke> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let revoke = append_revocation_tx(&tx, network, serial_number, revoked_at)?;
            tx.commit()?;
            Ok(revoke)
        })
    }

    fn revocation_position(&self, network: &str, serial_number: &str) -> Result<Option<u64>> {
        self.with_conn(|conn| {
            let id: Option<i64> = conn.query_row(
                "SELECT MAX(id) FROM revocations WHERE network = ?1 AND serial_number = ?2",
                params![network, serial_number],
                |row| row.get(0),
            )?;
            id.map(id_to_u64).transpose()
        })
    }

    fn revocations_after(
        &self,
        network: &str,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<Revoke>> {
        let after = i64::try_from(after.unwrap_or(0))
            .map_err(|_| StoreError::InvalidData("revocation cursor out of range".to_string()))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, network, serial_number, revoked_at FROM revocations
                 WHERE network = ?1 AND id > ?2 ORDER BY id ASC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![network, after, limit], row_to_revoke)?;
            let mut revocations = Vec::new();
            for row in rows {
                revocations.push(row?);
            }
            Ok(revocations)
        })
    }
}

impl SerialIndex for SqliteStore {
    fn serial_in_use(&self, network: &str, serial_number: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let in_use: bool = conn.query_row(
                "SELECT EXISTS (
                     SELECT 1 FROM net_admins WHERE network = ?1 AND serial_number = ?2
                     UNION ALL
                     SELECT 1 FROM nodes WHERE network = ?1 AND serial_number = ?2
                 )",
                params![network, serial_number],
                |row| row.get(0),
            )?;
            Ok(in_use)
        })
    }
}
