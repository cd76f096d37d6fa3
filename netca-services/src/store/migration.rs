//! Database schema migrations for SQLite.
//!
//! Versioned migrations: each one transforms the schema from version N to N+1.

use rusqlite::Connection;

use super::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {current} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, netca_keys::unix_now()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: admins, nodes and the revocation log.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE net_admins (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            network TEXT NOT NULL,
            address TEXT NOT NULL,
            serial_number TEXT NOT NULL,
            cert_pem TEXT NOT NULL,
            private_key_pem TEXT NOT NULL,
            is_valid INTEGER NOT NULL,
            not_before INTEGER NOT NULL,
            not_after INTEGER NOT NULL,
            hd_private_key TEXT NOT NULL DEFAULT ''
        );

        -- One valid admin per (network, address)
        CREATE UNIQUE INDEX idx_net_admins_valid
            ON net_admins(network, address) WHERE is_valid = 1;
        CREATE INDEX idx_net_admins_serial ON net_admins(network, serial_number);

        CREATE TABLE nodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            network TEXT NOT NULL,
            admin_address TEXT NOT NULL,
            address TEXT NOT NULL,
            serial_number TEXT NOT NULL,
            cert_pem TEXT NOT NULL,
            private_key_pem TEXT NOT NULL,
            is_valid INTEGER NOT NULL,
            not_before INTEGER NOT NULL,
            not_after INTEGER NOT NULL,
            hd_private_key TEXT NOT NULL,
            hd_index INTEGER NOT NULL
        );

        -- One valid node per (network, address)
        CREATE UNIQUE INDEX idx_nodes_valid
            ON nodes(network, address) WHERE is_valid = 1;
        -- Ordinals are never reused under an admin, revoked nodes included
        CREATE UNIQUE INDEX idx_nodes_ordinal
            ON nodes(network, admin_address, hd_index);
        CREATE INDEX idx_nodes_serial ON nodes(network, serial_number);

        -- Append-only; id is the cursor order
        CREATE TABLE revocations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            network TEXT NOT NULL,
            serial_number TEXT NOT NULL,
            revoked_at INTEGER NOT NULL
        );

        CREATE INDEX idx_revocations_network ON revocations(network, id);
        CREATE INDEX idx_revocations_serial ON revocations(network, serial_number);
        "#,
    )?;

    Ok(())
}
