//! Revocation registry: an append-only log of revoked serial numbers per
//! network, read incrementally from a cursor serial.

use std::collections::VecDeque;
use std::sync::Arc;

use netca_common::logging::{Component, Logger};
use netca_keys::unix_now;

use crate::error::{CaError, Result};
use crate::store::CaStore;
use crate::types::{require_param, Revoke};

pub struct RevocationRegistry {
    store: Arc<dyn CaStore>,
    page_size: usize,
    logger: Arc<Logger>,
}

impl RevocationRegistry {
    pub fn new(store: Arc<dyn CaStore>, page_size: usize, logger: Arc<Logger>) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            logger: Arc::new(logger.with_component(Component::Revocation)),
        }
    }

    pub fn append_revocation(&self, network: &str, serial_number: &str) -> Result<Revoke> {
        require_param("network", network)?;
        require_param("serial number", serial_number)?;
        let revoke = self
            .store
            .append_revocation(network, serial_number, unix_now())?;
        self.logger.with_network(network).info(format!(
            "Serial {serial_number} appended to revocation log at position {}",
            revoke.id
        ));
        Ok(revoke)
    }

    /// Entries of `network` appended after the entry for `cursor_serial`, in
    /// insertion order. An empty or unknown cursor yields the full history.
    pub fn list_since(&self, network: &str, cursor_serial: &str) -> Result<RevokeIter> {
        require_param("network", network)?;
        let log = self.logger.with_network(network);

        let after = if cursor_serial.is_empty() {
            None
        } else {
            let position = self.store.revocation_position(network, cursor_serial)?;
            if position.is_none() {
                log.debug(format!(
                    "Cursor {cursor_serial} not in revocation log, listing full history"
                ));
            }
            position
        };
        log.debug(format!("Listing revocations after {after:?}"));

        Ok(RevokeIter {
            store: self.store.clone(),
            network: network.to_string(),
            after,
            page_size: self.page_size,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    pub fn collect_since(&self, network: &str, cursor_serial: &str) -> Result<Vec<Revoke>> {
        self.list_since(network, cursor_serial)?.collect()
    }
}

/// Lazy iterator over revocation entries. Pages are fetched from the store on
/// demand; a store failure is yielded once and ends the iteration.
pub struct RevokeIter {
    store: Arc<dyn CaStore>,
    network: String,
    after: Option<u64>,
    page_size: usize,
    buffer: VecDeque<Revoke>,
    exhausted: bool,
}

impl RevokeIter {
    fn fetch_page(&mut self) -> Result<()> {
        let page = self
            .store
            .revocations_after(&self.network, self.after, self.page_size)?;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.after = Some(last.id);
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for RevokeIter {
    type Item = Result<Revoke>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(CaError::from(e)));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
