mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use conflict::{check_no_overlap, validate, validate_window, Candidate};
pub use error::ReservationError;
pub use store::{ReservationStore, ShardReadGuard, ShardWriteGuard};

use std::sync::Arc;

use ulid::Ulid;

use crate::auth::AccessPolicy;
use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::model::*;

/// The reservation service: validates requests against the catalog and the
/// store, enforces ownership, and is the only writer of the store.
///
/// Every check-then-write runs under the write lock of the affected resource
/// shard(s), so two requests for the same resource never interleave between
/// the overlap check and the insert.
pub struct Engine {
    catalog: Arc<Catalog>,
    store: ReservationStore,
    policy: AccessPolicy,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(catalog: Arc<Catalog>, policy: AccessPolicy, clock: Arc<dyn Clock>) -> Self {
        let store = ReservationStore::new(&catalog);
        Self {
            catalog,
            store,
            policy,
            clock,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &ReservationStore {
        &self.store
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Lookup reservation → resource shard, acquire its write lock, and hand
    /// back the current record. Retries if the record moved shards in between.
    pub(super) fn resolve_entity_write(
        &self,
        id: &Ulid,
        target_resource: Option<&str>,
    ) -> Result<ResolvedWrite<'_>, ReservationError> {
        loop {
            let resource_id = self
                .store
                .resource_of(id)
                .ok_or_else(|| ReservationError::NotFound(id.to_string()))?;
            let source_pos = self
                .store
                .position(&resource_id)
                .ok_or_else(|| ReservationError::NotFound(id.to_string()))?;
            let target_pos = target_resource.and_then(|r| self.store.position(r));
            let (source, target) = self.store.write_pair(source_pos, target_pos);
            if let Some(current) = source.get(id).cloned() {
                return Ok(ResolvedWrite {
                    current,
                    source,
                    target,
                });
            }
        }
    }
}

/// A reservation together with the write guard(s) needed to change it.
pub(super) struct ResolvedWrite<'a> {
    pub current: Reservation,
    pub source: ShardWriteGuard<'a>,
    /// Destination shard when the update moves the reservation elsewhere.
    pub target: Option<ShardWriteGuard<'a>>,
}

/// Reservation ids are ULIDs; anything else cannot name a stored reservation.
pub fn parse_reservation_id(raw: &str) -> Result<Ulid, ReservationError> {
    Ulid::from_string(raw.trim()).map_err(|_| ReservationError::NotFound(raw.to_string()))
}
