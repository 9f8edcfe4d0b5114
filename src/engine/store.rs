use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use ulid::Ulid;

use crate::catalog::Catalog;
use crate::model::*;

use super::conflict::parse_instant;

/// One lock-protected shard per catalog resource.
struct Shard {
    resource_id: String,
    state: RwLock<ResourceState>,
}

/// Authoritative in-memory reservation set.
///
/// Shards are fixed at construction (one per catalog resource) and are always
/// locked in catalog order, so multi-shard operations cannot deadlock.
pub struct ReservationStore {
    shards: Vec<Shard>,
    positions: std::collections::HashMap<String, usize>,
    /// Reverse lookup: reservation id → resource id. Only changed while the
    /// owning shard's write lock is held.
    entity_to_resource: DashMap<Ulid, String>,
    next_seq: AtomicU64,
}

pub type ShardWriteGuard<'a> = RwLockWriteGuard<'a, ResourceState>;
pub type ShardReadGuard<'a> = RwLockReadGuard<'a, ResourceState>;

impl ReservationStore {
    pub fn new(catalog: &Catalog) -> Self {
        let shards = catalog
            .list()
            .iter()
            .map(|r| Shard {
                resource_id: r.id.clone(),
                state: RwLock::new(ResourceState::new()),
            })
            .collect();
        let positions = catalog
            .list()
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.id.clone(), pos))
            .collect();
        Self {
            shards,
            positions,
            entity_to_resource: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    // ── Locking ──────────────────────────────────────────────

    pub(crate) fn position(&self, resource_id: &str) -> Option<usize> {
        self.positions.get(resource_id).copied()
    }

    pub(crate) fn read_at(&self, pos: usize) -> ShardReadGuard<'_> {
        self.shards[pos]
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_at(&self, pos: usize) -> ShardWriteGuard<'_> {
        self.shards[pos]
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read(&self, resource_id: &str) -> Option<ShardReadGuard<'_>> {
        self.position(resource_id).map(|pos| self.read_at(pos))
    }

    pub fn write(&self, resource_id: &str) -> Option<ShardWriteGuard<'_>> {
        self.position(resource_id).map(|pos| self.write_at(pos))
    }

    /// Write-lock two shards in catalog order. `b` is `None` when it names the
    /// same shard as `a` or no shard at all.
    pub(crate) fn write_pair(
        &self,
        a: usize,
        b: Option<usize>,
    ) -> (ShardWriteGuard<'_>, Option<ShardWriteGuard<'_>>) {
        match b {
            Some(b) if b != a => {
                if a < b {
                    let ga = self.write_at(a);
                    let gb = self.write_at(b);
                    (ga, Some(gb))
                } else {
                    let gb = self.write_at(b);
                    let ga = self.write_at(a);
                    (ga, Some(gb))
                }
            }
            _ => (self.write_at(a), None),
        }
    }

    /// Read-lock every shard, in catalog order, for a consistent snapshot.
    fn read_all(&self) -> Vec<ShardReadGuard<'_>> {
        (0..self.shards.len()).map(|pos| self.read_at(pos)).collect()
    }

    // ── Entity index ─────────────────────────────────────────

    pub fn resource_of(&self, id: &Ulid) -> Option<String> {
        self.entity_to_resource.get(id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entity_to_resource.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_to_resource.is_empty()
    }

    // ── Mutations under a held guard ─────────────────────────

    /// Insert into an already-locked shard. No validation happens here.
    pub(crate) fn insert_locked(&self, rs: &mut ResourceState, reservation: Reservation) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entity_to_resource
            .insert(reservation.id, reservation.resource_id.clone());
        rs.insert(seq, reservation);
    }

    pub(crate) fn remove_locked(&self, rs: &mut ResourceState, id: &Ulid) -> Option<Reservation> {
        let (_, removed) = rs.remove(id)?;
        self.entity_to_resource.remove(id);
        Some(removed)
    }

    /// Replace a reservation's resource and window. `target` is the destination
    /// shard when the reservation moves; otherwise it is re-slotted in `source`.
    /// The insertion seq survives so tie ordering is unchanged.
    pub(crate) fn replace_locked(
        &self,
        source: &mut ResourceState,
        target: Option<&mut ResourceState>,
        id: &Ulid,
        resource_id: String,
        span: Span,
    ) -> Option<Reservation> {
        let (seq, mut reservation) = source.remove(id)?;
        reservation.resource_id = resource_id;
        reservation.start_time = span.start;
        reservation.end_time = span.end;
        self.entity_to_resource
            .insert(*id, reservation.resource_id.clone());
        let updated = reservation.clone();
        match target {
            Some(dst) => dst.insert(seq, reservation),
            None => source.insert(seq, reservation),
        }
        Some(updated)
    }

    // ── Self-locking store API ───────────────────────────────

    /// Insert a fully-formed reservation. Returns false when its resource has
    /// no shard. Callers validate first; this only stores.
    pub fn insert(&self, reservation: Reservation) -> bool {
        let Some(mut rs) = self.write(&reservation.resource_id) else {
            return false;
        };
        self.insert_locked(&mut rs, reservation);
        true
    }

    pub fn get(&self, id: &Ulid) -> Option<Reservation> {
        // A concurrent move can re-home the record between the index lookup
        // and the lock; look again until the two agree or the record is gone.
        loop {
            let resource_id = self.resource_of(id)?;
            let rs = self.read(&resource_id)?;
            if let Some(found) = rs.get(id) {
                return Some(found.clone());
            }
        }
    }

    /// Reservations on `resource_id` starting strictly after `now`, by start time.
    pub fn list_by_resource_future(&self, resource_id: &str, now: Timestamp) -> Vec<Reservation> {
        self.read(resource_id)
            .map(|rs| rs.starting_after(now).cloned().collect())
            .unwrap_or_default()
    }

    /// Every reservation of `owner_id`, past ones included, by start time.
    pub fn list_by_owner(&self, owner_id: &str) -> Vec<Reservation> {
        let guards = self.read_all();
        let mut found: Vec<(u64, &Reservation)> = guards
            .iter()
            .flat_map(|rs| rs.iter_with_seq())
            .filter(|(_, r)| r.owner_id == owner_id)
            .collect();
        found.sort_by_key(|(seq, r)| (r.start_time, *seq));
        found.into_iter().map(|(_, r)| r.clone()).collect()
    }

    /// Every reservation in insertion order.
    pub fn list_all(&self) -> Vec<Reservation> {
        let guards = self.read_all();
        let mut all: Vec<(u64, &Reservation)> =
            guards.iter().flat_map(|rs| rs.iter_with_seq()).collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, r)| r.clone()).collect()
    }

    /// Apply the supplied subset of a patch. The caller must already have
    /// validated the resulting state. `None` when `id` is absent, the target
    /// resource has no shard, or a supplied time does not parse.
    pub fn update(&self, id: &Ulid, patch: &ReservationPatch) -> Option<Reservation> {
        loop {
            let current_resource = self.resource_of(id)?;
            let source_pos = self.position(&current_resource)?;
            let target_pos = match patch.new_resource() {
                Some(r) => Some(self.position(r)?),
                None => None,
            };
            let (mut source, mut target) = self.write_pair(source_pos, target_pos);
            let Some(current) = source.get(id).cloned() else {
                continue;
            };

            let merged = patch.merge_onto(&current);
            let start = parse_instant(merged.start_time.as_deref()?).ok()?;
            let end = parse_instant(merged.end_time.as_deref()?).ok()?;
            if start >= end {
                return None;
            }
            return self.replace_locked(
                &mut source,
                target.as_deref_mut(),
                id,
                patch.target_resource(&current).to_string(),
                Span::new(start, end),
            );
        }
    }

    pub fn remove(&self, id: &Ulid) -> bool {
        loop {
            let Some(resource_id) = self.resource_of(id) else {
                return false;
            };
            let Some(mut rs) = self.write(&resource_id) else {
                return false;
            };
            if self.remove_locked(&mut rs, id).is_some() {
                return true;
            }
        }
    }

    /// Drop every reservation. For test harnesses and cold-start seeding.
    pub fn clear(&self) {
        let mut guards: Vec<_> = (0..self.shards.len()).map(|pos| self.write_at(pos)).collect();
        for rs in guards.iter_mut() {
            rs.clear();
        }
        self.entity_to_resource.clear();
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = &str> {
        self.shards.iter().map(|s| s.resource_id.as_str())
    }
}
