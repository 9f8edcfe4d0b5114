use tracing::debug;
use ulid::Ulid;

use crate::model::*;

use super::conflict::{check_no_overlap, validate, validate_window};
use super::{Engine, ReservationError};

impl Engine {
    /// Book `request` on behalf of `owner_id`, who becomes the owner.
    pub fn create_reservation(
        &self,
        owner_id: &str,
        request: &ReservationRequest,
    ) -> Result<Reservation, ReservationError> {
        let now = self.now();
        let candidate = validate_window(&self.catalog, request, now)?;

        let mut guard = self
            .store
            .write(&candidate.resource_id)
            .ok_or_else(|| ReservationError::ResourceNotFound(candidate.resource_id.clone()))?;
        check_no_overlap(&guard, &candidate.span, None)?;

        let reservation = Reservation {
            id: Ulid::new(),
            resource_id: candidate.resource_id,
            owner_id: owner_id.to_string(),
            start_time: candidate.span.start,
            end_time: candidate.span.end,
            created_at: now,
        };
        self.store.insert_locked(&mut guard, reservation.clone());
        debug!(
            id = %reservation.id,
            resource = %reservation.resource_id,
            owner = %reservation.owner_id,
            "reservation created"
        );
        Ok(reservation)
    }

    /// Change the resource and/or window of an existing reservation.
    ///
    /// Order of refusals: unknown id, caller not allowed, empty patch, then the
    /// same validation as create on the merged result (excluding itself from
    /// the overlap scan). Nothing is written unless every check passes.
    pub fn update_reservation(
        &self,
        caller_id: &str,
        id: &Ulid,
        patch: &ReservationPatch,
    ) -> Result<Reservation, ReservationError> {
        let now = self.now();
        let mut resolved = self.resolve_entity_write(id, patch.new_resource())?;

        if !self.policy.can_mutate(caller_id, &resolved.current) {
            return Err(ReservationError::Forbidden(*id));
        }
        if patch.is_empty() {
            return Err(ReservationError::NoFieldsProvided);
        }

        let merged = patch.merge_onto(&resolved.current);
        let candidate = {
            let source: &ResourceState = &resolved.source;
            let target = resolved.target.as_deref();
            let current_resource = resolved.current.resource_id.as_str();
            validate(
                &self.catalog,
                |resource_id| {
                    if resource_id == current_resource {
                        Some(source)
                    } else {
                        target
                    }
                },
                &merged,
                Some(*id),
                now,
            )?
        };

        let updated = self
            .store
            .replace_locked(
                &mut resolved.source,
                resolved.target.as_deref_mut(),
                id,
                candidate.resource_id,
                candidate.span,
            )
            .ok_or_else(|| ReservationError::NotFound(id.to_string()))?;
        debug!(
            id = %updated.id,
            resource = %updated.resource_id,
            caller = caller_id,
            "reservation updated"
        );
        Ok(updated)
    }

    /// Cancel a reservation. Only its owner or the privileged identity may.
    pub fn delete_reservation(&self, caller_id: &str, id: &Ulid) -> Result<(), ReservationError> {
        let mut resolved = self.resolve_entity_write(id, None)?;
        if !self.policy.can_mutate(caller_id, &resolved.current) {
            return Err(ReservationError::Forbidden(*id));
        }
        self.store
            .remove_locked(&mut resolved.source, id)
            .ok_or_else(|| ReservationError::NotFound(id.to_string()))?;
        debug!(id = %id, caller = caller_id, "reservation cancelled");
        Ok(())
    }

    /// Drop every reservation. Test harnesses and seeding only.
    pub fn clear_reservations(&self) {
        self.store.clear();
    }
}
