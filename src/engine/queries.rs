use ulid::Ulid;

use crate::model::*;

use super::{Engine, ReservationError};

impl Engine {
    pub fn list_resources(&self) -> &[Resource] {
        self.catalog.list()
    }

    pub fn get_reservation(&self, id: &Ulid) -> Result<Reservation, ReservationError> {
        self.store
            .get(id)
            .ok_or_else(|| ReservationError::NotFound(id.to_string()))
    }

    /// Every reservation, in the order they were made.
    pub fn list_reservations(&self) -> Vec<Reservation> {
        self.store.list_all()
    }

    /// Upcoming reservations for one resource (start strictly after now), by start time.
    pub fn list_resource_reservations(
        &self,
        resource_id: &str,
    ) -> Result<Vec<Reservation>, ReservationError> {
        if self.catalog.get(resource_id).is_none() {
            return Err(ReservationError::ResourceNotFound(resource_id.to_string()));
        }
        Ok(self.store.list_by_resource_future(resource_id, self.now()))
    }

    /// All of an owner's reservations, past ones included, by start time.
    pub fn list_owner_reservations(&self, owner_id: &str) -> Vec<Reservation> {
        self.store.list_by_owner(owner_id)
    }
}
