use chrono::{Duration, TimeZone, Utc};
use tracing::info;
use ulid::Ulid;

use crate::engine::Engine;
use crate::model::Reservation;

/// (resource, owner, day of January 2027). Each runs 10:00-12:00 UTC.
const DEMO_RESERVATIONS: [(&str, &str, u32); 5] = [
    ("room1", "user1", 1),
    ("room2", "user2", 2),
    ("room3", "user3", 3),
    ("room3", "user1", 4),
    ("room4", "user2", 5),
];

/// Cold-start the store with the stock sample reservations. Existing
/// reservations are dropped first. Returns how many were inserted; rooms
/// missing from a custom catalog are skipped.
pub fn seed_demo(engine: &Engine) -> usize {
    engine.clear_reservations();
    let created_at = engine.now();
    let mut inserted = 0;
    for (resource, owner, day) in DEMO_RESERVATIONS {
        let Some(start) = Utc.with_ymd_and_hms(2027, 1, day, 10, 0, 0).single() else {
            continue;
        };
        let reservation = Reservation {
            id: Ulid::new(),
            resource_id: resource.to_string(),
            owner_id: owner.to_string(),
            start_time: start,
            end_time: start + Duration::hours(2),
            created_at,
        };
        if engine.store().insert(reservation) {
            inserted += 1;
        }
    }
    info!("seeded {inserted} demo reservations");
    inserted
}
