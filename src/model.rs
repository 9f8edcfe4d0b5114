use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use ulid::Ulid;

/// Timestamps are kept at millisecond precision, the resolution of the wire format.
pub type Timestamp = DateTime<Utc>;

/// Render an instant as `2030-01-01T10:00:00.000Z`.
pub fn format_instant(t: &Timestamp) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_instant<S: Serializer>(t: &Timestamp, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_instant(t))
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Span {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A bookable room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub capacity: u32,
}

impl Resource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capacity,
        }
    }
}

/// An exclusive claim on one resource for `[start_time, end_time)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: String,
    pub owner_id: String,
    #[serde(serialize_with = "serialize_instant")]
    pub start_time: Timestamp,
    #[serde(serialize_with = "serialize_instant")]
    pub end_time: Timestamp,
    #[serde(serialize_with = "serialize_instant")]
    pub created_at: Timestamp,
}

impl Reservation {
    pub fn span(&self) -> Span {
        Span::new(self.start_time, self.end_time)
    }
}

/// Fields of a create request, as parsed off the wire. Nothing is checked yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationRequest {
    pub resource_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// Partial update. Absent or empty fields keep the reservation's current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationPatch {
    pub resource_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

fn supplied(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

impl ReservationPatch {
    pub fn is_empty(&self) -> bool {
        supplied(&self.resource_id).is_none()
            && supplied(&self.start_time).is_none()
            && supplied(&self.end_time).is_none()
    }

    /// The supplied resource id, if the patch moves the reservation.
    pub fn new_resource(&self) -> Option<&str> {
        supplied(&self.resource_id)
    }

    /// Resource the patched reservation will live on.
    pub fn target_resource<'a>(&'a self, current: &'a Reservation) -> &'a str {
        supplied(&self.resource_id).unwrap_or(&current.resource_id)
    }

    /// Overlay the supplied fields on `current`, yielding a full request to re-validate.
    pub fn merge_onto(&self, current: &Reservation) -> ReservationRequest {
        ReservationRequest {
            resource_id: Some(self.target_resource(current).to_string()),
            start_time: Some(
                supplied(&self.start_time)
                    .map(str::to_string)
                    .unwrap_or_else(|| format_instant(&current.start_time)),
            ),
            end_time: Some(
                supplied(&self.end_time)
                    .map(str::to_string)
                    .unwrap_or_else(|| format_instant(&current.end_time)),
            ),
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    seq: u64,
    reservation: Reservation,
}

/// All reservations of one resource, sorted by `(start_time, insertion seq)`.
#[derive(Debug, Clone, Default)]
pub struct ResourceState {
    slots: Vec<Slot>,
}

impl ResourceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Insert keeping sort order; equal start times stay in insertion order.
    pub fn insert(&mut self, seq: u64, reservation: Reservation) {
        let key = (reservation.start_time, seq);
        let pos = self
            .slots
            .partition_point(|s| (s.reservation.start_time, s.seq) < key);
        self.slots.insert(pos, Slot { seq, reservation });
    }

    pub fn get(&self, id: &Ulid) -> Option<&Reservation> {
        self.slots
            .iter()
            .find(|s| s.reservation.id == *id)
            .map(|s| &s.reservation)
    }

    /// Remove by id, returning the insertion seq alongside the record.
    pub fn remove(&mut self, id: &Ulid) -> Option<(u64, Reservation)> {
        let pos = self.slots.iter().position(|s| s.reservation.id == *id)?;
        let slot = self.slots.remove(pos);
        Some((slot.seq, slot.reservation))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Reservations in `(start_time, seq)` order.
    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.slots.iter().map(|s| &s.reservation)
    }

    pub(crate) fn iter_with_seq(&self) -> impl Iterator<Item = (u64, &Reservation)> {
        self.slots.iter().map(|s| (s.seq, &s.reservation))
    }

    /// Reservations starting strictly after `now`.
    pub fn starting_after(&self, now: Timestamp) -> impl Iterator<Item = &Reservation> {
        let first = self.slots.partition_point(|s| s.reservation.start_time <= now);
        self.slots[first..].iter().map(|s| &s.reservation)
    }

    /// Reservations whose window intersects `query`.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .slots
            .partition_point(|s| s.reservation.start_time < query.end);
        self.slots[..right_bound]
            .iter()
            .map(|s| &s.reservation)
            .filter(move |r| r.end_time > query.start)
    }
}
