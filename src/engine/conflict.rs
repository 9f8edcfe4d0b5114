use chrono::{DateTime, NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::catalog::Catalog;
use crate::clock::truncate_to_millis;
use crate::model::*;

use super::ReservationError;

/// A request that passed every check that does not look at the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub resource_id: String,
    pub span: Span,
}

fn required<'a>(field: &'a Option<String>, name: &'static str) -> Result<&'a str, ReservationError> {
    field
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(ReservationError::MissingField(name))
}

/// ISO-8601 shapes accepted besides RFC 3339, with an explicit numeric offset.
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%dT%H:%M%:z",
];

/// Shapes tried on the text before a trailing `Z`.
const UTC_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse an ISO-8601 instant. RFC 3339 first, then minute precision, compact
/// offsets, and a bare date (UTC midnight). Local times without an offset are
/// refused since they name no single instant.
pub(crate) fn parse_instant(raw: &str) -> Result<Timestamp, ReservationError> {
    let text = raw.trim();
    parse_iso8601(text)
        .map(truncate_to_millis)
        .ok_or_else(|| ReservationError::InvalidTimeFormat(raw.to_string()))
}

fn parse_iso8601(text: &str) -> Option<Timestamp> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.to_utc());
    }
    if let Some(naive) = text.strip_suffix(['Z', 'z']) {
        return UTC_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
            .map(|t| t.and_utc());
    }
    if let Some(t) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
    {
        return Some(t.to_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

pub(crate) fn parse_span(start: &str, end: &str) -> Result<Span, ReservationError> {
    let start = parse_instant(start)?;
    let end = parse_instant(end)?;
    if start >= end {
        return Err(ReservationError::InvalidRange);
    }
    Ok(Span::new(start, end))
}

pub(crate) fn require_future(span: &Span, now: Timestamp) -> Result<(), ReservationError> {
    if span.start <= now {
        return Err(ReservationError::NotInFuture);
    }
    Ok(())
}

/// Checks 1-4, in order: presence, resource existence, time shape, future-only.
pub fn validate_window(
    catalog: &Catalog,
    request: &ReservationRequest,
    now: Timestamp,
) -> Result<Candidate, ReservationError> {
    let resource_id = required(&request.resource_id, "resourceId")?;
    let start = required(&request.start_time, "startTime")?;
    let end = required(&request.end_time, "endTime")?;

    let resource = catalog
        .get(resource_id)
        .ok_or_else(|| ReservationError::ResourceNotFound(resource_id.to_string()))?;

    let span = parse_span(start, end)?;
    require_future(&span, now)?;

    Ok(Candidate {
        resource_id: resource.id.clone(),
        span,
    })
}

/// Check 5: no other reservation on the shard intersects `span`.
/// `exclude` is the reservation being updated, which may not conflict with itself.
pub fn check_no_overlap(
    rs: &ResourceState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), ReservationError> {
    match rs
        .overlapping(span)
        .find(|r| Some(r.id) != exclude)
    {
        Some(existing) => Err(ReservationError::Overlap(existing.id)),
        None => Ok(()),
    }
}

/// The full pipeline. `shard` resolves a resource id to its current contents;
/// it is only consulted once checks 1-4 have passed. A resource with no shard
/// to check against is refused as unknown.
pub fn validate<'a>(
    catalog: &Catalog,
    shard: impl FnOnce(&str) -> Option<&'a ResourceState>,
    request: &ReservationRequest,
    exclude: Option<Ulid>,
    now: Timestamp,
) -> Result<Candidate, ReservationError> {
    let candidate = validate_window(catalog, request, now)?;
    let rs = shard(&candidate.resource_id)
        .ok_or_else(|| ReservationError::ResourceNotFound(candidate.resource_id.clone()))?;
    check_no_overlap(rs, &candidate.span, exclude)?;
    Ok(candidate)
}
