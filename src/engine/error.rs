use ulid::Ulid;

/// Every way a reservation operation can be refused. All of them are final:
/// the same request against the same state fails the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationError {
    MissingField(&'static str),
    ResourceNotFound(String),
    InvalidTimeFormat(String),
    InvalidRange,
    NotInFuture,
    Overlap(Ulid),
    NoFieldsProvided,
    NotFound(String),
    Forbidden(Ulid),
}

impl ReservationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ReservationError::MissingField(_) => "missing_field",
            ReservationError::ResourceNotFound(_) => "resource_not_found",
            ReservationError::InvalidTimeFormat(_) => "invalid_time_format",
            ReservationError::InvalidRange => "invalid_range",
            ReservationError::NotInFuture => "not_in_future",
            ReservationError::Overlap(_) => "overlap",
            ReservationError::NoFieldsProvided => "no_fields_provided",
            ReservationError::NotFound(_) => "not_found",
            ReservationError::Forbidden(_) => "forbidden",
        }
    }
}

impl std::fmt::Display for ReservationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationError::MissingField(what) => write!(f, "{what} is required"),
            ReservationError::ResourceNotFound(id) => write!(f, "resource not found: {id}"),
            ReservationError::InvalidTimeFormat(raw) => {
                write!(f, "invalid time format: {raw:?}; use ISO 8601")
            }
            ReservationError::InvalidRange => write!(f, "startTime must be less than endTime"),
            ReservationError::NotInFuture => write!(f, "startTime must be in the future"),
            ReservationError::Overlap(id) => {
                write!(f, "reservation overlaps with an existing reservation: {id}")
            }
            ReservationError::NoFieldsProvided => write!(
                f,
                "at least one field (resourceId, startTime, endTime) must be provided"
            ),
            ReservationError::NotFound(id) => write!(f, "reservation not found: {id}"),
            ReservationError::Forbidden(id) => {
                write!(f, "not allowed to modify reservation: {id}")
            }
        }
    }
}

impl std::error::Error for ReservationError {}
