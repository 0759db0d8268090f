use chrono::NaiveTime;
use ulid::Ulid;

use crate::coord::CoordError;
use crate::model::TimeWindow;
use crate::store::StoreError;

/// Stable classification surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Conflict,
    /// Store or lock/cache backend failed; the request may be retried.
    Unavailable,
}

#[derive(Debug)]
pub enum BookingError {
    TableNotFound(Ulid),
    ReservationNotFound(Ulid),
    RestaurantNotFound(Ulid),
    CapacityExceeded {
        party_size: u32,
        capacity: u32,
    },
    OutsideOperatingHours {
        window: TimeWindow,
        opening: NaiveTime,
        closing: NaiveTime,
    },
    AlreadyCancelled(Ulid),
    InvalidField(&'static str),
    InvalidHours(String),
    /// Another admission attempt holds the lock for this exact slot.
    SlotBusy,
    /// Overlaps this confirmed reservation.
    Overlap(Ulid),
    /// The reservation was rewritten between read and write.
    Stale(Ulid),
    DuplicateTableNumber {
        restaurant_id: Ulid,
        number: u32,
    },
    Store(String),
    Coordinator(String),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::TableNotFound(_)
            | BookingError::ReservationNotFound(_)
            | BookingError::RestaurantNotFound(_) => ErrorKind::NotFound,
            BookingError::CapacityExceeded { .. }
            | BookingError::OutsideOperatingHours { .. }
            | BookingError::AlreadyCancelled(_)
            | BookingError::InvalidField(_)
            | BookingError::InvalidHours(_) => ErrorKind::BadRequest,
            BookingError::SlotBusy
            | BookingError::Overlap(_)
            | BookingError::Stale(_)
            | BookingError::DuplicateTableNumber { .. } => ErrorKind::Conflict,
            BookingError::Store(_) | BookingError::Coordinator(_) => ErrorKind::Unavailable,
        }
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            BookingError::TableNotFound(_) => "table_not_found",
            BookingError::ReservationNotFound(_) => "reservation_not_found",
            BookingError::RestaurantNotFound(_) => "restaurant_not_found",
            BookingError::CapacityExceeded { .. } => "capacity_exceeded",
            BookingError::OutsideOperatingHours { .. } => "outside_operating_hours",
            BookingError::AlreadyCancelled(_) => "already_cancelled",
            BookingError::InvalidField(_) => "invalid_field",
            BookingError::InvalidHours(_) => "invalid_hours",
            BookingError::SlotBusy => "slot_busy",
            BookingError::Overlap(_) => "overlap",
            BookingError::Stale(_) => "stale",
            BookingError::DuplicateTableNumber { .. } => "duplicate_table_number",
            BookingError::Store(_) => "store_error",
            BookingError::Coordinator(_) => "coordinator_error",
        }
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::TableNotFound(id) => write!(f, "table not found: {id}"),
            BookingError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            BookingError::RestaurantNotFound(id) => write!(f, "restaurant not found: {id}"),
            BookingError::CapacityExceeded { party_size, capacity } => {
                write!(f, "party of {party_size} exceeds table capacity {capacity}")
            }
            BookingError::OutsideOperatingHours { window, opening, closing } => write!(
                f,
                "reservation {}–{} outside operating hours {}–{}",
                window.start_time_of_day().format("%H:%M"),
                window.end_time_of_day().format("%H:%M"),
                opening.format("%H:%M"),
                closing.format("%H:%M"),
            ),
            BookingError::AlreadyCancelled(id) => write!(f, "reservation already cancelled: {id}"),
            BookingError::InvalidField(field) => write!(f, "invalid field: {field}"),
            BookingError::InvalidHours(msg) => write!(f, "invalid operating hours: {msg}"),
            BookingError::SlotBusy => write!(f, "reservation is being processed, try again"),
            BookingError::Overlap(id) => {
                write!(f, "table already booked for this time slot (reservation {id})")
            }
            BookingError::Stale(id) => {
                write!(f, "reservation {id} was changed concurrently, try again")
            }
            BookingError::DuplicateTableNumber { restaurant_id, number } => write!(
                f,
                "table number {number} already exists for restaurant {restaurant_id}"
            ),
            BookingError::Store(e) => write!(f, "store error: {e}"),
            BookingError::Coordinator(e) => write!(f, "lock/cache error: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateTableNumber { restaurant_id, number } => {
                BookingError::DuplicateTableNumber { restaurant_id, number }
            }
            StoreError::Cancelled(id) => BookingError::AlreadyCancelled(id),
            StoreError::Stale(id) => BookingError::Stale(id),
            other => BookingError::Store(other.to_string()),
        }
    }
}

impl From<CoordError> for BookingError {
    fn from(e: CoordError) -> Self {
        BookingError::Coordinator(e.to_string())
    }
}
