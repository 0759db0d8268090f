use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds (UTC). The only instant type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Ms,
    pub end: Ms,
}

impl TimeWindow {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "TimeWindow start must be before end");
        Self { start, end }
    }

    /// `[start, start + minutes)`.
    pub fn from_duration(start: Ms, minutes: u32) -> Self {
        Self::new(start, start + Ms::from(minutes) * MINUTE_MS)
    }

    /// The whole UTC day `[date 00:00, date+1 00:00)`.
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
        Self::new(start, start + DAY_MS)
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// UTC date the window starts on.
    pub fn start_date(&self) -> NaiveDate {
        to_datetime(self.start).date_naive()
    }

    pub fn start_time_of_day(&self) -> NaiveTime {
        to_datetime(self.start).time()
    }

    pub fn end_time_of_day(&self) -> NaiveTime {
        to_datetime(self.end).time()
    }
}

/// Out-of-range instants clamp to the epoch; callers validate range first.
pub fn to_datetime(ms: Ms) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub fn to_rfc3339(ms: Ms) -> String {
    to_datetime(ms).to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn now_ms() -> Ms {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Confirmed,
    /// Terminal.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: Ulid,
    pub name: String,
    pub opening: NaiveTime,
    pub closing: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: Ulid,
    pub restaurant_id: Ulid,
    pub number: u32,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub table_id: Ulid,
    pub restaurant_id: Ulid,
    pub customer_name: String,
    pub phone: String,
    pub party_size: u32,
    pub window: TimeWindow,
    pub status: ReservationStatus,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Reservation {
    pub fn is_confirmed(&self) -> bool {
        self.status == ReservationStatus::Confirmed
    }
}

/// Restaurant with its tables, as served by the cached detail read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantDetails {
    pub restaurant: Restaurant,
    pub tables: Vec<Table>,
    /// Tables with no confirmed reservation covering the lookup instant.
    pub available_tables: Vec<Table>,
}

// ── Inputs ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReservation {
    pub table_id: Ulid,
    pub customer_name: String,
    pub phone: String,
    pub party_size: u32,
    pub start: Ms,
    pub duration_minutes: u32,
}

/// Unset fields keep their current values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifyReservation {
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub party_size: Option<u32>,
    pub start: Option<Ms>,
    pub duration_minutes: Option<u32>,
    pub status: Option<ReservationStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRestaurant {
    pub name: String,
    /// `HH:MM`
    pub opening: String,
    /// `HH:MM`
    pub closing: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub restaurant_id: Ulid,
    pub number: u32,
    pub capacity: u32,
}

/// One record per committed write. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RestaurantCreated { restaurant: Restaurant },
    TableAdded { table: Table },
    ReservationCreated { reservation: Reservation },
    ReservationUpdated { reservation: Reservation },
    ReservationCancelled { id: Ulid, table_id: Ulid, at: Ms },
}
