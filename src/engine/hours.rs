use chrono::{NaiveTime, Timelike};

use crate::model::{Ms, Restaurant, TimeWindow};

use super::BookingError;

fn ms_since_midnight(t: NaiveTime) -> Ms {
    Ms::from(t.num_seconds_from_midnight()) * 1_000
}

/// The window must lie within `[opening, closing]` of the UTC day it starts
/// on. A window running past midnight never fits, whatever the hours.
pub(crate) fn validate_operating_hours(
    window: &TimeWindow,
    restaurant: &Restaurant,
) -> Result<(), BookingError> {
    let day = TimeWindow::day(window.start_date());
    let opens_at = day.start + ms_since_midnight(restaurant.opening);
    let closes_at = day.start + ms_since_midnight(restaurant.closing);
    if window.start < opens_at || window.end > closes_at {
        return Err(BookingError::OutsideOperatingHours {
            window: *window,
            opening: restaurant.opening,
            closing: restaurant.closing,
        });
    }
    Ok(())
}

/// Parse `HH:MM`.
pub(crate) fn parse_time_of_day(s: &str) -> Result<NaiveTime, BookingError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| BookingError::InvalidHours(format!("expected HH:MM, got {s:?}")))
}
