use crate::limits::*;
use crate::model::Ms;

use super::BookingError;

pub(crate) fn validate_customer_name(name: &str) -> Result<(), BookingError> {
    if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
        return Err(BookingError::InvalidField("customer_name"));
    }
    Ok(())
}

/// Optional leading `+`, then digits with optional spaces or dashes; 7 to 15 digits.
pub(crate) fn validate_phone(phone: &str) -> Result<(), BookingError> {
    let body = phone.strip_prefix('+').unwrap_or(phone);
    let digits = body.chars().filter(char::is_ascii_digit).count();
    let well_formed = phone.len() <= MAX_PHONE_LEN
        && body.chars().all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
        && (7..=15).contains(&digits);
    if !well_formed {
        return Err(BookingError::InvalidField("phone"));
    }
    Ok(())
}

pub(crate) fn validate_party_size(party_size: u32) -> Result<(), BookingError> {
    if !(1..=MAX_PARTY_SIZE).contains(&party_size) {
        return Err(BookingError::InvalidField("party_size"));
    }
    Ok(())
}

pub(crate) fn validate_duration(minutes: u32) -> Result<(), BookingError> {
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(BookingError::InvalidField("duration_minutes"));
    }
    Ok(())
}

pub(crate) fn validate_start(start: Ms) -> Result<(), BookingError> {
    if !(MIN_VALID_TIMESTAMP_MS..MAX_VALID_TIMESTAMP_MS).contains(&start) {
        return Err(BookingError::InvalidField("start"));
    }
    Ok(())
}

pub(crate) fn validate_restaurant_name(name: &str) -> Result<(), BookingError> {
    if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
        return Err(BookingError::InvalidField("name"));
    }
    Ok(())
}

pub(crate) fn validate_table(number: u32, capacity: u32) -> Result<(), BookingError> {
    if number == 0 {
        return Err(BookingError::InvalidField("number"));
    }
    if !(1..=MAX_TABLE_CAPACITY).contains(&capacity) {
        return Err(BookingError::InvalidField("capacity"));
    }
    Ok(())
}
