use ulid::Ulid;

use crate::model::{Reservation, TimeWindow};
use crate::store::ReservationStore;

use super::BookingError;

/// CONFIRMED reservations on `table_id` overlapping `window`, minus `exclude`.
///
/// This is the conflict oracle: it must run after the slot lock is held and
/// before the write, reading the store's latest committed state.
pub(crate) async fn find_conflicting(
    store: &dyn ReservationStore,
    table_id: Ulid,
    window: TimeWindow,
    exclude: Option<Ulid>,
) -> Result<Vec<Reservation>, BookingError> {
    let mut found = store.confirmed_overlapping(table_id, window).await?;
    found.retain(|r| Some(r.id) != exclude && r.is_confirmed() && r.window.overlaps(&window));
    Ok(found)
}

/// `Overlap` naming the earliest conflicting reservation, if any.
pub(crate) async fn ensure_no_conflict(
    store: &dyn ReservationStore,
    table_id: Ulid,
    window: TimeWindow,
    exclude: Option<Ulid>,
) -> Result<(), BookingError> {
    let conflicts = find_conflicting(store, table_id, window, exclude).await?;
    match conflicts.iter().min_by_key(|r| r.window.start) {
        Some(first) => Err(BookingError::Overlap(first.id)),
        None => Ok(()),
    }
}
