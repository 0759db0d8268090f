use std::time::Instant;

use tracing::info;
use ulid::Ulid;

use crate::coord::{table_number_key, table_slot_key};
use crate::model::*;

use super::hours::{parse_time_of_day, validate_operating_hours};
use super::input::*;
use super::lock::acquire_slot;
use super::overlap::ensure_no_conflict;
use super::{BookingEngine, BookingError, observe};

fn ensure_capacity(party_size: u32, table: &Table) -> Result<(), BookingError> {
    if party_size > table.capacity {
        return Err(BookingError::CapacityExceeded { party_size, capacity: table.capacity });
    }
    Ok(())
}

/// `updated_at` doubles as the row version, so it must move forward even
/// within one millisecond.
fn next_version(current: &Reservation) -> Ms {
    now_ms().max(current.updated_at + 1)
}

impl BookingEngine {
    /// Admit a new CONFIRMED reservation.
    ///
    /// Every check that needs no lock runs first. The slot lock is taken only
    /// around the overlap query and the insert, and is released whatever
    /// their outcome.
    pub async fn create(&self, input: CreateReservation) -> Result<Reservation, BookingError> {
        let started = Instant::now();
        let result = self.create_inner(input).await;
        observe("create", started, &result);
        result
    }

    async fn create_inner(&self, input: CreateReservation) -> Result<Reservation, BookingError> {
        validate_customer_name(&input.customer_name)?;
        validate_phone(&input.phone)?;
        validate_party_size(input.party_size)?;
        validate_duration(input.duration_minutes)?;
        validate_start(input.start)?;

        let (table, restaurant) = self
            .store
            .table_with_restaurant(input.table_id)
            .await?
            .ok_or(BookingError::TableNotFound(input.table_id))?;
        ensure_capacity(input.party_size, &table)?;

        let window = TimeWindow::from_duration(input.start, input.duration_minutes);
        validate_operating_hours(&window, &restaurant)?;

        let now = now_ms();
        let reservation = Reservation {
            id: Ulid::new(),
            table_id: table.id,
            restaurant_id: table.restaurant_id,
            customer_name: input.customer_name,
            phone: input.phone,
            party_size: input.party_size,
            window,
            status: ReservationStatus::Confirmed,
            created_at: now,
            updated_at: now,
        };

        let guard = acquire_slot(&self.coord, table_slot_key(table.id, window), self.lock_ttl).await?;
        let admitted = async {
            ensure_no_conflict(self.store.as_ref(), table.id, window, None).await?;
            self.store.insert_reservation(&reservation).await?;
            self.cache
                .invalidate_reservation_views(reservation.restaurant_id, &[window.start_date()])
                .await;
            Ok::<_, BookingError>(())
        }
        .await;
        guard.release().await;
        admitted?;

        metrics::counter!(crate::observability::RESERVATIONS_ADMITTED_TOTAL, "operation" => "create")
            .increment(1);
        info!(
            reservation = %reservation.id,
            table = %table.id,
            start = %to_rfc3339(window.start),
            end = %to_rfc3339(window.end),
            party_size = reservation.party_size,
            "reservation confirmed"
        );
        Ok(reservation)
    }

    /// Rewrite a CONFIRMED reservation. Unset fields keep their current
    /// values and the result is re-admitted under the lock for its new window.
    pub async fn modify(&self, id: Ulid, input: ModifyReservation) -> Result<Reservation, BookingError> {
        let started = Instant::now();
        let result = self.modify_inner(id, input).await;
        observe("modify", started, &result);
        result
    }

    async fn modify_inner(&self, id: Ulid, input: ModifyReservation) -> Result<Reservation, BookingError> {
        let current = self
            .store
            .reservation(id)
            .await?
            .ok_or(BookingError::ReservationNotFound(id))?;
        if !current.is_confirmed() {
            return Err(BookingError::AlreadyCancelled(id));
        }

        if let Some(name) = &input.customer_name {
            validate_customer_name(name)?;
        }
        if let Some(phone) = &input.phone {
            validate_phone(phone)?;
        }
        if let Some(party_size) = input.party_size {
            validate_party_size(party_size)?;
        }
        if let Some(minutes) = input.duration_minutes {
            validate_duration(minutes)?;
        }
        if let Some(start) = input.start {
            validate_start(start)?;
        }

        let (table, restaurant) = self
            .store
            .table_with_restaurant(current.table_id)
            .await?
            .ok_or(BookingError::TableNotFound(current.table_id))?;

        let party_size = input.party_size.unwrap_or(current.party_size);
        ensure_capacity(party_size, &table)?;

        let start = input.start.unwrap_or(current.window.start);
        let window = match input.duration_minutes {
            Some(minutes) => TimeWindow::from_duration(start, minutes),
            None => TimeWindow::new(start, start + current.window.duration_ms()),
        };
        validate_operating_hours(&window, &restaurant)?;

        let updated = Reservation {
            customer_name: input.customer_name.unwrap_or_else(|| current.customer_name.clone()),
            phone: input.phone.unwrap_or_else(|| current.phone.clone()),
            party_size,
            window,
            status: input.status.unwrap_or(current.status),
            updated_at: next_version(&current),
            ..current.clone()
        };
        let touched = [current.window.start_date(), window.start_date()];

        // Cancelling frees the slot, so it cannot create an overlap.
        if updated.status == ReservationStatus::Cancelled {
            self.store.update_reservation(&updated, current.updated_at).await?;
            self.cache
                .invalidate_reservation_views(updated.restaurant_id, &touched)
                .await;
            info!(reservation = %id, "reservation modified and cancelled");
            return Ok(updated);
        }

        let guard = acquire_slot(&self.coord, table_slot_key(table.id, window), self.lock_ttl).await?;
        let admitted = async {
            ensure_no_conflict(self.store.as_ref(), table.id, window, Some(id)).await?;
            self.store.update_reservation(&updated, current.updated_at).await?;
            self.cache
                .invalidate_reservation_views(updated.restaurant_id, &touched)
                .await;
            Ok::<_, BookingError>(())
        }
        .await;
        guard.release().await;
        admitted?;

        metrics::counter!(crate::observability::RESERVATIONS_ADMITTED_TOTAL, "operation" => "modify")
            .increment(1);
        info!(
            reservation = %id,
            table = %table.id,
            start = %to_rfc3339(window.start),
            end = %to_rfc3339(window.end),
            party_size,
            "reservation modified"
        );
        Ok(updated)
    }

    /// CONFIRMED → CANCELLED. Cancelling twice is a caller error.
    pub async fn cancel(&self, id: Ulid) -> Result<Reservation, BookingError> {
        let started = Instant::now();
        let result = self.cancel_inner(id).await;
        observe("cancel", started, &result);
        result
    }

    async fn cancel_inner(&self, id: Ulid) -> Result<Reservation, BookingError> {
        let current = self
            .store
            .reservation(id)
            .await?
            .ok_or(BookingError::ReservationNotFound(id))?;
        if !current.is_confirmed() {
            return Err(BookingError::AlreadyCancelled(id));
        }

        let read_at = current.updated_at;
        let cancelled = Reservation {
            status: ReservationStatus::Cancelled,
            updated_at: next_version(&current),
            ..current
        };
        self.store.update_reservation(&cancelled, read_at).await?;
        self.cache
            .invalidate_reservation_views(cancelled.restaurant_id, &[cancelled.window.start_date()])
            .await;

        info!(reservation = %id, table = %cancelled.table_id, "reservation cancelled");
        Ok(cancelled)
    }

    pub async fn create_restaurant(&self, input: CreateRestaurant) -> Result<Restaurant, BookingError> {
        let started = Instant::now();
        let result = self.create_restaurant_inner(input).await;
        observe("create_restaurant", started, &result);
        result
    }

    async fn create_restaurant_inner(&self, input: CreateRestaurant) -> Result<Restaurant, BookingError> {
        validate_restaurant_name(&input.name)?;
        let opening = parse_time_of_day(&input.opening)?;
        let closing = parse_time_of_day(&input.closing)?;
        if opening >= closing {
            return Err(BookingError::InvalidHours(format!(
                "opening {} must be before closing {}",
                input.opening, input.closing
            )));
        }

        let restaurant = Restaurant { id: Ulid::new(), name: input.name, opening, closing };
        self.store.insert_restaurant(restaurant.clone()).await?;
        info!(restaurant = %restaurant.id, name = %restaurant.name, "restaurant registered");
        Ok(restaurant)
    }

    /// Register a table. Concurrent attempts on the same number are
    /// serialised by a slot lock; the store enforces uniqueness regardless.
    pub async fn add_table(&self, input: CreateTable) -> Result<Table, BookingError> {
        let started = Instant::now();
        let result = self.add_table_inner(input).await;
        observe("add_table", started, &result);
        result
    }

    async fn add_table_inner(&self, input: CreateTable) -> Result<Table, BookingError> {
        validate_table(input.number, input.capacity)?;

        let key = table_number_key(input.restaurant_id, input.number);
        let guard = acquire_slot(&self.coord, key, self.lock_ttl).await?;
        let added = async {
            self.store
                .restaurant(input.restaurant_id)
                .await?
                .ok_or(BookingError::RestaurantNotFound(input.restaurant_id))?;
            let table = Table {
                id: Ulid::new(),
                restaurant_id: input.restaurant_id,
                number: input.number,
                capacity: input.capacity,
            };
            self.store.insert_table(table.clone()).await?;
            self.cache.invalidate_reservation_views(table.restaurant_id, &[]).await;
            Ok::<_, BookingError>(table)
        }
        .await;
        guard.release().await;
        let table = added?;

        info!(
            table = %table.id,
            restaurant = %table.restaurant_id,
            number = table.number,
            capacity = table.capacity,
            "table added"
        );
        Ok(table)
    }
}
