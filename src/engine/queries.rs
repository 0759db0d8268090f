use std::time::Instant;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::coord::{reservations_by_date_key, restaurant_key};
use crate::model::*;

use super::{BookingEngine, BookingError, observe};

impl BookingEngine {
    /// Every reservation, of any status, starting on `date` (UTC) at one of
    /// the restaurant's tables, ordered by start. Read through the cache.
    pub async fn list_by_date(
        &self,
        restaurant_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, BookingError> {
        let started = Instant::now();
        let result = self.list_by_date_inner(restaurant_id, date).await;
        observe("list_by_date", started, &result);
        result
    }

    async fn list_by_date_inner(
        &self,
        restaurant_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, BookingError> {
        let key = reservations_by_date_key(restaurant_id, date);
        if let Some(cached) = self.cache.get::<Vec<Reservation>>(&key, "reservations_by_date").await {
            return Ok(cached);
        }

        self.store
            .restaurant(restaurant_id)
            .await?
            .ok_or(BookingError::RestaurantNotFound(restaurant_id))?;
        let reservations = self
            .store
            .reservations_starting_within(restaurant_id, TimeWindow::day(date))
            .await?;
        self.cache.put(&key, &reservations).await;
        Ok(reservations)
    }

    pub async fn restaurant_details(&self, restaurant_id: Ulid) -> Result<RestaurantDetails, BookingError> {
        self.restaurant_details_at(restaurant_id, now_ms()).await
    }

    /// Restaurant, its tables, and which tables are free at `at`.
    ///
    /// The result is cached per restaurant, not per instant: `at` is only
    /// consulted on a cache miss, and a hit returns the availability computed
    /// for whatever instant populated the entry (at most one TTL ago).
    pub async fn restaurant_details_at(
        &self,
        restaurant_id: Ulid,
        at: Ms,
    ) -> Result<RestaurantDetails, BookingError> {
        let started = Instant::now();
        let result = self.restaurant_details_inner(restaurant_id, at).await;
        observe("restaurant_details", started, &result);
        result
    }

    async fn restaurant_details_inner(
        &self,
        restaurant_id: Ulid,
        at: Ms,
    ) -> Result<RestaurantDetails, BookingError> {
        let key = restaurant_key(restaurant_id);
        if let Some(cached) = self.cache.get::<RestaurantDetails>(&key, "restaurant").await {
            return Ok(cached);
        }

        let restaurant = self
            .store
            .restaurant(restaurant_id)
            .await?
            .ok_or(BookingError::RestaurantNotFound(restaurant_id))?;
        let tables = self.store.tables_for_restaurant(restaurant_id).await?;
        let instant = TimeWindow::new(at, at + 1);
        let mut available_tables = Vec::new();
        for table in &tables {
            if self.store.confirmed_overlapping(table.id, instant).await?.is_empty() {
                available_tables.push(table.clone());
            }
        }

        let details = RestaurantDetails { restaurant, tables, available_tables };
        self.cache.put(&key, &details).await;
        Ok(details)
    }
}
