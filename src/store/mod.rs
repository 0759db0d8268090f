//! Source of truth for restaurants, tables and reservations.
//!
//! [`ReservationStore`] is the collaborator the booking engine writes through.
//! It performs no admission checks of its own beyond table-number
//! uniqueness; overlap and capacity are decided by the engine.

mod wal_store;

pub use wal_store::WalStore;

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::{Ms, Reservation, Restaurant, Table, TimeWindow};

#[derive(Debug)]
pub enum StoreError {
    /// `(restaurant_id, number)` is already taken.
    DuplicateTableNumber { restaurant_id: Ulid, number: u32 },
    /// Update or dependent insert referenced a missing row.
    Missing(Ulid),
    /// Update targeted a reservation that is already CANCELLED.
    Cancelled(Ulid),
    /// Update was based on a version that has since been rewritten.
    Stale(Ulid),
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DuplicateTableNumber { restaurant_id, number } => {
                write!(f, "table number {number} already exists for restaurant {restaurant_id}")
            }
            StoreError::Missing(id) => write!(f, "missing row: {id}"),
            StoreError::Cancelled(id) => write!(f, "reservation already cancelled: {id}"),
            StoreError::Stale(id) => write!(f, "reservation changed concurrently: {id}"),
            StoreError::Io(e) => write!(f, "store I/O error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn insert_restaurant(&self, restaurant: Restaurant) -> Result<(), StoreError>;

    async fn restaurant(&self, id: Ulid) -> Result<Option<Restaurant>, StoreError>;

    /// Fails with `DuplicateTableNumber` if the number is taken in that restaurant.
    async fn insert_table(&self, table: Table) -> Result<(), StoreError>;

    /// Table together with its owning restaurant (for capacity and hours).
    async fn table_with_restaurant(&self, id: Ulid)
    -> Result<Option<(Table, Restaurant)>, StoreError>;

    /// Ordered by table number.
    async fn tables_for_restaurant(&self, restaurant_id: Ulid) -> Result<Vec<Table>, StoreError>;

    async fn reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError>;

    async fn insert_reservation(&self, reservation: &Reservation) -> Result<(), StoreError>;

    /// Replaces the stored row with the same id, provided it is still
    /// CONFIRMED and its `updated_at` equals `read_at` (the version the
    /// caller based its change on). Fails with `Cancelled` or `Stale` otherwise.
    async fn update_reservation(&self, reservation: &Reservation, read_at: Ms)
    -> Result<(), StoreError>;

    /// CONFIRMED reservations on `table_id` intersecting `window` (half-open).
    async fn confirmed_overlapping(
        &self,
        table_id: Ulid,
        window: TimeWindow,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Reservations of any status on the restaurant's tables whose start lies
    /// in `window`, ordered by start ascending.
    async fn reservations_starting_within(
        &self,
        restaurant_id: Ulid,
        window: TimeWindow,
    ) -> Result<Vec<Reservation>, StoreError>;
}
