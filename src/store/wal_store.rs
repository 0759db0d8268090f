use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

use super::{ReservationStore, StoreError};

type SharedSchedule = Arc<RwLock<TableSchedule>>;

/// One table and every reservation ever made on it, sorted by `window.start`.
#[derive(Debug, Clone)]
struct TableSchedule {
    table: Table,
    reservations: Vec<Reservation>,
}

impl TableSchedule {
    fn new(table: Table) -> Self {
        Self { table, reservations: Vec::new() }
    }

    fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Insert or replace, keeping sort order by start.
    fn upsert(&mut self, reservation: Reservation) {
        if let Some(pos) = self.reservations.iter().position(|r| r.id == reservation.id) {
            self.reservations.remove(pos);
        }
        let pos = self
            .reservations
            .partition_point(|r| r.window.start <= reservation.window.start);
        self.reservations.insert(pos, reservation);
    }

    fn cancel(&mut self, id: Ulid, at: Ms) {
        if let Some(r) = self.reservations.iter_mut().find(|r| r.id == id) {
            r.status = ReservationStatus::Cancelled;
            r.updated_at = at;
        }
    }

    /// Everything at index >= right_bound starts at or after `query.end`.
    fn overlapping(&self, query: TimeWindow) -> impl Iterator<Item = &Reservation> {
        let right_bound = self.reservations.partition_point(|r| r.window.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.window.end > query.start)
    }

    fn starting_within(&self, query: TimeWindow) -> &[Reservation] {
        let lo = self.reservations.partition_point(|r| r.window.start < query.start);
        let hi = self.reservations.partition_point(|r| r.window.start < query.end);
        &self.reservations[lo..hi]
    }
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while a flush is pending share the
/// next fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        flush_and_respond(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
    debug!("WAL writer stopped");
}

fn flush_and_respond(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let mut result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so partial bytes don't leak into the next batch.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// In-process durable store: state lives in memory, every write is logged to
/// the WAL before it becomes visible, and the WAL is replayed on open.
pub struct WalStore {
    restaurants: DashMap<Ulid, Restaurant>,
    /// Restaurant → its tables.
    restaurant_tables: DashMap<Ulid, Vec<Ulid>>,
    table_numbers: DashMap<(Ulid, u32), Ulid>,
    schedules: DashMap<Ulid, SharedSchedule>,
    /// Reverse lookup: reservation id → table id.
    reservation_table: DashMap<Ulid, Ulid>,
    /// Writers hold it shared; compaction holds it exclusively so the
    /// snapshot and the WAL swap see the same state.
    compaction_gate: RwLock<()>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl WalStore {
    /// Replay the WAL at `wal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: &Path) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let wal = Wal::open(wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            restaurants: DashMap::new(),
            restaurant_tables: DashMap::new(),
            table_numbers: DashMap::new(),
            schedules: DashMap::new(),
            reservation_table: DashMap::new(),
            compaction_gate: RwLock::new(()),
            wal_tx,
        };

        // Schedules are built unshared first, then published.
        let mut schedules: HashMap<Ulid, TableSchedule> = HashMap::new();
        for event in &events {
            match event {
                Event::RestaurantCreated { restaurant } => {
                    store.restaurants.insert(restaurant.id, restaurant.clone());
                }
                Event::TableAdded { table } => {
                    store.index_table(table);
                    schedules.insert(table.id, TableSchedule::new(table.clone()));
                }
                Event::ReservationCreated { reservation }
                | Event::ReservationUpdated { reservation } => {
                    if let Some(schedule) = schedules.get_mut(&reservation.table_id) {
                        store.reservation_table.insert(reservation.id, reservation.table_id);
                        schedule.upsert(reservation.clone());
                    }
                }
                Event::ReservationCancelled { id, table_id, at } => {
                    if let Some(schedule) = schedules.get_mut(table_id) {
                        schedule.cancel(*id, *at);
                    }
                }
            }
        }
        for (id, schedule) in schedules {
            store.schedules.insert(id, Arc::new(RwLock::new(schedule)));
        }

        info!(
            events = events.len(),
            restaurants = store.restaurants.len(),
            tables = store.schedules.len(),
            reservations = store.reservation_table.len(),
            "store replayed from {}",
            wal_path.display()
        );
        Ok(store)
    }

    fn index_table(&self, table: &Table) {
        self.table_numbers.insert((table.restaurant_id, table.number), table.id);
        self.restaurant_tables
            .entry(table.restaurant_id)
            .or_default()
            .push(table.id);
    }

    fn schedule(&self, table_id: &Ulid) -> Option<SharedSchedule> {
        self.schedules.get(table_id).map(|e| e.value().clone())
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event: event.clone(), response: tx })
            .await
            .map_err(|_| StoreError::Io("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Io("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    /// Rewrite the WAL with only the records needed to rebuild current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.write().await;

        let mut events: Vec<Event> = self
            .restaurants
            .iter()
            .map(|e| Event::RestaurantCreated { restaurant: e.value().clone() })
            .collect();
        let schedules: Vec<SharedSchedule> =
            self.schedules.iter().map(|e| e.value().clone()).collect();
        for schedule in schedules {
            let guard = schedule.read().await;
            events.push(Event::TableAdded { table: guard.table.clone() });
            events.extend(
                guard
                    .reservations
                    .iter()
                    .map(|r| Event::ReservationCreated { reservation: r.clone() }),
            );
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Io("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Io("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// `read_at` is `None` for inserts, the caller's version for updates.
    async fn write_reservation(
        &self,
        reservation: &Reservation,
        read_at: Option<Ms>,
    ) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.read().await;
        let schedule = self
            .schedule(&reservation.table_id)
            .ok_or(StoreError::Missing(reservation.table_id))?;
        let mut guard = schedule.write().await;
        let event = match read_at {
            None => Event::ReservationCreated { reservation: reservation.clone() },
            Some(read_at) => {
                let current = guard.get(reservation.id).ok_or(StoreError::Missing(reservation.id))?;
                if !current.is_confirmed() {
                    return Err(StoreError::Cancelled(reservation.id));
                }
                if current.updated_at != read_at {
                    return Err(StoreError::Stale(reservation.id));
                }
                if is_plain_cancellation(current, reservation) {
                    Event::ReservationCancelled {
                        id: reservation.id,
                        table_id: reservation.table_id,
                        at: reservation.updated_at,
                    }
                } else {
                    Event::ReservationUpdated { reservation: reservation.clone() }
                }
            }
        };
        self.wal_append(&event).await?;
        self.reservation_table.insert(reservation.id, reservation.table_id);
        guard.upsert(reservation.clone());
        Ok(())
    }
}

/// `next` differs from `current` only by the CONFIRMED → CANCELLED transition.
fn is_plain_cancellation(current: &Reservation, next: &Reservation) -> bool {
    current.is_confirmed()
        && next.status == ReservationStatus::Cancelled
        && Reservation {
            status: current.status,
            updated_at: current.updated_at,
            ..next.clone()
        } == *current
}

#[async_trait]
impl ReservationStore for WalStore {
    async fn insert_restaurant(&self, restaurant: Restaurant) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.read().await;
        let event = Event::RestaurantCreated { restaurant: restaurant.clone() };
        self.wal_append(&event).await?;
        self.restaurants.insert(restaurant.id, restaurant);
        Ok(())
    }

    async fn restaurant(&self, id: Ulid) -> Result<Option<Restaurant>, StoreError> {
        Ok(self.restaurants.get(&id).map(|e| e.value().clone()))
    }

    async fn insert_table(&self, table: Table) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.read().await;
        if !self.restaurants.contains_key(&table.restaurant_id) {
            return Err(StoreError::Missing(table.restaurant_id));
        }
        // Claim the number before the await so a concurrent insert sees it taken.
        let key = (table.restaurant_id, table.number);
        match self.table_numbers.entry(key) {
            Entry::Occupied(_) => {
                return Err(StoreError::DuplicateTableNumber {
                    restaurant_id: table.restaurant_id,
                    number: table.number,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(table.id);
            }
        }

        let event = Event::TableAdded { table: table.clone() };
        if let Err(e) = self.wal_append(&event).await {
            self.table_numbers.remove(&key);
            return Err(e);
        }
        self.restaurant_tables
            .entry(table.restaurant_id)
            .or_default()
            .push(table.id);
        self.schedules
            .insert(table.id, Arc::new(RwLock::new(TableSchedule::new(table))));
        Ok(())
    }

    async fn table_with_restaurant(
        &self,
        id: Ulid,
    ) -> Result<Option<(Table, Restaurant)>, StoreError> {
        let Some(schedule) = self.schedule(&id) else {
            return Ok(None);
        };
        let table = schedule.read().await.table.clone();
        let restaurant = self
            .restaurants
            .get(&table.restaurant_id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::Missing(table.restaurant_id))?;
        Ok(Some((table, restaurant)))
    }

    async fn tables_for_restaurant(&self, restaurant_id: Ulid) -> Result<Vec<Table>, StoreError> {
        let ids = self
            .restaurant_tables
            .get(&restaurant_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut tables = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(schedule) = self.schedule(&id) {
                tables.push(schedule.read().await.table.clone());
            }
        }
        tables.sort_by_key(|t| t.number);
        Ok(tables)
    }

    async fn reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError> {
        let Some(table_id) = self.reservation_table.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        let Some(schedule) = self.schedule(&table_id) else {
            return Ok(None);
        };
        let guard = schedule.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn insert_reservation(&self, reservation: &Reservation) -> Result<(), StoreError> {
        self.write_reservation(reservation, None).await
    }

    async fn update_reservation(
        &self,
        reservation: &Reservation,
        read_at: Ms,
    ) -> Result<(), StoreError> {
        self.write_reservation(reservation, Some(read_at)).await
    }

    async fn confirmed_overlapping(
        &self,
        table_id: Ulid,
        window: TimeWindow,
    ) -> Result<Vec<Reservation>, StoreError> {
        let Some(schedule) = self.schedule(&table_id) else {
            return Ok(Vec::new());
        };
        let guard = schedule.read().await;
        Ok(guard
            .overlapping(window)
            .filter(|r| r.is_confirmed())
            .cloned()
            .collect())
    }

    async fn reservations_starting_within(
        &self,
        restaurant_id: Ulid,
        window: TimeWindow,
    ) -> Result<Vec<Reservation>, StoreError> {
        let ids = self
            .restaurant_tables
            .get(&restaurant_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut found = Vec::new();
        for id in ids {
            if let Some(schedule) = self.schedule(&id) {
                found.extend_from_slice(schedule.read().await.starting_within(window));
            }
        }
        found.sort_by_key(|r| (r.window.start, r.id));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::path::PathBuf;

    const H: Ms = 3_600_000;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("tablebook_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn restaurant() -> Restaurant {
        Restaurant {
            id: Ulid::new(),
            name: "Tallie Diner".into(),
            opening: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            closing: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
        }
    }

    fn table(restaurant_id: Ulid, number: u32) -> Table {
        Table { id: Ulid::new(), restaurant_id, number, capacity: 4 }
    }

    fn reservation(table: &Table, start: Ms, end: Ms) -> Reservation {
        Reservation {
            id: Ulid::new(),
            table_id: table.id,
            restaurant_id: table.restaurant_id,
            customer_name: "Ada".into(),
            phone: "+2348012345678".into(),
            party_size: 2,
            window: TimeWindow::new(start, end),
            status: ReservationStatus::Confirmed,
            created_at: 0,
            updated_at: 0,
        }
    }

    async fn seeded(name: &str) -> (WalStore, PathBuf, Table) {
        let path = test_wal_path(name);
        let store = WalStore::open(&path).unwrap();
        let r = restaurant();
        let t = table(r.id, 1);
        store.insert_restaurant(r).await.unwrap();
        store.insert_table(t.clone()).await.unwrap();
        (store, path, t)
    }

    #[tokio::test]
    async fn duplicate_table_number_rejected() {
        let (store, _, t) = seeded("dup_table.wal").await;
        let result = store.insert_table(table(t.restaurant_id, 1)).await;
        assert!(matches!(result, Err(StoreError::DuplicateTableNumber { number: 1, .. })));
        store.insert_table(table(t.restaurant_id, 2)).await.unwrap();
        let tables = store.tables_for_restaurant(t.restaurant_id).await.unwrap();
        assert_eq!(tables.iter().map(|t| t.number).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn table_requires_restaurant() {
        let path = test_wal_path("orphan_table.wal");
        let store = WalStore::open(&path).unwrap();
        let result = store.insert_table(table(Ulid::new(), 1)).await;
        assert!(matches!(result, Err(StoreError::Missing(_))));
    }

    #[tokio::test]
    async fn overlap_query_is_half_open_and_confirmed_only() {
        let (store, _, t) = seeded("overlap_query.wal").await;
        let a = reservation(&t, 10 * H, 11 * H);
        let mut b = reservation(&t, 12 * H, 13 * H);
        store.insert_reservation(&a).await.unwrap();
        store.insert_reservation(&b).await.unwrap();

        let hits = store.confirmed_overlapping(t.id, TimeWindow::new(11 * H, 12 * H)).await.unwrap();
        assert!(hits.is_empty()); // touches both, overlaps neither

        let hits = store.confirmed_overlapping(t.id, TimeWindow::new(10 * H, 12 * H + 1)).await.unwrap();
        assert_eq!(hits.len(), 2);

        b.status = ReservationStatus::Cancelled;
        store.update_reservation(&b, 0).await.unwrap();
        let hits = store.confirmed_overlapping(t.id, TimeWindow::new(10 * H, 14 * H)).await.unwrap();
        assert_eq!(hits, vec![a]);
    }

    #[tokio::test]
    async fn update_moves_reservation_in_schedule() {
        let (store, _, t) = seeded("update_moves.wal").await;
        let mut r = reservation(&t, 10 * H, 11 * H);
        store.insert_reservation(&r).await.unwrap();
        r.window = TimeWindow::new(15 * H, 16 * H);
        store.update_reservation(&r, 0).await.unwrap();

        assert!(store.confirmed_overlapping(t.id, TimeWindow::new(10 * H, 11 * H)).await.unwrap().is_empty());
        assert_eq!(store.reservation(r.id).await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn update_unknown_reservation_fails() {
        let (store, _, t) = seeded("update_unknown.wal").await;
        let r = reservation(&t, 10 * H, 11 * H);
        assert!(matches!(store.update_reservation(&r, 0).await, Err(StoreError::Missing(_))));
    }

    #[tokio::test]
    async fn update_is_conditional_on_status_and_version() {
        let (store, _, t) = seeded("update_conditional.wal").await;
        let r = reservation(&t, 10 * H, 11 * H);
        store.insert_reservation(&r).await.unwrap();

        let renamed = Reservation { customer_name: "Grace".into(), updated_at: 5, ..r.clone() };
        store.update_reservation(&renamed, 0).await.unwrap();
        // A second writer still holding version 0 loses.
        let late = Reservation { party_size: 3, updated_at: 6, ..r.clone() };
        assert!(matches!(store.update_reservation(&late, 0).await, Err(StoreError::Stale(_))));

        let cancelled = Reservation { status: ReservationStatus::Cancelled, updated_at: 7, ..renamed.clone() };
        store.update_reservation(&cancelled, 5).await.unwrap();
        for read_at in [5, 7] {
            let again = Reservation { updated_at: 8, ..cancelled.clone() };
            assert!(matches!(
                store.update_reservation(&again, read_at).await,
                Err(StoreError::Cancelled(_))
            ));
        }
        assert_eq!(store.reservation(r.id).await.unwrap(), Some(cancelled));
    }

    #[tokio::test]
    async fn starting_within_orders_by_start_across_tables() {
        let (store, _, t1) = seeded("starting_within.wal").await;
        let t2 = table(t1.restaurant_id, 2);
        store.insert_table(t2.clone()).await.unwrap();
        let late = reservation(&t1, 30 * H, 31 * H);
        let b = reservation(&t2, 12 * H, 13 * H);
        let a = reservation(&t1, 11 * H, 12 * H);
        for r in [&late, &b, &a] {
            store.insert_reservation(r).await.unwrap();
        }
        let found = store
            .reservations_starting_within(t1.restaurant_id, TimeWindow::new(0, 24 * H))
            .await
            .unwrap();
        assert_eq!(found, vec![a, b]);
    }

    #[tokio::test]
    async fn replay_restores_state() {
        let (store, path, t) = seeded("replay.wal").await;
        let kept = reservation(&t, 10 * H, 11 * H);
        let mut cancelled = reservation(&t, 12 * H, 13 * H);
        store.insert_reservation(&kept).await.unwrap();
        store.insert_reservation(&cancelled).await.unwrap();
        cancelled.status = ReservationStatus::Cancelled;
        cancelled.updated_at = 42;
        store.update_reservation(&cancelled, 0).await.unwrap();
        drop(store);

        let reopened = WalStore::open(&path).unwrap();
        assert_eq!(reopened.reservation(kept.id).await.unwrap(), Some(kept));
        assert_eq!(reopened.reservation(cancelled.id).await.unwrap(), Some(cancelled));
        let (table, _) = reopened.table_with_restaurant(t.id).await.unwrap().unwrap();
        assert_eq!(table, t);
        assert!(matches!(
            reopened.insert_table(Table { id: Ulid::new(), ..t }).await,
            Err(StoreError::DuplicateTableNumber { .. })
        ));
    }

    #[tokio::test]
    async fn compact_preserves_state() {
        let (store, path, t) = seeded("compact.wal").await;
        let mut r = reservation(&t, 10 * H, 11 * H);
        store.insert_reservation(&r).await.unwrap();
        for i in 0..5 {
            r.window = TimeWindow::new((10 + i) * H, (11 + i) * H);
            store.update_reservation(&r, 0).await.unwrap();
        }
        assert_eq!(store.appends_since_compact().await, 8);
        store.compact().await.unwrap();
        assert_eq!(store.appends_since_compact().await, 0);
        drop(store);

        let reopened = WalStore::open(&path).unwrap();
        assert_eq!(reopened.reservation(r.id).await.unwrap(), Some(r));
    }
}
