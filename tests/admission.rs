use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use tablebook::model::*;
use tablebook::{BookingEngine, Config, ErrorKind, MemoryCoordinator, WalStore};

// ── Test infrastructure ──────────────────────────────────────

fn fresh_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tablebook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn at(s: &str) -> Ms {
    DateTime::parse_from_rfc3339(s).unwrap().timestamp_millis()
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

async fn seed(engine: &BookingEngine) -> (Restaurant, Table) {
    let restaurant = engine
        .create_restaurant(CreateRestaurant {
            name: "Harbour Grill".into(),
            opening: "11:00".into(),
            closing: "23:00".into(),
        })
        .await
        .unwrap();
    let table = engine
        .add_table(CreateTable { restaurant_id: restaurant.id, number: 7, capacity: 4 })
        .await
        .unwrap();
    (restaurant, table)
}

fn booking(table_id: Ulid, start: &str, minutes: u32) -> CreateReservation {
    CreateReservation {
        table_id,
        customer_name: "Lin".into(),
        phone: "020-7946-0018".into(),
        party_size: 3,
        start: at(start),
        duration_minutes: minutes,
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn state_survives_restart() {
    let dir = fresh_dir();
    let config = Config { data_dir: dir.clone(), ..Config::default() };

    let (restaurant, kept, cancelled) = {
        let service = config.connect().await.unwrap();
        let (restaurant, table) = seed(&service.engine).await;
        let kept = service.engine.create(booking(table.id, "2026-05-01T19:00:00Z", 90)).await.unwrap();
        let cancelled = service.engine.create(booking(table.id, "2026-05-01T21:00:00Z", 60)).await.unwrap();
        service.engine.cancel(cancelled.id).await.unwrap();
        (restaurant, kept, cancelled)
    };

    // Fresh store and fresh coordinator: nothing cached, everything replayed.
    let store = Arc::new(WalStore::open(&config.wal_path()).unwrap());
    let engine = BookingEngine::new(store, Arc::new(MemoryCoordinator::new()));
    let listed = engine.list_by_date(restaurant.id, day("2026-05-01")).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0], kept);
    assert_eq!(listed[1].id, cancelled.id);
    assert_eq!(listed[1].status, ReservationStatus::Cancelled);

    // The replayed schedule still guards the slot.
    let err = engine
        .create(booking(kept.table_id, "2026-05-01T20:00:00Z", 60))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn compaction_keeps_admission_state() {
    let dir = fresh_dir();
    let wal_path = dir.join("tablebook.wal");
    let store = Arc::new(WalStore::open(&wal_path).unwrap());
    let engine = BookingEngine::new(store.clone(), Arc::new(MemoryCoordinator::new()));
    let (restaurant, table) = seed(&engine).await;

    let r = engine.create(booking(table.id, "2026-05-02T12:00:00Z", 60)).await.unwrap();
    engine
        .modify(r.id, ModifyReservation { party_size: Some(4), ..Default::default() })
        .await
        .unwrap();
    store.compact().await.unwrap();
    drop(engine);

    let reopened = Arc::new(WalStore::open(&wal_path).unwrap());
    let engine = BookingEngine::new(reopened, Arc::new(MemoryCoordinator::new()));
    let listed = engine.list_by_date(restaurant.id, day("2026-05-02")).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].party_size, 4);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_clients_on_one_slot() {
    let dir = fresh_dir();
    let service = Config { data_dir: dir.clone(), ..Config::default() }.connect().await.unwrap();
    let (restaurant, table) = seed(&service.engine).await;

    let attempts = (0..32).map(|_| {
        let engine = service.engine.clone();
        let req = booking(table.id, "2026-05-03T18:00:00Z", 120);
        tokio::spawn(async move { engine.create(req).await })
    });
    let outcomes = futures::future::join_all(attempts).await;

    let mut admitted = 0;
    for outcome in outcomes {
        match outcome.unwrap() {
            Ok(r) => {
                admitted += 1;
                assert_eq!(r.status, ReservationStatus::Confirmed);
            }
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict, "{e}"),
        }
    }
    assert_eq!(admitted, 1);

    let listed = service.engine.list_by_date(restaurant.id, day("2026-05-03")).await.unwrap();
    assert_eq!(listed.len(), 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn error_kinds_are_stable() {
    let dir = fresh_dir();
    let service = Config { data_dir: dir.clone(), ..Config::default() }.connect().await.unwrap();
    let (_, table) = seed(&service.engine).await;

    let too_early = assert_err!(service.engine.create(booking(table.id, "2026-05-04T10:30:00Z", 60)).await);
    assert_eq!(too_early.kind(), ErrorKind::BadRequest);

    let missing = assert_err!(service.engine.cancel(Ulid::new()).await);
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    let r = assert_ok!(service.engine.create(booking(table.id, "2026-05-04T12:00:00Z", 60)).await);
    assert_ok!(service.engine.cancel(r.id).await);
    let twice = assert_err!(service.engine.cancel(r.id).await);
    assert_eq!(twice.kind(), ErrorKind::BadRequest);

    let _ = std::fs::remove_dir_all(&dir);
}
