pub mod config;
pub mod coord;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod reaper;
pub mod store;
mod wal;

pub use config::{Config, Service};
pub use coord::{Coordinator, MemoryCoordinator, RedisCoordinator};
pub use engine::{BookingEngine, BookingError, ErrorKind};
pub use store::{ReservationStore, WalStore};
