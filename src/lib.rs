//! Embeddable lending engine: users share items, place bookings on them,
//! and comment once a loan is behind them. State lives in memory and is
//! made durable through a write-ahead log.

pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod wal;

pub use engine::{BookingBucket, BookingScope, Engine, EngineError, Entity};
