//! Database layer for Vigil

mod connection;
mod connectivity_repository;
mod migrations;
mod queue_repository;

pub use connection::Database;
pub use connectivity_repository::{ConnectivityRepository, SqliteConnectivityRepository};
pub use queue_repository::{QueueRepository, SqliteQueueRepository};
