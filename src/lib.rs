pub mod audit;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod database;
pub mod db;
pub mod error;
pub mod models;
pub mod queries;
pub mod resolver;
pub mod sync;
pub mod taxonomy;
pub mod telemetry;
pub mod tracker;

#[cfg(test)]
mod test;

pub use error::AppError;
pub use sync::{ChangeSet, SyncOutcome, Synchronizer};
pub use taxonomy::TaxonomyField;
pub use tracker::Tracker;
