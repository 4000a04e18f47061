//! # lt-tracking
//!
//! Durable [`TrackingStore`](lt_byrole::TrackingStore) for the by-role
//! trigger: one JSON file per tracking record, replaced atomically.

pub mod error;
pub mod store;

pub use error::TrackingStoreError;
pub use store::JsonTrackingStore;
