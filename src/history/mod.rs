//! Entity history: consolidated records, the transition engine and the store

pub mod engine;
pub mod record;
pub mod store;

pub use engine::{apply_observation, dedupe_last_wins, ObservationEffect};
pub use record::EntityRecord;
pub use store::{BatchOutcome, HistoryStore, PriorHistory};
