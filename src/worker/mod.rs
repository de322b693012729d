//! File transfer worker
//!
//! [`TaskPool`] polls the coordinator for ingestion and delete tasks while it
//! has free slots and hands each one to the [`TaskEngine`].

pub mod engine;
pub mod pool;

pub use engine::{TaskEngine, TaskOutcome, TaskResult, change_model_name};
pub use pool::{TaskKind, TaskPool};
