//! Relational store for the activity/memory daemon: one SQLite file per
//! workspace holding sessions, prompt batches, activities, memory
//! observations, and the bookkeeping tables (resolution events, session
//! relationships, agent runs, agent schedules) layered on top.
//!
//! This crate owns schema and row access only. It doesn't know about
//! embeddings, HTTP, or cron ticks - those live in `oak-vector`,
//! `oak-providers`, and `oak-runtime`.

mod backup;
mod db;
mod error;
mod schema;

pub mod queries;

pub use backup::{export, import};
pub use db::Database;
pub use error::{Error, Result};
pub use schema::SCHEMA_VERSION;
