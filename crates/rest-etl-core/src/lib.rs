//! # rest-etl core
//!
//! Shared, I/O-free logic for rest-etl: record models, the pure transforms
//! that turn raw API payloads into those records, and the document store
//! abstraction the loader writes through.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. Everything here
//! can be unit-tested without a network or a database.

pub mod models;
pub mod store;
pub mod transform;
