//! Docintake persistence layer.
//!
//! Repository traits are defined once and implemented twice: on PostgreSQL through
//! `sqlx`, and in memory for tests and database-less local runs.

pub mod db;

pub use db::*;
