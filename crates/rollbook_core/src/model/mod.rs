//! Domain model for the student roll.
//!
//! # Responsibility
//! - Define the record type mapped onto SQLite storage.
//! - Name the mapped columns used by queries and projections.
//!
//! # Invariants
//! - Every persisted record is identified by a store-generated `StudentId`.

pub mod student;
