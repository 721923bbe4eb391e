//! Core of the student roll sandbox.
//! An ORM-style session over embedded SQLite for one `Student` entity.

pub mod db;
pub mod demo;
pub mod logging;
pub mod model;
pub mod query;
pub mod session;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use demo::{reset_store, run_scenario, DemoError, DemoResult, Scenario};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::student::{Column, Student, StudentId, EMAIL_MAX_CHARS};
pub use query::{FieldValue, Filter, ProjectedRow, Query};
pub use session::{FlushStats, Session, SessionError, SessionResult, Tracked};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
