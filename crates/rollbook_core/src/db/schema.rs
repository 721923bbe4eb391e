//! `students` schema creation.
//!
//! # Invariants
//! - Creation is idempotent; existing rows are never touched.
//! - A pre-existing `students` table must carry every mapped column.

use crate::db::{DbError, DbResult};
use crate::model::student::Column;
use log::info;
use rusqlite::Connection;

const STUDENTS_SQL: &str = include_str!("students.sql");

/// Creates the `students` table and its `index_name` index if missing.
pub fn create_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(STUDENTS_SQL)?;
    ensure_students_columns(conn)?;

    info!("event=schema_create module=db status=ok table=students");
    Ok(())
}

// Why: `CREATE TABLE IF NOT EXISTS` keeps a foreign `students` table as is,
// so a file store from another tool must be checked column by column.
fn ensure_students_columns(conn: &Connection) -> DbResult<()> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('students');")?;
    let present = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    for column in Column::ALL {
        if !present.iter().any(|name| name == column.as_sql()) {
            return Err(DbError::MissingColumn {
                table: "students",
                column: column.as_sql(),
            });
        }
    }
    Ok(())
}
