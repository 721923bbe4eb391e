//! ORM-style session over one SQLite connection.
//!
//! # Responsibility
//! - Track student instances and write them back on flush (unit of work).
//! - Provide the untracked bulk insert path.
//! - Own the session transaction: opened lazily, ended by commit/rollback.
//!
//! # Invariants
//! - Tracked new instances gain an `id` only when their insert is flushed.
//! - `bulk_save_objects` never writes ids back into caller instances.
//! - At most one attached tracked entry exists per persisted `id`.
//! - A failed flush rolls back the whole session transaction.

use crate::db::DbError;
use crate::model::student::{Column, Student, StudentId};
use crate::query::load_student;
use chrono::{Local, NaiveDateTime};
use log::{debug, error, info};
use rusqlite::{params, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type SessionResult<T> = Result<T, SessionError>;

/// Error for session writes and queries.
#[derive(Debug)]
pub enum SessionError {
    Db(DbError),
    /// An update or delete targeted a row that does not exist.
    NotFound(StudentId),
    /// Deleting by identity requires an instance with an `id`.
    NotPersisted,
    /// A stored row could not be decoded into a `Student`.
    InvalidData(String),
    /// Arithmetic update on a column that does not hold integers.
    NonNumericColumn(Column),
    /// Substring match on a column that does not hold text.
    NonTextColumn(Column),
    /// A bulk increment would push a matching value past the `i64` range.
    IntegerOverflow { column: Column, delta: i64 },
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "student not found: {id}"),
            Self::NotPersisted => write!(f, "student has no id; it was never persisted"),
            Self::InvalidData(message) => write!(f, "invalid persisted student data: {message}"),
            Self::NonNumericColumn(column) => {
                write!(f, "column `{column}` does not hold integers")
            }
            Self::NonTextColumn(column) => write!(f, "column `{column}` does not hold text"),
            Self::IntegerOverflow { column, delta } => {
                write!(f, "adding {delta} to `{column}` overflows a 64-bit integer")
            }
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_)
            | Self::NotPersisted
            | Self::InvalidData(_)
            | Self::NonNumericColumn(_)
            | Self::NonTextColumn(_)
            | Self::IntegerOverflow { .. } => None,
        }
    }
}

impl From<DbError> for SessionError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SessionError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Handle to an instance tracked by a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tracked(usize);

#[derive(Debug)]
struct Entry {
    student: Student,
    /// Row state as last written or loaded; `None` forces a write on flush.
    snapshot: Option<Student>,
    attached: bool,
}

impl Entry {
    fn is_dirty(&self) -> bool {
        self.snapshot.as_ref() != Some(&self.student)
    }
}

/// Counts reported by one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Unit-of-work session owning one connection.
pub struct Session {
    conn: Connection,
    entries: Vec<Entry>,
    pending_deletes: Vec<StudentId>,
    /// Entries inserted inside the open transaction, with whether
    /// `enrolled_date` was defaulted by the insert.
    inserted_in_tx: Vec<(usize, bool)>,
}

impl Session {
    /// Creates a session over a connection with the schema applied.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            entries: Vec::new(),
            pending_deletes: Vec::new(),
            inserted_in_tx: Vec::new(),
        }
    }

    /// Read access to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Whether a session transaction is open.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Stages a tracked save and returns a handle to the tracked instance.
    ///
    /// A new instance is inserted on the next flush and receives its `id`
    /// then. An instance that already has an `id` is written back as an
    /// update; if that `id` is already tracked, the tracked entry is
    /// replaced and its handle returned.
    pub fn add(&mut self, student: Student) -> Tracked {
        if let Some(id) = student.id {
            if let Some(slot) = self.attached_slot(id) {
                let entry = &mut self.entries[slot];
                entry.student = student;
                entry.snapshot = None;
                return Tracked(slot);
            }
        }

        self.entries.push(Entry {
            student,
            snapshot: None,
            attached: true,
        });
        Tracked(self.entries.len() - 1)
    }

    /// Stages several tracked saves in order.
    pub fn add_all(&mut self, students: impl IntoIterator<Item = Student>) -> Vec<Tracked> {
        students
            .into_iter()
            .map(|student| self.add(student))
            .collect()
    }

    /// Returns the tracked instance behind `handle`.
    pub fn get(&self, handle: Tracked) -> Option<&Student> {
        self.entries.get(handle.0).map(|entry| &entry.student)
    }

    /// Mutable access to a tracked instance; changes are written on flush.
    pub fn get_mut(&mut self, handle: Tracked) -> Option<&mut Student> {
        self.entries.get_mut(handle.0).map(|entry| &mut entry.student)
    }

    /// Whether `handle` still refers to an instance the session writes back.
    ///
    /// Deleted instances and instances expunged by rollback are detached.
    pub fn is_attached(&self, handle: Tracked) -> bool {
        self.entries
            .get(handle.0)
            .is_some_and(|entry| entry.attached)
    }

    /// Stages deletion of a persisted record by identity.
    pub fn delete(&mut self, student: &Student) -> SessionResult<()> {
        let id = student.id.ok_or(SessionError::NotPersisted)?;
        if !self.pending_deletes.contains(&id) {
            self.pending_deletes.push(id);
        }
        Ok(())
    }

    /// Persists many records in one operation without tracking them.
    ///
    /// Rows are written inside the session transaction; `id` fields of the
    /// given instances are left untouched. Instances that already carry an
    /// `id` are updated instead of inserted.
    pub fn bulk_save_objects(&mut self, students: &[Student]) -> SessionResult<usize> {
        self.flush()?;
        self.begin()?;

        match bulk_write(&self.conn, students) {
            Ok(()) => {
                info!(
                    "event=bulk_save module=session status=ok rows={}",
                    students.len()
                );
                self.refresh_persistent()?;
                Ok(students.len())
            }
            Err(err) => {
                error!(
                    "event=bulk_save module=session status=error rows={} error={}",
                    students.len(),
                    err
                );
                self.rollback()?;
                Err(err)
            }
        }
    }

    /// Writes all staged changes inside the session transaction.
    ///
    /// Inserts and updates run in tracking order, then staged deletes.
    pub fn flush(&mut self) -> SessionResult<FlushStats> {
        let has_dirty = self
            .entries
            .iter()
            .any(|entry| entry.attached && entry.is_dirty());
        if !has_dirty && self.pending_deletes.is_empty() {
            return Ok(FlushStats::default());
        }

        let started_at = Instant::now();
        self.begin()?;

        match self.flush_entries() {
            Ok(stats) => {
                debug!(
                    "event=session_flush module=session status=ok inserted={} updated={} deleted={} duration_ms={}",
                    stats.inserted,
                    stats.updated,
                    stats.deleted,
                    started_at.elapsed().as_millis()
                );
                Ok(stats)
            }
            Err(err) => {
                error!(
                    "event=session_flush module=session status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                self.rollback()?;
                Err(err)
            }
        }
    }

    /// Flushes staged changes and commits the session transaction.
    pub fn commit(&mut self) -> SessionResult<FlushStats> {
        let stats = self.flush()?;
        if self.in_transaction() {
            self.conn.execute_batch("COMMIT;")?;
        }
        self.inserted_in_tx.clear();

        info!(
            "event=session_commit module=session status=ok inserted={} updated={} deleted={}",
            stats.inserted, stats.updated, stats.deleted
        );
        Ok(stats)
    }

    /// Discards staged changes and rolls back the session transaction.
    ///
    /// Instances inserted in the rolled-back transaction lose their `id` and
    /// are detached, like never-flushed new instances. Persistent instances
    /// are reloaded from the store.
    pub fn rollback(&mut self) -> SessionResult<()> {
        self.pending_deletes.clear();
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK;")?;
        }

        for (slot, defaulted_enrollment) in std::mem::take(&mut self.inserted_in_tx) {
            let entry = &mut self.entries[slot];
            entry.student.id = None;
            if defaulted_enrollment {
                entry.student.enrolled_date = None;
            }
            entry.snapshot = None;
        }
        for entry in &mut self.entries {
            if entry.student.id.is_none() {
                entry.attached = false;
            }
        }
        self.refresh_persistent()?;

        info!("event=session_rollback module=session status=ok");
        Ok(())
    }

    pub(crate) fn begin(&mut self) -> SessionResult<()> {
        if !self.in_transaction() {
            self.conn.execute_batch("BEGIN;")?;
        }
        Ok(())
    }

    /// Reloads every persistent tracked instance after a bulk write.
    ///
    /// Instances whose row no longer exists are detached.
    pub(crate) fn refresh_persistent(&mut self) -> SessionResult<()> {
        for entry in &mut self.entries {
            let Some(id) = entry.student.id else {
                continue;
            };
            match load_student(&self.conn, id)? {
                Some(row) => {
                    entry.student = row.clone();
                    entry.snapshot = Some(row);
                    entry.attached = true;
                }
                None => {
                    entry.snapshot = Some(entry.student.clone());
                    entry.attached = false;
                }
            }
        }
        Ok(())
    }

    fn attached_slot(&self, id: StudentId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.attached && entry.student.id == Some(id))
    }

    fn flush_entries(&mut self) -> SessionResult<FlushStats> {
        let mut stats = FlushStats::default();

        for (slot, entry) in self.entries.iter_mut().enumerate() {
            if !entry.attached || !entry.is_dirty() {
                continue;
            }

            match entry.student.id {
                None => {
                    let defaulted = entry.student.enrolled_date.is_none();
                    let enrolled_date = entry.student.enrolled_date.unwrap_or_else(now);
                    let id = insert_row(&self.conn, &entry.student, enrolled_date)?;
                    entry.student.id = Some(id);
                    entry.student.enrolled_date = Some(enrolled_date);
                    self.inserted_in_tx.push((slot, defaulted));
                    stats.inserted += 1;
                }
                Some(id) => {
                    if update_row(&self.conn, &entry.student, id)? == 0 {
                        return Err(SessionError::NotFound(id));
                    }
                    stats.updated += 1;
                }
            }
            entry.snapshot = Some(entry.student.clone());
        }

        for id in std::mem::take(&mut self.pending_deletes) {
            let changed = self
                .conn
                .execute("DELETE FROM students WHERE id = ?1;", [id])?;
            if changed == 0 {
                return Err(SessionError::NotFound(id));
            }
            for entry in &mut self.entries {
                if entry.student.id == Some(id) {
                    entry.attached = false;
                }
            }
            stats.deleted += 1;
        }

        Ok(stats)
    }
}

fn bulk_write(conn: &Connection, students: &[Student]) -> SessionResult<()> {
    for student in students {
        match student.id {
            None => {
                let enrolled_date = student.enrolled_date.unwrap_or_else(now);
                insert_row(conn, student, enrolled_date)?;
            }
            Some(id) => {
                if update_row(conn, student, id)? == 0 {
                    return Err(SessionError::NotFound(id));
                }
            }
        }
    }
    Ok(())
}

fn insert_row(
    conn: &Connection,
    student: &Student,
    enrolled_date: NaiveDateTime,
) -> SessionResult<StudentId> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO students (
            name,
            email,
            grade,
            birthday,
            enrolled_date
        ) VALUES (?1, ?2, ?3, ?4, ?5);",
    )?;
    stmt.execute(params![
        student.name.as_deref(),
        student.email.as_deref(),
        student.grade,
        student.birthday,
        enrolled_date,
    ])?;
    Ok(conn.last_insert_rowid())
}

fn update_row(conn: &Connection, student: &Student, id: StudentId) -> SessionResult<usize> {
    let mut stmt = conn.prepare_cached(
        "UPDATE students
         SET
            name = ?1,
            email = ?2,
            grade = ?3,
            birthday = ?4,
            enrolled_date = ?5
         WHERE id = ?6;",
    )?;
    let changed = stmt.execute(params![
        student.name.as_deref(),
        student.email.as_deref(),
        student.grade,
        student.birthday,
        student.enrolled_date,
        id,
    ])?;
    Ok(changed)
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
