//! Query builder over the `students` table.
//!
//! # Responsibility
//! - Compose filters, ordering and pagination into parameterized SQL.
//! - Run reads (rows, projections, counts) and bulk writes (increment,
//!   delete) that never load the affected rows.
//!
//! # Invariants
//! - Every terminal operation autoflushes the session first.
//! - Results are detached copies; mutate them and `Session::add` to save.
//! - Ordering always ends with `id ASC` so results are deterministic.
//! - A failed bulk write rolls the session back.

use crate::model::student::{Column, Student, StudentId};
use crate::session::{Session, SessionError, SessionResult};
use chrono::NaiveDateTime;
use log::{error, info};
use rusqlite::types::{FromSql, ToSqlOutput, Value};
use rusqlite::{params_from_iter, Connection, Row, RowIndex, ToSql};
use std::fmt::{Display, Formatter};

const STUDENT_SELECT_SQL: &str = "SELECT
    id,
    name,
    email,
    grade,
    birthday,
    enrolled_date
FROM students";

/// One column value, as bound in filters or returned by projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Timestamp(value) => write!(f, "{value}"),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Null => Ok(ToSqlOutput::Owned(Value::Null)),
            Self::Integer(value) => Ok(ToSqlOutput::from(*value)),
            Self::Text(value) => Ok(ToSqlOutput::from(value.as_str())),
            Self::Timestamp(value) => value.to_sql(),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

/// A row of projected column values, in the requested column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedRow(pub Vec<FieldValue>);

impl ProjectedRow {
    pub fn values(&self) -> &[FieldValue] {
        &self.0
    }
}

impl Display for ProjectedRow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("(")?;
        for (index, value) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

/// Row predicate. Multiple filters on one query are combined with `AND`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Exact match; `FieldValue::Null` matches unset columns.
    Eq(Column, FieldValue),
    /// SQL `LIKE` pattern on a text column, `\` escapes wildcards.
    Like(Column, String),
}

impl Filter {
    pub fn eq(column: Column, value: impl Into<FieldValue>) -> Self {
        Self::Eq(column, value.into())
    }

    pub fn like(column: Column, pattern: impl Into<String>) -> Self {
        Self::Like(column, pattern.into())
    }

    /// Substring match, case-insensitive for ASCII under SQLite's `LIKE`.
    pub fn contains(column: Column, needle: &str) -> Self {
        let mut pattern = String::with_capacity(needle.len() + 2);
        pattern.push('%');
        for ch in needle.chars() {
            if matches!(ch, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(ch);
        }
        pattern.push('%');
        Self::Like(column, pattern)
    }

    fn push_sql(&self, sql: &mut String, binds: &mut Vec<FieldValue>) -> SessionResult<()> {
        match self {
            Self::Eq(column, FieldValue::Null) => {
                sql.push_str(&format!("{column} IS NULL"));
            }
            Self::Eq(column, value) => {
                sql.push_str(&format!("{column} = ?"));
                binds.push(value.clone());
            }
            Self::Like(column, pattern) => {
                if !column.is_text() {
                    return Err(SessionError::NonTextColumn(*column));
                }
                sql.push_str(&format!("{column} LIKE ? ESCAPE '\\'"));
                binds.push(FieldValue::Text(pattern.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Reusable description of a `students` query.
///
/// Builder methods consume and return the query; terminal methods borrow it,
/// so one query can be run again after writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    filters: Vec<Filter>,
    order: Vec<(Column, Direction)>,
    limit: Option<u32>,
    offset: u32,
}

impl Query {
    /// Starts an unfiltered query over all students.
    pub fn students() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: Column) -> Self {
        self.order.push((column, Direction::Asc));
        self
    }

    pub fn order_by_desc(mut self, column: Column) -> Self {
        self.order.push((column, Direction::Desc));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Fetches every matching student.
    pub fn all(&self, session: &mut Session) -> SessionResult<Vec<Student>> {
        session.flush()?;

        let mut binds = Vec::new();
        let sql = format!("{STUDENT_SELECT_SQL}{}", self.tail_sql(&mut binds)?);
        let mut stmt = session.connection().prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds.iter()))?;
        let mut students = Vec::new();

        while let Some(row) = rows.next()? {
            students.push(parse_student_row(row)?);
        }

        Ok(students)
    }

    /// Fetches only the first matching student.
    pub fn first(&self, session: &mut Session) -> SessionResult<Option<Student>> {
        let limit = self.limit.map_or(1, |limit| limit.min(1));
        let students = self.clone().limit(limit).all(session)?;
        Ok(students.into_iter().next())
    }

    /// Fetches the selected columns only. An empty selection means all
    /// columns.
    pub fn project(
        &self,
        session: &mut Session,
        columns: &[Column],
    ) -> SessionResult<Vec<ProjectedRow>> {
        session.flush()?;

        let columns = if columns.is_empty() {
            Column::ALL
        } else {
            columns
        };
        let select_list = columns
            .iter()
            .map(|column| column.as_sql())
            .collect::<Vec<_>>()
            .join(", ");

        let mut binds = Vec::new();
        let sql = format!(
            "SELECT {select_list} FROM students{}",
            self.tail_sql(&mut binds)?
        );
        let mut stmt = session.connection().prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds.iter()))?;
        let mut projected = Vec::new();

        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for (index, column) in columns.iter().enumerate() {
                values.push(read_field(row, index, *column)?);
            }
            projected.push(ProjectedRow(values));
        }

        Ok(projected)
    }

    /// Aggregate `COUNT(id)` over matching rows, honoring limit/offset.
    pub fn count(&self, session: &mut Session) -> SessionResult<i64> {
        session.flush()?;

        let mut binds = Vec::new();
        let sql = format!(
            "SELECT COUNT(id) FROM (SELECT id FROM students{})",
            self.tail_sql(&mut binds)?
        );
        let count = session.connection().query_row(
            &sql,
            params_from_iter(binds.iter()),
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count)
    }

    /// Adds `delta` to an integer column on every matching row without
    /// loading them. Returns the number of rows changed.
    pub fn increment(
        &self,
        session: &mut Session,
        column: Column,
        delta: i64,
    ) -> SessionResult<usize> {
        if !column.is_integer() {
            return Err(SessionError::NonNumericColumn(column));
        }

        let mut target_binds = Vec::new();
        let target = self.target_sql(&mut target_binds)?;

        // Why: SQLite turns an overflowing integer sum into REAL, which no
        // later read can decode, so out-of-range rows must stop the write.
        let (comparison, bound) = if delta >= 0 {
            (">", i64::MAX - delta)
        } else {
            ("<", i64::MIN - delta)
        };
        let guard_sql = format!(
            "SELECT COUNT(*) FROM (SELECT {column} AS value FROM students{target}) WHERE value {comparison} ?"
        );
        let mut guard_binds = target_binds.clone();
        guard_binds.push(FieldValue::Integer(bound));

        let mut binds = vec![FieldValue::Integer(delta)];
        binds.extend(target_binds);
        let sql = format!("UPDATE students SET {column} = {column} + ?{target}");

        self.bulk_write(session, "bulk_update", |conn| {
            let overflowing = conn.query_row(
                &guard_sql,
                params_from_iter(guard_binds.iter()),
                |row| row.get::<_, i64>(0),
            )?;
            if overflowing > 0 {
                return Err(SessionError::IntegerOverflow { column, delta });
            }
            Ok(conn.execute(&sql, params_from_iter(binds.iter()))?)
        })
    }

    /// Deletes every matching row without loading them. Returns the number
    /// of rows removed.
    pub fn delete(&self, session: &mut Session) -> SessionResult<usize> {
        let mut binds = Vec::new();
        let target = self.target_sql(&mut binds)?;
        let sql = format!("DELETE FROM students{target}");
        self.bulk_write(session, "bulk_delete", |conn| {
            Ok(conn.execute(&sql, params_from_iter(binds.iter()))?)
        })
    }

    /// Runs one bulk statement inside the session transaction. A failure
    /// rolls the whole session back, as a failed flush does.
    fn bulk_write(
        &self,
        session: &mut Session,
        event: &str,
        write: impl FnOnce(&Connection) -> SessionResult<usize>,
    ) -> SessionResult<usize> {
        session.flush()?;
        session.begin()?;

        match write(session.connection()) {
            Ok(changed) => {
                info!("event={event} module=query status=ok rows={changed}");
                session.refresh_persistent()?;
                Ok(changed)
            }
            Err(err) => {
                error!("event={event} module=query status=error error={err}");
                session.rollback()?;
                Err(err)
            }
        }
    }

    fn where_sql(&self, binds: &mut Vec<FieldValue>) -> SessionResult<String> {
        let mut sql = String::new();
        for (index, filter) in self.filters.iter().enumerate() {
            sql.push_str(if index == 0 { " WHERE " } else { " AND " });
            filter.push_sql(&mut sql, binds)?;
        }
        Ok(sql)
    }

    fn tail_sql(&self, binds: &mut Vec<FieldValue>) -> SessionResult<String> {
        let mut sql = self.where_sql(binds)?;

        sql.push_str(" ORDER BY ");
        for (column, direction) in &self.order {
            sql.push_str(&format!("{column} {}, ", direction.as_sql()));
        }
        sql.push_str("id ASC");

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            binds.push(FieldValue::Integer(i64::from(limit)));
            if self.offset > 0 {
                sql.push_str(" OFFSET ?");
                binds.push(FieldValue::Integer(i64::from(self.offset)));
            }
        } else if self.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            binds.push(FieldValue::Integer(i64::from(self.offset)));
        }

        Ok(sql)
    }

    /// Row selection for bulk writes. SQLite has no `LIMIT` on `UPDATE` and
    /// `DELETE` by default, so paginated queries go through an id subquery.
    fn target_sql(&self, binds: &mut Vec<FieldValue>) -> SessionResult<String> {
        if self.limit.is_none() && self.offset == 0 {
            return self.where_sql(binds);
        }
        Ok(format!(
            " WHERE id IN (SELECT id FROM students{})",
            self.tail_sql(binds)?
        ))
    }
}

/// Loads one student by primary key.
pub(crate) fn load_student(conn: &Connection, id: StudentId) -> SessionResult<Option<Student>> {
    let mut stmt = conn.prepare_cached(&format!("{STUDENT_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_student_row(row)?));
    }
    Ok(None)
}

fn parse_student_row(row: &Row<'_>) -> SessionResult<Student> {
    Ok(Student {
        id: Some(named(row, Column::Id)?),
        name: named(row, Column::Name)?,
        email: named(row, Column::Email)?,
        grade: named(row, Column::Grade)?,
        birthday: named(row, Column::Birthday)?,
        enrolled_date: named(row, Column::EnrolledDate)?,
    })
}

fn named<T: FromSql>(row: &Row<'_>, column: Column) -> SessionResult<T> {
    column_value(row, column.as_sql(), column)
}

fn read_field(row: &Row<'_>, index: usize, column: Column) -> SessionResult<FieldValue> {
    let value = match column {
        Column::Id | Column::Grade => column_value::<Option<i64>, _>(row, index, column)?
            .map(FieldValue::Integer),
        Column::Name | Column::Email => column_value::<Option<String>, _>(row, index, column)?
            .map(FieldValue::Text),
        Column::Birthday | Column::EnrolledDate => {
            column_value::<Option<NaiveDateTime>, _>(row, index, column)?.map(FieldValue::Timestamp)
        }
    };
    Ok(value.unwrap_or(FieldValue::Null))
}

fn column_value<T: FromSql, I: RowIndex>(
    row: &Row<'_>,
    index: I,
    column: Column,
) -> SessionResult<T> {
    row.get(index).map_err(|err| match err {
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => SessionError::InvalidData(format!(
            "invalid value in students.{column}: {err}"
        )),
        other => other.into(),
    })
}

impl Display for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut binds = Vec::new();
        match self.tail_sql(&mut binds) {
            Ok(tail) => write!(f, "SELECT * FROM students{tail}")?,
            Err(err) => return write!(f, "<invalid query: {err}>"),
        }
        if !binds.is_empty() {
            f.write_str(" -- [")?;
            for (index, value) in binds.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{value}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}
