//! Demo driver for the student roll.
//!
//! # Responsibility
//! - Seed the two sample students and run one CRUD scenario.
//! - Print each scenario's report as plain text to a caller-supplied writer.
//!
//! # Invariants
//! - Scenarios only run against an empty `students` table.
//! - Every scenario except `SingleInsert` seeds through the bulk path.
//! - Scenarios are independent; none relies on another having run.

use crate::model::student::{Column, Student};
use crate::query::{Filter, Query};
use crate::session::{Session, SessionError};
use chrono::{NaiveDate, NaiveDateTime};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{self, Write};

/// One capability of the session API, runnable on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Bulk-save both students; their in-memory ids stay unset.
    BulkInsert,
    /// Add one student through the tracked path and print assigned ids.
    SingleInsert,
    QueryAll,
    SelectNames,
    OrderByName,
    GradeDesc,
    Oldest,
    Youngest,
    First,
    Count,
    /// Students whose name contains "Alan".
    Filter,
    /// Load, bump each grade by one, commit.
    UpdateTracked,
    /// Bump every grade by three with one bulk statement.
    UpdateBulk,
    /// Fetch Albert Einstein, delete by identity, commit, re-query.
    Delete,
    /// Bulk-delete Albert Einstein by filter, re-query.
    DeleteBulk,
}

impl Scenario {
    pub const ALL: &'static [Scenario] = &[
        Scenario::BulkInsert,
        Scenario::SingleInsert,
        Scenario::QueryAll,
        Scenario::SelectNames,
        Scenario::OrderByName,
        Scenario::GradeDesc,
        Scenario::Oldest,
        Scenario::Youngest,
        Scenario::First,
        Scenario::Count,
        Scenario::Filter,
        Scenario::UpdateTracked,
        Scenario::UpdateBulk,
        Scenario::Delete,
        Scenario::DeleteBulk,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BulkInsert => "bulk-insert",
            Self::SingleInsert => "single-insert",
            Self::QueryAll => "query-all",
            Self::SelectNames => "select-names",
            Self::OrderByName => "order-by-name",
            Self::GradeDesc => "grade-desc",
            Self::Oldest => "oldest",
            Self::Youngest => "youngest",
            Self::First => "first",
            Self::Count => "count",
            Self::Filter => "filter",
            Self::UpdateTracked => "update-tracked",
            Self::UpdateBulk => "update-bulk",
            Self::Delete => "delete",
            Self::DeleteBulk => "delete-bulk",
        }
    }
}

impl Display for Scenario {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum DemoError {
    Session(SessionError),
    Io(io::Error),
    /// The store already holds this many students.
    StoreNotEmpty(i64),
}

impl Display for DemoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "failed to write report: {err}"),
            Self::StoreNotEmpty(count) => write!(
                f,
                "store already holds {count} students; scenarios need an empty store"
            ),
        }
    }
}

impl Error for DemoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Session(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::StoreNotEmpty(_) => None,
        }
    }
}

impl From<SessionError> for DemoError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}

impl From<io::Error> for DemoError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

pub type DemoResult<T> = Result<T, DemoError>;

pub fn albert_einstein() -> Student {
    Student {
        email: Some("albert.einstein@zurich.edu".to_string()),
        grade: Some(6),
        birthday: midnight(1879, 3, 14),
        ..Student::new("Albert Einstein")
    }
}

pub fn alan_turing() -> Student {
    Student {
        email: Some("alan.turing@sherborne.edu".to_string()),
        grade: Some(11),
        birthday: midnight(1912, 6, 23),
        ..Student::new("Alan Turing")
    }
}

fn midnight(year: i32, month: u32, day: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day).and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Deletes every student and commits. Returns the number of rows removed.
pub fn reset_store(session: &mut Session) -> DemoResult<usize> {
    let removed = Query::students().delete(session)?;
    session.commit()?;
    info!("event=demo_reset module=demo status=ok rows={removed}");
    Ok(removed)
}

/// Runs `scenario` against `session` and writes its report to `out`.
///
/// # Errors
/// `StoreNotEmpty` when `students` already has rows; see [`reset_store`].
pub fn run_scenario(
    session: &mut Session,
    scenario: Scenario,
    out: &mut impl Write,
) -> DemoResult<()> {
    info!("event=demo_run module=demo status=start scenario={scenario}");

    let existing = Query::students().count(session)?;
    if existing > 0 {
        warn!(
            "event=demo_run module=demo status=error scenario={scenario} existing_rows={existing}"
        );
        return Err(DemoError::StoreNotEmpty(existing));
    }

    let seeded = match scenario {
        Scenario::SingleInsert => Vec::new(),
        _ => seed(session)?,
    };

    let all = Query::students();
    let albert_query = Query::students().filter(Filter::eq(Column::Name, "Albert Einstein"));

    match scenario {
        Scenario::SingleInsert => {
            let alan = alan_turing();
            let handle = session.add(albert_einstein());
            session.commit()?;
            let albert_id = session.get(handle).and_then(|student| student.id);
            writeln!(out, "New student ID is {}.", render(albert_id))?;
            writeln!(out, "New student ID is {}.", render(alan.id))?;
        }
        Scenario::BulkInsert => {
            writeln!(out, "Bulk saved {} students.", seeded.len())?;
            for student in &seeded {
                writeln!(out, "{student}")?;
            }
        }
        Scenario::QueryAll => {
            writeln!(out, "{}", list(&all.all(session)?))?;
        }
        Scenario::SelectNames => {
            writeln!(out, "{}", list(&all.project(session, &[Column::Name])?))?;
        }
        Scenario::OrderByName => {
            let names = all
                .clone()
                .order_by(Column::Name)
                .project(session, &[Column::Name])?;
            writeln!(out, "{}", list(&names))?;
        }
        Scenario::GradeDesc => {
            let rows = all
                .clone()
                .order_by_desc(Column::Grade)
                .project(session, &[Column::Name, Column::Grade])?;
            writeln!(out, "{}", list(&rows))?;
        }
        Scenario::Oldest => {
            let rows = all
                .clone()
                .order_by_desc(Column::Grade)
                .limit(1)
                .project(session, &[Column::Name, Column::Birthday])?;
            writeln!(out, "{}", list(&rows))?;
        }
        Scenario::Youngest => {
            let rows = all
                .clone()
                .order_by(Column::Grade)
                .limit(1)
                .project(session, &[Column::Name, Column::Birthday])?;
            writeln!(out, "{}", list(&rows))?;
        }
        Scenario::First => {
            let rows = all
                .clone()
                .order_by(Column::Grade)
                .limit(1)
                .project(session, &[Column::Name, Column::Birthday])?;
            writeln!(out, "{}", render(rows.first()))?;
        }
        Scenario::Count => {
            writeln!(out, "{}", all.count(session)?)?;
        }
        Scenario::Filter => {
            let matches = all
                .clone()
                .filter(Filter::contains(Column::Name, "Alan"))
                .all(session)?;
            for student in &matches {
                writeln!(out, "{student}")?;
            }
        }
        Scenario::UpdateTracked => {
            for mut student in all.all(session)? {
                student.grade = student.grade.map(|grade| grade + 1);
                session.add(student);
            }
            session.commit()?;
            writeln!(out, "{}", list(&all.project(session, &[Column::Name, Column::Grade])?))?;
        }
        Scenario::UpdateBulk => {
            all.increment(session, Column::Grade, 3)?;
            writeln!(out, "{}", list(&all.project(session, &[Column::Name, Column::Grade])?))?;
        }
        Scenario::Delete => {
            if let Some(student) = albert_query.first(session)? {
                session.delete(&student)?;
                session.commit()?;
            }
            writeln!(out, "{}", render(albert_query.first(session)?))?;
        }
        Scenario::DeleteBulk => {
            albert_query.delete(session)?;
            session.commit()?;
            writeln!(out, "{}", render(albert_query.first(session)?))?;
        }
    }

    info!("event=demo_run module=demo status=ok scenario={scenario}");
    Ok(())
}

/// Bulk-saves the two sample students and commits. The returned instances
/// keep `id: None`.
fn seed(session: &mut Session) -> DemoResult<Vec<Student>> {
    let students = vec![albert_einstein(), alan_turing()];
    session.bulk_save_objects(&students)?;
    session.commit()?;
    Ok(students)
}

fn render<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "None".to_string(), |value| value.to_string())
}

fn list<T: Display>(items: &[T]) -> String {
    let rendered = items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{rendered}]")
}
