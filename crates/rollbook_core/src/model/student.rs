//! Student domain model.
//!
//! # Responsibility
//! - Define the one record persisted in the `students` table.
//! - Render the human-readable form printed by the demo driver.
//!
//! # Invariants
//! - `id` is `None` until the record is inserted through a tracked path.
//! - Field values are accepted as given; no range or format validation.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Generated primary key of a persisted student row.
pub type StudentId = i64;

/// Declared width of `students.email`. SQLite does not enforce it.
pub const EMAIL_MAX_CHARS: usize = 55;

/// Student record mapped onto `students`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// Assigned by the store on first tracked insert.
    pub id: Option<StudentId>,
    /// Indexed by `index_name` (non-unique).
    pub name: Option<String>,
    pub email: Option<String>,
    pub grade: Option<i64>,
    pub birthday: Option<NaiveDateTime>,
    /// Filled with the insert time when left unset.
    pub enrolled_date: Option<NaiveDateTime>,
}

impl Student {
    /// Creates an unpersisted student with only `name` set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_grade(mut self, grade: i64) -> Self {
        self.grade = Some(grade);
        self
    }

    pub fn with_birthday(mut self, birthday: NaiveDateTime) -> Self {
        self.birthday = Some(birthday);
        self
    }

    pub fn with_enrolled_date(mut self, enrolled_date: NaiveDateTime) -> Self {
        self.enrolled_date = Some(enrolled_date);
        self
    }

    /// Returns whether the store has assigned an id to this instance.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

impl Display for Student {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Student {}: {}, Grade {}",
            OrNone(self.id.as_ref()),
            OrNone(self.name.as_ref()),
            OrNone(self.grade.as_ref())
        )
    }
}

/// Renders an unset value as `None`.
pub(crate) struct OrNone<'a, T>(pub(crate) Option<&'a T>);

impl<T: Display> Display for OrNone<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{value}"),
            None => f.write_str("None"),
        }
    }
}

/// Mapped columns of `students`, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Id,
    Name,
    Email,
    Grade,
    Birthday,
    EnrolledDate,
}

impl Column {
    pub const ALL: &'static [Column] = &[
        Column::Id,
        Column::Name,
        Column::Email,
        Column::Grade,
        Column::Birthday,
        Column::EnrolledDate,
    ];

    /// SQL column name in `students`.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Email => "email",
            Self::Grade => "grade",
            Self::Birthday => "birthday",
            Self::EnrolledDate => "enrolled_date",
        }
    }

    /// Whether the column stores integers and accepts arithmetic updates.
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Id | Self::Grade)
    }

    /// Whether the column stores text and accepts substring matching.
    pub fn is_text(self) -> bool {
        matches!(self, Self::Name | Self::Email)
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, Student};

    #[test]
    fn display_renders_unset_values_as_none() {
        let student = Student::new("Ada Lovelace");
        assert_eq!(student.to_string(), "Student None: Ada Lovelace, Grade None");
    }

    #[test]
    fn column_kinds_are_disjoint() {
        for column in Column::ALL {
            assert!(!(column.is_integer() && column.is_text()), "{column}");
        }
    }
}
