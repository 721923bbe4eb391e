use rollbook_core::db::schema::create_schema;
use rollbook_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_creates_students_table_and_name_index() {
    let conn = open_db_in_memory().expect("open in-memory db");

    assert_eq!(
        sqlite_object(&conn, "table", "students").as_deref(),
        Some("students")
    );
    assert_eq!(
        sqlite_object(&conn, "index", "index_name").as_deref(),
        Some("students")
    );
}

#[test]
fn students_id_is_the_only_primary_key_column() {
    let conn = open_db_in_memory().expect("open in-memory db");

    let mut stmt = conn
        .prepare("PRAGMA table_info(students);")
        .expect("prepare table_info");
    let columns: Vec<(String, i64)> = stmt
        .query_map([], |row| Ok((row.get("name")?, row.get("pk")?)))
        .expect("query table_info")
        .collect::<Result<_, _>>()
        .expect("read table_info rows");

    let names: Vec<&str> = columns.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        ["id", "name", "email", "grade", "birthday", "enrolled_date"]
    );
    let primary: Vec<&str> = columns
        .iter()
        .filter(|(_, pk)| *pk > 0)
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(primary, ["id"]);
}

#[test]
fn name_index_is_not_unique() {
    let conn = open_db_in_memory().expect("open in-memory db");

    let unique: i64 = conn
        .query_row(
            "SELECT \"unique\" FROM pragma_index_list('students') WHERE name = 'index_name';",
            [],
            |row| row.get(0),
        )
        .expect("read index_name uniqueness");
    assert_eq!(unique, 0);

    conn.execute_batch(
        "INSERT INTO students (name) VALUES ('Twin');
         INSERT INTO students (name) VALUES ('Twin');",
    )
    .expect("duplicate names are allowed");
}

#[test]
fn recreating_schema_is_a_noop() {
    let conn = open_db_in_memory().expect("open in-memory db");
    conn.execute("INSERT INTO students (name) VALUES ('Kept');", [])
        .expect("insert row");

    create_schema(&conn).expect("second create");
    create_schema(&conn).expect("third create");

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM students;", [], |row| row.get(0))
        .expect("count rows");
    assert_eq!(count, 1);
}

#[test]
fn opening_same_file_twice_keeps_rows() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("rollbook.db");

    let conn = open_db(&path).expect("first open");
    conn.execute("INSERT INTO students (name) VALUES ('Persisted');", [])
        .expect("insert row");
    drop(conn);

    let conn = open_db(&path).expect("second open");
    let name: String = conn
        .query_row("SELECT name FROM students;", [], |row| row.get(0))
        .expect("read row");
    assert_eq!(name, "Persisted");
}

#[test]
fn opening_file_with_foreign_students_table_reports_missing_column() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("foreign.db");

    let conn = Connection::open(&path).expect("open raw sqlite file");
    conn.execute_batch("CREATE TABLE students (id INTEGER PRIMARY KEY, name TEXT);")
        .expect("create foreign table");
    drop(conn);

    match open_db(&path).expect_err("foreign table must be rejected") {
        DbError::MissingColumn { table, column } => {
            assert_eq!(table, "students");
            assert_eq!(column, "email");
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn sqlite_object(conn: &Connection, kind: &str, name: &str) -> Option<String> {
    conn.query_row(
        "SELECT tbl_name FROM sqlite_master WHERE type = ?1 AND name = ?2;",
        [kind, name],
        |row| row.get(0),
    )
    .ok()
}
