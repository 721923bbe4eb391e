use rollbook_core::demo::{alan_turing, albert_einstein};
use rollbook_core::{
    open_db_in_memory, Column, Filter, FlushStats, Query, Session, SessionError, Student,
};
use std::collections::HashSet;

fn new_session() -> Session {
    Session::new(open_db_in_memory().expect("open in-memory db"))
}

#[test]
fn tracked_insert_assigns_id_on_commit() {
    let mut session = new_session();

    let handle = session.add(albert_einstein());
    assert_eq!(session.get(handle).expect("tracked instance").id, None);

    session.commit().expect("commit");

    let stored = session.get(handle).expect("tracked instance");
    assert!(stored.id.is_some());
    assert!(stored.enrolled_date.is_some());
    assert!(!session.in_transaction());
}

#[test]
fn tracked_inserts_get_unique_ids() {
    let mut session = new_session();

    let handles = session.add_all([albert_einstein(), alan_turing(), Student::new("Ada")]);
    let stats = session.commit().expect("commit");
    assert_eq!(stats.inserted, 3);

    let ids: HashSet<_> = handles
        .iter()
        .map(|handle| {
            session
                .get(*handle)
                .expect("tracked instance")
                .id
                .expect("id assigned on commit")
        })
        .collect();
    assert_eq!(ids.len(), 3);
}

#[test]
fn bulk_save_persists_rows_without_refreshing_ids() {
    let mut session = new_session();
    let students = [albert_einstein(), alan_turing()];

    assert_eq!(session.bulk_save_objects(&students).expect("bulk save"), 2);
    session.commit().expect("commit");

    assert!(students.iter().all(|student| student.id.is_none()));
    let stored = Query::students().all(&mut session).expect("query all");
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|student| student.id.is_some()));
    assert!(stored.iter().all(|student| student.enrolled_date.is_some()));
}

#[test]
fn explicit_enrolled_date_is_kept() {
    let mut session = new_session();
    let enrolled = chrono::NaiveDate::from_ymd_opt(1930, 9, 1)
        .expect("valid date")
        .and_hms_opt(8, 30, 0)
        .expect("valid time");

    let handle = session.add(Student::new("Kurt Godel").with_enrolled_date(enrolled));
    session.commit().expect("commit");

    let id = session.get(handle).expect("tracked instance").id.expect("id assigned on commit");
    let stored = Query::students()
        .filter(Filter::eq(Column::Id, id))
        .first(&mut session)
        .expect("query first")
        .expect("matching row");
    assert_eq!(stored.enrolled_date, Some(enrolled));
}

#[test]
fn queries_autoflush_pending_inserts() {
    let mut session = new_session();

    let handle = session.add(albert_einstein());
    assert_eq!(Query::students().count(&mut session).expect("count rows"), 1);
    assert!(session.get(handle).expect("tracked instance").id.is_some());
    assert!(session.in_transaction());
}

#[test]
fn mutating_a_tracked_instance_is_written_on_commit() {
    let mut session = new_session();

    let handle = session.add(alan_turing());
    session.commit().expect("commit");

    session.get_mut(handle).expect("tracked instance").grade = Some(12);
    let stats = session.commit().expect("commit");
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.inserted, 0);

    let stored = Query::students().first(&mut session).expect("query first").expect("matching row");
    assert_eq!(stored.grade, Some(12));
}

#[test]
fn unchanged_tracked_instances_are_not_rewritten() {
    let mut session = new_session();

    session.add(alan_turing());
    session.commit().expect("commit");

    assert_eq!(session.commit().expect("commit"), FlushStats::default());
}

#[test]
fn adding_fetched_records_updates_them() {
    let mut session = new_session();
    session
        .bulk_save_objects(&[albert_einstein(), alan_turing()])
        .expect("bulk save");
    session.commit().expect("commit");

    for mut student in Query::students().all(&mut session).expect("query all") {
        student.grade = student.grade.map(|grade| grade + 1);
        session.add(student);
    }
    let stats = session.commit().expect("commit");
    assert_eq!(stats.updated, 2);

    let grades: Vec<_> = Query::students()
        .all(&mut session)
        .expect("query all")
        .into_iter()
        .map(|student| student.grade)
        .collect();
    assert_eq!(grades, [Some(7), Some(12)]);
}

#[test]
fn adding_same_id_twice_reuses_the_tracked_entry() {
    let mut session = new_session();

    let first = session.add(alan_turing());
    session.commit().expect("commit");

    let mut copy = session.get(first).expect("tracked instance").clone();
    copy.grade = Some(13);
    let second = session.add(copy);

    assert_eq!(first, second);
    assert_eq!(session.get(first).expect("tracked instance").grade, Some(13));
}

#[test]
fn delete_by_identity_removes_the_row() {
    let mut session = new_session();
    session
        .bulk_save_objects(&[albert_einstein(), alan_turing()])
        .expect("bulk save");
    session.commit().expect("commit");

    let query = Query::students().filter(Filter::eq(Column::Name, "Albert Einstein"));
    let albert = query.first(&mut session).expect("query first").expect("matching row");

    session.delete(&albert).expect("delete");
    let stats = session.commit().expect("commit");
    assert_eq!(stats.deleted, 1);

    assert_eq!(query.first(&mut session).expect("query first"), None);
    assert_eq!(Query::students().count(&mut session).expect("count rows"), 1);
}

#[test]
fn deleting_a_tracked_instance_detaches_it() {
    let mut session = new_session();

    let handle = session.add(alan_turing());
    session.commit().expect("commit");
    let student = session.get(handle).expect("tracked instance").clone();

    session.delete(&student).expect("delete");
    session.commit().expect("commit");

    assert!(!session.is_attached(handle));
    assert_eq!(session.commit().expect("commit"), FlushStats::default());
}

#[test]
fn delete_requires_a_persisted_instance() {
    let mut session = new_session();

    let err = session.delete(&albert_einstein()).unwrap_err();
    assert!(matches!(err, SessionError::NotPersisted));
}

#[test]
fn deleting_a_missing_row_fails_and_rolls_back() {
    let mut session = new_session();

    let handle = session.add(albert_einstein());
    let mut ghost = alan_turing();
    ghost.id = Some(404);
    session.delete(&ghost).expect("delete");

    let err = session.commit().unwrap_err();
    assert!(matches!(err, SessionError::NotFound(404)));

    assert!(!session.in_transaction());
    assert_eq!(session.get(handle).expect("tracked instance").id, None);
    assert_eq!(Query::students().count(&mut session).expect("count rows"), 0);
}

#[test]
fn updating_a_missing_row_returns_not_found() {
    let mut session = new_session();

    let mut ghost = alan_turing();
    ghost.id = Some(7);
    session.add(ghost);

    let err = session.commit().unwrap_err();
    assert!(matches!(err, SessionError::NotFound(7)));
}

#[test]
fn rollback_discards_inserts_and_resets_ids() {
    let mut session = new_session();

    let handle = session.add(albert_einstein());
    session.flush().expect("flush");
    assert!(session.get(handle).expect("tracked instance").id.is_some());

    session.rollback().expect("rollback");

    let student = session.get(handle).expect("tracked instance");
    assert_eq!(student.id, None);
    assert_eq!(student.enrolled_date, None);
    assert!(!session.is_attached(handle));
    assert_eq!(Query::students().count(&mut session).expect("count rows"), 0);
}

#[test]
fn rollback_reloads_persistent_instances() {
    let mut session = new_session();

    let handle = session.add(alan_turing());
    session.commit().expect("commit");

    session.get_mut(handle).expect("tracked instance").grade = Some(99);
    session.flush().expect("flush");
    session.rollback().expect("rollback");

    assert_eq!(session.get(handle).expect("tracked instance").grade, Some(11));
    assert!(session.is_attached(handle));
    assert_eq!(session.commit().expect("commit"), FlushStats::default());
}

#[test]
fn bulk_save_with_ids_updates_existing_rows() {
    let mut session = new_session();
    session.bulk_save_objects(&[alan_turing()]).expect("bulk save");
    session.commit().expect("commit");

    let mut stored = Query::students()
        .first(&mut session)
        .expect("query first")
        .expect("matching row");
    stored.grade = Some(20);
    session.bulk_save_objects(&[stored]).expect("bulk save");
    session.commit().expect("commit");

    let reloaded = Query::students().all(&mut session).expect("query all");
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].grade, Some(20));
}
