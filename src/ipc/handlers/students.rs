use crate::auth::User;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    get_optional_str, get_required_str, require_admin, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

fn list_students(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class = get_optional_str(params, "class")?;

    let mut sql = "SELECT id, student_id, name, class, rfid_tag, rfid_status, \
                   parent_name, parent_email FROM students"
        .to_string();
    let mut args: Vec<String> = Vec::new();
    if let Some(c) = class {
        sql.push_str(" WHERE class = ?");
        args.push(c);
    }
    sql.push_str(" ORDER BY rowid");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db_query)?;
    let students = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "name": r.get::<_, String>(2)?,
                "class": r.get::<_, String>(3)?,
                "rfidTag": r.get::<_, String>(4)?,
                "rfidStatus": r.get::<_, String>(5)?,
                "parentName": r.get::<_, Option<String>>(6)?,
                "parentEmail": r.get::<_, Option<String>>(7)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    Ok(json!({
        "count": students.len(),
        "students": students
    }))
}

fn create_student(
    conn: &Connection,
    session: Option<&User>,
    params: &Value,
) -> Result<Value, HandlerErr> {
    require_admin(session)?;
    let student_id = get_required_str(params, "studentId")?;
    let name = get_required_str(params, "name")?;
    let class = get_required_str(params, "class")?;
    let rfid_tag = get_required_str(params, "rfidTag")?;
    let parent_name = get_optional_str(params, "parentName")?;
    let parent_email = get_optional_str(params, "parentEmail")?;

    let id_taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE student_id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    if id_taken.is_some() {
        return Err(HandlerErr::conflict(format!(
            "student ID {} already exists",
            student_id
        )));
    }
    let tag_holder: Option<String> = conn
        .query_row(
            "SELECT name FROM students WHERE rfid_tag = ?",
            [&rfid_tag],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    if let Some(holder) = tag_holder {
        return Err(HandlerErr::conflict(format!(
            "RFID tag {} is already assigned to {}",
            rfid_tag, holder
        )));
    }

    let id = Uuid::new_v4().to_string();
    // Enrollment creates the credential in the same stroke, active.
    conn.execute(
        "INSERT INTO students(
            id, student_id, name, class, rfid_tag, rfid_status, parent_name, parent_email
        ) VALUES(?, ?, ?, ?, ?, 'active', ?, ?)",
        (
            &id,
            &student_id,
            &name,
            &class,
            &rfid_tag,
            &parent_name,
            &parent_email,
        ),
    )
    .map_err(|e| HandlerErr::db_update(e, "students"))?;

    Ok(json!({
        "student": {
            "id": id,
            "studentId": student_id,
            "name": name,
            "class": class,
            "rfidTag": rfid_tag,
            "rfidStatus": "active",
            "parentName": parent_name,
            "parentEmail": parent_email
        }
    }))
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match list_students(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match create_student(conn, state.session.as_ref(), &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_list(state, req)),
        "students.create" => Some(handle_create(state, req)),
        _ => None,
    }
}
