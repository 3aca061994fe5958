use crate::auth::User;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    get_optional_str, get_required_str, require_admin, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

fn card_json(student_id: &str, name: &str, class: &str, tag: &str, status: &str) -> Value {
    json!({
        "studentId": student_id,
        "studentName": name,
        "class": class,
        "rfidTag": tag,
        "rfidStatus": status
    })
}

fn list_cards(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let status = get_optional_str(params, "status")?;
    // Only the two known statuses act as filters; anything else lists all.
    let status = status.filter(|s| s == "active" || s == "inactive");
    let rfid_tag = get_optional_str(params, "rfidTag")?;

    let mut sql =
        "SELECT student_id, name, class, rfid_tag, rfid_status FROM students".to_string();
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<String> = Vec::new();
    if let Some(s) = status {
        clauses.push("rfid_status = ?");
        args.push(s);
    }
    if let Some(t) = rfid_tag {
        clauses.push("rfid_tag = ?");
        args.push(t);
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY rowid");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db_query)?;
    let cards = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |r| {
            let student_id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let class: String = r.get(2)?;
            let tag: String = r.get(3)?;
            let status: String = r.get(4)?;
            Ok(card_json(&student_id, &name, &class, &tag, &status))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    Ok(json!({
        "count": cards.len(),
        "cards": cards
    }))
}

fn register_card(
    conn: &Connection,
    session: Option<&User>,
    params: &Value,
) -> Result<Value, HandlerErr> {
    require_admin(session)?;
    let student_id = get_required_str(params, "studentId")?;
    let rfid_tag = get_required_str(params, "rfidTag")?;

    // Students are never unlinked, so any other holder of the tag conflicts.
    let holder: Option<(String, String)> = conn
        .query_row(
            "SELECT student_id, name FROM students WHERE rfid_tag = ?",
            [&rfid_tag],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    if let Some((holder_id, holder_name)) = holder {
        if holder_id != student_id {
            return Err(HandlerErr::conflict(format!(
                "RFID tag {} is already assigned to {}",
                rfid_tag, holder_name
            )));
        }
    }

    let student: Option<(String, String)> = conn
        .query_row(
            "SELECT name, class FROM students WHERE student_id = ?",
            [&student_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some((name, class)) = student else {
        return Err(HandlerErr::not_found("student not found"));
    };

    // Assigning a tag always reactivates; re-registering the student's own
    // tag is how an inactive card comes back.
    conn.execute(
        "UPDATE students SET rfid_tag = ?, rfid_status = 'active' WHERE student_id = ?",
        (&rfid_tag, &student_id),
    )
    .map_err(|e| HandlerErr::db_update(e, "students"))?;

    Ok(json!({
        "card": card_json(&student_id, &name, &class, &rfid_tag, "active")
    }))
}

fn set_card_status(
    conn: &Connection,
    session: Option<&User>,
    params: &Value,
) -> Result<Value, HandlerErr> {
    require_admin(session)?;
    let rfid_tag = get_required_str(params, "rfidTag")?;
    let action = get_required_str(params, "action")?;
    let new_status = match action.as_str() {
        "activate" => "active",
        "deactivate" => "inactive",
        _ => {
            return Err(HandlerErr::bad_params(
                "action must be 'activate' or 'deactivate'",
            ))
        }
    };

    let student: Option<(String, String, String)> = conn
        .query_row(
            "SELECT student_id, name, class FROM students WHERE rfid_tag = ?",
            [&rfid_tag],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some((student_id, name, class)) = student else {
        return Err(HandlerErr::not_found("RFID tag not found"));
    };

    conn.execute(
        "UPDATE students SET rfid_status = ? WHERE rfid_tag = ?",
        (new_status, &rfid_tag),
    )
    .map_err(|e| HandlerErr::db_update(e, "students"))?;

    Ok(json!({
        "card": card_json(&student_id, &name, &class, &rfid_tag, new_status)
    }))
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match list_cards(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_register(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match register_card(conn, state.session.as_ref(), &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_set_status(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match set_card_status(conn, state.session.as_ref(), &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "cards.list" => Some(handle_list(state, req)),
        "cards.register" => Some(handle_register(state, req)),
        "cards.setStatus" => Some(handle_set_status(state, req)),
        _ => None,
    }
}
