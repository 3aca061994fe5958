use crate::auth::{Role, User};
use crate::classify;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    find_record_by_id, find_record_by_student_and_date, get_optional_str, get_required_str,
    load_settings, parse_iso_date, require_manage, HandlerErr, RecordRow, RECORD_COLUMNS,
};
use crate::ipc::types::{AppState, Request};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

fn list_records(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class = get_optional_str(params, "class")?;
    let date = get_optional_str(params, "date")?;
    let student_id = get_optional_str(params, "studentId")?;

    let mut sql = format!("SELECT {} FROM attendance_records", RECORD_COLUMNS);
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<String> = Vec::new();
    if let Some(c) = class {
        clauses.push("class = ?");
        args.push(c);
    }
    if let Some(d) = date {
        clauses.push("date = ?");
        args.push(d);
    }
    if let Some(s) = student_id {
        clauses.push("student_id = ?");
        args.push(s);
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    // Insertion order; callers sort for display.
    sql.push_str(" ORDER BY rowid");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db_query)?;
    let records = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), RecordRow::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    let (late_after, absent_after) = load_settings(conn)?;
    let records_json: Vec<Value> = records.iter().map(RecordRow::to_json).collect();
    Ok(json!({
        "count": records_json.len(),
        "records": records_json,
        "settings": {
            "lateAfter": late_after,
            "absentAfter": absent_after
        }
    }))
}

fn mark_absent(
    conn: &Connection,
    session: Option<&User>,
    params: &Value,
) -> Result<Value, HandlerErr> {
    require_manage(session)?;
    let student_id = get_required_str(params, "studentId")?;
    let date = match get_optional_str(params, "date")? {
        Some(d) => {
            if parse_iso_date(&d).is_none() {
                return Err(HandlerErr::bad_params("date must be YYYY-MM-DD"));
            }
            d
        }
        None => Local::now().format("%Y-%m-%d").to_string(),
    };

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

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;

    if let Some(existing) = find_record_by_student_and_date(&tx, &student_id, &date)? {
        return Err(HandlerErr {
            code: "already_recorded",
            message: "student already has a record for this date".to_string(),
            details: Some(json!({ "existingRecord": existing.to_json() })),
        });
    }

    // No scan happened; the record carries a null scan time.
    let record = RecordRow {
        id: Uuid::new_v4().to_string(),
        student_id,
        student_name: name,
        class,
        date,
        scan_time: None,
        status: "absent".to_string(),
        rfid_tag: None,
        corrected_by: None,
        absent_reason: None,
        teacher_note: None,
    };
    tx.execute(
        "INSERT INTO attendance_records(
            id, student_id, student_name, class, date, scan_time, status, rfid_tag
        ) VALUES(?, ?, ?, ?, ?, NULL, ?, NULL)",
        (
            &record.id,
            &record.student_id,
            &record.student_name,
            &record.class,
            &record.date,
            &record.status,
        ),
    )
    .map_err(|e| HandlerErr::db_update(e, "attendance_records"))?;
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({ "record": record.to_json() }))
}

fn apply_status(
    conn: &Connection,
    record_id: &str,
    status: classify::Status,
    actor: &str,
) -> Result<(), HandlerErr> {
    conn.execute(
        "UPDATE attendance_records SET status = ?, corrected_by = ? WHERE id = ?",
        (status.as_str(), actor, record_id),
    )
    .map_err(|e| HandlerErr::db_update(e, "attendance_records"))?;
    Ok(())
}

fn apply_absent_reason(
    conn: &Connection,
    record_id: &str,
    reason: &str,
) -> Result<(), HandlerErr> {
    conn.execute(
        "UPDATE attendance_records SET absent_reason = ? WHERE id = ?",
        (reason, record_id),
    )
    .map_err(|e| HandlerErr::db_update(e, "attendance_records"))?;
    Ok(())
}

fn apply_teacher_note(conn: &Connection, record_id: &str, note: &str) -> Result<(), HandlerErr> {
    conn.execute(
        "UPDATE attendance_records SET teacher_note = ? WHERE id = ?",
        (note, record_id),
    )
    .map_err(|e| HandlerErr::db_update(e, "attendance_records"))?;
    Ok(())
}

fn correct_record(
    conn: &Connection,
    session: Option<&User>,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let record_id = get_required_str(params, "id")?;
    let status_raw = get_optional_str(params, "status")?;
    let absent_reason = get_optional_str(params, "absentReason")?;
    let teacher_note = get_optional_str(params, "teacherNote")?;

    if status_raw.is_none() && absent_reason.is_none() && teacher_note.is_none() {
        return Err(HandlerErr::bad_params(
            "at least one of status, absentReason, teacherNote is required",
        ));
    }

    let status = match status_raw {
        Some(raw) => Some(classify::Status::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params("invalid status; must be present, absent, or late")
        })?),
        None => None,
    };

    // All authorization happens before anything is written, and the
    // role gates run before the lookup so an anonymous caller cannot
    // discover which record ids exist.
    let mut status_actor: Option<String> = None;
    if status.is_some() {
        let user = require_manage(session)?;
        let name = user.name.trim();
        status_actor = Some(if name.is_empty() {
            "Teacher".to_string()
        } else {
            name.to_string()
        });
    }
    if teacher_note.is_some() {
        require_manage(session)?;
    }
    let reason_user = match absent_reason {
        Some(_) => Some(session.ok_or_else(|| HandlerErr {
            code: "auth_required",
            message: "login required".to_string(),
            details: None,
        })?),
        None => None,
    };

    let record = find_record_by_id(conn, &record_id)?
        .ok_or_else(|| HandlerErr::not_found("record not found"))?;

    // The parent link can only be checked against the record itself.
    if let Some(user) = reason_user {
        match user.role {
            Role::Admin | Role::Teacher => {}
            Role::Parent => {
                if user.linked_student_id != Some(record.student_id.as_str()) {
                    return Err(HandlerErr {
                        code: "forbidden",
                        message: "parents may only annotate their own student".to_string(),
                        details: None,
                    });
                }
            }
        }
    }

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    if let (Some(s), Some(actor)) = (status, status_actor.as_deref()) {
        apply_status(&tx, &record_id, s, actor)?;
    }
    if let Some(reason) = absent_reason.as_deref() {
        apply_absent_reason(&tx, &record_id, reason)?;
    }
    if let Some(note) = teacher_note.as_deref() {
        apply_teacher_note(&tx, &record_id, note)?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    let updated = find_record_by_id(conn, &record_id)?
        .ok_or_else(|| HandlerErr::not_found("record not found"))?;
    Ok(json!({ "record": updated.to_json() }))
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match list_records(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_mark_absent(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match mark_absent(conn, state.session.as_ref(), &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_correct(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match correct_record(conn, state.session.as_ref(), &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "attendance.list" => Some(handle_list(state, req)),
        "attendance.markAbsent" => Some(handle_mark_absent(state, req)),
        "attendance.correct" => Some(handle_correct(state, req)),
        _ => None,
    }
}
