use crate::auth::User;
use crate::classify;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_required_str, load_settings, require_admin, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn get_settings(conn: &Connection) -> Result<Value, HandlerErr> {
    let (late_after, absent_after) = load_settings(conn)?;
    Ok(json!({
        "lateAfter": late_after,
        "absentAfter": absent_after
    }))
}

fn update_settings(
    conn: &Connection,
    session: Option<&User>,
    params: &Value,
) -> Result<Value, HandlerErr> {
    require_admin(session)?;
    let late_after = get_required_str(params, "lateAfter")?;
    let absent_after = get_required_str(params, "absentAfter")?;

    let (Some(late_m), Some(absent_m)) = (
        classify::parse_hhmm(&late_after),
        classify::parse_hhmm(&absent_after),
    ) else {
        return Err(HandlerErr::bad_params("times must be in HH:MM format"));
    };
    if late_m >= absent_m {
        return Err(HandlerErr {
            code: "invalid_ordering",
            message: "lateAfter must be earlier than absentAfter".to_string(),
            details: None,
        });
    }

    // Both cutoffs move in one statement; a failed request changes neither.
    conn.execute(
        "UPDATE attendance_settings SET late_after = ?, absent_after = ? WHERE id = 1",
        (&late_after, &absent_after),
    )
    .map_err(|e| HandlerErr::db_update(e, "attendance_settings"))?;

    Ok(json!({
        "settings": {
            "lateAfter": late_after,
            "absentAfter": absent_after
        }
    }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match get_settings(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match update_settings(conn, state.session.as_ref(), &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_get(state, req)),
        "settings.update" => Some(handle_update(state, req)),
        _ => None,
    }
}
