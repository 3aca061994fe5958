use crate::auth::{self, User};
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn user_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "name": user.name,
        "role": user.role.as_str(),
        "linkedStudentId": user.linked_student_id
    })
}

fn login(params: &Value) -> Result<User, HandlerErr> {
    let user_id = get_required_str(params, "userId")?;
    let password = get_required_str(params, "password")?;
    // One message for both unknown id and wrong password.
    auth::verify(&user_id, &password).ok_or_else(|| HandlerErr {
        code: "auth_failed",
        message: "invalid user ID or password".to_string(),
        details: None,
    })
}

fn handle_login(state: &mut AppState, req: &Request) -> Value {
    match login(&req.params) {
        Ok(user) => {
            let payload = user_json(&user);
            state.session = Some(user);
            ok(&req.id, json!({ "user": payload }))
        }
        Err(error) => error.response(&req.id),
    }
}

fn handle_logout(state: &mut AppState, req: &Request) -> Value {
    state.session = None;
    ok(&req.id, json!({ "user": Value::Null }))
}

fn handle_current(state: &mut AppState, req: &Request) -> Value {
    let user = state
        .session
        .as_ref()
        .map(user_json)
        .unwrap_or(Value::Null);
    ok(&req.id, json!({ "user": user }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "auth.current" => Some(handle_current(state, req)),
        _ => None,
    }
}
