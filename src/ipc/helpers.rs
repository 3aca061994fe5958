use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::{json, Value};

use crate::auth::User;
use crate::ipc::error::err;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "conflict",
            message: message.into(),
            details: None,
        }
    }

    pub fn db_query(e: rusqlite::Error) -> Self {
        HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn db_update(e: rusqlite::Error, table: &str) -> Self {
        HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": table })),
        }
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Optional string param. Absent and null both mean "not provided";
/// any other non-string value is a caller error.
pub fn get_optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Ok(None);
    };
    if v.is_null() {
        return Ok(None);
    }
    v.as_str()
        .map(|s| Some(s.to_string()))
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string", key)))
}

/// Strict "YYYY-MM-DD": fixed digit shape first, calendar validity second.
/// The raw string is the per-day idempotency key, so unpadded spellings of
/// the same day ("2026-3-2") must never get through.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return None;
    }
    for (i, c) in b.iter().enumerate() {
        if i == 4 || i == 7 {
            continue;
        }
        if !c.is_ascii_digit() {
            return None;
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Session gate: any logged-in teacher or admin.
pub fn require_manage(session: Option<&User>) -> Result<&User, HandlerErr> {
    let user = session.ok_or_else(|| HandlerErr {
        code: "auth_required",
        message: "login required".to_string(),
        details: None,
    })?;
    if !user.can_manage() {
        return Err(HandlerErr {
            code: "forbidden",
            message: "teacher or admin role required".to_string(),
            details: None,
        });
    }
    Ok(user)
}

/// Session gate: admin only.
pub fn require_admin(session: Option<&User>) -> Result<&User, HandlerErr> {
    let user = session.ok_or_else(|| HandlerErr {
        code: "auth_required",
        message: "login required".to_string(),
        details: None,
    })?;
    if !user.is_admin() {
        return Err(HandlerErr {
            code: "forbidden",
            message: "admin role required".to_string(),
            details: None,
        });
    }
    Ok(user)
}

#[derive(Debug, Clone)]
pub struct RecordRow {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub class: String,
    pub date: String,
    pub scan_time: Option<String>,
    pub status: String,
    pub rfid_tag: Option<String>,
    pub corrected_by: Option<String>,
    pub absent_reason: Option<String>,
    pub teacher_note: Option<String>,
}

pub const RECORD_COLUMNS: &str = "id, student_id, student_name, class, date, scan_time, \
     status, rfid_tag, corrected_by, absent_reason, teacher_note";

impl RecordRow {
    pub fn from_row(r: &Row) -> rusqlite::Result<Self> {
        Ok(RecordRow {
            id: r.get(0)?,
            student_id: r.get(1)?,
            student_name: r.get(2)?,
            class: r.get(3)?,
            date: r.get(4)?,
            scan_time: r.get(5)?,
            status: r.get(6)?,
            rfid_tag: r.get(7)?,
            corrected_by: r.get(8)?,
            absent_reason: r.get(9)?,
            teacher_note: r.get(10)?,
        })
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "studentId": self.student_id,
            "studentName": self.student_name,
            "class": self.class,
            "date": self.date,
            "scanTime": self.scan_time,
            "status": self.status,
            "rfidTag": self.rfid_tag,
            "correctedBy": self.corrected_by,
            "absentReason": self.absent_reason,
            "teacherNote": self.teacher_note
        })
    }
}

pub fn find_record_by_id(conn: &Connection, id: &str) -> Result<Option<RecordRow>, HandlerErr> {
    conn.query_row(
        &format!(
            "SELECT {} FROM attendance_records WHERE id = ?",
            RECORD_COLUMNS
        ),
        [id],
        RecordRow::from_row,
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

pub fn find_record_by_student_and_date(
    conn: &Connection,
    student_id: &str,
    date: &str,
) -> Result<Option<RecordRow>, HandlerErr> {
    conn.query_row(
        &format!(
            "SELECT {} FROM attendance_records WHERE student_id = ? AND date = ?",
            RECORD_COLUMNS
        ),
        [student_id, date],
        RecordRow::from_row,
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

/// Current cutoff pair as (lateAfter, absentAfter).
pub fn load_settings(conn: &Connection) -> Result<(String, String), HandlerErr> {
    conn.query_row(
        "SELECT late_after, absent_after FROM attendance_settings WHERE id = 1",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .map_err(HandlerErr::db_query)
}
