use crate::classify;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    find_record_by_student_and_date, get_optional_str, get_required_str, load_settings,
    parse_iso_date, HandlerErr, RecordRow,
};
use crate::ipc::types::{AppState, Request};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct TagOwner {
    student_id: String,
    name: String,
    class: String,
    active: bool,
}

fn resolve_tag(conn: &Connection, rfid_tag: &str) -> Result<Option<TagOwner>, HandlerErr> {
    conn.query_row(
        "SELECT student_id, name, class, rfid_status FROM students WHERE rfid_tag = ?",
        [rfid_tag],
        |r| {
            let status: String = r.get(3)?;
            Ok(TagOwner {
                student_id: r.get(0)?,
                name: r.get(1)?,
                class: r.get(2)?,
                active: status == "active",
            })
        },
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

/// Scanner timestamp: taken from params when the device supplies one,
/// otherwise the daemon clock. Validated before any store is touched.
fn scan_timestamp(params: &Value) -> Result<(String, String), HandlerErr> {
    let now = Local::now();
    let date = match get_optional_str(params, "date")? {
        Some(d) => {
            if parse_iso_date(&d).is_none() {
                return Err(HandlerErr::bad_params("date must be YYYY-MM-DD"));
            }
            d
        }
        None => now.format("%Y-%m-%d").to_string(),
    };
    let time = match get_optional_str(params, "time")? {
        Some(t) => {
            if classify::parse_hhmm(&t).is_none() {
                return Err(HandlerErr::bad_params("time must be HH:MM"));
            }
            t
        }
        None => now.format("%H:%M").to_string(),
    };
    Ok((date, time))
}

enum ScanOutcome {
    UnknownTag,
    CardInactive {
        student_name: String,
    },
    AlreadyScanned {
        student_name: String,
        existing: RecordRow,
    },
    Accepted {
        record: RecordRow,
        late_after: String,
        absent_after: String,
    },
}

fn submit_scan(conn: &Connection, params: &Value) -> Result<ScanOutcome, HandlerErr> {
    let rfid_tag = get_required_str(params, "rfidTag")?;
    let (date, time) = scan_timestamp(params)?;

    // Outcome order is fixed: unknown tag, then inactive card, then
    // duplicate day, then classification.
    let Some(owner) = resolve_tag(conn, &rfid_tag)? else {
        return Ok(ScanOutcome::UnknownTag);
    };
    if !owner.active {
        return Ok(ScanOutcome::CardInactive {
            student_name: owner.name,
        });
    }

    // Duplicate check and insert must not interleave with another write.
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;

    if let Some(existing) = find_record_by_student_and_date(&tx, &owner.student_id, &date)? {
        return Ok(ScanOutcome::AlreadyScanned {
            student_name: owner.name,
            existing,
        });
    }

    let (late_after, absent_after) = load_settings(&tx)?;
    let (late_m, absent_m) = match (
        classify::parse_hhmm(&late_after),
        classify::parse_hhmm(&absent_after),
    ) {
        (Some(l), Some(a)) => (l, a),
        _ => {
            return Err(HandlerErr {
                code: "settings_invalid",
                message: "stored cutoff times are not valid HH:MM".to_string(),
                details: None,
            })
        }
    };
    let scan_m = classify::parse_hhmm(&time).ok_or_else(|| HandlerErr::bad_params("time must be HH:MM"))?;
    let status = classify::classify(scan_m, late_m, absent_m);

    let record = RecordRow {
        id: Uuid::new_v4().to_string(),
        student_id: owner.student_id.clone(),
        student_name: owner.name.clone(),
        class: owner.class.clone(),
        date,
        scan_time: Some(time),
        status: status.as_str().to_string(),
        rfid_tag: Some(rfid_tag),
        corrected_by: None,
        absent_reason: None,
        teacher_note: None,
    };
    tx.execute(
        "INSERT INTO attendance_records(
            id, student_id, student_name, class, date, scan_time, status, rfid_tag
        ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &record.id,
            &record.student_id,
            &record.student_name,
            &record.class,
            &record.date,
            &record.scan_time,
            &record.status,
            &record.rfid_tag,
        ),
    )
    .map_err(|e| HandlerErr::db_update(e, "attendance_records"))?;
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(ScanOutcome::Accepted {
        record,
        late_after,
        absent_after,
    })
}

fn handle_scan_submit(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match submit_scan(conn, &req.params) {
        Ok(ScanOutcome::UnknownTag) => err(
            &req.id,
            "unknown_tag",
            "unknown RFID tag",
            Some(json!({ "led": "red", "buzzer": false })),
        ),
        Ok(ScanOutcome::CardInactive { student_name }) => err(
            &req.id,
            "card_inactive",
            "card is deactivated; contact administration",
            Some(json!({
                "studentName": student_name,
                "led": "red",
                "buzzer": false
            })),
        ),
        Ok(ScanOutcome::AlreadyScanned {
            student_name,
            existing,
        }) => ok(
            &req.id,
            json!({
                "accepted": false,
                "reason": "already_scanned",
                "studentName": student_name,
                "existingRecord": existing.to_json(),
                "led": "yellow",
                "buzzer": false
            }),
        ),
        Ok(ScanOutcome::Accepted {
            record,
            late_after,
            absent_after,
        }) => ok(
            &req.id,
            json!({
                "accepted": true,
                "record": record.to_json(),
                "status": record.status,
                "settings": {
                    "lateAfter": late_after,
                    "absentAfter": absent_after
                },
                "led": "green",
                "buzzer": true
            }),
        ),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "scan.submit" => Some(handle_scan_submit(state, req)),
        _ => None,
    }
}
