use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .pointer("/error/code")
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn scan_terminal_outcomes_in_order() {
    let workspace = temp_dir("attendanced-scan-pipeline");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.login",
        json!({ "userId": "u1", "password": "admin123" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "studentId": "STU001",
            "name": "Alice Johnson",
            "class": "10A",
            "rfidTag": "RFID-A1B2C3"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({
            "studentId": "STU003",
            "name": "Carol White",
            "class": "10B",
            "rfidTag": "RFID-G7H8I9"
        }),
    );

    // Unknown tag rejects with red LED, no buzzer, and no record.
    let unknown = request(
        &mut stdin,
        &mut reader,
        "5",
        "scan.submit",
        json!({ "rfidTag": "RFID-NOPE", "date": "2026-03-02", "time": "07:05" }),
    );
    assert_eq!(error_code(&unknown), "unknown_tag");
    assert_eq!(
        unknown.pointer("/error/details/led").and_then(|v| v.as_str()),
        Some("red")
    );
    assert_eq!(
        unknown
            .pointer("/error/details/buzzer")
            .and_then(|v| v.as_bool()),
        Some(false)
    );

    // Inactive card rejects with the student's name and no record.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "cards.setStatus",
        json!({ "rfidTag": "RFID-G7H8I9", "action": "deactivate" }),
    );
    let inactive = request(
        &mut stdin,
        &mut reader,
        "7",
        "scan.submit",
        json!({ "rfidTag": "RFID-G7H8I9", "date": "2026-03-02", "time": "07:05" }),
    );
    assert_eq!(error_code(&inactive), "card_inactive");
    assert_eq!(
        inactive
            .pointer("/error/details/studentName")
            .and_then(|v| v.as_str()),
        Some("Carol White")
    );
    assert_eq!(
        inactive.pointer("/error/details/led").and_then(|v| v.as_str()),
        Some("red")
    );
    let after_rejects = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.list",
        json!({ "date": "2026-03-02" }),
    );
    assert_eq!(after_rejects.get("count").and_then(|v| v.as_u64()), Some(0));

    // Accepted scan: green LED, buzzer, record persisted.
    let accepted = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "scan.submit",
        json!({ "rfidTag": "RFID-A1B2C3", "date": "2026-03-02", "time": "06:55" }),
    );
    assert_eq!(accepted.get("accepted").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(accepted.get("status").and_then(|v| v.as_str()), Some("present"));
    assert_eq!(accepted.get("led").and_then(|v| v.as_str()), Some("green"));
    assert_eq!(accepted.get("buzzer").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        accepted.pointer("/record/studentId").and_then(|v| v.as_str()),
        Some("STU001")
    );
    assert_eq!(
        accepted.pointer("/record/class").and_then(|v| v.as_str()),
        Some("10A")
    );
    assert_eq!(
        accepted.pointer("/record/scanTime").and_then(|v| v.as_str()),
        Some("06:55")
    );

    // Second scan the same day is a distinguished success, not an error,
    // and returns the first record unchanged.
    let duplicate = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "scan.submit",
        json!({ "rfidTag": "RFID-A1B2C3", "date": "2026-03-02", "time": "08:15" }),
    );
    assert_eq!(
        duplicate.get("accepted").and_then(|v| v.as_bool()),
        Some(false)
    );
    assert_eq!(
        duplicate.get("reason").and_then(|v| v.as_str()),
        Some("already_scanned")
    );
    assert_eq!(duplicate.get("led").and_then(|v| v.as_str()), Some("yellow"));
    assert_eq!(
        duplicate
            .pointer("/existingRecord/scanTime")
            .and_then(|v| v.as_str()),
        Some("06:55")
    );
    assert_eq!(
        duplicate
            .pointer("/existingRecord/status")
            .and_then(|v| v.as_str()),
        Some("present")
    );

    // Still exactly one record for the student/day pair.
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.list",
        json!({ "studentId": "STU001", "date": "2026-03-02" }),
    );
    assert_eq!(listed.get("count").and_then(|v| v.as_u64()), Some(1));

    // Malformed device timestamps are rejected before any store access.
    let bad_time = request(
        &mut stdin,
        &mut reader,
        "12",
        "scan.submit",
        json!({ "rfidTag": "RFID-A1B2C3", "date": "2026-03-03", "time": "7:05" }),
    );
    assert_eq!(error_code(&bad_time), "bad_params");
    let bad_date = request(
        &mut stdin,
        &mut reader,
        "13",
        "scan.submit",
        json!({ "rfidTag": "RFID-A1B2C3", "date": "03/02/2026", "time": "07:05" }),
    );
    assert_eq!(error_code(&bad_date), "bad_params");
    let missing_tag = request(&mut stdin, &mut reader, "14", "scan.submit", json!({}));
    assert_eq!(error_code(&missing_tag), "bad_params");
}

#[test]
fn unpadded_dates_cannot_double_a_day() {
    let workspace = temp_dir("attendanced-scan-unpadded-date");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.login",
        json!({ "userId": "u1", "password": "admin123" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "studentId": "STU001",
            "name": "Alice Johnson",
            "class": "10A",
            "rfidTag": "RFID-A1B2C3"
        }),
    );
    let accepted = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "scan.submit",
        json!({ "rfidTag": "RFID-A1B2C3", "date": "2026-03-02", "time": "06:55" }),
    );
    assert_eq!(accepted.get("accepted").and_then(|v| v.as_bool()), Some(true));

    // The stored date string is the per-day key; an unpadded spelling of
    // the same day must be rejected outright, not stored as a second day.
    let unpadded = request(
        &mut stdin,
        &mut reader,
        "5",
        "scan.submit",
        json!({ "rfidTag": "RFID-A1B2C3", "date": "2026-3-2", "time": "08:15" }),
    );
    assert_eq!(error_code(&unpadded), "bad_params");
    let unpadded_mark = request(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.markAbsent",
        json!({ "studentId": "STU001", "date": "2026-3-2" }),
    );
    assert_eq!(error_code(&unpadded_mark), "bad_params");

    // Other non-canonical spellings of a calendar day fail the same way.
    for (i, date) in ["2026-03-2", "2026-3-02", "26-03-02", "2026-02-30"]
        .iter()
        .enumerate()
    {
        let bad = request(
            &mut stdin,
            &mut reader,
            &format!("7-{}", i),
            "scan.submit",
            json!({ "rfidTag": "RFID-A1B2C3", "date": date, "time": "08:15" }),
        );
        assert_eq!(error_code(&bad), "bad_params", "date {}", date);
    }

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.list",
        json!({ "studentId": "STU001" }),
    );
    assert_eq!(listed.get("count").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(
        listed.pointer("/records/0/date").and_then(|v| v.as_str()),
        Some("2026-03-02")
    );
}
