use rusqlite::Connection;
use std::path::Path;

pub const DEFAULT_LATE_AFTER: &str = "07:00";
pub const DEFAULT_ABSENT_AFTER: &str = "12:30";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("attendance.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            class TEXT NOT NULL,
            rfid_tag TEXT NOT NULL UNIQUE,
            rfid_status TEXT NOT NULL,
            parent_name TEXT,
            parent_email TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class)",
        [],
    )?;

    // Singleton row; cutoffs default to the stock school-day thresholds.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_settings(
            id INTEGER PRIMARY KEY CHECK(id = 1),
            late_after TEXT NOT NULL,
            absent_after TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO attendance_settings(id, late_after, absent_after)
         VALUES(1, ?, ?)",
        (DEFAULT_LATE_AFTER, DEFAULT_ABSENT_AFTER),
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            class TEXT NOT NULL,
            date TEXT NOT NULL,
            scan_time TEXT,
            status TEXT NOT NULL,
            rfid_tag TEXT,
            corrected_by TEXT,
            UNIQUE(student_id, date),
            FOREIGN KEY(student_id) REFERENCES students(student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_date ON attendance_records(date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_class ON attendance_records(class)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_student ON attendance_records(student_id)",
        [],
    )?;

    // Early workspaces predate the parent/teacher annotation fields.
    ensure_record_annotations(&conn)?;

    Ok(conn)
}

fn ensure_record_annotations(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "attendance_records", "absent_reason")? {
        conn.execute(
            "ALTER TABLE attendance_records ADD COLUMN absent_reason TEXT",
            [],
        )?;
    }
    if !table_has_column(conn, "attendance_records", "teacher_note")? {
        conn.execute(
            "ALTER TABLE attendance_records ADD COLUMN teacher_note TEXT",
            [],
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
