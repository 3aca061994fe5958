//! Scan-time classification against the configurable cutoff pair.
//!
//! Times of day are "HH:MM" (24-hour) and compare as minutes since midnight.
//! The cutoffs are strict: a scan exactly at `late_after` is still present,
//! exactly at `absent_after` is still late.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Present,
    Late,
    Absent,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Present => "present",
            Status::Late => "late",
            Status::Absent => "absent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Status::Present),
            "late" => Some(Status::Late),
            "absent" => Some(Status::Absent),
            _ => None,
        }
    }
}

/// Parse a strict "HH:MM" time of day into minutes since midnight.
/// Exactly two digits, a colon, two digits; hour < 24, minute < 60.
pub fn parse_hhmm(s: &str) -> Option<u32> {
    let b = s.as_bytes();
    if b.len() != 5 || b[2] != b':' {
        return None;
    }
    if !(b[0].is_ascii_digit()
        && b[1].is_ascii_digit()
        && b[3].is_ascii_digit()
        && b[4].is_ascii_digit())
    {
        return None;
    }
    let hour = (b[0] - b'0') as u32 * 10 + (b[1] - b'0') as u32;
    let minute = (b[3] - b'0') as u32 * 10 + (b[4] - b'0') as u32;
    if hour >= 24 || minute >= 60 {
        return None;
    }
    Some(hour * 60 + minute)
}

/// Classify a scan time against the cutoffs, all in minutes since midnight.
/// Callers guarantee `late_after < absent_after`.
pub fn classify(scan: u32, late_after: u32, absent_after: u32) -> Status {
    if scan > absent_after {
        Status::Absent
    } else if scan > late_after {
        Status::Late
    } else {
        Status::Present
    }
}
