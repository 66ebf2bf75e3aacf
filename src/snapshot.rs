use std::path::Path;

use anyhow::Context;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::models::{
    AttendanceEntry, AttendanceStatus, AttendanceTable, Batch, Snapshot, Student,
};

pub const BATCHES_KEY: &str = "batches";
pub const STUDENTS_KEY: &str = "students";
pub const ATTENDANCE_KEY: &str = "attendance";

/// Builds a snapshot from the raw stored values. A missing value is an empty
/// collection.
pub fn decode(
    batches: Option<&str>,
    students: Option<&str>,
    attendance: Option<&str>,
) -> anyhow::Result<Snapshot> {
    Ok(Snapshot {
        batches: decode_value(BATCHES_KEY, batches)?,
        students: decode_value(STUDENTS_KEY, students)?,
        attendance: decode_value(ATTENDANCE_KEY, attendance)?,
    })
}

fn decode_value<T>(key: &str, raw: Option<&str>) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    match raw {
        Some(text) if !text.trim().is_empty() && text.trim() != "null" => {
            serde_json::from_str(text).with_context(|| format!("stored `{key}` is not valid"))
        }
        _ => {
            debug!(key, "no stored value, using empty default");
            Ok(T::default())
        }
    }
}

pub fn load_file(path: &Path) -> anyhow::Result<Snapshot> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse snapshot {}", path.display()))?;
    debug!(
        batches = snapshot.batches.len(),
        students = snapshot.students.len(),
        "loaded snapshot from file"
    );
    Ok(snapshot)
}

/// Demo data: two batches, three students, one session per weekday of
/// `today`'s month up to and including `today`.
pub fn demo(today: NaiveDate) -> Snapshot {
    let batches = vec![
        Batch {
            id: "batch-morning".to_string(),
            name: "Morning Batch".to_string(),
        },
        Batch {
            id: "batch-evening".to_string(),
            name: "Evening Batch".to_string(),
        },
    ];
    let students = vec![
        demo_student("stu-avery", "Avery Lee", "101"),
        demo_student("stu-jules", "Jules Moreno", "102"),
        demo_student("stu-kiara", "Kiara Patel", "201"),
    ];
    let rosters = [
        ("batch-morning", vec!["stu-avery", "stu-jules"]),
        ("batch-evening", vec!["stu-kiara"]),
    ];

    let mut attendance = AttendanceTable::new();
    let first = today.with_day(1).unwrap_or(today);
    let sessions = first
        .iter_days()
        .take_while(|day| *day <= today)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun));

    for (session, day) in sessions.enumerate() {
        let date = day.format("%Y-%m-%d").to_string();
        for (batch_id, roster) in rosters.iter() {
            let entries = roster
                .iter()
                .enumerate()
                .map(|(seat, student_id)| AttendanceEntry {
                    student_id: student_id.to_string(),
                    status: demo_status(session, seat, student_id),
                })
                .collect();
            attendance
                .entry(batch_id.to_string())
                .or_default()
                .insert(date.clone(), entries);
        }
    }

    Snapshot {
        batches,
        students,
        attendance,
    }
}

fn demo_student(id: &str, name: &str, roll_number: &str) -> Student {
    Student {
        id: id.to_string(),
        name: name.to_string(),
        roll_number: roll_number.to_string(),
    }
}

// Jules misses often enough to show up as a defaulter.
fn demo_status(session: usize, seat: usize, student_id: &str) -> AttendanceStatus {
    if student_id == "stu-jules" {
        return match session % 3 {
            0 => AttendanceStatus::Present,
            1 => AttendanceStatus::Absent,
            _ => AttendanceStatus::Late,
        };
    }
    match (session + seat) % 10 {
        3 => AttendanceStatus::Late,
        7 => AttendanceStatus::Absent,
        _ => AttendanceStatus::Present,
    }
}
