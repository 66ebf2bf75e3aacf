use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// batch id -> date (`YYYY-MM-DD`) -> entries recorded for that session.
///
/// Keys keep the order they were stored in; that order breaks ties between
/// sessions on the same date.
pub type AttendanceTable = IndexMap<String, IndexMap<String, Vec<AttendanceEntry>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    #[serde(rename = "_id", alias = "id", default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "_id", alias = "id", default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(
        rename = "rollNumber",
        alias = "roll_number",
        default,
        deserialize_with = "string_or_number"
    )]
    pub roll_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    #[serde(
        rename = "_id",
        alias = "studentId",
        default,
        deserialize_with = "string_or_number"
    )]
    pub student_id: String,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: AttendanceStatus,
}

/// Stored as its literal string. Values written by other tools that are not
/// one of the three known statuses are kept verbatim in `Other`; a missing or
/// null status is `Other("")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Other(String),
}

impl Default for AttendanceStatus {
    fn default() -> Self {
        AttendanceStatus::Other(String::new())
    }
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::Late => "LATE",
            AttendanceStatus::Other(value) => value,
        }
    }
}

impl From<String> for AttendanceStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PRESENT" => AttendanceStatus::Present,
            "ABSENT" => AttendanceStatus::Absent,
            "LATE" => AttendanceStatus::Late,
            _ => AttendanceStatus::Other(value),
        }
    }
}

impl From<AttendanceStatus> for String {
    fn from(status: AttendanceStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub batches: Vec<Batch>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub students: Vec<Student>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attendance: AttendanceTable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StudentStats {
    pub percentage: u32,
    pub presents: usize,
    pub absents: usize,
    pub lates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// `{date}_{index}`; unique within one report, used as a list key.
    pub key: String,
    pub date: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StudentReport {
    pub stats: StudentStats,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub other: BTreeMap<String, usize>,
}

impl BatchSummary {
    pub fn count(&self, status: &str) -> usize {
        match status {
            "PRESENT" => self.present,
            "ABSENT" => self.absent,
            "LATE" => self.late,
            _ => self.other.get(status).copied().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaulterEntry {
    pub student: Student,
    pub percentage: u32,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

fn lenient_status<'de, D>(deserializer: D) -> Result<AttendanceStatus, D::Error>
where
    D: Deserializer<'de>,
{
    string_or_number(deserializer).map(AttendanceStatus::from)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
