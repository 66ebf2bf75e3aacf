use std::fmt::Write;

use serde::Serialize;

use crate::insights::{self, DefaulterOrder};
use crate::models::{Batch, BatchSummary, DefaulterEntry, Snapshot, Student, StudentReport};

pub const RECENT_SESSIONS: usize = 6;

/// Filters for one combined report.
#[derive(Debug, Clone)]
pub struct ReportScope<'a> {
    pub student: Option<&'a Student>,
    pub batch: Option<&'a Batch>,
    pub date: &'a str,
    pub month: u32,
    pub year: &'a str,
    pub threshold: f64,
    pub order: DefaulterOrder,
}

pub fn write_student_section(
    output: &mut String,
    student: &Student,
    report: &StudentReport,
    limit: usize,
) {
    let _ = writeln!(output, "## Student Overview: {}", student_label(student));

    if report.history.is_empty() {
        let _ = writeln!(output, "No attendance history.");
        return;
    }

    let stats = &report.stats;
    let _ = writeln!(
        output,
        "Attendance {}% ({} present, {} absent, {} late)",
        stats.percentage, stats.presents, stats.absents, stats.lates
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "### Recent Sessions");
    for entry in report.history.iter().take(limit) {
        let _ = writeln!(output, "- {}: {}", entry.date, entry.status);
    }
}

pub fn write_batch_section(
    output: &mut String,
    batch_name: &str,
    date: &str,
    summary: Option<&BatchSummary>,
) {
    let _ = writeln!(output, "## Batch Snapshot: {} on {}", batch_name, date);

    let Some(summary) = summary else {
        let _ = writeln!(output, "No records.");
        return;
    };

    for (label, status) in [("Present", "PRESENT"), ("Absent", "ABSENT"), ("Late", "LATE")] {
        let _ = writeln!(output, "- {}: {}", label, summary.count(status));
    }
    for (status, count) in summary.other.iter() {
        let _ = writeln!(output, "- {}: {}", status, count);
    }
}

pub fn write_defaulter_section(
    output: &mut String,
    month: u32,
    year: &str,
    threshold: f64,
    entries: &[DefaulterEntry],
) {
    let _ = writeln!(
        output,
        "## Defaulter Radar: {} below {}%",
        insights::month_prefix(month, year),
        threshold
    );

    if entries.is_empty() {
        let _ = writeln!(output, "All students above threshold.");
        return;
    }

    for entry in entries {
        let _ = writeln!(
            output,
            "- {} (#{}) {}%",
            entry.student.name, entry.student.roll_number, entry.percentage
        );
    }
}

pub fn build_report(snapshot: &Snapshot, scope: &ReportScope<'_>) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Attendance Insights");
    let _ = writeln!(
        output,
        "{} batches, {} students on record",
        snapshot.batches.len(),
        snapshot.students.len()
    );

    let _ = writeln!(output);
    match scope.student {
        Some(student) => {
            let report = insights::student_report(&snapshot.attendance, &student.id);
            write_student_section(&mut output, student, &report, RECENT_SESSIONS);
        }
        None => {
            let _ = writeln!(output, "## Student Overview");
            let _ = writeln!(output, "No students on record.");
        }
    }

    let _ = writeln!(output);
    match scope.batch {
        Some(batch) => {
            let summary = insights::batch_summary(&snapshot.attendance, &batch.id, scope.date);
            write_batch_section(&mut output, &batch.name, scope.date, summary.as_ref());
        }
        None => {
            let _ = writeln!(output, "## Batch Snapshot");
            let _ = writeln!(output, "No batches on record.");
        }
    }

    let mut flagged = insights::defaulters(
        &snapshot.attendance,
        &snapshot.students,
        scope.month,
        scope.year,
        scope.threshold,
    );
    insights::sort_defaulters(&mut flagged, scope.order);
    let _ = writeln!(output);
    write_defaulter_section(
        &mut output,
        scope.month,
        scope.year,
        scope.threshold,
        &flagged,
    );

    output
}

#[derive(Serialize)]
struct DefaulterRow<'a> {
    student_id: &'a str,
    name: &'a str,
    roll_number: &'a str,
    percentage: u32,
}

pub fn write_defaulters_csv<W: std::io::Write>(
    writer: W,
    entries: &[DefaulterEntry],
) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for entry in entries {
        csv.serialize(DefaulterRow {
            student_id: &entry.student.id,
            name: &entry.student.name,
            roll_number: &entry.student.roll_number,
            percentage: entry.percentage,
        })?;
    }
    csv.flush()?;
    Ok(())
}

fn student_label(student: &Student) -> String {
    if student.roll_number.is_empty() {
        student.name.clone()
    } else {
        format!("{} (#{})", student.name, student.roll_number)
    }
}
