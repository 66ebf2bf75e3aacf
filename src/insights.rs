use clap::ValueEnum;

use crate::models::{
    AttendanceStatus, AttendanceTable, BatchSummary, DefaulterEntry, HistoryEntry, Student,
    StudentReport, StudentStats,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DefaulterOrder {
    /// Keep the order of the student roster.
    #[default]
    Roster,
    /// Lowest attendance first.
    Ascending,
}

pub fn student_report(attendance: &AttendanceTable, student_id: &str) -> StudentReport {
    let mut stats = StudentStats::default();
    let mut history = Vec::new();

    for days in attendance.values() {
        for (date, entries) in days {
            for entry in entries.iter().filter(|e| e.student_id == student_id) {
                match entry.status {
                    AttendanceStatus::Present => stats.presents += 1,
                    AttendanceStatus::Absent => stats.absents += 1,
                    AttendanceStatus::Late => stats.lates += 1,
                    AttendanceStatus::Other(_) => {}
                }
                history.push(HistoryEntry {
                    key: format!("{}_{}", date, history.len()),
                    date: date.clone(),
                    status: entry.status.clone(),
                });
            }
        }
    }

    stats.percentage = percentage(stats.presents, stats.presents + stats.absents + stats.lates);
    // sort_by is stable, so equal dates keep encounter order.
    history.sort_by(|a, b| b.date.cmp(&a.date));

    StudentReport { stats, history }
}

/// `None` when nothing was recorded for the batch on that exact date.
pub fn batch_summary(
    attendance: &AttendanceTable,
    batch_id: &str,
    date: &str,
) -> Option<BatchSummary> {
    let entries = attendance.get(batch_id)?.get(date)?;
    let mut summary = BatchSummary::default();

    for entry in entries {
        match &entry.status {
            AttendanceStatus::Present => summary.present += 1,
            AttendanceStatus::Absent => summary.absent += 1,
            AttendanceStatus::Late => summary.late += 1,
            AttendanceStatus::Other(status) => {
                *summary.other.entry(status.clone()).or_insert(0) += 1;
            }
        }
    }

    Some(summary)
}

/// Students whose present ratio for `year`-`month` is below `threshold`.
///
/// Students without any entry in the month are skipped. The threshold is
/// compared as given; a NaN threshold matches nobody.
pub fn defaulters(
    attendance: &AttendanceTable,
    students: &[Student],
    month: u32,
    year: &str,
    threshold: f64,
) -> Vec<DefaulterEntry> {
    let prefix = month_prefix(month, year);
    let mut result = Vec::new();

    for student in students {
        let mut presents = 0usize;
        let mut total = 0usize;

        for days in attendance.values() {
            for (_, entries) in days.iter().filter(|(date, _)| date.starts_with(&prefix)) {
                for entry in entries.iter().filter(|e| e.student_id == student.id) {
                    total += 1;
                    if entry.status == AttendanceStatus::Present {
                        presents += 1;
                    }
                }
            }
        }

        if total == 0 {
            continue;
        }

        let pct = percentage(presents, total);
        if f64::from(pct) < threshold {
            result.push(DefaulterEntry {
                student: student.clone(),
                percentage: pct,
            });
        }
    }

    result
}

pub fn sort_defaulters(entries: &mut [DefaulterEntry], order: DefaulterOrder) {
    match order {
        DefaulterOrder::Roster => {}
        DefaulterOrder::Ascending => entries.sort_by_key(|entry| entry.percentage),
    }
}

pub fn month_prefix(month: u32, year: &str) -> String {
    format!("{}-{:02}", year, month)
}

pub fn percentage(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (part as f64 / total as f64 * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttendanceEntry;
    use serde_json::json;

    fn table(value: serde_json::Value) -> AttendanceTable {
        serde_json::from_value(value).unwrap()
    }

    fn student(id: &str, name: &str) -> Student {
        Student {
            id: id.to_string(),
            name: name.to_string(),
            roll_number: String::new(),
        }
    }

    fn sample() -> AttendanceTable {
        table(json!({
            "b1": {
                "2024-03-01": [
                    {"_id": "1", "status": "PRESENT"},
                    {"_id": "2", "status": "ABSENT"}
                ],
                "2024-03-04": [
                    {"_id": "1", "status": "ABSENT"},
                    {"_id": "2", "status": "PRESENT"}
                ],
                "2024-02-28": [
                    {"_id": "1", "status": "LATE"}
                ]
            },
            "b2": {
                "2024-03-04": [
                    {"_id": "1", "status": "PRESENT"}
                ],
                "2024-03-05": [
                    {"_id": "1", "status": "ABSENT"},
                    {"_id": "ghost", "status": "PRESENT"}
                ]
            }
        }))
    }

    #[test]
    fn unmatched_student_yields_empty_report() {
        let report = student_report(&sample(), "nobody");
        assert_eq!(report, StudentReport::default());
        assert_eq!(student_report(&sample(), ""), StudentReport::default());
        assert_eq!(student_report(&AttendanceTable::new(), "1"), StudentReport::default());
    }

    #[test]
    fn student_report_tallies_across_batches() {
        let report = student_report(&sample(), "1");
        assert_eq!(report.stats.presents, 2);
        assert_eq!(report.stats.absents, 2);
        assert_eq!(report.stats.lates, 1);
        assert_eq!(report.stats.percentage, 40);
        assert_eq!(report.history.len(), 5);
    }

    #[test]
    fn history_is_newest_first_and_stable_on_ties() {
        let report = student_report(&sample(), "1");
        let dates: Vec<&str> = report.history.iter().map(|h| h.date.as_str()).collect();
        assert_eq!(
            dates,
            ["2024-03-05", "2024-03-04", "2024-03-04", "2024-03-01", "2024-02-28"]
        );
        // b1 is encountered before b2 on 2024-03-04.
        assert_eq!(report.history[1].status, AttendanceStatus::Absent);
        assert_eq!(report.history[2].status, AttendanceStatus::Present);

        let mut keys: Vec<&str> = report.history.iter().map(|h| h.key.as_str()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), report.history.len());
    }

    #[test]
    fn same_date_ties_follow_stored_batch_order() {
        let attendance = table(json!({
            "b2": {"2024-03-01": [{"_id": "x", "status": "PRESENT"}]},
            "b1": {"2024-03-01": [{"_id": "x", "status": "ABSENT"}]}
        }));
        let report = student_report(&attendance, "x");
        let statuses: Vec<&str> = report.history.iter().map(|h| h.status.as_str()).collect();
        assert_eq!(statuses, ["PRESENT", "ABSENT"]);
    }

    #[test]
    fn unknown_statuses_stay_in_history_but_not_in_totals() {
        let attendance = table(json!({
            "b1": {
                "2024-03-01": [{"_id": "1", "status": "EXCUSED"}],
                "2024-03-02": [{"_id": "1", "status": "PRESENT"}]
            }
        }));
        let report = student_report(&attendance, "1");
        assert_eq!(report.stats.presents + report.stats.absents + report.stats.lates, 1);
        assert_eq!(report.stats.percentage, 100);
        assert_eq!(report.history.len(), 2);
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(0, 0), 0);
    }

    #[test]
    fn batch_summary_counts_statuses() {
        let attendance = table(json!({
            "b1": {
                "2024-03-01": [
                    {"_id": "1", "status": "PRESENT"},
                    {"_id": "2", "status": "PRESENT"},
                    {"_id": "3", "status": "ABSENT"}
                ]
            }
        }));
        let summary = batch_summary(&attendance, "b1", "2024-03-01").unwrap();
        assert_eq!((summary.present, summary.absent, summary.late), (2, 1, 0));
        assert!(summary.other.is_empty());
    }

    #[test]
    fn batch_summary_is_none_without_record() {
        let attendance = sample();
        assert!(batch_summary(&attendance, "b9", "2024-03-01").is_none());
        assert!(batch_summary(&attendance, "b1", "2024-03-02").is_none());
        assert!(batch_summary(&attendance, "b1", "2024-3-1").is_none());
    }

    #[test]
    fn batch_summary_with_empty_day_is_a_zero_record() {
        let attendance = table(json!({"b1": {"2024-03-01": []}}));
        assert_eq!(
            batch_summary(&attendance, "b1", "2024-03-01"),
            Some(BatchSummary::default())
        );
    }

    #[test]
    fn batch_summary_keeps_unknown_statuses() {
        let attendance = table(json!({
            "b1": {"2024-03-01": [{"_id": "1", "status": "EXCUSED"}, {"_id": "2", "status": "LATE"}]}
        }));
        let summary = batch_summary(&attendance, "b1", "2024-03-01").unwrap();
        assert_eq!(summary.late, 1);
        assert_eq!(summary.count("EXCUSED"), 1);
    }

    #[test]
    fn defaulters_match_threshold() {
        let attendance = table(json!({
            "b1": {
                "2024-03-01": [{"_id": "1", "status": "PRESENT"}],
                "2024-03-02": [{"_id": "1", "status": "PRESENT"}],
                "2024-03-03": [{"_id": "1", "status": "ABSENT"}],
                "2024-03-04": [{"_id": "1", "status": "ABSENT"}],
                "2024-04-01": [{"_id": "1", "status": "ABSENT"}]
            }
        }));
        let students = vec![student("1", "A")];

        let flagged = defaulters(&attendance, &students, 3, "2024", 75.0);
        assert_eq!(
            flagged,
            vec![DefaulterEntry {
                student: students[0].clone(),
                percentage: 50
            }]
        );
        assert!(defaulters(&attendance, &students, 3, "2024", 40.0).is_empty());
    }

    #[test]
    fn defaulters_skip_students_without_entries() {
        let students = vec![student("1", "A"), student("absent", "B")];
        let flagged = defaulters(&sample(), &students, 3, "2024", 1000.0);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].student.id, "1");

        assert!(defaulters(&sample(), &students, 13, "2024", 1000.0).is_empty());
        assert!(defaulters(&sample(), &students, 3, "24", 1000.0).is_empty());
        assert!(defaulters(&sample(), &students, 3, "2024", f64::NAN).is_empty());
    }

    #[test]
    fn defaulters_follow_roster_order_unless_sorted() {
        let attendance = table(json!({
            "b1": {
                "2024-03-01": [
                    {"_id": "1", "status": "PRESENT"},
                    {"_id": "2", "status": "ABSENT"},
                    {"_id": "3", "status": "LATE"}
                ],
                "2024-03-02": [
                    {"_id": "1", "status": "ABSENT"},
                    {"_id": "2", "status": "ABSENT"},
                    {"_id": "3", "status": "PRESENT"}
                ]
            }
        }));
        let students = vec![student("1", "A"), student("2", "B"), student("3", "C")];

        let mut flagged = defaulters(&attendance, &students, 3, "2024", 75.0);
        let ids: Vec<&str> = flagged.iter().map(|d| d.student.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);

        sort_defaulters(&mut flagged, DefaulterOrder::Ascending);
        let ids: Vec<&str> = flagged.iter().map(|d| d.student.id.as_str()).collect();
        assert_eq!(ids, ["2", "1", "3"]);
    }

    #[test]
    fn late_counts_toward_total_but_not_presents() {
        let attendance: AttendanceTable = [(
            "b1".to_string(),
            [(
                "2024-03-01".to_string(),
                vec![
                    AttendanceEntry {
                        student_id: "1".to_string(),
                        status: AttendanceStatus::Late,
                    },
                    AttendanceEntry {
                        student_id: "1".to_string(),
                        status: AttendanceStatus::Present,
                    },
                ],
            )]
            .into_iter()
            .collect(),
        )]
        .into_iter()
        .collect();
        let flagged = defaulters(&attendance, &[student("1", "A")], 3, "2024", 75.0);
        assert_eq!(flagged[0].percentage, 50);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let attendance = sample();
        let students = vec![student("1", "A"), student("2", "B")];
        assert_eq!(student_report(&attendance, "1"), student_report(&attendance, "1"));
        assert_eq!(
            batch_summary(&attendance, "b1", "2024-03-01"),
            batch_summary(&attendance, "b1", "2024-03-01")
        );
        assert_eq!(
            defaulters(&attendance, &students, 3, "2024", 75.0),
            defaulters(&attendance, &students, 3, "2024", 75.0)
        );
    }
}
