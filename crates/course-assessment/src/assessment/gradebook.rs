//! CSV export of course standings.

use std::io::Write;

use serde::Serialize;

use super::certificates::CourseStanding;

#[derive(Debug, Serialize)]
struct GradebookRow<'a> {
    learner_id: &'a str,
    status: &'static str,
    progress: u8,
    quizzes_completed: usize,
    average_quiz_score: String,
    assignments_graded: usize,
    average_assignment_score: String,
    final_score: String,
    grade: &'a str,
    total_hours: String,
}

impl<'a> From<&'a CourseStanding> for GradebookRow<'a> {
    fn from(standing: &'a CourseStanding) -> Self {
        Self {
            learner_id: standing.learner_id.as_str(),
            status: standing.status.label(),
            progress: standing.progress,
            quizzes_completed: standing.quizzes_completed,
            average_quiz_score: format!("{:.2}", standing.average_quiz_score),
            assignments_graded: standing.assignments_graded,
            average_assignment_score: format!("{:.2}", standing.average_assignment_score),
            final_score: format!("{:.2}", standing.final_score),
            grade: &standing.grade,
            total_hours: format!("{:.2}", standing.total_hours),
        }
    }
}

/// Writes a header row followed by one row per standing.
pub fn write_csv<W: Write>(writer: W, standings: &[CourseStanding]) -> Result<(), csv::Error> {
    let mut csv = csv::Writer::from_writer(writer);
    for standing in standings {
        csv.serialize(GradebookRow::from(standing))?;
    }
    if standings.is_empty() {
        csv.write_record([
            "learner_id",
            "status",
            "progress",
            "quizzes_completed",
            "average_quiz_score",
            "assignments_graded",
            "average_assignment_score",
            "final_score",
            "grade",
            "total_hours",
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Convenience wrapper returning the CSV as a string.
pub fn to_csv_string(standings: &[CourseStanding]) -> Result<String, csv::Error> {
    let mut buffer = Vec::new();
    write_csv(&mut buffer, standings)?;
    String::from_utf8(buffer).map_err(|err| csv::Error::from(std::io::Error::other(err)))
}
