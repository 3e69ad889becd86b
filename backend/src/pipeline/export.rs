//! Write a preview set as CSV, one line per row, errors joined with `; `.

use std::io::Write;

use crate::error::{FileError, FileResult};
use crate::models::{PreviewRow, ValidationOutcome};

const HEADERS: [&str; 8] = [
    "Row",
    "Status",
    "Institution",
    "Course",
    "Session",
    "Program",
    "Semester",
    "Errors",
];

pub fn write_preview_csv<W: Write>(outcomes: &[ValidationOutcome], writer: W) -> FileResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    let export = |e: csv::Error| FileError::Export(e.to_string());

    csv.write_record(HEADERS).map_err(export)?;
    for outcome in outcomes {
        let row = PreviewRow::from(outcome);
        csv.write_record([
            row.row_number.to_string(),
            row.status,
            row.institution,
            row.course,
            row.session,
            row.program,
            row.semester,
            row.errors.join("; "),
        ])
        .map_err(export)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn preview_csv_string(outcomes: &[ValidationOutcome]) -> FileResult<String> {
    let mut buf = Vec::new();
    write_preview_csv(outcomes, &mut buf)?;
    String::from_utf8(buf).map_err(|e| FileError::Export(e.to_string()))
}
