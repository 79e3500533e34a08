//! Failure diagnostics an external retry loop can find in the workbook.

use std::fmt;

use chrono::{DateTime, Utc};
use livesheet_protocol::{Op, Rgb};
use serde::Serialize;

use crate::report::sheet_name;
use crate::session::Session;
use crate::workbook::LiveWorkbook;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    /// Failure token a polling orchestrator looks for.
    pub marker: String,
}

impl ErrorRecord {
    pub fn new(marker: &str, operation: &str, message: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            message: message.to_string(),
            timestamp,
            operation: operation.to_string(),
            marker: marker.to_string(),
        }
    }

    /// First cell of the diagnostic sheet.
    pub fn trace_line(&self) -> String {
        format!("{} Trace: {}", self.marker, self.message)
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.marker, self.operation, self.message)
    }
}

pub struct ErrorRecorder;

impl ErrorRecorder {
    /// Record a failure on `session` and, when enabled, write it into a new
    /// diagnostic sheet. Never fails: a broken workbook only costs the sheet.
    pub fn record<W: LiveWorkbook>(session: &mut Session<W>, operation: &str, message: &str) -> ErrorRecord {
        Self::record_at(session, operation, message, Utc::now())
    }

    pub fn record_at<W: LiveWorkbook>(
        session: &mut Session<W>,
        operation: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> ErrorRecord {
        let settings = session.settings();
        let record = ErrorRecord::new(&settings.failure_marker, operation, message, now);
        log::error!("{record}");

        if settings.materialize_errors {
            let prefix = settings.error_sheet_prefix.clone();
            if let Err(e) = Self::materialize(session, &prefix, &record) {
                log::warn!("could not write diagnostic sheet: {e}");
            }
        }

        session.push_error(record.clone());
        record
    }

    /// For failures before any session exists (e.g. the workbook was not found).
    pub fn detached(marker: &str, operation: &str, message: &str) -> ErrorRecord {
        let record = ErrorRecord::new(marker, operation, message, Utc::now());
        log::error!("{record}");
        record
    }

    fn materialize<W: LiveWorkbook>(
        session: &mut Session<W>,
        prefix: &str,
        record: &ErrorRecord,
    ) -> crate::Result<String> {
        let existing = session.workbook().info()?.sheets;
        let base = sheet_name(prefix, &record.timestamp.format("%Y%m%d_%H%M%S").to_string());
        let mut name = base.clone();
        let mut n = 2;
        while existing.iter().any(|s| s.eq_ignore_ascii_case(&name)) {
            name = sheet_name(prefix, &format!("{}_{n}", record.timestamp.format("%Y%m%d_%H%M%S")));
            n += 1;
        }

        let ops = vec![
            Op::AddSheet { name: name.clone() },
            Op::SetCellValue { sheet: name.clone(), row: 1, col: 1, value: record.trace_line().into() },
            Op::SetFontColor { sheet: name.clone(), row: 1, col: 1, color: Rgb::RED },
            Op::SetCellValue {
                sheet: name.clone(),
                row: 2,
                col: 1,
                value: format!("Operation: {}", record.operation).into(),
            },
            Op::SetCellValue {
                sheet: name.clone(),
                row: 3,
                col: 1,
                value: format!("Time: {}", record.timestamp.to_rfc3339()).into(),
            },
        ];
        session.workbook().apply(ops)?;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDirectory, MemoryWorkbook};
    use chrono::TimeZone;
    use livesheet_config::Settings;
    use livesheet_protocol::CellValue;

    fn open(book: &MemoryWorkbook, settings: &Settings) -> Session<MemoryWorkbook> {
        let dir = MemoryDirectory::new().with_instance(1, vec![book.clone()]);
        Session::open(&dir, "book.xlsx", None, settings).unwrap().0
    }

    fn book() -> MemoryWorkbook {
        MemoryWorkbook::new("book.xlsx", None).with_grid("Data", &[&["Name"], &["A"]])
    }

    #[test]
    fn writes_marked_red_trace() {
        let book = book();
        let mut session = open(&book, &Settings::default());
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 3, 2, 1).unwrap();

        let record = ErrorRecorder::record_at(&mut session, "write_column", "column 'Score' not found", now);

        assert_eq!(record.to_string(), "[LIVESHEET-FAILURE] write_column: column 'Score' not found");
        let sheet = "Error_20260504_030201";
        assert_eq!(book.sheet_names(), vec!["Data", sheet]);
        assert_eq!(
            book.cell(sheet, 1, 1),
            CellValue::Text("[LIVESHEET-FAILURE] Trace: column 'Score' not found".into())
        );
        assert_eq!(book.font_color(sheet, 1, 1), Some(Rgb::RED));
        assert_eq!(book.cell(sheet, 2, 1), CellValue::Text("Operation: write_column".into()));
        assert_eq!(session.errors(), &[record]);
    }

    #[test]
    fn same_second_gets_a_distinct_sheet() {
        let book = book();
        let mut session = open(&book, &Settings::default());
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 3, 2, 1).unwrap();
        ErrorRecorder::record_at(&mut session, "a", "first", now);
        ErrorRecorder::record_at(&mut session, "b", "second", now);
        assert_eq!(book.sheet_names().len(), 3);
        assert_eq!(session.errors().len(), 2);
    }

    #[test]
    fn broken_workbook_still_records() {
        let book = book();
        let mut session = open(&book, &Settings::default());
        book.fail_next_apply("host went away");

        let record = session.record_error("publish", "boom");
        assert_eq!(record.message, "boom");
        assert_eq!(book.sheet_names(), vec!["Data"]);
        assert_eq!(session.errors().len(), 1);
    }

    #[test]
    fn materializing_can_be_disabled() {
        let book = book();
        let settings = Settings { materialize_errors: false, ..Settings::default() };
        let mut session = open(&book, &settings);
        session.record_error("x", "y");
        assert_eq!(book.sheet_names(), vec!["Data"]);
    }

    #[test]
    fn detached_carries_the_marker() {
        let record = ErrorRecorder::detached("[FAIL]", "open", "not open");
        assert!(record.to_string().starts_with("[FAIL] open"));
    }
}
