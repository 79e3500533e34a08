//! The handle generated scripts work through.
//!
//! A `Session` is opened once per script invocation: the connector resolves
//! the live workbook, the inferrer decides the header layout, and the caller
//! gets a [`TableView`] snapshot of the data region. Handles are never
//! cached across invocations.

use livesheet_config::Settings;
use livesheet_protocol::{CellRange, Extent};

use crate::connector::{normalize_path, WorkbookConnector};
use crate::error::{LiveSheetError, Result};
use crate::recorder::{ErrorRecord, ErrorRecorder};
use crate::resolver::{self, MatchMode, Resolution};
use crate::structure::{ColumnLabel, StructureConfig, TableStructure, TableStructureInferrer};
use crate::table::TableView;
use crate::workbook::{LiveWorkbook, WorkbookDirectory};

/// Structure, extent and data of one sheet at one point in time.
#[derive(Debug, Clone)]
pub struct SheetSnapshot {
    pub sheet: String,
    pub extent: Extent,
    pub structure: TableStructure,
    pub table: TableView,
}

impl SheetSnapshot {
    /// Data region below the header (empty range when there are no data rows).
    pub fn region(&self) -> CellRange {
        CellRange::new(
            self.structure.data_start_row,
            1,
            self.extent.rows,
            self.extent.cols.max(1),
        )
    }
}

/// Read `sheet` and infer its structure.
pub fn snapshot<W: LiveWorkbook + ?Sized>(
    workbook: &mut W,
    sheet: &str,
    config: Option<&StructureConfig>,
    settings: &Settings,
) -> Result<SheetSnapshot> {
    let extent = workbook
        .used_extent(sheet)?
        .ok_or_else(|| LiveSheetError::EmptySheet { sheet: sheet.to_string() })?;

    // Deep enough for the heuristics and for any explicit header rows.
    let explicit_rows = config
        .and_then(|c| c.data_start_row.or(c.header_count.map(|h| h + 1)))
        .map_or(0, |start| start.saturating_sub(1));
    let preview_rows = settings.scan_rows.max(explicit_rows).min(extent.rows);
    let preview = workbook.read_range(sheet, CellRange::new(1, 1, preview_rows, extent.cols))?;

    let structure = TableStructureInferrer::new(settings).infer(sheet, &preview, config)?;

    let data = CellRange::new(structure.data_start_row, 1, extent.rows, extent.cols);
    let cells = if data.is_empty() {
        Vec::new()
    } else {
        workbook.read_range(sheet, data)?
    };
    let table = TableView::from_cells(structure.columns.clone(), cells);

    Ok(SheetSnapshot { sheet: sheet.to_string(), extent, structure, table })
}

pub struct Session<W: LiveWorkbook> {
    file_path: String,
    workbook: W,
    sheet: String,
    region: CellRange,
    structure: TableStructure,
    /// Planner's columns of interest, in its order.
    interest: Vec<String>,
    errors: Vec<ErrorRecord>,
    settings: Settings,
}

impl<W: LiveWorkbook> Session<W> {
    /// Open the active sheet of the live workbook at `file_path`.
    pub fn open<D>(
        directory: &D,
        file_path: &str,
        config: Option<&StructureConfig>,
        settings: &Settings,
    ) -> Result<(Self, TableView)>
    where
        D: WorkbookDirectory<Handle = W>,
    {
        Self::open_sheet(directory, file_path, None, config, settings)
    }

    /// Open a named sheet, or the active one when `sheet` is `None`.
    pub fn open_sheet<D>(
        directory: &D,
        file_path: &str,
        sheet: Option<&str>,
        config: Option<&StructureConfig>,
        settings: &Settings,
    ) -> Result<(Self, TableView)>
    where
        D: WorkbookDirectory<Handle = W>,
    {
        let mut workbook = WorkbookConnector::new(directory).resolve(file_path)?;
        let info = workbook.info()?;

        let sheet = match sheet {
            Some(name) => info
                .sheets
                .iter()
                .find(|s| s.eq_ignore_ascii_case(name))
                .cloned()
                .ok_or_else(|| LiveSheetError::SheetNotFound {
                    sheet: name.to_string(),
                    available: info.sheets.clone(),
                })?,
            None => info
                .active_sheet_name()
                .map(str::to_string)
                .ok_or_else(|| LiveSheetError::Bridge(format!("workbook '{}' has no active sheet", info.title)))?,
        };

        let snap = snapshot(&mut workbook, &sheet, config, settings)?;
        log::info!(
            "opened '{}' sheet '{}': {} data row(s), {} column(s)",
            info.title,
            sheet,
            snap.table.len(),
            snap.structure.columns.len()
        );

        let session = Self {
            file_path: normalize_path(file_path),
            workbook,
            region: snap.region(),
            sheet,
            structure: snap.structure,
            interest: config.map(|c| c.columns_of_interest.clone()).unwrap_or_default(),
            errors: Vec::new(),
            settings: settings.clone(),
        };
        Ok((session, snap.table))
    }

    /// Normalized path the session was opened with.
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn workbook(&mut self) -> &mut W {
        &mut self.workbook
    }

    pub fn header_count(&self) -> usize {
        self.structure.header_count
    }

    /// First physical data row (1-based). Every write target is computed from it.
    pub fn start_row(&self) -> usize {
        self.structure.data_start_row
    }

    pub fn structure(&self) -> &TableStructure {
        &self.structure
    }

    pub fn columns(&self) -> &[ColumnLabel] {
        &self.structure.columns
    }

    /// Region currently holding the table's data.
    pub fn region(&self) -> CellRange {
        self.region
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub(crate) fn push_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    pub(crate) fn set_region(&mut self, region: CellRange) {
        self.region = region;
    }

    /// Extend the tracked region to cover `end_row` / `end_col`.
    pub(crate) fn grow_region(&mut self, end_row: usize, end_col: usize) {
        let start = self.start_row();
        let current = self.region;
        self.region = if current.is_empty() {
            CellRange::new(start, 1, end_row, end_col)
        } else {
            CellRange::new(
                current.start_row,
                current.start_col,
                current.end_row.max(end_row),
                current.end_col.max(end_col),
            )
        };
    }

    /// Label of a physical column, or its placeholder.
    pub fn label_of(&self, col: usize) -> String {
        self.columns()
            .iter()
            .find(|c| c.index == col)
            .map(|c| c.label.clone())
            .unwrap_or_else(|| ColumnLabel::placeholder(col).label)
    }

    pub fn resolve(&self, name: &str, mode: MatchMode) -> Resolution {
        resolver::resolve(name, self.columns(), mode)
    }

    /// Candidates for each of the planner's columns of interest.
    pub fn columns_of_interest(&self) -> Vec<(String, Resolution)> {
        resolver::resolve_all(&self.interest, self.columns(), MatchMode::default())
    }

    /// A single column for a mutating flow; ambiguity is an error.
    pub fn require_column(&self, name: &str, mode: MatchMode) -> Result<ColumnLabel> {
        resolver::require_unique(name, self.columns(), mode)
    }

    /// Re-read the data region with the current structure.
    pub fn reload(&mut self) -> Result<TableView> {
        let config = StructureConfig {
            header_count: Some(self.structure.header_count),
            data_start_row: Some(self.structure.data_start_row),
            ..Default::default()
        };
        let snap = snapshot(&mut self.workbook, &self.sheet, Some(&config), &self.settings)?;
        self.region = snap.region();
        Ok(snap.table)
    }

    /// Record a failure against this session. Never fails.
    pub fn record_error(&mut self, operation: &str, message: &str) -> ErrorRecord {
        ErrorRecorder::record(self, operation, message)
    }

    /// Run `f`; an error is recorded and then returned unchanged.
    pub fn guarded<T>(&mut self, operation: &str, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.record_error(operation, &err.to_string());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDirectory, MemoryWorkbook};
    use livesheet_protocol::CellValue;

    fn directory(book: &MemoryWorkbook) -> MemoryDirectory {
        MemoryDirectory::new().with_instance(1, vec![book.clone()])
    }

    #[test]
    fn open_reads_active_sheet() {
        let book = MemoryWorkbook::new("scores.xlsx", Some("/data/scores.xlsx"))
            .with_grid("Data", &[&["Name", "Score"], &["A", "90"], &["B", "80"]]);
        let (session, table) = Session::open(&directory(&book), "/data/Scores.xlsx", None, &Settings::default()).unwrap();

        assert_eq!(session.sheet(), "Data");
        assert_eq!(session.start_row(), 2);
        assert_eq!(session.region(), CellRange::new(2, 1, 3, 2));
        assert_eq!(session.file_path(), "/data/scores.xlsx");
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].get(2), &CellValue::Number(80.0));
    }

    #[test]
    fn open_named_sheet() {
        let book = MemoryWorkbook::new("b.xlsx", None)
            .with_grid("First", &[&["x"]])
            .with_grid("Second", &[&["Dept"], &["Eng"]]);
        let dir = directory(&book);
        let (session, _) = Session::open_sheet(&dir, "b.xlsx", Some("second"), None, &Settings::default()).unwrap();
        assert_eq!(session.sheet(), "Second");

        let err = Session::open_sheet(&dir, "b.xlsx", Some("Third"), None, &Settings::default()).err().unwrap();
        assert_eq!(err.code(), "sheet_not_found");
    }

    #[test]
    fn empty_sheet_fails() {
        let book = MemoryWorkbook::new("e.xlsx", None).with_sheet("Blank", vec![]);
        let err = Session::open(&directory(&book), "e.xlsx", None, &Settings::default()).err().unwrap();
        assert!(matches!(err, LiveSheetError::EmptySheet { .. }));
    }

    #[test]
    fn header_only_sheet_has_empty_region() {
        let book = MemoryWorkbook::new("h.xlsx", None).with_grid("S", &[&["Name", "Score"]]);
        let (session, table) = Session::open(&directory(&book), "h.xlsx", None, &Settings::default()).unwrap();
        assert!(table.is_empty());
        assert!(session.region().is_empty());
    }

    #[test]
    fn columns_of_interest_resolve_against_the_header() {
        let book = MemoryWorkbook::new("c.xlsx", None)
            .with_grid("S", &[&["Name", "Score"], &["A", "90"]]);
        let config = StructureConfig {
            columns_of_interest: vec!["Score".into(), "Bonus".into()],
            ..Default::default()
        };
        let (session, _) = Session::open(&directory(&book), "c.xlsx", Some(&config), &Settings::default()).unwrap();

        let interest = session.columns_of_interest();
        assert_eq!(interest.len(), 2);
        assert_eq!(interest[0], ("Score".to_string(), Resolution::Found(ColumnLabel::new(2, "Score"))));
        assert_eq!(interest[1], ("Bonus".to_string(), Resolution::NotFound));

        let (plain, _) = Session::open(&directory(&book), "c.xlsx", None, &Settings::default()).unwrap();
        assert!(plain.columns_of_interest().is_empty());
    }

    #[test]
    fn guarded_records_and_returns_the_error() {
        let book = MemoryWorkbook::new("g.xlsx", None).with_grid("S", &[&["Name"], &["A"]]);
        let (mut session, _) = Session::open(&directory(&book), "g.xlsx", None, &Settings::default()).unwrap();

        let err = session
            .guarded("write", |s| s.require_column("Score", MatchMode::Suffix))
            .unwrap_err();
        assert_eq!(err.code(), "column_not_found");
        assert_eq!(session.errors().len(), 1);
        assert_eq!(session.errors()[0].operation, "write");
        assert!(book.sheet_names().iter().any(|n| n.starts_with("Error_")));
    }
}
