//! Capabilities the session layer needs from a live spreadsheet application.
//!
//! The application's own bookkeeping of open workbooks is an external,
//! process-wide resource. It is only ever queried through
//! [`WorkbookDirectory`], so tests can swap in [`crate::memory`] and the
//! runtime can use [`crate::remote`].

use livesheet_protocol::{CellInfo, CellRange, Extent, Op, WorkbookInfo};

use crate::error::Result;

/// A workbook held open by a running application.
///
/// Handles are borrowed views: the application owns the workbook's
/// lifetime and the user may close it between two calls.
pub trait LiveWorkbook {
    fn info(&mut self) -> Result<WorkbookInfo>;

    /// Last used row and column (1-based), `None` for an empty sheet.
    fn used_extent(&mut self, sheet: &str) -> Result<Option<Extent>>;

    /// Values and fills for an inclusive 1-based range, row-major.
    fn read_range(&mut self, sheet: &str, range: CellRange) -> Result<Vec<Vec<CellInfo>>>;

    /// Apply one batch of operations. Either every op lands or none does.
    fn apply(&mut self, ops: Vec<Op>) -> Result<()>;
}

/// An open workbook as listed by its application.
#[derive(Debug, Clone)]
pub struct OpenWorkbook<H> {
    /// Display name (usually the file name).
    pub name: String,
    /// Full path, `None` for workbooks that were never saved.
    pub full_path: Option<String>,
    pub handle: H,
}

/// One running application process and its open workbooks.
#[derive(Debug, Clone)]
pub struct AppInstance<H> {
    pub pid: u32,
    pub workbooks: Vec<OpenWorkbook<H>>,
}

pub trait WorkbookDirectory {
    type Handle: LiveWorkbook;

    /// Workbooks of the default (most recently active) application instance.
    fn default_instance(&self) -> Result<Vec<OpenWorkbook<Self::Handle>>>;

    /// Every running instance with its workbooks.
    fn instances(&self) -> Result<Vec<AppInstance<Self::Handle>>>;
}
