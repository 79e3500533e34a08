//! Live workbook sessions and structural inference.
//!
//! Scripts open a [`Session`] on a workbook that is already open in a running
//! spreadsheet application, read a [`TableView`] of its data, and write back
//! through the [`SurgicalWriter`] or publish results with the
//! [`ReportSheetManager`]. Failures are captured by the [`ErrorRecorder`].

pub mod connector;
pub mod error;
pub mod memory;
pub mod outcome;
pub mod preview;
pub mod recorder;
pub mod remote;
pub mod report;
pub mod resolver;
pub mod session;
pub mod structure;
pub mod table;
pub mod workbook;
pub mod writer;

pub use connector::WorkbookConnector;
pub use error::{LiveSheetError, Result};
pub use outcome::{classify, ScriptOutcome};
pub use recorder::{ErrorRecord, ErrorRecorder};
pub use report::{group_block, ReportBlock, ReportSheetManager};
pub use resolver::{MatchMode, Resolution};
pub use session::Session;
pub use structure::{ColumnLabel, StructureConfig, TableStructure, TableStructureInferrer};
pub use table::{ColumnKind, TableRow, TableView};
pub use workbook::{AppInstance, LiveWorkbook, OpenWorkbook, WorkbookDirectory};
pub use writer::SurgicalWriter;

pub use livesheet_protocol::{CellRange, CellValue, Rgb};
