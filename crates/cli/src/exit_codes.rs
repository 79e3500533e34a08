//! CLI Exit Code Registry
//!
//! Single source of truth for `livesheet` exit codes. Retry loops and
//! orchestrators branch on them, so they are part of the shell contract.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                                   |
//! |---------|-----------|-----------------------------------------------|
//! | 0       | Universal | Success                                       |
//! | 1       | Universal | General error, or script output classified as failed |
//! | 2       | Universal | CLI usage error (bad args, unreadable file)   |
//! | 20-29   | session   | Live workbook / session bridge codes          |
//! | 30-39   | column    | Column resolution and write-shape codes       |

use livesheet_core::LiveSheetError;

// =============================================================================
// Universal (0-2)
// =============================================================================

pub const EXIT_SUCCESS: u8 = 0;

/// General error. `check-output` also uses it for a failed script.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable input file, invalid settings file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Session (20-29)
// =============================================================================

/// The workbook is not open in any live session.
pub const EXIT_SESSION_NOT_FOUND: u8 = 20;

/// The live application call failed (connection, auth, protocol, rejected op).
pub const EXIT_SESSION_BRIDGE: u8 = 21;

/// The sheet has no rows to infer a structure from.
pub const EXIT_SESSION_EMPTY_SHEET: u8 = 22;

/// The requested sheet does not exist in the workbook.
pub const EXIT_SESSION_SHEET_NOT_FOUND: u8 = 23;

/// Invalid structure config.
pub const EXIT_SESSION_CONFIG: u8 = 24;

// =============================================================================
// Column (30-39)
// =============================================================================

/// More than one column matched the logical name.
pub const EXIT_COLUMN_AMBIGUOUS: u8 = 30;

/// No column matched the logical name.
pub const EXIT_COLUMN_NOT_FOUND: u8 = 31;

/// Text value refused by a numeric column.
pub const EXIT_COLUMN_TYPE_CONFLICT: u8 = 32;

/// Ragged rows for a rectangular target.
pub const EXIT_COLUMN_LENGTH: u8 = 33;

/// Map a core error to its exit code.
pub fn core_exit_code(err: &LiveSheetError) -> u8 {
    match err {
        LiveSheetError::NotFound { .. } => EXIT_SESSION_NOT_FOUND,
        LiveSheetError::Bridge(_) => EXIT_SESSION_BRIDGE,
        LiveSheetError::EmptySheet { .. } => EXIT_SESSION_EMPTY_SHEET,
        LiveSheetError::SheetNotFound { .. } => EXIT_SESSION_SHEET_NOT_FOUND,
        LiveSheetError::Config(_) => EXIT_SESSION_CONFIG,
        LiveSheetError::AmbiguousColumn { .. } => EXIT_COLUMN_AMBIGUOUS,
        LiveSheetError::ColumnNotFound { .. } => EXIT_COLUMN_NOT_FOUND,
        LiveSheetError::TypeConflict { .. } => EXIT_COLUMN_TYPE_CONFLICT,
        LiveSheetError::LengthMismatch { .. } => EXIT_COLUMN_LENGTH,
        LiveSheetError::Presentation(_) => EXIT_ERROR,
    }
}
