use std::fmt;

pub type Result<T> = std::result::Result<T, LiveSheetError>;

#[derive(Debug, Clone, PartialEq)]
pub enum LiveSheetError {
    /// No live session holds the requested workbook.
    NotFound { file_name: String, path: String },
    /// Structure inference had nothing to infer from.
    EmptySheet { sheet: String },
    /// A mutating flow matched more than one column.
    AmbiguousColumn { name: String, candidates: Vec<String> },
    /// A required column does not exist.
    ColumnNotFound { name: String, available: Vec<String> },
    /// Text value headed for a uniformly numeric column.
    TypeConflict { column: String, value: String, row: usize },
    /// Ragged data forced into a rectangular shape.
    LengthMismatch { context: String, expected: usize, found: usize },
    /// Cosmetic step failed (auto-fit, colours).
    Presentation(String),
    SheetNotFound { sheet: String, available: Vec<String> },
    /// The live application call itself failed.
    Bridge(String),
    /// Invalid structure config or settings.
    Config(String),
}

impl LiveSheetError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::EmptySheet { .. } => "empty_sheet",
            Self::AmbiguousColumn { .. } => "ambiguous_column",
            Self::ColumnNotFound { .. } => "column_not_found",
            Self::TypeConflict { .. } => "type_conflict",
            Self::LengthMismatch { .. } => "length_mismatch",
            Self::Presentation(_) => "presentation",
            Self::SheetNotFound { .. } => "sheet_not_found",
            Self::Bridge(_) => "bridge",
            Self::Config(_) => "config",
        }
    }

    /// Presentation failures are the only kind callers may absorb.
    ///
    /// `ColumnNotFound` is raised only by flows that require the column;
    /// best-effort flows see `Resolution::NotFound` instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Presentation(_))
    }
}

fn list(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for LiveSheetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { file_name, path } => write!(
                f,
                "workbook '{file_name}' is not open in any live session (looked for {path}); open it in the spreadsheet application and retry"
            ),
            Self::EmptySheet { sheet } => write!(f, "sheet '{sheet}' has no rows"),
            Self::AmbiguousColumn { name, candidates } => write!(
                f,
                "column '{name}' is ambiguous, candidates: {}",
                list(candidates)
            ),
            Self::ColumnNotFound { name, available } => write!(
                f,
                "column '{name}' not found, available columns: {}",
                list(available)
            ),
            Self::TypeConflict { column, value, row } => write!(
                f,
                "refusing to write text '{value}' into numeric column '{column}' (row {row})"
            ),
            Self::LengthMismatch { context, expected, found } => write!(
                f,
                "length mismatch in {context}: expected {expected} value(s), found {found}"
            ),
            Self::Presentation(msg) => write!(f, "presentation step failed: {msg}"),
            Self::SheetNotFound { sheet, available } => write!(
                f,
                "sheet '{sheet}' not found, available sheets: {}",
                list(available)
            ),
            Self::Bridge(msg) => write!(f, "live application error: {msg}"),
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for LiveSheetError {}
