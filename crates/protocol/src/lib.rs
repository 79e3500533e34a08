//! Livesheet Bridge Protocol — v1 Frozen Wire Format
//!
//! This crate defines the canonical protocol types between the livesheet
//! runtime and a spreadsheet application that already has a workbook open.
//! The wire format is JSONL (newline-delimited JSON) over TCP localhost.
//!
//! # Protocol Version
//!
//! This is **protocol v1** — the wire format is frozen. Changes require:
//! 1. Version bump in PROTOCOL_VERSION
//! 2. Backward compatibility handling in the runtime's bridge client
//!
//! # Coordinates
//!
//! Rows and columns are 1-based on the wire, matching what a user sees in
//! the application (`A1` is row 1, column 1). Ranges are inclusive.
//!
//! # Usage
//!
//! ```ignore
//! use livesheet_protocol::{ClientMessage, PingMessage, ServerMessage};
//!
//! let msg = ClientMessage::Ping(PingMessage { id: "1".into() });
//! let json = serde_json::to_string(&msg)?;
//!
//! let response: ServerMessage = serde_json::from_str(&line)?;
//! ```

use serde::{Deserialize, Serialize};

/// Current protocol version. Increment for breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// Shared scalar types
// =============================================================================

/// A raw cell value as stored by the live application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    /// Parse user-style input: blank → Empty, numeric → Number, else Text.
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return CellValue::Empty;
        }

        if let Ok(num) = trimmed.parse::<f64>() {
            if num.is_finite() {
                return CellValue::Number(num);
            }
        }

        match trimmed.to_ascii_uppercase().as_str() {
            "TRUE" => CellValue::Bool(true),
            "FALSE" => CellValue::Bool(false),
            _ => CellValue::Text(trimmed.to_string()),
        }
    }

    /// True for Empty and for text that is only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(n) => n.is_nan(),
            CellValue::Bool(_) => false,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, CellValue::Number(n) if !n.is_nan())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, CellValue::Text(s) if !s.trim().is_empty())
    }

    /// Replace missing markers (NaN, whitespace-only text) with an explicit Empty.
    pub fn normalized(self) -> Self {
        if self.is_blank() {
            CellValue::Empty
        } else {
            self
        }
    }

    /// Display form used for labels and plain-text rendering.
    pub fn raw_display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.is_nan() {
                    String::new()
                } else if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw_display())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<usize> for CellValue {
    fn from(value: usize) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

/// 24-bit RGB colour (fills, font colours).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };
    pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn is_white(&self) -> bool {
        *self == Self::WHITE
    }
}

/// A rectangular, inclusive, 1-based range of cells.
///
/// A range whose end precedes its start is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl CellRange {
    pub const fn new(start_row: usize, start_col: usize, end_row: usize, end_col: usize) -> Self {
        Self { start_row, start_col, end_row, end_col }
    }

    pub fn is_empty(&self) -> bool {
        self.end_row < self.start_row || self.end_col < self.start_col
    }

    pub fn row_count(&self) -> usize {
        if self.is_empty() { 0 } else { self.end_row - self.start_row + 1 }
    }

    pub fn col_count(&self) -> usize {
        if self.is_empty() { 0 } else { self.end_col - self.start_col + 1 }
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        !self.is_empty()
            && (self.start_row..=self.end_row).contains(&row)
            && (self.start_col..=self.end_col).contains(&col)
    }
}

// =============================================================================
// Client → Server Messages
// =============================================================================

/// Messages sent from the runtime (client) to the live application (server).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello(HelloMessage),
    ApplyOps(ApplyOpsMessage),
    Inspect(InspectMessage),
    Ping(PingMessage),
}

/// Initial handshake from client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloMessage {
    pub id: String,
    pub client: String,
    pub version: String,
    pub token: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
}

fn default_protocol_version() -> u32 {
    1
}

/// Request to apply a batch of operations to the workbook.
///
/// With `atomic` set, the server applies every op or none of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyOpsMessage {
    pub id: String,
    pub ops: Vec<Op>,
    #[serde(default)]
    pub atomic: bool,
}

/// A single operation to apply. Sheets are addressed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    SetCellValue {
        sheet: String,
        row: usize,
        col: usize,
        value: CellValue,
    },
    /// Clear values in a range. Formatting is kept.
    ClearRange {
        sheet: String,
        range: CellRange,
    },
    /// Append a new sheet after the last one. The active sheet is unchanged.
    AddSheet {
        name: String,
    },
    DeleteSheet {
        name: String,
    },
    AutofitColumns {
        sheet: String,
    },
    SetFontColor {
        sheet: String,
        row: usize,
        col: usize,
        color: Rgb,
    },
}

impl Op {
    /// Name of the sheet this op touches.
    pub fn sheet(&self) -> &str {
        match self {
            Op::SetCellValue { sheet, .. }
            | Op::ClearRange { sheet, .. }
            | Op::AutofitColumns { sheet }
            | Op::SetFontColor { sheet, .. } => sheet,
            Op::AddSheet { name } | Op::DeleteSheet { name } => name,
        }
    }
}

/// Request to inspect workbook state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectMessage {
    pub id: String,
    pub target: InspectTarget,
}

/// What to inspect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum InspectTarget {
    Workbook,
    UsedExtent { sheet: String },
    Range { sheet: String, range: CellRange },
}

/// Ping for keepalive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingMessage {
    pub id: String,
}

// =============================================================================
// Server → Client Messages
// =============================================================================

/// Messages sent from the live application (server) to the runtime (client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome(WelcomeMessage),
    ApplyOpsResult(ApplyOpsResultMessage),
    InspectResult(InspectResultMessage),
    Pong(PongMessage),
    Error(ErrorMessage),
}

/// Welcome response after successful hello.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeMessage {
    pub id: String,
    pub session_id: String,
    pub protocol_version: u32,
    pub revision: u64,
}

/// Result of apply_ops request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyOpsResultMessage {
    pub id: String,
    pub applied: usize,
    pub total: usize,
    #[serde(rename = "current_revision")]
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OpError>,
}

/// Error applying a specific operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpError {
    pub code: String,
    pub message: String,
    pub op_index: usize,
}

/// Result of inspect request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectResultMessage {
    pub id: String,
    pub revision: u64,
    pub result: InspectResult,
}

/// Inspection result variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum InspectResult {
    Workbook(WorkbookInfo),
    UsedExtent { extent: Option<Extent> },
    Range { rows: Vec<Vec<CellInfo>> },
}

/// Information about a single cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CellInfo {
    pub value: CellValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Rgb>,
}

/// Information about the workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbookInfo {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    pub sheets: Vec<String>,
    pub active_sheet: usize,
}

impl WorkbookInfo {
    pub fn active_sheet_name(&self) -> Option<&str> {
        self.sheets.get(self.active_sheet).map(String::as_str)
    }
}

/// Last used row and column of a sheet (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub rows: usize,
    pub cols: usize,
}

/// Pong response to ping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongMessage {
    pub id: String,
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub id: String,
    pub code: String,
    pub message: String,
}

// =============================================================================
// Discovery File Format
// =============================================================================

/// Discovery file written by the live application, one per open workbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryFile {
    pub session_id: String,
    pub port: u16,
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workbook_path: Option<std::path::PathBuf>,
    pub workbook_title: String,
    pub created_at: String, // ISO 8601 format
    pub protocol_version: u32,
}
