//! Compact workbook structure preview, as handed to the planner.

use std::fmt::Write as _;

use livesheet_config::Settings;
use serde::Serialize;

use crate::error::{LiveSheetError, Result};
use crate::session::snapshot;
use crate::table::ColumnKind;
use crate::workbook::LiveWorkbook;

/// Data rows shown per sheet.
pub const SAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct WorkbookPreview {
    pub title: String,
    pub full_path: Option<String>,
    pub active_sheet: Option<String>,
    pub sheets: Vec<SheetPreview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetPreview {
    pub name: String,
    pub empty: bool,
    pub header_count: usize,
    pub data_start_row: usize,
    pub data_rows: usize,
    pub columns: Vec<ColumnSummary>,
    pub sample: Vec<Vec<String>>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub index: usize,
    pub label: String,
    pub kind: ColumnKind,
}

pub fn peek<W: LiveWorkbook + ?Sized>(workbook: &mut W, settings: &Settings) -> Result<WorkbookPreview> {
    let info = workbook.info()?;
    let mut sheets = Vec::with_capacity(info.sheets.len());

    for name in &info.sheets {
        let snap = match snapshot(workbook, name, None, settings) {
            Ok(snap) => snap,
            Err(LiveSheetError::EmptySheet { .. }) => {
                sheets.push(SheetPreview {
                    name: name.clone(),
                    empty: true,
                    header_count: 0,
                    data_start_row: 1,
                    data_rows: 0,
                    columns: Vec::new(),
                    sample: Vec::new(),
                    warnings: Vec::new(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        let columns = snap
            .structure
            .columns
            .iter()
            .map(|c| ColumnSummary {
                index: c.index,
                label: c.label.clone(),
                kind: snap.table.column_kind(c.index),
            })
            .collect();
        let sample = snap
            .table
            .rows()
            .iter()
            .take(SAMPLE_ROWS)
            .map(|row| {
                snap.structure
                    .columns
                    .iter()
                    .map(|c| row.get(c.index).raw_display())
                    .collect()
            })
            .collect();

        sheets.push(SheetPreview {
            name: name.clone(),
            empty: false,
            header_count: snap.structure.header_count,
            data_start_row: snap.structure.data_start_row,
            data_rows: snap.table.len(),
            columns,
            sample,
            warnings: snap.structure.warnings.clone(),
        });
    }

    Ok(WorkbookPreview {
        active_sheet: info.active_sheet_name().map(str::to_string),
        title: info.title,
        full_path: info.full_path,
        sheets,
    })
}

fn kind_name(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Empty => "empty",
        ColumnKind::Numeric => "numeric",
        ColumnKind::Text => "text",
        ColumnKind::Bool => "bool",
        ColumnKind::Mixed => "mixed",
    }
}

impl WorkbookPreview {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LiveSheetError::Bridge(e.to_string()))
    }

    /// Plain-text rendering for prompts and terminals.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Workbook: {}", self.title);
        if let Some(path) = &self.full_path {
            let _ = writeln!(out, "Path: {path}");
        }
        for sheet in &self.sheets {
            let active = if self.active_sheet.as_deref() == Some(sheet.name.as_str()) { " (active)" } else { "" };
            let _ = writeln!(out, "\n== {}{active} ==", sheet.name);
            if sheet.empty {
                let _ = writeln!(out, "(empty)");
                continue;
            }
            let _ = writeln!(
                out,
                "header rows: {}, data starts at row {}, {} data row(s)",
                sheet.header_count, sheet.data_start_row, sheet.data_rows
            );
            for column in &sheet.columns {
                let _ = writeln!(out, "  [{}] {} ({})", column.index, column.label, kind_name(column.kind));
            }
            for row in &sheet.sample {
                let _ = writeln!(out, "  | {}", row.join(" | "));
            }
            for warning in &sheet.warnings {
                let _ = writeln!(out, "  warning: {warning}");
            }
        }
        out
    }
}
