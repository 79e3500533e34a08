//! Table structure inference.
//!
//! Decides how many header rows a sheet has, where data starts, and what
//! each column is called. An explicit config from the planner always wins;
//! without one the single-header layout is the default and every deviation
//! from it is reported as a warning.

use livesheet_config::Settings;
use livesheet_protocol::{CellInfo, CellValue};
use serde::{Deserialize, Serialize};

use crate::error::{LiveSheetError, Result};

/// Planner-supplied structure hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureConfig {
    #[serde(default)]
    pub header_count: Option<usize>,
    #[serde(default)]
    pub data_start_row: Option<usize>,
    #[serde(default)]
    pub columns_of_interest: Vec<String>,
    /// Informational only.
    #[serde(default)]
    pub reasoning: String,
}

impl StructureConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| LiveSheetError::Config(format!("structure config: {e}")))
    }

    pub fn with_header_count(header_count: usize) -> Self {
        Self { header_count: Some(header_count), ..Default::default() }
    }

    fn is_explicit(&self) -> bool {
        self.header_count.is_some() || self.data_start_row.is_some()
    }

    /// `(header_count, data_start_row)` with the missing half derived.
    fn resolved(&self) -> Result<(usize, usize)> {
        let (count, start) = match (self.header_count, self.data_start_row) {
            (Some(count), Some(start)) => (count, start),
            (Some(count), None) => (count, count + 1),
            (None, Some(start)) => (start.saturating_sub(1), start),
            (None, None) => (1, 2),
        };
        if start == 0 {
            return Err(LiveSheetError::Config("data_start_row must be at least 1".into()));
        }
        if start <= count {
            return Err(LiveSheetError::Config(format!(
                "data_start_row ({start}) must come after the {count} header row(s)"
            )));
        }
        Ok((count, start))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureSource {
    Explicit,
    Default,
    ColorAnchor,
    MergedHeader,
}

/// A physical column (1-based) and its flattened header label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnLabel {
    pub index: usize,
    pub label: String,
}

impl ColumnLabel {
    pub fn new(index: usize, label: impl Into<String>) -> Self {
        Self { index, label: label.into() }
    }

    pub fn placeholder(index: usize) -> Self {
        Self { index, label: format!("Column_{index}") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStructure {
    pub header_count: usize,
    pub data_start_row: usize,
    pub columns: Vec<ColumnLabel>,
    pub warnings: Vec<String>,
    pub source: StructureSource,
}

impl TableStructure {
    pub fn labels(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.label.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Blank,
    Header,
    Data,
}

pub struct TableStructureInferrer<'a> {
    settings: &'a Settings,
}

impl<'a> TableStructureInferrer<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Infer structure from the top rows of `sheet` (row 1 first, column A first).
    ///
    /// `preview` must reach down to the last header row and across every used
    /// column; only its top-left scan window feeds the heuristics.
    pub fn infer(
        &self,
        sheet: &str,
        preview: &[Vec<CellInfo>],
        config: Option<&StructureConfig>,
    ) -> Result<TableStructure> {
        let has_content = preview.iter().any(|row| row.iter().any(|c| !c.value.is_blank()));
        if !has_content {
            return Err(LiveSheetError::EmptySheet { sheet: sheet.to_string() });
        }

        let mut warnings = Vec::new();
        let (header_count, data_start_row, source) = match config.filter(|c| c.is_explicit()) {
            Some(config) => {
                let (count, start) = config.resolved()?;
                (count, start, StructureSource::Explicit)
            }
            None => {
                let (count, source) = self.detect(preview, &mut warnings);
                (count, count + 1, source)
            }
        };

        let columns = self.labels(preview, header_count, data_start_row);
        log::info!(
            "sheet '{sheet}': {header_count} header row(s), data from row {data_start_row} ({source:?})"
        );
        for warning in &warnings {
            log::warn!("sheet '{sheet}': {warning}");
        }

        Ok(TableStructure { header_count, data_start_row, columns, warnings, source })
    }

    fn window<'p>(&self, preview: &'p [Vec<CellInfo>]) -> impl Iterator<Item = &'p [CellInfo]> {
        let cols = self.settings.scan_cols;
        preview
            .iter()
            .take(self.settings.scan_rows)
            .map(move |row| &row[..row.len().min(cols)])
    }

    fn classify(&self, row: &[CellInfo]) -> RowKind {
        let filled: Vec<&CellValue> = row.iter().map(|c| &c.value).filter(|v| !v.is_blank()).collect();
        if filled.is_empty() {
            return RowKind::Blank;
        }
        let textual = filled.iter().filter(|v| !v.is_number()).count();
        if textual as f64 / filled.len() as f64 > self.settings.header_text_ratio {
            RowKind::Header
        } else {
            RowKind::Data
        }
    }

    fn detect(&self, preview: &[Vec<CellInfo>], warnings: &mut Vec<String>) -> (usize, StructureSource) {
        let max = self.settings.max_header_rows.max(1);

        // Colour anchor: user-filled header block in column A, starting at row 1.
        let filled = self
            .window(preview)
            .take_while(|row| row.first().and_then(|c| c.fill).is_some_and(|f| !f.is_white()))
            .count();
        let anchor = (filled > 0).then_some(filled);
        if let Some(rows) = anchor {
            if rows <= max {
                if rows > 1 {
                    warnings.push(format!("{rows} header rows taken from the fill colour in column A"));
                }
                return (rows, StructureSource::ColorAnchor);
            }
            warnings.push(format!(
                "fill colour in column A reaches row {rows}, beyond the {max}-row header limit; ignored"
            ));
        }

        let kinds: Vec<RowKind> = self.window(preview).map(|row| self.classify(row)).collect();
        let leading = kinds.iter().take_while(|k| **k == RowKind::Header).count();
        let has_data = kinds.contains(&RowKind::Data);

        match leading {
            0 => {
                warnings.push("first row does not look like a header; using it as the header row".into());
                (1, StructureSource::Default)
            }
            1 => (1, StructureSource::Default),
            _ if !has_data => {
                warnings.push(format!(
                    "no data-like row within the first {} rows; assuming a single header row",
                    kinds.len()
                ));
                (1, StructureSource::Default)
            }
            k if merged_signal(preview, k) => {
                let count = k.min(max);
                warnings.push(format!("multi-row header detected: {count} header rows (merged cells)"));
                (count, StructureSource::MergedHeader)
            }
            k => {
                warnings.push(format!(
                    "rows 1-{k} all look like headers but show no merged cells; assuming a single header row"
                ));
                (1, StructureSource::Default)
            }
        }
    }

    fn labels(&self, preview: &[Vec<CellInfo>], header_count: usize, data_start_row: usize) -> Vec<ColumnLabel> {
        let width = preview
            .iter()
            .map(|row| {
                row.iter()
                    .rposition(|c| !c.value.is_blank())
                    .map_or(0, |i| i + 1)
            })
            .max()
            .unwrap_or(0);

        if header_count == 0 {
            return (1..=width).map(ColumnLabel::placeholder).collect();
        }

        // Header rows sit directly above the data.
        let first = data_start_row - header_count;
        let mut rows: Vec<Vec<String>> = (first..data_start_row)
            .map(|r| {
                let row = preview.get(r - 1);
                (0..width)
                    .map(|c| {
                        row.and_then(|cells| cells.get(c))
                            .map(|cell| cell.value.raw_display())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();

        // Merged parent cells hold their value in the first cell only.
        let parents = rows.len().saturating_sub(1);
        for row in rows.iter_mut().take(parents) {
            forward_fill(row);
        }

        (0..width)
            .map(|c| {
                let segments: Vec<&str> = rows.iter().map(|row| row[c].as_str()).collect();
                let label = flatten_label(&segments, &self.settings.separator);
                if label.is_empty() {
                    ColumnLabel::placeholder(c + 1)
                } else {
                    ColumnLabel::new(c + 1, label)
                }
            })
            .collect()
    }
}

/// A blank top-row cell above a filled lower header cell, or a blank A2
/// under a filled A1.
fn merged_signal(preview: &[Vec<CellInfo>], header_rows: usize) -> bool {
    let blank = |r: usize, c: usize| {
        preview
            .get(r)
            .and_then(|row| row.get(c))
            .map_or(true, |cell| cell.value.is_blank())
    };
    let width = preview.iter().take(header_rows).map(Vec::len).max().unwrap_or(0);

    let gap_above = (0..width).any(|c| blank(0, c) && (1..header_rows).any(|r| !blank(r, c)));
    let gap_below_first = !blank(0, 0) && blank(1, 0);
    gap_above || gap_below_first
}

fn forward_fill(row: &mut [String]) {
    let mut last = String::new();
    for cell in row.iter_mut() {
        if cell.trim().is_empty() {
            cell.clone_from(&last);
        } else {
            last.clone_from(cell);
        }
    }
}

/// Join header segments into one label.
///
/// Segments are trimmed and whitespace-collapsed (embedded newlines go);
/// empty and repeated segments are skipped.
pub fn flatten_label<S: AsRef<str>>(segments: &[S], separator: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    for segment in segments {
        let clean = segment.as_ref().split_whitespace().collect::<Vec<_>>().join(" ");
        if !clean.is_empty() && !parts.contains(&clean) {
            parts.push(clean);
        }
    }
    parts.join(separator)
}
