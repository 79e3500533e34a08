//! Report sheets.
//!
//! Results go to a fresh sheet appended after every existing sheet, so the
//! source table is never touched. Republishing under the same hint replaces
//! the earlier sheet instead of piling up copies.

use chrono::{DateTime, Utc};
use livesheet_protocol::{CellValue, Op};

use crate::error::Result;
use crate::session::Session;
use crate::structure::ColumnLabel;
use crate::table::TableView;
use crate::workbook::LiveWorkbook;

/// Longest sheet name spreadsheet applications accept.
pub const MAX_SHEET_NAME: usize = 31;

const FORBIDDEN: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// `<hint>_<suffix>`, with the hint sanitized and cut so the whole name fits.
pub fn sheet_name(hint: &str, suffix: &str) -> String {
    let mut clean: String = hint
        .trim()
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect();
    if clean.is_empty() {
        clean = "Report".to_string();
    }
    let room = MAX_SHEET_NAME.saturating_sub(suffix.chars().count() + 1).max(1);
    let hint: String = clean.chars().take(room).collect();
    format!("{hint}_{suffix}")
}

/// Shortest suffix that reads as a unix-seconds publish stamp.
const STAMP_DIGITS: usize = 10;

/// True for `<hint>_<unix seconds>` (case-insensitive hint). Shorter digit
/// suffixes such as `Sales_2024` belong to the user.
fn is_earlier_publish(sheet: &str, hint: &str) -> bool {
    let prefix = format!("{}_", hint.to_lowercase());
    let lower = sheet.to_lowercase();
    lower.strip_prefix(&prefix).is_some_and(|rest| {
        rest.len() >= STAMP_DIGITS && rest.chars().all(|c| c.is_ascii_digit())
    })
}

/// Ragged rows of heterogeneous values. No column alignment is implied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportBlock {
    pub title: Option<String>,
    rows: Vec<Vec<CellValue>>,
}

impl ReportBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn titled(title: impl Into<String>) -> Self {
        Self { title: Some(title.into()), rows: Vec::new() }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn push_row<I, V>(&mut self, row: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    pub fn blank_row(&mut self) {
        self.rows.push(Vec::new());
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as written: banner first when requested and titled.
    fn layout(&self, banner: bool, now: DateTime<Utc>) -> Vec<Vec<CellValue>> {
        let mut out = Vec::with_capacity(self.rows.len() + 3);
        if let (true, Some(title)) = (banner, &self.title) {
            out.push(vec![CellValue::Text(title.clone())]);
            out.push(vec![CellValue::Text(format!("Generated: {}", now.to_rfc3339()))]);
            out.push(Vec::new());
        }
        out.extend(self.rows.iter().cloned());
        out
    }
}

/// One header row per group (`[label, value, "Count", n]`), then the
/// group's rows in column order, then a blank row.
pub fn group_block(table: &TableView, column: &ColumnLabel) -> ReportBlock {
    let mut block = ReportBlock::new();
    for (value, rows) in table.groups(column.index) {
        block.push_row([
            CellValue::Text(column.label.clone()),
            value,
            CellValue::Text("Count".into()),
            CellValue::from(rows.len()),
        ]);
        for row in rows {
            block.push_row(table.columns().iter().map(|c| row.get(c.index).clone()));
        }
        block.blank_row();
    }
    block
}

pub struct ReportSheetManager;

impl ReportSheetManager {
    /// Publish `block` and return the concrete sheet name.
    pub fn publish<W: LiveWorkbook>(session: &mut Session<W>, hint: &str, block: &ReportBlock) -> Result<String> {
        Self::publish_at(session, hint, block, Utc::now())
    }

    pub fn publish_at<W: LiveWorkbook>(
        session: &mut Session<W>,
        hint: &str,
        block: &ReportBlock,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let settings = session.settings().clone();
        let name = sheet_name(hint, &now.timestamp().to_string());
        let concrete_hint = name
            .rsplit_once('_')
            .map_or(name.as_str(), |(hint, _)| hint)
            .to_string();

        let source = session.sheet().to_string();
        let existing = session.workbook().info()?.sheets;

        let mut ops = Vec::new();
        for sheet in &existing {
            let stale = sheet.eq_ignore_ascii_case(&name)
                || (settings.replace_previous && is_earlier_publish(sheet, &concrete_hint));
            if !stale {
                continue;
            }
            if sheet.eq_ignore_ascii_case(&source) {
                log::warn!("not deleting '{sheet}': it is the session's source sheet");
                continue;
            }
            ops.push(Op::DeleteSheet { name: sheet.clone() });
        }
        let replaced = ops.len();

        ops.push(Op::AddSheet { name: name.clone() });
        for (r, row) in block.layout(settings.banner, now).into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                let value = value.normalized();
                if value == CellValue::Empty {
                    continue;
                }
                ops.push(Op::SetCellValue { sheet: name.clone(), row: r + 1, col: c + 1, value });
            }
        }
        session.workbook().apply(ops)?;
        log::info!("published '{name}' ({} row(s), replaced {replaced})", block.len());

        if settings.autofit {
            if let Err(e) = session.workbook().apply(vec![Op::AutofitColumns { sheet: name.clone() }]) {
                log::warn!("{}", crate::LiveSheetError::Presentation(e.to_string()));
            }
        }

        Ok(name)
    }
}
