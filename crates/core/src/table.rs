//! In-memory snapshot of the data region below the header.

use std::collections::BTreeMap;

use livesheet_protocol::{CellInfo, CellValue};
use serde::Serialize;

use crate::error::{LiveSheetError, Result};
use crate::structure::ColumnLabel;

static EMPTY: CellValue = CellValue::Empty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Empty,
    Numeric,
    Text,
    Bool,
    Mixed,
}

impl ColumnKind {
    /// Kind of a column from its values; blanks are ignored.
    pub fn of<'a>(values: impl IntoIterator<Item = &'a CellValue>) -> Self {
        let mut kind = ColumnKind::Empty;
        for value in values {
            let this = match value {
                v if v.is_blank() => continue,
                CellValue::Number(_) => ColumnKind::Numeric,
                CellValue::Bool(_) => ColumnKind::Bool,
                _ => ColumnKind::Text,
            };
            kind = match kind {
                ColumnKind::Empty => this,
                k if k == this => k,
                _ => return ColumnKind::Mixed,
            };
        }
        kind
    }
}

/// One data row: physical column index (1-based) to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    cells: BTreeMap<usize, CellValue>,
}

impl TableRow {
    pub fn get(&self, col: usize) -> &CellValue {
        self.cells.get(&col).unwrap_or(&EMPTY)
    }

    pub fn set(&mut self, col: usize, value: impl Into<CellValue>) {
        let value = value.into().normalized();
        if value == CellValue::Empty {
            self.cells.remove(&col);
        } else {
            self.cells.insert(col, value);
        }
    }

    pub fn is_blank(&self) -> bool {
        self.cells.is_empty()
    }

    /// Non-blank cells in column order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &CellValue)> {
        self.cells.iter().map(|(col, value)| (*col, value))
    }
}

/// Rows are kept in sheet order, blank rows included, so row `i` sits at
/// physical row `start_row + i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableView {
    columns: Vec<ColumnLabel>,
    rows: Vec<TableRow>,
}

impl TableView {
    pub fn new(columns: Vec<ColumnLabel>, rows: Vec<TableRow>) -> Self {
        Self { columns, rows }
    }

    /// Build from live cells read across columns `1..=width`.
    pub fn from_cells(columns: Vec<ColumnLabel>, cells: Vec<Vec<CellInfo>>) -> Self {
        let rows = cells
            .into_iter()
            .map(|row| {
                let mut table_row = TableRow::default();
                for (i, cell) in row.into_iter().enumerate() {
                    table_row.set(i + 1, cell.value);
                }
                table_row
            })
            .collect();
        Self { columns, rows }
    }

    /// Build from rectangular records, one value per column in column order.
    pub fn from_records(columns: Vec<ColumnLabel>, records: Vec<Vec<CellValue>>) -> Result<Self> {
        let mut rows = Vec::with_capacity(records.len());
        for (i, record) in records.into_iter().enumerate() {
            if record.len() != columns.len() {
                return Err(LiveSheetError::LengthMismatch {
                    context: format!("record {}", i + 1),
                    expected: columns.len(),
                    found: record.len(),
                });
            }
            let mut row = TableRow::default();
            for (column, value) in columns.iter().zip(record) {
                row.set(column.index, value);
            }
            rows.push(row);
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[ColumnLabel] {
        &self.columns
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut Vec<TableRow> {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rightmost physical column covered by labels or values.
    pub fn width(&self) -> usize {
        let labelled = self.columns.iter().map(|c| c.index).max().unwrap_or(0);
        let filled = self
            .rows
            .iter()
            .filter_map(|r| r.cells.keys().next_back().copied())
            .max()
            .unwrap_or(0);
        labelled.max(filled)
    }

    pub fn column(&self, label: &str) -> Option<&ColumnLabel> {
        self.columns.iter().find(|c| c.label == label)
    }

    pub fn column_values(&self, col: usize) -> Vec<&CellValue> {
        self.rows.iter().map(|r| r.get(col)).collect()
    }

    pub fn column_kind(&self, col: usize) -> ColumnKind {
        ColumnKind::of(self.rows.iter().map(|r| r.get(col)))
    }

    pub fn push_row(&mut self, row: TableRow) {
        self.rows.push(row);
    }

    pub fn retain(&mut self, keep: impl FnMut(&TableRow) -> bool) {
        self.rows.retain(keep);
    }

    /// Drop rows whose values in `cols` repeat an earlier row. Returns how many went.
    pub fn dedup_by(&mut self, cols: &[usize]) -> usize {
        let before = self.rows.len();
        let mut seen: Vec<Vec<CellValue>> = Vec::new();
        self.rows.retain(|row| {
            let key: Vec<CellValue> = cols.iter().map(|c| row.get(*c).clone()).collect();
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });
        before - self.rows.len()
    }

    /// Rows grouped by their value in `col`, groups in first-seen order.
    pub fn groups(&self, col: usize) -> Vec<(CellValue, Vec<&TableRow>)> {
        let mut groups: Vec<(CellValue, Vec<&TableRow>)> = Vec::new();
        for row in &self.rows {
            let key = row.get(col);
            match groups.iter_mut().find(|(value, _)| value == key) {
                Some((_, members)) => members.push(row),
                None => groups.push((key.clone(), vec![row])),
            }
        }
        groups
    }

    pub fn group_counts(&self, col: usize) -> Vec<(CellValue, usize)> {
        self.groups(col)
            .into_iter()
            .map(|(value, rows)| (value, rows.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> TableView {
        TableView::from_records(
            vec![ColumnLabel::new(1, "Dept"), ColumnLabel::new(2, "Name")],
            vec![
                vec!["Sales".into(), "A".into()],
                vec!["Sales".into(), "B".into()],
                vec!["Eng".into(), "C".into()],
                vec!["Sales".into(), "A".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn ragged_record_is_a_length_mismatch() {
        let err = TableView::from_records(
            vec![ColumnLabel::new(1, "Dept"), ColumnLabel::new(2, "Name")],
            vec![vec!["Sales".into(), "A".into()], vec!["Eng".into()]],
        )
        .unwrap_err();
        assert_eq!(
            err,
            LiveSheetError::LengthMismatch { context: "record 2".into(), expected: 2, found: 1 }
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut table = people();
        assert_eq!(table.dedup_by(&[1, 2]), 1);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[2].get(2), &CellValue::Text("C".into()));
    }

    #[test]
    fn groups_in_first_seen_order() {
        let counts = people().group_counts(1);
        assert_eq!(
            counts,
            vec![(CellValue::Text("Sales".into()), 3), (CellValue::Text("Eng".into()), 1)]
        );
    }

    #[test]
    fn column_kinds() {
        let table = TableView::from_cells(
            vec![ColumnLabel::new(1, "N"), ColumnLabel::new(2, "M")],
            vec![
                vec![CellInfo { value: 1.0.into(), fill: None }, CellInfo { value: "x".into(), fill: None }],
                vec![CellInfo::default(), CellInfo { value: 2.0.into(), fill: None }],
            ],
        );
        assert_eq!(table.column_kind(1), ColumnKind::Numeric);
        assert_eq!(table.column_kind(2), ColumnKind::Mixed);
        assert_eq!(table.column_kind(3), ColumnKind::Empty);
        assert_eq!(table.len(), 2);
        assert!(table.rows()[1].get(1).is_blank());
    }

    #[test]
    fn nan_is_stored_as_blank() {
        let mut row = TableRow::default();
        row.set(1, f64::NAN);
        assert!(row.is_blank());
    }
}
