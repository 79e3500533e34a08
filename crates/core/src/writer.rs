//! Writes back into the live table region.
//!
//! Column writes touch only the addressed cells. Whole-table writes and
//! region replacement clear first and write second, in one atomic batch,
//! so a shorter table never leaves stale rows behind.

use livesheet_protocol::{CellRange, CellValue, Op};

use crate::error::{LiveSheetError, Result};
use crate::session::Session;
use crate::table::TableView;
use crate::workbook::LiveWorkbook;

pub struct SurgicalWriter<'s, W: LiveWorkbook> {
    session: &'s mut Session<W>,
}

impl<'s, W: LiveWorkbook> SurgicalWriter<'s, W> {
    pub fn new(session: &'s mut Session<W>) -> Self {
        Self { session }
    }

    /// Write `values` down column `col` from the session's start row.
    pub fn write_column(&mut self, col: usize, values: &[CellValue]) -> Result<()> {
        let start_row = self.session.start_row();
        self.write_column_at(col, values, start_row)
    }

    /// Write `values` into rows `start_row..start_row + values.len()` of `col`.
    /// Nothing else in the sheet changes.
    pub fn write_column_at(&mut self, col: usize, values: &[CellValue], start_row: usize) -> Result<()> {
        if col == 0 || start_row == 0 {
            return Err(LiveSheetError::Config(format!(
                "write target ({start_row}, {col}) is outside the sheet"
            )));
        }
        if values.is_empty() {
            return Ok(());
        }

        let values: Vec<CellValue> = values.iter().cloned().map(CellValue::normalized).collect();
        self.check_column_type(col, values.iter().enumerate().map(|(i, v)| (start_row + i, v)))?;

        let sheet = self.session.sheet().to_string();
        let ops = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| Op::SetCellValue { sheet: sheet.clone(), row: start_row + i, col, value })
            .collect::<Vec<_>>();
        let end_row = start_row + ops.len() - 1;
        self.session.workbook().apply(ops)?;

        log::debug!("wrote column {col} rows {start_row}-{end_row} on '{sheet}'");
        self.session.grow_region(end_row, col);
        Ok(())
    }

    /// Replace the whole table: clear the tracked region, then write `table`
    /// from the start row.
    pub fn write_table(&mut self, table: &TableView) -> Result<()> {
        let start_row = self.session.start_row();
        let width = table.width();

        for column in table.columns() {
            let col = column.index;
            self.check_column_type(
                col,
                table.rows().iter().enumerate().map(|(i, row)| (start_row + i, row.get(col))),
            )?;
        }

        let sheet = self.session.sheet().to_string();
        let old = self.session.region();
        let mut ops = Vec::new();
        if !old.is_empty() {
            ops.push(Op::ClearRange { sheet: sheet.clone(), range: old });
        }
        for (i, row) in table.rows().iter().enumerate() {
            for (col, value) in row.iter() {
                ops.push(Op::SetCellValue { sheet: sheet.clone(), row: start_row + i, col, value: value.clone() });
            }
        }
        self.session.workbook().apply(ops)?;

        // an empty table leaves an empty region (end above start)
        let end_row = start_row + table.len() - 1;
        let new = CellRange::new(start_row, 1, end_row, width.max(1));
        log::debug!(
            "rewrote table on '{sheet}': {} row(s), cleared {} row(s)",
            table.len(),
            old.row_count()
        );
        self.session.set_region(new);
        Ok(())
    }

    /// Clear `region` and write `rows` from its top-left corner, as one batch.
    pub fn replace_region(&mut self, region: CellRange, rows: &[Vec<CellValue>]) -> Result<()> {
        if region.is_empty() || region.start_row == 0 || region.start_col == 0 {
            return Err(LiveSheetError::Config(format!("invalid region {region:?}")));
        }
        if rows.len() > region.row_count() {
            return Err(LiveSheetError::LengthMismatch {
                context: "region rows".into(),
                expected: region.row_count(),
                found: rows.len(),
            });
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() > region.col_count()) {
            return Err(LiveSheetError::LengthMismatch {
                context: format!("region row {}", i + 1),
                expected: region.col_count(),
                found: row.len(),
            });
        }

        let sheet = self.session.sheet().to_string();
        let mut ops = vec![Op::ClearRange { sheet: sheet.clone(), range: region }];
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                let value = value.clone().normalized();
                if value == CellValue::Empty {
                    continue;
                }
                ops.push(Op::SetCellValue {
                    sheet: sheet.clone(),
                    row: region.start_row + r,
                    col: region.start_col + c,
                    value,
                });
            }
        }
        self.session.workbook().apply(ops)?;

        if region.end_row >= self.session.start_row() && !rows.is_empty() {
            self.session.grow_region(region.start_row + rows.len() - 1, region.end_col);
        }
        Ok(())
    }

    /// Reject text headed for a column whose live values are all numeric.
    fn check_column_type<'v>(
        &mut self,
        col: usize,
        mut writes: impl Iterator<Item = (usize, &'v CellValue)>,
    ) -> Result<()> {
        let Some((row, text)) = writes.find(|(_, v)| v.is_text()) else {
            return Ok(());
        };

        let region = self.session.region();
        if region.is_empty() {
            return Ok(());
        }
        let sheet = self.session.sheet().to_string();
        let live = self
            .session
            .workbook()
            .read_range(&sheet, CellRange::new(region.start_row, col, region.end_row, col))?;
        let values = live.iter().filter_map(|row| row.first()).map(|cell| &cell.value);

        let mut numbers = 0;
        for value in values {
            if value.is_blank() {
                continue;
            }
            if !value.is_number() {
                return Ok(());
            }
            numbers += 1;
        }
        if numbers == 0 {
            return Ok(());
        }

        Err(LiveSheetError::TypeConflict {
            column: self.session.label_of(col),
            value: text.raw_display(),
            row,
        })
    }
}

impl<W: LiveWorkbook> Session<W> {
    pub fn writer(&mut self) -> SurgicalWriter<'_, W> {
        SurgicalWriter::new(self)
    }
}
