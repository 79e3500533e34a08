//! In-process live workbook.
//!
//! `MemoryWorkbook` is a shared handle: clones see the same state, the same
//! way a script and the human user see the same workbook in a running
//! application. Used by tests and by embedders that host the data themselves.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use livesheet_protocol::{CellInfo, CellRange, CellValue, Extent, Op, Rgb, WorkbookInfo};

use crate::error::{LiveSheetError, Result};
use crate::workbook::{AppInstance, LiveWorkbook, OpenWorkbook, WorkbookDirectory};

#[derive(Debug, Clone, Default)]
struct SheetState {
    name: String,
    cells: BTreeMap<(usize, usize), CellInfo>,
    fonts: BTreeMap<(usize, usize), Rgb>,
    autofits: usize,
}

impl SheetState {
    fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    fn set_value(&mut self, row: usize, col: usize, value: CellValue) {
        let value = value.normalized();
        match self.cells.get_mut(&(row, col)) {
            Some(cell) => {
                cell.value = value;
                if cell.value == CellValue::Empty && cell.fill.is_none() {
                    self.cells.remove(&(row, col));
                }
            }
            None if value != CellValue::Empty => {
                self.cells.insert((row, col), CellInfo { value, fill: None });
            }
            None => {}
        }
    }

    /// Clear values in range. Fills survive.
    fn clear(&mut self, range: &CellRange) {
        self.cells.retain(|&(r, c), cell| {
            if !range.contains(r, c) {
                return true;
            }
            cell.value = CellValue::Empty;
            cell.fill.is_some()
        });
    }

    fn extent(&self) -> Option<Extent> {
        let mut rows = 0;
        let mut cols = 0;
        for (&(r, c), cell) in &self.cells {
            if cell.value != CellValue::Empty {
                rows = rows.max(r);
                cols = cols.max(c);
            }
        }
        if rows == 0 {
            None
        } else {
            Some(Extent { rows, cols })
        }
    }
}

#[derive(Debug, Clone)]
struct BookState {
    title: String,
    full_path: Option<String>,
    sheets: Vec<SheetState>,
    active: usize,
    revision: u64,
    fail_next_apply: Option<String>,
    fail_autofit: bool,
}

impl BookState {
    fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name.eq_ignore_ascii_case(name))
    }

    fn sheet_mut(&mut self, name: &str) -> Result<&mut SheetState> {
        match self.sheet_index(name) {
            Some(idx) => Ok(&mut self.sheets[idx]),
            None => Err(self.missing(name)),
        }
    }

    fn sheet(&self, name: &str) -> Result<&SheetState> {
        self.sheet_index(name)
            .map(|idx| &self.sheets[idx])
            .ok_or_else(|| self.missing(name))
    }

    fn missing(&self, name: &str) -> LiveSheetError {
        LiveSheetError::SheetNotFound {
            sheet: name.to_string(),
            available: self.sheets.iter().map(|s| s.name.clone()).collect(),
        }
    }

    fn apply_one(&mut self, op: Op) -> std::result::Result<(), String> {
        match op {
            Op::SetCellValue { sheet, row, col, value } => {
                check_cell(row, col)?;
                self.sheet_mut(&sheet).map_err(|e| e.to_string())?.set_value(row, col, value);
            }
            Op::ClearRange { sheet, range } => {
                self.sheet_mut(&sheet).map_err(|e| e.to_string())?.clear(&range);
            }
            Op::AddSheet { name } => {
                if name.trim().is_empty() || name.chars().count() > 31 {
                    return Err(format!("invalid sheet name '{name}'"));
                }
                if self.sheet_index(&name).is_some() {
                    return Err(format!("sheet '{name}' already exists"));
                }
                self.sheets.push(SheetState::new(&name));
            }
            Op::DeleteSheet { name } => {
                let idx = self.sheet_index(&name).ok_or_else(|| self.missing(&name).to_string())?;
                if self.sheets.len() == 1 {
                    return Err("cannot delete the only sheet".to_string());
                }
                self.sheets.remove(idx);
                if idx < self.active || self.active >= self.sheets.len() {
                    self.active = self.active.saturating_sub(1);
                }
            }
            Op::AutofitColumns { sheet } => {
                if self.fail_autofit {
                    return Err("autofit is not available".to_string());
                }
                self.sheet_mut(&sheet).map_err(|e| e.to_string())?.autofits += 1;
            }
            Op::SetFontColor { sheet, row, col, color } => {
                check_cell(row, col)?;
                self.sheet_mut(&sheet).map_err(|e| e.to_string())?.fonts.insert((row, col), color);
            }
        }
        Ok(())
    }
}

fn check_cell(row: usize, col: usize) -> std::result::Result<(), String> {
    if row == 0 || col == 0 {
        Err(format!("cell ({row}, {col}) is outside the sheet, coordinates are 1-based"))
    } else {
        Ok(())
    }
}

/// Shared handle to an in-memory workbook.
#[derive(Debug, Clone)]
pub struct MemoryWorkbook {
    inner: Rc<RefCell<BookState>>,
}

impl MemoryWorkbook {
    /// A workbook with no sheets yet. `full_path` is `None` for an unsaved book.
    pub fn new(title: &str, full_path: Option<&str>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BookState {
                title: title.to_string(),
                full_path: full_path.map(str::to_string),
                sheets: Vec::new(),
                active: 0,
                revision: 0,
                fail_next_apply: None,
                fail_autofit: false,
            })),
        }
    }

    /// Append a sheet holding `rows` from A1.
    pub fn with_sheet(self, name: &str, rows: Vec<Vec<CellValue>>) -> Self {
        {
            let mut book = self.inner.borrow_mut();
            let mut sheet = SheetState::new(name);
            for (r, row) in rows.into_iter().enumerate() {
                for (c, value) in row.into_iter().enumerate() {
                    sheet.set_value(r + 1, c + 1, value);
                }
            }
            book.sheets.push(sheet);
        }
        self
    }

    /// Append a sheet from user-style text (`""` blank, numbers parsed).
    pub fn with_grid(self, name: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|s| CellValue::from_input(s)).collect())
            .collect();
        self.with_sheet(name, rows)
    }

    pub fn set_active(&self, sheet: &str) -> Result<()> {
        let mut book = self.inner.borrow_mut();
        let idx = book.sheet_index(sheet).ok_or_else(|| book.missing(sheet))?;
        book.active = idx;
        Ok(())
    }

    /// Simulate the user typing into a cell.
    pub fn set_value(&self, sheet: &str, row: usize, col: usize, value: impl Into<CellValue>) -> Result<()> {
        self.inner.borrow_mut().sheet_mut(sheet)?.set_value(row, col, value.into());
        Ok(())
    }

    pub fn set_fill(&self, sheet: &str, row: usize, col: usize, fill: Rgb) -> Result<()> {
        let mut book = self.inner.borrow_mut();
        let state = book.sheet_mut(sheet)?;
        state.cells.entry((row, col)).or_default().fill = Some(fill);
        Ok(())
    }

    pub fn cell(&self, sheet: &str, row: usize, col: usize) -> CellValue {
        let book = self.inner.borrow();
        book.sheet(sheet)
            .ok()
            .and_then(|s| s.cells.get(&(row, col)))
            .map(|c| c.value.clone())
            .unwrap_or_default()
    }

    pub fn font_color(&self, sheet: &str, row: usize, col: usize) -> Option<Rgb> {
        let book = self.inner.borrow();
        book.sheet(sheet).ok().and_then(|s| s.fonts.get(&(row, col)).copied())
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.inner.borrow().sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Values from A1 to the used extent.
    pub fn sheet_values(&self, sheet: &str) -> Vec<Vec<CellValue>> {
        let book = self.inner.borrow();
        let Ok(state) = book.sheet(sheet) else {
            return Vec::new();
        };
        let Some(extent) = state.extent() else {
            return Vec::new();
        };
        (1..=extent.rows)
            .map(|r| {
                (1..=extent.cols)
                    .map(|c| state.cells.get(&(r, c)).map(|cell| cell.value.clone()).unwrap_or_default())
                    .collect()
            })
            .collect()
    }

    pub fn autofit_count(&self, sheet: &str) -> usize {
        self.inner.borrow().sheet(sheet).map(|s| s.autofits).unwrap_or(0)
    }

    /// Number of batches committed so far.
    pub fn revision(&self) -> u64 {
        self.inner.borrow().revision
    }

    /// Make the next `apply` fail without touching the workbook.
    pub fn fail_next_apply(&self, message: &str) {
        self.inner.borrow_mut().fail_next_apply = Some(message.to_string());
    }

    pub fn fail_autofit(&self, fail: bool) {
        self.inner.borrow_mut().fail_autofit = fail;
    }

    fn listing(&self) -> OpenWorkbook<MemoryWorkbook> {
        let book = self.inner.borrow();
        OpenWorkbook {
            name: book.title.clone(),
            full_path: book.full_path.clone(),
            handle: self.clone(),
        }
    }
}

impl LiveWorkbook for MemoryWorkbook {
    fn info(&mut self) -> Result<WorkbookInfo> {
        let book = self.inner.borrow();
        Ok(WorkbookInfo {
            title: book.title.clone(),
            full_path: book.full_path.clone(),
            sheets: book.sheets.iter().map(|s| s.name.clone()).collect(),
            active_sheet: book.active,
        })
    }

    fn used_extent(&mut self, sheet: &str) -> Result<Option<Extent>> {
        Ok(self.inner.borrow().sheet(sheet)?.extent())
    }

    fn read_range(&mut self, sheet: &str, range: CellRange) -> Result<Vec<Vec<CellInfo>>> {
        let book = self.inner.borrow();
        let state = book.sheet(sheet)?;
        if range.is_empty() || range.start_row == 0 || range.start_col == 0 {
            return Ok(Vec::new());
        }
        Ok((range.start_row..=range.end_row)
            .map(|r| {
                (range.start_col..=range.end_col)
                    .map(|c| state.cells.get(&(r, c)).cloned().unwrap_or_default())
                    .collect()
            })
            .collect())
    }

    fn apply(&mut self, ops: Vec<Op>) -> Result<()> {
        let mut book = self.inner.borrow_mut();
        if let Some(message) = book.fail_next_apply.take() {
            return Err(LiveSheetError::Bridge(message));
        }

        let mut staged = book.clone();
        for (index, op) in ops.into_iter().enumerate() {
            staged
                .apply_one(op)
                .map_err(|msg| LiveSheetError::Bridge(format!("op {index} rejected: {msg}")))?;
        }
        staged.revision += 1;
        *book = staged;
        Ok(())
    }
}

/// A fixed set of running instances over memory workbooks.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    instances: Vec<(u32, Vec<MemoryWorkbook>)>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an application instance. The first one added is the default.
    pub fn with_instance(mut self, pid: u32, workbooks: Vec<MemoryWorkbook>) -> Self {
        self.instances.push((pid, workbooks));
        self
    }
}

impl WorkbookDirectory for MemoryDirectory {
    type Handle = MemoryWorkbook;

    fn default_instance(&self) -> Result<Vec<OpenWorkbook<MemoryWorkbook>>> {
        Ok(self
            .instances
            .first()
            .map(|(_, books)| books.iter().map(MemoryWorkbook::listing).collect())
            .unwrap_or_default())
    }

    fn instances(&self) -> Result<Vec<AppInstance<MemoryWorkbook>>> {
        Ok(self
            .instances
            .iter()
            .map(|(pid, books)| AppInstance {
                pid: *pid,
                workbooks: books.iter().map(MemoryWorkbook::listing).collect(),
            })
            .collect())
    }
}
