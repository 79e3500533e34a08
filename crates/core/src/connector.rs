//! Locating a live workbook by file path.

use crate::error::{LiveSheetError, Result};
use crate::workbook::WorkbookDirectory;

/// Base file name, splitting on both separator styles.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim().trim_end_matches(['/', '\\']);
    trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed)
}

/// Comparison key for full paths: case-folded, forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.trim().replace('\\', "/").to_lowercase()
}

pub struct WorkbookConnector<'a, D: WorkbookDirectory> {
    directory: &'a D,
}

impl<'a, D: WorkbookDirectory> WorkbookConnector<'a, D> {
    pub fn new(directory: &'a D) -> Self {
        Self { directory }
    }

    /// Find the open workbook for `file_path`. Never opens anything from disk.
    ///
    /// Passes, first match wins: base name in the default instance, full path
    /// across every instance, base name for workbooks without a saved path.
    pub fn resolve(&self, file_path: &str) -> Result<D::Handle> {
        let wanted_name = base_name(file_path).to_lowercase();
        let wanted_path = normalize_path(file_path);

        if let Some(found) = self
            .directory
            .default_instance()?
            .into_iter()
            .find(|wb| wb.name.to_lowercase() == wanted_name)
        {
            log::debug!("'{}' found by name in the default instance", found.name);
            return Ok(found.handle);
        }

        let instances = self.directory.instances()?;
        log::debug!(
            "'{wanted_name}' not in the default instance, scanning {} instance(s)",
            instances.len()
        );

        let mut unsaved = Vec::new();
        for instance in instances {
            for wb in instance.workbooks {
                match &wb.full_path {
                    Some(path) if normalize_path(path) == wanted_path => {
                        log::debug!("'{}' found by path in pid {}", wb.name, instance.pid);
                        return Ok(wb.handle);
                    }
                    Some(_) => {}
                    None => unsaved.push((instance.pid, wb)),
                }
            }
        }

        if let Some((pid, wb)) = unsaved
            .into_iter()
            .find(|(_, wb)| wb.name.to_lowercase() == wanted_name)
        {
            log::debug!("'{}' matched by name only (unsaved) in pid {pid}", wb.name);
            return Ok(wb.handle);
        }

        Err(LiveSheetError::NotFound {
            file_name: base_name(file_path).to_string(),
            path: file_path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDirectory, MemoryWorkbook};
    use crate::workbook::LiveWorkbook;

    fn book(title: &str, path: Option<&str>) -> MemoryWorkbook {
        MemoryWorkbook::new(title, path).with_grid("Sheet1", &[&[title]])
    }

    fn title_of(mut wb: MemoryWorkbook) -> String {
        wb.info().unwrap().title
    }

    #[test]
    fn base_name_handles_both_separators() {
        assert_eq!(base_name(r"C:\data\report.xlsx"), "report.xlsx");
        assert_eq!(base_name("/home/u/report.xlsx"), "report.xlsx");
        assert_eq!(base_name("report.xlsx"), "report.xlsx");
    }

    #[test]
    fn default_instance_by_name() {
        let dir = MemoryDirectory::new()
            .with_instance(10, vec![book("Sales.xlsx", Some("/a/Sales.xlsx"))]);
        let wb = WorkbookConnector::new(&dir).resolve("/elsewhere/sales.XLSX").unwrap();
        assert_eq!(title_of(wb), "Sales.xlsx");
    }

    #[test]
    fn second_instance_by_full_path() {
        let dir = MemoryDirectory::new()
            .with_instance(10, vec![book("Other.xlsx", Some("/a/Other.xlsx"))])
            .with_instance(20, vec![book("Budget (2).xlsx", Some(r"C:\Data\Budget.xlsx"))]);
        let wb = WorkbookConnector::new(&dir).resolve("c:/data/budget.xlsx").unwrap();
        assert_eq!(title_of(wb), "Budget (2).xlsx");
    }

    #[test]
    fn unsaved_workbook_by_name() {
        let dir = MemoryDirectory::new()
            .with_instance(10, vec![])
            .with_instance(20, vec![book("Draft.xlsx", None)]);
        let wb = WorkbookConnector::new(&dir).resolve(r"D:\tmp\Draft.xlsx").unwrap();
        assert_eq!(title_of(wb), "Draft.xlsx");
    }

    #[test]
    fn saved_elsewhere_does_not_match_by_name_outside_default() {
        let dir = MemoryDirectory::new()
            .with_instance(10, vec![])
            .with_instance(20, vec![book("Draft.xlsx", Some("/other/Draft.xlsx"))]);
        assert!(WorkbookConnector::new(&dir).resolve("/tmp/Draft.xlsx").is_err());
    }

    #[test]
    fn nothing_open_names_the_file() {
        let dir = MemoryDirectory::new();
        let err = WorkbookConnector::new(&dir).resolve(r"C:\data\report.xlsx").unwrap_err();
        match &err {
            LiveSheetError::NotFound { file_name, .. } => assert_eq!(file_name, "report.xlsx"),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(err.to_string().contains("report.xlsx"));
    }
}
