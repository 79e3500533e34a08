// End-to-end flows over in-memory workbooks: open, resolve, write, publish.

use livesheet_config::Settings;
use livesheet_core::memory::{MemoryDirectory, MemoryWorkbook};
use livesheet_core::structure::{flatten_label, StructureSource};
use livesheet_core::*;

fn directory(books: &[&MemoryWorkbook]) -> MemoryDirectory {
    MemoryDirectory::new().with_instance(4242, books.iter().map(|b| (*b).clone()).collect())
}

fn grades() -> MemoryWorkbook {
    MemoryWorkbook::new("grades.xlsx", Some("/home/t/grades.xlsx")).with_grid(
        "Grades",
        &[
            &["Student", "Math", "", "English", ""],
            &["", "Score", "Grade", "Score", "Grade"],
            &["Ann", "91", "A", "78", "C"],
            &["Bob", "64", "D", "88", "B"],
        ],
    )
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

#[test]
fn explicit_config_overrides_heuristics() {
    let book = MemoryWorkbook::new("h.xlsx", None).with_grid(
        "S",
        &[
            &["Title", "", ""],
            &["Region", "Q1", "Q2"],
            &["Unit", "EUR", "EUR"],
            &["North", "1", "2"],
            &["South", "3", "4"],
        ],
    );
    book.set_fill("S", 1, 1, Rgb::new(200, 220, 255)).unwrap();
    let dir = directory(&[&book]);

    for h in 1..=3 {
        let config = StructureConfig::with_header_count(h);
        let (session, table) = Session::open(&dir, "h.xlsx", Some(&config), &Settings::default()).unwrap();
        assert_eq!(session.header_count(), h);
        assert_eq!(session.start_row(), h + 1);
        assert_eq!(session.structure().source, StructureSource::Explicit);
        assert_eq!(table.len(), 5 - h);
    }
}

#[test]
fn planner_json_config_is_accepted() {
    let book = grades();
    let dir = directory(&[&book]);
    let config = StructureConfig::from_json(
        r#"{"header_count": 2, "data_start_row": 3, "columns_of_interest": ["Score"], "reasoning": "merged subject headers"}"#,
    )
    .unwrap();
    let (session, table) = Session::open(&dir, "grades.xlsx", Some(&config), &Settings::default()).unwrap();

    assert_eq!(
        session.structure().labels(),
        vec!["Student", "Math - Score", "Math - Grade", "English - Score", "English - Grade"]
    );
    assert_eq!(table.rows()[1].get(4), &CellValue::Number(88.0));
}

#[test]
fn columns_of_interest_keep_every_candidate() {
    let book = grades();
    let dir = directory(&[&book]);
    let config = StructureConfig::from_json(
        r#"{"header_count": 2, "columns_of_interest": ["Score", "Student", "Attendance"]}"#,
    )
    .unwrap();
    let (session, _) = Session::open(&dir, "grades.xlsx", Some(&config), &Settings::default()).unwrap();

    let interest = session.columns_of_interest();
    let names: Vec<&str> = interest.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["Score", "Student", "Attendance"]);
    assert_eq!(
        interest[0].1,
        Resolution::Ambiguous(vec![ColumnLabel::new(2, "Math - Score"), ColumnLabel::new(4, "English - Score")])
    );
    assert_eq!(interest[1].1, Resolution::Found(ColumnLabel::new(1, "Student")));
    assert_eq!(interest[2].1, Resolution::NotFound);
}

#[test]
fn merged_headers_are_detected_without_config() {
    let book = grades();
    let dir = directory(&[&book]);
    let (session, _) = Session::open(&dir, "grades.xlsx", None, &Settings::default()).unwrap();
    assert_eq!(session.header_count(), 2);
    assert_eq!(session.structure().source, StructureSource::MergedHeader);
    assert!(!session.structure().warnings.is_empty());
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[test]
fn flattened_labels_resolve_by_suffix() {
    assert_eq!(flatten_label(&["Category", "Name"], " - "), "Category - Name");

    let columns = vec![ColumnLabel::new(1, "Category - Name"), ColumnLabel::new(2, "Price")];
    let found = resolver::require_unique("Name", &columns, MatchMode::Suffix).unwrap();
    assert_eq!(found.index, 1);
}

#[test]
fn shared_suffix_is_ambiguous_for_writes() {
    let book = grades();
    let dir = directory(&[&book]);
    let config = StructureConfig::with_header_count(2);
    let (session, _) = Session::open(&dir, "grades.xlsx", Some(&config), &Settings::default()).unwrap();

    let err = session.require_column("Score", MatchMode::Suffix).unwrap_err();
    assert_eq!(
        err,
        LiveSheetError::AmbiguousColumn {
            name: "Score".into(),
            candidates: vec!["Math - Score".into(), "English - Score".into()],
        }
    );
    assert!(err.to_string().contains("'Math - Score'"));
}

#[test]
fn exact_label_short_circuits_fuzzy_matches() {
    let columns = vec![
        ColumnLabel::new(1, "Total - Score"),
        ColumnLabel::new(2, "Score"),
        ColumnLabel::new(3, "Score (adjusted)"),
    ];
    for mode in [MatchMode::Exact, MatchMode::Suffix, MatchMode::Contains] {
        let resolution = resolver::resolve("Score", &columns, mode);
        assert_eq!(resolution.found().map(|c| c.index), Some(2), "mode {mode}");
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

fn staff() -> MemoryWorkbook {
    MemoryWorkbook::new("staff.xlsx", Some("/srv/staff.xlsx")).with_grid(
        "Staff",
        &[
            &["Dept", "Name", "Salary"],
            &["Sales", "A", "100"],
            &["Sales", "B", "90"],
            &["Eng", "C", "120"],
            &["Eng", "C", "120"],
        ],
    )
}

#[test]
fn write_table_is_idempotent_after_shrinking() {
    let book = staff();
    let dir = directory(&[&book]);
    let (mut session, mut table) = Session::open(&dir, "staff.xlsx", None, &Settings::default()).unwrap();

    let removed = table.dedup_by(&[1, 2]);
    assert_eq!(removed, 1);

    session.writer().write_table(&table).unwrap();
    let first = book.sheet_values("Staff");
    let first_region = session.region();

    session.writer().write_table(&table).unwrap();
    assert_eq!(book.sheet_values("Staff"), first);
    assert_eq!(session.region(), first_region);
    assert_eq!(first.len(), 4);

    let reread = session.reload().unwrap();
    assert_eq!(reread, table);
}

#[test]
fn text_into_numeric_column_leaves_it_untouched() {
    let book = staff();
    let dir = directory(&[&book]);
    let (mut session, _) = Session::open(&dir, "staff.xlsx", None, &Settings::default()).unwrap();
    let salary = session.require_column("Salary", MatchMode::Exact).unwrap();

    let err = session
        .writer()
        .write_column(salary.index, &["Fail".into()])
        .unwrap_err();
    assert!(matches!(err, LiveSheetError::TypeConflict { ref column, .. } if column == "Salary"));

    let salaries: Vec<CellValue> = (2..=5).map(|r| book.cell("Staff", r, 3)).collect();
    assert_eq!(
        salaries,
        vec![
            CellValue::Number(100.0),
            CellValue::Number(90.0),
            CellValue::Number(120.0),
            CellValue::Number(120.0)
        ]
    );
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[test]
fn republishing_keeps_one_sheet_per_hint() {
    use chrono::{TimeZone, Utc};

    let book = staff();
    let dir = directory(&[&book]);
    let (mut session, _) = Session::open(&dir, "staff.xlsx", None, &Settings::default()).unwrap();
    let mut block = ReportBlock::titled("Headcount");
    block.push_row(["Total".into(), CellValue::from(4)]);

    let first = ReportSheetManager::publish_at(&mut session, "Headcount", &block, Utc.timestamp_opt(1_760_000_000, 0).unwrap())
        .unwrap();
    let second = ReportSheetManager::publish_at(&mut session, "Headcount", &block, Utc.timestamp_opt(1_760_000_060, 0).unwrap())
        .unwrap();

    assert_ne!(first, second);
    let reports: Vec<String> = book
        .sheet_names()
        .into_iter()
        .filter(|s| s.starts_with("Headcount_"))
        .collect();
    assert_eq!(reports, vec![second]);
}

#[test]
fn group_by_department_report() {
    let book = MemoryWorkbook::new("people.xlsx", None).with_grid(
        "People",
        &[&["Dept", "Name"], &["Sales", "A"], &["Sales", "B"], &["Eng", "C"]],
    );
    let dir = directory(&[&book]);
    let (mut session, table) = Session::open(&dir, "people.xlsx", None, &Settings::default()).unwrap();

    let dept = session.require_column("Dept", MatchMode::Exact).unwrap();
    assert_eq!(
        table.group_counts(dept.index),
        vec![(CellValue::from("Sales"), 2), (CellValue::from("Eng"), 1)]
    );

    let block = group_block(&table, &dept);
    let name = ReportSheetManager::publish(&mut session, "ByDept", &block).unwrap();

    assert_eq!(book.sheet_names().len(), 2);
    let header = |row| -> Vec<CellValue> { (1..=4).map(|c| book.cell(&name, row, c)).collect() };
    assert_eq!(
        header(1),
        vec!["Dept".into(), "Sales".into(), "Count".into(), CellValue::Number(2.0)]
    );
    assert_eq!(book.cell(&name, 2, 2), CellValue::from("A"));
    assert_eq!(book.cell(&name, 3, 2), CellValue::from("B"));
    assert!(book.cell(&name, 4, 1).is_blank());
    assert_eq!(
        header(5),
        vec!["Dept".into(), "Eng".into(), "Count".into(), CellValue::Number(1.0)]
    );
    assert_eq!(book.cell(&name, 6, 2), CellValue::from("C"));
}

// ---------------------------------------------------------------------------
// Connection and failures
// ---------------------------------------------------------------------------

#[test]
fn missing_workbook_names_the_file() {
    let dir = MemoryDirectory::new();
    let err = match Session::open(&dir, r"C:\data\report.xlsx", None, &Settings::default()) {
        Ok(_) => panic!("no workbook is open"),
        Err(err) => err,
    };
    match &err {
        LiveSheetError::NotFound { file_name, .. } => assert_eq!(file_name, "report.xlsx"),
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(err.to_string().contains("report.xlsx"));
}

#[test]
fn guarded_failure_lands_on_an_error_sheet() {
    let book = staff();
    let dir = directory(&[&book]);
    let (mut session, _) = Session::open(&dir, "staff.xlsx", None, &Settings::default()).unwrap();

    let result = session.guarded("raise salaries", |s| {
        let col = s.require_column("Bonus", MatchMode::Suffix)?;
        s.writer().write_column(col.index, &[CellValue::Number(1.0)])
    });
    assert_eq!(result.unwrap_err().code(), "column_not_found");

    assert_eq!(session.errors().len(), 1);
    let error_sheet = book
        .sheet_names()
        .into_iter()
        .find(|s| s.starts_with("Error_"))
        .expect("error sheet");
    let trace = book.cell(&error_sheet, 1, 1).to_string();
    assert!(trace.starts_with("[LIVESHEET-FAILURE] Trace:"));
    assert!(trace.contains("Bonus"));
    assert_eq!(book.font_color(&error_sheet, 1, 1), Some(Rgb::RED));
}
