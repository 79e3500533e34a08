// Property-based tests for structure inference, resolution and table writes.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use livesheet_config::Settings;
use livesheet_core::memory::{MemoryDirectory, MemoryWorkbook};
use livesheet_core::structure::flatten_label;
use livesheet_core::*;
use livesheet_protocol::CellInfo;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Arbitrary cell text: mostly numbers, sometimes words, sometimes blank.
fn arb_cell() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => r"-?[0-9]{1,5}",
        2 => r"[A-Za-z]{1,8}",
        1 => Just(String::new()),
    ]
}

fn arb_grid() -> impl Strategy<Value = Vec<Vec<String>>> {
    (1usize..6).prop_flat_map(|cols| {
        prop::collection::vec(prop::collection::vec(arb_cell(), cols), 4..12)
    })
}

fn arb_word() -> impl Strategy<Value = String> {
    r"[A-Z][a-z]{2,7}"
}

fn cells(grid: &[Vec<String>]) -> Vec<Vec<CellInfo>> {
    grid.iter()
        .map(|row| {
            row.iter()
                .map(|s| CellInfo { value: CellValue::from_input(s), fill: None })
                .collect()
        })
        .collect()
}

fn numeric_book(rows: &[Vec<i64>]) -> MemoryWorkbook {
    let mut sheet = vec![vec![CellValue::from("Id"), CellValue::from("Qty")]];
    sheet.extend(rows.iter().map(|r| r.iter().map(|n| CellValue::from(*n)).collect()));
    MemoryWorkbook::new("p.xlsx", None).with_sheet("Data", sheet)
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn explicit_header_count_always_wins(grid in arb_grid(), h in 1usize..=3) {
        let mut grid = grid;
        // guarantee the sheet is not empty
        grid[0][0] = "Key".to_string();
        let settings = Settings::default();
        let config = StructureConfig::with_header_count(h);

        let structure = TableStructureInferrer::new(&settings)
            .infer("Sheet1", &cells(&grid), Some(&config))
            .unwrap();
        prop_assert_eq!(structure.header_count, h);
        prop_assert_eq!(structure.data_start_row, h + 1);
    }

    #[test]
    fn flattened_label_resolves_by_its_leaf(parent in arb_word(), leaf in arb_word()) {
        prop_assume!(parent != leaf);
        let label = flatten_label(&[parent.as_str(), leaf.as_str()], " - ");
        prop_assert_eq!(&label, &format!("{parent} - {leaf}"));

        let columns = vec![ColumnLabel::new(1, label), ColumnLabel::new(2, "0")];
        let found = resolver::resolve(&leaf, &columns, MatchMode::Suffix);
        prop_assert_eq!(found.found().map(|c| c.index), Some(1));
    }

    #[test]
    fn exact_match_is_never_ambiguous(name in arb_word(), prefixes in prop::collection::vec(arb_word(), 1..5)) {
        let mut columns: Vec<ColumnLabel> = prefixes
            .iter()
            .enumerate()
            .map(|(i, p)| ColumnLabel::new(i + 1, format!("{p} - {name}")))
            .collect();
        let exact_index = columns.len() + 1;
        columns.push(ColumnLabel::new(exact_index, name.clone()));

        for mode in [MatchMode::Exact, MatchMode::Suffix, MatchMode::Contains] {
            let resolution = resolver::resolve(&name, &columns, mode);
            prop_assert_eq!(resolution.found().map(|c| c.index), Some(exact_index));
        }
    }

    #[test]
    fn rewriting_a_shrunk_table_is_stable(
        rows in prop::collection::vec(prop::collection::vec(0i64..1000, 2), 1..15),
        keep in prop::collection::vec(any::<bool>(), 15),
    ) {
        let book = numeric_book(&rows);
        let dir = MemoryDirectory::new().with_instance(1, vec![book.clone()]);
        let (mut session, mut table) = Session::open(&dir, "p.xlsx", None, &Settings::default()).unwrap();

        let mut flags = keep.into_iter();
        table.retain(|_| flags.next().unwrap_or(true));

        session.writer().write_table(&table).unwrap();
        let once = book.sheet_values("Data");
        let region = session.region();
        session.writer().write_table(&table).unwrap();

        prop_assert_eq!(book.sheet_values("Data"), once.clone());
        prop_assert_eq!(session.region(), region);
        prop_assert_eq!(once.len(), 1 + table.len());
    }
}
