//! formatting prints out materialized rows nicely.

use itertools::Itertools;

use crate::materialize::Row;

/// Formats rows as a text table, one line per row, under a header of column names.
/// In the future, also csv output, etc.
pub fn format_rows(column_names: &[String], rows: &[Row]) -> String {
    let mut out = format!(
        "   | {} |\n",
        column_names.iter().map(|x| format!("{:15}", x)).join(" | ")
    );
    for (i, row) in rows.iter().enumerate() {
        out.push_str(&format!(
            "{:2} | {} |\n",
            i + 1,
            row.items.iter().map(|x| format!("{:15}", x)).join(" | ")
        ));
    }
    out
}

pub fn print_rows(column_names: &[String], rows: &[Row]) {
    print!("{}", format_rows(column_names, rows));
}

#[test]
fn test_format_rows() {
    use crate::materialize::Datum;
    use crate::sql_value::SqlValue;
    let rows = vec![
        Row {
            items: vec![Datum::Int64(1), Datum::Object(SqlValue::Text("north".to_string()))],
        },
        Row {
            items: vec![Datum::Int64(2), Datum::Object(SqlValue::Null())],
        },
    ];
    let out = format_rows(&["id".to_string(), "region".to_string()], &rows);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], format!("   | {:15} | {:15} |", "id", "region"));
    assert_eq!(lines[1], format!(" 1 | {:15} | {:15} |", 1, "north"));
    assert_eq!(lines[2], format!(" 2 | {:15} | {:15} |", 2, "NULL"));
}
