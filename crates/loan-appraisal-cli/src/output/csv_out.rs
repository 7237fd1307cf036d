use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::str::FromStr;

use super::{flatten_fields, schedule_rows};

/// Schedule columns in export order; `due_date` only when the loan has one.
const SCHEDULE_COLUMNS: [&str; 7] = [
    "month",
    "due_date",
    "opening_balance",
    "principal",
    "interest",
    "payment",
    "closing_balance",
];

/// Columns summed into the trailing "total" row.
const SUMMED_COLUMNS: [&str; 3] = ["principal", "interest", "payment"];

/// Write output as CSV to stdout.
///
/// A result carrying a repayment schedule is written one row per month with
/// a closing totals row, ready to open in a spreadsheet. Anything else is
/// written as `field,value` pairs. An empty result is written as its
/// warnings so it cannot pass for an empty export.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    if let Err(e) = write_csv(&mut wtr, value).and_then(|_| wtr.flush().map_err(csv::Error::from)) {
        eprintln!("CSV write error: {}", e);
    }
}

fn write_csv<W: Write>(wtr: &mut csv::Writer<W>, value: &Value) -> csv::Result<()> {
    let result = value.get("result").unwrap_or(value);
    match (schedule_rows(result), result) {
        (Some(rows), _) => write_schedule(wtr, rows),
        (None, Value::Null) => write_warnings(wtr, value),
        (None, Value::Object(map)) => write_fields(wtr, map),
        (None, other) => wtr.write_record([format_csv_value(other)]),
    }
}

fn write_warnings<W: Write>(wtr: &mut csv::Writer<W>, envelope: &Value) -> csv::Result<()> {
    wtr.write_record(["warning"])?;
    let warnings = envelope
        .get("warnings")
        .and_then(Value::as_array)
        .filter(|w| !w.is_empty());
    match warnings {
        Some(warnings) => {
            for w in warnings {
                wtr.write_record([format_csv_value(w)])?;
            }
            Ok(())
        }
        None => wtr.write_record(["no result"]),
    }
}

fn write_schedule<W: Write>(wtr: &mut csv::Writer<W>, rows: &[Value]) -> csv::Result<()> {
    let has_dates = rows.iter().any(|r| r.get("due_date").is_some());
    let columns: Vec<&str> = SCHEDULE_COLUMNS
        .iter()
        .copied()
        .filter(|c| has_dates || *c != "due_date")
        .collect();
    wtr.write_record(&columns)?;

    let mut totals = [Decimal::ZERO; SUMMED_COLUMNS.len()];
    for row in rows {
        wtr.write_record(
            columns
                .iter()
                .map(|c| row.get(*c).map(format_csv_value).unwrap_or_default()),
        )?;
        for (total, column) in totals.iter_mut().zip(SUMMED_COLUMNS) {
            *total += row.get(column).and_then(as_decimal).unwrap_or_default();
        }
    }

    let total_row: Vec<String> = columns
        .iter()
        .map(|c| match SUMMED_COLUMNS.iter().position(|s| s == c) {
            Some(i) => totals[i].to_string(),
            None if *c == "month" => "total".to_string(),
            None => String::new(),
        })
        .collect();
    wtr.write_record(&total_row)
}

fn write_fields<W: Write>(wtr: &mut csv::Writer<W>, map: &Map<String, Value>) -> csv::Result<()> {
    wtr.write_record(["field", "value"])?;
    for (key, val) in flatten_fields(map) {
        wtr.write_record([key, format_csv_value(&val)])?;
    }
    Ok(())
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(format_csv_value).collect::<Vec<_>>().join("; "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(rows: &Value) -> String {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        write_schedule(&mut wtr, rows.as_array().unwrap()).unwrap();
        String::from_utf8(wtr.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_schedule_csv_has_totals_row() {
        let rows = json!([
            {"month": 1, "opening_balance": "100", "principal": "50", "interest": "1",
             "payment": "51", "closing_balance": "50"},
            {"month": 2, "opening_balance": "50", "principal": "50", "interest": "0.5",
             "payment": "50.5", "closing_balance": "0"}
        ]);
        let csv = render(&rows);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "month,opening_balance,principal,interest,payment,closing_balance"
        );
        assert_eq!(lines[1], "1,100,50,1,51,50");
        assert_eq!(lines[3], "total,,100,1.5,101.5,");
    }

    #[test]
    fn test_empty_result_writes_warnings() {
        let envelope = json!({
            "result": null,
            "warnings": ["Insufficient input: principal 0 and term 12 months must both be positive; no schedule produced"],
        });
        let mut wtr = csv::Writer::from_writer(Vec::new());
        write_csv(&mut wtr, &envelope).unwrap();
        let csv = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "warning");
        assert!(lines[1].contains("Insufficient input"));
    }

    #[test]
    fn test_due_date_column_when_present() {
        let rows = json!([
            {"month": 1, "due_date": "2024-02-15", "opening_balance": "10", "principal": "10",
             "interest": "0", "payment": "10", "closing_balance": "0"}
        ]);
        let csv = render(&rows);
        assert!(csv.starts_with("month,due_date,"));
        assert!(csv.contains("1,2024-02-15,10,10,0,10,0"));
    }
}
