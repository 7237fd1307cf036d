use serde_json::Value;

/// Print just the key answer value from the output.
///
/// Looks up well-known result paths in order of priority, then falls back
/// to the first field in the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    // DSCR for an appraisal, first payment for a schedule
    let priority_paths = [
        "/metrics/dscr",
        "/rows/0/payment",
        "/prompt",
        "/financials/loan_amount",
    ];

    if let Value::Object(map) = result_obj {
        for path in &priority_paths {
            if let Some(val) = result_obj.pointer(path) {
                if !val.is_null() {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
