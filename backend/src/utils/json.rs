use serde_json::Value;

/// Reads an Airtable cell as display text. Lookup and link fields arrive as arrays,
/// in which case the first non-empty element wins.
pub fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(|item| field_text(Some(item))),
        Value::Null | Value::Bool(_) | Value::Object(_) => None,
    }
}

/// Splits a long-text cell into its non-blank lines.
pub fn field_lines(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| field_text(Some(item)))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{field_lines, field_text};

    #[test]
    fn reads_plain_and_lookup_cells() {
        assert_eq!(field_text(Some(&json!(" SWI001 "))).as_deref(), Some("SWI001"));
        assert_eq!(field_text(Some(&json!(["", "Acme"]))).as_deref(), Some("Acme"));
        assert_eq!(field_text(Some(&json!(42))).as_deref(), Some("42"));
        assert_eq!(field_text(Some(&json!("   "))), None);
        assert_eq!(field_text(None), None);
    }

    #[test]
    fn splits_question_lines_in_order() {
        let cell = json!("Check hull\n\n  Inspect hatch seals \nTest beacon");
        assert_eq!(
            field_lines(Some(&cell)),
            vec!["Check hull", "Inspect hatch seals", "Test beacon"]
        );
    }
}
