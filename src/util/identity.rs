use serde_json::Value;

/// Extract a person's name from an Azure DevOps identity reference.
///
/// Identity fields arrive either as a plain string or as an object carrying
/// `displayName` and `uniqueName`.
pub fn display_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj
            .get("displayName")
            .or_else(|| obj.get("uniqueName"))
            .and_then(|v| v.as_str())
            .map(String::from),
        _ => None,
    }
}

/// Render a scalar JSON value as text. Ids come back as numbers.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
