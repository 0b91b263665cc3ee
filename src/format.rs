//! turns assistant reply payloads into display text.
//!
//! payloads are untyped json. `classify` picks exactly one shape, checked in
//! this order (first match wins):
//!
//! 1. `error` present                 -> [`ReplyShape::Error`]
//! 2. `reply == "forbidden"`          -> [`ReplyShape::Forbidden`]
//! 3. `message` present               -> [`ReplyShape::Message`]
//! 4. `reply` is an array             -> [`ReplyShape::Records`] / [`ReplyShape::NoRecords`]
//! 5. `action` present                -> [`ReplyShape::Action`]
//! 6. anything else                   -> [`ReplyShape::Raw`]
//!
//! "present" follows the backend's loose truthiness: `null`, `false`, `0` and
//! `""` count as absent.

use serde_json::Value;

pub const NO_RECORDS: &str = "No records found.";
pub const FORBIDDEN: &str = "Sorry, you don't have permission to do that.";

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReplyShape<'a> {
    Error(&'a Value),
    Forbidden { reason: Option<&'a Value> },
    Message(&'a Value),
    Records(&'a [Value]),
    NoRecords { message: Option<&'a Value> },
    Action(&'a Value),
    Raw(&'a Value),
}

pub fn classify(payload: &Value) -> ReplyShape<'_> {
    if let Some(error) = present(payload, "error") {
        return ReplyShape::Error(error);
    }
    if payload.get("reply").and_then(Value::as_str) == Some("forbidden") {
        return ReplyShape::Forbidden { reason: present(payload, "reason") };
    }
    if let Some(message) = present(payload, "message") {
        return ReplyShape::Message(message);
    }
    if let Some(records) = payload.get("reply").and_then(Value::as_array) {
        if records.is_empty() {
            return ReplyShape::NoRecords { message: present(payload, "message") };
        }
        return ReplyShape::Records(records);
    }
    if let Some(action) = present(payload, "action") {
        return ReplyShape::Action(action);
    }
    ReplyShape::Raw(payload)
}

pub fn render(shape: &ReplyShape<'_>) -> String {
    match shape {
        ReplyShape::Error(error) => format!("Error: {}", display_value(error)),
        ReplyShape::Forbidden { reason: Some(reason) } => {
            format!("{FORBIDDEN} {}", display_value(reason))
        }
        ReplyShape::Forbidden { reason: None } => FORBIDDEN.to_string(),
        ReplyShape::Message(message) => display_value(message),
        ReplyShape::NoRecords { message: Some(message) } => display_value(message),
        ReplyShape::NoRecords { message: None } => NO_RECORDS.to_string(),
        ReplyShape::Records(records) => render_records(records),
        ReplyShape::Action(action) => format!("Action completed: {}", display_value(action)),
        ReplyShape::Raw(payload) => {
            serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
        }
    }
}

/// total: every json value yields some text.
pub fn format_reply(payload: &Value) -> String {
    render(&classify(payload))
}

fn present<'a>(payload: &'a Value, key: &str) -> Option<&'a Value> {
    payload.get(key).filter(|v| truthy(v))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// strings verbatim, whole floats without a trailing `.0`, everything else as
/// compact json.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

// internal identifiers never reach the user
fn is_internal_id(key: &str) -> bool {
    key == "id" || key.ends_with("_id")
}

fn render_records(records: &[Value]) -> String {
    records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let details = match record {
                Value::Object(fields) => fields
                    .iter()
                    .filter(|(key, _)| !is_internal_id(key))
                    .map(|(key, value)| format!("{}: {}", key.replace('_', " "), display_value(value)))
                    .collect::<Vec<_>>()
                    .join("\n"),
                other => display_value(other),
            };
            format!("{}.\n{}", idx + 1, details)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn error_wins_over_action() {
        let out = format_reply(&json!({ "error": "x", "action": "y" }));
        assert_eq!(out, "Error: x");
    }

    #[test]
    fn error_wins_over_forbidden_and_message() {
        let payload = json!({ "error": "db down", "reply": "forbidden", "message": "hi" });
        assert!(matches!(classify(&payload), ReplyShape::Error(_)));
    }

    #[test]
    fn forbidden_with_and_without_reason() {
        assert_eq!(
            format_reply(&json!({ "reply": "forbidden", "reason": "employee cannot approve_leaves" })),
            "Sorry, you don't have permission to do that. employee cannot approve_leaves"
        );
        assert_eq!(format_reply(&json!({ "reply": "forbidden" })), FORBIDDEN);
    }

    #[test]
    fn message_is_returned_verbatim() {
        let payload = json!({ "action": "assign_task", "reply": [{ "ok": true }], "message": "Assigned 'x' to a@b.c" });
        assert_eq!(format_reply(&payload), "Assigned 'x' to a@b.c");
    }

    #[test]
    fn records_hide_identifiers_and_are_numbered() {
        let payload = json!({ "reply": [{ "id": 1, "emp_id": 2, "name": "Ana", "status": "ok" }] });
        let out = format_reply(&payload);
        assert_eq!(out, "1.\nname: Ana\nstatus: ok");
        assert!(!out.contains("id"));
    }

    #[test]
    fn records_keep_backend_key_order_and_replace_underscores() {
        let payload = json!({
            "sql": "select ...",
            "reply": [
                { "title": "Ship it", "assigned_to": "u1", "assigned_to_name": "Ana Lima", "team_id": "t" },
                { "title": "Review", "due_date": null, "hours": 2.5 }
            ]
        });
        assert_eq!(
            format_reply(&payload),
            "1.\ntitle: Ship it\nassigned to: u1\nassigned to name: Ana Lima\n\n2.\ntitle: Review\ndue date: null\nhours: 2.5"
        );
    }

    #[test]
    fn whole_floats_print_without_fraction() {
        let payload = json!({ "reply": [{ "days": 2.0, "rating": 4.5, "count": 3, "delta": -1.0 }] });
        assert_eq!(format_reply(&payload), "1.\ndays: 2\nrating: 4.5\ncount: 3\ndelta: -1");
        assert_eq!(format_reply(&json!({ "action": 7.0 })), "Action completed: 7");
    }

    #[test]
    fn non_object_records_render_as_values() {
        assert_eq!(format_reply(&json!({ "reply": ["a", 3] })), "1.\na\n\n2.\n3");
    }

    #[test]
    fn empty_records() {
        assert_eq!(format_reply(&json!({ "reply": [], "message": "none" })), "none");
        assert_eq!(format_reply(&json!({ "reply": [] })), NO_RECORDS);
        assert_eq!(format_reply(&json!({ "reply": [], "message": "" })), NO_RECORDS);
    }

    #[test]
    fn action_completion() {
        assert_eq!(
            format_reply(&json!({ "action": "approve_leave", "reply": null })),
            "Action completed: approve_leave"
        );
    }

    #[test]
    fn falsy_fields_are_absent() {
        let payload = json!({ "error": "", "message": null, "action": 0, "status": "ok" });
        assert!(matches!(classify(&payload), ReplyShape::Raw(_)));
    }

    #[test]
    fn unknown_shapes_fall_back_to_pretty_json() {
        assert_eq!(format_reply(&json!({ "status": "ok" })), "{\n  \"status\": \"ok\"\n}");
        assert_eq!(format_reply(&json!("plain")), "\"plain\"");
        assert_eq!(format_reply(&json!(null)), "null");
        assert_eq!(format_reply(&json!([1, 2])), "[\n  1,\n  2\n]");
    }

    #[test]
    fn formatting_is_idempotent() {
        let payload = json!({ "reply": [{ "id": 9, "name": "Bo" }], "sql": "q" });
        assert_eq!(format_reply(&payload), format_reply(&payload));
    }
}
