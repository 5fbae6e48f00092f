// Event schema checks.
//
// Two passes over the same JSON tree. The strict pass collects errors:
// missing or mistyped fields, unknown event kinds, items that are not
// objects. The loose pass collects warnings for fields the schema does not
// know about. Errors end the session; warnings are only logged. Every issue
// carries the JSON path it was found at.

use std::fmt;

use serde_json::{Map, Value};

use super::{DomainEvent, EventKind};
use crate::error::Error;

/// Fields an event item may carry besides `key`.
const ITEM_STRING_FIELDS: &[&str] = &[
    "unit",
    "uri",
    "handling",
    "level",
    "name",
    "displayvalue",
    "haId",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One schema finding, located by JSON path (`$.data.items[2].key`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    pub path: String,
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Findings of both passes.
#[derive(Debug, Default)]
pub struct Report {
    pub errors: Vec<SchemaIssue>,
    pub warnings: Vec<SchemaIssue>,
}

impl Report {
    fn error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(SchemaIssue {
            path: path.to_owned(),
            message: message.into(),
            severity: Severity::Error,
        });
    }

    fn warn(&mut self, path: &str, message: impl Into<String>) {
        self.warnings.push(SchemaIssue {
            path: path.to_owned(),
            message: message.into(),
            severity: Severity::Warning,
        });
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run both passes over an assembled event.
pub fn check(event: &Value) -> Report {
    let mut report = Report::default();

    let Some(object) = event.as_object() else {
        report.error("$", format!("expected object, found {}", kind_of(event)));
        return report;
    };

    let kind = match object.get("event") {
        None => {
            report.error("$.event", "missing required field");
            None
        }
        Some(Value::String(name)) => {
            let kind = EventKind::from_wire(name);
            if kind.is_none() {
                report.error("$.event", format!("unknown event type {name:?}"));
            }
            kind
        }
        Some(other) => {
            report.error("$.event", format!("expected string, found {}", kind_of(other)));
            None
        }
    };

    match object.get("id") {
        None => {
            if kind.is_some_and(EventKind::requires_id) {
                report.error("$.id", "missing appliance identifier");
            }
        }
        Some(Value::String(id)) if id.is_empty() => report.error("$.id", "empty appliance identifier"),
        Some(Value::String(_)) => {}
        Some(other) => report.error("$.id", format!("expected string, found {}", kind_of(other))),
    }

    match object.get("data") {
        None | Some(Value::Null) => {
            if kind.is_some_and(EventKind::requires_data) {
                report.error("$.data", "missing required payload");
            }
        }
        Some(data) => check_data(data, &mut report),
    }

    for key in object.keys() {
        if !matches!(key.as_str(), "id" | "event" | "data") {
            report.warn(&format!("$.{key}"), "unexpected field");
        }
    }

    report
}

fn check_data(data: &Value, report: &mut Report) {
    let Some(object) = data.as_object() else {
        report.error("$.data", format!("expected object, found {}", kind_of(data)));
        return;
    };

    match object.get("items") {
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                check_item(item, &format!("$.data.items[{i}]"), report);
            }
            for key in object.keys().filter(|k| k.as_str() != "items") {
                report.warn(&format!("$.data.{key}"), "unexpected field");
            }
        }
        Some(other) => {
            report.error(
                "$.data.items",
                format!("expected array, found {}", kind_of(other)),
            );
        }
        None => check_item(data, "$.data", report),
    }
}

fn check_item(item: &Value, path: &str, report: &mut Report) {
    let Some(object) = item.as_object() else {
        report.error(path, format!("expected object, found {}", kind_of(item)));
        return;
    };

    match object.get("key") {
        Some(Value::String(key)) if !key.is_empty() => {}
        Some(Value::String(_)) => report.error(&format!("{path}.key"), "empty key"),
        Some(other) => report.error(
            &format!("{path}.key"),
            format!("expected string, found {}", kind_of(other)),
        ),
        None => report.error(&format!("{path}.key"), "missing required field"),
    }

    if let Some(ts) = object.get("timestamp").filter(|v| !v.is_null()) {
        if ts.as_i64().is_none() {
            report.error(
                &format!("{path}.timestamp"),
                format!("expected integer, found {}", kind_of(ts)),
            );
        }
    }

    for field in ITEM_STRING_FIELDS {
        let mistyped = object
            .get(*field)
            .filter(|v| !v.is_null() && !v.is_string());
        if let Some(value) = mistyped {
            report.error(
                &format!("{path}.{field}"),
                format!("expected string, found {}", kind_of(value)),
            );
        }
    }

    warn_extra_item_fields(object, path, report);
}

fn warn_extra_item_fields(object: &Map<String, Value>, path: &str, report: &mut Report) {
    for key in object.keys() {
        let known = matches!(key.as_str(), "key" | "value" | "timestamp")
            || ITEM_STRING_FIELDS.contains(&key.as_str());
        if !known {
            report.warn(&format!("{path}.{key}"), "unexpected field");
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate and convert. On failure the error keeps the full issue list
/// and the event that failed.
pub fn validate(event: Value) -> Result<(DomainEvent, Vec<SchemaIssue>), Error> {
    let report = check(&event);
    if !report.is_valid() {
        return Err(Error::Validation {
            issues: report.errors,
            event,
        });
    }

    match serde_json::from_value::<DomainEvent>(event.clone()) {
        Ok(parsed) => Ok((parsed, report.warnings)),
        Err(e) => Err(Error::Validation {
            issues: vec![SchemaIssue {
                path: "$".into(),
                message: e.to_string(),
                severity: Severity::Error,
            }],
            event,
        }),
    }
}
