//! Destination templating.
//!
//! A destination may reference payload fields with `{{ .field }}`
//! placeholders, e.g. `http://127.0.0.1/process?id={{.id}}`. For each
//! subscriber of an event the payload is rendered into the destination text
//! and the result parsed again, so one payload can resolve to a different
//! concrete address per subscriber.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::HookError;
use crate::finite::Finite;
use crate::types::Destination;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// An event payload captured as a JSON document.
///
/// Capture happens once per dispatch. A payload that cannot be represented as
/// JSON is remembered as an error and reported by every subscriber that
/// actually needs the document.
#[derive(Debug, Clone)]
pub struct Document(Result<Arc<Value>, HookError>);

impl Document {
    pub fn capture<T: Serialize + ?Sized>(payload: &T) -> Self {
        let value = serde_json::to_value(Finite(payload))
            .map(Arc::new)
            .map_err(|err| HookError::PayloadNotSerializable {
                message: err.to_string(),
            });
        Self(value)
    }

    pub fn from_value(value: Value) -> Self {
        Self(Ok(Arc::new(value)))
    }

    pub fn value(&self) -> Result<&Value, HookError> {
        match &self.0 {
            Ok(value) => Ok(value.as_ref()),
            Err(err) => Err(err.clone()),
        }
    }
}

/// Renders the destination against `payload` and parses the result.
pub fn resolve_destination(
    payload: &Value,
    destination: &Destination,
) -> Result<Destination, HookError> {
    let rendered = render(destination.template(), payload)?;
    Destination::parse(&rendered)
}

/// Substitutes every `{{ path }}` placeholder of `template` with the matching
/// field of `payload`.
///
/// A missing field is an error, never an empty string.
pub fn render(template: &str, payload: &Value) -> Result<String, HookError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            return Err(HookError::InvalidTemplate {
                template: template.to_string(),
                message: "unclosed placeholder".to_string(),
            });
        };

        let expression = after_open[..end].trim();
        let value = lookup(template, expression, payload)?;
        push_value(&mut out, value);

        rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

fn lookup<'a>(template: &str, expression: &str, payload: &'a Value) -> Result<&'a Value, HookError> {
    if expression.is_empty() {
        return Err(HookError::InvalidTemplate {
            template: template.to_string(),
            message: "empty placeholder".to_string(),
        });
    }
    if expression == "." {
        return Ok(payload);
    }

    let path = expression.strip_prefix('.').unwrap_or(expression);
    let mut current = payload;

    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(HookError::InvalidTemplate {
                template: template.to_string(),
                message: format!("bad field path {expression:?}"),
            });
        }

        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };

        current = next.ok_or_else(|| HookError::UnresolvedPlaceholder {
            placeholder: expression.to_string(),
            message: format!("no entry for {segment:?} in {}", kind(current)),
        })?;
    }

    Ok(current)
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        other => out.push_str(&other.to_string()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn resolves_field_into_query() {
        let dest = Destination::parse("http://127.0.0.1/process?id={{.id}}").unwrap();
        let resolved = resolve_destination(&json!({"id": "12345"}), &dest).unwrap();

        assert_eq!(resolved.as_str(), "http://127.0.0.1/process?id=12345");
    }

    #[test]
    fn resolves_fields_in_path_and_nested_objects() {
        let dest = Destination::parse("http://hooks.local/{{ .kind }}/{{.meta.status}}?n={{.items.1}}").unwrap();
        let payload = json!({"kind": "build", "meta": {"status": "done"}, "items": [1, 2]});

        let resolved = resolve_destination(&payload, &dest).unwrap();

        assert_eq!(resolved.as_str(), "http://hooks.local/build/done?n=2");
    }

    #[test]
    fn missing_field_is_unresolved() {
        let dest = Destination::parse("http://127.0.0.1/process?id={{.missing}}").unwrap();
        let err = resolve_destination(&json!({"id": "12345"}), &dest).unwrap_err();

        assert!(matches!(err, HookError::UnresolvedPlaceholder { ref placeholder, .. } if placeholder == ".missing"));
    }

    #[test]
    fn field_of_scalar_payload_is_unresolved() {
        let err = render("http://x/{{.id}}", &json!("message")).unwrap_err();
        assert!(matches!(err, HookError::UnresolvedPlaceholder { .. }));
    }

    #[test]
    fn template_without_placeholders_is_unchanged() {
        assert_eq!(render("http://localhost:8080", &json!("message")).unwrap(), "http://localhost:8080");
    }

    #[test]
    fn scalars_render_as_json_text() {
        let payload = json!({"n": 7, "ok": true, "none": null});
        assert_eq!(render("{{.n}}-{{.ok}}-{{.none}}", &payload).unwrap(), "7-true-");
        assert_eq!(render("{{.}}", &json!("all")).unwrap(), "all");
    }

    #[test]
    fn unclosed_placeholder_is_invalid() {
        let err = render("http://x/{{.id", &json!({"id": 1})).unwrap_err();
        assert!(matches!(err, HookError::InvalidTemplate { .. }));

        let err = render("http://x/{{ }}", &json!({"id": 1})).unwrap_err();
        assert!(matches!(err, HookError::InvalidTemplate { .. }));
    }

    #[test]
    fn capture_reports_unserializable_payload() {
        struct Handle;

        impl Serialize for Handle {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(S::Error::custom("live handle"))
            }
        }

        let err = Document::capture(&Handle).value().unwrap_err();
        assert!(matches!(err, HookError::PayloadNotSerializable { .. }));

        let mut tuple_keys = HashMap::new();
        tuple_keys.insert((1, 2), "v");
        assert!(Document::capture(&tuple_keys).value().is_err());
    }

    #[test]
    fn capture_rejects_non_finite_numbers() {
        let ratio = HashMap::from([("ratio", f64::NAN)]);
        let err = Document::capture(&ratio).value().unwrap_err();
        assert!(matches!(err, HookError::PayloadNotSerializable { .. }));

        assert!(Document::capture(&vec![1.0_f32, f32::INFINITY]).value().is_err());

        let finite = HashMap::from([("ratio", 0.25)]);
        assert_eq!(Document::capture(&finite).value().unwrap(), &json!({"ratio": 0.25}));
    }
}
