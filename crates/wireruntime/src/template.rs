use wirecore::{RunContext, Value};

/// One segment of a tokenized template string: literal text, or a
/// `{{Title.field}}` reference to an upstream node's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Reference { title: String, field: String },
}

/// Tokenize a raw config string into an ordered literal/reference
/// sequence in one left-to-right pass. Placeholders are case-sensitive,
/// not nestable, and have no escaping mechanism; malformed or unclosed
/// braces stay literal text.
pub fn tokenize(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = raw;

    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let inner = &after[..close];
                match parse_reference(inner) {
                    Some((title, field)) => {
                        literal.push_str(&rest[..open]);
                        if !literal.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                        }
                        segments.push(Segment::Reference {
                            title: title.to_string(),
                            field: field.to_string(),
                        });
                    }
                    None => {
                        // Not a Title.field reference; keep the braces verbatim.
                        literal.push_str(&rest[..open + 2 + close + 2]);
                    }
                }
                rest = &after[close + 2..];
            }
            None => {
                literal.push_str(rest);
                rest = "";
                break;
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Split `Title.field`. The first dot separates title from field; both
/// halves must be non-empty and brace-free. Titles may contain spaces
/// (they are authored display names), fields may not contain dots.
fn parse_reference(inner: &str) -> Option<(&str, &str)> {
    let inner = inner.trim();
    if inner.contains('{') || inner.contains('}') {
        return None;
    }
    let (title, field) = inner.split_once('.')?;
    if title.is_empty() || field.is_empty() || field.contains('.') {
        return None;
    }
    Some((title, field))
}

/// Resolve a raw config value against the run context.
///
/// Strings are tokenized and each reference replaced by
/// `outputs[title][field]`, or an empty string when the node has not
/// completed or lacks the field. A string that is exactly one
/// placeholder returns the referenced value with its type preserved;
/// any surrounding literal text forces textual concatenation. Arrays
/// and objects are resolved element-wise; other values pass through
/// unchanged.
pub fn resolve_template(raw: &Value, ctx: &RunContext) -> Value {
    match raw {
        Value::String(s) => resolve_string(s, ctx),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_template(v, ctx)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_template(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_string(raw: &str, ctx: &RunContext) -> Value {
    let segments = tokenize(raw);

    // Whole-value reference: preserve the original type.
    if let [Segment::Reference { title, field }] = segments.as_slice() {
        return ctx
            .lookup(title, field)
            .unwrap_or_else(|| Value::String(String::new()));
    }

    if segments
        .iter()
        .all(|s| matches!(s, Segment::Literal(_)))
    {
        return Value::String(raw.to_string());
    }

    let mut out = String::new();
    for segment in &segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Reference { title, field } => {
                if let Some(value) = ctx.lookup(title, field) {
                    out.push_str(&value.render());
                }
            }
        }
    }
    Value::String(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirecore::Fields;

    fn ctx_with(title: &str, field: &str, value: Value) -> RunContext {
        let ctx = RunContext::new(Fields::new());
        let mut fields = Fields::new();
        fields.insert(field.to_string(), value);
        ctx.record(title, fields).unwrap();
        ctx
    }

    #[test]
    fn tokenize_single_pass_order() {
        let segments = tokenize("a {{A.x}} b {{B.y}}");
        assert_eq!(
            segments,
            vec![
                Segment::Literal("a ".to_string()),
                Segment::Reference {
                    title: "A".to_string(),
                    field: "x".to_string()
                },
                Segment::Literal(" b ".to_string()),
                Segment::Reference {
                    title: "B".to_string(),
                    field: "y".to_string()
                },
            ]
        );
    }

    #[test]
    fn malformed_placeholders_stay_literal() {
        assert_eq!(
            tokenize("{{notaref}} {{A.}} {{.x}}"),
            vec![Segment::Literal("{{notaref}} {{A.}} {{.x}}".to_string())]
        );
        assert_eq!(
            tokenize("unclosed {{A.x"),
            vec![Segment::Literal("unclosed {{A.x".to_string())]
        );
    }

    #[test]
    fn whole_placeholder_preserves_type() {
        let ctx = ctx_with("A", "x", Value::Number(5.0));
        assert_eq!(
            resolve_template(&Value::String("{{A.x}}".to_string()), &ctx),
            Value::Number(5.0)
        );

        let ctx = ctx_with("A", "flag", Value::Bool(true));
        assert_eq!(
            resolve_template(&Value::String("{{A.flag}}".to_string()), &ctx),
            Value::Bool(true)
        );

        let ctx = ctx_with(
            "A",
            "list",
            Value::Array(vec![Value::String("x".to_string())]),
        );
        assert_eq!(
            resolve_template(&Value::String("{{A.list}}".to_string()), &ctx),
            Value::Array(vec![Value::String("x".to_string())])
        );
    }

    #[test]
    fn mixed_text_concatenates() {
        let ctx = ctx_with("A", "x", Value::Number(5.0));
        assert_eq!(
            resolve_template(&Value::String("val={{A.x}}".to_string()), &ctx),
            Value::String("val=5".to_string())
        );
    }

    #[test]
    fn missing_reference_resolves_empty() {
        let ctx = ctx_with("A", "x", Value::Number(5.0));
        assert_eq!(
            resolve_template(&Value::String("{{A.missing}}".to_string()), &ctx),
            Value::String(String::new())
        );
        assert_eq!(
            resolve_template(&Value::String("v={{Nope.x}}".to_string()), &ctx),
            Value::String("v=".to_string())
        );
    }

    #[test]
    fn placeholder_free_values_pass_through() {
        let ctx = RunContext::new(Fields::new());
        assert_eq!(
            resolve_template(&Value::String("plain".to_string()), &ctx),
            Value::String("plain".to_string())
        );
        assert_eq!(
            resolve_template(&Value::Number(3.0), &ctx),
            Value::Number(3.0)
        );
    }

    #[test]
    fn titles_are_case_sensitive() {
        let ctx = ctx_with("ExtractCA", "firstAddress", Value::String("abc".to_string()));
        assert_eq!(
            resolve_template(&Value::String("{{extractca.firstAddress}}".to_string()), &ctx),
            Value::String(String::new())
        );
    }

    #[test]
    fn nested_config_values_resolve() {
        let ctx = ctx_with("A", "x", Value::String("inner".to_string()));
        let mut map = std::collections::HashMap::new();
        map.insert("k".to_string(), Value::String("{{A.x}}".to_string()));
        let resolved = resolve_template(&Value::Object(map), &ctx);
        match resolved {
            Value::Object(map) => {
                assert_eq!(map["k"], Value::String("inner".to_string()));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }
}
