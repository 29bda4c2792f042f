use crate::document::Document;
use crate::error::ArborError;
use crate::node::{ContainerKind, NodeId, NodeKind, Scalar};
use crate::stream::LoadSettings;
use crate::token::{Token, TokenBuffer, TokenBufferReader};
use serde_json::{Map, Number, Value};

/// Encodes the subtree at `id` as its JSON-serialized token stream.
/// Non-finite floats have no JSON form and are rejected.
pub fn encode(doc: &Document, id: NodeId) -> Result<String, ArborError> {
    Ok(serde_json::to_string(&encodable_tokens(doc, id)?)?)
}

pub fn encode_pretty(doc: &Document, id: NodeId) -> Result<String, ArborError> {
    Ok(serde_json::to_string_pretty(&encodable_tokens(doc, id)?)?)
}

fn encodable_tokens(doc: &Document, id: NodeId) -> Result<TokenBuffer, ArborError> {
    let mut buffer = TokenBuffer::new();
    doc.write_to(id, &mut buffer)?;
    let non_finite = buffer.tokens().iter().find_map(|token| match token {
        Token::Value(Scalar::Float(f)) if !f.is_finite() => Some(*f),
        _ => None,
    });
    if let Some(f) = non_finite {
        return Err(ArborError::InvalidOperation(format!(
            "cannot encode non-finite float {f}"
        )));
    }
    Ok(buffer)
}

/// Decodes a token stream produced by [`encode`] into a new root of `doc`.
pub fn decode(doc: &mut Document, data: &str, settings: Option<&LoadSettings>) -> Result<NodeId, ArborError> {
    let tokens: Vec<Token> = serde_json::from_str(data)?;
    let mut reader = TokenBufferReader::new(&tokens);
    doc.load(&mut reader, settings)
}

/// Builds a tree from a JSON value. Object key order is preserved.
pub fn from_json_value(doc: &mut Document, value: &Value) -> Result<NodeId, ArborError> {
    Ok(match value {
        Value::Null => doc.create_scalar(Scalar::Null),
        Value::Bool(b) => doc.create_scalar(*b),
        Value::Number(n) => doc.create_scalar(number_scalar(n)),
        Value::String(s) => doc.create_scalar(s.as_str()),
        Value::Array(items) => {
            let array = doc.create_array();
            for item in items {
                let child = from_json_value(doc, item)?;
                doc.add(array, child)?;
            }
            array
        }
        Value::Object(map) => {
            let object = doc.create_object();
            for (key, item) in map {
                let child = from_json_value(doc, item)?;
                doc.set_property(object, key, child)?;
            }
            object
        }
    })
}

pub fn from_json_str(doc: &mut Document, data: &str) -> Result<NodeId, ArborError> {
    let value: Value = serde_json::from_str(data)?;
    from_json_value(doc, &value)
}

fn number_scalar(n: &Number) -> Scalar {
    match n.as_i64() {
        Some(i) => Scalar::Integer(i),
        None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
    }
}

/// Converts the subtree at `id` to a JSON value.
///
/// Constructors, comments, raw text and non-finite floats have no JSON
/// value form and are rejected.
pub fn to_json_value(doc: &Document, id: NodeId) -> Result<Value, ArborError> {
    let node = doc.node(id)?;
    match &node.kind {
        NodeKind::Scalar(s) => scalar_value(s),
        NodeKind::Property { value, .. } => to_json_value(doc, *value),
        NodeKind::Container(c) => match &c.kind {
            ContainerKind::Array => {
                let mut items = Vec::with_capacity(c.len());
                for child in &c.children {
                    items.push(to_json_value(doc, *child)?);
                }
                Ok(Value::Array(items))
            }
            ContainerKind::Object => {
                let mut map = Map::new();
                for child in &c.children {
                    let key = doc.key_of(*child)?.to_string();
                    map.insert(key, to_json_value(doc, doc.value_of(*child)?)?);
                }
                Ok(Value::Object(map))
            }
            ContainerKind::Constructor { name } => Err(ArborError::InvalidOperation(format!(
                "constructor {name} has no JSON value form"
            ))),
        },
        other => Err(ArborError::InvalidOperation(format!(
            "{} has no JSON value form",
            crate::document::kind_type(other)
        ))),
    }
}

fn scalar_value(s: &Scalar) -> Result<Value, ArborError> {
    Ok(match s {
        Scalar::Null | Scalar::Undefined => Value::Null,
        Scalar::Boolean(b) => Value::Bool(*b),
        Scalar::Integer(i) => Value::from(*i),
        Scalar::Float(f) => Number::from_f64(*f).map(Value::Number).ok_or_else(|| {
            ArborError::InvalidOperation(format!("{f} has no JSON value form"))
        })?,
        Scalar::String(v) => Value::String(v.clone()),
        Scalar::Date(d) => Value::String(d.to_rfc3339()),
        Scalar::Bytes(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        Scalar::Guid(g) => Value::String(g.hyphenated().to_string()),
    })
}
