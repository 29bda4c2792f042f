use arbor::{ArborError, Document, Scalar, codec};
use chrono::DateTime;
use serde_json::json;
use uuid::Uuid;

#[test]
fn json_round_trip_preserves_key_order() -> Result<(), Box<dyn std::error::Error>> {
    let text = r#"{"b":1,"a":[true,null,1.5,"x"],"nested":{"z":{},"y":[]}}"#;
    let mut doc = Document::new();
    let root = codec::from_json_str(&mut doc, text)?;

    let value = codec::to_json_value(&doc, root)?;
    assert_eq!(serde_json::to_string(&value)?, text);
    Ok(())
}

#[test]
fn token_stream_round_trip_keeps_rich_scalars() -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::new();
    let root = doc.create_object();
    let when = DateTime::parse_from_rfc3339("2024-05-01T12:30:00+02:00")?;
    doc.set_property(root, "when", when)?;
    doc.set_property(root, "id", Uuid::new_v4())?;
    doc.set_property(root, "blob", Scalar::Bytes(vec![0, 1, 254]))?;
    doc.set_property(root, "missing", Scalar::Undefined)?;
    let ctor = doc.create_constructor_with("Point", vec![1i64, 2])?;
    doc.set_property(root, "origin", ctor)?;

    let encoded = codec::encode(&doc, root)?;
    let mut copy = Document::new();
    let decoded = codec::decode(&mut copy, &encoded, None)?;

    assert!(doc.deep_equals_in(root, &copy, decoded));
    assert_eq!(doc.deep_hash(root)?, copy.deep_hash(decoded)?);

    let pretty = codec::encode_pretty(&doc, root)?;
    let mut again = Document::new();
    let decoded = codec::decode(&mut again, &pretty, None)?;
    assert!(doc.deep_equals_in(root, &again, decoded));
    Ok(())
}

#[test]
fn encoded_tokens_are_tagged() -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::new();
    let root = doc.create_object();
    doc.set_property(root, "a", "b")?;

    let encoded: serde_json::Value = serde_json::from_str(&codec::encode(&doc, root)?)?;
    let tokens = encoded.as_array().ok_or("expected a token array")?;
    assert_eq!(tokens.len(), 4);
    assert_eq!(tokens[0], json!({"token": "start_object"}));
    assert_eq!(tokens[1], json!({"token": "property_name", "value": "a"}));
    assert_eq!(tokens[3], json!({"token": "end_object"}));
    Ok(())
}

#[test]
fn values_without_a_json_form_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::new();

    let ctor = doc.create_constructor("Date")?;
    assert!(matches!(
        codec::to_json_value(&doc, ctor),
        Err(ArborError::InvalidOperation(_))
    ));

    let nan = doc.create_scalar(f64::NAN);
    assert!(matches!(
        codec::to_json_value(&doc, nan),
        Err(ArborError::InvalidOperation(_))
    ));

    let comment = doc.create_comment("note");
    assert!(matches!(
        codec::to_json_value(&doc, comment),
        Err(ArborError::InvalidOperation(_))
    ));

    let undefined = doc.create_scalar(Scalar::Undefined);
    assert_eq!(codec::to_json_value(&doc, undefined)?, json!(null));
    Ok(())
}

#[test]
fn malformed_input_is_an_encoding_error() {
    let mut doc = Document::new();
    assert!(matches!(
        codec::decode(&mut doc, "[{\"token\": \"nope\"}]", None),
        Err(ArborError::Serde(_))
    ));
    assert!(matches!(
        codec::from_json_str(&mut doc, "{"),
        Err(ArborError::Serde(_))
    ));
}

#[test]
fn non_finite_floats_are_not_encoded() -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::new();
    let array = doc.create_array_with(vec![f64::NAN, f64::INFINITY])?;

    assert!(matches!(
        codec::encode(&doc, array),
        Err(ArborError::InvalidOperation(_))
    ));
    assert!(matches!(
        codec::encode_pretty(&doc, array),
        Err(ArborError::InvalidOperation(_))
    ));

    let finite = doc.create_array_with(vec![1.5, -0.0])?;
    let encoded = codec::encode(&doc, finite)?;
    let mut copy = Document::new();
    let decoded = codec::decode(&mut copy, &encoded, None)?;
    assert!(doc.deep_equals_in(finite, &copy, decoded));
    Ok(())
}
