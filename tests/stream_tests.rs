use arbor::stream::{CommentHandling, DuplicatePropertyNameHandling, LineInfoHandling};
use arbor::token::TokenBufferReader;
use arbor::{
    ArborError, CloneSettings, Document, LineInfo, LoadSettings, NodeType, Scalar, Token,
    TokenBuffer, codec,
};
use serde_json::json;

fn sample(doc: &mut Document) -> Result<arbor::NodeId, ArborError> {
    let root = doc.create_object();
    let items = doc.create_array_with(vec![1i64, 2])?;
    let note = doc.create_comment("second half");
    doc.add(items, note)?;
    doc.add(items, Scalar::Undefined)?;
    doc.set_property(root, "items", items)?;
    let ctor = doc.create_constructor_with("Point", vec![1.5, -2.0])?;
    doc.set_property(root, "origin", ctor)?;
    let raw = doc.create_raw("0x1F");
    doc.set_property(root, "raw", raw)?;
    Ok(root)
}

#[test]
fn write_then_load_reproduces_the_tree() -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::new();
    let root = sample(&mut doc)?;

    let mut buffer = TokenBuffer::new();
    doc.write_to(root, &mut buffer)?;
    assert_eq!(buffer.tokens().first(), Some(&Token::StartObject));
    assert_eq!(buffer.tokens().last(), Some(&Token::EndObject));

    let keep_comments = LoadSettings {
        comment_handling: CommentHandling::Load,
        ..LoadSettings::default()
    };
    let mut copy = Document::new();
    let loaded = copy.load(&mut buffer.reader(), Some(&keep_comments))?;
    assert!(doc.deep_equals_in(root, &copy, loaded));

    Ok(())
}

#[test]
fn comments_are_dropped_by_default() -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::new();
    let root = sample(&mut doc)?;
    let mut buffer = TokenBuffer::new();
    doc.write_to(root, &mut buffer)?;

    let mut copy = Document::new();
    let loaded = copy.load_object(&mut buffer.reader(), None)?;
    let items = copy.property_value(loaded, "items")?.ok_or("missing items")?;
    assert_eq!(copy.len(items)?, 3);
    assert!(!doc.deep_equals_in(root, &copy, loaded));

    Ok(())
}

#[test]
fn wrong_start_token_reports_position() -> Result<(), Box<dyn std::error::Error>> {
    let tokens = vec![Token::StartArray, Token::EndArray];
    let mut doc = Document::new();

    let err = doc
        .load_object(&mut TokenBufferReader::new(&tokens), None)
        .err()
        .ok_or("expected a format error")?;
    assert!(matches!(err, ArborError::Format { .. }));
    assert_eq!(
        err.line_info(),
        Some(LineInfo {
            line: 1,
            position: 1
        })
    );
    assert!(err.to_string().contains("Current reader item is not a object"));

    let array = doc.load_array(&mut TokenBufferReader::new(&tokens), None)?;
    assert_eq!(doc.node_type(array)?, NodeType::Array);

    assert!(matches!(
        doc.load_constructor(&mut TokenBufferReader::new(&tokens), None),
        Err(ArborError::Format { .. })
    ));

    Ok(())
}

#[test]
fn malformed_streams_are_format_errors() -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::new();

    let mismatched = vec![Token::StartArray, Token::EndObject];
    let err = doc
        .load(&mut TokenBufferReader::new(&mismatched), None)
        .err()
        .ok_or("mismatched end accepted")?;
    assert_eq!(err.line_info().map(|l| l.position), Some(2));

    let truncated = vec![Token::StartObject, Token::PropertyName("a".to_string())];
    assert!(matches!(
        doc.load(&mut TokenBufferReader::new(&truncated), None),
        Err(ArborError::Format { .. })
    ));

    let missing_value = vec![
        Token::StartObject,
        Token::PropertyName("a".to_string()),
        Token::EndObject,
    ];
    assert!(matches!(
        doc.load(&mut TokenBufferReader::new(&missing_value), None),
        Err(ArborError::Format { .. })
    ));

    let bare_value = vec![Token::StartObject, Token::Value(Scalar::Integer(1)), Token::EndObject];
    assert!(matches!(
        doc.load(&mut TokenBufferReader::new(&bare_value), None),
        Err(ArborError::Format { .. })
    ));

    assert!(matches!(
        doc.load(&mut TokenBufferReader::new(&[]), None),
        Err(ArborError::Format { .. })
    ));

    Ok(())
}

fn duplicated() -> Vec<Token> {
    vec![
        Token::StartObject,
        Token::PropertyName("a".to_string()),
        Token::Value(Scalar::Integer(1)),
        Token::PropertyName("b".to_string()),
        Token::Value(Scalar::Integer(2)),
        Token::PropertyName("a".to_string()),
        Token::StartArray,
        Token::Value(Scalar::Integer(3)),
        Token::EndArray,
        Token::EndObject,
    ]
}

fn with_duplicates(handling: DuplicatePropertyNameHandling) -> LoadSettings {
    LoadSettings {
        duplicate_property_name_handling: handling,
        ..LoadSettings::default()
    }
}

#[test]
fn duplicate_property_names() -> Result<(), Box<dyn std::error::Error>> {
    let tokens = duplicated();

    let mut doc = Document::new();
    let replaced = doc.load(
        &mut TokenBufferReader::new(&tokens),
        Some(&with_duplicates(DuplicatePropertyNameHandling::Replace)),
    )?;
    assert_eq!(
        codec::to_json_value(&doc, replaced)?,
        json!({"a": [3], "b": 2})
    );

    let mut doc = Document::new();
    let ignored = doc.load(
        &mut TokenBufferReader::new(&tokens),
        Some(&with_duplicates(DuplicatePropertyNameHandling::Ignore)),
    )?;
    assert_eq!(
        codec::to_json_value(&doc, ignored)?,
        json!({"a": 1, "b": 2})
    );
    // Dropped duplicates do not linger in the arena.
    assert_eq!(doc.node_count(), 5);

    let mut doc = Document::new();
    let err = doc
        .load(
            &mut TokenBufferReader::new(&tokens),
            Some(&with_duplicates(DuplicatePropertyNameHandling::Error)),
        )
        .err()
        .ok_or("duplicate accepted")?;
    assert!(matches!(err, ArborError::Format { .. }));
    assert_eq!(err.line_info().map(|l| l.position), Some(6));

    Ok(())
}

#[test]
fn line_info_follows_settings() -> Result<(), Box<dyn std::error::Error>> {
    let tokens = duplicated();

    let mut doc = Document::new();
    let root = doc.load(&mut TokenBufferReader::new(&tokens), None)?;
    let root_node = doc.get(root).ok_or("root missing")?;
    assert_eq!(root_node.line_info().map(|l| l.position), Some(1));
    let b = doc.property(root, "b")?.ok_or("b missing")?;
    let b_node = doc.get(b).ok_or("b missing")?;
    assert_eq!(b_node.line_info().map(|l| l.position), Some(4));

    let plain = doc.clone_node(root, None)?;
    assert_eq!(doc.get(plain).and_then(|n| n.line_info()), None);
    let kept = doc.clone_node(
        root,
        Some(&CloneSettings {
            copy_line_info: true,
        }),
    )?;
    assert_eq!(
        doc.get(kept).and_then(|n| n.line_info()).map(|l| l.position),
        Some(1)
    );

    let ignore = LoadSettings {
        line_info_handling: LineInfoHandling::Ignore,
        ..LoadSettings::default()
    };
    let mut doc = Document::new();
    let root = doc.load(&mut TokenBufferReader::new(&tokens), Some(&ignore))?;
    assert_eq!(doc.get(root).and_then(|n| n.line_info()), None);

    Ok(())
}

#[test]
fn load_leaves_a_scalar_reader_in_place() -> Result<(), Box<dyn std::error::Error>> {
    let tokens = vec![
        Token::Comment("header".to_string()),
        Token::Value(Scalar::from("text")),
    ];
    let mut doc = Document::new();
    let node = doc.load(&mut TokenBufferReader::new(&tokens), None)?;
    assert_eq!(doc.scalar(node)?.and_then(Scalar::as_str), Some("text"));

    let keep_comments = LoadSettings {
        comment_handling: CommentHandling::Load,
        ..LoadSettings::default()
    };
    let node = doc.load(&mut TokenBufferReader::new(&tokens), Some(&keep_comments))?;
    assert_eq!(doc.node_type(node)?, NodeType::Comment);

    Ok(())
}

#[test]
fn comments_never_become_property_values() -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::new();
    let root = doc.create_object();
    let note = doc.create_comment("note");

    assert!(matches!(
        doc.set_property(root, "a", note),
        Err(ArborError::InvalidArgument(_))
    ));
    assert_eq!(doc.len(root)?, 0);
    assert_eq!(doc.parent(note)?, None);

    let property = doc.set_property(root, "a", 1i64)?;
    assert!(matches!(
        doc.set_property_value(property, note),
        Err(ArborError::InvalidArgument(_))
    ));
    let value = doc.value_of(property)?;
    assert!(matches!(
        doc.replace_with(value, note),
        Err(ArborError::InvalidArgument(_))
    ));

    let mut buffer = TokenBuffer::new();
    doc.write_to(root, &mut buffer)?;
    for handling in [CommentHandling::Ignore, CommentHandling::Load] {
        let settings = LoadSettings {
            comment_handling: handling,
            ..LoadSettings::default()
        };
        let mut copy = Document::new();
        let loaded = copy.load(&mut buffer.reader(), Some(&settings))?;
        assert!(doc.deep_equals_in(root, &copy, loaded));
    }

    Ok(())
}

#[test]
fn comment_between_name_and_value_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
    let nested = vec![
        Token::StartObject,
        Token::PropertyName("a".to_string()),
        Token::Comment("note".to_string()),
        Token::Value(Scalar::Integer(1)),
        Token::EndObject,
    ];
    let bare = vec![
        Token::PropertyName("a".to_string()),
        Token::Comment("note".to_string()),
        Token::Value(Scalar::Integer(1)),
    ];

    for handling in [CommentHandling::Ignore, CommentHandling::Load] {
        let settings = LoadSettings {
            comment_handling: handling,
            ..LoadSettings::default()
        };

        let mut doc = Document::new();
        let object = doc.load(&mut TokenBufferReader::new(&nested), Some(&settings))?;
        assert_eq!(codec::to_json_value(&doc, object)?, json!({"a": 1}));

        let property = doc.load(&mut TokenBufferReader::new(&bare), Some(&settings))?;
        assert_eq!(doc.node_type(property)?, NodeType::Property);
        let value = doc.value_of(property)?;
        assert_eq!(doc.scalar(value)?, Some(&Scalar::Integer(1)));
    }

    let dangling = vec![
        Token::PropertyName("a".to_string()),
        Token::Comment("note".to_string()),
    ];
    let mut doc = Document::new();
    assert!(matches!(
        doc.load(&mut TokenBufferReader::new(&dangling), None),
        Err(ArborError::Format { .. })
    ));

    Ok(())
}
