use arbor::contract::{
    ConstructorCandidate, ConstructorChoice, ConstructorHandling, Contract, ContractKind,
    Converter, ErrorContext, LifecyclePhase, MemberContract, ParameterShape, Required,
    StreamingContext, StreamingState, TypeCategory, TypeShape, TypeToken, Visibility,
};
use arbor::{ArborError, Scalar, TokenBuffer, TokenReader, TokenWriter};
use std::any::Any;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Widget {
    calls: Vec<&'static str>,
}

fn param(name: &str) -> ParameterShape {
    ParameterShape {
        name: name.to_string(),
        ty: TypeToken::of::<i64>(),
    }
}

fn public_ctor(names: &[&str]) -> ConstructorCandidate {
    ConstructorCandidate::parameterized(names.iter().map(|n| param(n)).collect(), Visibility::Public)
}

#[test]
fn public_default_wins_over_ambiguous_parameterized() -> Result<(), Box<dyn std::error::Error>> {
    let shape = TypeShape::defaulted::<Widget>(TypeCategory::Object)
        .with_constructor(public_ctor(&["a"]))
        .with_constructor(public_ctor(&["a", "b"]));
    let contract = Contract::new(&shape)?;

    assert_eq!(
        contract.select_constructor(ConstructorHandling::Default)?,
        ConstructorChoice::DefaultCreator { non_public: false }
    );
    let widget = contract
        .create_default(ConstructorHandling::Default)?
        .downcast::<Widget>()
        .map_err(|_| "default creator built the wrong type")?;
    assert!(widget.calls.is_empty());
    Ok(())
}

#[test]
fn ambiguous_parameterized_constructors_are_a_configuration_error() -> Result<(), Box<dyn std::error::Error>> {
    let shape = TypeShape::of::<Widget>(TypeCategory::Object)
        .with_constructor(public_ctor(&["a"]))
        .with_constructor(public_ctor(&["b"]));
    let contract = Contract::new(&shape)?;

    assert!(matches!(
        contract.select_constructor(ConstructorHandling::Default),
        Err(ArborError::Configuration(_))
    ));
    Ok(())
}

#[test]
fn single_parameterized_constructor_is_selected() -> Result<(), Box<dyn std::error::Error>> {
    let shape = TypeShape::of::<Widget>(TypeCategory::Object)
        .with_constructor(ConstructorCandidate::parameterized(
            vec![param("hidden")],
            Visibility::NonPublic,
        ))
        .with_constructor(public_ctor(&["a"]));
    let contract = Contract::new(&shape)?;

    assert_eq!(
        contract.select_constructor(ConstructorHandling::Default)?,
        ConstructorChoice::Parameterized(1)
    );
    assert!(matches!(
        contract.create_default(ConstructorHandling::Default),
        Err(ArborError::InvalidOperation(_))
    ));
    Ok(())
}

#[test]
fn non_public_default_depends_on_handling() -> Result<(), Box<dyn std::error::Error>> {
    let shape = TypeShape::of::<Widget>(TypeCategory::Object)
        .with_constructor(ConstructorCandidate::default_with(Visibility::NonPublic))
        .with_constructor(public_ctor(&["a"]))
        .with_default_creator(|| Box::new(Widget::default()) as Box<dyn Any + Send>);
    let contract = Contract::new(&shape)?;
    assert!(contract.default_creator_non_public());

    assert_eq!(
        contract.select_constructor(ConstructorHandling::Default)?,
        ConstructorChoice::Parameterized(1)
    );
    assert_eq!(
        contract.select_constructor(ConstructorHandling::AllowNonPublicDefaultConstructor)?,
        ConstructorChoice::DefaultCreator { non_public: true }
    );

    let only_hidden = TypeShape::of::<Widget>(TypeCategory::Object)
        .with_constructor(ConstructorCandidate::default_with(Visibility::NonPublic));
    let contract = Contract::new(&only_hidden)?;
    assert_eq!(
        contract.select_constructor(ConstructorHandling::Default)?,
        ConstructorChoice::DefaultCreator { non_public: true }
    );
    // Selected, but nothing was registered to build it.
    assert!(matches!(
        contract.create_default(ConstructorHandling::Default),
        Err(ArborError::InvalidOperation(_))
    ));
    Ok(())
}

#[test]
fn interfaces_are_not_instantiable_until_a_concrete_type_is_set() -> Result<(), Box<dyn std::error::Error>> {
    let interface = TypeShape::new(TypeToken::named("Shape"), TypeCategory::Object).interface();
    let mut contract = Contract::new(&interface)?;

    assert!(!contract.is_instantiable());
    let err = contract
        .select_constructor(ConstructorHandling::Default)
        .err()
        .ok_or("interface was constructible")?;
    assert!(matches!(err, ArborError::InvalidOperation(_)));
    assert!(err.to_string().contains("interface or abstract"));

    let concrete = TypeShape::defaulted::<Widget>(TypeCategory::Object).sealed();
    contract.set_constructed_type(&concrete)?;
    contract.set_default_creator(concrete.default_creator.clone(), false);

    assert!(contract.is_instantiable());
    assert!(contract.is_sealed());
    assert_eq!(contract.constructed_type(), &TypeToken::of::<Widget>());
    assert_eq!(contract.subject_type(), &TypeToken::named("Shape"));
    assert!(contract.create_default(ConstructorHandling::Default).is_ok());

    let abstract_type = TypeShape::new(TypeToken::named("Base"), TypeCategory::Object).abstract_type();
    assert!(matches!(
        contract.set_constructed_type(&TypeShape::new(TypeToken::named(""), TypeCategory::Object)),
        Err(ArborError::InvalidArgument(_))
    ));
    contract.set_constructed_type(&abstract_type)?;
    assert!(!contract.is_instantiable());
    Ok(())
}

#[test]
fn nullable_wrappers_expose_the_underlying_type() -> Result<(), Box<dyn std::error::Error>> {
    let inner = TypeShape::of::<i64>(TypeCategory::Primitive);
    let nullable = TypeShape::nullable(TypeToken::of::<Option<i64>>(), inner);
    let contract = Contract::new(&nullable)?;

    assert!(contract.is_nullable());
    assert_eq!(contract.subject_type(), &TypeToken::of::<Option<i64>>());
    assert_eq!(contract.non_nullable_underlying_type(), &TypeToken::of::<i64>());
    assert_eq!(contract.kind(), ContractKind::Primitive);
    assert!(contract.is_convertible());

    let plain = Contract::new(&TypeShape::of::<String>(TypeCategory::String))?;
    assert!(!plain.is_nullable());
    assert_eq!(plain.kind(), ContractKind::String);

    let colour = Contract::new(&TypeShape::new(TypeToken::named("Colour"), TypeCategory::Enum))?;
    assert!(colour.is_enum());
    assert_eq!(colour.kind(), ContractKind::Primitive);
    Ok(())
}

#[test]
fn subject_type_is_required() {
    let absent = TypeShape::new(TypeToken::named(""), TypeCategory::Object);
    assert!(matches!(
        Contract::new(&absent),
        Err(ArborError::InvalidArgument(_))
    ));
}

#[test]
fn members_carry_required_and_default_flags() -> Result<(), Box<dyn std::error::Error>> {
    let shape = TypeShape::defaulted::<Widget>(TypeCategory::Object)
        .with_member(MemberContract::new("id", TypeToken::of::<i64>()).required(Required::Always))
        .with_member(MemberContract::new("label", TypeToken::of::<String>()).with_default("none"))
        .with_member(MemberContract::new("cache", TypeToken::of::<Vec<u8>>()).ignored());
    let contract = Contract::new(&shape)?;

    assert_eq!(contract.members().len(), 3);
    let id = contract.member("id").ok_or("missing id")?;
    assert_eq!(id.required, Required::Always);
    let label = contract.member("label").ok_or("missing label")?;
    assert_eq!(label.default_value, Some(Scalar::from("none")));
    assert!(contract.member("cache").is_some_and(|m| m.ignored));
    assert!(contract.member("other").is_none());
    Ok(())
}

#[test]
fn lifecycle_callbacks_run_in_registration_order() -> Result<(), Box<dyn std::error::Error>> {
    let mut contract = Contract::new(&TypeShape::defaulted::<Widget>(TypeCategory::Object))?;
    contract
        .add_callback(LifecyclePhase::BeforeSerialize, |subject, _| {
            if let Some(widget) = subject.downcast_mut::<Widget>() {
                widget.calls.push("first");
            }
        })
        .add_callback(LifecyclePhase::BeforeSerialize, |subject, context| {
            if let Some(widget) = subject.downcast_mut::<Widget>() {
                if context.state == StreamingState::Persistence {
                    widget.calls.push("second");
                }
            }
        })
        .add_callback(LifecyclePhase::AfterDeserialize, |subject, _| {
            if let Some(widget) = subject.downcast_mut::<Widget>() {
                widget.calls.push("loaded");
            }
        });

    let context = StreamingContext::new(StreamingState::Persistence);
    let mut widget = Widget::default();
    contract.invoke_before_serialize(&mut widget, &context);
    contract.invoke_after_serialize(&mut widget, &context);
    assert_eq!(widget.calls, vec!["first", "second"]);

    contract.invoke_after_deserialize(&mut widget, &context);
    contract.invoke_before_deserialize(&mut widget, &context);
    assert_eq!(widget.calls, vec!["first", "second", "loaded"]);

    assert_eq!(contract.callbacks(LifecyclePhase::BeforeSerialize).len(), 2);
    assert!(contract.callbacks(LifecyclePhase::AfterSerialize).is_empty());
    Ok(())
}

#[test]
fn error_callbacks_see_the_handled_flag() -> Result<(), Box<dyn std::error::Error>> {
    let mut contract = Contract::new(&TypeShape::defaulted::<Widget>(TypeCategory::Object))?;
    let context = StreamingContext::default();
    let mut widget = Widget::default();

    let mut unhandled = ErrorContext::new("boom", "items[0]");
    assert!(!contract.invoke_on_error(&mut widget, &context, &mut unhandled));

    contract
        .add_error_callback(|subject, _, error| {
            if let Some(widget) = subject.downcast_mut::<Widget>() {
                widget.calls.push("recover");
            }
            error.handled = error.path.starts_with("items");
        })
        .add_error_callback(|subject, _, error| {
            if let Some(widget) = subject.downcast_mut::<Widget>() {
                widget.calls.push(if error.handled { "already handled" } else { "unhandled" });
            }
        });

    let mut error = ErrorContext::from_error(&ArborError::Converter("bad value".to_string()), "items[0]")
        .with_member("label");
    assert!(contract.invoke_on_error(&mut widget, &context, &mut error));
    assert_eq!(widget.calls, vec!["recover", "already handled"]);
    assert_eq!(error.member.as_deref(), Some("label"));
    assert!(error.message.contains("bad value"));
    Ok(())
}

struct Named(&'static str);

impl Converter for Named {
    fn name(&self) -> &str {
        self.0
    }

    fn write(&self, writer: &mut dyn TokenWriter, _value: &dyn Any) -> Result<(), ArborError> {
        writer.write_value(&Scalar::from(self.0))
    }

    fn read(
        &self,
        reader: &mut dyn TokenReader,
        _existing: Option<Box<dyn Any + Send>>,
    ) -> Result<Box<dyn Any + Send>, ArborError> {
        if !reader.read()? {
            return Err(ArborError::Converter("nothing to read".to_string()));
        }
        let text = reader
            .value()
            .and_then(Scalar::as_str)
            .ok_or_else(|| ArborError::Converter("expected a string".to_string()))?;
        Ok(Box::new(text.to_string()))
    }
}

#[test]
fn explicit_converter_takes_precedence() -> Result<(), Box<dyn std::error::Error>> {
    let mut contract = Contract::new(&TypeShape::defaulted::<Widget>(TypeCategory::Object))?;
    assert!(contract.effective_converter().is_none());

    contract.set_internal_converter(Some(Arc::new(Named("internal"))));
    assert_eq!(contract.effective_converter().map(|c| c.name()), Some("internal"));

    contract.set_converter(Some(Arc::new(Named("explicit"))));
    assert_eq!(contract.effective_converter().map(|c| c.name()), Some("explicit"));

    let converter = contract.effective_converter().ok_or("converter vanished")?;
    let mut buffer = TokenBuffer::new();
    converter.write(&mut buffer, &Widget::default())?;
    let read = converter.read(&mut buffer.reader(), None)?;
    assert_eq!(read.downcast_ref::<String>().map(String::as_str), Some("explicit"));

    contract.set_converter(None);
    assert_eq!(contract.effective_converter().map(|c| c.name()), Some("internal"));
    Ok(())
}

#[test]
fn reference_flag_is_tri_state() -> Result<(), Box<dyn std::error::Error>> {
    let mut contract = Contract::new(&TypeShape::defaulted::<Widget>(TypeCategory::Object))?;
    assert_eq!(contract.is_reference(), None);
    contract.set_is_reference(Some(false));
    assert_eq!(contract.is_reference(), Some(false));
    Ok(())
}
