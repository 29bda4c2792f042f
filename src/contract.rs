//! Per-type conversion metadata.
//!
//! A [`Contract`] is built once per type from a [`TypeShape`], the
//! pre-resolved description a host hands over (constructor candidates,
//! member accessors, nullability). It answers three questions for the
//! mapping layer: which converter owns the type, which lifecycle
//! callbacks fire around conversion, and how a fresh instance is created.

use crate::error::ArborError;
use crate::node::Scalar;
use crate::token::{TokenReader, TokenWriter};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Opaque, hashable identity of a host type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeToken {
    id: Option<TypeId>,
    name: Cow<'static, str>,
}

impl TypeToken {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: Some(TypeId::of::<T>()),
            name: Cow::Borrowed(std::any::type_name::<T>()),
        }
    }

    /// Token for a type known only by name, e.g. one from a foreign type system.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.id
    }

    /// An unnamed token stands for "no type".
    pub fn is_absent(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCategory {
    Primitive,
    String,
    Enum,
    Object,
    Array,
    Dictionary,
    Dynamic,
    /// The document tree's own node types.
    Tree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    Primitive,
    String,
    Object,
    Array,
    Dictionary,
    Dynamic,
    Tree,
}

impl From<TypeCategory> for ContractKind {
    fn from(category: TypeCategory) -> Self {
        match category {
            TypeCategory::Primitive | TypeCategory::Enum => ContractKind::Primitive,
            TypeCategory::String => ContractKind::String,
            TypeCategory::Object => ContractKind::Object,
            TypeCategory::Array => ContractKind::Array,
            TypeCategory::Dictionary => ContractKind::Dictionary,
            TypeCategory::Dynamic => ContractKind::Dynamic,
            TypeCategory::Tree => ContractKind::Tree,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    NonPublic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterShape {
    pub name: String,
    pub ty: TypeToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorCandidate {
    pub parameters: Vec<ParameterShape>,
    pub visibility: Visibility,
}

impl ConstructorCandidate {
    pub fn default_with(visibility: Visibility) -> Self {
        Self {
            parameters: Vec::new(),
            visibility,
        }
    }

    pub fn parameterized(parameters: Vec<ParameterShape>, visibility: Visibility) -> Self {
        Self {
            parameters,
            visibility,
        }
    }

    /// Takes no arguments.
    pub fn is_default(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Required {
    /// Not required; null allowed.
    #[default]
    Default,
    /// Must be present; null allowed.
    AllowNull,
    /// Must be present and non-null.
    Always,
    /// May be absent; must not be null when present.
    DisallowNull,
}

/// A member the mapping layer reads or writes, with its required-ness
/// and default-value flags.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberContract {
    pub name: String,
    pub ty: TypeToken,
    pub readable: bool,
    pub writable: bool,
    pub required: Required,
    pub default_value: Option<Scalar>,
    pub ignored: bool,
}

impl MemberContract {
    pub fn new(name: impl Into<String>, ty: TypeToken) -> Self {
        Self {
            name: name.into(),
            ty,
            readable: true,
            writable: true,
            required: Required::Default,
            default_value: None,
            ignored: false,
        }
    }

    pub fn required(mut self, required: Required) -> Self {
        self.required = required;
        self
    }

    pub fn with_default(mut self, value: impl Into<Scalar>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }
}

pub type Creator = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// Pre-resolved description of a type, produced by a
/// [`ShapeResolver`](crate::registry::ShapeResolver).
#[derive(Clone)]
pub struct TypeShape {
    pub token: TypeToken,
    /// Set when this type is a nullable wrapper around another type.
    pub nullable_of: Option<Box<TypeShape>>,
    /// The type itself admits an absent value.
    pub admits_null: bool,
    pub category: TypeCategory,
    pub is_convertible: bool,
    pub is_sealed: bool,
    pub is_interface: bool,
    pub is_abstract: bool,
    pub constructors: Vec<ConstructorCandidate>,
    pub members: Vec<MemberContract>,
    pub default_creator: Option<Creator>,
}

impl TypeShape {
    pub fn new(token: TypeToken, category: TypeCategory) -> Self {
        let scalar = matches!(
            category,
            TypeCategory::Primitive | TypeCategory::String | TypeCategory::Enum
        );
        Self {
            token,
            nullable_of: None,
            admits_null: false,
            category,
            is_convertible: scalar,
            is_sealed: scalar,
            is_interface: false,
            is_abstract: false,
            constructors: Vec::new(),
            members: Vec::new(),
            default_creator: None,
        }
    }

    pub fn of<T: ?Sized + 'static>(category: TypeCategory) -> Self {
        Self::new(TypeToken::of::<T>(), category)
    }

    /// A Rust type with a `Default` impl, exposed as a public zero-argument
    /// constructor.
    pub fn defaulted<T: Default + Send + 'static>(category: TypeCategory) -> Self {
        Self::of::<T>(category)
            .with_constructor(ConstructorCandidate::default_with(Visibility::Public))
            .with_default_creator(|| Box::new(T::default()) as Box<dyn Any + Send>)
    }

    /// `Option<T>`-style wrapper around `inner`.
    pub fn nullable(token: TypeToken, inner: TypeShape) -> Self {
        Self {
            nullable_of: Some(Box::new(inner.clone())),
            admits_null: true,
            ..inner
        }
        .with_token(token)
    }

    fn with_token(mut self, token: TypeToken) -> Self {
        self.token = token;
        self
    }

    pub fn admitting_null(mut self) -> Self {
        self.admits_null = true;
        self
    }

    pub fn sealed(mut self) -> Self {
        self.is_sealed = true;
        self
    }

    pub fn interface(mut self) -> Self {
        self.is_interface = true;
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn convertible(mut self, convertible: bool) -> Self {
        self.is_convertible = convertible;
        self
    }

    pub fn with_constructor(mut self, candidate: ConstructorCandidate) -> Self {
        self.constructors.push(candidate);
        self
    }

    pub fn with_member(mut self, member: MemberContract) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_default_creator<F>(mut self, creator: F) -> Self
    where
        F: Fn() -> Box<dyn Any + Send> + Send + Sync + 'static,
    {
        self.default_creator = Some(Arc::new(creator));
        self
    }

    fn has_default_constructor(&self, visibility: Visibility) -> bool {
        self.constructors
            .iter()
            .any(|c| c.is_default() && c.visibility == visibility)
    }
}

impl fmt::Debug for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeShape")
            .field("token", &self.token)
            .field("nullable_of", &self.nullable_of)
            .field("admits_null", &self.admits_null)
            .field("category", &self.category)
            .field("is_sealed", &self.is_sealed)
            .field("is_interface", &self.is_interface)
            .field("is_abstract", &self.is_abstract)
            .field("constructors", &self.constructors)
            .field("members", &self.members)
            .field("default_creator", &self.default_creator.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingState {
    #[default]
    All,
    Persistence,
    Remoting,
    Clone,
    Other,
}

/// Ambient value handed to every lifecycle callback.
#[derive(Debug, Clone, Default)]
pub struct StreamingContext {
    pub state: StreamingState,
    pub context: Option<Arc<dyn Any + Send + Sync>>,
}

impl StreamingContext {
    pub fn new(state: StreamingState) -> Self {
        Self {
            state,
            context: None,
        }
    }

    pub fn with_context(mut self, context: Arc<dyn Any + Send + Sync>) -> Self {
        self.context = Some(context);
        self
    }
}

/// What failed, and whether an error handler has already dealt with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub message: String,
    pub member: Option<String>,
    pub path: String,
    pub handled: bool,
    pub traced: bool,
}

impl ErrorContext {
    pub fn new(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn from_error(error: &ArborError, path: impl Into<String>) -> Self {
        Self::new(error.to_string(), path)
    }

    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }
}

pub type SerializationCallback = Arc<dyn Fn(&mut dyn Any, &StreamingContext) + Send + Sync>;

pub type SerializationErrorCallback =
    Arc<dyn Fn(&mut dyn Any, &StreamingContext, &mut ErrorContext) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    BeforeSerialize,
    AfterSerialize,
    BeforeDeserialize,
    AfterDeserialize,
}

impl LifecyclePhase {
    fn slot(self) -> usize {
        match self {
            LifecyclePhase::BeforeSerialize => 0,
            LifecyclePhase::AfterSerialize => 1,
            LifecyclePhase::BeforeDeserialize => 2,
            LifecyclePhase::AfterDeserialize => 3,
        }
    }
}

/// Pluggable conversion that fully replaces the default behavior for a type.
pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        true
    }

    fn write(&self, writer: &mut dyn TokenWriter, value: &dyn Any) -> Result<(), ArborError>;

    fn read(
        &self,
        reader: &mut dyn TokenReader,
        existing: Option<Box<dyn Any + Send>>,
    ) -> Result<Box<dyn Any + Send>, ArborError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructorHandling {
    /// Public zero-argument constructor, then the single public
    /// parameterized one, then a non-public zero-argument constructor.
    #[default]
    Default,
    /// Prefer a non-public zero-argument constructor over a parameterized one.
    AllowNonPublicDefaultConstructor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructorChoice {
    DefaultCreator { non_public: bool },
    /// Index into [`Contract::constructors`].
    Parameterized(usize),
}

#[derive(Clone)]
pub struct Contract {
    subject_type: TypeToken,
    non_nullable_underlying_type: TypeToken,
    is_nullable: bool,
    is_convertible: bool,
    is_enum: bool,
    kind: ContractKind,
    constructed_type: TypeToken,
    is_sealed: bool,
    is_instantiable: bool,
    is_reference: Option<bool>,
    converter: Option<Arc<dyn Converter>>,
    internal_converter: Option<Arc<dyn Converter>>,
    default_creator: Option<Creator>,
    default_creator_non_public: bool,
    constructors: Vec<ConstructorCandidate>,
    members: Vec<MemberContract>,
    callbacks: [Vec<SerializationCallback>; 4],
    error_callbacks: Vec<SerializationErrorCallback>,
}

impl Contract {
    pub fn new(shape: &TypeShape) -> Result<Self, ArborError> {
        if shape.token.is_absent() {
            return Err(ArborError::InvalidArgument(
                "a contract needs a subject type".to_string(),
            ));
        }

        let underlying = shape.nullable_of.as_deref().unwrap_or(shape);
        if underlying.token.is_absent() {
            return Err(ArborError::InvalidArgument(format!(
                "nullable type {} wraps no type",
                shape.token
            )));
        }

        let default_creator_non_public = underlying.default_creator.is_some()
            && !underlying.has_default_constructor(Visibility::Public)
            && underlying.has_default_constructor(Visibility::NonPublic);

        let mut contract = Self {
            subject_type: shape.token.clone(),
            non_nullable_underlying_type: underlying.token.clone(),
            is_nullable: shape.admits_null || shape.nullable_of.is_some(),
            is_convertible: underlying.is_convertible,
            is_enum: underlying.category == TypeCategory::Enum,
            kind: underlying.category.into(),
            constructed_type: underlying.token.clone(),
            is_sealed: false,
            is_instantiable: false,
            is_reference: None,
            converter: None,
            internal_converter: None,
            default_creator: underlying.default_creator.clone(),
            default_creator_non_public,
            constructors: underlying.constructors.clone(),
            members: underlying.members.clone(),
            callbacks: Default::default(),
            error_callbacks: Vec::new(),
        };
        contract.set_constructed_type(underlying)?;
        Ok(contract)
    }

    pub fn subject_type(&self) -> &TypeToken {
        &self.subject_type
    }

    pub fn non_nullable_underlying_type(&self) -> &TypeToken {
        &self.non_nullable_underlying_type
    }

    pub fn is_nullable(&self) -> bool {
        self.is_nullable
    }

    pub fn is_convertible(&self) -> bool {
        self.is_convertible
    }

    pub fn is_enum(&self) -> bool {
        self.is_enum
    }

    pub fn kind(&self) -> ContractKind {
        self.kind
    }

    pub fn constructed_type(&self) -> &TypeToken {
        &self.constructed_type
    }

    pub fn is_sealed(&self) -> bool {
        self.is_sealed
    }

    pub fn is_instantiable(&self) -> bool {
        self.is_instantiable
    }

    /// Points construction at a concrete type, e.g. an implementation of
    /// an interface subject.
    pub fn set_constructed_type(&mut self, shape: &TypeShape) -> Result<(), ArborError> {
        if shape.token.is_absent() {
            return Err(ArborError::InvalidArgument(
                "constructed type cannot be absent".to_string(),
            ));
        }
        self.constructed_type = shape.token.clone();
        self.is_sealed = shape.is_sealed;
        self.is_instantiable = !(shape.is_interface || shape.is_abstract);
        Ok(())
    }

    pub fn is_reference(&self) -> Option<bool> {
        self.is_reference
    }

    pub fn set_is_reference(&mut self, is_reference: Option<bool>) {
        self.is_reference = is_reference;
    }

    pub fn converter(&self) -> Option<&Arc<dyn Converter>> {
        self.converter.as_ref()
    }

    pub fn set_converter(&mut self, converter: Option<Arc<dyn Converter>>) {
        self.converter = converter;
    }

    pub fn internal_converter(&self) -> Option<&Arc<dyn Converter>> {
        self.internal_converter.as_ref()
    }

    /// Fallback used only while no explicit converter is set.
    pub fn set_internal_converter(&mut self, converter: Option<Arc<dyn Converter>>) {
        self.internal_converter = converter;
    }

    pub fn effective_converter(&self) -> Option<&Arc<dyn Converter>> {
        self.converter.as_ref().or(self.internal_converter.as_ref())
    }

    pub fn default_creator(&self) -> Option<&Creator> {
        self.default_creator.as_ref()
    }

    pub fn default_creator_non_public(&self) -> bool {
        self.default_creator_non_public
    }

    pub fn set_default_creator(&mut self, creator: Option<Creator>, non_public: bool) {
        self.default_creator = creator;
        self.default_creator_non_public = non_public;
    }

    pub fn constructors(&self) -> &[ConstructorCandidate] {
        &self.constructors
    }

    pub fn set_constructors(&mut self, constructors: Vec<ConstructorCandidate>) {
        self.constructors = constructors;
    }

    pub fn members(&self) -> &[MemberContract] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&MemberContract> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn members_mut(&mut self) -> &mut Vec<MemberContract> {
        &mut self.members
    }

    pub fn callbacks(&self, phase: LifecyclePhase) -> &[SerializationCallback] {
        &self.callbacks[phase.slot()]
    }

    pub fn add_callback<F>(&mut self, phase: LifecyclePhase, callback: F) -> &mut Self
    where
        F: Fn(&mut dyn Any, &StreamingContext) + Send + Sync + 'static,
    {
        self.callbacks[phase.slot()].push(Arc::new(callback));
        self
    }

    pub fn error_callbacks(&self) -> &[SerializationErrorCallback] {
        &self.error_callbacks
    }

    pub fn add_error_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&mut dyn Any, &StreamingContext, &mut ErrorContext) + Send + Sync + 'static,
    {
        self.error_callbacks.push(Arc::new(callback));
        self
    }

    /// Runs the callbacks registered for `phase` in registration order.
    pub fn invoke(&self, phase: LifecyclePhase, subject: &mut dyn Any, context: &StreamingContext) {
        for callback in &self.callbacks[phase.slot()] {
            callback(subject, context);
        }
    }

    pub fn invoke_before_serialize(&self, subject: &mut dyn Any, context: &StreamingContext) {
        self.invoke(LifecyclePhase::BeforeSerialize, subject, context);
    }

    pub fn invoke_after_serialize(&self, subject: &mut dyn Any, context: &StreamingContext) {
        self.invoke(LifecyclePhase::AfterSerialize, subject, context);
    }

    pub fn invoke_before_deserialize(&self, subject: &mut dyn Any, context: &StreamingContext) {
        self.invoke(LifecyclePhase::BeforeDeserialize, subject, context);
    }

    pub fn invoke_after_deserialize(&self, subject: &mut dyn Any, context: &StreamingContext) {
        self.invoke(LifecyclePhase::AfterDeserialize, subject, context);
    }

    /// Runs every error handler in order, each seeing the handled flag the
    /// previous one left. Returns the final flag.
    pub fn invoke_on_error(
        &self,
        subject: &mut dyn Any,
        context: &StreamingContext,
        error: &mut ErrorContext,
    ) -> bool {
        for callback in &self.error_callbacks {
            callback(subject, context, error);
        }
        error.handled
    }

    /// Picks how a new instance is created under `handling`.
    ///
    /// More than one public parameterized constructor at the deciding step
    /// is a configuration error; no candidate is guessed.
    pub fn select_constructor(
        &self,
        handling: ConstructorHandling,
    ) -> Result<ConstructorChoice, ArborError> {
        let creator_public = self.default_creator.is_some() && !self.default_creator_non_public;
        let creator_non_public = self.default_creator.is_some() && self.default_creator_non_public;

        let public_default = creator_public
            || self
                .constructors
                .iter()
                .any(|c| c.is_default() && c.is_public());
        let non_public_default = creator_non_public
            || self
                .constructors
                .iter()
                .any(|c| c.is_default() && !c.is_public());

        if public_default {
            return Ok(ConstructorChoice::DefaultCreator { non_public: false });
        }
        if handling == ConstructorHandling::AllowNonPublicDefaultConstructor && non_public_default {
            return Ok(ConstructorChoice::DefaultCreator { non_public: true });
        }

        let parameterized: Vec<usize> = self
            .constructors
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_default() && c.is_public())
            .map(|(i, _)| i)
            .collect();

        match parameterized.as_slice() {
            [single] => Ok(ConstructorChoice::Parameterized(*single)),
            [] if non_public_default => Ok(ConstructorChoice::DefaultCreator { non_public: true }),
            [] if !self.is_instantiable => Err(ArborError::InvalidOperation(format!(
                "could not create an instance of type {}: it is an interface or abstract type",
                self.constructed_type
            ))),
            [] => Err(ArborError::InvalidOperation(format!(
                "unable to find a constructor to use for type {}",
                self.constructed_type
            ))),
            many => Err(ArborError::Configuration(format!(
                "type {} has {} equally eligible parameterized constructors; register a default factory",
                self.constructed_type,
                many.len()
            ))),
        }
    }

    /// Creates an instance through the default factory when the policy
    /// selects it.
    pub fn create_default(
        &self,
        handling: ConstructorHandling,
    ) -> Result<Box<dyn Any + Send>, ArborError> {
        match self.select_constructor(handling)? {
            ConstructorChoice::DefaultCreator { .. } => {
                let creator = self.default_creator.as_ref().ok_or_else(|| {
                    ArborError::InvalidOperation(format!(
                        "no default factory registered for type {}",
                        self.constructed_type
                    ))
                })?;
                Ok(creator())
            }
            ConstructorChoice::Parameterized(index) => Err(ArborError::InvalidOperation(format!(
                "type {} is created through parameterized constructor {index}; arguments are required",
                self.constructed_type
            ))),
        }
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("subject_type", &self.subject_type)
            .field("kind", &self.kind)
            .field("constructed_type", &self.constructed_type)
            .field("is_nullable", &self.is_nullable)
            .field("is_sealed", &self.is_sealed)
            .field("is_instantiable", &self.is_instantiable)
            .field("is_reference", &self.is_reference)
            .field("converter", &self.converter.as_ref().map(|c| c.name().to_string()))
            .field("constructors", &self.constructors.len())
            .field("members", &self.members.len())
            .finish_non_exhaustive()
    }
}
