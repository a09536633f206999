//! Declarative field schemas for manager resources.
//!
//! A manager describes its resources through a [`FieldSet`]: an ordered
//! collection of [`ResourceField`] declarations carrying the per-field
//! metadata (type, optionality, computed, editability, choices, custom
//! transforms). The set drives three things:
//!
//! - request validation (`validate`), including per-field validators
//!   supplied by the manager,
//! - wire serialisation (`serialize` / `unserialize`),
//! - the self-describing endpoints (`schema` / `example_resource`).

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::errors::ValidationError;
use crate::manager::{Manager, Resource};

/// Semantic type of a field, derived from its example when not explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    List,
    Mapping,
}

impl FieldType {
    fn of(value: &Value) -> Option<FieldType> {
        match value {
            Value::String(_) => Some(FieldType::String),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(FieldType::Int),
            Value::Number(_) => Some(FieldType::Float),
            Value::Bool(_) => Some(FieldType::Bool),
            Value::Array(_) => Some(FieldType::List),
            Value::Object(_) => Some(FieldType::Mapping),
            Value::Null => None,
        }
    }

    /// The spelling used in validation error messages.
    pub fn wire_name(self) -> &'static str {
        match self {
            FieldType::String => "str",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::List => "list",
            FieldType::Mapping => "dict",
        }
    }

    /// The spelling used in the schema view.
    pub fn schema_name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            other => other.wire_name(),
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Int => matches!(value, Value::Number(n) if n.is_i64() || n.is_u64()),
            FieldType::Float => matches!(value, Value::Number(n) if n.is_f64()),
            FieldType::Bool => value.is_boolean(),
            FieldType::List => value.is_array(),
            FieldType::Mapping => value.is_object(),
        }
    }
}

/// The wire spelling of a JSON value's type, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match FieldType::of(value) {
        Some(field_type) => field_type.wire_name(),
        None => "null",
    }
}

/// A named value transform applied on the way in (`unserializer`) or out
/// (`serializer`) of the wire format. The name is surfaced in the schema.
#[derive(Clone)]
pub struct Transform {
    name: String,
    func: Arc<dyn Fn(Value) -> Value + Send + Sync>,
}

impl Transform {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Transform {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, value: Value) -> Value {
        (self.func)(value)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("name", &self.name).finish()
    }
}

/// A schema error detected while building a field set. Fatal at startup:
/// a manager with a bad schema refuses to mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldConfigError {
    MissingExample(String),
    ExampleTypeMismatch { field: String, expected: &'static str },
    DuplicateField(String),
}

impl fmt::Display for FieldConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldConfigError::MissingExample(field) => {
                write!(f, "{field}: Missing example")
            }
            FieldConfigError::ExampleTypeMismatch { field, expected } => {
                write!(f, "{field}: Example is not of type {expected}")
            }
            FieldConfigError::DuplicateField(field) => {
                write!(f, "{field}: Duplicate field declaration")
            }
        }
    }
}

impl std::error::Error for FieldConfigError {}

/// One declared field of a resource.
#[derive(Debug, Clone)]
pub struct ResourceField {
    name: String,
    example: Value,
    field_type: FieldType,
    dynamic_typing: bool,
    optional: bool,
    computed: bool,
    editable: bool,
    default_on_null: bool,
    choices: Option<Vec<Value>>,
    serializer: Option<Transform>,
    unserializer: Option<Transform>,
    validation: String,
    extra: Map<String, Value>,
}

impl ResourceField {
    /// Start declaring a field from its example value.
    pub fn new(name: impl Into<String>, example: impl Into<Value>) -> FieldBuilder {
        FieldBuilder {
            name: name.into(),
            example: Some(example.into()),
            field_type: None,
            dynamic_typing: false,
            optional: false,
            computed: false,
            editable: true,
            default_on_null: false,
            choices: None,
            serializer: None,
            unserializer: None,
            validation: String::new(),
            extra: Map::new(),
        }
    }

    pub fn string(name: impl Into<String>, example: impl Into<String>) -> FieldBuilder {
        ResourceField::new(name, Value::String(example.into()))
    }

    pub fn int(name: impl Into<String>, example: i64) -> FieldBuilder {
        ResourceField::new(name, example)
    }

    pub fn float(name: impl Into<String>, example: f64) -> FieldBuilder {
        ResourceField::new(name, example)
    }

    pub fn bool(name: impl Into<String>, example: bool) -> FieldBuilder {
        ResourceField::new(name, example)
    }

    /// Declare a typed field without an example, only legal for computed
    /// fields.
    pub fn typed(name: impl Into<String>, field_type: FieldType) -> FieldBuilder {
        FieldBuilder {
            name: name.into(),
            example: None,
            field_type: Some(field_type),
            dynamic_typing: false,
            optional: false,
            computed: false,
            editable: true,
            default_on_null: false,
            choices: None,
            serializer: None,
            unserializer: None,
            validation: String::new(),
            extra: Map::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn example(&self) -> &Value {
        &self.example
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_computed(&self) -> bool {
        self.computed
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    /// A field must be present in the input unless it is optional or
    /// computed.
    pub fn is_required(&self) -> bool {
        !(self.optional || self.computed)
    }

    fn check_type(&self, value: &Value) -> bool {
        if value.is_null() && self.default_on_null {
            return true;
        }
        self.dynamic_typing || self.field_type.matches(value)
    }

    fn validate_value(
        &self,
        manager: &dyn Manager,
        value: Value,
    ) -> Result<Value, ValidationError> {
        if !self.check_type(&value) {
            return Err(ValidationError::field(
                &self.name,
                format!(
                    "Bad type: {} has type {} but should be {}",
                    self.name,
                    json_type_name(&value),
                    self.field_type.wire_name()
                ),
            ));
        }
        let defaulted = value.is_null() && self.default_on_null;
        if let Some(choices) = &self.choices {
            if !defaulted && !choices.contains(&value) {
                return Err(ValidationError::field(
                    &self.name,
                    format!("{value} is not one of the available choices"),
                ));
            }
        }
        manager
            .validate_field(&self.name, value)
            .map_err(|err| ValidationError::field(&self.name, err.to_string()))
    }

    fn serialize_value(&self, value: Value) -> Value {
        match &self.serializer {
            Some(transform) => transform.apply(value),
            None => value,
        }
    }

    fn unserialize_value(&self, value: Value) -> Value {
        match &self.unserializer {
            Some(transform) => transform.apply(value),
            None => value,
        }
    }

    /// The schema view of this field: the extra metadata merged with the
    /// declared properties. Feeds `_napix_resource_fields` and
    /// `_napix_help`.
    pub fn schema(&self) -> Value {
        let mut meta = self.extra.clone();
        meta.insert("editable".into(), self.editable.into());
        meta.insert("optional".into(), self.optional.into());
        meta.insert("computed".into(), self.computed.into());
        meta.insert("default_on_null".into(), self.default_on_null.into());
        meta.insert("example".into(), self.example.clone());
        meta.insert(
            "typing".into(),
            if self.dynamic_typing { "dynamic" } else { "static" }.into(),
        );
        meta.insert(
            "choices".into(),
            match &self.choices {
                Some(choices) => Value::Array(choices.clone()),
                None => Value::Null,
            },
        );
        meta.insert("type".into(), self.field_type.schema_name().into());
        meta.insert("validation".into(), self.validation.clone().into());
        if let Some(transform) = &self.serializer {
            meta.insert("serializer".into(), transform.name().into());
        }
        if let Some(transform) = &self.unserializer {
            meta.insert("unserializer".into(), transform.name().into());
        }
        Value::Object(meta)
    }
}

/// Builder for a [`ResourceField`]; finalised by
/// [`FieldSetBuilder::build`](FieldSetBuilder).
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    name: String,
    example: Option<Value>,
    field_type: Option<FieldType>,
    dynamic_typing: bool,
    optional: bool,
    computed: bool,
    editable: bool,
    default_on_null: bool,
    choices: Option<Vec<Value>>,
    serializer: Option<Transform>,
    unserializer: Option<Transform>,
    validation: String,
    extra: Map<String, Value>,
}

impl FieldBuilder {
    /// Force the declared type instead of deriving it from the example.
    pub fn of_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    /// Skip the type check at validation time.
    pub fn dynamic(mut self) -> Self {
        self.dynamic_typing = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Computed fields are produced by the manager and never accepted as
    /// input; they are also never editable.
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Reject the field on modification; it is only accepted at creation.
    pub fn not_editable(mut self) -> Self {
        self.editable = false;
        self
    }

    /// When the field is absent, forward `null` to the per-field validator
    /// instead of rejecting the input.
    pub fn default_on_null(mut self) -> Self {
        self.default_on_null = true;
        self
    }

    pub fn choices(mut self, choices: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn serializer(mut self, transform: Transform) -> Self {
        self.serializer = Some(transform);
        self
    }

    pub fn unserializer(mut self, transform: Transform) -> Self {
        self.unserializer = Some(transform);
        self
    }

    /// Documentation of the per-field validator, surfaced in the schema.
    pub fn validation(mut self, doc: impl Into<String>) -> Self {
        self.validation = doc.into();
        self
    }

    /// Attach opaque metadata forwarded verbatim to clients
    /// (`description`, `display_order`, ...).
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    fn build(self) -> Result<ResourceField, FieldConfigError> {
        let example = match self.example {
            Some(example) => example,
            None if self.computed && self.field_type.is_some() => Value::String(String::new()),
            None => return Err(FieldConfigError::MissingExample(self.name)),
        };
        let field_type = match self.field_type {
            Some(field_type) => field_type,
            None => FieldType::of(&example)
                .ok_or_else(|| FieldConfigError::MissingExample(self.name.clone()))?,
        };
        if !self.dynamic_typing && !self.computed && !field_type.matches(&example) {
            return Err(FieldConfigError::ExampleTypeMismatch {
                field: self.name,
                expected: field_type.wire_name(),
            });
        }
        Ok(ResourceField {
            editable: !self.computed && self.editable,
            name: self.name,
            example,
            field_type,
            dynamic_typing: self.dynamic_typing,
            optional: self.optional,
            computed: self.computed,
            default_on_null: self.default_on_null,
            choices: self.choices,
            serializer: self.serializer,
            unserializer: self.unserializer,
            validation: self.validation,
            extra: self.extra,
        })
    }
}

/// The ordered field declarations of a manager.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    fields: Vec<ResourceField>,
}

impl FieldSet {
    pub fn builder() -> FieldSetBuilder {
        FieldSetBuilder { fields: Vec::new() }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceField> {
        self.fields.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ResourceField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate `input` against the declared fields, routing each value
    /// through the manager's per-field validator.
    ///
    /// Fields are skipped when computed, or when `for_edit` is set and the
    /// field is not editable. A missing field is an error when required,
    /// forwarded as `null` when `default_on_null`, and dropped otherwise.
    pub fn validate(
        &self,
        manager: &dyn Manager,
        input: &Resource,
        for_edit: bool,
    ) -> Result<Resource, ValidationError> {
        let mut output = Resource::new();
        for field in &self.fields {
            if field.computed || (for_edit && !field.editable) {
                continue;
            }
            let value = match input.get(&field.name) {
                Some(value) => value.clone(),
                None if field.default_on_null => Value::Null,
                None if !field.is_required() => continue,
                None => return Err(ValidationError::field(&field.name, "Required")),
            };
            output.insert(field.name.clone(), field.validate_value(manager, value)?);
        }
        Ok(output)
    }

    /// Prepare `raw` for the wire: apply serializers to the declared keys
    /// present in it, dropping everything undeclared.
    pub fn serialize(&self, raw: &Resource) -> Resource {
        let mut dest = Resource::new();
        for field in &self.fields {
            if let Some(value) = raw.get(&field.name) {
                dest.insert(field.name.clone(), field.serialize_value(value.clone()));
            }
        }
        dest
    }

    /// Extract the declared keys from wire data, applying unserializers.
    pub fn unserialize(&self, raw: &Resource) -> Resource {
        let mut dest = Resource::new();
        for field in &self.fields {
            if let Some(value) = raw.get(&field.name) {
                dest.insert(field.name.clone(), field.unserialize_value(value.clone()));
            }
        }
        dest
    }

    /// `{name: example}` for every non-computed field; feeds `_napix_new`.
    pub fn example_resource(&self) -> Resource {
        let mut example = Resource::new();
        for field in &self.fields {
            if field.computed {
                continue;
            }
            example.insert(field.name.clone(), field.example.clone());
        }
        example
    }

    /// The full schema object; feeds `_napix_resource_fields`.
    pub fn schema(&self) -> Value {
        let mut schema = Map::new();
        for field in &self.fields {
            schema.insert(field.name.clone(), field.schema());
        }
        Value::Object(schema)
    }
}

/// Builder collecting field declarations; `build` validates them all.
#[derive(Debug, Clone, Default)]
pub struct FieldSetBuilder {
    fields: Vec<FieldBuilder>,
}

impl FieldSetBuilder {
    pub fn field(mut self, field: FieldBuilder) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Result<FieldSet, FieldConfigError> {
        let mut fields: Vec<ResourceField> = Vec::with_capacity(self.fields.len());
        for builder in self.fields {
            let field = builder.build()?;
            if fields.iter().any(|existing| existing.name == field.name) {
                return Err(FieldConfigError::DuplicateField(field.name));
            }
            fields.push(field);
        }
        Ok(FieldSet { fields })
    }
}
