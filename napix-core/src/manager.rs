//! The manager contract: the operations a domain module implements for one
//! level of a resource collection, and the declarative [`ManagerSpec`]
//! binding those operations to a schema, a verb table, and child managers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::conf::Conf;
use crate::errors::{HttpError, ValidationError};
use crate::fields::{FieldConfigError, FieldSet, FieldSetBuilder};
use crate::http::response::Response;
use crate::http::Method;

/// A resource body: a JSON object.
pub type Resource = serde_json::Map<String, Value>;

/// Query parameters handed to the filter operations.
pub type Params = BTreeMap<String, String>;

/// A typed resource id, produced by [`Manager::validate_id`] and rendered
/// back into URL tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Id {
    Int(i64),
    Str(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Int(value) => write!(f, "{value}"),
            Id::Str(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id::Int(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::Str(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id::Str(value)
    }
}

/// The id and (when already fetched) body of the resource a verb operates
/// on, threaded into `modify_resource`, `delete_resource`, and actions so
/// the callee does not refetch.
#[derive(Debug, Clone)]
pub struct ResourceWrapper {
    pub id: Id,
    pub resource: Option<Resource>,
}

impl ResourceWrapper {
    pub fn new(id: Id, resource: Option<Resource>) -> Self {
        ResourceWrapper { id, resource }
    }
}

/// Errors reported by manager operations.
#[derive(Debug)]
pub enum ManagerError {
    /// The resource does not exist; maps to 404.
    NotFound(String),
    /// Collision on create; maps to 409.
    Duplicate(String),
    /// Input rejected by the manager; maps to 400.
    Validation(ValidationError),
    /// Anything else; logged and mapped to an opaque 500.
    Internal(String),
}

impl ManagerError {
    pub fn not_found(id: &Id) -> Self {
        ManagerError::NotFound(id.to_string())
    }

    pub fn duplicate(id: &Id) -> Self {
        ManagerError::Duplicate(id.to_string())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ManagerError::Internal(message.into())
    }
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerError::NotFound(id) => write!(f, "`{id}` not found"),
            ManagerError::Duplicate(id) => write!(f, "`{id}` already exists"),
            ManagerError::Validation(err) => write!(f, "{err}"),
            ManagerError::Internal(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for ManagerError {}

impl From<ValidationError> for ManagerError {
    fn from(err: ValidationError) -> Self {
        ManagerError::Validation(err)
    }
}

impl From<ManagerError> for HttpError {
    fn from(err: ManagerError) -> Self {
        match err {
            ManagerError::NotFound(id) => HttpError::NotFound(id),
            ManagerError::Duplicate(id) => HttpError::Duplicate(id),
            ManagerError::Validation(err) => HttpError::BadRequest(err),
            ManagerError::Internal(message) => HttpError::Internal(message),
        }
    }
}

fn unimplemented_op(name: &str) -> ManagerError {
    ManagerError::Internal(format!("{name} is not implemented by this manager"))
}

/// The operations of one resource collection.
///
/// A manager is constructed per request by its [`ManagerSpec`] factory,
/// handed its resolved parent resource and conf subtree, and discarded when
/// the request ends. Every operation has a refusing default body, so an
/// implementation overrides exactly the verbs its [`OperationSet`]
/// declares.
#[async_trait]
pub trait Manager: Send + Sync {
    /// Turn a raw URL token into a typed id, rejecting malformed ones.
    ///
    /// The default accepts any non-empty token without a `/`.
    fn validate_id(&self, raw: &str) -> Result<Id, ValidationError> {
        if raw.is_empty() || raw.contains('/') {
            return Err(ValidationError::simple("Invalid identifier"));
        }
        Ok(Id::from(raw))
    }

    /// Per-field validation hook, called by
    /// [`FieldSet::validate`](crate::fields::FieldSet::validate) for every
    /// accepted value. The default accepts the value unchanged.
    fn validate_field(&self, _field: &str, value: Value) -> Result<Value, ValidationError> {
        Ok(value)
    }

    async fn start_request(&self, _method: &Method, _path: &str) {}

    async fn end_request(&self, _method: &Method, _path: &str) {}

    async fn list_resources(&self) -> Result<Vec<Id>, ManagerError> {
        Err(unimplemented_op("list_resources"))
    }

    async fn list_resources_filter(&self, _params: &Params) -> Result<Vec<Id>, ManagerError> {
        Err(unimplemented_op("list_resources_filter"))
    }

    async fn get_all_resources(&self) -> Result<Vec<(Id, Resource)>, ManagerError> {
        Err(unimplemented_op("get_all_resources"))
    }

    async fn get_all_resources_filter(
        &self,
        _params: &Params,
    ) -> Result<Vec<(Id, Resource)>, ManagerError> {
        Err(unimplemented_op("get_all_resources_filter"))
    }

    async fn get_resource(&self, _id: &Id) -> Result<Resource, ManagerError> {
        Err(unimplemented_op("get_resource"))
    }

    /// Create a resource from a validated body and return its id.
    async fn create_resource(&self, _body: Resource) -> Result<Id, ManagerError> {
        Err(unimplemented_op("create_resource"))
    }

    /// Modify a resource; returning a new id is treated as a move.
    async fn modify_resource(
        &self,
        _wrapper: &ResourceWrapper,
        _body: Resource,
    ) -> Result<Option<Id>, ManagerError> {
        Err(unimplemented_op("modify_resource"))
    }

    async fn delete_resource(&self, _wrapper: &ResourceWrapper) -> Result<(), ManagerError> {
        Err(unimplemented_op("delete_resource"))
    }

    /// Run a custom action declared on the spec; the returned value is the
    /// response body.
    async fn run_action(
        &self,
        name: &str,
        _wrapper: &ResourceWrapper,
        _params: Resource,
    ) -> Result<Value, ManagerError> {
        Err(unimplemented_op(name))
    }

    /// Render a resource in one of the formats declared on the spec.
    async fn format_resource(
        &self,
        format: &str,
        _wrapper: &ResourceWrapper,
    ) -> Result<Response, ManagerError> {
        Err(unimplemented_op(format))
    }
}

/// The verbs a manager implements. Undeclared verbs are refused with 405
/// before dispatch, and the set derives the advertised `Allow` lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationSet {
    pub list: bool,
    pub get: bool,
    pub create: bool,
    pub modify: bool,
    pub delete: bool,
    pub list_filter: bool,
    pub get_all: bool,
    pub get_all_filter: bool,
}

impl OperationSet {
    pub fn new() -> Self {
        OperationSet::default()
    }

    /// Every CRUD verb plus plain listing.
    pub fn crud() -> Self {
        OperationSet {
            list: true,
            get: true,
            create: true,
            modify: true,
            delete: true,
            ..OperationSet::default()
        }
    }

    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    pub fn get(mut self) -> Self {
        self.get = true;
        self
    }

    pub fn create(mut self) -> Self {
        self.create = true;
        self
    }

    pub fn modify(mut self) -> Self {
        self.modify = true;
        self
    }

    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    pub fn list_filter(mut self) -> Self {
        self.list_filter = true;
        self
    }

    pub fn get_all(mut self) -> Self {
        self.get_all = true;
        self
    }

    pub fn get_all_filter(mut self) -> Self {
        self.get_all_filter = true;
        self
    }

    /// Methods advertised on collection URLs.
    pub fn collection_methods(&self) -> Vec<&'static str> {
        let mut methods = Vec::new();
        if self.list {
            methods.push("GET");
            methods.push("HEAD");
        }
        if self.create {
            methods.push("POST");
        }
        methods
    }

    /// Methods advertised on resource URLs.
    pub fn resource_methods(&self) -> Vec<&'static str> {
        let mut methods = Vec::new();
        if self.get {
            methods.push("GET");
            methods.push("HEAD");
        }
        if self.modify {
            methods.push("PUT");
        }
        if self.delete {
            methods.push("DELETE");
        }
        methods
    }
}

/// The managed classes of a manager: child managers mounted under each of
/// its resources.
///
/// `One` models an implicit 1:1 relationship; the child mounts without a
/// path segment of its own, so the parent's id already addresses it.
#[derive(Clone, Default)]
pub enum ManagedClasses {
    #[default]
    None,
    One(Arc<ManagerSpec>),
    Many(Vec<Arc<ManagerSpec>>),
}

impl ManagedClasses {
    pub fn children(&self) -> Vec<Arc<ManagerSpec>> {
        match self {
            ManagedClasses::None => Vec::new(),
            ManagedClasses::One(child) => vec![child.clone()],
            ManagedClasses::Many(children) => children.clone(),
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(self, ManagedClasses::Many(_))
    }
}

/// What a manager factory receives: the resolved parent resource (`None`
/// at the root of the tree) and the conf subtree of its mount point.
#[derive(Debug, Clone)]
pub struct ManagerContext {
    pub parent: Option<Resource>,
    pub conf: Conf,
}

type ManagerFactory = Arc<dyn Fn(ManagerContext) -> Box<dyn Manager> + Send + Sync>;

/// A custom POST verb on a resource, with its own parameter schema.
#[derive(Debug, Clone)]
pub struct ActionSpec {
    name: String,
    doc: String,
    fields: FieldSet,
}

impl ActionSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }
}

/// Startup errors raised while assembling manager specs or mounting them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    Field(FieldConfigError),
    MissingFactory(String),
    ActionCollision { manager: String, name: String },
    DuplicateChild { manager: String, token: String },
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecError::Field(err) => err.fmt(f),
            SpecError::MissingFactory(manager) => {
                write!(f, "{manager}: no manager factory registered")
            }
            SpecError::ActionCollision { manager, name } => {
                write!(f, "{manager}: action `{name}` collides with a managed class")
            }
            SpecError::DuplicateChild { manager, token } => {
                write!(f, "{manager}: two managed classes share the token `{token}`")
            }
        }
    }
}

impl std::error::Error for SpecError {}

impl From<FieldConfigError> for SpecError {
    fn from(err: FieldConfigError) -> Self {
        SpecError::Field(err)
    }
}

/// The declarative description of a manager: its name, documentation,
/// schema, verb table, children, actions, formats, and the factory that
/// instantiates the [`Manager`] per request.
#[derive(Clone)]
pub struct ManagerSpec {
    name: String,
    doc: String,
    fields: FieldSet,
    operations: OperationSet,
    managed: ManagedClasses,
    actions: Vec<ActionSpec>,
    formats: Vec<String>,
    factory: ManagerFactory,
}

impl ManagerSpec {
    pub fn builder(name: impl Into<String>) -> ManagerSpecBuilder {
        ManagerSpecBuilder {
            name: name.into(),
            doc: String::new(),
            fields: FieldSet::builder(),
            operations: OperationSet::default(),
            managed: ManagedClasses::None,
            actions: Vec::new(),
            formats: Vec::new(),
            factory: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn operations(&self) -> &OperationSet {
        &self.operations
    }

    pub fn managed(&self) -> &ManagedClasses {
        &self.managed
    }

    pub fn actions(&self) -> &[ActionSpec] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|action| action.name == name)
    }

    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    pub fn instantiate(&self, context: ManagerContext) -> Box<dyn Manager> {
        (self.factory)(context)
    }
}

impl fmt::Debug for ManagerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerSpec")
            .field("name", &self.name)
            .field("operations", &self.operations)
            .finish()
    }
}

/// Builder for a [`ManagerSpec`].
pub struct ManagerSpecBuilder {
    name: String,
    doc: String,
    fields: FieldSetBuilder,
    operations: OperationSet,
    managed: ManagedClasses,
    actions: Vec<(String, String, FieldSetBuilder)>,
    formats: Vec<String>,
    factory: Option<ManagerFactory>,
}

impl ManagerSpecBuilder {
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn field(mut self, field: crate::fields::FieldBuilder) -> Self {
        self.fields = self.fields.field(field);
        self
    }

    pub fn operations(mut self, operations: OperationSet) -> Self {
        self.operations = operations;
        self
    }

    /// Mount a single child manager without a path segment (1:1).
    pub fn managed_one(mut self, child: Arc<ManagerSpec>) -> Self {
        self.managed = ManagedClasses::One(child);
        self
    }

    /// Mount child managers, each under its own `name/` segment.
    pub fn managed_many(mut self, children: impl IntoIterator<Item = Arc<ManagerSpec>>) -> Self {
        self.managed = ManagedClasses::Many(children.into_iter().collect());
        self
    }

    /// Declare a custom action with its parameter fields.
    pub fn action(
        mut self,
        name: impl Into<String>,
        doc: impl Into<String>,
        fields: FieldSetBuilder,
    ) -> Self {
        self.actions.push((name.into(), doc.into(), fields));
        self
    }

    /// Declare a rendering format served through `?format=`.
    pub fn format(mut self, name: impl Into<String>) -> Self {
        self.formats.push(name.into());
        self
    }

    pub fn factory(
        mut self,
        factory: impl Fn(ManagerContext) -> Box<dyn Manager> + Send + Sync + 'static,
    ) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn build(self) -> Result<Arc<ManagerSpec>, SpecError> {
        let factory = self
            .factory
            .ok_or_else(|| SpecError::MissingFactory(self.name.clone()))?;
        let fields = self.fields.build()?;
        let mut actions = Vec::with_capacity(self.actions.len());
        for (name, doc, action_fields) in self.actions {
            actions.push(ActionSpec {
                name,
                doc,
                fields: action_fields.build()?,
            });
        }
        Ok(Arc::new(ManagerSpec {
            name: self.name,
            doc: self.doc,
            fields,
            operations: self.operations,
            managed: self.managed,
            actions,
            formats: self.formats,
            factory,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::ResourceField;

    struct Nothing;

    impl Manager for Nothing {}

    #[test]
    fn default_validate_id_rejects_bad_tokens() {
        let manager = Nothing;
        assert!(manager.validate_id("").is_err());
        assert!(manager.validate_id("a/b").is_err());
        assert_eq!(manager.validate_id("web1").unwrap(), Id::from("web1"));
    }

    #[test]
    fn id_display_matches_url_tokens() {
        assert_eq!(Id::from(42).to_string(), "42");
        assert_eq!(Id::from("web1").to_string(), "web1");
    }

    #[tokio::test]
    async fn unimplemented_operations_refuse() {
        let manager = Nothing;
        let err = manager.list_resources().await.unwrap_err();
        assert!(matches!(err, ManagerError::Internal(_)));
    }

    #[test]
    fn operation_set_advertises_methods() {
        let ops = OperationSet::crud();
        assert_eq!(ops.collection_methods(), vec!["GET", "HEAD", "POST"]);
        assert_eq!(ops.resource_methods(), vec!["GET", "HEAD", "PUT", "DELETE"]);

        let read_only = OperationSet::new().list().get();
        assert_eq!(read_only.collection_methods(), vec!["GET", "HEAD"]);
        assert_eq!(read_only.resource_methods(), vec!["GET", "HEAD"]);
    }

    #[test]
    fn manager_error_maps_to_http() {
        let err: HttpError = ManagerError::not_found(&Id::from("web1")).into();
        assert!(matches!(err, HttpError::NotFound(id) if id == "web1"));
        let err: HttpError = ManagerError::duplicate(&Id::from("web1")).into();
        assert!(matches!(err, HttpError::Duplicate(_)));
    }

    #[test]
    fn spec_without_factory_is_refused() {
        let err = ManagerSpec::builder("servers").build().unwrap_err();
        assert_eq!(err, SpecError::MissingFactory("servers".into()));
    }

    #[test]
    fn spec_builder_assembles() {
        let spec = ManagerSpec::builder("servers")
            .doc("The servers managed by this host")
            .field(ResourceField::string("name", "web1"))
            .operations(OperationSet::crud())
            .format("text")
            .action("reload", "Reload the server", FieldSet::builder())
            .factory(|_context| Box::new(Nothing))
            .build()
            .unwrap();
        assert_eq!(spec.name(), "servers");
        assert!(spec.action("reload").is_some());
        assert_eq!(spec.formats(), ["text"]);
        assert!(spec.fields().get("name").is_some());
    }
}
