pub mod builder;
pub mod conf;
pub mod errors;
pub mod fields;
pub mod http;
pub mod layers;
pub mod lock;
pub mod manager;
pub mod prelude;
pub mod service;

pub use builder::AppBuilder;
pub use conf::{Conf, ConfError};
pub use errors::{HttpError, ValidationError};
pub use fields::{
    FieldBuilder, FieldConfigError, FieldSet, FieldSetBuilder, FieldType, ResourceField,
    Transform,
};
pub use layers::{default_trace, init_tracing};
pub use lock::ResourceLock;
pub use manager::{
    ActionSpec, Id, ManagedClasses, Manager, ManagerContext, ManagerError, ManagerSpec,
    ManagerSpecBuilder, OperationSet, Params, Resource, ResourceWrapper, SpecError,
};
pub use service::Service;

pub use async_trait::async_trait;
pub use serde_json;
