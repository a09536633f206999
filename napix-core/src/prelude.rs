//! Napix prelude — import everything a manager module needs with a single
//! `use`.
//!
//! ```ignore
//! use napix_core::prelude::*;
//!
//! struct Hosts { conf: Conf }
//!
//! #[async_trait]
//! impl Manager for Hosts {
//!     async fn list_resources(&self) -> Result<Vec<Id>, ManagerError> {
//!         Ok(vec![Id::from("web1")])
//!     }
//! }
//! ```

pub use crate::builder::AppBuilder;
pub use crate::conf::Conf;
pub use crate::errors::{HttpError, ValidationError};
pub use crate::fields::{FieldSet, FieldType, ResourceField, Transform};
pub use crate::manager::{
    Id, ManagedClasses, Manager, ManagerContext, ManagerError, ManagerSpec, OperationSet, Params,
    Resource, ResourceWrapper,
};
pub use crate::service::Service;

pub use async_trait::async_trait;

pub use crate::http::response::{IntoResponse, Response};
pub use crate::http::{Json, Method, Router, StatusCode};
