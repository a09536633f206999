//! HTTP vocabulary for the Napix workspace.
//!
//! This crate is the sole owner of the `axum` dependency. The rest of the
//! workspace imports `Router`, extractors, and response types from here so
//! that an axum upgrade touches a single crate.

pub use axum::Router;
pub use axum::Json;
pub use axum::serve;

pub use http::header;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};

pub mod body {
    pub use axum::body::{to_bytes, Body};
    pub use bytes::Bytes;
}

pub mod extract {
    pub use axum::extract::{Path, Query, RawPathParams, RawQuery, Request, State};
}

pub mod response {
    pub use axum::response::{IntoResponse, Redirect, Response};
}

pub mod routing {
    pub use axum::routing::{any, delete, get, post, put, MethodRouter};
}
