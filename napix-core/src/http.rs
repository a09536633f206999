//! Re-export of the workspace HTTP vocabulary.
//!
//! `napix-http` owns the axum dependency; everything in this crate goes
//! through this module so the HTTP stack stays swappable in one place.

pub use napix_http::*;
