//! Binding a service tree onto an axum router.
//!
//! Every node registers its collection URL, its resource URL, the three
//! self-describing sub-routes, one route per declared action, and, for
//! nodes with several managed classes, the listing route on
//! `resource_url + "/"`. Path segments are extracted positionally, in the
//! order they appear in the pattern.

use crate::http::extract::{RawPathParams, Request};
use crate::http::routing::{any, get};
use crate::http::Router;

use super::{request, Service};

fn path_ids(params: &RawPathParams) -> Vec<String> {
    params.iter().map(|(_, value)| value.to_string()).collect()
}

impl Service {
    /// Build the router serving this tree.
    pub fn router(&self) -> Router {
        let mut router = Router::new();
        for node in &self.inner.nodes {
            let index = node.index;

            let svc = self.inner.clone();
            router = router.route(
                &format!("{}_napix_resource_fields", node.collection_url),
                get(move || request::resource_fields(svc.clone(), index)),
            );
            let svc = self.inner.clone();
            router = router.route(
                &format!("{}_napix_help", node.collection_url),
                get(move || request::help(svc.clone(), index)),
            );
            let svc = self.inner.clone();
            router = router.route(
                &format!("{}_napix_new", node.collection_url),
                get(move || request::example_resource(svc.clone(), index)),
            );

            let svc = self.inner.clone();
            router = router.route(
                &node.collection_url,
                any(move |params: RawPathParams, req: Request| {
                    request::collection(svc.clone(), index, path_ids(&params), req)
                }),
            );
            let svc = self.inner.clone();
            router = router.route(
                &node.resource_url,
                any(move |params: RawPathParams, req: Request| {
                    request::resource(svc.clone(), index, path_ids(&params), req)
                }),
            );

            if node.spec.managed().is_many() {
                let svc = self.inner.clone();
                router = router.route(
                    &format!("{}/", node.resource_url),
                    any(move |params: RawPathParams, req: Request| {
                        request::managed_classes(svc.clone(), index, path_ids(&params), req)
                    }),
                );
            }

            for action in node.spec.actions() {
                let svc = self.inner.clone();
                let name = action.name().to_string();
                router = router.route(
                    &format!("{}/{}", node.resource_url, action.name()),
                    any(move |params: RawPathParams, req: Request| {
                        request::action(svc.clone(), index, name.clone(), path_ids(&params), req)
                    }),
                );
            }
        }
        router
    }
}
