//! Builder for assembling a Napix application.
//!
//! Collects root manager specs and the configuration tree, then produces an
//! `axum::Router` (or starts serving directly) with everything wired
//! together. Each registered spec becomes one [`Service`] tree; its conf
//! subtree is the section named after the manager.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::conf::Conf;
use crate::http::Router;
use crate::layers::default_trace;
use crate::manager::{ManagerSpec, SpecError};
use crate::service::Service;

#[derive(Default)]
pub struct AppBuilder {
    conf: Conf,
    services: Vec<Service>,
}

impl AppBuilder {
    pub fn new() -> Self {
        AppBuilder::default()
    }

    /// Install the configuration tree. Call before registering managers;
    /// each manager reads the section named after it.
    pub fn with_conf(mut self, conf: Conf) -> Self {
        self.conf = conf;
        self
    }

    /// Mount a root manager. A schema or mount error refuses the whole
    /// application rather than serving a partial tree.
    pub fn register(mut self, spec: Arc<ManagerSpec>) -> Result<Self, SpecError> {
        let conf = self.conf.section(spec.name());
        let service = Service::new(spec, conf)?;
        info!(url = service.url(), "mounted manager");
        self.services.push(service);
        Ok(self)
    }

    /// Assemble the router for every mounted service.
    pub fn build(self) -> Router {
        let mut router = Router::new();
        for service in &self.services {
            router = router.merge(service.router());
        }
        router.layer(default_trace())
    }

    /// Serve until ctrl-c.
    pub async fn serve(self, addr: SocketAddr) -> std::io::Result<()> {
        let router = self.build();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "listening");
        crate::http::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::ResourceField;
    use crate::manager::{Manager, ManagerSpec, OperationSet};

    struct Nothing;

    impl Manager for Nothing {}

    #[test]
    fn register_reports_spec_errors() {
        let bad = ManagerSpec::builder("broken")
            .field(ResourceField::typed("x", crate::fields::FieldType::String))
            .operations(OperationSet::new().list())
            .factory(|_context| Box::new(Nothing));
        assert!(bad.build().is_err());
    }

    #[test]
    fn build_merges_registered_services() {
        let spec = ManagerSpec::builder("servers")
            .field(ResourceField::string("name", "web1"))
            .operations(OperationSet::new().list().get())
            .factory(|_context| Box::new(Nothing))
            .build()
            .unwrap();
        let router = AppBuilder::new().register(spec).unwrap().build();
        let _ = router;
    }
}
