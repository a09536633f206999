//! Napix — a self-describing REST framework.
//!
//! Domain logic is written as *managers*: a declarative field schema plus a
//! small set of verb operations. The framework derives the URL tree,
//! validates input against the schema, dispatches HTTP verbs to manager
//! operations, and serialises results back to JSON. Managers declare
//! *managed classes* to produce arbitrarily deep hierarchies
//! (`/parent/:id/child/:id/...`), and every collection exposes the
//! `_napix_*` endpoints describing itself to clients.
//!
//! ```ignore
//! use napix::prelude::*;
//!
//! let servers = ManagerSpec::builder("servers")
//!     .doc("The servers managed by this host")
//!     .field(ResourceField::string("name", "web1"))
//!     .field(ResourceField::int("port", 80))
//!     .operations(OperationSet::crud())
//!     .factory(|context| Box::new(ServerManager::new(context)))
//!     .build()?;
//!
//! AppBuilder::new()
//!     .with_conf(Conf::load("settings.json")?)
//!     .register(servers)?
//!     .serve("127.0.0.1:8002".parse()?)
//!     .await?;
//! ```

pub use napix_core::*;

#[cfg(feature = "store")]
pub use napix_store as store;

pub mod prelude {
    pub use napix_core::prelude::*;

    #[cfg(feature = "store")]
    pub use napix_store::{Backend, DirectoryBackend, FileBackend, Store, StoreError, StorePool};
}
