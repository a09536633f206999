//! The service tree: one [`CollectionService`] node per level of the URL
//! hierarchy, built eagerly from a root [`ManagerSpec`] and immutable
//! afterwards.
//!
//! Nodes live in an arena indexed by position; each node records its parent
//! index and the ordered chain of ancestor indices, so resolving a URL is
//! an index walk rather than pointer chasing.

mod request;
mod resolver;
mod router;

use std::sync::Arc;

use crate::conf::Conf;
use crate::lock::ResourceLock;
use crate::manager::{ManagedClasses, Manager, ManagerContext, ManagerSpec, Resource, SpecError};

/// One node of the URL tree: a manager class bound to its exact URL shape,
/// its conf subtree, and its position among its ancestors.
pub struct CollectionService {
    pub(crate) index: usize,
    pub(crate) spec: Arc<ManagerSpec>,
    pub(crate) conf: Conf,
    /// The path segment this node contributes, empty for segment-less
    /// mounts (the single-managed-class case).
    pub(crate) token: String,
    /// Ancestor indices from the root down to this node inclusive.
    pub(crate) chain: Vec<usize>,
    /// Indices of the children mounted under each resource of this node.
    pub(crate) children: Vec<usize>,
    /// Route pattern of the collection, ending with `/`.
    pub collection_url: String,
    /// Route pattern of a single resource, ending with a placeholder.
    pub resource_url: String,
    pub(crate) lock: Option<Arc<ResourceLock>>,
}

impl CollectionService {
    /// `name/` for segment-contributing nodes, empty otherwise.
    pub(crate) fn prefix(&self) -> String {
        if self.token.is_empty() {
            String::new()
        } else {
            format!("{}/", self.token)
        }
    }

    pub(crate) fn instantiate(&self, parent: Option<Resource>) -> Box<dyn Manager> {
        self.spec.instantiate(ManagerContext {
            parent,
            conf: self.conf.clone(),
        })
    }
}

pub(crate) struct ServiceInner {
    pub(crate) nodes: Vec<CollectionService>,
}

impl ServiceInner {
    pub(crate) fn node(&self, index: usize) -> &CollectionService {
        &self.nodes[index]
    }

    /// Build the concrete URL addressing `tokens` along the ancestor chain
    /// of `node`.
    pub(crate) fn make_url(&self, node: &CollectionService, tokens: &[String]) -> String {
        let mut url = String::new();
        for (i, &ancestor) in node.chain.iter().enumerate() {
            url.push('/');
            url.push_str(&self.nodes[ancestor].prefix());
            url.push_str(&tokens[i]);
        }
        url
    }
}

/// A mounted manager hierarchy: the tree of [`CollectionService`] nodes
/// derived from one root [`ManagerSpec`] and its managed classes.
pub struct Service {
    inner: Arc<ServiceInner>,
}

impl Service {
    /// Build the tree for `root` with its conf subtree.
    ///
    /// Child conf subtrees are taken from the section named after each
    /// child manager; a node's path token defaults to its manager name and
    /// can be overridden by the conf key `url`; the conf key `lock`
    /// attaches a per-resource lock to the node.
    pub fn new(root: Arc<ManagerSpec>, conf: Conf) -> Result<Service, SpecError> {
        let mut nodes = Vec::new();
        add_node(&mut nodes, None, root, conf, true)?;
        Ok(Service {
            inner: Arc::new(ServiceInner { nodes }),
        })
    }

    /// The collection URL pattern of the root node.
    pub fn url(&self) -> &str {
        &self.inner.nodes[0].collection_url
    }

    pub(crate) fn inner(&self) -> &Arc<ServiceInner> {
        &self.inner
    }

    #[cfg(test)]
    pub(crate) fn nodes(&self) -> &[CollectionService] {
        &self.inner.nodes
    }
}

// Cycles cannot arise here: a spec's managed classes are built before the
// spec itself, so the graph of Arc references is a DAG by construction.
fn add_node(
    nodes: &mut Vec<CollectionService>,
    parent: Option<usize>,
    spec: Arc<ManagerSpec>,
    conf: Conf,
    append_url: bool,
) -> Result<usize, SpecError> {
    let index = nodes.len();
    let token = if append_url {
        conf.str("url").unwrap_or(spec.name()).to_string()
    } else {
        String::new()
    };

    let mut chain = match parent {
        Some(parent_index) => nodes[parent_index].chain.clone(),
        None => Vec::new(),
    };
    chain.push(index);

    let mut base = String::from("/");
    let last = chain.len() - 1;
    for (i, &ancestor) in chain.iter().enumerate() {
        if i == last {
            base.push_str(&prefix_of(&token));
        } else {
            base.push_str(&nodes[ancestor].prefix());
            base.push_str(&format!("{{f{i}}}/"));
        }
    }
    let collection_url = base.clone();
    let resource_url = format!("{base}{{f{last}}}");

    let lock = conf
        .bool("lock")
        .unwrap_or(false)
        .then(|| Arc::new(ResourceLock::new()));

    nodes.push(CollectionService {
        index,
        spec: spec.clone(),
        conf: conf.clone(),
        token,
        chain,
        children: Vec::new(),
        collection_url,
        resource_url,
        lock,
    });

    let mut children = Vec::new();
    match spec.managed() {
        ManagedClasses::None => {}
        ManagedClasses::One(child) => {
            let child_conf = conf.section(child.name());
            children.push(add_node(nodes, Some(index), child.clone(), child_conf, false)?);
        }
        ManagedClasses::Many(specs) => {
            for child in specs {
                let child_conf = conf.section(child.name());
                children.push(add_node(nodes, Some(index), child.clone(), child_conf, true)?);
            }
        }
    }

    let mut tokens: Vec<&str> = Vec::with_capacity(children.len());
    for &child_index in &children {
        let child_token = nodes[child_index].token.as_str();
        if !child_token.is_empty() {
            if tokens.contains(&child_token) {
                return Err(SpecError::DuplicateChild {
                    manager: spec.name().to_string(),
                    token: child_token.to_string(),
                });
            }
            if spec.action(child_token).is_some() {
                return Err(SpecError::ActionCollision {
                    manager: spec.name().to_string(),
                    name: child_token.to_string(),
                });
            }
            tokens.push(child_token);
        }
    }
    nodes[index].children = children;

    Ok(index)
}

fn prefix_of(token: &str) -> String {
    if token.is_empty() {
        String::new()
    } else {
        format!("{token}/")
    }
}
