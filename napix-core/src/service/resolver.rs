//! Rebuilding the parent resource chain from a concrete URL path.

use crate::errors::HttpError;
use crate::manager::{Manager, Resource};

use super::ServiceInner;

impl ServiceInner {
    /// Instantiate the manager of the node at `index`, resolving every
    /// ancestor along the way.
    ///
    /// For each parent id, the ancestor's manager is constructed with the
    /// resource resolved so far (`None` at the root), the raw token is
    /// validated, and `get_resource` produces the next parent. A missing
    /// parent maps to 404, a malformed id to 400.
    pub(crate) async fn manager_for(
        &self,
        index: usize,
        parent_ids: &[String],
    ) -> Result<Box<dyn Manager>, HttpError> {
        let node = self.node(index);
        let mut parent: Option<Resource> = None;
        for (position, raw) in parent_ids.iter().enumerate() {
            let ancestor = self.node(node.chain[position]);
            let manager = ancestor.instantiate(parent.take());
            let id = manager.validate_id(raw)?;
            let resource = manager.get_resource(&id).await?;
            parent = Some(resource);
        }
        Ok(node.instantiate(parent))
    }
}
