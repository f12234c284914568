use indexmap::IndexMap;

use crate::store::NodeId;

/// Index of every live node by `linkId`, in tree order.
///
/// Repeating groups register one node per instance under the same linkId,
/// so each entry holds all of them; the repeating-group container itself is
/// registered first.
#[derive(Debug, Default, Clone)]
pub struct Scope {
    entries: IndexMap<String, Vec<NodeId>>,
}

impl Scope {
    pub(crate) fn register(&mut self, link_id: &str, node: NodeId) {
        self.entries.entry(link_id.to_string()).or_default().push(node);
    }

    pub(crate) fn deregister(&mut self, link_id: &str, node: NodeId) {
        if let Some(nodes) = self.entries.get_mut(link_id) {
            nodes.retain(|candidate| *candidate != node);
            if nodes.is_empty() {
                self.entries.shift_remove(link_id);
            }
        }
    }

    /// First registered node for `link_id`.
    pub fn lookup_node(&self, link_id: &str) -> Option<NodeId> {
        self.entries.get(link_id)?.first().copied()
    }

    /// Every registered node for `link_id`, in registration order.
    pub fn lookup_all(&self, link_id: &str) -> &[NodeId] {
        self.entries
            .get(link_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, link_id: &str) -> bool {
        self.entries.contains_key(link_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
