use std::collections::HashSet;

use sash_ipc::{SavedNode, WindowId};
use tracing::{debug, warn};

use super::tree::{NodeId, NodeKey, NodeTree};
use super::Shell;

impl<S: Shell> NodeTree<S> {
    /// Captures the tree shape as plain data.
    ///
    /// Only identities, nesting and work areas are recorded. Modes, weights
    /// and focus are runtime state and start fresh after a restore.
    pub fn to_saved(&self) -> SavedNode {
        self.saved_node(self.root()).unwrap_or(SavedNode::Unknown)
    }

    fn saved_node(&self, key: NodeKey) -> Option<SavedNode> {
        let parent_id = self
            .parent(key)
            .and_then(|parent| self.node_id(parent))
            .map(NodeId::raw);
        let work_area = self.work_area(key);
        match self.node_id(key)? {
            NodeId::Window(window) => Some(SavedNode::Window {
                id: window.0,
                work_area,
                parent_id,
            }),
            NodeId::Group(group) => {
                let leafs = self.container(key).map_or_else(Vec::new, |data| {
                    data.children()
                        .iter()
                        .filter_map(|&child| self.saved_node(child))
                        .collect()
                });
                Some(SavedNode::Workspace {
                    id: group,
                    work_area,
                    parent_id,
                    leafs,
                })
            }
        }
    }

    /// Rebuilds saved nesting under this tree's root.
    ///
    /// Saved windows that are not in `existing` are pruned, and so are
    /// containers whose windows all got pruned. Surviving nodes keep their
    /// ids and work areas; each restored container focuses its first child
    /// and starts in vertical mode with even splits.
    pub fn restore_into_root(&mut self, saved: &SavedNode, existing: &[WindowId]) {
        let _span = tracy_client::span!("NodeTree::restore_into_root");

        let SavedNode::Workspace { id, work_area, leafs, .. } = saved else {
            warn!("saved tree does not start with a workspace node, skipping it");
            return;
        };

        self.restore_root_scalars(*id, *work_area);

        let mut seen: HashSet<WindowId> = self.window_ids().into_iter().collect();
        let root = self.root();
        for child in leafs {
            if let Some(key) = self.restore_node(child, existing, &mut seen) {
                self.add_leaf(root, key);
            }
        }
    }

    fn restore_node(
        &mut self,
        saved: &SavedNode,
        existing: &[WindowId],
        seen: &mut HashSet<WindowId>,
    ) -> Option<NodeKey> {
        match saved {
            SavedNode::Window { id, work_area, .. } => {
                let id = WindowId(*id);
                if !existing.contains(&id) {
                    debug!("dropping saved window {id}: it is no longer around");
                    return None;
                }
                if !seen.insert(id) {
                    debug!("dropping saved window {id}: it appears twice");
                    return None;
                }
                Some(self.insert_detached_window(id, *work_area))
            }
            SavedNode::Workspace { id, work_area, leafs, .. } => {
                let children: Vec<NodeKey> = leafs
                    .iter()
                    .filter_map(|child| self.restore_node(child, existing, seen))
                    .collect();
                if children.is_empty() {
                    debug!("dropping saved group {id}: none of its windows are around");
                    return None;
                }
                let group = self.insert_detached_group(*id, *work_area);
                for child in children {
                    self.add_leaf(group, child);
                }
                Some(group)
            }
            SavedNode::Unknown => {
                warn!("skipping a node of unknown type in the saved layout");
                None
            }
        }
    }
}
