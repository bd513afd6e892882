use std::collections::HashMap;
use std::rc::Rc;

use sash_ipc::{Direction, LayoutMode, Rect, WindowId};
use slotmap::{new_key_type, SlotMap};

use super::window::WindowLeaf;
use super::{Options, Shell, ShellWindow};

new_key_type! {
    /// Key to reference a node in a [`NodeTree`].
    pub struct NodeKey;
}

/// Stable identity of a node, independent of its arena key.
///
/// Window nodes carry the host's window id, containers get a synthetic group
/// id. The identity is what survives serialization and what split weights are
/// keyed by, so weights follow a child when it changes position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// A window leaf, identified by its window.
    Window(WindowId),
    /// A container, identified by a per-tree synthetic id.
    Group(u64),
}

impl NodeId {
    /// The id as a bare number, the way it is persisted.
    pub fn raw(self) -> u64 {
        match self {
            NodeId::Window(window) => window.0,
            NodeId::Group(group) => group,
        }
    }
}

#[derive(Debug)]
struct Node<W: ShellWindow> {
    id: NodeId,
    parent: Option<NodeKey>,
    work_area: Option<Rect>,
    data: NodeData<W>,
}

#[derive(Debug)]
enum NodeData<W: ShellWindow> {
    Container(ContainerData),
    Window(WindowLeaf<W>),
}

/// Layout state of a container node.
#[derive(Debug)]
pub struct ContainerData {
    children: Vec<NodeKey>,
    mode: LayoutMode,
    focused: Option<NodeKey>,
    /// Focus to fall back to when the focused child goes away.
    ///
    /// May point at a child that has since departed; it is validated against
    /// the current children before every use.
    last_focused: Option<NodeKey>,
    width_weights: HashMap<NodeId, f64>,
    height_weights: HashMap<NodeId, f64>,
}

impl ContainerData {
    fn new() -> Self {
        Self {
            children: Vec::new(),
            mode: LayoutMode::Vertical,
            focused: None,
            last_focused: None,
            width_weights: HashMap::new(),
            height_weights: HashMap::new(),
        }
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn mode(&self) -> LayoutMode {
        self.mode
    }

    pub fn focused(&self) -> Option<NodeKey> {
        self.focused
    }

    /// Weights for the axis the current mode splits along.
    fn split_weights(&self) -> Option<&HashMap<NodeId, f64>> {
        match self.mode {
            LayoutMode::Vertical => Some(&self.width_weights),
            LayoutMode::Horizontal => Some(&self.height_weights),
            LayoutMode::Stacking => None,
        }
    }

    fn split_weights_mut(&mut self) -> Option<&mut HashMap<NodeId, f64>> {
        match self.mode {
            LayoutMode::Vertical => Some(&mut self.width_weights),
            LayoutMode::Horizontal => Some(&mut self.height_weights),
            LayoutMode::Stacking => None,
        }
    }
}

/// One workspace's tree of containers and window leafs.
///
/// The tree always has a container at the root. Interior containers are kept
/// non-trivial: removals dissolve containers that end up with zero or one
/// child, the root being the only exception.
#[derive(Debug)]
pub struct NodeTree<S: Shell> {
    nodes: SlotMap<NodeKey, Node<S::Window>>,
    root: NodeKey,
    next_group_id: u64,
    shell: Rc<S>,
    options: Rc<Options>,
}

impl<S: Shell> NodeTree<S> {
    pub fn new(shell: Rc<S>, options: Rc<Options>) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node {
            id: NodeId::Group(0),
            parent: None,
            work_area: None,
            data: NodeData::Container(ContainerData::new()),
        });
        Self {
            nodes,
            root,
            next_group_id: 1,
            shell,
            options,
        }
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn container(&self, key: NodeKey) -> Option<&ContainerData> {
        match &self.nodes.get(key)?.data {
            NodeData::Container(data) => Some(data),
            NodeData::Window(_) => None,
        }
    }

    fn container_mut(&mut self, key: NodeKey) -> Option<&mut ContainerData> {
        match &mut self.nodes.get_mut(key)?.data {
            NodeData::Container(data) => Some(data),
            NodeData::Window(_) => None,
        }
    }

    fn is_container(&self, key: NodeKey) -> bool {
        self.container(key).is_some()
    }

    pub fn node_id(&self, key: NodeKey) -> Option<NodeId> {
        Some(self.nodes.get(key)?.id)
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(key)?.parent
    }

    pub fn work_area(&self, key: NodeKey) -> Option<Rect> {
        self.nodes.get(key)?.work_area
    }

    pub fn is_empty(&self) -> bool {
        self.container(self.root)
            .map_or(true, |data| data.children.is_empty())
    }

    /// Assigns the work area the whole tree lays out into.
    pub fn set_root_work_area(&mut self, area: Rect) {
        if let Some(node) = self.nodes.get_mut(self.root) {
            node.work_area = Some(area);
        }
    }

    pub fn show_root(&mut self) -> bool {
        self.show(self.root)
    }

    pub fn hide_root(&mut self) {
        self.hide(self.root);
    }

    fn alloc_group(&mut self) -> NodeKey {
        let id = self.next_group_id;
        self.next_group_id += 1;
        self.nodes.insert(Node {
            id: NodeId::Group(id),
            parent: None,
            work_area: None,
            data: NodeData::Container(ContainerData::new()),
        })
    }

    /// Attaches a detached node as the last child of `container`.
    ///
    /// Rejects unknown keys, the root, and nodes that are already attached
    /// somewhere. The first child attached to an empty container becomes its
    /// focused child.
    pub fn add_leaf(&mut self, container: NodeKey, node: NodeKey) -> bool {
        if node == self.root || node == container {
            return false;
        }
        match self.nodes.get(node) {
            Some(child) if child.parent.is_none() => (),
            _ => return false,
        }
        let Some(data) = self.container_mut(container) else {
            return false;
        };
        if data.children.contains(&node) {
            return false;
        }

        data.children.push(node);
        if data.focused.is_none() {
            data.focused = Some(node);
            data.last_focused = None;
        }
        if let Some(child) = self.nodes.get_mut(node) {
            child.parent = Some(container);
        }
        true
    }

    /// Creates a window leaf and attaches it to `container`.
    pub fn insert_window(
        &mut self,
        container: NodeKey,
        leaf: WindowLeaf<S::Window>,
    ) -> Option<NodeKey> {
        let key = self.nodes.insert(Node {
            id: NodeId::Window(leaf.id()),
            parent: None,
            work_area: None,
            data: NodeData::Window(leaf),
        });
        if self.add_leaf(container, key) {
            Some(key)
        } else {
            self.nodes.remove(key);
            None
        }
    }

    /// Detaches `child` from `container`, repairing focus.
    ///
    /// With `show`, the removed subtree is hidden and the remaining children
    /// are re-laid out; without it the container is left as is, for removals
    /// on inactive workspaces and for detaching a node that is about to be
    /// reattached elsewhere.
    ///
    /// The detached node stays in the arena, owned by no container.
    pub fn remove_leaf(&mut self, container: NodeKey, child: NodeKey, show: bool) -> bool {
        let Some(data) = self.container(container) else {
            return false;
        };
        let Some(idx) = data.children.iter().position(|&c| c == child) else {
            return false;
        };
        let child_id = self.nodes.get(child).map(|node| node.id);

        let Some(data) = self.container_mut(container) else {
            return false;
        };
        data.children.remove(idx);
        let was_focused = data.focused == Some(child);
        if data.last_focused == Some(child) {
            data.last_focused = None;
        }
        if let Some(id) = child_id {
            data.width_weights.remove(&id);
            data.height_weights.remove(&id);
        }

        if data.children.is_empty() {
            data.focused = None;
            data.last_focused = None;
        } else if was_focused {
            let next = data
                .last_focused
                .filter(|c| data.children.contains(c))
                .unwrap_or_else(|| data.children[idx.min(data.children.len() - 1)]);
            data.focused = Some(next);
            data.last_focused = None;
        }

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }

        if show {
            self.hide_node(child);
            if self
                .container(container)
                .is_some_and(|data| !data.children.is_empty())
            {
                self.show(container);
            }
        }
        true
    }

    /// Removes the leaf tracking `id` from wherever it sits in the tree and
    /// dissolves any containers left trivial by the removal.
    pub fn remove_window(&mut self, id: WindowId, show: bool) -> bool {
        let Some(leaf) = self.find_window(id) else {
            return false;
        };
        let Some(parent) = self.nodes.get(leaf).and_then(|node| node.parent) else {
            return false;
        };
        if !self.remove_leaf(parent, leaf, show) {
            return false;
        }
        self.nodes.remove(leaf);
        self.cleanup_containers(parent, show);
        true
    }

    /// Like [`NodeTree::remove_window`], but hands the leaf back so it can be
    /// attached to another tree.
    pub fn extract_window(&mut self, id: WindowId) -> Option<WindowLeaf<S::Window>> {
        let leaf = self.find_window(id)?;
        let parent = self.nodes.get(leaf).and_then(|node| node.parent)?;
        if !self.remove_leaf(parent, leaf, false) {
            return None;
        }
        let node = self.nodes.remove(leaf)?;
        self.cleanup_containers(parent, false);
        match node.data {
            NodeData::Window(leaf) => Some(leaf),
            NodeData::Container(_) => None,
        }
    }

    /// Dissolves trivial containers on the path from `from` up to the root.
    ///
    /// Empty containers are dropped, single-child containers are replaced by
    /// their child. The root never dissolves.
    fn cleanup_containers(&mut self, from: NodeKey, show: bool) {
        let mut current = from;
        while let Some(parent) = self.nodes.get(current).and_then(|node| node.parent) {
            match self.container(current).map(|data| data.children.len()) {
                Some(0) => {
                    self.remove_leaf(parent, current, show);
                    self.nodes.remove(current);
                }
                Some(1) => {
                    self.replace_with_only_child(parent, current);
                }
                _ => (),
            }
            current = parent;
        }
    }

    fn replace_with_only_child(&mut self, parent: NodeKey, container: NodeKey) {
        let Some(&child) = self
            .container(container)
            .and_then(|data| data.children.first())
        else {
            return;
        };
        let container_id = self.nodes.get(container).map(|node| node.id);
        let child_id = self.nodes.get(child).map(|node| node.id);
        let Some(idx) = self
            .container(parent)
            .and_then(|data| data.children.iter().position(|&c| c == container))
        else {
            return;
        };

        let Some(data) = self.container_mut(parent) else {
            return;
        };
        data.children[idx] = child;
        if data.focused == Some(container) {
            data.focused = Some(child);
        }
        if data.last_focused == Some(container) {
            data.last_focused = Some(child);
        }
        // The child inherits the dissolved container's split weights.
        if let (Some(container_id), Some(child_id)) = (container_id, child_id) {
            if let Some(weight) = data.width_weights.remove(&container_id) {
                data.width_weights.insert(child_id, weight);
            }
            if let Some(weight) = data.height_weights.remove(&container_id) {
                data.height_weights.insert(child_id, weight);
            }
        }

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
        self.nodes.remove(container);
    }

    /// Detaches `child` and prunes its weights, leaving focus and visibility
    /// alone.
    fn detach_child(&mut self, container: NodeKey, child: NodeKey) {
        let child_id = self.nodes.get(child).map(|node| node.id);
        let Some(data) = self.container_mut(container) else {
            return;
        };
        data.children.retain(|&c| c != child);
        if let Some(id) = child_id {
            data.width_weights.remove(&id);
            data.height_weights.remove(&id);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }
    }

    pub fn child_by_id(&self, container: NodeKey, id: NodeId) -> Option<NodeKey> {
        let data = self.container(container)?;
        data.children
            .iter()
            .copied()
            .find(|&child| self.nodes.get(child).is_some_and(|node| node.id == id))
    }

    pub fn find_window(&self, id: WindowId) -> Option<NodeKey> {
        self.find_window_under(self.root, id)
    }

    fn find_window_under(&self, key: NodeKey, id: WindowId) -> Option<NodeKey> {
        match &self.nodes.get(key)?.data {
            NodeData::Window(leaf) => (leaf.id() == id).then_some(key),
            NodeData::Container(data) => data
                .children
                .iter()
                .find_map(|&child| self.find_window_under(child, id)),
        }
    }

    pub fn contains_window(&self, id: WindowId) -> bool {
        self.find_window(id).is_some()
    }

    pub fn window_ids(&self) -> Vec<WindowId> {
        let mut ids = Vec::new();
        self.collect_window_ids(self.root, &mut ids);
        ids
    }

    fn collect_window_ids(&self, key: NodeKey, ids: &mut Vec<WindowId>) {
        match self.nodes.get(key).map(|node| &node.data) {
            Some(NodeData::Window(leaf)) => ids.push(leaf.id()),
            Some(NodeData::Container(data)) => {
                for &child in &data.children {
                    self.collect_window_ids(child, ids);
                }
            }
            None => (),
        }
    }

    /// The window at the end of the focus chain, starting from the root.
    pub fn focused_leaf(&self) -> Option<NodeKey> {
        let mut key = self.root;
        loop {
            match &self.nodes.get(key)?.data {
                NodeData::Window(_) => return Some(key),
                NodeData::Container(data) => key = data.focused?,
            }
        }
    }

    pub fn focused_window(&self) -> Option<WindowId> {
        match self.nodes.get(self.focused_leaf()?)?.id {
            NodeId::Window(id) => Some(id),
            NodeId::Group(_) => None,
        }
    }

    fn center(&self, key: NodeKey) -> Option<(f64, f64)> {
        Some(self.nodes.get(key)?.work_area?.center())
    }

    /// Finds the child of `container` nearest to the focused child in the
    /// given direction, comparing work-area centers.
    ///
    /// Distance ties go to the earlier child, which keeps the search
    /// deterministic when panes line up exactly.
    pub fn leaf_in_direction(&self, container: NodeKey, direction: Direction) -> Option<NodeKey> {
        let data = self.container(container)?;
        let focused = data.focused?;
        let (x, y) = self.center(focused)?;

        let mut best: Option<(NodeKey, f64)> = None;
        for &child in &data.children {
            if child == focused {
                continue;
            }
            let Some((child_x, child_y)) = self.center(child) else {
                continue;
            };
            let dx = child_x - x;
            let dy = child_y - y;
            let matches = match direction {
                Direction::Left => dx < 0.,
                Direction::Right => dx > 0.,
                Direction::Up => dy < 0.,
                Direction::Down => dy > 0.,
            };
            if !matches {
                continue;
            }
            let distance = dx * dx + dy * dy;
            if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                best = Some((child, distance));
            }
        }
        best.map(|(child, _)| child)
    }

    /// Moves the focus within this container, or within the focused nested
    /// container if it can handle the move itself.
    ///
    /// In stacking mode the focus cycles through the children; in the split
    /// modes it moves geometrically and stops at the edge.
    pub fn move_focus(&mut self, container: NodeKey, direction: Direction) -> bool {
        let Some(data) = self.container(container) else {
            return false;
        };
        let Some(focused) = data.focused else {
            return false;
        };

        // The deepest focused container gets the first try.
        if self.is_container(focused) && self.move_focus(focused, direction) {
            return true;
        }

        let Some(data) = self.container(container) else {
            return false;
        };
        let mode = data.mode;
        let target = match mode {
            LayoutMode::Stacking => {
                let n = data.children.len();
                let Some(idx) = data.children.iter().position(|&c| c == focused) else {
                    return false;
                };
                let next = match direction {
                    Direction::Left | Direction::Up => (idx + 1) % n,
                    Direction::Right | Direction::Down => idx.checked_sub(1).unwrap_or(n - 1),
                };
                data.children[next]
            }
            LayoutMode::Vertical | LayoutMode::Horizontal => {
                let Some(target) = self.leaf_in_direction(container, direction) else {
                    return false;
                };
                target
            }
        };

        let Some(data) = self.container_mut(container) else {
            return false;
        };
        data.last_focused = Some(focused);
        data.focused = Some(target);

        self.focus_node(target);
        if mode == LayoutMode::Stacking {
            // Restack so the new focus is in front.
            self.show(container);
        }
        true
    }

    /// Activates the window at the end of `key`'s focus chain.
    fn focus_node(&mut self, key: NodeKey) -> bool {
        if let Some(data) = self.container(key) {
            let Some(focused) = data.focused else {
                return false;
            };
            return self.focus_node(focused);
        }

        let shell = self.shell.clone();
        let options = self.options.clone();
        let Some(node) = self.nodes.get_mut(key) else {
            return false;
        };
        let area = node.work_area;
        match &mut node.data {
            NodeData::Window(leaf) => leaf.focus(&*shell, area, &options),
            NodeData::Container(_) => false,
        }
    }

    /// Focuses the direct child with the given id.
    ///
    /// Only looks at direct children; returns whether the id was found. The
    /// previous focus is not recorded, so a removal right after won't bounce
    /// back to it.
    pub fn set_focused_child(&mut self, container: NodeKey, id: NodeId) -> bool {
        let Some(data) = self.container(container) else {
            return false;
        };
        if let Some(focused) = data.focused {
            if self.nodes.get(focused).is_some_and(|node| node.id == id) {
                return true;
            }
        }
        let Some(child) = self.child_by_id(container, id) else {
            return false;
        };
        if let Some(data) = self.container_mut(container) {
            data.focused = Some(child);
        }
        true
    }

    /// Points the focus chain of every ancestor at the leaf tracking `id`.
    ///
    /// Returns false when the window is not in this tree.
    pub fn set_focused_window(&mut self, id: WindowId) -> bool {
        let Some(mut child) = self.find_window(id) else {
            return false;
        };
        while let Some(parent) = self.nodes.get(child).and_then(|node| node.parent) {
            if let Some(data) = self.container_mut(parent) {
                if data.focused != Some(child) {
                    data.last_focused = data.focused;
                    data.focused = Some(child);
                }
            }
            child = parent;
        }
        true
    }

    /// Advances the layout mode of the deepest focused container.
    pub fn cycle_mode(&mut self, container: NodeKey) {
        let Some(data) = self.container(container) else {
            return;
        };
        if let Some(focused) = data.focused {
            if self.is_container(focused) {
                self.cycle_mode(focused);
                return;
            }
        }

        let Some(data) = self.container_mut(container) else {
            return;
        };
        data.mode = data.mode.next();
        self.show(container);
    }

    /// Sets the layout mode of this container directly.
    pub fn set_mode(&mut self, container: NodeKey, mode: LayoutMode) {
        let Some(data) = self.container_mut(container) else {
            return;
        };
        if data.mode == mode {
            return;
        }
        data.mode = mode;
        self.show(container);
    }

    /// Grows the focused pane by `delta_px` along the split axis, at the
    /// expense of the next pane over (the previous one for the last child).
    ///
    /// Both panes are kept at or above the minimum pane size; the delta is
    /// clamped, not rejected, when it would push one of them below.
    pub fn resize(&mut self, container: NodeKey, delta_px: i32) {
        let Some(data) = self.container(container) else {
            return;
        };
        if let Some(focused) = data.focused {
            if self.is_container(focused) {
                self.resize(focused, delta_px);
                return;
            }
        }

        let Some(node) = self.nodes.get(container) else {
            return;
        };
        let Some(area) = node.work_area else {
            return;
        };
        let NodeData::Container(data) = &node.data else {
            return;
        };
        if data.mode == LayoutMode::Stacking || data.children.len() < 2 {
            return;
        }
        let Some(focused) = data.focused else {
            return;
        };
        let Some(idx) = data.children.iter().position(|&c| c == focused) else {
            return;
        };
        let neighbor = if idx + 1 < data.children.len() {
            data.children[idx + 1]
        } else {
            data.children[idx - 1]
        };

        let total_px = match data.mode {
            LayoutMode::Vertical => area.width,
            _ => area.height,
        };
        if total_px <= 0 {
            return;
        }

        let ids: Vec<NodeId> = data
            .children
            .iter()
            .filter_map(|&child| self.node_id(child))
            .collect();
        let Some(focused_id) = self.node_id(focused) else {
            return;
        };
        let Some(neighbor_id) = self.node_id(neighbor) else {
            return;
        };
        let min_pane = f64::from(self.options.min_pane_px);

        let Some(data) = self.container_mut(container) else {
            return;
        };
        let Some(weights) = data.split_weights_mut() else {
            return;
        };
        weights.entry(focused_id).or_insert(1.);
        weights.entry(neighbor_id).or_insert(1.);

        let total_weight: f64 = ids
            .iter()
            .map(|id| weights.get(id).copied().unwrap_or(1.))
            .sum();
        let px_per_weight = f64::from(total_px) / total_weight;
        let min_weight = min_pane / px_per_weight;
        let current = weights.get(&focused_id).copied().unwrap_or(1.);
        let current_neighbor = weights.get(&neighbor_id).copied().unwrap_or(1.);

        let lower = min_weight - current;
        let upper = current_neighbor - min_weight;
        if upper < lower {
            // Both panes are already at the floor.
            return;
        }
        let delta_weight = (f64::from(delta_px) / px_per_weight).clamp(lower, upper);
        if delta_weight == 0. {
            return;
        }

        if let Some(weight) = weights.get_mut(&focused_id) {
            *weight += delta_weight;
        }
        if let Some(weight) = weights.get_mut(&neighbor_id) {
            *weight -= delta_weight;
        }

        self.show(container);
    }

    /// Swaps the focused child with its neighbor in the given direction.
    pub fn move_window(&mut self, container: NodeKey, direction: Direction) -> bool {
        let Some(data) = self.container(container) else {
            return false;
        };
        if data.mode == LayoutMode::Stacking {
            return false;
        }
        let Some(focused) = data.focused else {
            return false;
        };
        if self.is_container(focused) {
            return self.move_window(focused, direction);
        }

        let Some(target) = self.leaf_in_direction(container, direction) else {
            return false;
        };
        let Some(data) = self.container_mut(container) else {
            return false;
        };
        let Some(a) = data.children.iter().position(|&c| c == focused) else {
            return false;
        };
        let Some(b) = data.children.iter().position(|&c| c == target) else {
            return false;
        };
        data.children.swap(a, b);

        self.show(container);
        true
    }

    /// Groups the focused child and its neighbor in the given direction into
    /// a fresh nested container, which is appended and becomes the focused
    /// child.
    pub fn join_window(&mut self, container: NodeKey, direction: Direction) -> bool {
        let Some(node) = self.nodes.get(container) else {
            return false;
        };
        let area = node.work_area;
        let NodeData::Container(data) = &node.data else {
            return false;
        };
        if data.mode == LayoutMode::Stacking {
            return false;
        }
        let Some(focused) = data.focused else {
            return false;
        };
        let Some(neighbor) = self.leaf_in_direction(container, direction) else {
            return false;
        };
        if neighbor == focused {
            return false;
        }

        let group = self.alloc_group();
        if let Some(node) = self.nodes.get_mut(group) {
            node.work_area = area;
        }

        self.detach_child(container, focused);
        self.detach_child(container, neighbor);
        // Neighbor first: it becomes the nested container's focused child.
        self.add_leaf(group, neighbor);
        self.add_leaf(group, focused);
        self.add_leaf(container, group);

        if let Some(data) = self.container_mut(container) {
            data.focused = Some(group);
            // Dangles on purpose; membership is checked before use.
            data.last_focused = Some(focused);
        }

        self.show(container);
        true
    }

    /// Lays the container out into its work area and shows every child.
    pub fn show(&mut self, container: NodeKey) -> bool {
        let _span = tracy_client::span!("NodeTree::show");

        let Some(node) = self.nodes.get(container) else {
            return false;
        };
        let Some(area) = node.work_area else {
            return false;
        };
        let NodeData::Container(data) = &node.data else {
            return false;
        };
        if data.children.is_empty() {
            return false;
        }

        let placements = match data.mode {
            LayoutMode::Vertical | LayoutMode::Horizontal => self.split_placements(container, area),
            LayoutMode::Stacking => self.stack_placements(container, area),
        };
        for (child, rect) in placements {
            self.assign_work_area(child, rect);
            self.show_node(child);
        }
        true
    }

    /// Hides every window in the container's subtree.
    pub fn hide(&mut self, container: NodeKey) {
        let Some(data) = self.container(container) else {
            return;
        };
        for child in data.children.clone() {
            self.hide_node(child);
        }
    }

    fn split_placements(&self, container: NodeKey, area: Rect) -> Vec<(NodeKey, Rect)> {
        let Some(data) = self.container(container) else {
            return Vec::new();
        };
        let total = match data.mode {
            LayoutMode::Vertical => area.width,
            LayoutMode::Horizontal => area.height,
            LayoutMode::Stacking => return Vec::new(),
        };
        let weights: Vec<f64> = data
            .children
            .iter()
            .map(|&child| self.child_weight(data, child))
            .collect();
        let extents = split_extents(&weights, total, self.options.min_pane_px);

        let mut offset = 0;
        data.children
            .iter()
            .zip(extents)
            .map(|(&child, extent)| {
                let rect = match data.mode {
                    LayoutMode::Vertical => {
                        Rect::new(area.x + offset, area.y, extent, area.height)
                    }
                    _ => Rect::new(area.x, area.y + offset, area.width, extent),
                };
                offset += extent;
                (child, rect)
            })
            .collect()
    }

    fn child_weight(&self, data: &ContainerData, child: NodeKey) -> f64 {
        let Some(weights) = data.split_weights() else {
            return 1.;
        };
        self.nodes
            .get(child)
            .and_then(|node| weights.get(&node.id))
            .copied()
            .unwrap_or(1.)
    }

    fn stack_placements(&self, container: NodeKey, area: Rect) -> Vec<(NodeKey, Rect)> {
        let Some(data) = self.container(container) else {
            return Vec::new();
        };
        let overlap = self.options.stack_overlap_px;

        // Back to front, with the focused child in front.
        let mut ordered: Vec<NodeKey> = data
            .children
            .iter()
            .copied()
            .filter(|&child| Some(child) != data.focused)
            .collect();
        if let Some(focused) = data.focused {
            ordered.push(focused);
        }

        ordered
            .into_iter()
            .enumerate()
            .map(|(i, child)| {
                let step = overlap * i as i32;
                let rect = Rect::new(
                    area.x + step,
                    area.y + step,
                    (area.width - step).max(1),
                    (area.height - step).max(1),
                );
                (child, rect)
            })
            .collect()
    }

    fn assign_work_area(&mut self, key: NodeKey, rect: Rect) {
        let shell = self.shell.clone();
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        node.work_area = Some(rect);
        if let NodeData::Window(leaf) = &mut node.data {
            leaf.apply_work_area(&*shell, rect);
        }
    }

    fn show_node(&mut self, key: NodeKey) {
        if self.is_container(key) {
            self.show(key);
            return;
        }
        let shell = self.shell.clone();
        if let Some(node) = self.nodes.get_mut(key) {
            if let NodeData::Window(leaf) = &mut node.data {
                leaf.show(&*shell);
            }
        }
    }

    fn hide_node(&mut self, key: NodeKey) {
        if self.is_container(key) {
            self.hide(key);
            return;
        }
        let shell = self.shell.clone();
        if let Some(node) = self.nodes.get_mut(key) {
            if let NodeData::Window(leaf) = &mut node.data {
                leaf.hide(&*shell);
            }
        }
    }

    // Low-level constructors for the restore path.

    pub(crate) fn restore_root_scalars(&mut self, id: u64, area: Option<Rect>) {
        self.bump_group_counter(id);
        let root = self.root;
        if let Some(node) = self.nodes.get_mut(root) {
            node.id = NodeId::Group(id);
            node.work_area = area;
        }
    }

    pub(crate) fn insert_detached_window(&mut self, id: WindowId, area: Option<Rect>) -> NodeKey {
        self.nodes.insert(Node {
            id: NodeId::Window(id),
            parent: None,
            work_area: area,
            data: NodeData::Window(WindowLeaf::new(id)),
        })
    }

    pub(crate) fn insert_detached_group(&mut self, id: u64, area: Option<Rect>) -> NodeKey {
        self.bump_group_counter(id);
        self.nodes.insert(Node {
            id: NodeId::Group(id),
            parent: None,
            work_area: area,
            data: NodeData::Container(ContainerData::new()),
        })
    }

    /// Keeps fresh group ids clear of the ones a restore brought back.
    pub(crate) fn bump_group_counter(&mut self, id: u64) {
        self.next_group_id = self.next_group_id.max(id.saturating_add(1));
    }
}

/// Splits `total` pixels between weighted panes so the extents sum to exactly
/// `total`.
///
/// Fractional shares are floored and the rounding leftover goes to the largest
/// remainders, earlier panes first on ties. When the total can afford it,
/// every pane is then raised to `min_extent`, paid for by shrinking the
/// largest panes.
fn split_extents(weights: &[f64], total: i32, min_extent: i32) -> Vec<i32> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }
    if total <= 0 {
        return vec![0; n];
    }

    let weight_sum: f64 = weights.iter().sum();
    let mut extents = Vec::with_capacity(n);
    let mut remainders = Vec::with_capacity(n);
    let mut allocated = 0;
    for &weight in weights {
        let exact = weight / weight_sum * f64::from(total);
        let base = exact.floor();
        extents.push(base as i32);
        remainders.push(exact - base);
        allocated += base as i32;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        remainders[b]
            .partial_cmp(&remainders[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let mut leftover = total - allocated;
    let mut i = 0;
    while leftover > 0 {
        extents[order[i % n]] += 1;
        leftover -= 1;
        i += 1;
    }

    // The minimum only applies when the area can hold every pane at the
    // minimum; otherwise the allocation is left untouched so the sum stays
    // exact.
    if total >= min_extent * n as i32 {
        let mut overflow = 0;
        for extent in &mut extents {
            if *extent < min_extent {
                overflow += min_extent - *extent;
                *extent = min_extent;
            }
        }
        while overflow > 0 {
            let mut largest: Option<usize> = None;
            for (idx, &extent) in extents.iter().enumerate() {
                if extent > min_extent && largest.map_or(true, |l| extent > extents[l]) {
                    largest = Some(idx);
                }
            }
            let Some(idx) = largest else {
                break;
            };
            extents[idx] -= 1;
            overflow -= 1;
        }
    }

    extents
}

#[cfg(test)]
impl<S: Shell> NodeTree<S> {
    /// Renders the tree as an indented listing, for snapshot assertions.
    pub fn debug_tree(&self) -> String {
        let mut out = String::new();
        self.debug_tree_node(self.root, 0, self.focused_leaf(), &mut out);
        out
    }

    fn debug_tree_node(
        &self,
        key: NodeKey,
        depth: usize,
        focused: Option<NodeKey>,
        out: &mut String,
    ) {
        use std::fmt::Write as _;

        let indent = "  ".repeat(depth);
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        match &node.data {
            NodeData::Container(data) => {
                let mode = match data.mode {
                    LayoutMode::Vertical => "Vertical",
                    LayoutMode::Horizontal => "Horizontal",
                    LayoutMode::Stacking => "Stacking",
                };
                let _ = writeln!(out, "{indent}{mode}");
                for &child in &data.children {
                    self.debug_tree_node(child, depth + 1, focused, out);
                }
            }
            NodeData::Window(leaf) => {
                let marker = if Some(key) == focused { " *" } else { "" };
                let _ = writeln!(out, "{indent}Window {}{marker}", leaf.id());
            }
        }
    }

    pub fn set_node_work_area(&mut self, key: NodeKey, area: Rect) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.work_area = Some(area);
        }
    }

    pub fn verify_invariants(&self) {
        let mut seen = 0;
        self.verify_node(self.root, None, &mut seen);
        assert_eq!(
            seen,
            self.nodes.len(),
            "arena holds nodes not reachable from the root"
        );

        let mut ids = self.window_ids();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total, "duplicate window ids in the tree");
    }

    fn verify_node(&self, key: NodeKey, parent: Option<NodeKey>, seen: &mut usize) {
        *seen += 1;
        let node = self.nodes.get(key).unwrap();
        assert_eq!(node.parent, parent, "stale parent backlink");
        match &node.data {
            NodeData::Window(leaf) => {
                assert_eq!(node.id, NodeId::Window(leaf.id()));
            }
            NodeData::Container(data) => {
                assert!(matches!(node.id, NodeId::Group(_)));
                match data.focused {
                    Some(focused) => assert!(
                        data.children.contains(&focused),
                        "focused child is not a member"
                    ),
                    None => assert!(
                        data.children.is_empty(),
                        "non-empty container without a focused child"
                    ),
                }
                for weight in data
                    .width_weights
                    .values()
                    .chain(data.height_weights.values())
                {
                    assert!(*weight > 0., "non-positive split weight");
                }
                for &child in &data.children {
                    self.verify_node(child, Some(key), seen);
                }
            }
        }
    }
}
