use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::geometry::{PaneViewport, clamp_ratio};

/// Terminal id carried by a leaf. Doubles as the session id in the registry.
pub type PaneId = u32;

/// Stable handle to a node in the tree arena.
pub type NodeId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitDirection {
    Horizontal, // side by side (left | right)
    Vertical,   // stacked (top / bottom)
}

impl SplitDirection {
    pub fn flipped(self) -> Self {
        match self {
            SplitDirection::Horizontal => SplitDirection::Vertical,
            SplitDirection::Vertical => SplitDirection::Horizontal,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Leaf {
        pane: PaneId,
    },
    Split {
        direction: SplitDirection,
        /// Fraction of the extent given to `children[0]`, kept in [0.1, 0.9].
        ratio: f32,
        children: [NodeId; 2],
    },
}

#[derive(Clone, Debug)]
pub struct Node {
    /// Non-owning back-reference; ownership flows from the root down.
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

/// A draggable divider between the two children of a split node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Divider {
    pub node: NodeId,
    pub direction: SplitDirection,
    pub ratio: f32,
    /// Rectangle covered by the whole split; ratio deltas are relative to it.
    pub container: PaneViewport,
}

/// Binary tree of splits stored in an arena. Each leaf is a terminal pane.
///
/// Nodes unreachable from `root` are deleted from the arena as soon as they
/// are detached, so the arena only ever holds the live tree.
#[derive(Default)]
pub struct SplitTree {
    nodes: HashMap<NodeId, Node>,
    root: Option<NodeId>,
    next_node: NodeId,
}

impl SplitTree {
    pub fn new() -> Self {
        SplitTree::default()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Number of leaves (panes) in the tree.
    pub fn len(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| matches!(n.kind, NodeKind::Leaf { .. }))
            .count()
    }

    fn alloc(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = self.next_node;
        self.next_node += 1;
        self.nodes.insert(id, Node { parent, kind });
        id
    }

    /// Build a detached leaf. It joins the tree only through `set_root` or a split.
    pub fn create_leaf(&mut self, pane: PaneId) -> NodeId {
        self.alloc(None, NodeKind::Leaf { pane })
    }

    /// Install a detached node (a leaf or a subtree built with `join`) as the
    /// root of an empty tree.
    pub fn set_root(&mut self, node: NodeId) {
        assert!(self.root.is_none(), "set_root on a non-empty tree");
        assert!(
            matches!(self.nodes.get(&node), Some(Node { parent: None, .. })),
            "set_root with an attached or unknown node"
        );
        self.root = Some(node);
    }

    /// Combine two detached subtrees under a new detached split node.
    pub fn join(&mut self, direction: SplitDirection, ratio: f32, first: NodeId, second: NodeId) -> NodeId {
        debug_assert!(self.nodes.get(&first).is_some_and(|n| n.parent.is_none()));
        debug_assert!(self.nodes.get(&second).is_some_and(|n| n.parent.is_none()));
        let split = self.alloc(
            None,
            NodeKind::Split { direction, ratio: clamp_ratio(ratio), children: [first, second] },
        );
        self.set_parent(first, Some(split));
        self.set_parent(second, Some(split));
        split
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(&id), Some(Node { kind: NodeKind::Leaf { .. }, .. }))
    }

    pub fn pane_of(&self, id: NodeId) -> Option<PaneId> {
        match self.nodes.get(&id)?.kind {
            NodeKind::Leaf { pane } => Some(pane),
            NodeKind::Split { .. } => None,
        }
    }

    /// Split `leaf`: the original stays first (left/top), the new pane goes second.
    /// Returns the new leaf.
    pub fn split(&mut self, leaf: NodeId, direction: SplitDirection, new_pane: PaneId) -> NodeId {
        self.insert_beside(leaf, new_pane, direction, false)
    }

    /// Replace `target` with a 50/50 split holding `target` and a new leaf for `pane`.
    /// `first` puts the new leaf in the first (left/top) slot.
    pub fn insert_beside(
        &mut self,
        target: NodeId,
        pane: PaneId,
        direction: SplitDirection,
        first: bool,
    ) -> NodeId {
        assert!(self.is_leaf(target), "split target {target} is not a leaf");
        debug_assert!(self.find_leaf(pane).is_none(), "pane {pane} already in tree");

        let new_leaf = self.create_leaf(pane);
        let children = if first { [new_leaf, target] } else { [target, new_leaf] };
        let internal = self.alloc(None, NodeKind::Split { direction, ratio: 0.5, children });

        self.replace_in_slot(target, internal);
        self.set_parent(target, Some(internal));
        self.set_parent(new_leaf, Some(internal));
        new_leaf
    }

    /// Remove `leaf` from the tree. Its sibling takes over the parent's slot.
    /// Removing the root leaf empties the tree.
    pub fn remove(&mut self, leaf: NodeId) {
        assert!(self.is_leaf(leaf), "remove of non-leaf node {leaf}");

        if self.root == Some(leaf) {
            self.root = None;
            self.nodes.remove(&leaf);
            return;
        }

        let parent = self.nodes[&leaf].parent.expect("detached leaf passed to remove");
        let sibling = match self.nodes[&parent].kind {
            NodeKind::Split { children: [a, b], .. } => {
                if a == leaf { b } else { a }
            }
            NodeKind::Leaf { .. } => unreachable!("leaf {parent} has a child"),
        };

        self.replace_in_slot(parent, sibling);
        self.nodes.remove(&leaf);
        self.nodes.remove(&parent);
    }

    /// Put `new` where `old` currently sits (root or a child slot of old's parent).
    fn replace_in_slot(&mut self, old: NodeId, new: NodeId) {
        let parent = self.nodes[&old].parent;
        self.set_parent(new, parent);
        match parent {
            None => {
                debug_assert_eq!(self.root, Some(old));
                self.root = Some(new);
            }
            Some(p) => {
                if let Some(Node { kind: NodeKind::Split { children, .. }, .. }) = self.nodes.get_mut(&p) {
                    let idx = if children[0] == old { 0 } else { 1 };
                    debug_assert_eq!(children[idx], old);
                    children[idx] = new;
                }
            }
        }
    }

    fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = parent;
        }
    }

    /// Depth-first search for the leaf holding `pane`.
    pub fn find_leaf(&self, pane: PaneId) -> Option<NodeId> {
        fn walk(tree: &SplitTree, id: NodeId, pane: PaneId) -> Option<NodeId> {
            match tree.nodes[&id].kind {
                NodeKind::Leaf { pane: p } => (p == pane).then_some(id),
                NodeKind::Split { children: [a, b], .. } => {
                    walk(tree, a, pane).or_else(|| walk(tree, b, pane))
                }
            }
        }
        walk(self, self.root?, pane)
    }

    pub fn contains(&self, pane: PaneId) -> bool {
        self.find_leaf(pane).is_some()
    }

    /// Visit every leaf depth-first, left to right.
    pub fn for_each_leaf<F: FnMut(NodeId, PaneId)>(&self, f: &mut F) {
        fn walk<F: FnMut(NodeId, PaneId)>(tree: &SplitTree, id: NodeId, f: &mut F) {
            match tree.nodes[&id].kind {
                NodeKind::Leaf { pane } => f(id, pane),
                NodeKind::Split { children: [a, b], .. } => {
                    walk(tree, a, f);
                    walk(tree, b, f);
                }
            }
        }
        if let Some(root) = self.root {
            walk(self, root, f);
        }
    }

    pub fn pane_ids(&self) -> Vec<PaneId> {
        let mut ids = Vec::new();
        self.for_each_leaf(&mut |_, pane| ids.push(pane));
        ids
    }

    /// The first (leftmost/topmost) pane, used as the fallback focus.
    pub fn first_pane(&self) -> Option<PaneId> {
        let mut id = self.root?;
        loop {
            match self.nodes[&id].kind {
                NodeKind::Leaf { pane } => return Some(pane),
                NodeKind::Split { children: [a, _], .. } => id = a,
            }
        }
    }

    /// Exchange the panes held by two leaves. No structural change.
    pub fn swap_panes(&mut self, a: PaneId, b: PaneId) -> bool {
        let (Some(leaf_a), Some(leaf_b)) = (self.find_leaf(a), self.find_leaf(b)) else {
            return false;
        };
        if let Some(Node { kind: NodeKind::Leaf { pane }, .. }) = self.nodes.get_mut(&leaf_a) {
            *pane = b;
        }
        if let Some(Node { kind: NodeKind::Leaf { pane }, .. }) = self.nodes.get_mut(&leaf_b) {
            *pane = a;
        }
        true
    }

    pub fn set_ratio(&mut self, node: NodeId, new_ratio: f32) -> bool {
        match self.nodes.get_mut(&node) {
            Some(Node { kind: NodeKind::Split { ratio, .. }, .. }) => {
                *ratio = clamp_ratio(new_ratio);
                true
            }
            _ => false,
        }
    }

    pub fn toggle_direction(&mut self, node: NodeId) -> bool {
        match self.nodes.get_mut(&node) {
            Some(Node { kind: NodeKind::Split { direction, .. }, .. }) => {
                *direction = direction.flipped();
                true
            }
            _ => false,
        }
    }

    /// Walk the tree, computing viewports by splitting according to ratios.
    /// Calls `f` for each leaf with its pane and computed viewport.
    pub fn for_each_pane_with_viewport<F: FnMut(PaneId, PaneViewport)>(&self, vp: PaneViewport, f: &mut F) {
        fn walk<F: FnMut(PaneId, PaneViewport)>(tree: &SplitTree, id: NodeId, vp: PaneViewport, f: &mut F) {
            match tree.nodes[&id].kind {
                NodeKind::Leaf { pane } => f(pane, vp),
                NodeKind::Split { direction, ratio, children: [a, b] } => {
                    let (first, second) = vp.split(direction, ratio);
                    walk(tree, a, first, f);
                    walk(tree, b, second, f);
                }
            }
        }
        if let Some(root) = self.root {
            walk(self, root, vp, f);
        }
    }

    /// Hit-test: find which pane contains the pixel coordinate (x, y)
    /// within the given total viewport. Returns the pane and its viewport.
    pub fn hit_test(&self, x: f32, y: f32, vp: PaneViewport) -> Option<(PaneId, PaneViewport)> {
        if !vp.contains(x, y) {
            return None;
        }
        let mut hit = None;
        self.for_each_pane_with_viewport(vp, &mut |pane, pane_vp| {
            if hit.is_none() && pane_vp.contains(x, y) {
                hit = Some((pane, pane_vp));
            }
        });
        hit
    }

    /// Compute the viewport for a specific pane by id.
    pub fn viewport_for_pane(&self, pane: PaneId, vp: PaneViewport) -> Option<PaneViewport> {
        let mut found = None;
        self.for_each_pane_with_viewport(vp, &mut |p, pane_vp| {
            if p == pane {
                found = Some(pane_vp);
            }
        });
        found
    }

    /// All split dividers with the rectangle each one partitions, outermost first.
    pub fn dividers(&self, vp: PaneViewport) -> Vec<Divider> {
        fn walk(tree: &SplitTree, id: NodeId, vp: PaneViewport, out: &mut Vec<Divider>) {
            if let NodeKind::Split { direction, ratio, children: [a, b] } = tree.nodes[&id].kind {
                out.push(Divider { node: id, direction, ratio, container: vp });
                let (first, second) = vp.split(direction, ratio);
                walk(tree, a, first, out);
                walk(tree, b, second, out);
            }
        }
        let mut out = Vec::new();
        if let Some(root) = self.root {
            walk(self, root, vp, &mut out);
        }
        out
    }

    /// Check the structural invariants: two children per split, consistent
    /// parent links, distinct panes, clamped ratios, and no orphaned nodes.
    pub fn validate(&self) -> Result<(), String> {
        let Some(root) = self.root else {
            return if self.nodes.is_empty() {
                Ok(())
            } else {
                Err(format!("empty tree holds {} orphaned nodes", self.nodes.len()))
            };
        };
        if self.nodes[&root].parent.is_some() {
            return Err(format!("root {root} has a parent"));
        }

        let mut seen_nodes = 0usize;
        let mut panes = std::collections::HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            seen_nodes += 1;
            let node = self.nodes.get(&id).ok_or(format!("dangling node {id}"))?;
            match node.kind {
                NodeKind::Leaf { pane } => {
                    if !panes.insert(pane) {
                        return Err(format!("pane {pane} appears twice"));
                    }
                }
                NodeKind::Split { ratio, children, .. } => {
                    if !(0.1..=0.9).contains(&ratio) {
                        return Err(format!("node {id} ratio {ratio} out of range"));
                    }
                    if children[0] == children[1] {
                        return Err(format!("node {id} lists the same child twice"));
                    }
                    for child in children {
                        let child_node = self.nodes.get(&child).ok_or(format!("dangling child {child}"))?;
                        if child_node.parent != Some(id) {
                            return Err(format!("child {child} does not point back to {id}"));
                        }
                        stack.push(child);
                    }
                }
            }
        }
        if seen_nodes != self.nodes.len() {
            return Err(format!("{} nodes unreachable from root", self.nodes.len() - seen_nodes));
        }
        Ok(())
    }
}
