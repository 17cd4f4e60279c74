//! Split/Pane rose tree with integer weights (spec §3 "Split node",
//! §4.C). Grounded in the teacher's `tree.rs` path-addressed recursion
//! (`compute_rects`, `remove_node`, `focus_pane_by_id`) but reworked:
//! percentages become positive-integer weights that travel with slots,
//! and every child carries its own weight instead of a parallel
//! `sizes: Vec<u16>` that can desync from `children.len()`.

use crate::ids::PaneId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone)]
pub enum Node {
    Pane(PaneId),
    Split {
        orientation: Orientation,
        /// Invariant: no Split contains a Split of the same orientation
        /// (flattened at construction, spec §3).
        children: Vec<(Node, u32)>,
    },
}

impl Node {
    pub fn leaf(id: PaneId) -> Self {
        Node::Pane(id)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Pane(_))
    }

    /// First pane in depth-first left-to-right order.
    pub fn first_pane_path(&self) -> Vec<usize> {
        match self {
            Node::Pane(_) => Vec::new(),
            Node::Split { children, .. } => {
                let mut path = vec![0];
                path.extend(children[0].0.first_pane_path());
                path
            }
        }
    }

    pub fn pane_at(&self, path: &[usize]) -> Option<PaneId> {
        match (self, path.first()) {
            (Node::Pane(id), None) => Some(*id),
            (Node::Split { children, .. }, Some(&idx)) => children.get(idx)?.0.pane_at(&path[1..]),
            _ => None,
        }
    }

    pub fn path_exists(&self, path: &[usize]) -> bool {
        match (self, path.first()) {
            (Node::Pane(_), None) => true,
            (Node::Split { children, .. }, Some(&idx)) => {
                children.get(idx).is_some_and(|(n, _)| n.path_exists(&path[1..]))
            }
            _ => false,
        }
    }

    /// All pane IDs with their paths, DFS left-to-right.
    pub fn panes(&self) -> Vec<(Vec<usize>, PaneId)> {
        fn rec(node: &Node, path: &mut Vec<usize>, out: &mut Vec<(Vec<usize>, PaneId)>) {
            match node {
                Node::Pane(id) => out.push((path.clone(), *id)),
                Node::Split { children, .. } => {
                    for (i, (child, _)) in children.iter().enumerate() {
                        path.push(i);
                        rec(child, path, out);
                        path.pop();
                    }
                }
            }
        }
        let mut out = Vec::new();
        rec(self, &mut Vec::new(), &mut out);
        out
    }

    pub fn pane_count(&self) -> usize {
        match self {
            Node::Pane(_) => 1,
            Node::Split { children, .. } => children.iter().map(|(c, _)| c.pane_count()).sum(),
        }
    }

    fn split_mut(&mut self, path: &[usize]) -> Option<&mut Vec<(Node, u32)>> {
        match self {
            Node::Split { children, .. } if path.is_empty() => Some(children),
            Node::Split { children, .. } => children.get_mut(*path.first()?)?.0.split_mut(&path[1..]),
            Node::Pane(_) => None,
        }
    }

    pub(crate) fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        match path.first() {
            None => Some(self),
            Some(&idx) => match self {
                Node::Split { children, .. } => children.get_mut(idx).map(|(n, _)| n)?.node_at_mut(&path[1..]),
                Node::Pane(_) => None,
            },
        }
    }

    /// Overwrite the pane identity at `path` in place (used by
    /// `rotate`, which permutes which pane occupies a slot without
    /// touching the tree shape or weights).
    pub fn set_pane_at(&mut self, path: &[usize], id: PaneId) {
        if let Some(Node::Pane(slot)) = self.node_at_mut(path) {
            *slot = id;
        }
    }

    /// Insert `new_leaf` next to the pane at `active_path`, per
    /// `add_pane`'s contract: if the active pane's parent already has
    /// the requested orientation, it becomes a sibling there;
    /// otherwise the active pane is wrapped in a fresh Split of that
    /// orientation, inheriting the active pane's old weight.
    pub fn add_pane_near(&mut self, active_path: &[usize], orientation: Orientation, new_leaf: PaneId) -> Vec<usize> {
        if active_path.is_empty() {
            // Root is itself the (only) pane: wrap it in a fresh Split.
            let old = std::mem::replace(self, Node::Pane(new_leaf));
            *self = Node::Split { orientation, children: vec![(old, 1), (Node::Pane(new_leaf), 1)] };
            return vec![1];
        }
        let parent_path = &active_path[..active_path.len().saturating_sub(1)];
        let leaf_idx = *active_path.last().unwrap();
        if let Some(Node::Split { orientation: parent_orientation, children }) = self.node_at_mut(parent_path) {
            if *parent_orientation == orientation {
                let weight = children[leaf_idx].1;
                children.insert(leaf_idx + 1, (Node::Pane(new_leaf), weight));
                let mut p = parent_path.to_vec();
                p.push(leaf_idx + 1);
                return p;
            }
        }
        // Different (or no) orientation at the parent: wrap the active leaf.
        if let Some(siblings) = self.split_mut(parent_path) {
            let (old_leaf, weight) = std::mem::replace(&mut siblings[leaf_idx], (Node::Pane(new_leaf), 1));
            siblings[leaf_idx] = (
                Node::Split { orientation, children: vec![(old_leaf, 1), (Node::Pane(new_leaf), 1)] },
                weight,
            );
        }
        let mut p = parent_path.to_vec();
        p.push(leaf_idx);
        p.push(1);
        p
    }

    /// Remove the pane at `path`. Collapses single-child Splits up the
    /// tree. Returns `None` if the whole tree became empty.
    pub fn remove_at(self, path: &[usize]) -> Option<Node> {
        match self {
            Node::Pane(_) => None,
            Node::Split { orientation, mut children } if path.len() == 1 => {
                children.remove(path[0]);
                collapse(orientation, children)
            }
            Node::Split { orientation, mut children } => {
                let idx = path[0];
                let (child, weight) = children.remove(idx);
                if let Some(replaced) = child.remove_at(&path[1..]) {
                    children.insert(idx, (replaced, weight));
                }
                collapse(orientation, children)
            }
        }
    }
}

fn collapse(orientation: Orientation, mut children: Vec<(Node, u32)>) -> Option<Node> {
    if children.is_empty() {
        return None;
    }
    if children.len() == 1 {
        return Some(children.remove(0).0);
    }
    Some(Node::Split { orientation, children })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: usize) -> PaneId {
        PaneId::for_test(n)
    }

    #[test]
    fn add_pane_to_single_leaf_wraps_into_split() {
        let mut root = Node::Pane(pid(1));
        let path = root.add_pane_near(&[], Orientation::Horizontal, pid(2));
        assert_eq!(path, vec![1]);
        assert_eq!(root.pane_count(), 2);
    }

    #[test]
    fn add_pane_same_orientation_inserts_as_sibling() {
        let mut root = Node::Split {
            orientation: Orientation::Horizontal,
            children: vec![(Node::Pane(pid(1)), 1), (Node::Pane(pid(2)), 1)],
        };
        let path = root.add_pane_near(&[0], Orientation::Horizontal, pid(3));
        assert_eq!(path, vec![1]);
        assert_eq!(root.pane_count(), 3);
        let panes: Vec<_> = root.panes().into_iter().map(|(_, id)| id).collect();
        assert_eq!(panes, vec![pid(1), pid(3), pid(2)]);
    }

    #[test]
    fn remove_pane_collapses_single_child_split() {
        let root = Node::Split {
            orientation: Orientation::Horizontal,
            children: vec![(Node::Pane(pid(1)), 1), (Node::Pane(pid(2)), 1)],
        };
        let result = root.remove_at(&[0]).unwrap();
        assert!(result.is_leaf());
        assert_eq!(result.pane_count(), 1);
    }

    #[test]
    fn remove_last_pane_empties_tree() {
        let root = Node::Pane(pid(1));
        assert!(root.remove_at(&[]).is_none());
    }
}
