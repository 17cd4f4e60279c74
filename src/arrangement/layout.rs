//! Predefined layout tags (spec §4.C `select_layout`). Rebuilds the
//! tree from the current DFS pane order while preserving pane
//! identity, then resets every weight to 1.

use crate::ids::PaneId;

use super::split::{Node, Orientation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutTag {
    EvenHorizontal,
    EvenVertical,
    MainHorizontal,
    MainVertical,
    Tiled,
}

impl LayoutTag {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "even-horizontal" => Some(LayoutTag::EvenHorizontal),
            "even-vertical" => Some(LayoutTag::EvenVertical),
            "main-horizontal" => Some(LayoutTag::MainHorizontal),
            "main-vertical" => Some(LayoutTag::MainVertical),
            "tiled" => Some(LayoutTag::Tiled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutTag::EvenHorizontal => "even-horizontal",
            LayoutTag::EvenVertical => "even-vertical",
            LayoutTag::MainHorizontal => "main-horizontal",
            LayoutTag::MainVertical => "main-vertical",
            LayoutTag::Tiled => "tiled",
        }
    }
}

/// Base weight handed to every pane by a predefined layout. Plain `1`
/// would leave `resize_active` no headroom to shift share away from a
/// neighbor (a weight can't drop below 1), so layouts start every pane
/// with slack to spend.
const BASE_WEIGHT: u32 = 100;

fn even_split(orientation: Orientation, panes: &[PaneId]) -> Node {
    Node::Split {
        orientation,
        children: panes.iter().map(|&id| (Node::Pane(id), BASE_WEIGHT)).collect(),
    }
}

/// Apply `tag` to the pane list `panes` (DFS order, `panes[active]` is
/// the window's active pane). Returns the new root and the new active
/// path. A single-pane window always collapses to `even-horizontal`
/// (a bare leaf).
pub fn apply(tag: LayoutTag, panes: &[PaneId], active: usize) -> (Node, Vec<usize>) {
    if panes.len() <= 1 {
        return (Node::Pane(panes[0]), Vec::new());
    }
    match tag {
        LayoutTag::EvenHorizontal => {
            let root = even_split(Orientation::Horizontal, panes);
            (root, vec![active])
        }
        LayoutTag::EvenVertical => {
            let root = even_split(Orientation::Vertical, panes);
            (root, vec![active])
        }
        LayoutTag::MainHorizontal => {
            let main = panes[active];
            let others: Vec<PaneId> = panes.iter().copied().enumerate().filter(|(i, _)| *i != active).map(|(_, p)| p).collect();
            let root = Node::Split {
                orientation: Orientation::Horizontal,
                children: vec![(Node::Pane(main), BASE_WEIGHT), (even_split(Orientation::Vertical, &others), BASE_WEIGHT)],
            };
            (root, vec![0])
        }
        LayoutTag::MainVertical => {
            let main = panes[active];
            let others: Vec<PaneId> = panes.iter().copied().enumerate().filter(|(i, _)| *i != active).map(|(_, p)| p).collect();
            let root = Node::Split {
                orientation: Orientation::Vertical,
                children: vec![(Node::Pane(main), BASE_WEIGHT), (even_split(Orientation::Horizontal, &others), BASE_WEIGHT)],
            };
            (root, vec![0])
        }
        LayoutTag::Tiled => {
            let n = panes.len();
            let cols = (n as f64).sqrt().ceil() as usize;
            let rows = (n + cols - 1) / cols;
            let mut row_nodes = Vec::with_capacity(rows);
            let mut active_path = vec![0, 0];
            let mut idx = 0;
            for r in 0..rows {
                let take = cols.min(n - idx);
                let row_panes = &panes[idx..idx + take];
                if let Some(pos) = row_panes.iter().position(|&p| p == panes[active]) {
                    active_path = vec![r, pos];
                }
                row_nodes.push((even_split(Orientation::Vertical, row_panes), 1));
                idx += take;
            }
            let root = Node::Split { orientation: Orientation::Horizontal, children: row_nodes };
            (root, active_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PaneId;

    fn ids(n: usize) -> Vec<PaneId> {
        (1..=n).map(PaneId::for_test).collect()
    }

    #[test]
    fn single_pane_collapses_to_leaf() {
        let panes = ids(1);
        let (root, path) = apply(LayoutTag::EvenHorizontal, &panes, 0);
        assert!(root.is_leaf());
        assert!(path.is_empty());
    }

    #[test]
    fn tiled_four_panes_is_2x2() {
        let panes = ids(4);
        let (root, _) = apply(LayoutTag::Tiled, &panes, 0);
        assert_eq!(root.pane_count(), 4);
        if let Node::Split { children, .. } = &root {
            assert_eq!(children.len(), 2);
        } else {
            panic!("expected vertical split of rows");
        }
    }

    #[test]
    fn main_vertical_puts_active_first() {
        let panes = ids(3);
        let (root, path) = apply(LayoutTag::MainVertical, &panes, 1);
        assert_eq!(path, vec![0]);
        assert_eq!(root.panes()[0].1, panes[1]);
    }
}
