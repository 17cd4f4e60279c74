//! Window and Arrangement (spec §3 "Window"/"Arrangement", §4.C).

use std::collections::HashMap;

use crate::ids::{ClientId, PaneId, WindowId};

use super::layout::{self, LayoutTag};
use super::split::{Node, Orientation};
use super::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

pub struct Window {
    pub id: WindowId,
    pub root: Node,
    pub chosen_name: Option<String>,
    pub active_path: Vec<usize>,
    previous_active_pane: Option<PaneId>,
    pub previous_selected_layout: Option<LayoutTag>,
    pub zoomed: bool,
}

impl Window {
    pub fn new(id: WindowId, first_pane: PaneId) -> Self {
        Window {
            id,
            root: Node::Pane(first_pane),
            chosen_name: None,
            active_path: Vec::new(),
            previous_active_pane: None,
            previous_selected_layout: None,
            zoomed: false,
        }
    }

    pub fn active_pane(&self) -> Option<PaneId> {
        self.root.pane_at(&self.active_path)
    }

    pub fn panes(&self) -> Vec<(Vec<usize>, PaneId)> {
        self.root.panes()
    }

    pub fn pane_count(&self) -> usize {
        self.root.pane_count()
    }

    pub fn add_pane(&mut self, orientation: Orientation, new_pane: PaneId) {
        let path = self.root.add_pane_near(&self.active_path, orientation, new_pane);
        self.previous_active_pane = self.active_pane();
        self.active_path = path;
        self.zoomed = false;
    }

    /// Remove `pane` from the tree. Returns true if the window is now
    /// empty — the caller must then drop this Window from the
    /// Arrangement.
    pub fn remove_pane(&mut self, pane: PaneId) -> bool {
        let Some((path, _)) = self.panes().into_iter().find(|(_, id)| *id == pane) else {
            return self.pane_count() == 0;
        };
        let removing_active = path == self.active_path;
        let root = std::mem::replace(&mut self.root, Node::Pane(pane));
        match root.remove_at(&path) {
            Some(new_root) => {
                self.root = new_root;
                if removing_active || !self.root.path_exists(&self.active_path) {
                    self.active_path = self
                        .previous_active_pane
                        .and_then(|p| self.root.panes().into_iter().find(|(_, id)| *id == p).map(|(p, _)| p))
                        .unwrap_or_else(|| self.root.first_pane_path());
                }
                self.previous_active_pane = None;
                self.zoomed = false;
                false
            }
            None => true,
        }
    }

    /// Remove the active pane and return it so the caller can re-home
    /// it as the sole pane of a brand-new window (`break_pane`).
    pub fn break_active_pane(&mut self) -> Option<(PaneId, bool)> {
        let active = self.active_pane()?;
        let now_empty = self.remove_pane(active);
        Some((active, now_empty))
    }

    pub fn focus_next(&mut self) {
        self.step_focus(1);
    }

    pub fn focus_previous(&mut self) {
        self.step_focus(-1);
    }

    fn step_focus(&mut self, delta: i32) {
        let panes = self.panes();
        if panes.is_empty() {
            return;
        }
        let idx = panes.iter().position(|(p, _)| p == &self.active_path).unwrap_or(0) as i32;
        let n = panes.len() as i32;
        let next = ((idx + delta) % n + n) % n;
        self.previous_active_pane = self.active_pane();
        self.active_path = panes[next as usize].0.clone();
    }

    pub fn focus_last(&mut self) {
        if let Some(p) = self.previous_active_pane {
            if let Some((path, _)) = self.panes().into_iter().find(|(_, id)| *id == p) {
                self.previous_active_pane = self.active_pane();
                self.active_path = path;
            }
        }
    }

    /// Step one cell past the active pane's border in `dir` and pick
    /// the pane containing that point, using the renderer's last
    /// known rectangles. No-op if no such pane exists (edge pane).
    pub fn focus_direction(&mut self, dir: Direction, rects: &HashMap<PaneId, Rect>) {
        let Some(active) = self.active_pane() else { return };
        let Some(&from) = rects.get(&active) else { return };
        let probe = match dir {
            Direction::Left => (from.x.checked_sub(1), Some(from.y + from.height / 2)),
            Direction::Right => (Some(from.x + from.width), Some(from.y + from.height / 2)),
            Direction::Up => (Some(from.x + from.width / 2), from.y.checked_sub(1)),
            Direction::Down => (Some(from.x + from.width / 2), Some(from.y + from.height)),
        };
        let (Some(px), Some(py)) = probe else { return };
        for (path, pane) in self.panes() {
            if pane == active {
                continue;
            }
            if rects.get(&pane).is_some_and(|r| r.contains(px, py)) {
                self.previous_active_pane = Some(active);
                self.active_path = path;
                return;
            }
        }
    }

    pub fn select_layout(&mut self, tag: LayoutTag) {
        let panes = self.panes();
        if panes.is_empty() {
            return;
        }
        let active_idx = panes.iter().position(|(p, _)| p == &self.active_path).unwrap_or(0);
        let ids: Vec<PaneId> = panes.into_iter().map(|(_, id)| id).collect();
        let (root, path) = layout::apply(tag, &ids, active_idx);
        self.root = root;
        self.active_path = path;
        self.previous_selected_layout = Some(tag);
        self.zoomed = false;
    }

    /// Permute pane identities cyclically across slots by `count`.
    /// Weights stay with their slot; only which pane occupies it
    /// changes. `before_only`/`after_only` restrict the rotation to
    /// the active pane and its immediate predecessor/successor slot.
    pub fn rotate(&mut self, count: i32, before_only: bool, after_only: bool) {
        let panes = self.panes();
        let n = panes.len();
        if n < 2 {
            return;
        }
        let idx = panes.iter().position(|(p, _)| p == &self.active_path).unwrap_or(0);
        let (start, len) = if before_only {
            (if idx == 0 { n - 1 } else { idx - 1 }, 2)
        } else if after_only {
            (idx, 2)
        } else {
            (0, n)
        };
        let slot_indices: Vec<usize> = (0..len).map(|i| (start + i) % n).collect();
        let ids: Vec<PaneId> = slot_indices.iter().map(|&i| panes[i].1).collect();
        let shift = (((count % len as i32) + len as i32) % len as i32) as usize;
        for (i, &slot_idx) in slot_indices.iter().enumerate() {
            let new_id = ids[(i + len - shift) % len];
            self.root.set_pane_at(&panes[slot_idx].0, new_id);
        }
    }

    /// Grow/shrink the active pane along `dir` by `delta` weight units
    /// (spec §4.C `resize`). Walks the active pane's ancestor Splits
    /// from deepest to shallowest looking for one whose orientation
    /// matches `dir` and where the active branch has a neighbor on
    /// that side; the first match donates (or receives) weight between
    /// the active branch and that neighbor, clamped so neither side
    /// drops below weight 1. If the active pane sits at the edge of
    /// every matching split, retries once on the opposite side with
    /// the delta negated, mirroring tmux's "push the other way" corner
    /// behavior.
    pub fn resize_active(&mut self, dir: Direction, delta: i32) {
        if delta == 0 || self.try_resize(dir, delta) {
            return;
        }
        let opposite = match dir {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        };
        self.try_resize(opposite, -delta);
    }

    fn try_resize(&mut self, dir: Direction, delta: i32) -> bool {
        let orientation = match dir {
            Direction::Left | Direction::Right => Orientation::Vertical,
            Direction::Up | Direction::Down => Orientation::Horizontal,
        };
        let grows_toward_end = matches!(dir, Direction::Right | Direction::Down);
        let path = self.active_path.clone();
        for depth in (0..path.len()).rev() {
            let parent_path = &path[..depth];
            let child_idx = path[depth];
            let Some(Node::Split { orientation: o, children }) = self.root.node_at_mut(parent_path) else {
                continue;
            };
            if *o != orientation {
                continue;
            }
            let at_edge = if grows_toward_end { child_idx + 1 >= children.len() } else { child_idx == 0 };
            if at_edge {
                continue;
            }
            // Donor indices ordered nearest-first: if the immediate
            // neighbor can't spare the whole delta, the remainder is
            // absorbed from the next one further along the same side.
            let donors: Vec<usize> = if grows_toward_end {
                ((child_idx + 1)..children.len()).collect()
            } else {
                (0..child_idx).rev().collect()
            };
            if delta > 0 {
                let mut remaining = delta as u32;
                for donor in donors {
                    if remaining == 0 {
                        break;
                    }
                    let avail = children[donor].1.saturating_sub(1);
                    let moved = remaining.min(avail);
                    children[donor].1 -= moved;
                    children[child_idx].1 += moved;
                    remaining -= moved;
                }
            } else {
                let avail = children[child_idx].1.saturating_sub(1);
                let moved = ((-delta) as u32).min(avail);
                children[child_idx].1 -= moved;
                children[donors[0]].1 += moved;
            }
            return true;
        }
        false
    }

    pub fn toggle_zoom(&mut self) {
        self.zoomed = !self.zoomed;
    }

    pub fn clear_zoom(&mut self) {
        self.zoomed = false;
    }

    /// `chosen_name`, else the caller-supplied fallback (active pane's
    /// name or running-command basename, else `(noname)`).
    pub fn effective_name(&self, fallback: impl FnOnce() -> String) -> String {
        self.chosen_name.clone().unwrap_or_else(fallback)
    }
}

/// Owns the ordered list of Windows and, per client, the active and
/// previously-active window (spec §3 "Arrangement").
pub struct Arrangement {
    pub windows: Vec<Window>,
    pub base_index: u32,
    active_window: HashMap<ClientId, WindowId>,
    previous_window: HashMap<ClientId, WindowId>,
}

impl Arrangement {
    pub fn new(base_index: u32) -> Self {
        Arrangement {
            windows: Vec::new(),
            base_index,
            active_window: HashMap::new(),
            previous_window: HashMap::new(),
        }
    }

    pub fn window(&self, id: WindowId) -> Option<&Window> {
        self.windows.iter().find(|w| w.id == id)
    }

    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.windows.iter_mut().find(|w| w.id == id)
    }

    pub fn index_of(&self, id: WindowId) -> Option<usize> {
        self.windows.iter().position(|w| w.id == id)
    }

    pub fn add_window(&mut self, window: Window) {
        self.windows.push(window);
    }

    /// Remove a window that just became empty. Every client whose
    /// active (or previous) window was this one advances to the next
    /// window, circularly.
    pub fn remove_window(&mut self, id: WindowId) {
        let Some(idx) = self.index_of(id) else { return };
        self.windows.remove(idx);
        if self.windows.is_empty() {
            self.active_window.clear();
            self.previous_window.clear();
            return;
        }
        let next_idx = idx.min(self.windows.len() - 1);
        let next_id = self.windows[next_idx].id;
        for w in self.active_window.values_mut() {
            if *w == id {
                *w = next_id;
            }
        }
        for w in self.previous_window.values_mut() {
            if *w == id {
                *w = next_id;
            }
        }
    }

    pub fn active_window_for(&self, client: ClientId) -> Option<WindowId> {
        self.active_window.get(&client).copied()
    }

    pub fn set_active_window(&mut self, client: ClientId, window: WindowId) {
        if self.index_of(window).is_none() {
            return;
        }
        if let Some(cur) = self.active_window.get(&client).copied() {
            if cur != window {
                self.previous_window.insert(client, cur);
            }
        }
        self.active_window.insert(client, window);
    }

    pub fn select_next_window(&mut self, client: ClientId) {
        self.step_window(client, 1);
    }

    pub fn select_previous_window(&mut self, client: ClientId) {
        self.step_window(client, -1);
    }

    fn step_window(&mut self, client: ClientId, delta: i32) {
        let Some(cur) = self.active_window_for(client) else { return };
        let Some(idx) = self.index_of(cur) else { return };
        let n = self.windows.len() as i32;
        if n == 0 {
            return;
        }
        let next = ((idx as i32 + delta) % n + n) % n;
        let next_id = self.windows[next as usize].id;
        self.set_active_window(client, next_id);
    }

    pub fn select_window_by_index(&mut self, client: ClientId, index: u32) {
        let Some(raw) = index.checked_sub(self.base_index) else { return };
        if let Some(w) = self.windows.get(raw as usize) {
            let id = w.id;
            self.set_active_window(client, id);
        }
    }

    pub fn select_last_window(&mut self, client: ClientId) {
        if let Some(&prev) = self.previous_window.get(&client) {
            if self.index_of(prev).is_some() {
                self.set_active_window(client, prev);
            }
        }
    }

    pub fn window_number(&self, id: WindowId) -> Option<u32> {
        self.index_of(id).map(|i| i as u32 + self.base_index)
    }

    pub fn remove_client(&mut self, client: ClientId) {
        self.active_window.remove(&client);
        self.previous_window.remove(&client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: usize) -> PaneId {
        PaneId::for_test(n)
    }

    #[test]
    fn add_pane_then_focus_next_previous_cycles() {
        let mut w = Window::new(WindowId::for_test(1), pid(1));
        w.add_pane(Orientation::Horizontal, pid(2));
        w.add_pane(Orientation::Horizontal, pid(3));
        assert_eq!(w.pane_count(), 3);
        w.focus_next();
        let after_one = w.active_pane();
        w.focus_previous();
        w.focus_previous();
        assert_ne!(w.active_pane(), after_one);
    }

    #[test]
    fn remove_active_pane_advances_focus() {
        let mut w = Window::new(WindowId::for_test(1), pid(1));
        w.add_pane(Orientation::Horizontal, pid(2));
        let active = w.active_pane().unwrap();
        assert_eq!(active, pid(2));
        let empty = w.remove_pane(active);
        assert!(!empty);
        assert_eq!(w.active_pane(), Some(pid(1)));
    }

    #[test]
    fn removing_last_pane_reports_window_empty() {
        let mut w = Window::new(WindowId::for_test(1), pid(1));
        assert!(w.remove_pane(pid(1)));
    }

    #[test]
    fn rotate_after_only_swaps_active_and_successor() {
        let mut w = Window::new(WindowId::for_test(1), pid(1));
        w.add_pane(Orientation::Horizontal, pid(2));
        w.add_pane(Orientation::Horizontal, pid(3));
        w.active_path = vec![0];
        w.rotate(1, false, true);
        let ids: Vec<PaneId> = w.panes().into_iter().map(|(_, id)| id).collect();
        assert_eq!(ids[0], pid(2));
        assert_eq!(ids[1], pid(1));
    }

    #[test]
    fn resize_right_shifts_weight_from_main_vertical_sibling() {
        let mut w = Window::new(WindowId::for_test(1), pid(1));
        w.add_pane(Orientation::Horizontal, pid(2));
        w.add_pane(Orientation::Horizontal, pid(3));
        w.select_layout(LayoutTag::MainVertical);
        assert_eq!(w.active_path, vec![0]);
        w.resize_active(Direction::Right, 10);
        if let Node::Split { children, .. } = &w.root {
            assert_eq!(children[0].1, 110);
            assert_eq!(children[1].1, 90);
        } else {
            panic!("expected vertical split");
        }
    }

    #[test]
    fn resize_at_edge_retries_on_opposite_side() {
        let mut w = Window::new(WindowId::for_test(1), pid(1));
        w.root = Node::Split {
            orientation: Orientation::Vertical,
            children: vec![(Node::Pane(pid(1)), 5), (Node::Pane(pid(2)), 3)],
        };
        w.active_path = vec![1];
        // Active pane is already the rightmost leaf; growing further
        // right has no neighbor, so the pane shrinks from its own left
        // edge instead, growing the left neighbor.
        w.resize_active(Direction::Right, 2);
        if let Node::Split { children, .. } = &w.root {
            assert_eq!(children[0].1, 7);
            assert_eq!(children[1].1, 1);
        } else {
            panic!("expected vertical split");
        }
    }

    #[test]
    fn remove_window_advances_clients_to_next_window() {
        let mut arr = Arrangement::new(0);
        let w1 = Window::new(WindowId::for_test(1), pid(1));
        let w2 = Window::new(WindowId::for_test(2), pid(2));
        let w1id = w1.id;
        let w2id = w2.id;
        arr.add_window(w1);
        arr.add_window(w2);
        let client = ClientId::for_test(1);
        arr.set_active_window(client, w1id);
        arr.remove_window(w1id);
        assert_eq!(arr.active_window_for(client), Some(w2id));
    }
}
