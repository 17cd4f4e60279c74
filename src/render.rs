//! Renderer (spec §4.D): composes every attached client's frame from
//! the shared arrangement + per-pane screens, and serializes it to the
//! ANSI bytes shipped over the wire as an `out` packet (spec §4.F).
//!
//! Grounded in the teacher's `rendering::render_node` tree walk (weight
//! distribution, separator drawing, active-pane highlighting) but
//! reworked for this crate's split: the teacher renders into a local
//! `ratatui::Frame` that its own process then paints to its own
//! terminal, whereas here the *server* owns every pixel and clients
//! are dumb — so `render_client` produces a finished cell grid and
//! `encode_frame` turns that into literal terminal bytes, the way
//! `karlb-termstack`'s `terminal::render` module renders a `Screen`
//! into a diffable cell buffer before it ever reaches a pty consumer.

use std::collections::HashMap;

use crate::arrangement::{Arrangement, Node, Orientation, Rect, Window};
use crate::cell::{Cell, CellStyle, CellWidth, Color};
use crate::ids::{ClientId, PaneId, WindowId};
use crate::pane::Pane;

/// One row above every pane reserved for its title bar (spec §4.D.3),
/// one row at the bottom of every client viewport reserved for the
/// status line (spec §4.D.5).
const TITLE_ROWS: u16 = 1;
const STATUS_ROWS: u16 = 1;

/// Cell pattern used to fill a larger client's viewport outside the
/// window content area shared with smaller clients (spec §4.D.1).
const BACKGROUND_DOT: char = '\u{00b7}';

/// A fully composed screen for one client: `rows * columns` cells plus
/// the cursor position to report at the end of the frame.
pub struct Frame {
    pub columns: u16,
    pub rows: u16,
    cells: Vec<Cell>,
    pub cursor: Option<(u16, u16)>,
}

impl Frame {
    fn blank(columns: u16, rows: u16, style: CellStyle) -> Self {
        Frame {
            columns,
            rows,
            cells: vec![Cell { ch: BACKGROUND_DOT, width: CellWidth::Narrow, style }; columns as usize * rows as usize],
            cursor: None,
        }
    }

    fn idx(&self, x: u16, y: u16) -> Option<usize> {
        if x < self.columns && y < self.rows {
            Some(y as usize * self.columns as usize + x as usize)
        } else {
            None
        }
    }

    fn set(&mut self, x: u16, y: u16, cell: Cell) {
        if let Some(i) = self.idx(x, y) {
            self.cells[i] = cell;
        }
    }

    fn get(&self, x: u16, y: u16) -> Option<Cell> {
        self.idx(x, y).map(|i| self.cells[i])
    }

    fn draw_str(&mut self, x: u16, y: u16, s: &str, style: CellStyle) {
        let mut col = x;
        for c in s.chars() {
            self.set(col, y, Cell { ch: c, width: CellWidth::Narrow, style });
            col = col.saturating_add(1);
        }
    }
}

/// Engine-assigned theme for border/title/status cells (spec §4.D
/// "cell composition rule": the emulator cell always wins inside a
/// pane; these attributes only apply to engine-drawn chrome).
#[derive(Debug, Clone, Copy, Default)]
pub struct Theme {
    pub border: CellStyle,
    pub active_border: CellStyle,
    pub title: CellStyle,
    pub status: CellStyle,
}

/// Integer-remainder distribution of `total` units across `weights`,
/// consuming exactly `total` (spec §4.D.2): each share is
/// `total * weight / sum`, and leftover 1-unit remainders go to the
/// earliest children.
fn distribute(total: u16, weights: &[u32]) -> Vec<u16> {
    let sum: u64 = weights.iter().map(|&w| w as u64).sum::<u64>().max(1);
    let total = total as u64;
    let mut shares: Vec<u64> = weights.iter().map(|&w| total * w as u64 / sum).collect();
    let used: u64 = shares.iter().sum();
    let mut remainder = total.saturating_sub(used);
    for s in shares.iter_mut() {
        if remainder == 0 {
            break;
        }
        *s += 1;
        remainder -= 1;
    }
    shares.into_iter().map(|s| s as u16).collect()
}

/// Walk the split tree and assign each pane its rectangle, including
/// a reserved title row at the top of every pane and a reserved
/// border column between `Vertical`-split siblings (spec §4.D.2).
pub fn layout_rects(root: &Node, area: Rect) -> HashMap<PaneId, Rect> {
    let mut out = HashMap::new();
    layout_node(root, area, &mut out);
    out
}

fn layout_node(node: &Node, area: Rect, out: &mut HashMap<PaneId, Rect>) {
    if area.width == 0 || area.height == 0 {
        return;
    }
    match node {
        Node::Pane(id) => {
            out.insert(*id, area);
        }
        Node::Split { orientation: Orientation::Horizontal, children } => {
            let weights: Vec<u32> = children.iter().map(|(_, w)| *w).collect();
            let heights = distribute(area.height, &weights);
            let mut y = area.y;
            for ((child, _), h) in children.iter().zip(heights) {
                layout_node(child, Rect { x: area.x, y, width: area.width, height: h }, out);
                y = y.saturating_add(h);
            }
        }
        Node::Split { orientation: Orientation::Vertical, children } => {
            let n = children.len();
            let border_cols = n.saturating_sub(1) as u16;
            let avail = area.width.saturating_sub(border_cols);
            let weights: Vec<u32> = children.iter().map(|(_, w)| *w).collect();
            let widths = distribute(avail, &weights);
            let mut x = area.x;
            for (i, ((child, _), w)) in children.iter().zip(widths).enumerate() {
                layout_node(child, Rect { x, y: area.y, width: w, height: area.height }, out);
                x = x.saturating_add(w);
                if i + 1 < n {
                    x = x.saturating_add(1);
                }
            }
        }
    }
}

/// Pane rectangles for `window`, honoring zoom (spec §4.C "zoom":
/// renderer shows only the active pane at full size).
pub fn window_pane_rects(window: &Window, content_area: Rect) -> HashMap<PaneId, Rect> {
    if window.zoomed {
        let mut out = HashMap::new();
        if let Some(active) = window.active_pane() {
            out.insert(active, content_area);
        }
        out
    } else {
        layout_rects(&window.root, content_area)
    }
}

/// The content area shared by every client currently viewing `window`:
/// the intersection (minimum rows and columns) of all their per-client
/// viewports, minus the status line (spec §4.D.1).
pub fn shared_content_size(
    window_id: WindowId,
    arrangement: &Arrangement,
    client_sizes: &HashMap<ClientId, (u16, u16)>,
    active_window_of: impl Fn(ClientId) -> Option<WindowId>,
) -> (u16, u16) {
    let mut rows = u16::MAX;
    let mut cols = u16::MAX;
    let mut any = false;
    for (&client, &(r, c)) in client_sizes {
        if active_window_of(client) == Some(window_id) {
            any = true;
            rows = rows.min(r.saturating_sub(STATUS_ROWS));
            cols = cols.min(c);
        }
    }
    if !any {
        return (0, 0);
    }
    let _ = arrangement;
    (rows, cols)
}

/// Copy a pane's visible viewport (honoring its scrollback offset, for
/// copy-mode browsing) into `frame` at `rect`, drawing its title row
/// above it. Whole-screen reverse video inverts fg/bg during the copy
/// (spec §4.D.3/§8 "bit-exact ... modulo reverse-video inversion").
pub fn blit_pane(frame: &mut Frame, pane: &Pane, rect: Rect, index: usize, theme: &Theme, is_active: bool, zoomed: bool) {
    if rect.height <= TITLE_ROWS {
        return;
    }
    let body_height = rect.height - TITLE_ROWS;
    let reverse = pane.screen.modes.reverse_video;

    let mut title = String::new();
    if let Some(name) = &pane.name {
        title.push_str(name);
        title.push(' ');
    }
    if !pane.screen.title.is_empty() {
        title.push_str(&pane.screen.title);
    }
    if zoomed && is_active {
        if !title.is_empty() {
            title.push(' ');
        }
        title.push('Z');
    }
    let title_style = if is_active { theme.active_border } else { theme.title };
    frame.draw_str(rect.x, rect.y, &title, title_style);
    if pane.copy_mode {
        let idx_str = format!("[{}]", index);
        let x = rect.x + rect.width.saturating_sub(idx_str.len() as u16);
        frame.draw_str(x, rect.y, &idx_str, title_style);
    } else {
        let idx_str = index.to_string();
        let x = rect.x + rect.width.saturating_sub(idx_str.len() as u16);
        frame.draw_str(x, rect.y, &idx_str, title_style);
    }

    for row in 0..body_height.min(pane.screen.lines) {
        let line = pane.screen.display_line(row);
        for col in 0..rect.width.min(pane.screen.columns) {
            let mut cell = line.cells.get(col as usize).copied().unwrap_or_default();
            if reverse {
                std::mem::swap(&mut cell.style.fg, &mut cell.style.bg);
            }
            frame.set(rect.x + col, rect.y + TITLE_ROWS + row, cell);
            if is_active && col == pane.screen.cursor.x && row == pane.screen.cursor.y && pane.screen.cursor.visible {
                frame.cursor = Some((rect.x + col, rect.y + TITLE_ROWS + row));
            }
        }
    }
}

/// Draw vertical/horizontal separators between sibling rectangles:
/// heavy box-drawing glyphs when the border touches the active pane's
/// rectangle, light otherwise (spec §4.D.4).
pub fn draw_borders(frame: &mut Frame, root: &Node, area: Rect, active_rect: Option<Rect>, theme: &Theme) {
    draw_borders_node(frame, root, area, active_rect, theme);
}

fn draw_borders_node(frame: &mut Frame, node: &Node, area: Rect, active_rect: Option<Rect>, theme: &Theme) {
    if let Node::Split { orientation, children } = node {
        let weights: Vec<u32> = children.iter().map(|(_, w)| *w).collect();
        match orientation {
            Orientation::Vertical => {
                let n = children.len();
                let avail = area.width.saturating_sub(n.saturating_sub(1) as u16);
                let widths = distribute(avail, &weights);
                let mut x = area.x;
                for (i, ((child, _), w)) in children.iter().zip(&widths).enumerate() {
                    let rect = Rect { x, y: area.y, width: *w, height: area.height };
                    draw_borders_node(frame, child, rect, active_rect, theme);
                    x = x.saturating_add(*w);
                    if i + 1 < n {
                        let touches_active = active_rect.is_some_and(|ar| x == ar.x || x == ar.x + ar.width);
                        let style = if touches_active { theme.active_border } else { theme.border };
                        for y in area.y..area.y + area.height {
                            frame.set(x, y, Cell { ch: '\u{2502}', width: CellWidth::Narrow, style });
                        }
                        x = x.saturating_add(1);
                    }
                }
            }
            Orientation::Horizontal => {
                let heights = distribute(area.height, &weights);
                let mut y = area.y;
                for ((child, _), h) in children.iter().zip(&heights) {
                    draw_borders_node(frame, child, Rect { x: area.x, y, width: area.width, height: *h }, active_rect, theme);
                    y = y.saturating_add(*h);
                }
            }
        }
    }
}

/// Post-pass: mark the four corners of the window's whole content area
/// (spec §4.D.4 "draw window borders around the whole content area
/// (top and bottom corners only where there is space)"). The title row
/// above every top-level pane already separates windows from the rest
/// of the frame, so only the corners need a distinct glyph; a full
/// outer frame would eat a column/row from every pane's content.
fn draw_outer_corners(frame: &mut Frame, area: Rect, theme: &Theme) {
    if area.width == 0 || area.height == 0 {
        return;
    }
    let right = area.x + area.width - 1;
    let bottom = area.y + area.height - 1;
    frame.set(area.x, area.y, Cell { ch: '\u{250c}', width: CellWidth::Narrow, style: theme.border });
    frame.set(right, area.y, Cell { ch: '\u{2510}', width: CellWidth::Narrow, style: theme.border });
    if bottom != area.y {
        frame.set(area.x, bottom, Cell { ch: '\u{2514}', width: CellWidth::Narrow, style: theme.border });
        frame.set(right, bottom, Cell { ch: '\u{2518}', width: CellWidth::Narrow, style: theme.border });
    }
}

/// Draw the bottom status line: window list on the left, a
/// right-hand clock (the `Tick`-driven 1 Hz text the event loop feeds
/// in via `time_str`) on the right (spec §4.D.5, §4.G timers).
pub fn draw_status_bar(frame: &mut Frame, arrangement: &Arrangement, active_window: WindowId, time_str: &str, theme: &Theme) {
    if frame.rows == 0 {
        return;
    }
    let y = frame.rows - 1;
    for x in 0..frame.columns {
        frame.set(x, y, Cell::blank_with_style(theme.status));
    }
    let mut x = 0u16;
    for window in &arrangement.windows {
        let Some(number) = arrangement.window_number(window.id) else { continue };
        let label = format!(" {}:{} ", number, window.effective_name(|| "(noname)".to_string()));
        let style = if window.id == active_window { theme.active_border } else { theme.status };
        frame.draw_str(x, y, &label, style);
        x = x.saturating_add(label.chars().count() as u16);
        if x >= frame.columns {
            break;
        }
    }
    let right = time_str;
    if (right.len() as u16) < frame.columns {
        frame.draw_str(frame.columns - right.len() as u16, y, right, theme.status);
    }
}

/// Which window's status-bar label (if any) contains column `x`,
/// mirroring `draw_status_bar`'s layout so a click there can route to
/// `select_window` (spec §4.E "status bar click switches window").
pub fn status_bar_hit(arrangement: &Arrangement, columns: u16, x: u16) -> Option<WindowId> {
    let mut cursor = 0u16;
    for window in &arrangement.windows {
        let Some(number) = arrangement.window_number(window.id) else { continue };
        let label = format!(" {}:{} ", number, window.effective_name(|| "(noname)".to_string()));
        let width = label.chars().count() as u16;
        if x >= cursor && x < cursor + width {
            return Some(window.id);
        }
        cursor = cursor.saturating_add(width);
        if cursor >= columns {
            break;
        }
    }
    None
}

/// Draw a single-line transient message / prompt buffer / confirmation
/// text as an overlay on the status row, replacing whatever was there
/// (spec §4.D.5 z-order: message/prompt/confirm sit above the status
/// bar, below nothing else since copy-mode search and the completion
/// menu are out of scope here).
pub fn draw_overlay_line(frame: &mut Frame, text: &str, theme: &Theme) {
    if frame.rows == 0 {
        return;
    }
    let y = frame.rows - 1;
    for x in 0..frame.columns {
        frame.set(x, y, Cell::blank_with_style(theme.status));
    }
    frame.draw_str(0, y, text, theme.active_border);
}

/// Render one client's full frame: shared window content blitted at
/// the origin, borders, status bar, then any single-line overlay.
pub fn render_client(
    client_rows: u16,
    client_cols: u16,
    window: &Window,
    panes: &HashMap<PaneId, &Pane>,
    arrangement: &Arrangement,
    shared_rows: u16,
    shared_cols: u16,
    time_str: &str,
    overlay: Option<&str>,
    theme: &Theme,
) -> Frame {
    let mut frame = Frame::blank(client_cols, client_rows, CellStyle::default());
    let content_rows = shared_rows.min(client_rows.saturating_sub(STATUS_ROWS));
    let content_area = Rect { x: 0, y: 0, width: shared_cols.min(client_cols), height: content_rows };
    let rects = window_pane_rects(window, content_area);
    let active_pane = window.active_pane();
    let active_rect = active_pane.and_then(|id| rects.get(&id).copied());

    for (i, (_, pane_id)) in window.panes().into_iter().enumerate() {
        let Some(&rect) = rects.get(&pane_id) else { continue };
        let Some(pane) = panes.get(&pane_id) else { continue };
        blit_pane(&mut frame, pane, rect, i + 1, theme, Some(pane_id) == active_pane, window.zoomed);
    }
    if !window.zoomed {
        draw_borders(&mut frame, &window.root, content_area, active_rect, theme);
        draw_outer_corners(&mut frame, content_area, theme);
    }
    draw_status_bar(&mut frame, arrangement, window.id, time_str, theme);
    if let Some(text) = overlay {
        draw_overlay_line(&mut frame, text, theme);
    }
    frame
}

/// Serialize a composed frame to the ANSI bytes a dumb terminal client
/// writes verbatim to its stdout: full redraw with SGR runs, ending
/// with an absolute cursor position report (spec §4.F `out` payload).
/// A differential encoder is explicitly optional (spec §4.D.6); this
/// crate always sends the full frame.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"\x1b[H");
    let mut last_style: Option<CellStyle> = None;
    for y in 0..frame.rows {
        if y > 0 {
            out.extend_from_slice(b"\r\n");
        }
        for x in 0..frame.columns {
            let cell = frame.get(x, y).unwrap_or_default();
            if cell.width == CellWidth::WideTrail {
                continue;
            }
            if last_style != Some(cell.style) {
                out.extend_from_slice(sgr_for(&cell.style).as_bytes());
                last_style = Some(cell.style);
            }
            let mut buf = [0u8; 4];
            out.extend_from_slice(cell.ch.encode_utf8(&mut buf).as_bytes());
        }
    }
    out.extend_from_slice(b"\x1b[0m");
    if let Some((x, y)) = frame.cursor {
        out.extend_from_slice(format!("\x1b[{};{}H", y + 1, x + 1).as_bytes());
    }
    out
}

fn sgr_for(style: &CellStyle) -> String {
    let mut parts = vec!["0".to_string()];
    if style.bold {
        parts.push("1".to_string());
    }
    if style.underline {
        parts.push("4".to_string());
    }
    if style.italic {
        parts.push("3".to_string());
    }
    if style.blink {
        parts.push("5".to_string());
    }
    if style.reverse {
        parts.push("7".to_string());
    }
    if style.strikethrough {
        parts.push("9".to_string());
    }
    match style.fg {
        Color::Default => {}
        Color::Indexed(i) if i < 8 => parts.push((30 + i).to_string()),
        Color::Indexed(i) if i < 16 => parts.push((90 + (i - 8)).to_string()),
        Color::Indexed(i) => parts.push(format!("38;5;{}", i)),
        Color::Rgb(r, g, b) => parts.push(format!("38;2;{};{};{}", r, g, b)),
    }
    match style.bg {
        Color::Default => {}
        Color::Indexed(i) if i < 8 => parts.push((40 + i).to_string()),
        Color::Indexed(i) if i < 16 => parts.push((100 + (i - 8)).to_string()),
        Color::Indexed(i) => parts.push(format!("48;5;{}", i)),
        Color::Rgb(r, g, b) => parts.push(format!("48;2;{};{};{}", r, g, b)),
    }
    format!("\x1b[{}m", parts.join(";"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::window::Window;
    use crate::ids::{PaneId, WindowId};

    #[test]
    fn distribute_consumes_all_units_with_remainder_to_earliest() {
        let shares = distribute(10, &[1, 1, 1]);
        assert_eq!(shares.iter().sum::<u16>(), 10);
        assert_eq!(shares, vec![4, 3, 3]);
    }

    #[test]
    fn two_pane_vertical_split_reserves_border_column() {
        let root = Node::Split {
            orientation: Orientation::Vertical,
            children: vec![(Node::Pane(PaneId::for_test(1)), 1), (Node::Pane(PaneId::for_test(2)), 1)],
        };
        let rects = layout_rects(&root, Rect { x: 0, y: 0, width: 80, height: 24 });
        let r1 = rects[&PaneId::for_test(1)];
        let r2 = rects[&PaneId::for_test(2)];
        assert_eq!(r1.width + r2.width + 1, 80);
        assert_eq!(r2.x, r1.x + r1.width + 1);
    }

    #[test]
    fn two_pane_horizontal_split_shares_full_width() {
        let root = Node::Split {
            orientation: Orientation::Horizontal,
            children: vec![(Node::Pane(PaneId::for_test(1)), 1), (Node::Pane(PaneId::for_test(2)), 1)],
        };
        let rects = layout_rects(&root, Rect { x: 0, y: 0, width: 80, height: 24 });
        let r1 = rects[&PaneId::for_test(1)];
        let r2 = rects[&PaneId::for_test(2)];
        assert_eq!(r1.width, 80);
        assert_eq!(r2.width, 80);
        assert_eq!(r1.height + r2.height, 24);
    }

    #[test]
    fn zoom_reduces_rects_to_one_pane_at_full_size() {
        let mut w = Window::new(WindowId::for_test(1), PaneId::for_test(1));
        w.add_pane(Orientation::Horizontal, PaneId::for_test(2));
        w.zoomed = true;
        let area = Rect { x: 0, y: 0, width: 80, height: 24 };
        let rects = window_pane_rects(&w, area);
        assert_eq!(rects.len(), 1);
    }
}
