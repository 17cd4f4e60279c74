//! VT100/xterm byte-stream tokenizer (spec §4.A).
//!
//! Byte-level state transitions (GROUND/ESCAPE/CSI_*/OSC_STRING/
//! DCS_PASSTHROUGH/...) are handled by [`vte::Parser`] — the same
//! state-machine family `alacritty_terminal` builds on. What used to be
//! a name-table dispatch (REDESIGN FLAGS §9) is replaced here: every
//! `Perform` callback decodes its raw parameters into one variant of an
//! explicit command enum before `Screen::apply` ever sees it, so the
//! parser's output alphabet is finite and testable independent of
//! screen mutation.

use vte::{Params, Perform};

use crate::cell::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateMode {
    ApplicationCursorKeys, // 1
    Origin,                // 6
    Autowrap,              // 7
    CursorVisible,         // 25
    MouseNormal,           // 1000
    MouseButtonEvent,      // 1002
    MouseAnyEvent,         // 1003
    FocusEvents,           // 1004
    MouseUtf8,             // 1005
    MouseSgr,              // 1006
    MouseUrxvt,            // 1015
    AlternateScreen,       // 1049
    BracketedPaste,        // 2004
    Other(u16),
}

impl From<u16> for PrivateMode {
    fn from(n: u16) -> Self {
        match n {
            1 => PrivateMode::ApplicationCursorKeys,
            6 => PrivateMode::Origin,
            7 => PrivateMode::Autowrap,
            25 => PrivateMode::CursorVisible,
            1000 => PrivateMode::MouseNormal,
            1002 => PrivateMode::MouseButtonEvent,
            1003 => PrivateMode::MouseAnyEvent,
            1004 => PrivateMode::FocusEvents,
            1005 => PrivateMode::MouseUtf8,
            1006 => PrivateMode::MouseSgr,
            1015 => PrivateMode::MouseUrxvt,
            1049 => PrivateMode::AlternateScreen,
            2004 => PrivateMode::BracketedPaste,
            other => PrivateMode::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnsiMode {
    Insert,       // 4
    LineFeedNewLine, // 20
    Other(u16),
}

impl From<u16> for AnsiMode {
    fn from(n: u16) -> Self {
        match n {
            4 => AnsiMode::Insert,
            20 => AnsiMode::LineFeedNewLine,
            other => AnsiMode::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgrAttr {
    Reset,
    Bold,
    NormalIntensity, // cancels bold or dim (22)
    Dim,
    Italic,
    NoItalic,
    Underline,
    NoUnderline,
    Blink,
    NoBlink,
    Reverse,
    NoReverse,
    Hidden,
    NoHidden,
    Strikethrough,
    NoStrikethrough,
    Foreground(Color),
    Background(Color),
    ForegroundDefault,
    BackgroundDefault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsiCommand {
    CursorPosition { row: u32, col: u32 },       // CUP / HVP
    CursorUp(u32),
    CursorDown(u32),
    CursorForward(u32),
    CursorBack(u32),
    CursorNextLine(u32),  // CNL
    CursorPrevLine(u32),  // CPL
    CursorColumn(u32),    // CHA
    CursorLine(u32),      // VPA
    EraseDisplay(u8),     // ED
    EraseLine(u8),        // EL
    InsertLines(u32),     // IL
    DeleteLines(u32),     // DL
    InsertChars(u32),     // ICH
    DeleteChars(u32),     // DCH
    EraseChars(u32),      // ECH
    ScrollUp(u32),        // SU
    ScrollDown(u32),      // SD
    SetScrollRegion { top: Option<u32>, bottom: Option<u32> }, // DECSTBM
    SetMode(Vec<AnsiMode>),
    ResetMode(Vec<AnsiMode>),
    PrivateSetMode(Vec<PrivateMode>),
    PrivateResetMode(Vec<PrivateMode>),
    Sgr(Vec<SgrAttr>),
    DeviceStatusReport(u16), // 5 or 6
    PrimaryDeviceAttributes,
    TabClear(u8),
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscCommand {
    SaveCursor,    // DECSC / ESC 7
    RestoreCursor, // DECRC / ESC 8
    SetTabStop,    // HTS (ESC H)
    SelectAsciiG0,
    SelectDecGraphicsG0,
    SelectAsciiG1,
    SelectDecGraphicsG1,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OscCommand {
    SetIconName(String),
    SetTitle(String),
    SetIconAndTitle(String),
    Unknown,
}

/// Events fed to `Screen::apply`. `Print`/`Execute` flow straight from
/// `Perform::print`/`Perform::execute`; the rest are the decoded forms
/// of CSI/OSC/ESC sequences.
#[derive(Debug, Clone, PartialEq)]
pub enum TermEvent {
    Print(char),
    Execute(u8),
    Csi(CsiCommand),
    Osc(OscCommand),
    Esc(EscCommand),
}

/// Adapter that implements `vte::Perform` and appends decoded events to
/// an internal queue, which `Screen::feed` then drains in order.
#[derive(Default)]
pub struct Collector {
    pub events: Vec<TermEvent>,
}

fn param_u32(params: &Params, idx: usize, default: u32) -> u32 {
    params
        .iter()
        .nth(idx)
        .and_then(|p| p.first().copied())
        .map(|v| v as u32)
        .filter(|&v| v != 0)
        .unwrap_or(default)
}

fn param_u32_allow_zero(params: &Params, idx: usize, default: u32) -> u32 {
    params
        .iter()
        .nth(idx)
        .and_then(|p| p.first().copied())
        .map(|v| v as u32)
        .unwrap_or(default)
}

fn all_params(params: &Params) -> Vec<u16> {
    params.iter().filter_map(|p| p.first().copied()).collect()
}

fn parse_color_sequence(vals: &[u16], i: &mut usize) -> Color {
    // vals[*i] is either 5 (indexed) or 2 (rgb); caller already consumed the 38/48.
    match vals.get(*i) {
        Some(5) => {
            let idx = vals.get(*i + 1).copied().unwrap_or(0) as u8;
            *i += 2;
            Color::Indexed(idx)
        }
        Some(2) => {
            let r = vals.get(*i + 1).copied().unwrap_or(0) as u8;
            let g = vals.get(*i + 2).copied().unwrap_or(0) as u8;
            let b = vals.get(*i + 3).copied().unwrap_or(0) as u8;
            *i += 4;
            Color::Rgb(r, g, b)
        }
        _ => {
            *i += 1;
            Color::Default
        }
    }
}

fn parse_sgr(params: &Params) -> Vec<SgrAttr> {
    let vals = all_params(params);
    if vals.is_empty() {
        return vec![SgrAttr::Reset];
    }
    let mut out = Vec::new();
    let mut i = 0;
    while i < vals.len() {
        let v = vals[i];
        match v {
            0 => out.push(SgrAttr::Reset),
            1 => out.push(SgrAttr::Bold),
            2 => out.push(SgrAttr::Dim),
            3 => out.push(SgrAttr::Italic),
            4 => out.push(SgrAttr::Underline),
            5 | 6 => out.push(SgrAttr::Blink),
            7 => out.push(SgrAttr::Reverse),
            8 => out.push(SgrAttr::Hidden),
            9 => out.push(SgrAttr::Strikethrough),
            22 => out.push(SgrAttr::NormalIntensity),
            23 => out.push(SgrAttr::NoItalic),
            24 => out.push(SgrAttr::NoUnderline),
            25 => out.push(SgrAttr::NoBlink),
            27 => out.push(SgrAttr::NoReverse),
            28 => out.push(SgrAttr::NoHidden),
            29 => out.push(SgrAttr::NoStrikethrough),
            30..=37 => out.push(SgrAttr::Foreground(Color::Indexed((v - 30) as u8))),
            38 => {
                i += 1;
                let color = parse_color_sequence(&vals, &mut i);
                out.push(SgrAttr::Foreground(color));
                continue;
            }
            39 => out.push(SgrAttr::ForegroundDefault),
            40..=47 => out.push(SgrAttr::Background(Color::Indexed((v - 40) as u8))),
            48 => {
                i += 1;
                let color = parse_color_sequence(&vals, &mut i);
                out.push(SgrAttr::Background(color));
                continue;
            }
            49 => out.push(SgrAttr::BackgroundDefault),
            90..=97 => out.push(SgrAttr::Foreground(Color::Indexed((v - 90 + 8) as u8))),
            100..=107 => out.push(SgrAttr::Background(Color::Indexed((v - 100 + 8) as u8))),
            _ => {}
        }
        i += 1;
    }
    out
}

impl Perform for Collector {
    fn print(&mut self, c: char) {
        self.events.push(TermEvent::Print(c));
    }

    fn execute(&mut self, byte: u8) {
        self.events.push(TermEvent::Execute(byte));
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        if params.is_empty() {
            return;
        }
        let kind = params[0];
        let text = params
            .get(1)
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default();
        let cmd = match kind {
            b"0" => OscCommand::SetIconAndTitle(text),
            b"1" => OscCommand::SetIconName(text),
            b"2" => OscCommand::SetTitle(text),
            _ => OscCommand::Unknown,
        };
        self.events.push(TermEvent::Osc(cmd));
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        let private = intermediates.first() == Some(&b'?');
        let cmd = match action {
            'H' | 'f' => CsiCommand::CursorPosition {
                row: param_u32(params, 0, 1),
                col: param_u32(params, 1, 1),
            },
            'A' => CsiCommand::CursorUp(param_u32(params, 0, 1)),
            'B' => CsiCommand::CursorDown(param_u32(params, 0, 1)),
            'C' => CsiCommand::CursorForward(param_u32(params, 0, 1)),
            'D' => CsiCommand::CursorBack(param_u32(params, 0, 1)),
            'E' => CsiCommand::CursorNextLine(param_u32(params, 0, 1)),
            'F' => CsiCommand::CursorPrevLine(param_u32(params, 0, 1)),
            'G' | '`' => CsiCommand::CursorColumn(param_u32(params, 0, 1)),
            'd' => CsiCommand::CursorLine(param_u32(params, 0, 1)),
            'J' => CsiCommand::EraseDisplay(param_u32_allow_zero(params, 0, 0) as u8),
            'K' => CsiCommand::EraseLine(param_u32_allow_zero(params, 0, 0) as u8),
            'L' => CsiCommand::InsertLines(param_u32(params, 0, 1)),
            'M' => CsiCommand::DeleteLines(param_u32(params, 0, 1)),
            '@' => CsiCommand::InsertChars(param_u32(params, 0, 1)),
            'P' => CsiCommand::DeleteChars(param_u32(params, 0, 1)),
            'X' => CsiCommand::EraseChars(param_u32(params, 0, 1)),
            'S' => CsiCommand::ScrollUp(param_u32(params, 0, 1)),
            'T' => CsiCommand::ScrollDown(param_u32(params, 0, 1)),
            'r' if !private => {
                let all = all_params(params);
                let top = all.first().copied().map(|v| v as u32);
                let bottom = all.get(1).copied().map(|v| v as u32);
                CsiCommand::SetScrollRegion { top, bottom }
            }
            'm' => CsiCommand::Sgr(parse_sgr(params)),
            'n' => CsiCommand::DeviceStatusReport(param_u32_allow_zero(params, 0, 0) as u16),
            'c' if !private => CsiCommand::PrimaryDeviceAttributes,
            'g' => CsiCommand::TabClear(param_u32_allow_zero(params, 0, 0) as u8),
            'h' => {
                let vals = all_params(params);
                if private {
                    CsiCommand::PrivateSetMode(vals.into_iter().map(PrivateMode::from).collect())
                } else {
                    CsiCommand::SetMode(vals.into_iter().map(AnsiMode::from).collect())
                }
            }
            'l' => {
                let vals = all_params(params);
                if private {
                    CsiCommand::PrivateResetMode(vals.into_iter().map(PrivateMode::from).collect())
                } else {
                    CsiCommand::ResetMode(vals.into_iter().map(AnsiMode::from).collect())
                }
            }
            _ => CsiCommand::Unknown,
        };
        self.events.push(TermEvent::Csi(cmd));
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], _ignore: bool, byte: u8) {
        let cmd = match (intermediates, byte) {
            ([], b'7') => EscCommand::SaveCursor,
            ([], b'8') => EscCommand::RestoreCursor,
            ([], b'H') => EscCommand::SetTabStop,
            ([b'('], b'B') => EscCommand::SelectAsciiG0,
            ([b'('], b'0') => EscCommand::SelectDecGraphicsG0,
            ([b')'], b'B') => EscCommand::SelectAsciiG1,
            ([b')'], b'0') => EscCommand::SelectDecGraphicsG1,
            _ => EscCommand::Unknown,
        };
        self.events.push(TermEvent::Esc(cmd));
    }

    // DCS content is accepted and discarded: DCS_PASSTHROUGH must terminate
    // properly but its payload carries no behavior this emulator implements.
    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}
    fn put(&mut self, _byte: u8) {}
    fn unhook(&mut self) {}
}

/// Incremental UTF-8-safe byte feeder: buffers a partial multi-byte
/// sequence across PTY reads instead of emitting U+FFFD on a split
/// boundary (open question (c), spec §9).
pub struct ByteDecoder {
    parser: vte::Parser,
    pending: Vec<u8>,
}

impl Default for ByteDecoder {
    fn default() -> Self {
        ByteDecoder {
            parser: vte::Parser::new(),
            pending: Vec::new(),
        }
    }
}

impl ByteDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw child output, returning the decoded event stream for
    /// this chunk. Bytes of an incomplete UTF-8 sequence at the tail
    /// are held back until more data arrives.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<TermEvent> {
        self.pending.extend_from_slice(bytes);
        let valid_upto = utf8_valid_prefix_len(&self.pending);
        let to_process: Vec<u8> = self.pending.drain(..valid_upto).collect();
        let mut collector = Collector::default();
        self.parser.advance(&mut collector, &to_process);
        collector.events
    }
}

/// Length of the longest prefix of `buf` that is either ASCII/control
/// bytes or complete UTF-8 sequences, i.e. safe to hand to the parser
/// now. Any trailing incomplete multi-byte sequence is left buffered.
fn utf8_valid_prefix_len(buf: &[u8]) -> usize {
    match std::str::from_utf8(buf) {
        Ok(_) => buf.len(),
        Err(e) => {
            let valid_upto = e.valid_up_to();
            match e.error_len() {
                // A definite invalid byte: include it so the parser
                // replaces it (vte->Perform does this internally via
                // its own UTF-8 decoder), nothing left pending for it.
                Some(bad_len) => valid_upto + bad_len,
                // Incomplete sequence at the very end: hold it back.
                None => valid_upto,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_utf8_sequence_across_feeds() {
        let mut d = ByteDecoder::new();
        let bytes = "é".as_bytes(); // 2-byte sequence
        let first = d.feed(&bytes[..1]);
        assert!(first.is_empty());
        let second = d.feed(&bytes[1..]);
        assert_eq!(second, vec![TermEvent::Print('é')]);
    }

    #[test]
    fn parses_cup() {
        let mut d = ByteDecoder::new();
        let events = d.feed(b"\x1b[3;7H");
        assert_eq!(
            events,
            vec![TermEvent::Csi(CsiCommand::CursorPosition { row: 3, col: 7 })]
        );
    }

    #[test]
    fn parses_sgr_256_and_truecolor() {
        let mut d = ByteDecoder::new();
        let events = d.feed(b"\x1b[38;5;200;48;2;1;2;3m");
        assert_eq!(
            events,
            vec![TermEvent::Csi(CsiCommand::Sgr(vec![
                SgrAttr::Foreground(Color::Indexed(200)),
                SgrAttr::Background(Color::Rgb(1, 2, 3)),
            ]))]
        );
    }

    #[test]
    fn parses_private_modes() {
        let mut d = ByteDecoder::new();
        let events = d.feed(b"\x1b[?1049h");
        assert_eq!(
            events,
            vec![TermEvent::Csi(CsiCommand::PrivateSetMode(vec![
                PrivateMode::AlternateScreen
            ]))]
        );
    }

    #[test]
    fn parses_osc_title() {
        let mut d = ByteDecoder::new();
        let events = d.feed(b"\x1b]2;hello\x07");
        assert_eq!(
            events,
            vec![TermEvent::Osc(OscCommand::SetTitle("hello".to_string()))]
        );
    }
}
