//! ANSI emulation on top of the console API
//!
//! Consoles without virtual-terminal processing only understand plain text,
//! so every tokenized operation is reproduced with buffer-info queries,
//! cursor/attribute setters, region fills and buffer scrolls.
//!
//! Each operation is split in two: a pure computation against a fresh
//! [`ScreenBufferInfo`] snapshot ([`CursorMotion::resolve`],
//! [`FillRegion::screen`], [`FillRegion::line`]) and a native apply step.

use std::io::{self, Write};
use std::sync::Arc;

use tracing::trace;

use super::attr::{self, Emphasis};
use super::colors::{round_color, round_rgb};
use super::parser::{AnsiHandler, AnsiParser, Attribute, Color, Erase};
use crate::core::console::{CharInfo, ConsoleApi, Coord, ScreenBufferInfo, SmallRect};
use crate::core::writer::{ConsoleWriter, Utf8Accumulator};
use crate::error::Result;

/// Cursor movement requested by an escape sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorMotion {
    Up(u16),
    Forward(u16),
    Backward(u16),
    NextLine(u16),
    PreviousLine(u16),
    /// 1-based absolute column
    Column(u16),
    /// 1-based row relative to the window top, 1-based absolute column
    To { row: u16, col: u16 },
}

impl CursorMotion {
    /// Target position for this motion, clamped to the buffer.
    pub fn resolve(self, info: &ScreenBufferInfo) -> Coord {
        let x = i32::from(info.cursor.x);
        let y = i32::from(info.cursor.y);
        let top = i32::from(info.window.top);

        let (x, y) = match self {
            CursorMotion::Up(n) => (x, (y - i32::from(n)).max(top)),
            CursorMotion::Forward(n) => (x + i32::from(n), y),
            CursorMotion::Backward(n) => (x - i32::from(n), y),
            CursorMotion::NextLine(n) => (0, y + i32::from(n)),
            CursorMotion::PreviousLine(n) => (0, (y - i32::from(n)).max(top)),
            CursorMotion::Column(col) => (i32::from(col) - 1, y),
            CursorMotion::To { row, col } => (i32::from(col) - 1, top + i32::from(row) - 1),
        };
        clamp_to_buffer(x, y, info.size)
    }
}

/// Clamp both axes into `[0, size - 1]`.
pub fn clamp_to_buffer(x: i32, y: i32, size: Coord) -> Coord {
    let max_x = (i32::from(size.x) - 1).max(0);
    let max_y = (i32::from(size.y) - 1).max(0);
    Coord::new(x.clamp(0, max_x) as i16, y.clamp(0, max_y) as i16)
}

/// Run of cells covered by an erase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillRegion {
    pub origin: Coord,
    pub len: u32,
}

impl FillRegion {
    /// Cells covered by an erase-in-display. Only the visible window is
    /// touched, never the scrollback above it.
    pub fn screen(erase: Erase, info: &ScreenBufferInfo) -> Self {
        let width = i32::from(info.size.x);
        let cx = i32::from(info.cursor.x);
        let cy = i32::from(info.cursor.y);
        let top = i32::from(info.window.top);
        let bottom = i32::from(info.window.bottom);
        let window_top = Coord::new(0, info.window.top);

        match erase {
            Erase::All => Self::new(window_top, info.window.height() * width),
            Erase::ToBeginning => Self::new(window_top, (cy - top) * width + cx),
            Erase::ToEnd => Self::new(info.cursor, (bottom - cy) * width + (width - cx)),
        }
    }

    /// Cells covered by an erase-in-line on the cursor row.
    pub fn line(erase: Erase, info: &ScreenBufferInfo) -> Self {
        let width = i32::from(info.size.x);
        let cx = i32::from(info.cursor.x);
        let line_start = Coord::new(0, info.cursor.y);

        match erase {
            Erase::All => Self::new(line_start, width),
            Erase::ToBeginning => Self::new(line_start, cx),
            Erase::ToEnd => Self::new(info.cursor, width - cx),
        }
    }

    fn new(origin: Coord, len: i32) -> Self {
        Self { origin, len: len.max(0) as u32 }
    }
}

/// Buffer scroll: move `rect` (clipped to itself) so its top lands on `destination`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ScrollRegion {
    rect: SmallRect,
    destination: Coord,
}

impl ScrollRegion {
    fn insert_lines(info: &ScreenBufferInfo, n: u16) -> Self {
        let mut rect = info.window;
        rect.top = info.cursor.y;
        Self { rect, destination: Coord::new(0, offset(info.cursor.y, i32::from(n))) }
    }

    fn delete_lines(info: &ScreenBufferInfo, n: u16) -> Self {
        let mut rect = info.window;
        rect.top = info.cursor.y;
        Self { rect, destination: Coord::new(0, offset(info.cursor.y, -i32::from(n))) }
    }

    fn window(info: &ScreenBufferInfo, rows: i32) -> Self {
        Self { rect: info.window, destination: Coord::new(0, offset(info.window.top, rows)) }
    }

    /// Shift the whole buffer up to the window bottom by `rows`.
    fn buffer_up(info: &ScreenBufferInfo, rows: i32) -> Self {
        let mut rect = info.window;
        rect.top = 0;
        Self { rect, destination: Coord::new(0, offset(0, -rows)) }
    }
}

fn offset(base: i16, delta: i32) -> i16 {
    (i32::from(base) + delta).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Applies tokenized ANSI operations to a console without VT support.
pub struct ConsoleTranslator<C: ConsoleApi> {
    console: Arc<C>,
    writer: ConsoleWriter<C>,
    /// Text received since the last console operation
    pending: String,
    /// Attribute word in effect when the translator was created
    original_attributes: u16,
    /// Current colors, without emphasis applied
    attributes: u16,
    emphasis: Emphasis,
    saved_cursor: Option<Coord>,
}

impl<C: ConsoleApi> ConsoleTranslator<C> {
    /// Capture the current attribute word as the one to restore on reset.
    pub fn new(console: Arc<C>) -> Result<Self> {
        let info = console.screen_buffer_info()?;
        Ok(Self::with_original_attributes(console, info.attributes))
    }

    pub fn with_original_attributes(console: Arc<C>, original_attributes: u16) -> Self {
        Self {
            writer: ConsoleWriter::new(console.clone()),
            console,
            pending: String::new(),
            original_attributes,
            attributes: original_attributes,
            emphasis: Emphasis::default(),
            saved_cursor: None,
        }
    }

    pub fn original_attributes(&self) -> u16 {
        self.original_attributes
    }

    /// Write out text queued by [`AnsiHandler::print`].
    pub fn flush_text(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.pending);
        self.writer.write_str(&text)
    }

    /// Flush queued text and take a fresh buffer snapshot.
    fn begin(&mut self) -> Result<ScreenBufferInfo> {
        self.flush_text()?;
        self.console.screen_buffer_info()
    }

    fn move_cursor(&mut self, motion: CursorMotion) -> Result<()> {
        let info = self.begin()?;
        let target = motion.resolve(&info);
        trace!("cursor {:?} -> {:?}", motion, target);
        self.console.set_cursor_position(target)
    }

    fn apply_attributes(&mut self) -> Result<()> {
        self.flush_text()?;
        let word = attr::compose(self.attributes, self.emphasis);
        self.console.set_text_attribute(word)
    }

    /// Attribute word used for erased cells: colors and emphasis, never negated.
    fn fill_attributes(&self) -> u16 {
        attr::compose(self.attributes, Emphasis { negative: false, ..self.emphasis })
    }

    fn fill(&mut self, region: FillRegion) -> Result<()> {
        self.console.fill_output_character(' ', region.len, region.origin)?;
        self.console.fill_output_attribute(self.fill_attributes(), region.len, region.origin)?;
        Ok(())
    }

    fn scroll(&mut self, region: ScrollRegion) -> Result<()> {
        let blank = CharInfo { ch: ' ', attributes: self.original_attributes };
        self.console.scroll_screen_buffer(region.rect, Some(region.rect), region.destination, blank)
    }

    fn rounded(color: Color) -> u8 {
        match color {
            Color::Indexed(index) => round_color(index),
            Color::Rgb(r, g, b) => round_rgb(r, g, b),
        }
    }
}

impl<C: ConsoleApi> AnsiHandler for ConsoleTranslator<C> {
    fn print(&mut self, ch: char) -> Result<()> {
        self.pending.push(ch);
        Ok(())
    }

    fn cursor_up(&mut self, n: u16) -> Result<()> {
        self.move_cursor(CursorMotion::Up(n))
    }

    fn cursor_down(&mut self, n: u16) -> Result<()> {
        let info = self.begin()?;
        let n = i32::from(n);
        let y = i32::from(info.cursor.y);
        let overflow = (y + n - i32::from(info.size.y) + 1).max(0);

        if overflow != n {
            let target = clamp_to_buffer(i32::from(info.cursor.x), y + n, info.size);
            self.console.set_cursor_position(target)?;
        }
        if overflow > 0 {
            trace!("scrolling buffer up {} rows", overflow);
            self.scroll(ScrollRegion::buffer_up(&info, overflow))?;
        }
        Ok(())
    }

    fn cursor_forward(&mut self, n: u16) -> Result<()> {
        self.move_cursor(CursorMotion::Forward(n))
    }

    fn cursor_backward(&mut self, n: u16) -> Result<()> {
        self.move_cursor(CursorMotion::Backward(n))
    }

    fn cursor_next_line(&mut self, n: u16) -> Result<()> {
        self.move_cursor(CursorMotion::NextLine(n))
    }

    fn cursor_previous_line(&mut self, n: u16) -> Result<()> {
        self.move_cursor(CursorMotion::PreviousLine(n))
    }

    fn cursor_to_column(&mut self, col: u16) -> Result<()> {
        self.move_cursor(CursorMotion::Column(col))
    }

    fn cursor_to(&mut self, row: u16, col: u16) -> Result<()> {
        self.move_cursor(CursorMotion::To { row, col })
    }

    fn erase_screen(&mut self, erase: Erase) -> Result<()> {
        let info = self.begin()?;
        self.fill(FillRegion::screen(erase, &info))
    }

    fn erase_line(&mut self, erase: Erase) -> Result<()> {
        let info = self.begin()?;
        self.fill(FillRegion::line(erase, &info))
    }

    fn insert_lines(&mut self, n: u16) -> Result<()> {
        let info = self.begin()?;
        self.scroll(ScrollRegion::insert_lines(&info, n))
    }

    fn delete_lines(&mut self, n: u16) -> Result<()> {
        let info = self.begin()?;
        self.scroll(ScrollRegion::delete_lines(&info, n))
    }

    fn scroll_up(&mut self, n: u16) -> Result<()> {
        let info = self.begin()?;
        self.scroll(ScrollRegion::window(&info, -i32::from(n)))
    }

    fn scroll_down(&mut self, n: u16) -> Result<()> {
        let info = self.begin()?;
        self.scroll(ScrollRegion::window(&info, i32::from(n)))
    }

    fn set_foreground(&mut self, color: Color) -> Result<()> {
        self.attributes = attr::with_foreground(self.attributes, Self::rounded(color));
        self.apply_attributes()
    }

    fn set_background(&mut self, color: Color) -> Result<()> {
        self.attributes = attr::with_background(self.attributes, Self::rounded(color));
        self.apply_attributes()
    }

    fn default_foreground(&mut self) -> Result<()> {
        self.attributes = attr::default_foreground(self.attributes, self.original_attributes);
        self.apply_attributes()
    }

    fn default_background(&mut self) -> Result<()> {
        self.attributes = attr::default_background(self.attributes, self.original_attributes);
        self.apply_attributes()
    }

    fn set_attribute(&mut self, attribute: Attribute) -> Result<()> {
        match attribute {
            Attribute::Bold => self.emphasis.bold = true,
            Attribute::NormalIntensity => self.emphasis.bold = false,
            Attribute::Underline => self.emphasis.underline = true,
            Attribute::UnderlineOff => self.emphasis.underline = false,
            Attribute::Negative => self.emphasis.negative = true,
            Attribute::Positive => self.emphasis.negative = false,
        }
        self.apply_attributes()
    }

    fn reset_attributes(&mut self) -> Result<()> {
        self.attributes = attr::reset(self.attributes, self.original_attributes);
        self.emphasis = Emphasis::default();
        self.apply_attributes()
    }

    fn save_cursor(&mut self) -> Result<()> {
        let info = self.begin()?;
        self.saved_cursor = Some(info.cursor);
        Ok(())
    }

    fn restore_cursor(&mut self) -> Result<()> {
        let Some(saved) = self.saved_cursor else {
            return Ok(());
        };
        let info = self.begin()?;
        let target = clamp_to_buffer(i32::from(saved.x), i32::from(saved.y), info.size);
        self.console.set_cursor_position(target)
    }

    fn set_title(&mut self, title: &str) -> Result<()> {
        self.flush_text()?;
        self.console.set_title(title)
    }
}

/// Byte stream front end: UTF-8 decoding, tokenizing and translation.
pub struct AnsiWriter<C: ConsoleApi> {
    utf8: Utf8Accumulator,
    parser: AnsiParser,
    translator: ConsoleTranslator<C>,
}

impl<C: ConsoleApi> AnsiWriter<C> {
    pub fn new(console: Arc<C>) -> Result<Self> {
        Ok(Self::with_translator(ConsoleTranslator::new(console)?))
    }

    pub fn with_translator(translator: ConsoleTranslator<C>) -> Self {
        Self { utf8: Utf8Accumulator::new(), parser: AnsiParser::new(), translator }
    }

    pub fn translator(&self) -> &ConsoleTranslator<C> {
        &self.translator
    }
}

impl<C: ConsoleApi> Write for AnsiWriter<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = self.utf8.accumulate(buf);
        self.parser.advance(&mut self.translator, &text)?;
        self.translator.flush_text()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.translator.flush_text()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{Call, ScriptedConsole};

    fn console(width: i16, height: i16) -> Arc<ScriptedConsole> {
        Arc::new(ScriptedConsole::new(width, height))
    }

    fn run(console: &Arc<ScriptedConsole>, input: &str) -> Vec<Call> {
        let mut out = AnsiWriter::new(console.clone()).unwrap();
        console.clear_calls();
        out.write_all(input.as_bytes()).unwrap();
        console.calls()
    }

    /// 80x300 buffer showing rows 100..=124.
    fn scrolled_console() -> ScriptedConsole {
        ScriptedConsole::with_window(80, 300, SmallRect::new(0, 100, 79, 124))
    }

    fn cursor(console: &ScriptedConsole) -> Coord {
        console.script().info.cursor
    }

    #[test]
    fn test_cursor_motion_is_clamped() {
        let console = console(80, 25);
        console.set_cursor(2, 3);

        run(&console, "\x1b[99A");
        assert_eq!(cursor(&console), Coord::new(2, 0));
        run(&console, "\x1b[99D");
        assert_eq!(cursor(&console), Coord::new(0, 0));
        run(&console, "\x1b[500C");
        assert_eq!(cursor(&console), Coord::new(79, 0));
        run(&console, "\x1b[99;999H");
        assert_eq!(cursor(&console), Coord::new(79, 24));
    }

    #[test]
    fn test_cursor_to_is_window_relative() {
        let console = Arc::new(scrolled_console());
        run(&console, "\x1b[3;5H");
        assert_eq!(cursor(&console), Coord::new(4, 102));

        run(&console, "\x1b[2F");
        assert_eq!(cursor(&console), Coord::new(0, 100));
        run(&console, "\x1b[9G\x1b[4E");
        assert_eq!(cursor(&console), Coord::new(0, 104));
    }

    #[test]
    fn test_restore_without_save_is_noop() {
        let console = console(80, 25);
        console.set_cursor(7, 8);
        assert!(run(&console, "\x1b[u\x1b8").is_empty());
        assert_eq!(cursor(&console), Coord::new(7, 8));
    }

    #[test]
    fn test_restore_is_idempotent() {
        let console = console(80, 25);
        console.set_cursor(5, 6);
        let mut out = AnsiWriter::new(console.clone()).unwrap();
        out.write_all(b"\x1b[s\x1b[10;10H").unwrap();
        assert_eq!(cursor(&console), Coord::new(9, 9));

        out.write_all(b"\x1b[u").unwrap();
        assert_eq!(cursor(&console), Coord::new(5, 6));
        out.write_all(b"\x1b[u").unwrap();
        assert_eq!(cursor(&console), Coord::new(5, 6));
    }

    #[test]
    fn test_default_foreground_round_trip() {
        let console = console(80, 25);
        console.script().info.attributes = 0x0017;

        for color in ["31", "92", "38;5;201", "38;2;1;2;3"] {
            let calls = run(&console, &format!("\x1b[{}m\x1b[39m", color));
            let Some(Call::SetAttribute(word)) = calls.last() else {
                panic!("no attribute applied: {:?}", calls);
            };
            assert_eq!(word & 0x000F, 0x0007);
            assert_eq!(word & 0x00F0, 0x0010);
        }
    }

    #[test]
    fn test_indexed_colors_are_rounded() {
        let console = console(80, 25);
        let calls = run(&console, "\x1b[38;5;196m");
        assert_eq!(calls, vec![Call::SetAttribute(0x000C)]);

        let calls = run(&console, "\x1b[44m");
        assert_eq!(calls, vec![Call::SetAttribute(0x001C)]);
    }

    #[test]
    fn test_emphasis_composition() {
        let console = console(80, 25);
        let mut out = AnsiWriter::new(console.clone()).unwrap();
        console.clear_calls();

        out.write_all(b"\x1b[1m\x1b[7m\x1b[27m\x1b[4m\x1b[0m").unwrap();
        assert_eq!(
            console.calls(),
            vec![
                Call::SetAttribute(0x000F),
                Call::SetAttribute(0x00F0),
                Call::SetAttribute(0x000F),
                Call::SetAttribute(0x008F),
                Call::SetAttribute(0x0007),
            ]
        );
    }

    #[test]
    fn test_erase_line_counts() {
        let console = console(80, 25);
        console.set_cursor(10, 4);

        assert_eq!(
            run(&console, "\x1b[K"),
            vec![
                Call::FillChar { ch: ' ', len: 70, origin: Coord::new(10, 4) },
                Call::FillAttr { attributes: 0x0007, len: 70, origin: Coord::new(10, 4) },
            ]
        );
        assert_eq!(
            run(&console, "\x1b[2K")[0],
            Call::FillChar { ch: ' ', len: 80, origin: Coord::new(0, 4) }
        );
        assert_eq!(
            run(&console, "\x1b[1K")[0],
            Call::FillChar { ch: ' ', len: 10, origin: Coord::new(0, 4) }
        );
    }

    #[test]
    fn test_erase_screen_stays_in_window() {
        let console = Arc::new(scrolled_console());
        console.set_cursor(5, 110);

        assert_eq!(
            run(&console, "\x1b[2J")[0],
            Call::FillChar { ch: ' ', len: 2000, origin: Coord::new(0, 100) }
        );
        assert_eq!(
            run(&console, "\x1b[1J")[0],
            Call::FillChar { ch: ' ', len: 805, origin: Coord::new(0, 100) }
        );
        assert_eq!(
            run(&console, "\x1b[J")[0],
            Call::FillChar { ch: ' ', len: 1195, origin: Coord::new(5, 110) }
        );
    }

    #[test]
    fn test_erase_uses_positive_attributes() {
        let console = console(80, 25);
        console.script().info.attributes = 0x0017;
        let calls = run(&console, "\x1b[7m\x1b[2K");
        assert_eq!(calls[0], Call::SetAttribute(0x0071));
        assert_eq!(
            calls[2],
            Call::FillAttr { attributes: 0x0017, len: 80, origin: Coord::new(0, 0) }
        );
    }

    #[test]
    fn test_cursor_down_scrolls_past_bottom() {
        let console = console(80, 25);
        console.script().info.attributes = 0x001E;
        let mut out = AnsiWriter::new(console.clone()).unwrap();
        out.write_all(b"\x1b[33m").unwrap();
        console.set_cursor(3, 23);
        console.clear_calls();

        out.write_all(b"\x1b[3B").unwrap();
        let window = SmallRect::new(0, 0, 79, 24);
        assert_eq!(
            console.calls(),
            vec![
                Call::SetCursor(Coord::new(3, 24)),
                Call::Scroll {
                    scroll: window,
                    clip: Some(window),
                    destination: Coord::new(0, -2),
                    fill: CharInfo { ch: ' ', attributes: 0x001E },
                },
            ]
        );
    }

    #[test]
    fn test_cursor_down_at_bottom_only_scrolls() {
        let console = console(80, 25);
        console.set_cursor(0, 24);
        let calls = run(&console, "\x1b[B");
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], Call::Scroll { destination: Coord { x: 0, y: -1 }, .. }));
    }

    #[test]
    fn test_cursor_down_inside_buffer_does_not_scroll() {
        let console = console(80, 25);
        console.set_cursor(0, 2);
        assert_eq!(run(&console, "\x1b[2B"), vec![Call::SetCursor(Coord::new(0, 4))]);
    }

    #[test]
    fn test_insert_and_delete_lines() {
        let console = console(80, 25);
        console.set_cursor(4, 5);
        let region = SmallRect::new(0, 5, 79, 24);
        let blank = CharInfo { ch: ' ', attributes: 0x0007 };

        assert_eq!(
            run(&console, "\x1b[2L"),
            vec![Call::Scroll {
                scroll: region,
                clip: Some(region),
                destination: Coord::new(0, 7),
                fill: blank,
            }]
        );
        assert_eq!(
            run(&console, "\x1b[2M"),
            vec![Call::Scroll {
                scroll: region,
                clip: Some(region),
                destination: Coord::new(0, 3),
                fill: blank,
            }]
        );
    }

    #[test]
    fn test_scroll_window() {
        let console = Arc::new(scrolled_console());
        let calls = run(&console, "\x1b[3S\x1b[T");
        assert!(matches!(calls[0], Call::Scroll { destination: Coord { x: 0, y: 97 }, .. }));
        assert!(matches!(calls[1], Call::Scroll { destination: Coord { x: 0, y: 101 }, .. }));
    }

    #[test]
    fn test_text_is_flushed_before_operations() {
        let console = console(80, 25);
        let calls = run(&console, "ab\x1b[Kcd\x1b]0;title\x07");
        assert_eq!(calls[0], Call::Write("ab".to_string()));
        assert!(matches!(calls[1], Call::FillChar { .. }));
        assert!(matches!(calls[2], Call::FillAttr { .. }));
        assert_eq!(calls[3], Call::Write("cd".to_string()));
        assert_eq!(calls[4], Call::Title("title".to_string()));
    }

    #[test]
    fn test_native_failure_aborts_write() {
        let console = console(80, 25);
        let mut out = AnsiWriter::new(console.clone()).unwrap();
        console.script().fail = Some("FillConsoleOutputCharacterW");
        assert!(out.write_all(b"\x1b[2J").is_err());
    }

    #[test]
    fn test_resolve_is_pure() {
        let info = ScreenBufferInfo {
            size: Coord::new(10, 5),
            cursor: Coord::new(3, 3),
            attributes: 0x0007,
            window: SmallRect::new(0, 0, 9, 4),
            max_window_size: Coord::new(10, 5),
        };
        assert_eq!(CursorMotion::Backward(9).resolve(&info), Coord::new(0, 3));
        assert_eq!(CursorMotion::NextLine(9).resolve(&info), Coord::new(0, 4));
        assert_eq!(CursorMotion::Column(4).resolve(&info), Coord::new(3, 3));
        assert_eq!(
            FillRegion::line(Erase::ToEnd, &info),
            FillRegion { origin: Coord::new(3, 3), len: 7 }
        );
    }
}
