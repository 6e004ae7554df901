//! ANSI escape sequence tokenizer
//!
//! Splits an output stream into plain text and the control operations a
//! console translator understands, handing both to an [`AnsiHandler`].

use crate::error::Result;

/// Extent of an erase request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Erase {
    /// From the cursor to the end (parameter 0)
    ToEnd,
    /// From the start up to the cursor (parameter 1)
    ToBeginning,
    /// Everything (parameter 2)
    All,
}

impl Erase {
    fn from_param(param: u16) -> Option<Self> {
        match param {
            0 => Some(Erase::ToEnd),
            1 => Some(Erase::ToBeginning),
            2 => Some(Erase::All),
            _ => None,
        }
    }
}

/// Requested color before it is reduced to the console palette
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    /// xterm 256-color index
    Indexed(u8),
    Rgb(u8, u8, u8),
}

/// Rendition flags
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attribute {
    Bold,
    NormalIntensity,
    Underline,
    UnderlineOff,
    Negative,
    Positive,
}

/// Receiver of tokenized output
///
/// Counts are always at least 1. Rows and columns are 1-based, as they
/// appear on the wire.
pub trait AnsiHandler {
    fn print(&mut self, ch: char) -> Result<()>;

    fn cursor_up(&mut self, n: u16) -> Result<()>;
    /// Cursor down, scrolling the window when the bottom of the buffer is hit.
    fn cursor_down(&mut self, n: u16) -> Result<()>;
    fn cursor_forward(&mut self, n: u16) -> Result<()>;
    fn cursor_backward(&mut self, n: u16) -> Result<()>;
    fn cursor_next_line(&mut self, n: u16) -> Result<()>;
    fn cursor_previous_line(&mut self, n: u16) -> Result<()>;
    fn cursor_to_column(&mut self, col: u16) -> Result<()>;
    fn cursor_to(&mut self, row: u16, col: u16) -> Result<()>;

    fn erase_screen(&mut self, erase: Erase) -> Result<()>;
    fn erase_line(&mut self, erase: Erase) -> Result<()>;

    fn insert_lines(&mut self, n: u16) -> Result<()>;
    fn delete_lines(&mut self, n: u16) -> Result<()>;
    fn scroll_up(&mut self, n: u16) -> Result<()>;
    fn scroll_down(&mut self, n: u16) -> Result<()>;

    fn set_foreground(&mut self, color: Color) -> Result<()>;
    fn set_background(&mut self, color: Color) -> Result<()>;
    fn default_foreground(&mut self) -> Result<()>;
    fn default_background(&mut self) -> Result<()>;
    fn set_attribute(&mut self, attribute: Attribute) -> Result<()>;
    fn reset_attributes(&mut self) -> Result<()>;

    fn save_cursor(&mut self) -> Result<()>;
    fn restore_cursor(&mut self) -> Result<()>;

    fn set_title(&mut self, title: &str) -> Result<()>;
}

const MAX_PARAMS: usize = 32;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    OscString,
    EscapeInOsc,
}

/// Tokenizer state machine
///
/// State survives across calls to [`advance`](AnsiParser::advance), so a
/// sequence split over two writes is still recognized.
#[derive(Debug, Default)]
pub struct AnsiParser {
    state: ParserState,
    params: Vec<u16>,
    intermediates: Vec<char>,
    current_param: Option<u16>,
    osc_string: String,
}

impl AnsiParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(MAX_PARAMS),
            intermediates: Vec::with_capacity(4),
            current_param: None,
            osc_string: String::new(),
        }
    }

    /// True when no sequence is partially consumed.
    pub fn is_ground(&self) -> bool {
        self.state == ParserState::Ground
    }

    /// Feed decoded text to the parser.
    pub fn advance<H: AnsiHandler>(&mut self, handler: &mut H, text: &str) -> Result<()> {
        for ch in text.chars() {
            self.feed(handler, ch)?;
        }
        Ok(())
    }

    fn feed<H: AnsiHandler>(&mut self, handler: &mut H, ch: char) -> Result<()> {
        match self.state {
            ParserState::OscString => return self.osc_string_state(handler, ch),
            ParserState::EscapeInOsc => return self.escape_in_osc(handler, ch),
            _ => {}
        }

        if ch == '\x1b' {
            self.enter_escape();
            return Ok(());
        }

        match self.state {
            ParserState::Ground => handler.print(ch),
            ParserState::Escape => self.escape(handler, ch),
            ParserState::EscapeIntermediate => {
                self.escape_intermediate(ch);
                Ok(())
            }
            ParserState::CsiEntry => self.csi_entry(handler, ch),
            ParserState::CsiParam => self.csi_param(handler, ch),
            ParserState::CsiIntermediate => self.csi_intermediate(handler, ch),
            ParserState::OscString | ParserState::EscapeInOsc => Ok(()),
        }
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.params.clear();
        self.intermediates.clear();
        self.current_param = None;
    }

    fn escape<H: AnsiHandler>(&mut self, handler: &mut H, ch: char) -> Result<()> {
        self.state = ParserState::Ground;
        match ch {
            '[' => self.state = ParserState::CsiEntry,
            ']' => {
                self.state = ParserState::OscString;
                self.osc_string.clear();
            }
            // DECSC / DECRC
            '7' => return handler.save_cursor(),
            '8' => return handler.restore_cursor(),
            '\x20'..='\x2f' => {
                self.intermediates.push(ch);
                self.state = ParserState::EscapeIntermediate;
            }
            _ => tracing::debug!("Unknown escape: {:?}", ch),
        }
        Ok(())
    }

    /// Charset designations and the like; consumed and dropped.
    fn escape_intermediate(&mut self, ch: char) {
        match ch {
            '\x20'..='\x2f' => self.intermediates.push(ch),
            _ => {
                tracing::debug!(
                    "Ignoring escape: intermediates={:?}, final={:?}",
                    self.intermediates,
                    ch
                );
                self.state = ParserState::Ground;
            }
        }
    }

    fn csi_entry<H: AnsiHandler>(&mut self, handler: &mut H, ch: char) -> Result<()> {
        match ch {
            '0'..='9' => {
                self.current_param = Some(digit(ch));
                self.state = ParserState::CsiParam;
            }
            ';' | ':' => {
                self.push_param(0);
                self.state = ParserState::CsiParam;
            }
            '?' | '>' | '!' | '=' | '<' => self.intermediates.push(ch),
            '\x20'..='\x2f' => {
                self.intermediates.push(ch);
                self.state = ParserState::CsiIntermediate;
            }
            '\x40'..='\x7e' => return self.execute_csi(handler, ch),
            _ => self.state = ParserState::Ground,
        }
        Ok(())
    }

    fn csi_param<H: AnsiHandler>(&mut self, handler: &mut H, ch: char) -> Result<()> {
        match ch {
            '0'..='9' => {
                let value = self.current_param.unwrap_or(0);
                self.current_param = Some(value.saturating_mul(10).saturating_add(digit(ch)));
            }
            // Subparameters are treated as plain parameters
            ';' | ':' => {
                let value = self.current_param.take().unwrap_or(0);
                self.push_param(value);
            }
            '\x20'..='\x2f' => {
                if let Some(p) = self.current_param.take() {
                    self.push_param(p);
                }
                self.intermediates.push(ch);
                self.state = ParserState::CsiIntermediate;
            }
            '\x40'..='\x7e' => {
                if let Some(p) = self.current_param.take() {
                    self.push_param(p);
                }
                return self.execute_csi(handler, ch);
            }
            _ => self.state = ParserState::Ground,
        }
        Ok(())
    }

    fn csi_intermediate<H: AnsiHandler>(&mut self, handler: &mut H, ch: char) -> Result<()> {
        match ch {
            '\x20'..='\x2f' => self.intermediates.push(ch),
            '\x40'..='\x7e' => return self.execute_csi(handler, ch),
            _ => self.state = ParserState::Ground,
        }
        Ok(())
    }

    fn osc_string_state<H: AnsiHandler>(&mut self, handler: &mut H, ch: char) -> Result<()> {
        match ch {
            '\x07' | '\u{9c}' => {
                self.state = ParserState::Ground;
                self.execute_osc(handler)
            }
            '\x1b' => {
                self.state = ParserState::EscapeInOsc;
                Ok(())
            }
            _ => {
                self.osc_string.push(ch);
                Ok(())
            }
        }
    }

    fn escape_in_osc<H: AnsiHandler>(&mut self, handler: &mut H, ch: char) -> Result<()> {
        self.state = ParserState::Ground;
        self.execute_osc(handler)?;
        if ch == '\\' {
            return Ok(());
        }
        // Not ST: the ESC starts a new sequence
        self.enter_escape();
        self.feed(handler, ch)
    }

    fn push_param(&mut self, value: u16) {
        if self.params.len() < MAX_PARAMS {
            self.params.push(value);
        }
    }

    fn execute_csi<H: AnsiHandler>(&mut self, handler: &mut H, final_char: char) -> Result<()> {
        self.state = ParserState::Ground;

        if !self.intermediates.is_empty() {
            tracing::debug!(
                "Unknown CSI: intermediates={:?}, params={:?}, final={:?}",
                self.intermediates,
                self.params,
                final_char
            );
            return Ok(());
        }

        let params = std::mem::take(&mut self.params);
        let result = self.dispatch_csi(handler, &params, final_char);
        self.params = params;
        result
    }

    fn dispatch_csi<H: AnsiHandler>(
        &self,
        handler: &mut H,
        params: &[u16],
        final_char: char,
    ) -> Result<()> {
        let n = count(params, 0);

        match final_char {
            'A' => handler.cursor_up(n),
            'B' => handler.cursor_down(n),
            'C' => handler.cursor_forward(n),
            'D' => handler.cursor_backward(n),
            'E' => handler.cursor_next_line(n),
            'F' => handler.cursor_previous_line(n),
            'G' => handler.cursor_to_column(n),
            'H' | 'f' => handler.cursor_to(n, count(params, 1)),
            'J' | 'K' => {
                let param = params.first().copied().unwrap_or(0);
                match Erase::from_param(param) {
                    Some(erase) if final_char == 'J' => handler.erase_screen(erase),
                    Some(erase) => handler.erase_line(erase),
                    None => {
                        tracing::debug!("Unsupported erase mode {} for {:?}", param, final_char);
                        Ok(())
                    }
                }
            }
            'L' => handler.insert_lines(n),
            'M' => handler.delete_lines(n),
            'S' => handler.scroll_up(n),
            'T' => handler.scroll_down(n),
            'm' => execute_sgr(handler, params),
            's' => handler.save_cursor(),
            'u' => handler.restore_cursor(),
            _ => {
                tracing::debug!("Unknown CSI: params={:?}, final={:?}", params, final_char);
                Ok(())
            }
        }
    }

    fn execute_osc<H: AnsiHandler>(&mut self, handler: &mut H) -> Result<()> {
        let osc = std::mem::take(&mut self.osc_string);
        match osc.split_once(';') {
            Some(("0" | "1" | "2", title)) => handler.set_title(title),
            _ => {
                tracing::debug!("Ignoring OSC: {:?}", osc);
                Ok(())
            }
        }
    }
}

fn digit(ch: char) -> u16 {
    ch.to_digit(10).unwrap_or(0) as u16
}

/// Count parameter at `index`; missing or zero means 1.
fn count(params: &[u16], index: usize) -> u16 {
    params.get(index).copied().unwrap_or(1).max(1)
}

fn execute_sgr<H: AnsiHandler>(handler: &mut H, params: &[u16]) -> Result<()> {
    if params.is_empty() {
        return handler.reset_attributes();
    }

    let mut iter = params.iter().copied();
    while let Some(param) = iter.next() {
        match param {
            0 => handler.reset_attributes()?,
            1 => handler.set_attribute(Attribute::Bold)?,
            4 => handler.set_attribute(Attribute::Underline)?,
            7 => handler.set_attribute(Attribute::Negative)?,
            22 => handler.set_attribute(Attribute::NormalIntensity)?,
            24 => handler.set_attribute(Attribute::UnderlineOff)?,
            27 => handler.set_attribute(Attribute::Positive)?,

            30..=37 => handler.set_foreground(Color::Indexed((param - 30) as u8))?,
            38 => {
                if let Some(color) = extended_color(&mut iter) {
                    handler.set_foreground(color)?;
                }
            }
            39 => handler.default_foreground()?,

            40..=47 => handler.set_background(Color::Indexed((param - 40) as u8))?,
            48 => {
                if let Some(color) = extended_color(&mut iter) {
                    handler.set_background(color)?;
                }
            }
            49 => handler.default_background()?,

            90..=97 => handler.set_foreground(Color::Indexed((param - 90 + 8) as u8))?,
            100..=107 => handler.set_background(Color::Indexed((param - 100 + 8) as u8))?,

            _ => tracing::debug!("Ignoring SGR {}", param),
        }
    }
    Ok(())
}

/// `5;n` or `2;r;g;b` following 38/48
fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<Color> {
    match iter.next()? {
        5 => iter.next().map(|n| Color::Indexed(n.min(255) as u8)),
        2 => {
            let mut channel = || iter.next().unwrap_or(0).min(255) as u8;
            let r = channel();
            let g = channel();
            let b = channel();
            Some(Color::Rgb(r, g, b))
        }
        mode => {
            tracing::debug!("Unknown extended color mode {}", mode);
            None
        }
    }
}
