use std::io::{self, Write};

use crossterm::cursor::{MoveToColumn, MoveUp};
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};

use crate::constants::style;
use crate::constants::{PROMPT_PREFIX, SPINNER_FRAMES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Thinking,
    Streaming,
}

/// Cycles through the animation frames. The index lives here, outside the
/// redraw path, so prompt redraws and keypresses never reset the animation.
pub struct Spinner {
    index: usize,
}

impl Spinner {
    fn new() -> Self {
        Self { index: 0 }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index]
    }

    fn advance(&mut self) {
        self.index = (self.index + 1) % SPINNER_FRAMES.len();
    }
}

/// Coordinates all terminal output. The bottom of the screen is a dynamic
/// region (prompt, spinner) that is erased and redrawn on every update;
/// everything above it is permanent scrollback. `line_count` always equals
/// the number of lines the last redraw wrote, so the next erase removes
/// exactly what was drawn.
pub struct Display<W: Write> {
    out: W,
    width: usize,
    mode: Mode,
    line_count: usize,
    stream_column: usize,
    stream_open: bool,
    spinner: Spinner,
    prompt: String,
}

impl<W: Write> Display<W> {
    pub fn new(out: W, width: usize) -> Self {
        Self {
            out,
            width,
            mode: Mode::Idle,
            line_count: 0,
            stream_column: 0,
            stream_open: false,
            spinner: Spinner::new(),
            prompt: PROMPT_PREFIX.to_string(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn stream_open(&self) -> bool {
        self.stream_open
    }

    pub fn set_prompt(&mut self, line: String) {
        self.prompt = line;
    }

    pub fn out_mut(&mut self) -> &mut W {
        &mut self.out
    }

    /// Emit permanent output above the dynamic region, then restore whatever
    /// dynamic content was active.
    pub fn write_permanent(&mut self, text: &str) -> io::Result<()> {
        self.erase_dynamic()?;
        self.stream_open = false;
        self.write_text(text)?;
        self.write_raw("\r\n")?;
        self.draw_dynamic()
    }

    /// Append pre-styled, pre-wrapped streamed text. The text becomes
    /// permanent the moment it is written; only the prompt below it stays
    /// redrawable. `end_col` is the caller's wrap column after `text`.
    pub fn write_streaming(&mut self, text: &str, end_col: usize) -> io::Result<()> {
        self.erase_dynamic()?;
        if self.stream_open {
            // The prompt sat on the line below the open streamed line; after
            // erasing it, hop back to where the stream left off.
            queue!(self.out, MoveUp(1))?;
            queue!(self.out, MoveToColumn(self.stream_column.min(u16::MAX as usize) as u16))?;
        }
        self.write_text(text)?;
        self.stream_column = end_col;
        self.stream_open = true;
        self.mode = Mode::Streaming;
        self.write_raw("\r\n")?;
        self.draw_dynamic()
    }

    pub fn start_spinner(&mut self) -> io::Result<()> {
        self.erase_dynamic()?;
        self.stream_open = false;
        self.mode = Mode::Thinking;
        self.draw_dynamic()
    }

    pub fn clear_spinner(&mut self) -> io::Result<()> {
        if self.mode == Mode::Thinking {
            self.mode = Mode::Idle;
        }
        self.erase_dynamic()?;
        self.draw_dynamic()
    }

    pub fn tick_spinner(&mut self) -> io::Result<()> {
        if self.mode != Mode::Thinking {
            return Ok(());
        }
        self.spinner.advance();
        self.erase_dynamic()?;
        self.draw_dynamic()
    }

    pub fn redraw_prompt(&mut self) -> io::Result<()> {
        self.erase_dynamic()?;
        self.draw_dynamic()
    }

    /// Remove the dynamic region entirely, leaving only permanent output.
    /// Used on shutdown so the scrollback ends cleanly.
    pub fn clear_dynamic(&mut self) -> io::Result<()> {
        self.erase_dynamic()?;
        self.out.flush()
    }

    fn erase_dynamic(&mut self) -> io::Result<()> {
        if self.line_count == 0 {
            return Ok(());
        }
        for i in 0..self.line_count {
            queue!(self.out, Clear(ClearType::CurrentLine))?;
            if i + 1 < self.line_count {
                queue!(self.out, MoveUp(1))?;
            }
        }
        queue!(self.out, MoveToColumn(0))?;
        self.line_count = 0;
        Ok(())
    }

    fn draw_dynamic(&mut self) -> io::Result<()> {
        if self.mode == Mode::Thinking {
            let line = format!(
                "{}{}{} {}thinking{}",
                style::CYAN,
                self.spinner.frame(),
                style::RESET,
                style::DIM,
                style::RESET
            );
            self.write_raw(&line)?;
            self.write_raw("\r\n")?;
            self.write_raw(&self.prompt.clone())?;
            self.line_count = 2;
        } else {
            self.write_raw(&self.prompt.clone())?;
            self.line_count = 1;
        }
        self.out.flush()
    }

    // Raw mode leaves output post-processing off, so LF alone does not
    // return the carriage.
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        let normalized = text.replace('\n', "\r\n");
        self.out.write_all(normalized.as_bytes())
    }

    fn write_raw(&mut self, text: &str) -> io::Result<()> {
        self.out.write_all(text.as_bytes())
    }
}
