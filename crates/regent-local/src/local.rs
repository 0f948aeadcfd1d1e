//! Interactive terminal console.
//!
//! All writes go through one mutex that also guards the line being edited.
//! Output arriving while the operator types blanks the line, prints, and then
//! redraws prompt, buffer, and cursor, so output never lands in the middle of
//! the input.

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use regent_console::{CommandRegistry, Console, ConsoleOutput};
use regent_types::level::OutputLevel;

use crate::editor::{EditAction, LineEditor};
use crate::keys::{KeySource, TerminalKeys};
use crate::render;

/// Reserved line that clears the screen and history instead of running.
pub const CLEAR_CONSOLE: &str = "clear console";

/// Restores cooked mode when dropped.
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            log::warn!("failed to leave raw mode: {e}");
        }
    }
}

enum Input {
    /// Key-at-a-time editing.
    Keys(Box<dyn KeySource>),
    /// Whole lines, for stdin that is not a terminal.
    Lines(Box<dyn BufRead + Send>),
}

struct Screen<W> {
    out: W,
    editor: LineEditor,
    prompt: String,
    /// A prompt and partial line are currently on screen.
    editing: bool,
    color: bool,
    newline: &'static str,
}

impl<W: Write> Screen<W> {
    fn draw_line(&mut self) -> io::Result<()> {
        let column = self.prompt.chars().count() + self.editor.cursor();
        let text = format!("{}{}", self.prompt, self.editor.line());
        queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(text),
            MoveToColumn(u16::try_from(column).unwrap_or(u16::MAX))
        )?;
        self.out.flush()
    }

    fn write_output(&mut self, text: &str, level: OutputLevel) -> io::Result<()> {
        if self.editing {
            queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        }
        for line in text.lines() {
            render::queue_line(&mut self.out, line, level, self.color)?;
            self.out.write_all(self.newline.as_bytes())?;
        }
        if text.is_empty() {
            self.out.write_all(self.newline.as_bytes())?;
        }
        if self.editing {
            self.draw_line()
        } else {
            self.out.flush()
        }
    }

    fn end_line(&mut self) -> io::Result<()> {
        self.editing = false;
        self.out.write_all(self.newline.as_bytes())?;
        self.out.flush()
    }
}

/// Console bound to a terminal (or any writer plus key source).
pub struct LocalConsole<W: Write + Send> {
    screen: Mutex<Screen<W>>,
    input: Mutex<Input>,
    registry: Arc<CommandRegistry>,
    _raw: Option<RawModeGuard>,
}

impl LocalConsole<io::Stdout> {
    /// Console on the process terminal. Uses raw-mode editing when stdin is a
    /// terminal, plain line reads otherwise.
    pub fn stdio(registry: Arc<CommandRegistry>, history_size: usize) -> io::Result<Self> {
        let stdout = io::stdout();
        let color = stdout.is_terminal();
        if io::stdin().is_terminal() {
            let raw = RawModeGuard::enable()?;
            let mut console = Self::with_keys(stdout, Box::new(TerminalKeys), registry, history_size);
            console.screen_mut().color = color;
            console._raw = Some(raw);
            Ok(console)
        } else {
            log::debug!("stdin is not a terminal; reading plain lines");
            let mut console = Self::with_lines(
                stdout,
                Box::new(io::BufReader::new(io::stdin())),
                registry,
                history_size,
            );
            console.screen_mut().color = color;
            Ok(console)
        }
    }
}

impl<W: Write + Send> LocalConsole<W> {
    /// Key-driven console writing to `out`, without colors.
    pub fn with_keys(
        out: W,
        keys: Box<dyn KeySource>,
        registry: Arc<CommandRegistry>,
        history_size: usize,
    ) -> Self {
        Self::build(out, Input::Keys(keys), "\r\n", registry, history_size)
    }

    /// Line-driven console writing to `out`, without colors.
    pub fn with_lines(
        out: W,
        lines: Box<dyn BufRead + Send>,
        registry: Arc<CommandRegistry>,
        history_size: usize,
    ) -> Self {
        Self::build(out, Input::Lines(lines), "\n", registry, history_size)
    }

    fn build(
        out: W,
        input: Input,
        newline: &'static str,
        registry: Arc<CommandRegistry>,
        history_size: usize,
    ) -> Self {
        Self {
            screen: Mutex::new(Screen {
                out,
                editor: LineEditor::new(history_size),
                prompt: String::new(),
                editing: false,
                color: false,
                newline,
            }),
            input: Mutex::new(input),
            registry,
            _raw: None,
        }
    }

    fn screen(&self) -> MutexGuard<'_, Screen<W>> {
        self.screen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn screen_mut(&mut self) -> &mut Screen<W> {
        self.screen.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accepted lines, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.screen()
            .editor
            .history()
            .iter()
            .map(str::to_string)
            .collect()
    }

    fn clear_console(&self) -> io::Result<()> {
        let mut screen = self.screen();
        screen.editor.clear_history();
        queue!(screen.out, Clear(ClearType::All), crossterm::cursor::MoveTo(0, 0))?;
        screen.out.flush()
    }

    fn read_keys(&self, keys: &mut dyn KeySource, prompt: &str) -> io::Result<Option<String>> {
        {
            let mut screen = self.screen();
            screen.prompt = prompt.to_string();
            screen.editing = true;
            screen.draw_line()?;
        }
        loop {
            // Blocking read happens without the screen lock so output from
            // other threads keeps flowing.
            let Some(key) = keys.next_key()? else {
                self.screen().end_line()?;
                return Ok(None);
            };
            let action = self.screen().editor.apply(key);
            match action {
                EditAction::Nothing => {},
                EditAction::Redraw => self.screen().draw_line()?,
                EditAction::Complete(line) => {
                    let candidates = self.registry.complete(&line);
                    let mut screen = self.screen();
                    screen.end_line()?;
                    if !candidates.is_empty() {
                        let text = candidates.join("  ");
                        screen.write_output(&text, OutputLevel::Normal)?;
                    }
                    screen.editing = true;
                    screen.draw_line()?;
                },
                EditAction::Cancel => {
                    let mut screen = self.screen();
                    screen.out.write_all(b"^C")?;
                    screen.end_line()?;
                    screen.editing = true;
                    screen.draw_line()?;
                },
                EditAction::EndOfInput => {
                    self.screen().end_line()?;
                    return Ok(None);
                },
                EditAction::Submit(line) => {
                    self.screen().end_line()?;
                    if line.trim().eq_ignore_ascii_case(CLEAR_CONSOLE) {
                        self.clear_console()?;
                        let mut screen = self.screen();
                        screen.editing = true;
                        screen.draw_line()?;
                        continue;
                    }
                    return Ok(Some(line));
                },
            }
        }
    }

    fn read_plain(&self, lines: &mut dyn BufRead, prompt: &str) -> io::Result<Option<String>> {
        loop {
            {
                let mut screen = self.screen();
                screen.out.write_all(prompt.as_bytes())?;
                screen.out.flush()?;
            }
            let mut buf = String::new();
            if lines.read_line(&mut buf)? == 0 {
                return Ok(None);
            }
            let line = buf.trim_end_matches(['\r', '\n']).to_string();
            if line.trim().eq_ignore_ascii_case(CLEAR_CONSOLE) {
                self.clear_console()?;
                continue;
            }
            self.screen().editor.record(&line);
            return Ok(Some(line));
        }
    }
}

impl<W: Write + Send> ConsoleOutput for LocalConsole<W> {
    fn output(&self, text: &str, level: OutputLevel) {
        // A failed terminal write has nowhere left to be reported.
        let _ = self.screen().write_output(text, level);
    }
}

impl<W: Write + Send> Console for LocalConsole<W> {
    fn read_line(&self, prompt: &str) -> Option<String> {
        let mut input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        let result = match &mut *input {
            Input::Keys(keys) => self.read_keys(keys.as_mut(), prompt),
            Input::Lines(lines) => self.read_plain(lines.as_mut(), prompt),
        };
        match result {
            Ok(line) => line,
            Err(e) => {
                log::error!("console input failed: {e}");
                None
            },
        }
    }
}
