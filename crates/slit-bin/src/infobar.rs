//! The bottom info bar: status, prompts, and transient messages.
//!
//! One reserved row. In status mode it shows `currentLine/totalLines` plus
//! the filter state; prompt modes own the row for typed input with a
//! blinking cursor, history recall, and search-mode cycling; messages
//! (red/yellow/green) persist until the next user action.

use std::io::{self, Write};

use core_config::History;
use core_events::{KeyCode, KeyEvent, KeyModifiers};
use core_fetch::Pos;
use core_filter::SearchMode;
use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};

const PROMPT_WIDTH: u16 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptMode {
    Search,
    BackSearch,
    Filter,
    Append,
    Exclude,
    Highlight,
    Save,
    KeepChars,
}

impl PromptMode {
    fn glyph(&self) -> char {
        match self {
            PromptMode::Search => '/',
            PromptMode::BackSearch => '?',
            PromptMode::Filter => '&',
            PromptMode::Append => '+',
            PromptMode::Exclude => '-',
            PromptMode::Highlight => '~',
            PromptMode::Save => '>',
            PromptMode::KeepChars => 'K',
        }
    }

    fn color(&self) -> Color {
        match self {
            PromptMode::Save => Color::DarkMagenta,
            _ => Color::DarkGreen,
        }
    }

    /// Whether the typed pattern is interpreted under the current search
    /// mode (and the mode indicator is worth showing).
    fn uses_search_mode(&self) -> bool {
        !matches!(self, PromptMode::Save | PromptMode::KeepChars)
    }

    fn records_history(&self) -> bool {
        !matches!(self, PromptMode::Save | PromptMode::KeepChars)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Status,
    Prompt(PromptMode),
    Message,
}

#[derive(Clone, Debug)]
pub struct Message {
    pub text: String,
    pub color: Color,
}

/// Snapshot the viewer hands over for the status row: position of the
/// bottom visible line and the last known total.
#[derive(Clone, Copy, Debug)]
pub struct StatusView {
    pub current: Pos,
    pub total: u64,
    pub filters_enabled: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PromptOutcome {
    Pending,
    Cancelled,
    Submitted(PromptMode, String),
}

pub struct InfoBar {
    width: u16,
    y: u16,
    mode: Mode,
    edit: Vec<char>,
    cx: usize,
    message: Option<Message>,
    history: History,
    search_mode: SearchMode,
}

impl InfoBar {
    pub fn new(history: History) -> InfoBar {
        InfoBar {
            width: 0,
            y: 0,
            mode: Mode::Status,
            edit: Vec::new(),
            cx: 0,
            message: None,
            history,
            search_mode: SearchMode::default(),
        }
    }

    pub fn resize(&mut self, width: u16, y: u16) {
        self.width = width;
        self.y = y;
    }

    pub fn is_prompting(&self) -> bool {
        matches!(self.mode, Mode::Prompt(_))
    }

    pub fn search_mode(&self) -> SearchMode {
        self.search_mode
    }

    pub fn open_prompt(&mut self, mode: PromptMode, initial: &str) {
        self.mode = Mode::Prompt(mode);
        self.edit = initial.chars().collect();
        self.cx = self.edit.len();
        self.message = None;
    }

    /// Any viewer-level key clears a lingering message.
    pub fn on_user_action(&mut self) {
        if self.mode == Mode::Message {
            self.mode = Mode::Status;
            self.message = None;
        }
    }

    pub fn set_message(&mut self, text: impl Into<String>, color: Color) {
        self.message = Some(Message {
            text: text.into(),
            color,
        });
        self.mode = Mode::Message;
    }

    fn close_prompt(&mut self) {
        self.mode = Mode::Status;
        self.edit.clear();
        self.cx = 0;
        self.history.reset_cursor();
    }

    pub fn draw(&self, out: &mut impl Write, status: &StatusView) -> io::Result<()> {
        queue!(
            out,
            MoveTo(0, self.y),
            Clear(ClearType::CurrentLine),
            ResetColor
        )?;
        match self.mode {
            Mode::Status => self.draw_status(out, status),
            Mode::Prompt(mode) => self.draw_prompt(out, mode),
            Mode::Message => self.draw_message(out),
        }
    }

    fn draw_status(&self, out: &mut impl Write, status: &StatusView) -> io::Result<()> {
        if !status.filters_enabled {
            let tag = "[-FILTERS]";
            queue!(
                out,
                MoveTo(1, self.y),
                SetForegroundColor(Color::DarkMagenta),
                Print(tag)
            )?;
        }
        let text = format!("{}/{}", status.current, status.total);
        let x = self.width.saturating_sub(text.chars().count() as u16);
        queue!(
            out,
            MoveTo(x, self.y),
            SetForegroundColor(Color::DarkYellow),
            Print(text),
            ResetColor
        )?;
        Ok(())
    }

    fn draw_prompt(&self, out: &mut impl Write, mode: PromptMode) -> io::Result<()> {
        queue!(
            out,
            MoveTo(0, self.y),
            SetForegroundColor(mode.color()),
            Print(mode.glyph()),
            ResetColor
        )?;
        let visible: String = self
            .edit
            .iter()
            .take(self.width.saturating_sub(PROMPT_WIDTH) as usize)
            .collect();
        queue!(out, Print(visible))?;
        if mode.uses_search_mode() {
            let name = self.search_mode.name();
            let x = self.width.saturating_sub(name.len() as u16);
            if usize::from(x) > PROMPT_WIDTH as usize + self.edit.len() {
                queue!(
                    out,
                    MoveTo(x, self.y),
                    SetForegroundColor(search_mode_color(self.search_mode)),
                    Print(name),
                    ResetColor
                )?;
            }
        }
        Ok(())
    }

    fn draw_message(&self, out: &mut impl Write) -> io::Result<()> {
        if let Some(message) = &self.message {
            let visible: String = message
                .text
                .chars()
                .take(self.width.saturating_sub(1) as usize)
                .collect();
            queue!(
                out,
                MoveTo(1, self.y),
                SetForegroundColor(message.color),
                Print(visible),
                ResetColor
            )?;
        }
        Ok(())
    }

    /// Places the terminal cursor inside the edit buffer. Returns false in
    /// non-prompt modes, where the cursor stays hidden.
    pub fn position_cursor(&self, out: &mut impl Write) -> io::Result<bool> {
        if !self.is_prompting() {
            return Ok(false);
        }
        queue!(out, MoveTo(PROMPT_WIDTH + self.cx as u16, self.y))?;
        Ok(true)
    }

    pub fn process_key(&mut self, key: KeyEvent) -> PromptOutcome {
        let Mode::Prompt(mode) = self.mode else {
            return PromptOutcome::Pending;
        };
        if key.mods.contains(KeyModifiers::ALT) {
            match key.code {
                KeyCode::Left => self.cx = self.find_word(false),
                KeyCode::Right => self.cx = self.find_word(true),
                KeyCode::Backspace => self.delete_word(false),
                KeyCode::Char('d') => self.delete_word(true),
                _ => {}
            }
            return PromptOutcome::Pending;
        }
        if key.mods.contains(KeyModifiers::CTRL) {
            if key.code == KeyCode::Char('r') && mode.uses_search_mode() {
                self.search_mode = self.search_mode.next();
            }
            return PromptOutcome::Pending;
        }
        match key.code {
            KeyCode::Char(c) => {
                self.edit.insert(self.cx, c);
                self.cx += 1;
            }
            KeyCode::Enter => {
                let text: String = self.edit.iter().collect();
                if mode.records_history() {
                    self.history.add(&text);
                }
                self.close_prompt();
                return PromptOutcome::Submitted(mode, text);
            }
            KeyCode::Esc => {
                self.close_prompt();
                return PromptOutcome::Cancelled;
            }
            KeyCode::Left => self.cx = self.cx.saturating_sub(1),
            KeyCode::Right => self.cx = (self.cx + 1).min(self.edit.len()),
            KeyCode::Backspace => {
                if self.cx > 0 {
                    self.cx -= 1;
                    self.edit.remove(self.cx);
                }
            }
            KeyCode::Delete => {
                if self.cx < self.edit.len() {
                    self.edit.remove(self.cx);
                }
            }
            KeyCode::Up => {
                if mode == PromptMode::KeepChars {
                    self.adjust_numeric(1);
                } else {
                    let current: String = self.edit.iter().collect();
                    if let Some(entry) = self.history.recall_back(&current) {
                        self.edit = entry.chars().collect();
                        self.cx = self.edit.len();
                    }
                }
            }
            KeyCode::Down => {
                if mode == PromptMode::KeepChars {
                    self.adjust_numeric(-1);
                } else if let Some(entry) = self.history.recall_forward() {
                    self.edit = entry.chars().collect();
                    self.cx = self.edit.len();
                }
            }
            _ => {}
        }
        PromptOutcome::Pending
    }

    fn adjust_numeric(&mut self, delta: i64) {
        let current: String = self.edit.iter().collect();
        let value = current.parse::<i64>().unwrap_or(0);
        let next = (value + delta).max(0);
        self.edit = next.to_string().chars().collect();
        self.cx = self.edit.len();
    }

    /// Next space-delimited word boundary from the cursor.
    fn find_word(&self, forward: bool) -> usize {
        if forward {
            let mut pos = self.edit.len();
            let mut i = self.cx + 1;
            while i < self.edit.len() {
                if self.edit[i] == ' ' {
                    pos = i;
                    break;
                }
                i += 1;
            }
            pos
        } else {
            let mut pos = 0;
            let mut i = self.cx.saturating_sub(2);
            loop {
                if self.edit.get(i) == Some(&' ') {
                    pos = i + 1;
                    break;
                }
                if i == 0 {
                    break;
                }
                i -= 1;
            }
            pos
        }
    }

    fn delete_word(&mut self, forward: bool) {
        let boundary = self.find_word(forward);
        if forward {
            let end = boundary.clamp(self.cx, self.edit.len());
            self.edit.drain(self.cx..end);
        } else {
            let start = boundary.min(self.cx);
            self.edit.drain(start..self.cx);
            self.cx = start;
        }
    }
}

fn search_mode_color(mode: SearchMode) -> Color {
    match mode.color() {
        32 => Color::DarkGreen,
        35 => Color::DarkMagenta,
        36 => Color::DarkCyan,
        other => Color::AnsiValue(other.saturating_sub(30).min(15) as u8),
    }
}
