//! The interactive viewer: cell-grid rendering, navigation and the main
//! event loop.
//!
//! One reserved row at the bottom belongs to the info bar; everything above
//! renders decoded runes with their attributes, the keep-chars anchor, and
//! reverse-video search matches. All mutation happens here, on the single
//! consumer side of the event channel.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use core_ansi::{Astring, RuneAttr, Style};
use core_events::{Event, KeyCode, KeyEvent, KeyModifiers};
use core_fetch::{Fetcher, Line, Pos};
use core_filter::{Filter, FilterAction, SearchFn, find_all, search_fn};
use core_view::SharedViewBuffer;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    queue,
    style::{
        Attribute, Attributes, Color, Print, ResetColor, SetAttribute, SetAttributes,
        SetBackgroundColor, SetForegroundColor,
    },
    terminal::{Clear, ClearType},
};
use tokio::sync::mpsc::Receiver;
use unicode_width::UnicodeWidthChar;

use crate::infobar::{InfoBar, PromptMode, PromptOutcome, StatusView};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Focus {
    View,
    Prompt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    None,
    Quit,
}

pub struct Viewer {
    fetcher: Arc<Fetcher>,
    buffer: SharedViewBuffer,
    info: InfoBar,
    source_path: PathBuf,
    follow: bool,
    following: Arc<AtomicBool>,
    width: u16,
    /// Content rows; one more row below belongs to the info bar.
    height: u16,
    wrap: bool,
    h_offset: usize,
    keep_chars: usize,
    search: Vec<char>,
    forward_search: bool,
    total_lines: u64,
    /// Position of the bottom visible line, for the status bar.
    bottom: Pos,
    focus: Focus,
}

impl Viewer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<Fetcher>,
        buffer: SharedViewBuffer,
        info: InfoBar,
        source_path: PathBuf,
        follow: bool,
        following: Arc<AtomicBool>,
        keep_chars: usize,
    ) -> Viewer {
        Viewer {
            fetcher,
            buffer,
            info,
            source_path,
            follow,
            following,
            width: 0,
            height: 0,
            wrap: false,
            h_offset: 0,
            keep_chars,
            search: Vec::new(),
            forward_search: true,
            total_lines: 0,
            bottom: Pos::START,
            focus: Focus::View,
        }
    }

    /// Drives the UI until quit or channel close.
    pub async fn run(mut self, mut rx: Receiver<Event>) -> Result<()> {
        let (w, h) = crossterm::terminal::size()?;
        self.resize(w, h).await?;
        if self.follow {
            self.navigate_end().await?;
        }

        while let Some(event) = rx.recv().await {
            match event {
                Event::Key(key) => {
                    let action = match self.focus {
                        Focus::View => self.process_view_key(key).await?,
                        Focus::Prompt => self.process_prompt_key(key).await?,
                    };
                    if action == Action::Quit {
                        break;
                    }
                }
                Event::Resize(w, h) => self.resize(w, h).await?,
                Event::Refresh => {
                    self.buffer.lock().await.refresh();
                    self.draw().await?;
                }
                Event::Refill => self.refill().await?,
                Event::StatusUpdate(line) => {
                    self.total_lines = line + 1;
                    if self.focus == Focus::View {
                        self.draw_info()?;
                    }
                }
                Event::Shutdown => break,
            }
        }
        Ok(())
    }

    async fn resize(&mut self, width: u16, height: u16) -> Result<()> {
        self.width = width;
        self.height = height.saturating_sub(1);
        self.info.resize(width, self.height);
        self.buffer.lock().await.set_window(self.height as usize);
        tracing::debug!(target: "view", width, height, "resize");
        self.draw().await
    }

    // --- rendering ----------------------------------------------------------

    async fn draw(&mut self) -> Result<()> {
        let mut out = io::stdout().lock();
        queue!(out, Hide, Clear(ClearType::All), ResetColor)?;

        let pred = self.search_pred();
        let mut bottom;
        {
            let mut buffer = self.buffer.lock().await;
            bottom = buffer.current_pos();
            let mut ty: u16 = 0;
            let mut row = 0usize;
            while ty < self.height {
                let Some(line) = buffer.line_at(row).await?.cloned() else {
                    break;
                };
                bottom = line.pos;
                ty = self.render_line(&mut out, &line, ty, pred.as_ref())?;
                row += 1;
            }
        }
        self.bottom = bottom;
        self.draw_info_into(&mut out)?;
        out.flush()?;
        Ok(())
    }

    /// Redraws only the info bar (status updates, messages).
    fn draw_info(&mut self) -> Result<()> {
        let mut out = io::stdout().lock();
        self.draw_info_into(&mut out)?;
        out.flush()?;
        Ok(())
    }

    fn draw_info_into(&mut self, out: &mut impl Write) -> Result<()> {
        let status = StatusView {
            current: self.bottom,
            total: self.total_lines,
            filters_enabled: self.fetcher.filters_enabled(),
        };
        self.info.draw(out, &status)?;
        if self.info.position_cursor(out)? {
            queue!(out, Show)?;
        }
        Ok(())
    }

    fn render_line(
        &self,
        out: &mut impl Write,
        line: &Line,
        mut ty: u16,
        pred: Option<&SearchFn>,
    ) -> io::Result<u16> {
        let (chars, attrs, kept) = self.visible_slice(&line.text);
        let spans = pred.map(|p| find_all(p, &chars)).unwrap_or_default();
        let mut spans = spans.into_iter().peekable();

        queue!(out, MoveTo(0, ty))?;
        let mut tx: u16 = 0;
        for (i, &ch) in chars.iter().enumerate() {
            let mut attr = attrs[i];
            if i < kept {
                // Keep-chars anchor column marker.
                attr.fg = 34;
            }
            while spans.peek().is_some_and(|span| i >= span.end) {
                spans.next();
            }
            let in_match = spans.peek().is_some_and(|span| span.contains(&i));

            let (mut fg, bg, mut cell_attrs) = cell_style(attr);
            if line.highlighted && attr.fg == 0 {
                cell_attrs.set(Attribute::Bold);
                fg = Color::DarkYellow;
            }
            if in_match {
                cell_attrs.set(Attribute::Reverse);
            }
            queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;
            if fg != Color::Reset {
                queue!(out, SetForegroundColor(fg))?;
            }
            if bg != Color::Reset {
                queue!(out, SetBackgroundColor(bg))?;
            }
            queue!(out, SetAttributes(cell_attrs), Print(ch))?;

            tx += UnicodeWidthChar::width(ch).unwrap_or(1).max(1) as u16;
            if tx >= self.width {
                if self.wrap && i + 1 < chars.len() {
                    ty += 1;
                    tx = 0;
                    if ty >= self.height {
                        break;
                    }
                    queue!(out, MoveTo(0, ty))?;
                } else {
                    break;
                }
            }
        }
        queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;
        Ok(ty + 1)
    }

    /// Applies horizontal scroll and the keep-chars anchor to one line.
    /// Returns the visible runes, their attributes, and how many leading
    /// runes are the kept anchor.
    fn visible_slice(&self, text: &Astring) -> (Vec<char>, Vec<RuneAttr>, usize) {
        let len = text.len();
        if self.keep_chars == 0 || self.wrap {
            let from = self.h_offset.min(len);
            return (text.runes[from..].to_vec(), text.attrs[from..].to_vec(), 0);
        }
        let kept = self.keep_chars.min(len);
        let mut chars = text.runes[..kept].to_vec();
        let mut attrs = text.attrs[..kept].to_vec();
        let right_from = (self.keep_chars + self.h_offset).min(len);
        chars.extend_from_slice(&text.runes[right_from..]);
        attrs.extend_from_slice(&text.attrs[right_from..]);
        (chars, attrs, kept)
    }

    fn search_pred(&self) -> Option<SearchFn> {
        if self.search.is_empty() {
            return None;
        }
        search_fn(self.info.search_mode(), &self.search).ok()
    }

    // --- navigation ---------------------------------------------------------

    async fn navigate(&mut self, delta: i64) -> Result<()> {
        {
            let mut buffer = self.buffer.lock().await;
            buffer.shift(delta).await?;
            self.following.store(false, Ordering::Relaxed);
            if self.follow && !buffer.is_full() {
                self.following.store(true, Ordering::Relaxed);
            }
        }
        self.draw().await
    }

    async fn navigate_start(&mut self) -> Result<()> {
        self.following.store(false, Ordering::Relaxed);
        self.buffer.lock().await.reset(Pos::START);
        self.draw().await
    }

    async fn navigate_end(&mut self) -> Result<()> {
        self.buffer
            .lock()
            .await
            .reset(Pos::at_offset(self.fetcher.last_offset()));
        // Nothing is on screen yet, so a full window up lands the tail at
        // the bottom row.
        self.navigate(-(self.height as i64)).await?;
        if self.follow {
            self.following.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn navigate_horizontally(&mut self, delta: i64) -> Result<()> {
        self.wrap = false;
        self.h_offset = self.h_offset.saturating_add_signed(delta as isize);
        self.draw().await
    }

    /// Follow-mode refill: keep pulling and pinning to the tail until the
    /// source stops yielding.
    async fn refill(&mut self) -> Result<()> {
        loop {
            let mut buffer = self.buffer.lock().await;
            let res = buffer.fill().await?;
            if res.new_lines > 0 {
                buffer.shift(res.new_lines as i64).await?;
                if buffer.is_full() {
                    buffer.shift_to_end();
                }
                drop(buffer);
                self.draw().await?;
                continue;
            }
            if res.last_line_changed {
                drop(buffer);
                self.draw().await?;
                continue;
            }
            return Ok(());
        }
    }

    // --- keys ---------------------------------------------------------------

    async fn process_view_key(&mut self, key: KeyEvent) -> Result<Action> {
        self.info.on_user_action();
        if key.mods.contains(KeyModifiers::CTRL) {
            match key.code {
                KeyCode::Char('u') => self.navigate(-(self.height as i64)).await?,
                KeyCode::Char('d') => self.navigate(self.height as i64).await?,
                KeyCode::Char('s') => {
                    let initial = format!("{}.filtered", self.source_path.display());
                    self.open_prompt(PromptMode::Save, &initial).await?;
                }
                _ => {}
            }
            return Ok(Action::None);
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(Action::Quit),
            KeyCode::Char('j') | KeyCode::Down => self.navigate(1).await?,
            KeyCode::Char('k') | KeyCode::Up => self.navigate(-1).await?,
            KeyCode::Char('f') | KeyCode::Char(' ') | KeyCode::PageDown => {
                self.navigate(self.height as i64).await?;
            }
            KeyCode::Char('b') | KeyCode::PageUp => {
                self.navigate(-(self.height as i64)).await?;
            }
            KeyCode::Char('g') | KeyCode::Home => self.navigate_start().await?,
            KeyCode::Char('G') | KeyCode::End => self.navigate_end().await?,
            KeyCode::Char('>') => self.navigate_horizontally(1).await?,
            KeyCode::Char('<') => self.navigate_horizontally(-1).await?,
            KeyCode::Right => self.navigate_horizontally(self.width as i64 / 2).await?,
            KeyCode::Left => self.navigate_horizontally(-(self.width as i64) / 2).await?,
            KeyCode::Char('W') => {
                self.wrap = !self.wrap;
                if self.wrap {
                    self.h_offset = 0;
                }
                self.draw().await?;
            }
            KeyCode::Char('/') => self.open_prompt(PromptMode::Search, "").await?,
            KeyCode::Char('?') => self.open_prompt(PromptMode::BackSearch, "").await?,
            KeyCode::Char('&') => self.open_prompt(PromptMode::Filter, "").await?,
            KeyCode::Char('+') => self.open_prompt(PromptMode::Append, "").await?,
            KeyCode::Char('-') => self.open_prompt(PromptMode::Exclude, "").await?,
            KeyCode::Char('~') => self.open_prompt(PromptMode::Highlight, "").await?,
            KeyCode::Char('K') => {
                let initial = self.keep_chars.to_string();
                self.open_prompt(PromptMode::KeepChars, &initial).await?;
            }
            KeyCode::Char('n') => self.next_search(false).await?,
            KeyCode::Char('N') => self.next_search(true).await?,
            KeyCode::Char('U') => {
                if self.fetcher.remove_last_filter() {
                    self.refresh_view().await?;
                }
            }
            KeyCode::Char('=') => {
                if self.fetcher.clear_filters() {
                    self.refresh_view().await?;
                }
            }
            KeyCode::Char('C') => {
                self.fetcher.toggle_filters();
                self.refresh_view().await?;
            }
            KeyCode::Char('h') => self.toggle_highlight_current().await?,
            _ => {}
        }
        Ok(Action::None)
    }

    async fn process_prompt_key(&mut self, key: KeyEvent) -> Result<Action> {
        match self.info.process_key(key) {
            PromptOutcome::Pending => self.draw().await?,
            PromptOutcome::Cancelled => {
                self.focus = Focus::View;
                self.draw().await?;
            }
            PromptOutcome::Submitted(mode, text) => {
                self.focus = Focus::View;
                self.handle_submit(mode, text).await?;
                self.draw().await?;
            }
        }
        Ok(Action::None)
    }

    async fn open_prompt(&mut self, mode: PromptMode, initial: &str) -> Result<()> {
        self.info.open_prompt(mode, initial);
        self.focus = Focus::Prompt;
        self.draw().await
    }

    async fn handle_submit(&mut self, mode: PromptMode, text: String) -> Result<()> {
        match mode {
            PromptMode::Filter => self.add_filter(&text, FilterAction::Intersect).await?,
            PromptMode::Append => self.add_filter(&text, FilterAction::Union).await?,
            PromptMode::Exclude => self.add_filter(&text, FilterAction::Exclude).await?,
            PromptMode::Highlight => self.add_filter(&text, FilterAction::Highlight).await?,
            PromptMode::Search => {
                self.search = text.chars().collect();
                self.forward_search = true;
                self.next_search(false).await?;
            }
            PromptMode::BackSearch => {
                self.search = text.chars().collect();
                self.forward_search = false;
                self.next_search(false).await?;
            }
            PromptMode::Save => self.save_filtered(&text).await?,
            PromptMode::KeepChars => {
                self.keep_chars = text.trim().parse().unwrap_or(0);
            }
        }
        Ok(())
    }

    // --- filters and search -------------------------------------------------

    async fn add_filter(&mut self, pattern: &str, action: FilterAction) -> Result<()> {
        let runes: Vec<char> = pattern.chars().collect();
        match Filter::new(&runes, action, self.info.search_mode()) {
            Ok(filter) => {
                self.fetcher.add_filter(filter);
                let mut buffer = self.buffer.lock().await;
                let pos = buffer.current_pos();
                buffer.reset(pos);
            }
            Err(e) => {
                tracing::debug!(target: "view.filters", error = %e, "filter rejected");
                self.info.set_message(format!("Err: {e}"), Color::DarkRed);
            }
        }
        Ok(())
    }

    async fn refresh_view(&mut self) -> Result<()> {
        self.buffer.lock().await.refresh();
        self.draw().await
    }

    async fn toggle_highlight_current(&mut self) -> Result<()> {
        let pos = self.buffer.lock().await.current_pos();
        let Some(line) = pos.line else {
            self.info
                .set_message("Line number still unknown here", Color::DarkYellow);
            return self.draw().await;
        };
        self.fetcher.toggle_highlight(line);
        self.buffer.lock().await.reset(pos);
        self.draw().await
    }

    async fn next_search(&mut self, reverse: bool) -> Result<()> {
        if self.search.is_empty() {
            return Ok(());
        }
        if self.forward_search != reverse {
            self.search_forward().await
        } else {
            self.search_back().await
        }
    }

    async fn search_forward(&mut self) -> Result<()> {
        let Some(pred) = self.search_pred() else {
            return Ok(());
        };
        let in_buffer = self.buffer.lock().await.search_forward(&pred);
        if let Some(distance) = in_buffer {
            return self.navigate(distance as i64).await;
        }
        let from = self.buffer.lock().await.last_pos();
        if let Some(pos) = self.fetcher.search(from, &pred).await? {
            self.buffer.lock().await.reset(pos);
            self.draw().await?;
        }
        Ok(())
    }

    async fn search_back(&mut self) -> Result<()> {
        let Some(pred) = self.search_pred() else {
            return Ok(());
        };
        let in_buffer = self.buffer.lock().await.search_back(&pred);
        if let Some(distance) = in_buffer {
            return self.navigate(-(distance as i64)).await;
        }
        let from = self.buffer.lock().await.current_pos();
        if let Some(pos) = self.fetcher.search_back(from, &pred).await? {
            self.buffer.lock().await.reset(pos);
            self.draw().await?;
        }
        Ok(())
    }

    // --- save ---------------------------------------------------------------

    async fn save_filtered(&mut self, name: &str) -> Result<()> {
        let path = expand_home(name);
        self.info.set_message("Saving...", Color::DarkYellow);
        self.draw_info()?;
        match self.write_surfaced(&path).await {
            Ok(()) => {
                self.info
                    .set_message(format!("Done! {}", path.display()), Color::DarkGreen);
            }
            Err(e) => {
                tracing::debug!(target: "view.save", error = %e, "save failed");
                self.info.set_message(format!("Err: {e}"), Color::DarkRed);
            }
        }
        Ok(())
    }

    /// Writes the currently surfaced stream, colors dropped, to `path`.
    async fn write_surfaced(&self, path: &Path) -> io::Result<()> {
        let file = std::fs::File::create(path)?;
        let mut out = io::BufWriter::with_capacity(64 * 1024, file);
        let mut stream = self.fetcher.get(Pos::START).await?;
        while let Some(line) = stream.next().await {
            writeln!(out, "{}", line.text.text())?;
        }
        out.flush()
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Maps a rune attribute to terminal colors. Bold basic colors shift into
/// the bright range and keep the bold attribute, matching common log
/// producer expectations; 256-color indices pass through unaltered.
fn cell_style(attr: RuneAttr) -> (Color, Color, Attributes) {
    let mut attrs = Attributes::default();
    let style = attr.style;
    for (bit, cell) in [
        (Style::BOLD, Attribute::Bold),
        (Style::DIM, Attribute::Dim),
        (Style::ITALIC, Attribute::Italic),
        (Style::UNDERLINE, Attribute::Underlined),
        (Style::BLINK, Attribute::SlowBlink),
        (Style::REVERSE, Attribute::Reverse),
        (Style::CONCEAL, Attribute::Hidden),
        (Style::STRIKE, Attribute::CrossedOut),
    ] {
        if style.contains(bit) {
            attrs.set(cell);
        }
    }
    let bold = style.contains(Style::BOLD);
    let fg = match attr.fg {
        0 => Color::Reset,
        30..=37 => {
            let mut idx = (attr.fg - 30) as u8;
            if bold {
                idx += 8;
            }
            Color::AnsiValue(idx)
        }
        16..=255 => Color::AnsiValue(attr.fg as u8),
        _ => Color::Reset,
    };
    let bg = match attr.bg {
        0 => Color::Reset,
        40..=47 => {
            let mut idx = (attr.bg - 40) as u8;
            if bold {
                idx += 8;
            }
            Color::AnsiValue(idx)
        }
        16..=255 => Color::AnsiValue(attr.bg as u8),
        _ => Color::Reset,
    };
    (fg, bg, attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_style_maps_basic_and_bright() {
        let (fg, _, attrs) = cell_style(RuneAttr {
            fg: 31,
            bg: 0,
            style: Style::empty(),
        });
        assert_eq!(fg, Color::AnsiValue(1));
        assert!(!attrs.has(Attribute::Bold));

        let (fg, _, attrs) = cell_style(RuneAttr {
            fg: 31,
            bg: 0,
            style: Style::BOLD,
        });
        assert_eq!(fg, Color::AnsiValue(9));
        assert!(attrs.has(Attribute::Bold));
    }

    #[test]
    fn cell_style_passes_256_colors_through() {
        let (fg, bg, _) = cell_style(RuneAttr {
            fg: 81,
            bg: 17,
            style: Style::empty(),
        });
        assert_eq!(fg, Color::AnsiValue(81));
        assert_eq!(bg, Color::AnsiValue(17));
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/x"), PathBuf::from("/tmp/x"));
    }
}
