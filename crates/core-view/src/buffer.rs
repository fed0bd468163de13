//! Sliding window of surfaced lines.

use std::io;
use std::sync::Arc;

use core_fetch::{Fetcher, Line, Pos};
use core_filter::SearchFn;

/// What one [`ViewBuffer::fill`] pass did: how many lines were appended, and
/// whether the previously last stored line changed content (a tail line
/// that gained bytes since the last pass).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FillResult {
    pub new_lines: usize,
    pub last_line_changed: bool,
}

/// A contiguous run of surfaced lines plus a cursor index; the on-screen top
/// line is `buffer[cursor]`.
///
/// Invariants kept by the fill/trim operations: after a stable fill either
/// `len − cursor ≥ 3·window` or EOF was reached; the run behind the cursor
/// is trimmed to `3·window`; back-fills cap the run ahead at `2·window` and
/// re-open EOF so a forward fill can re-extend.
pub struct ViewBuffer {
    fetcher: Arc<Fetcher>,
    buffer: Vec<Line>,
    cursor: usize,
    /// Where filling starts when the buffer is empty.
    anchor: Pos,
    window: usize,
    eof_reached: bool,
    /// Position of the current line, kept across resets for the status bar.
    current: Pos,
}

impl ViewBuffer {
    pub fn new(fetcher: Arc<Fetcher>) -> ViewBuffer {
        ViewBuffer {
            fetcher,
            buffer: Vec::new(),
            cursor: 0,
            anchor: Pos::START,
            window: 0,
            eof_reached: false,
            current: Pos::START,
        }
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    /// Sets the window height (screen rows available for content).
    pub fn set_window(&mut self, window: usize) {
        self.window = window;
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn anchor(&self) -> Pos {
        self.anchor
    }

    pub fn eof_reached(&self) -> bool {
        self.eof_reached
    }

    /// True when a full window of lines is buffered at-or-after the cursor.
    pub fn is_full(&self) -> bool {
        self.window > 0 && self.buffer.len().saturating_sub(self.cursor) >= self.window
    }

    pub fn current_line(&self) -> Option<&Line> {
        self.buffer.get(self.cursor)
    }

    /// Position of the current line, falling back to the last known one
    /// when the buffer is empty.
    pub fn current_pos(&self) -> Pos {
        self.current_line().map(|l| l.pos).unwrap_or(self.current)
    }

    /// Position of the last buffered line, or the anchor when empty. This
    /// is where an out-of-buffer forward search picks up.
    pub fn last_pos(&self) -> Pos {
        self.buffer.last().map(|l| l.pos).unwrap_or(self.anchor)
    }

    fn sync_current(&mut self) {
        if let Some(line) = self.buffer.get(self.cursor) {
            self.current = line.pos;
        }
    }

    /// Empties the buffer and anchors the next fill at `pos`.
    pub fn reset(&mut self, pos: Pos) {
        tracing::debug!(target: "view.buffer", anchor = %pos, "reset");
        self.buffer.clear();
        self.cursor = 0;
        self.anchor = pos;
        self.current = pos;
        self.eof_reached = false;
    }

    /// Equivalent to `reset(current_pos())`; used after filter changes.
    pub fn refresh(&mut self) {
        self.reset(self.current_pos());
    }

    /// Line at `offset` rows below the cursor, forward-filling on a miss.
    pub async fn line_at(&mut self, offset: usize) -> io::Result<Option<&Line>> {
        if self.cursor + offset >= self.buffer.len() && !self.eof_reached {
            self.fill().await?;
        }
        Ok(self.buffer.get(self.cursor + offset))
    }

    /// Pulls forward from the last stored line (or the anchor) until
    /// `3·window` lines are buffered past the cursor or the stream ends.
    /// Dedupes against the last stored line and trims the run behind the
    /// cursor to `3·window`.
    pub async fn fill(&mut self) -> io::Result<FillResult> {
        let mut res = FillResult::default();
        if self.window == 0 {
            return Ok(res);
        }
        let target = self.window * 3;
        let from = self.buffer.last().map(|l| l.pos).unwrap_or(self.anchor);
        let mut stream = self.fetcher.get(from).await?;
        loop {
            if self.buffer.len().saturating_sub(self.cursor) >= target {
                break;
            }
            let Some(line) = stream.next().await else {
                self.eof_reached = true;
                break;
            };
            match self.buffer.last() {
                Some(last) if line.pos.offset < last.pos.offset => {
                    // Stale duplicate from the boundary resolution; skip.
                }
                Some(last) if line.pos.offset == last.pos.offset => {
                    // Same line again; take it only if it changed (a tail
                    // line that gained bytes since the last pass).
                    let changed =
                        line.text != last.text || line.highlighted != last.highlighted;
                    if changed {
                        if let Some(slot) = self.buffer.last_mut() {
                            *slot = line;
                        }
                        res.last_line_changed = true;
                    }
                }
                _ => {
                    self.buffer.push(line);
                    res.new_lines += 1;
                }
            }
        }
        if self.cursor > target {
            let cut = self.cursor - target;
            self.buffer.drain(..cut);
            self.cursor -= cut;
            self.eof_reached = false;
        }
        tracing::trace!(target: "view.buffer", new = res.new_lines, len = self.buffer.len(), "fill");
        Ok(res)
    }

    /// Pulls backward from the first stored line (or the anchor), prepends
    /// up to `3·window` lines, and advances the cursor by the number
    /// inserted. The run ahead of the cursor is capped at `2·window`, which
    /// re-opens EOF for the next forward fill.
    pub async fn back_fill(&mut self) -> io::Result<usize> {
        if self.window == 0 {
            return Ok(0);
        }
        let from = self.buffer.first().map(|l| l.pos).unwrap_or(self.anchor);
        if from.offset == 0 {
            return Ok(0);
        }
        let target = self.window * 3;
        let mut stream = self.fetcher.get_back(from).await?;
        let mut fresh: Vec<Line> = Vec::with_capacity(target);
        while fresh.len() < target {
            let Some(line) = stream.next().await else {
                break;
            };
            fresh.push(line);
        }
        drop(stream);
        if fresh.is_empty() {
            return Ok(0);
        }
        if self.buffer.len() > self.window * 2 {
            self.buffer.truncate(self.window * 2);
            self.eof_reached = false;
        }
        // `fresh` is nearest-first; flip it into input order and splice the
        // old run behind it.
        fresh.reverse();
        let inserted = fresh.len();
        fresh.extend(self.buffer.drain(..));
        self.buffer = fresh;
        self.cursor += inserted;
        tracing::trace!(target: "view.buffer", inserted, len = self.buffer.len(), "back_fill");
        Ok(inserted)
    }

    /// Moves the cursor by `delta`, back-filling or forward-filling when
    /// the move runs off the buffered run, then clamping to what exists.
    pub async fn shift(&mut self, delta: i64) -> io::Result<()> {
        if delta < 0 {
            let up = delta.unsigned_abs() as usize;
            if up > self.cursor {
                self.back_fill().await?;
            }
            self.cursor = self.cursor.saturating_sub(up);
        } else {
            let down = delta as usize;
            if self.cursor + down + 1 > self.buffer.len() {
                self.fill().await?;
            }
            self.cursor = (self.cursor + down).min(self.buffer.len().saturating_sub(1));
        }
        self.sync_current();
        Ok(())
    }

    /// Pins the window to the end of the buffered run.
    pub fn shift_to_end(&mut self) {
        self.cursor = self.buffer.len().saturating_sub(self.window.max(1));
        self.sync_current();
    }

    /// In-buffer search below the cursor; returns the relative distance.
    pub fn search_forward(&self, pred: &SearchFn) -> Option<usize> {
        self.buffer[self.cursor..]
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, line)| pred(&line.text.runes).is_some())
            .map(|(distance, _)| distance)
    }

    /// In-buffer search above the cursor; returns the relative distance.
    pub fn search_back(&self, pred: &SearchFn) -> Option<usize> {
        let above = &self.buffer[..self.cursor];
        (1..=above.len()).find(|&distance| pred(&above[above.len() - distance].text.runes).is_some())
    }
}
