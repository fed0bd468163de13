//! The stateful reader between the raw byte source and the viewport.
//!
//! The [`Fetcher`] owns the byte source, a buffered line reader with a known
//! logical offset, a bounded offset↔line cache, and the active filter
//! chain. It exposes forward and backward cancellable line streams, search
//! over both, and the bookkeeping the status loops need.
//!
//! Locking: the reader mutex serializes byte-source access; exactly one
//! forward or backward stream holds it at a time, for the stream's
//! lifetime. The line map has its own read/write lock, and the filter chain
//! is an `Arc` snapshot swapped only between streams.

mod chain;
mod map;
mod pos;
mod reader;
mod stream;

pub use chain::FilterChain;
pub use pos::{Line, LineNo, Offset, Pos, PosLine};
pub use stream::LineStream;

use std::fs::File;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use core_filter::{Filter, SearchFn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::map::LineMap;
use crate::reader::{LineReader, RawLine};

/// Upper bound on lines walked by one [`Fetcher::advance_lines`] call.
pub const ADVANCE_CHUNK: u64 = 3500;

pub struct Fetcher {
    pub(crate) reader: Arc<Mutex<LineReader>>,
    pub(crate) map: Arc<LineMap>,
    chain: RwLock<Arc<FilterChain>>,
    /// Separate handle for size queries so they never contend with streams.
    meta: File,
    pub(crate) cancel: CancellationToken,
}

impl Fetcher {
    /// Takes exclusive ownership of `file`. `cancel` scopes the background
    /// map trimmer and every stream to the process lifetime.
    pub fn new(
        file: File,
        growth: core_spool::GrowthHandle,
        cancel: CancellationToken,
    ) -> io::Result<Arc<Fetcher>> {
        let meta = file.try_clone()?;
        let map = Arc::new(LineMap::new());
        LineMap::spawn_trimmer(map.clone(), cancel.clone());
        Ok(Arc::new(Fetcher {
            reader: Arc::new(Mutex::new(LineReader::new(file, growth))),
            map,
            chain: RwLock::new(Arc::new(FilterChain::default())),
            meta,
            cancel,
        }))
    }

    // --- filter state -------------------------------------------------------

    /// Snapshot of the current filter chain.
    pub fn chain(&self) -> Arc<FilterChain> {
        self.chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn mutate_chain(&self, mutate: impl FnOnce(&mut FilterChain)) {
        let mut guard = self.chain.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = (**guard).clone();
        mutate(&mut next);
        *guard = Arc::new(next);
    }

    /// Appends a filter and re-enables filtering. The caller resets the
    /// viewport afterwards; the line map is left untouched.
    pub fn add_filter(&self, filter: Filter) {
        tracing::debug!(target: "fetch.filters", pattern = filter.pattern(), action = ?filter.action, "adding filter");
        self.mutate_chain(|c| {
            c.filters.push(Arc::new(filter));
            c.enabled = true;
        });
    }

    /// Removes the most recently added filter. Returns false when none.
    pub fn remove_last_filter(&self) -> bool {
        let mut removed = false;
        self.mutate_chain(|c| removed = c.filters.pop().is_some());
        removed
    }

    /// Drops every filter. Returns false when there was nothing to drop.
    pub fn clear_filters(&self) -> bool {
        let mut had_any = false;
        self.mutate_chain(|c| {
            had_any = !c.filters.is_empty();
            c.filters.clear();
        });
        had_any
    }

    /// Flips the global filter switch, returning the new state. Highlight
    /// filters keep running while disabled.
    pub fn toggle_filters(&self) -> bool {
        let mut enabled = false;
        self.mutate_chain(|c| {
            c.enabled = !c.enabled;
            enabled = c.enabled;
        });
        enabled
    }

    pub fn filters_enabled(&self) -> bool {
        self.chain().enabled
    }

    pub fn has_filters(&self) -> bool {
        !self.chain().filters.is_empty()
    }

    /// Toggles the manual highlight for a line. Returns true when the line
    /// is highlighted afterwards.
    pub fn toggle_highlight(&self, line: LineNo) -> bool {
        let mut on = false;
        self.mutate_chain(|c| match c.highlighted.binary_search(&line) {
            Ok(at) => {
                c.highlighted.remove(at);
            }
            Err(at) => {
                c.highlighted.insert(at, line);
                on = true;
            }
        });
        on
    }

    // --- line map -----------------------------------------------------------

    pub fn update_map(&self, pl: &PosLine) {
        self.map.record(pl);
    }

    pub fn resolve_line(&self, offset: Offset) -> Option<LineNo> {
        self.map.resolve(offset)
    }

    // --- bookkeeping --------------------------------------------------------

    /// The follow-mode tail: current source size − 1, or 0 when empty.
    pub fn last_offset(&self) -> Offset {
        match self.meta.metadata() {
            Ok(meta) if meta.len() > 0 => meta.len() - 1,
            Ok(_) => 0,
            Err(e) => {
                tracing::debug!(target: "fetch", error = %e, "could not stat byte source");
                0
            }
        }
    }

    /// Offset of the first complete line boundary at-or-after `offset`:
    /// seek one byte back, discard one line, and the reader lands on the
    /// answer. `None` when no boundary exists before EOF.
    pub(crate) async fn find_line(&self, offset: Offset) -> io::Result<Option<Offset>> {
        if offset == 0 {
            return Ok(Some(0));
        }
        let guard = self.reader.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let mut reader = guard;
            reader.seek(offset - 1)?;
            match reader.read_line()? {
                RawLine::Full { .. } => Ok(Some(reader.offset())),
                RawLine::Partial { .. } | RawLine::Eof => Ok(None),
            }
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Walks up to [`ADVANCE_CHUNK`] lines forward from `from` and returns
    /// the last one observed. Used by the status loop for amortized
    /// line-count progress; holds the reader lock only for the walk.
    pub async fn advance_lines(&self, from: Pos) -> io::Result<PosLine> {
        let guard = self.reader.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let mut reader = guard;
            reader.seek(from.offset)?;
            let mut ret = PosLine {
                bytes: Vec::new(),
                pos: from,
            };
            let mut line = from.line;
            let mut walked = 0u64;
            loop {
                match reader.read_line()? {
                    RawLine::Full { bytes, start } => {
                        ret = PosLine {
                            bytes,
                            pos: Pos { line, offset: start },
                        };
                        line = line.map(|n| n + 1);
                        walked += 1;
                        if walked >= ADVANCE_CHUNK {
                            break;
                        }
                    }
                    RawLine::Partial { mut bytes, start } => {
                        if !reader.still_growing() {
                            // Unterminated tail: keep the end-offset entry on
                            // the last byte so size-1 resolves to this line.
                            bytes.pop();
                            ret = PosLine {
                                bytes,
                                pos: Pos { line, offset: start },
                            };
                        }
                        break;
                    }
                    RawLine::Eof => break,
                }
            }
            Ok(ret)
        })
        .await
        .map_err(io::Error::other)?
    }

    // --- search -------------------------------------------------------------

    /// First surfaced line at-or-after `from` whose runes match, or `None`
    /// at EOF. Dropping the returned future cancels the underlying read.
    pub async fn search(self: &Arc<Self>, from: Pos, pred: &SearchFn) -> io::Result<Option<Pos>> {
        let started = Instant::now();
        let mut stream = self.get(from).await?;
        while let Some(line) = stream.next().await {
            if pred(&line.text.runes).is_some() {
                tracing::debug!(target: "fetch.search", elapsed = ?started.elapsed(), pos = %line.pos, "search hit");
                return Ok(Some(line.pos));
            }
        }
        tracing::debug!(target: "fetch.search", elapsed = ?started.elapsed(), "search exhausted");
        Ok(None)
    }

    /// Backward counterpart of [`Fetcher::search`].
    pub async fn search_back(
        self: &Arc<Self>,
        from: Pos,
        pred: &SearchFn,
    ) -> io::Result<Option<Pos>> {
        let started = Instant::now();
        let mut stream = self.get_back(from).await?;
        while let Some(line) = stream.next().await {
            if pred(&line.text.runes).is_some() {
                tracing::debug!(target: "fetch.search", elapsed = ?started.elapsed(), pos = %line.pos, "back-search hit");
                return Ok(Some(line.pos));
            }
        }
        tracing::debug!(target: "fetch.search", elapsed = ?started.elapsed(), "back-search exhausted");
        Ok(None)
    }
}
