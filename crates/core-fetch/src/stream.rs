//! Forward and backward line streams.
//!
//! The forward stream splits reading from decode/filter work: a blocking
//! reader task owns the reader lock and feeds raw lines into a bounded
//! channel; batches of raw lines are decoded and filter-evaluated on
//! blocking workers, and an in-order drain re-emits them so output order
//! always matches input order. The backward stream walks the source in
//! 64 KiB steps from the highest offset down, yielding each step's lines in
//! reverse.
//!
//! Every stream carries a cancellation token; dropping the [`LineStream`]
//! cancels it, which unwinds the tasks and releases the reader lock at the
//! next suspension point.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::Fetcher;
use crate::pos::{Line, LineNo, Pos, PosLine};
use crate::reader::{READ_BUF, RawLine};

/// Raw lines per decode/filter batch.
const BATCH: usize = 256;
/// Batches in flight at once; the in-order drain bounds reordering memory.
const PIPELINE_DEPTH: usize = 4;
/// Output channel capacity.
const OUT_BUF: usize = 500;
/// Byte width of one backward step.
const BACK_STEP: u64 = READ_BUF as u64;

/// An ordered stream of surfaced lines. Dropping it cancels the underlying
/// read promptly.
pub struct LineStream {
    rx: mpsc::Receiver<Line>,
    _guard: DropGuard,
}

impl LineStream {
    pub async fn next(&mut self) -> Option<Line> {
        self.rx.recv().await
    }

    fn new(rx: mpsc::Receiver<Line>, token: CancellationToken) -> LineStream {
        LineStream {
            rx,
            _guard: token.drop_guard(),
        }
    }

    /// A stream that is already exhausted (resolution hit EOF).
    fn empty() -> LineStream {
        let (_tx, rx) = mpsc::channel(1);
        LineStream {
            rx,
            _guard: CancellationToken::new().drop_guard(),
        }
    }
}

impl Fetcher {
    /// Ordered forward stream of surfaced lines starting at `from`.
    ///
    /// The reader lock is taken here and held by the reader task until the
    /// stream ends or is cancelled; callers that stop consuming must drop
    /// the stream promptly.
    pub async fn get(self: &Arc<Self>, from: Pos) -> io::Result<LineStream> {
        let Some(start) = self.find_line(from.offset).await? else {
            return Ok(LineStream::empty());
        };
        let mut from = from;
        if from.line.is_none() {
            from.line = self.map.resolve(from.offset);
        }
        let chain = self.chain();
        let token = self.cancel.child_token();
        let guard = self.reader.clone().lock_owned().await;

        let (feed_tx, feed_rx) = mpsc::channel::<PosLine>(BATCH);
        let (out_tx, out_rx) = mpsc::channel::<Line>(OUT_BUF);

        let read_token = token.clone();
        tokio::task::spawn_blocking(move || {
            let mut reader = guard;
            if let Err(e) = reader.seek(start) {
                tracing::error!(target: "fetch.stream", error = %e, offset = start, "seek failed");
                return;
            }
            let mut line = from.line;
            loop {
                if read_token.is_cancelled() {
                    return;
                }
                match reader.read_line() {
                    Ok(RawLine::Full { bytes, start }) => {
                        let pl = PosLine {
                            bytes,
                            pos: Pos {
                                line,
                                offset: start,
                            },
                        };
                        if feed_tx.blocking_send(pl).is_err() {
                            return;
                        }
                        line = line.map(|n| n + 1);
                    }
                    Ok(RawLine::Partial { bytes, start }) => {
                        // A still-growing tail keeps its partial line back
                        // until the newline arrives; a fixed source surfaces
                        // it as the final line.
                        if !reader.still_growing() {
                            let _ = feed_tx.blocking_send(PosLine {
                                bytes,
                                pos: Pos {
                                    line,
                                    offset: start,
                                },
                            });
                        }
                        return;
                    }
                    Ok(RawLine::Eof) => return,
                    Err(e) => {
                        tracing::error!(target: "fetch.stream", error = %e, "read failed");
                        return;
                    }
                }
            }
        });

        let drain_token = token.clone();
        tokio::spawn(async move {
            let mut feed_rx = feed_rx;
            let mut in_flight: VecDeque<JoinHandle<Vec<Option<Line>>>> = VecDeque::new();
            'feeding: loop {
                let Some(first) = feed_rx.recv().await else {
                    break;
                };
                let mut batch = Vec::with_capacity(BATCH);
                batch.push(first);
                while batch.len() < BATCH {
                    match feed_rx.try_recv() {
                        Ok(pl) => batch.push(pl),
                        Err(_) => break,
                    }
                }
                let chain = chain.clone();
                in_flight.push_back(tokio::task::spawn_blocking(move || {
                    batch.iter().map(|pl| chain.surface(pl)).collect()
                }));
                while in_flight.len() >= PIPELINE_DEPTH {
                    if !drain_one(&mut in_flight, &out_tx, &drain_token).await {
                        break 'feeding;
                    }
                }
            }
            while !in_flight.is_empty() {
                if !drain_one(&mut in_flight, &out_tx, &drain_token).await {
                    break;
                }
            }
        });

        Ok(LineStream::new(out_rx, token))
    }

    /// Reverse stream: surfaced lines strictly before `from.offset`, in
    /// decreasing-offset order, numbered downward from `from`.
    pub async fn get_back(self: &Arc<Self>, from: Pos) -> io::Result<LineStream> {
        let mut from = from;
        if from.line.is_none() {
            from.line = self.map.resolve(from.offset);
        }
        let chain = self.chain();
        let token = self.cancel.child_token();
        let (out_tx, out_rx) = mpsc::channel::<Line>(OUT_BUF);
        let fetcher = self.clone();
        let task_token = token.clone();

        tokio::spawn(async move {
            // `upper` is the exclusive bound on yielded line starts; `probe`
            // tracks how far back the next boundary search goes and drifts
            // further than one step when a line spans the step width.
            let mut upper = from.offset;
            let mut probe = from.offset;
            let mut next_number: Option<Option<LineNo>> = None;

            while upper > 0 && !task_token.is_cancelled() {
                let target = probe.saturating_sub(BACK_STEP);
                let boundary = match fetcher.find_line(target).await {
                    Ok(Some(boundary)) => boundary,
                    Ok(None) => {
                        if target == 0 {
                            break;
                        }
                        probe = target;
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(target: "fetch.stream", error = %e, "backward boundary search failed");
                        break;
                    }
                };
                if boundary >= upper {
                    // The line at the boundary spans the whole step: widen
                    // the search by another step and retry.
                    if target == 0 {
                        break;
                    }
                    probe = target;
                    continue;
                }

                let guard = fetcher.reader.clone().lock_owned().await;
                let step_upper = upper;
                let step = tokio::task::spawn_blocking(move || -> io::Result<Vec<PosLine>> {
                    let mut reader = guard;
                    reader.seek(boundary)?;
                    let mut out = Vec::new();
                    loop {
                        match reader.read_line()? {
                            RawLine::Full { bytes, start } => {
                                if start >= step_upper {
                                    break;
                                }
                                out.push(PosLine {
                                    bytes,
                                    pos: Pos::at_offset(start),
                                });
                            }
                            RawLine::Partial { bytes, start } => {
                                if start < step_upper && !reader.still_growing() {
                                    out.push(PosLine {
                                        bytes,
                                        pos: Pos::at_offset(start),
                                    });
                                }
                                break;
                            }
                            RawLine::Eof => break,
                        }
                    }
                    Ok(out)
                })
                .await;
                let mut raw = match step {
                    Ok(Ok(raw)) => raw,
                    Ok(Err(e)) => {
                        tracing::error!(target: "fetch.stream", error = %e, "backward read failed");
                        break;
                    }
                    Err(_) => break,
                };
                if raw.is_empty() {
                    break;
                }

                // Physical lines are numbered from the nearest one down;
                // excluded lines consume numbers like any other.
                let base = match next_number {
                    Some(n) => n,
                    None => initial_back_number(&raw[raw.len() - 1], from),
                };
                let mut number = base;
                for pl in raw.iter_mut().rev() {
                    pl.pos.line = number;
                    number = number.and_then(|n| n.checked_sub(1));
                }
                next_number = Some(number);

                let chain = chain.clone();
                let decided: Vec<Option<Line>> = match tokio::task::spawn_blocking(move || {
                    raw.iter().map(|pl| chain.surface(pl)).collect()
                })
                .await
                {
                    Ok(decided) => decided,
                    Err(_) => break,
                };

                let mut closed = false;
                for line in decided.into_iter().rev().flatten() {
                    tokio::select! {
                        sent = out_tx.send(line) => {
                            if sent.is_err() {
                                closed = true;
                                break;
                            }
                        }
                        _ = task_token.cancelled() => {
                            closed = true;
                            break;
                        }
                    }
                }
                if closed {
                    break;
                }
                upper = boundary;
                probe = boundary;
            }
        });

        Ok(LineStream::new(out_rx, token))
    }
}

/// In-order completion: awaits the oldest batch and forwards its surviving
/// lines. Returns false once the consumer is gone or the stream was
/// cancelled.
async fn drain_one(
    in_flight: &mut VecDeque<JoinHandle<Vec<Option<Line>>>>,
    out_tx: &mpsc::Sender<Line>,
    token: &CancellationToken,
) -> bool {
    let Some(handle) = in_flight.pop_front() else {
        return true;
    };
    let decided = match handle.await {
        Ok(decided) => decided,
        Err(_) => return false,
    };
    for line in decided.into_iter().flatten() {
        tokio::select! {
            sent = out_tx.send(line) => {
                if sent.is_err() {
                    return false;
                }
            }
            _ = token.cancelled() => return false,
        }
    }
    true
}

/// Number for the backward stream's nearest line: `from.line` when
/// `from.offset` points into that line (or at its newline), `from.line − 1`
/// when `from.offset` is exactly the following line's start.
fn initial_back_number(nearest: &PosLine, from: Pos) -> Option<LineNo> {
    let line = from.line?;
    let next_start = nearest.pos.offset + nearest.bytes.len() as u64 + 1;
    if from.offset == next_start {
        line.checked_sub(1)
    } else {
        Some(line)
    }
}
