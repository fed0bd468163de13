//! Background activities feeding the main loop.
//!
//! Three cooperating loops, each an [`AsyncEventSource`]: the empty-page
//! refresher, the last-line tracker for the status bar, and the follower
//! that watches the tail while follow mode is pinned there. They log and
//! back off on trouble instead of propagating errors, and they all stop
//! when the event channel closes or the session token is cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use core_events::{AsyncEventSource, Event};
use core_fetch::{Fetcher, Pos, PosLine};
use core_spool::GrowthHandle;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::SharedViewBuffer;

const BACKOFF_CAP: Duration = Duration::from_secs(4);
const REFRESH_INITIAL_DELAY: Duration = Duration::from_millis(3);
const TRACKER_INITIAL_DELAY: Duration = Duration::from_millis(10);
const FOLLOW_POLL: Duration = Duration::from_millis(100);

fn doubled(delay: Duration) -> Duration {
    (delay * 2).min(BACKOFF_CAP)
}

/// Re-issues fills while the initial page is empty and input may still be
/// on its way. Stops once the page filled, the cursor left the anchor,
/// follow mode took over, or the stream finished (after one last nudge).
pub struct EmptyPageRefresh {
    pub buffer: SharedViewBuffer,
    pub fetcher: Arc<Fetcher>,
    pub growth: GrowthHandle,
    pub follow: bool,
    pub cancel: CancellationToken,
}

impl AsyncEventSource for EmptyPageRefresh {
    fn name(&self) -> &'static str {
        "empty-page-refresh"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut delay = REFRESH_INITIAL_DELAY;
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                if self.follow {
                    return;
                }
                {
                    let buffer = self.buffer.lock().await;
                    if buffer.window() > 0 && buffer.len() >= buffer.window() {
                        return;
                    }
                    if buffer.cursor() != 0 || buffer.anchor().offset != 0 {
                        return;
                    }
                    if self.fetcher.has_filters() && !self.growth.is_stream() {
                        return;
                    }
                }
                if self.growth.is_stream() && self.growth.is_finished() {
                    let _ = tx.send(Event::Refresh).await;
                    return;
                }
                delay = doubled(delay);
                if tx.send(Event::Refresh).await.is_err() {
                    return;
                }
            }
        })
    }
}

/// Computes the last known line number incrementally, in
/// [`core_fetch::ADVANCE_CHUNK`]-line bites, feeding the line map and the
/// status bar. Never blocks interactive reads for long: each bite holds the
/// reader lock only for its own walk.
pub struct LastLineTracker {
    pub fetcher: Arc<Fetcher>,
    pub growth: GrowthHandle,
    pub cancel: CancellationToken,
}

impl AsyncEventSource for LastLineTracker {
    fn name(&self) -> &'static str {
        "last-line-tracker"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut delay = TRACKER_INITIAL_DELAY;
            let mut last = PosLine {
                bytes: Vec::new(),
                pos: Pos::START,
            };
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                let advanced = match self.fetcher.advance_lines(last.pos).await {
                    Ok(advanced) => advanced,
                    Err(e) => {
                        tracing::warn!(target: "view.tracker", error = %e, "advance failed, backing off");
                        delay = doubled(delay.max(TRACKER_INITIAL_DELAY));
                        continue;
                    }
                };
                if advanced.pos != last.pos {
                    self.fetcher.update_map(&advanced);
                    if let Some(line) = advanced.pos.line {
                        if tx.send(Event::StatusUpdate(line)).await.is_err() {
                            return;
                        }
                    }
                    last = advanced;
                    // More may be immediately available; keep chewing.
                    delay = Duration::ZERO;
                } else if self.growth.is_stream() && self.growth.is_finished() {
                    return;
                } else {
                    delay = doubled(delay.max(TRACKER_INITIAL_DELAY));
                }
            }
        })
    }
}

/// While follow mode is pinned to the tail, polls the source size and asks
/// for a refill whenever it grew.
pub struct Follower {
    pub fetcher: Arc<Fetcher>,
    pub following: Arc<AtomicBool>,
    pub follow: bool,
    pub cancel: CancellationToken,
}

impl AsyncEventSource for Follower {
    fn name(&self) -> &'static str {
        "follower"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if !self.follow {
                return;
            }
            let mut last_offset = self.fetcher.last_offset();
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    _ = tokio::time::sleep(FOLLOW_POLL) => {}
                }
                if !self.following.load(Ordering::Relaxed) {
                    continue;
                }
                let offset = self.fetcher.last_offset();
                if offset != last_offset {
                    last_offset = offset;
                    if tx.send(Event::Refill).await.is_err() {
                        return;
                    }
                }
            }
        })
    }
}
