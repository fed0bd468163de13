//! Offset ↔ line-number cache.
//!
//! Recovers logical line numbers from byte offsets for backward seeks and
//! the status display. Bounded: a background trimmer keeps only the most
//! recent entries (highest offsets).

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::pos::{LineNo, Offset, PosLine};

/// Entry count the trimmer keeps the map at.
pub(crate) const MAP_LIMIT: usize = 1000;

const TRIM_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) struct LineMap {
    inner: RwLock<BTreeMap<Offset, LineNo>>,
}

impl LineMap {
    pub fn new() -> LineMap {
        LineMap {
            inner: RwLock::new(BTreeMap::from([(0, 0)])),
        }
    }

    /// Records a line's start offset and its end offset (the newline byte).
    /// Lines with unresolved numbers are not recorded.
    pub fn record(&self, pl: &PosLine) {
        let Some(line) = pl.pos.line else {
            return;
        };
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(pl.pos.offset, line);
        map.insert(pl.pos.offset + pl.bytes.len() as Offset, line);
    }

    pub fn resolve(&self, offset: Offset) -> Option<LineNo> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&offset)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drops the lowest-offset entries until at most `keep` remain.
    pub fn trim(&self, keep: usize) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        while map.len() > keep {
            map.pop_first();
        }
    }

    /// Periodic trimmer bounding the map's memory for the process lifetime.
    pub fn spawn_trimmer(map: Arc<LineMap>, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(TRIM_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tick.tick() => {}
                }
                if map.len() > MAP_LIMIT {
                    map.trim(MAP_LIMIT);
                    tracing::trace!(target: "fetch.map", len = map.len(), "trimmed line map");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos::Pos;

    #[test]
    fn records_start_and_end_offsets() {
        let map = LineMap::new();
        map.record(&PosLine {
            bytes: b"hello".to_vec(),
            pos: Pos::new(7, 100),
        });
        assert_eq!(map.resolve(100), Some(7));
        assert_eq!(map.resolve(105), Some(7));
        assert_eq!(map.resolve(101), None);
    }

    #[test]
    fn unresolved_lines_are_not_recorded() {
        let map = LineMap::new();
        map.record(&PosLine {
            bytes: b"x".to_vec(),
            pos: Pos::at_offset(50),
        });
        assert_eq!(map.resolve(50), None);
    }

    #[test]
    fn trim_keeps_the_most_recent_entries() {
        let map = LineMap::new();
        for i in 0..50u64 {
            map.record(&PosLine {
                bytes: vec![b'x'; 3],
                pos: Pos::new(i, i * 10),
            });
        }
        map.trim(10);
        assert_eq!(map.len(), 10);
        // Low offsets went first.
        assert_eq!(map.resolve(0), None);
        assert_eq!(map.resolve(490), Some(49));
    }
}
